//! Server implementation
//!
//! The `Server` owns the registries and serves any number of connections. Each
//! connection gets its own `Session` and `ConnectionState`; registrations made
//! through the registries are visible to every connection.

use serde::de::DeserializeOwned;
use serde::Serialize;
use schemars::JsonSchema;
use serde_json::{ Map, Value };
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{ error, info, warn };

use crate::protocol::{
    CallToolResult,
    Error,
    GetPromptResult,
    Prompt,
    PromptsCapability,
    ReadResourceResult,
    Resource,
    ResourceTemplate,
    ResourcesCapability,
    Tool,
    ToolsCapability,
};
use crate::server::context::{ ConnectionState, RequestContext };
use crate::server::handlers::ServerRouteHandler;
use crate::server::services::completion::CompletionHandler;
use crate::server::services::prompts::PromptManager;
use crate::server::services::resources::{ ResourceRegistry, ResourceRequest };
use crate::server::services::tools::ToolRegistry;
use crate::server::services::ServiceProvider;
use crate::session::Session;
use crate::transport::{ StreamTransport, Transport };

/// Default timeout for requests the server sends on its own behalf
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for elicitation and sampling callbacks
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Name reported in the `initialize` result
    pub server_name: String,

    /// Version reported in the `initialize` result
    pub server_version: String,

    /// Usage hints for the client
    pub instructions: Option<String>,

    /// Timeout for plain server-to-client requests
    pub request_timeout: Duration,

    /// How long a handler waits for the client to answer a callback
    pub callback_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: "mcp-duplex-server".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }
}

/// Server for the Model Context Protocol
#[derive(Clone)]
pub struct Server {
    services: ServiceProvider,
    config: Arc<ServerConfig>,
}

impl Server {
    /// Create a new server builder
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn services(&self) -> &ServiceProvider {
        &self.services
    }

    pub fn tool_registry(&self) -> &ToolRegistry {
        self.services.tool_registry()
    }

    pub fn resource_registry(&self) -> &ResourceRegistry {
        self.services.resource_registry()
    }

    pub fn prompt_manager(&self) -> &PromptManager {
        self.services.prompt_manager()
    }

    /// Serve one connection; the returned session runs until the transport closes
    pub fn serve<T>(&self, transport: T) -> Session where T: Transport + 'static {
        let connection = Arc::new(ConnectionState::new());
        let handler = ServerRouteHandler::new(self.services.clone(), self.config.clone(), connection);
        Session::start(Arc::new(transport), Arc::new(handler), self.config.request_timeout)
    }

    /// Serve a single client over stdin/stdout until it disconnects
    pub async fn serve_stdio(&self) -> Result<(), Error> {
        info!("Serving {} over stdio", self.config.server_name);
        self.serve(StreamTransport::stdio()).wait().await
    }

    /// Accept TCP connections and serve each of them concurrently
    pub async fn serve_tcp(&self, listener: TcpListener) -> Result<(), Error> {
        info!("Serving {} on {}", self.config.server_name, listener.local_addr()?);
        loop {
            let (stream, addr) = listener.accept().await?;
            info!("Accepted connection from {}", addr);

            let session = self.serve(StreamTransport::from_tcp(stream));
            tokio::spawn(async move {
                match session.wait().await {
                    Ok(()) => info!("Connection from {} closed", addr),
                    Err(e) => error!("Connection from {} failed: {}", addr, e),
                }
            });
        }
    }
}

type Registration = Box<dyn FnOnce(&ServiceProvider) -> Result<(), Error> + Send>;

/// Builder for configuring and creating a Server
pub struct ServerBuilder {
    config: ServerConfig,
    tool_capabilities: ToolsCapability,
    resource_capabilities: ResourcesCapability,
    prompt_capabilities: PromptsCapability,
    registrations: Vec<Registration>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    /// Create a new server builder
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            tool_capabilities: ToolsCapability::default(),
            resource_capabilities: ResourcesCapability::default(),
            prompt_capabilities: PromptsCapability::default(),
            registrations: Vec::new(),
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = name.into();
        self
    }

    pub fn with_server_version(mut self, version: impl Into<String>) -> Self {
        self.config.server_version = version.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = Some(instructions.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.config.callback_timeout = timeout;
        self
    }

    pub fn with_tool_capabilities(mut self, capabilities: ToolsCapability) -> Self {
        self.tool_capabilities = capabilities;
        self
    }

    pub fn with_resource_capabilities(mut self, capabilities: ResourcesCapability) -> Self {
        self.resource_capabilities = capabilities;
        self
    }

    pub fn with_prompt_capabilities(mut self, capabilities: PromptsCapability) -> Self {
        self.prompt_capabilities = capabilities;
        self
    }

    fn register<F>(mut self, registration: F) -> Self
        where F: FnOnce(&ServiceProvider) -> Result<(), Error> + Send + 'static
    {
        self.registrations.push(Box::new(registration));
        self
    }

    /// Add a tool taking raw JSON arguments
    pub fn with_tool<F, Fut>(self, tool: Tool, handler: F) -> Self
        where
            F: Fn(Map<String, Value>, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<CallToolResult, Error>> + Send + 'static
    {
        self.register(move |services| services.tool_registry().register(tool, handler))
    }

    /// Add a tool with typed arguments
    pub fn with_typed_tool<A, F, Fut>(self, tool: Tool, handler: F) -> Self
        where
            A: DeserializeOwned + JsonSchema + Send + 'static,
            F: Fn(A, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<CallToolResult, Error>> + Send + 'static
    {
        self.register(move |services| services.tool_registry().register_typed(tool, handler))
    }

    /// Add a tool with typed arguments and structured output
    pub fn with_structured_tool<A, R, F, Fut>(self, tool: Tool, handler: F) -> Self
        where
            A: DeserializeOwned + JsonSchema + Send + 'static,
            R: Serialize + JsonSchema + 'static,
            F: Fn(A, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<R, Error>> + Send + 'static
    {
        self.register(move |services| services.tool_registry().register_structured(tool, handler))
    }

    /// Add a resource with a fixed URI
    pub fn with_resource<F, Fut>(self, resource: Resource, handler: F) -> Self
        where
            F: Fn(ResourceRequest, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<ReadResourceResult, Error>> + Send + 'static
    {
        self.register(move |services| services.resource_registry().register_resource(resource, handler))
    }

    /// Add a resource template, optionally with completion for its placeholders
    pub fn with_resource_template<F, Fut>(
        self,
        template: ResourceTemplate,
        handler: F,
        completion: Option<CompletionHandler>
    )
        -> Self
        where
            F: Fn(ResourceRequest, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<ReadResourceResult, Error>> + Send + 'static
    {
        self.register(move |services| {
            let registry = services.resource_registry();
            match completion {
                Some(completion) =>
                    registry.register_template_with_completion(template, handler, completion),
                None => registry.register_template(template, handler),
            }
        })
    }

    /// Add a prompt, optionally with completion for its arguments
    pub fn with_prompt<F, Fut>(
        self,
        prompt: Prompt,
        handler: F,
        completion: Option<CompletionHandler>
    )
        -> Self
        where
            F: Fn(HashMap<String, String>, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<GetPromptResult, Error>> + Send + 'static
    {
        self.register(move |services| {
            let manager = services.prompt_manager();
            match completion {
                Some(completion) => manager.register_prompt_with_completion(prompt, handler, completion),
                None => manager.register_prompt(prompt, handler),
            }
        })
    }

    /// Build the server, running every registration in order
    pub fn build(self) -> Result<Server, Error> {
        let services = ServiceProvider::new(
            Arc::new(ResourceRegistry::new(self.resource_capabilities)),
            Arc::new(ToolRegistry::new(self.tool_capabilities)),
            Arc::new(PromptManager::new(self.prompt_capabilities))
        );

        for registration in self.registrations {
            if let Err(e) = registration(&services) {
                warn!("Registration failed: {}", e);
                return Err(e);
            }
        }

        info!(
            "Built server {} {} with {} tools",
            self.config.server_name,
            self.config.server_version,
            services.tool_registry().len()
        );
        Ok(Server {
            services,
            config: Arc::new(self.config),
        })
    }
}

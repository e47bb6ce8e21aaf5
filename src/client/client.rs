//! Client core
//!
//! The `Client` performs the `initialize` handshake over a transport and then
//! offers typed methods for every client-to-server request. Requests from the
//! server (elicitation and sampling) are answered by the handlers given to the
//! `ClientBuilder`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{ Map, Value };
use std::collections::HashMap;
use std::sync::{ Arc, Mutex };
use std::time::Duration;
use tracing::{ debug, info, warn };

use crate::client::handlers::{ ClientRouteHandler, ElicitationHandler, SamplingHandler };
use crate::client::notification::NotificationRouter;
use crate::client::progress::ProgressTracker;
use crate::protocol::{
    CallToolParams,
    CallToolResult,
    ClientCapabilities,
    CompleteArgument,
    CompleteParams,
    CompleteResult,
    EmptyResult,
    Error,
    GetPromptParams,
    GetPromptResult,
    Implementation,
    InitializeParams,
    InitializeResult,
    JSONRPCNotification,
    ListPromptsResult,
    ListResourceTemplatesResult,
    ListResourcesResult,
    ListToolsResult,
    LoggingLevel,
    Method,
    PaginatedRequestParams,
    ProgressToken,
    ReadResourceParams,
    ReadResourceResult,
    Reference,
    ServerCapabilities,
    SetLevelParams,
    PROTOCOL_VERSION,
};
use crate::session::{ Peer, Session };
use crate::transport::Transport;

/// Default request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT: u64 = 30;

/// Configuration for the client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for requests
    pub request_timeout: Duration,
    /// Name sent in `clientInfo`
    pub client_name: String,
    /// Version sent in `clientInfo`
    pub client_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT),
            client_name: "mcp-duplex-client".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Builder for creating Client instances with custom configuration
pub struct ClientBuilder {
    config: ClientConfig,
    elicitation: Option<Arc<dyn ElicitationHandler>>,
    sampling: Option<Arc<dyn SamplingHandler>>,
    notifications: Arc<NotificationRouter>,
    forward_logs: bool,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            elicitation: None,
            sampling: None,
            notifications: Arc::new(NotificationRouter::new()),
            forward_logs: true,
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.config.client_name = name.into();
        self
    }

    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.config.client_version = version.into();
        self
    }

    /// Answer elicitation requests; also declares the capability
    pub fn with_elicitation_handler<H>(mut self, handler: H) -> Self where H: ElicitationHandler + 'static {
        self.elicitation = Some(Arc::new(handler));
        self
    }

    /// Answer sampling requests; also declares the capability
    pub fn with_sampling_handler<H>(mut self, handler: H) -> Self where H: SamplingHandler + 'static {
        self.sampling = Some(Arc::new(handler));
        self
    }

    /// Register a notification handler before connecting
    pub fn on_notification<F, Fut>(self, method: impl Into<String>, handler: F) -> Self
        where
            F: Fn(JSONRPCNotification) -> Fut + Send + Sync + 'static,
            Fut: std::future::Future<Output = Result<(), Error>> + Send + 'static
    {
        self.notifications.register_handler(method, handler);
        self
    }

    /// Whether server log messages become tracing events (on by default)
    pub fn with_log_forwarding(mut self, forward: bool) -> Self {
        self.forward_logs = forward;
        self
    }

    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            sampling: self.sampling.as_ref().map(|_| HashMap::new()),
            elicitation: self.elicitation.as_ref().map(|_| HashMap::new()),
            experimental: None,
        }
    }

    /// Start a session on `transport` and run the handshake
    pub async fn connect<T>(self, transport: T) -> Result<Client, Error> where T: Transport + 'static {
        if self.forward_logs {
            self.notifications.forward_logs_to_tracing();
        }

        let capabilities = self.capabilities();
        let progress = Arc::new(ProgressTracker::new());
        let handler = ClientRouteHandler::new(
            self.elicitation,
            self.sampling,
            self.notifications.clone(),
            progress.clone()
        );
        let session = Session::start(Arc::new(transport), Arc::new(handler), self.config.request_timeout);
        let peer = session.peer().clone();

        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities,
            client_info: Implementation {
                name: self.config.client_name.clone(),
                version: self.config.client_version.clone(),
            },
        };
        let server: InitializeResult = match peer.send_request(Method::Initialize.as_str(), &params).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Initialization failed: {}", e);
                let _ = peer.close().await;
                return Err(e);
            }
        };
        if server.protocol_version != PROTOCOL_VERSION {
            warn!("Server answered with protocol {}", server.protocol_version);
        }
        peer.send_notification(Method::NotificationsInitialized.as_str(), &Map::new()).await?;

        info!("Connected to {} {}", server.server_info.name, server.server_info.version);
        Ok(Client {
            peer,
            session: Mutex::new(Some(session)),
            notifications: self.notifications,
            progress,
            server,
            config: self.config,
        })
    }
}

/// Main client for protocol communication
pub struct Client {
    peer: Peer,
    session: Mutex<Option<Session>>,
    notifications: Arc<NotificationRouter>,
    progress: Arc<ProgressTracker>,
    server: InitializeResult,
    config: ClientConfig,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The server's `initialize` result
    pub fn initialize_result(&self) -> &InitializeResult {
        &self.server
    }

    pub fn server_info(&self) -> &Implementation {
        &self.server.server_info
    }

    pub fn server_capabilities(&self) -> &ServerCapabilities {
        &self.server.capabilities
    }

    pub fn instructions(&self) -> Option<&str> {
        self.server.instructions.as_deref()
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn notifications(&self) -> &Arc<NotificationRouter> {
        &self.notifications
    }

    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    pub fn is_connected(&self) -> bool {
        self.peer.is_connected()
    }

    /// Send a request and deserialize its result
    pub async fn send_request<P, R>(&self, method: &str, params: &P) -> Result<R, Error>
        where P: Serialize + ?Sized, R: DeserializeOwned
    {
        self.peer.send_request(method, params).await
    }

    pub async fn ping(&self) -> Result<(), Error> {
        let _: EmptyResult = self.send_request(Method::Ping.as_str(), &Map::new()).await?;
        Ok(())
    }

    pub async fn list_tools(&self) -> Result<ListToolsResult, Error> {
        self.send_request(Method::ToolsList.as_str(), &PaginatedRequestParams::default()).await
    }

    /// Call a tool; failures of the tool itself come back as `isError` results
    pub async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<CallToolResult, Error> {
        self.call(CallToolParams::new(name, arguments)).await
    }

    /// Call a tool asking for progress under `token`
    pub async fn call_tool_with_progress(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        token: impl Into<ProgressToken>
    ) -> Result<CallToolResult, Error> {
        self.call(CallToolParams::new(name, arguments).with_progress_token(token)).await
    }

    pub async fn call(&self, params: CallToolParams) -> Result<CallToolResult, Error> {
        debug!("Calling tool {}", params.name);
        self.send_request(Method::ToolsCall.as_str(), &params).await
    }

    pub async fn list_resources(&self) -> Result<ListResourcesResult, Error> {
        self.send_request(Method::ResourcesList.as_str(), &PaginatedRequestParams::default()).await
    }

    pub async fn list_resource_templates(&self) -> Result<ListResourceTemplatesResult, Error> {
        self.send_request(
            Method::ResourcesTemplatesList.as_str(),
            &PaginatedRequestParams::default()
        ).await
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, Error> {
        let params = ReadResourceParams { uri: uri.to_string() };
        self.send_request(Method::ResourcesRead.as_str(), &params).await
    }

    pub async fn list_prompts(&self) -> Result<ListPromptsResult, Error> {
        self.send_request(Method::PromptsList.as_str(), &PaginatedRequestParams::default()).await
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>
    ) -> Result<GetPromptResult, Error> {
        let params = GetPromptParams {
            name: name.to_string(),
            arguments,
        };
        self.send_request(Method::PromptsGet.as_str(), &params).await
    }

    /// Ask for completions of `argument` given its partial `value`
    pub async fn complete(
        &self,
        reference: Reference,
        argument: &str,
        value: &str
    ) -> Result<CompleteResult, Error> {
        let params = CompleteParams {
            reference,
            argument: CompleteArgument {
                name: argument.to_string(),
                value: value.to_string(),
            },
        };
        self.send_request(Method::CompletionComplete.as_str(), &params).await
    }

    /// Set the minimum level of log messages the server sends
    pub async fn set_logging_level(&self, level: LoggingLevel) -> Result<(), Error> {
        let _: EmptyResult = self.send_request(
            Method::LoggingSetLevel.as_str(),
            &SetLevelParams { level }
        ).await?;
        Ok(())
    }

    /// Close the connection and wait for the session to stop
    pub async fn close(&self) -> Result<(), Error> {
        self.peer.close().await?;
        let session = self.session.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(session) = session {
            session.wait().await?;
        }
        info!("Client closed");
        Ok(())
    }
}

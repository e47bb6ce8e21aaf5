//! Server route handler
//!
//! Maps each client request to the service that answers it. One route handler
//! exists per connection; the services behind it are shared.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{ debug, info, warn };

use crate::protocol::{
    CallToolParams,
    CancelledParams,
    CompleteParams,
    EmptyResult,
    Error,
    GetPromptParams,
    Implementation,
    InitializeParams,
    InitializeResult,
    JSONRPCNotification,
    JSONRPCRequest,
    ListPromptsResult,
    ListResourceTemplatesResult,
    ListResourcesResult,
    ListToolsResult,
    Method,
    MethodDirection,
    ReadResourceParams,
    SetLevelParams,
    PROTOCOL_VERSION,
};
use crate::server::context::{ ConnectionState, RequestContext, RequestState };
use crate::server::server::ServerConfig;
use crate::server::services::ServiceProvider;
use crate::session::{ MessageHandler, Peer };

/// Dispatches client requests to the registries
pub struct ServerRouteHandler {
    services: ServiceProvider,
    config: Arc<ServerConfig>,
    connection: Arc<ConnectionState>,
}

impl ServerRouteHandler {
    pub fn new(services: ServiceProvider, config: Arc<ServerConfig>, connection: Arc<ConnectionState>) -> Self {
        Self { services, config, connection }
    }

    pub fn connection(&self) -> &Arc<ConnectionState> {
        &self.connection
    }

    fn initialize(&self, params: InitializeParams) -> InitializeResult {
        info!(
            "Client {} {} connected (protocol {})",
            params.client_info.name,
            params.client_info.version,
            params.protocol_version
        );
        if params.protocol_version != PROTOCOL_VERSION {
            warn!(
                "Client requested protocol {}, answering with {}",
                params.protocol_version,
                PROTOCOL_VERSION
            );
        }
        self.connection.set_client(params.client_info, params.capabilities);

        InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: self.services.capabilities(),
            server_info: Implementation {
                name: self.config.server_name.clone(),
                version: self.config.server_version.clone(),
            },
            instructions: self.config.instructions.clone(),
        }
    }

    async fn route(&self, method: Method, request: &JSONRPCRequest, ctx: RequestContext) -> Result<Value, Error> {
        match method {
            Method::Initialize => to_value(self.initialize(request.parse_params()?)),
            Method::Ping => to_value(EmptyResult {}),
            Method::ToolsList =>
                to_value(ListToolsResult {
                    tools: self.services.tool_registry().list_tools(),
                    next_cursor: None,
                }),
            Method::ToolsCall => {
                let params: CallToolParams = request.parse_params()?;
                to_value(self.services.tool_registry().call_tool(params, ctx).await?)
            }
            Method::ResourcesList =>
                to_value(ListResourcesResult {
                    resources: self.services.resource_registry().list_resources(),
                    next_cursor: None,
                }),
            Method::ResourcesTemplatesList =>
                to_value(ListResourceTemplatesResult {
                    resource_templates: self.services.resource_registry().list_templates(),
                    next_cursor: None,
                }),
            Method::ResourcesRead => {
                let params: ReadResourceParams = request.parse_params()?;
                to_value(self.services.resource_registry().read_resource(&params.uri, ctx).await?)
            }
            Method::PromptsList =>
                to_value(ListPromptsResult {
                    prompts: self.services.prompt_manager().list_prompts(),
                    next_cursor: None,
                }),
            Method::PromptsGet => {
                let params: GetPromptParams = request.parse_params()?;
                let result = self.services
                    .prompt_manager()
                    .get_prompt(&params.name, params.arguments, ctx).await?;
                to_value(result)
            }
            Method::CompletionComplete => {
                let params: CompleteParams = request.parse_params()?;
                to_value(self.services.complete(params).await?)
            }
            Method::LoggingSetLevel => {
                let params: SetLevelParams = request.parse_params()?;
                self.connection.set_log_level(params.level);
                to_value(EmptyResult {})
            }
            other => Err(Error::MethodNotFound(other.as_str().to_string())),
        }
    }
}

fn to_value<T>(result: T) -> Result<Value, Error> where T: Serialize {
    Ok(serde_json::to_value(result)?)
}

/// Parse the method name, refusing methods only the server may send
fn server_method(name: &str) -> Result<Method, Error> {
    let method: Method = name.parse()?;
    if method.is_notification() || method.direction() == MethodDirection::ServerToClient {
        return Err(Error::MethodNotFound(name.to_string()));
    }
    Ok(method)
}

#[async_trait]
impl MessageHandler for ServerRouteHandler {
    async fn handle_request(&self, request: JSONRPCRequest, peer: Peer) -> Result<Value, Error> {
        let method = server_method(&request.method)?;

        let ctx = RequestContext::new(
            request.id.clone(),
            method.as_str(),
            request.progress_token(),
            peer,
            self.connection.clone(),
            self.config.callback_timeout
        );
        ctx.state_cell().transition(RequestState::Dispatching);
        debug!("Dispatching {} ({})", method, request.id);

        let result = self.route(method, &request, ctx.clone()).await;
        let terminal = if result.is_ok() { RequestState::Completed } else { RequestState::Failed };
        ctx.state_cell().transition(terminal);
        result
    }

    async fn handle_notification(&self, notification: JSONRPCNotification, _peer: Peer) {
        match notification.method.parse::<Method>() {
            Ok(Method::NotificationsInitialized) => {
                info!("Client finished initialization");
            }
            Ok(Method::NotificationsCancelled) => {
                match notification.parse_params::<CancelledParams>() {
                    Ok(params) =>
                        info!(
                            "Client cancelled request {}: {}",
                            params.request_id,
                            params.reason.as_deref().unwrap_or("no reason")
                        ),
                    Err(e) => warn!("Invalid cancellation notification: {}", e),
                }
            }
            _ => debug!("Ignoring notification {}", notification.method),
        }
    }
}

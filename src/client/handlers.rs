//! Client message handlers
//!
//! Answers the requests a server sends to the client (elicitation, sampling
//! and ping) and feeds incoming notifications to the router.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{ debug, warn };

use crate::client::notification::NotificationRouter;
use crate::client::progress::ProgressTracker;
use crate::protocol::{
    CreateMessageParams,
    CreateMessageResult,
    ElicitRequestParams,
    ElicitResult,
    EmptyResult,
    Error,
    JSONRPCNotification,
    JSONRPCRequest,
    Method,
    ProgressParams,
};
use crate::session::{ MessageHandler, Peer };

/// Answers `elicitation/create` on behalf of the user
#[async_trait]
pub trait ElicitationHandler: Send + Sync {
    async fn elicit(&self, params: ElicitRequestParams) -> Result<ElicitResult, Error>;
}

#[async_trait]
impl<F, Fut> ElicitationHandler for F
    where
        F: Fn(ElicitRequestParams) -> Fut + Send + Sync,
        Fut: Future<Output = Result<ElicitResult, Error>> + Send
{
    async fn elicit(&self, params: ElicitRequestParams) -> Result<ElicitResult, Error> {
        self(params).await
    }
}

/// Answers `sampling/createMessage` using the client's model
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    async fn create_message(&self, params: CreateMessageParams) -> Result<CreateMessageResult, Error>;
}

#[async_trait]
impl<F, Fut> SamplingHandler for F
    where
        F: Fn(CreateMessageParams) -> Fut + Send + Sync,
        Fut: Future<Output = Result<CreateMessageResult, Error>> + Send
{
    async fn create_message(&self, params: CreateMessageParams) -> Result<CreateMessageResult, Error> {
        self(params).await
    }
}

/// The client side `MessageHandler`
pub struct ClientRouteHandler {
    elicitation: Option<Arc<dyn ElicitationHandler>>,
    sampling: Option<Arc<dyn SamplingHandler>>,
    notifications: Arc<NotificationRouter>,
    progress: Arc<ProgressTracker>,
}

impl ClientRouteHandler {
    pub fn new(
        elicitation: Option<Arc<dyn ElicitationHandler>>,
        sampling: Option<Arc<dyn SamplingHandler>>,
        notifications: Arc<NotificationRouter>,
        progress: Arc<ProgressTracker>
    ) -> Self {
        Self {
            elicitation,
            sampling,
            notifications,
            progress,
        }
    }
}

#[async_trait]
impl MessageHandler for ClientRouteHandler {
    async fn handle_request(&self, request: JSONRPCRequest, _peer: Peer) -> Result<Value, Error> {
        let method: Method = request.method.parse()?;
        debug!("Server request {} ({})", method, request.id);

        match method {
            Method::Ping => Ok(serde_json::to_value(EmptyResult {})?),
            Method::ElicitationCreate => {
                let handler = self.elicitation
                    .as_ref()
                    .ok_or_else(|| Error::MethodNotFound(method.as_str().to_string()))?;
                let result = handler.elicit(request.parse_params()?).await?.normalized();
                Ok(serde_json::to_value(result)?)
            }
            Method::SamplingCreateMessage => {
                let handler = self.sampling
                    .as_ref()
                    .ok_or_else(|| Error::MethodNotFound(method.as_str().to_string()))?;
                let result = handler.create_message(request.parse_params()?).await?;
                Ok(serde_json::to_value(result)?)
            }
            other => Err(Error::MethodNotFound(other.as_str().to_string())),
        }
    }

    async fn handle_notification(&self, notification: JSONRPCNotification, _peer: Peer) {
        if notification.method == Method::NotificationsProgress.as_str() {
            match notification.parse_params::<ProgressParams>() {
                Ok(params) => self.progress.record(params),
                Err(e) => warn!("Invalid progress notification: {}", e),
            }
        }
        self.notifications.handle_notification(notification).await;
    }
}

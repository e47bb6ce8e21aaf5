//! Client notification handling
//!
//! Dispatches incoming notifications to handlers registered per method.
//! Handlers run one after another in arrival order.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{ Arc, RwLock };
use tokio::sync::broadcast;
use tracing::{ debug, error, info, warn };

use crate::protocol::{ Error, JSONRPCNotification, LoggingLevel, LoggingMessageParams, Method };

/// Method key that matches every notification
pub const ANY_METHOD: &str = "*";

/// Type alias for a notification handler function
pub type NotificationHandlerFn = Arc<
    dyn (Fn(JSONRPCNotification) -> BoxFuture<'static, Result<(), Error>>) + Send + Sync
>;

/// Router for protocol notifications
pub struct NotificationRouter {
    handlers: RwLock<HashMap<String, Vec<NotificationHandlerFn>>>,
    broadcast_tx: broadcast::Sender<JSONRPCNotification>,
}

impl Default for NotificationRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationRouter {
    /// Create a new notification router
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(100);
        Self {
            handlers: RwLock::new(HashMap::new()),
            broadcast_tx,
        }
    }

    /// Register a handler for `method`, or for every method with `ANY_METHOD`
    pub fn register_handler<F, Fut>(&self, method: impl Into<String>, handler: F)
        where
            F: Fn(JSONRPCNotification) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<(), Error>> + Send + 'static
    {
        let method = method.into();
        let handler: NotificationHandlerFn = Arc::new(move |notification: JSONRPCNotification| {
            handler(notification).boxed()
        });
        self.handlers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .entry(method.clone())
            .or_default()
            .push(handler);
        debug!("Registered handler for notification method: {}", method);
    }

    /// Receive a copy of every notification routed from now on
    pub fn subscribe(&self) -> broadcast::Receiver<JSONRPCNotification> {
        self.broadcast_tx.subscribe()
    }

    /// Re-emit `notifications/message` as tracing events
    pub fn forward_logs_to_tracing(&self) {
        self.register_handler(Method::NotificationsMessage.as_str(), |notification| async move {
            let params: LoggingMessageParams = notification.parse_params()?;
            log_to_tracing(&params);
            Ok(())
        });
    }

    /// Handle a notification by dispatching to registered handlers
    pub async fn handle_notification(&self, notification: JSONRPCNotification) {
        // No subscribers is not an error
        let _ = self.broadcast_tx.send(notification.clone());

        let handlers: Vec<NotificationHandlerFn> = {
            let handlers = self.handlers.read().unwrap_or_else(|p| p.into_inner());
            handlers
                .get(&notification.method)
                .into_iter()
                .chain(handlers.get(ANY_METHOD))
                .flatten()
                .cloned()
                .collect()
        };

        if handlers.is_empty() {
            debug!("No handlers found for notification method: {}", notification.method);
            return;
        }

        for handler in handlers {
            if let Err(e) = handler(notification.clone()).await {
                error!("Error in notification handler for {}: {}", notification.method, e);
            }
        }
    }
}

fn log_to_tracing(params: &LoggingMessageParams) {
    let logger = params.logger.as_deref().unwrap_or("server");
    let data = match &params.data {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    match params.level {
        LoggingLevel::Debug => debug!(logger, "{}", data),
        LoggingLevel::Info | LoggingLevel::Notice => info!(logger, "{}", data),
        LoggingLevel::Warning => warn!(logger, "{}", data),
        _ => error!(logger, level = %params.level, "{}", data),
    }
}

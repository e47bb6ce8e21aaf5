//! Progress and log notifications sent while a request is being served.

use serde::Serialize;
use std::sync::{ Arc, Mutex };
use tracing::{ debug, warn };

use crate::protocol::{
    Error,
    LoggingLevel,
    LoggingMessageParams,
    Method,
    ProgressParams,
    ProgressToken,
};
use crate::server::context::{ ConnectionState, StateCell };
use crate::session::Peer;

/// Sends notifications on behalf of one request.
///
/// Notifications are queued on the transport ahead of the request's response,
/// so the client always sees them first. Once the request has finished,
/// further notifications are dropped.
#[derive(Clone)]
pub struct Notifier {
    peer: Peer,
    progress_token: Option<ProgressToken>,
    last_progress: Arc<Mutex<Option<f64>>>,
    state: StateCell,
    connection: Arc<ConnectionState>,
}

impl Notifier {
    pub(crate) fn new(
        peer: Peer,
        progress_token: Option<ProgressToken>,
        state: StateCell,
        connection: Arc<ConnectionState>
    ) -> Self {
        Self {
            peer,
            progress_token,
            last_progress: Arc::new(Mutex::new(None)),
            state,
            connection,
        }
    }

    pub fn progress_token(&self) -> Option<&ProgressToken> {
        self.progress_token.as_ref()
    }

    fn begin(&self, kind: &str) -> bool {
        if !self.state.begin_notification() {
            warn!("Dropping {} notification for a finished request", kind);
            return false;
        }
        true
    }

    fn end(&self) {
        self.state.end_notification();
    }

    /// Emit `notifications/progress`.
    ///
    /// Without a progress token on the request nothing is sent. A value lower
    /// than the previous one for this request is dropped.
    pub async fn progress(
        &self,
        progress: f64,
        total: Option<f64>,
        message: Option<&str>
    ) -> Result<(), Error> {
        let Some(token) = self.progress_token.clone() else {
            debug!("No progress token, skipping progress {}", progress);
            return Ok(());
        };

        {
            let mut last = self.last_progress.lock().unwrap_or_else(|p| p.into_inner());
            if progress.is_nan() {
                warn!("Dropping progress NaN for token {}", token);
                return Ok(());
            }
            if let Some(previous) = *last {
                if progress < previous {
                    warn!("Dropping progress {} for token {}: below {}", progress, token, previous);
                    return Ok(());
                }
            }
            *last = Some(progress);
        }

        if !self.begin("progress") {
            return Ok(());
        }

        let params = ProgressParams {
            progress_token: token,
            progress,
            total,
            message: message.map(str::to_string),
        };
        let sent = self.peer.send_notification(Method::NotificationsProgress.as_str(), &params).await;
        self.end();
        sent
    }

    /// Emit `notifications/message` if `level` passes the client's threshold
    pub async fn log<D>(&self, level: LoggingLevel, logger: Option<&str>, data: D) -> Result<(), Error>
        where D: Serialize
    {
        if level < self.connection.log_level() {
            debug!("Log message at {} filtered by client level", level);
            return Ok(());
        }

        if !self.begin("log") {
            return Ok(());
        }

        let params = LoggingMessageParams {
            level,
            logger: logger.map(str::to_string),
            data: serde_json::to_value(data)?,
        };
        let sent = self.peer.send_notification(Method::NotificationsMessage.as_str(), &params).await;
        self.end();
        sent
    }
}

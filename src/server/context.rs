//! Per-connection and per-request server state.
//!
//! Every incoming request gets a `RequestContext`. Handlers use it to report
//! progress, send log messages, and call back into the client.

use serde::Serialize;
use serde_json::Value;
use std::sync::{ Arc, Mutex, MutexGuard, RwLock };
use tracing::debug;

use crate::protocol::{
    ClientCapabilities,
    CreateMessageParams,
    CreateMessageResult,
    ElicitResult,
    Error,
    Implementation,
    LoggingLevel,
    ProgressToken,
    RequestId,
};
use crate::server::callback::CallbackBridge;
use crate::server::notifier::Notifier;
use crate::session::Peer;

/// Lifecycle of a single request on the server.
///
/// `Received -> Dispatching -> (EmittingNotifications | AwaitingCallback)* ->
/// Completed | Failed`. The terminal states are entered exactly once, when the
/// response is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    Received,
    Dispatching,
    EmittingNotifications,
    AwaitingCallback,
    Completed,
    Failed,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Failed)
    }
}

#[derive(Debug, Default)]
struct StateInner {
    state: RequestState,
    /// Callbacks sent and not yet answered
    outstanding_callbacks: usize,
}

impl StateInner {
    /// The state to fall back to once a notification or callback is done
    fn settle(&mut self) {
        if !self.state.is_terminal() {
            self.state = if self.outstanding_callbacks > 0 {
                RequestState::AwaitingCallback
            } else {
                RequestState::Dispatching
            };
        }
    }
}

/// Shared, lock-protected `RequestState`
#[derive(Debug, Clone, Default)]
pub(crate) struct StateCell(Arc<Mutex<StateInner>>);

impl StateCell {
    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn get(&self) -> RequestState {
        self.lock().state
    }

    /// Move to `next` unless the request already finished
    pub(crate) fn transition(&self, next: RequestState) -> bool {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return false;
        }
        inner.state = next;
        true
    }

    pub(crate) fn begin_notification(&self) -> bool {
        self.transition(RequestState::EmittingNotifications)
    }

    pub(crate) fn end_notification(&self) {
        self.lock().settle();
    }

    pub(crate) fn begin_callback(&self) -> bool {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return false;
        }
        inner.outstanding_callbacks += 1;
        inner.state = RequestState::AwaitingCallback;
        true
    }

    /// Back to `Dispatching` only once no other callback is outstanding
    pub(crate) fn end_callback(&self) {
        let mut inner = self.lock();
        inner.outstanding_callbacks = inner.outstanding_callbacks.saturating_sub(1);
        inner.settle();
    }
}

/// What the server knows about the connected client
#[derive(Debug)]
pub struct ConnectionState {
    client_info: RwLock<Option<Implementation>>,
    client_capabilities: RwLock<Option<ClientCapabilities>>,
    log_level: RwLock<LoggingLevel>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            client_info: RwLock::new(None),
            client_capabilities: RwLock::new(None),
            log_level: RwLock::new(LoggingLevel::Debug),
        }
    }
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the client's `initialize` parameters
    pub fn set_client(&self, info: Implementation, capabilities: ClientCapabilities) {
        *self.client_info.write().unwrap_or_else(|p| p.into_inner()) = Some(info);
        *self.client_capabilities.write().unwrap_or_else(|p| p.into_inner()) = Some(capabilities);
    }

    pub fn client_info(&self) -> Option<Implementation> {
        self.client_info
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// The client's declared capabilities, or `None` before `initialize`
    pub fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.client_capabilities
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn supports_elicitation(&self) -> bool {
        self.client_capabilities().is_some_and(|caps| caps.elicitation.is_some())
    }

    pub fn supports_sampling(&self) -> bool {
        self.client_capabilities().is_some_and(|caps| caps.sampling.is_some())
    }

    /// Minimum level of log notifications forwarded to the client
    pub fn log_level(&self) -> LoggingLevel {
        *self.log_level.read().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_log_level(&self, level: LoggingLevel) {
        debug!("Client log level set to {}", level);
        *self.log_level.write().unwrap_or_else(|p| p.into_inner()) = level;
    }
}

/// Everything a handler can do while serving one request
#[derive(Clone)]
pub struct RequestContext {
    request_id: RequestId,
    method: String,
    state: StateCell,
    notifier: Notifier,
    callbacks: CallbackBridge,
    connection: Arc<ConnectionState>,
}

impl RequestContext {
    pub(crate) fn new(
        request_id: RequestId,
        method: impl Into<String>,
        progress_token: Option<ProgressToken>,
        peer: Peer,
        connection: Arc<ConnectionState>,
        callback_timeout: std::time::Duration
    ) -> Self {
        let state = StateCell::default();
        Self {
            notifier: Notifier::new(
                peer.clone(),
                progress_token,
                state.clone(),
                connection.clone()
            ),
            callbacks: CallbackBridge::new(
                peer,
                callback_timeout,
                state.clone(),
                connection.clone()
            ),
            request_id,
            method: method.into(),
            state,
            connection,
        }
    }

    /// The id of the request being served
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// The progress token the client attached, if any
    pub fn progress_token(&self) -> Option<&ProgressToken> {
        self.notifier.progress_token()
    }

    pub fn state(&self) -> RequestState {
        self.state.get()
    }

    pub(crate) fn state_cell(&self) -> &StateCell {
        &self.state
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn callbacks(&self) -> &CallbackBridge {
        &self.callbacks
    }

    pub fn connection(&self) -> &Arc<ConnectionState> {
        &self.connection
    }

    pub fn supports_elicitation(&self) -> bool {
        self.connection.supports_elicitation()
    }

    pub fn supports_sampling(&self) -> bool {
        self.connection.supports_sampling()
    }

    /// Report progress; a no-op when the client did not ask for progress
    pub async fn progress(
        &self,
        progress: f64,
        total: Option<f64>,
        message: Option<&str>
    ) -> Result<(), Error> {
        self.notifier.progress(progress, total, message).await
    }

    /// Send a log message to the client
    pub async fn log<D>(&self, level: LoggingLevel, logger: Option<&str>, data: D) -> Result<(), Error>
        where D: Serialize
    {
        self.notifier.log(level, logger, data).await
    }

    /// Ask the user for structured input
    pub async fn elicit(
        &self,
        message: impl Into<String>,
        requested_schema: Value
    ) -> Result<ElicitResult, Error> {
        self.callbacks.elicit(message, requested_schema).await
    }

    /// Ask the client's model for a completion
    pub async fn create_message(
        &self,
        params: CreateMessageParams
    ) -> Result<CreateMessageResult, Error> {
        self.callbacks.create_message(params).await
    }

    /// Sample a single text answer for `prompt`
    pub async fn sample(&self, prompt: &str) -> Result<String, Error> {
        self.callbacks.sample(prompt).await
    }
}

#[cfg(test)]
impl RequestContext {
    /// A context for unit tests; its peer writes into the returned transport
    pub(crate) fn detached(method: &str) -> (Self, crate::transport::StreamTransport) {
        let (local, remote) = crate::transport::StreamTransport::pair();
        let peer = Peer::new(Arc::new(local), std::time::Duration::from_secs(1));
        let ctx = RequestContext::new(
            RequestId::Number(1),
            method,
            None,
            peer,
            Arc::new(ConnectionState::new()),
            std::time::Duration::from_secs(1)
        );
        (ctx, remote)
    }
}

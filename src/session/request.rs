//! Request Management
//!
//! This module implements request tracking and correlation. It generates
//! request IDs, tracks pending requests, and matches responses to their
//! corresponding requests. Both the client and the server use it: the server
//! for the elicitation and sampling requests it sends back to the client.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{ AtomicBool, AtomicI64, Ordering };
use std::sync::{ Mutex, MutexGuard };
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{ debug, warn };

use crate::protocol::{
    Error,
    JSONRPCError,
    JSONRPCMessage,
    JSONRPCRequest,
    JSONRPCResponse,
    RequestId,
};
use crate::transport::Transport;

type ResponseSender = oneshot::Sender<Result<Value, Error>>;

/// Manager for handling requests and correlating them with responses
pub struct RequestManager {
    /// Counter for generating unique request IDs
    request_id_counter: AtomicI64,

    /// Map of pending requests by their ID
    pending_requests: Mutex<HashMap<RequestId, ResponseSender>>,

    /// Set once the connection is gone; new requests fail immediately
    closed: AtomicBool,

    /// Default timeout for requests
    default_timeout: Duration,
}

impl RequestManager {
    /// Create a new request manager
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            request_id_counter: AtomicI64::new(1),
            pending_requests: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<RequestId, ResponseSender>> {
        self.pending_requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Generate a new unique request ID
    pub fn generate_id(&self) -> RequestId {
        let id = self.request_id_counter.fetch_add(1, Ordering::SeqCst);
        RequestId::Number(id)
    }

    /// Register a pending request and get a receiver for its response
    pub fn register_request(
        &self,
        id: RequestId
    ) -> Result<oneshot::Receiver<Result<Value, Error>>, Error> {
        let (tx, rx) = oneshot::channel();

        let mut pending = self.pending();
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        pending.insert(id, tx);

        Ok(rx)
    }

    /// Drop the slot for `id` without completing it
    pub fn remove_request(&self, id: &RequestId) -> bool {
        self.pending().remove(id).is_some()
    }

    /// Complete a pending request with a result
    pub fn complete_request(&self, id: &RequestId, result: Result<Value, Error>) -> bool {
        let sender = self.pending().remove(id);

        match sender {
            Some(sender) => {
                if sender.send(result).is_err() {
                    debug!("Caller for request {} is no longer waiting", id);
                    return false;
                }
                true
            }
            None => {
                warn!("No pending request found for id {}", id);
                false
            }
        }
    }

    /// Handle a response message by matching it to a pending request
    pub fn handle_response(&self, response: JSONRPCResponse) {
        let id = response.id.clone();
        if self.complete_request(&id, Ok(response.result)) {
            debug!("Completed request {}", id);
        }
    }

    /// Handle an error message by matching it to a pending request
    pub fn handle_error(&self, error: JSONRPCError) {
        let id = error.id.clone();
        if self.complete_request(&id, Err(Error::from_error_details(error.error))) {
            debug!("Completed request {} with error", id);
        }
    }

    /// Send a request over `transport` and wait for its response.
    ///
    /// The pending slot is removed on every exit path, including when the
    /// returned future is dropped before completion.
    pub async fn send_request(
        &self,
        transport: &dyn Transport,
        method: &str,
        params: Option<Value>,
        timeout_duration: Option<Duration>
    ) -> Result<Value, Error> {
        let id = self.generate_id();
        let response_rx = self.register_request(id.clone())?;

        let _slot = scopeguard::guard(id.clone(), |id| {
            self.remove_request(&id);
        });

        let request = JSONRPCRequest::new(id.clone(), method, params);
        debug!("Sending request {} ({})", id, method);
        transport.send(&JSONRPCMessage::Request(request)).await?;

        let timeout_duration = timeout_duration.unwrap_or(self.default_timeout);
        match timeout(timeout_duration, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                warn!("Request {} ({}) timed out after {:?}", id, method, timeout_duration);
                Err(Error::Timeout(format!("{} timed out after {:?}", method, timeout_duration)))
            }
        }
    }

    /// Fail every pending request with `error` and refuse new ones
    pub fn cancel_all(&self, error: Error) {
        let drained: Vec<(RequestId, ResponseSender)> = {
            let mut pending = self.pending();
            self.closed.store(true, Ordering::SeqCst);
            pending.drain().collect()
        };

        for (id, sender) in drained {
            if sender.send(Err(error.clone())).is_err() {
                debug!("Failed to send cancellation for request {}", id);
            }
        }
    }

    /// Number of requests waiting for a response
    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for RequestManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

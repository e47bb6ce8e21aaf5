//! Session loop
//!
//! A session owns one transport and pumps it. Incoming requests are handed to
//! a `MessageHandler` in their own task. Notifications and responses share one
//! ordered worker: notifications are delivered to the handler one at a time,
//! and a response resolves the request this side sent through its `Peer` only
//! after every notification received before it has been handled.

use async_trait::async_trait;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{ Arc, Mutex, MutexGuard };
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{ debug, error, warn };

use crate::protocol::errors::to_error_message;
use crate::protocol::{
    Error,
    JSONRPCError,
    JSONRPCMessage,
    JSONRPCNotification,
    JSONRPCRequest,
    JSONRPCResponse,
    RequestId,
};
use crate::session::RequestManager;
use crate::transport::Transport;

/// Receives the requests and notifications the remote side sends.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a request. The returned value or error becomes the response.
    async fn handle_request(&self, request: JSONRPCRequest, peer: Peer) -> Result<Value, Error>;

    /// Handle a notification. Notifications are delivered sequentially and
    /// responses wait behind them, so this must not wait on a request sent
    /// through `peer`.
    async fn handle_notification(&self, notification: JSONRPCNotification, peer: Peer);
}

struct PeerInner {
    transport: Arc<dyn Transport>,
    requests: RequestManager,
    closed: CancellationToken,
}

/// Handle to the remote side of a session
#[derive(Clone)]
pub struct Peer {
    inner: Arc<PeerInner>,
}

impl Peer {
    pub(crate) fn new(transport: Arc<dyn Transport>, request_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(PeerInner {
                transport,
                requests: RequestManager::new(request_timeout),
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Send a request and deserialize the result, using the default timeout
    pub async fn send_request<P, R>(&self, method: &str, params: &P) -> Result<R, Error>
        where P: Serialize + ?Sized, R: DeserializeOwned
    {
        self.send_request_with_timeout(method, params, None).await
    }

    /// Send a request and deserialize the result
    pub async fn send_request_with_timeout<P, R>(
        &self,
        method: &str,
        params: &P,
        timeout: Option<Duration>
    )
        -> Result<R, Error>
        where P: Serialize + ?Sized, R: DeserializeOwned
    {
        let params = serde_json::to_value(params)?;
        let params = if params.is_null() { None } else { Some(params) };
        let result = self.request_value(method, params, timeout).await?;
        serde_json::from_value(result).map_err(Error::from)
    }

    /// Send a request with raw params and return the raw result
    pub async fn request_value(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>
    ) -> Result<Value, Error> {
        self.inner.requests.send_request(self.inner.transport.as_ref(), method, params, timeout).await
    }

    /// Send a notification
    pub async fn send_notification<P>(&self, method: &str, params: &P) -> Result<(), Error>
        where P: Serialize + ?Sized
    {
        let notification = JSONRPCNotification::with_params(method, params)?;
        self.send_message(JSONRPCMessage::Notification(notification)).await
    }

    /// Send an already-built message
    pub async fn send_message(&self, message: JSONRPCMessage) -> Result<(), Error> {
        self.inner.transport.send(&message).await
    }

    /// Close the transport and fail every outstanding request
    pub async fn close(&self) -> Result<(), Error> {
        self.inner.requests.cancel_all(Error::ConnectionClosed);
        self.inner.transport.close().await
    }

    /// Wait until the session loop has stopped
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }

    pub fn is_connected(&self) -> bool {
        !self.inner.closed.is_cancelled() && self.inner.transport.is_connected()
    }

    /// Number of requests this side is still waiting on
    pub fn pending_requests(&self) -> usize {
        self.inner.requests.pending_count()
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.requests.default_timeout()
    }
}

/// A running session: the peer handle plus the loop task
pub struct Session {
    peer: Peer,
    task: JoinHandle<()>,
}

impl Session {
    /// Start pumping `transport`, handing incoming traffic to `handler`
    pub fn start(
        transport: Arc<dyn Transport>,
        handler: Arc<dyn MessageHandler>,
        request_timeout: Duration
    ) -> Self {
        let peer = Peer::new(transport, request_timeout);
        let task = tokio::spawn(run(peer.clone(), handler));
        Self { peer, task }
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Wait for the session loop to finish
    pub async fn wait(self) -> Result<(), Error> {
        self.task.await.map_err(|e| Error::Internal(format!("session task failed: {}", e)))
    }
}

/// Traffic that must be seen in arrival order
enum Inbound {
    Notification(JSONRPCNotification),
    Response(JSONRPCResponse),
    Error(JSONRPCError),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn run(peer: Peer, handler: Arc<dyn MessageHandler>) {
    let in_flight: Arc<Mutex<HashSet<RequestId>>> = Arc::new(Mutex::new(HashSet::new()));
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(deliver_inbound(inbound_rx, handler.clone(), peer.clone()));

    loop {
        let message = match peer.inner.transport.receive().await {
            Ok(message) => message,
            Err(Error::ConnectionClosed) => {
                debug!("Session transport closed");
                break;
            }
            Err(e) if e.is_fatal() => {
                error!("Session transport failed: {}", e);
                break;
            }
            Err(e) => {
                warn!("Ignoring undecodable message: {}", e);
                continue;
            }
        };

        let inbound = match message {
            JSONRPCMessage::Request(request) => {
                dispatch_request(request, &handler, &peer, &in_flight).await;
                continue;
            }
            JSONRPCMessage::Notification(notification) => Inbound::Notification(notification),
            JSONRPCMessage::Response(response) => Inbound::Response(response),
            JSONRPCMessage::Error(error) => Inbound::Error(error),
        };
        if inbound_tx.send(inbound).is_err() {
            warn!("Inbound worker stopped, dropping message");
        }
    }

    // Responses still queued resolve their callers before the rest are failed
    drop(inbound_tx);
    if let Err(e) = worker.await {
        warn!("Inbound worker ended abnormally: {}", e);
    }
    peer.inner.requests.cancel_all(Error::ConnectionClosed);
    peer.inner.closed.cancel();
}

async fn dispatch_request(
    request: JSONRPCRequest,
    handler: &Arc<dyn MessageHandler>,
    peer: &Peer,
    in_flight: &Arc<Mutex<HashSet<RequestId>>>
) {
    let id = request.id.clone();

    if !lock(in_flight).insert(id.clone()) {
        warn!("Rejecting request {} ({}): id already in flight", id, request.method);
        let error = Error::InvalidRequest(format!("request id {} is already in flight", id));
        if let Err(e) = peer.send_message(to_error_message(id, &error)).await {
            warn!("Failed to reject duplicate request: {}", e);
        }
        return;
    }

    let handler = handler.clone();
    let peer = peer.clone();
    let in_flight = in_flight.clone();

    tokio::spawn(async move {
        let method = request.method.clone();
        debug!("Handling request {} ({})", id, method);

        let outcome = AssertUnwindSafe(handler.handle_request(request, peer.clone()))
            .catch_unwind().await;

        let reply = match outcome {
            Ok(Ok(result)) => JSONRPCMessage::Response(JSONRPCResponse::new(id.clone(), result)),
            Ok(Err(e)) => {
                debug!("Request {} ({}) failed: {}", id, method, e);
                to_error_message(id.clone(), &e)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Handler for {} panicked: {}", method, message);
                to_error_message(id.clone(), &Error::Internal(format!("handler panicked: {}", message)))
            }
        };

        // The id may be reused as soon as the peer sees the response.
        lock(&in_flight).remove(&id);

        if let Err(e) = peer.send_message(reply).await {
            warn!("Failed to send response for request {}: {}", id, e);
        }
    });
}

async fn deliver_inbound(
    mut rx: mpsc::UnboundedReceiver<Inbound>,
    handler: Arc<dyn MessageHandler>,
    peer: Peer
) {
    while let Some(inbound) = rx.recv().await {
        match inbound {
            Inbound::Notification(notification) => {
                let method = notification.method.clone();
                let delivered = AssertUnwindSafe(handler.handle_notification(notification, peer.clone()))
                    .catch_unwind().await;
                if let Err(payload) = delivered {
                    error!("Notification handler for {} panicked: {}", method, panic_message(payload.as_ref()));
                }
            }
            Inbound::Response(response) => peer.inner.requests.handle_response(response),
            Inbound::Error(error) => peer.inner.requests.handle_error(error),
        }
    }
}

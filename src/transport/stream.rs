//! Stream transport
//!
//! Line-delimited JSON over an `AsyncRead`/`AsyncWrite` pair. A reader task
//! decodes incoming lines into a bounded channel and a writer task drains an
//! unbounded outgoing queue, so `send` never waits for the peer.

use async_trait::async_trait;
use futures::{ SinkExt, StreamExt };
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{ AsyncRead, AsyncWrite };
use tokio::net::{ TcpStream, ToSocketAddrs };
use tokio::process::{ Child, Command };
use tokio::sync::{ mpsc, Mutex };
use tokio::task::JoinHandle;
use tokio_util::codec::{ FramedRead, FramedWrite };
use tokio_util::sync::CancellationToken;
use tracing::{ debug, error, info, warn };

use crate::protocol::{ Error, JSONRPCMessage, MessageCodec };
use crate::transport::{ Transport, TransportConfig };

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const CHILD_EXIT_TIMEOUT: Duration = Duration::from_secs(2);

/// A transport over any pair of byte streams
pub struct StreamTransport {
    /// Queue drained by the writer task
    outgoing_tx: mpsc::UnboundedSender<JSONRPCMessage>,

    /// Messages decoded by the reader task
    incoming_rx: Mutex<mpsc::Receiver<Result<JSONRPCMessage, Error>>>,

    /// Cancelled by `close`
    shutdown: CancellationToken,

    /// Cleared when the peer goes away
    connected: Arc<AtomicBool>,

    writer_task: Mutex<Option<JoinHandle<()>>>,

    /// Child process, when the transport was spawned
    child: Mutex<Option<Child>>,
}

impl StreamTransport {
    /// Create a new transport over `reader` and `writer` with default settings.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<R, W>(reader: R, writer: W) -> Self
        where R: AsyncRead + Unpin + Send + 'static, W: AsyncWrite + Unpin + Send + 'static
    {
        Self::with_config(reader, writer, TransportConfig::default())
    }

    /// Create a new transport with explicit settings
    pub fn with_config<R, W>(reader: R, writer: W, config: TransportConfig) -> Self
        where R: AsyncRead + Unpin + Send + 'static, W: AsyncWrite + Unpin + Send + 'static
    {
        let (incoming_tx, incoming_rx) = mpsc::channel(config.channel_capacity.max(1));
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let connected = Arc::new(AtomicBool::new(true));

        let codec = MessageCodec::with_max_length(config.max_frame_length);

        tokio::spawn(
            read_loop(
                FramedRead::new(reader, codec.clone()),
                incoming_tx,
                shutdown.clone(),
                connected.clone()
            )
        );
        let writer_task = tokio::spawn(
            write_loop(FramedWrite::new(writer, codec), outgoing_rx, shutdown.clone())
        );

        Self {
            outgoing_tx,
            incoming_rx: Mutex::new(incoming_rx),
            shutdown,
            connected,
            writer_task: Mutex::new(Some(writer_task)),
            child: Mutex::new(None),
        }
    }

    /// Transport over this process's stdin and stdout
    pub fn stdio() -> Self {
        info!("Starting stdio transport");
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Spawn `command` and talk to it over its stdin and stdout.
    ///
    /// The child's stderr is inherited so its logs stay visible.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>
    ) -> Result<Self, Error> {
        info!(command, ?args, "Spawning server process");

        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Transport(format!("Failed to spawn process: {}", e)))?;

        let stdin = child.stdin
            .take()
            .ok_or_else(|| Error::Transport("Failed to get stdin handle".to_string()))?;
        let stdout = child.stdout
            .take()
            .ok_or_else(|| Error::Transport("Failed to get stdout handle".to_string()))?;

        let transport = Self::new(stdout, stdin);
        transport.child
            .try_lock()
            .map_err(|_| Error::Internal("child slot unexpectedly locked".to_string()))?
            .replace(child);

        Ok(transport)
    }

    /// Connect to a TCP listener
    pub async fn connect_tcp<A>(addr: A) -> Result<Self, Error> where A: ToSocketAddrs {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_tcp(stream))
    }

    /// Transport over an accepted or connected TCP stream
    pub fn from_tcp(stream: TcpStream) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer)
    }

    /// Two transports connected to each other through an in-memory pipe
    pub fn pair() -> (Self, Self) {
        let (left, right) = tokio::io::duplex(64 * 1024);
        let (left_read, left_write) = tokio::io::split(left);
        let (right_read, right_write) = tokio::io::split(right);
        (Self::new(left_read, left_write), Self::new(right_read, right_write))
    }
}

#[async_trait]
impl Transport for StreamTransport {
    async fn send(&self, message: &JSONRPCMessage) -> Result<(), Error> {
        if self.shutdown.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }
        self.outgoing_tx.send(message.clone()).map_err(|_| Error::ConnectionClosed)
    }

    async fn receive(&self) -> Result<JSONRPCMessage, Error> {
        let mut incoming = self.incoming_rx.lock().await;
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(Error::ConnectionClosed),
            next = incoming.recv() => {
                match next {
                    Some(result) => result,
                    None => {
                        self.connected.store(false, Ordering::SeqCst);
                        Err(Error::ConnectionClosed)
                    }
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Error> {
        if self.shutdown.is_cancelled() {
            return Ok(());
        }
        debug!("Closing stream transport");
        self.shutdown.cancel();
        self.connected.store(false, Ordering::SeqCst);

        if let Some(handle) = self.writer_task.lock().await.take() {
            if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, handle).await.is_err() {
                warn!("Writer task did not finish within {:?}", WRITER_DRAIN_TIMEOUT);
            }
        }

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(CHILD_EXIT_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => debug!("Child process exited with {}", status),
                Ok(Err(e)) => warn!("Failed to wait for child process: {}", e),
                Err(_) => {
                    warn!("Child process still running, killing it");
                    child.kill().await?;
                }
            }
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.shutdown.is_cancelled()
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Decode lines from the peer until EOF, a fatal error or shutdown
async fn read_loop<R>(
    mut frames: FramedRead<R, MessageCodec>,
    tx: mpsc::Sender<Result<JSONRPCMessage, Error>>,
    shutdown: CancellationToken,
    connected: Arc<AtomicBool>
)
    where R: AsyncRead + Unpin + Send + 'static
{
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = frames.next() => next,
        };

        let (item, fatal) = match next {
            Some(Ok(Ok(message))) => (Ok(message), false),
            Some(Ok(Err(e))) => {
                warn!("Discarding malformed message: {}", e);
                (Err(e), false)
            }
            Some(Err(e)) => {
                error!("Transport read failed: {}", e);
                (Err(e), true)
            }
            None => {
                debug!("Peer closed the stream");
                break;
            }
        };

        let delivered = tokio::select! {
            _ = shutdown.cancelled() => false,
            sent = tx.send(item) => sent.is_ok(),
        };
        if !delivered || fatal {
            break;
        }
    }

    connected.store(false, Ordering::SeqCst);
}

/// Write queued messages until the queue closes or shutdown, then drain and flush
async fn write_loop<W>(
    mut sink: FramedWrite<W, MessageCodec>,
    mut rx: mpsc::UnboundedReceiver<JSONRPCMessage>,
    shutdown: CancellationToken
)
    where W: AsyncWrite + Unpin + Send + 'static
{
    loop {
        let next = tokio::select! {
            biased;
            message = rx.recv() => message,
            _ = shutdown.cancelled() => None,
        };

        let Some(message) = next else {
            break;
        };

        if let Err(e) = sink.send(message).await {
            error!("Transport write failed: {}", e);
            return;
        }
    }

    // Anything queued before close still goes out.
    rx.close();
    while let Some(message) = rx.recv().await {
        if let Err(e) = sink.send(message).await {
            error!("Transport write failed while draining: {}", e);
            return;
        }
    }

    if let Err(e) = sink.close().await {
        debug!("Failed to shut down writer: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ JSONRPCRequest, JSONRPCResponse, RequestId };
    use serde_json::json;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_receive_then_reply_then_eof() {
        let reader = Builder::new()
            .read(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n")
            .build();
        let writer = Builder::new().write(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n").build();

        let transport = StreamTransport::new(reader, writer);

        let message = transport.receive().await.unwrap();
        assert_eq!(message.method(), Some("ping"));

        let reply = JSONRPCResponse::new(RequestId::Number(1), json!({}));
        transport.send(&reply.into()).await.unwrap();

        assert!(matches!(transport.receive().await, Err(Error::ConnectionClosed)));
        assert!(!transport.is_connected());

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_line_is_not_fatal() {
        let reader = Builder::new()
            .read(b"this is not json\n")
            .read(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n")
            .build();
        let writer = Builder::new().build();

        let transport = StreamTransport::new(reader, writer);

        assert!(matches!(transport.receive().await, Err(Error::MalformedMessage(_))));
        let message = transport.receive().await.unwrap();
        assert!(message.is_notification());
        assert!(matches!(transport.receive().await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_pair_delivers_in_order() {
        let (left, right) = StreamTransport::pair();

        for id in 1..=3 {
            let request = JSONRPCRequest::new(RequestId::Number(id), "ping", None);
            left.send(&request.into()).await.unwrap();
        }

        for id in 1..=3 {
            let message = right.receive().await.unwrap();
            assert_eq!(message.id(), Some(&RequestId::Number(id)));
        }
    }

    #[tokio::test]
    async fn test_close_flushes_and_ends_peer() {
        let (left, right) = StreamTransport::pair();

        let request = JSONRPCRequest::new(RequestId::Number(1), "ping", None);
        left.send(&request.into()).await.unwrap();
        left.close().await.unwrap();

        assert!(matches!(left.send(&JSONRPCRequest::new(RequestId::Number(2), "ping", None).into()).await, Err(Error::ConnectionClosed)));
        assert!(matches!(left.receive().await, Err(Error::ConnectionClosed)));

        // queued before close, so still delivered
        let message = right.receive().await.unwrap();
        assert_eq!(message.id(), Some(&RequestId::Number(1)));
        assert!(matches!(right.receive().await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_pending_receive_fails_on_close() {
        let (left, _right) = StreamTransport::pair();
        let left = Arc::new(left);

        let waiting = {
            let left = left.clone();
            tokio::spawn(async move { left.receive().await })
        };
        tokio::task::yield_now().await;
        left.close().await.unwrap();

        let result = waiting.await.unwrap();
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }
}

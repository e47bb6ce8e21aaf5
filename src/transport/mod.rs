//! Transport module
//!
//! A transport moves whole JSON-RPC messages between two peers. The only
//! implementation shipped is `StreamTransport`, which frames messages as
//! newline-delimited JSON over any byte stream: stdio, a child process, TCP or
//! an in-memory duplex pipe.

use async_trait::async_trait;

use crate::protocol::codec::DEFAULT_MAX_FRAME_LENGTH;
use crate::protocol::{ Error, JSONRPCMessage };

pub mod stream;

pub use stream::StreamTransport;

/// Transport trait for bidirectional message channels.
///
/// All methods take `&self`, so a single transport can be shared between the
/// task that receives and any number of tasks that send.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Queue a message for delivery. Messages from one sender keep their order.
    async fn send(&self, message: &JSONRPCMessage) -> Result<(), Error>;

    /// Wait for the next message from the peer.
    ///
    /// Returns `Error::ConnectionClosed` once the transport is closed or the
    /// peer has gone away and every buffered message was delivered. Other
    /// errors concern a single incoming message and receiving may continue.
    async fn receive(&self) -> Result<JSONRPCMessage, Error>;

    /// Close the transport, flushing queued outgoing messages first.
    async fn close(&self) -> Result<(), Error>;

    /// Check if the transport is connected
    fn is_connected(&self) -> bool;
}

/// Tuning for stream transports.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Longest accepted line, in bytes
    pub max_frame_length: usize,

    /// Decoded messages buffered before the reader stops pulling from the stream
    pub channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            channel_capacity: 100,
        }
    }
}

impl TransportConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum frame length
    pub fn with_max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = max_frame_length;
        self
    }

    /// Set the capacity of the incoming message buffer
    pub fn with_channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity.max(1);
        self
    }
}

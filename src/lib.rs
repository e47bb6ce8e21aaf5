//! Bidirectional Model Context Protocol core
//!
//! JSON-RPC 2.0 messages over newline-delimited streams, with request
//! correlation in both directions. A server registers tools, resources and
//! prompts; while a request is being served its handler can report progress,
//! send log messages, and call back into the client for elicitation or
//! sampling.

pub mod client;
pub mod config;
pub mod demo;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

// Re-export commonly used items
pub use client::{ Client, ClientBuilder, ClientConfig };
pub use protocol::Error;
pub use server::{ RequestContext, Server, ServerBuilder, ServerConfig };
pub use session::{ MessageHandler, Peer, Session };
pub use transport::{ StreamTransport, Transport };

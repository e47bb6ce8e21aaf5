//! Client implementation
//!
//! Connects to a server over any `Transport`, performs the handshake, and
//! answers the server's elicitation and sampling requests.

pub mod client;
pub mod handlers;
pub mod notification;
pub mod progress;

pub use client::{ Client, ClientBuilder, ClientConfig };
pub use handlers::{ ClientRouteHandler, ElicitationHandler, SamplingHandler };
pub use notification::{ NotificationHandlerFn, NotificationRouter, ANY_METHOD };
pub use progress::{ ProgressTracker, ProgressUpdate };

#[cfg(test)]
mod tests;

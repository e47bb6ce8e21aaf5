//! Server side of the protocol
//!
//! Registries for tools, resources and prompts, the per-request context
//! handlers receive, and the `Server` that serves connections.

pub mod callback;
pub mod context;
pub mod handlers;
pub mod notifier;
pub mod server;
pub mod services;

#[cfg(test)]
mod tests;

pub use callback::CallbackBridge;
pub use context::{ ConnectionState, RequestContext, RequestState };
pub use notifier::Notifier;
pub use server::{ Server, ServerBuilder, ServerConfig };

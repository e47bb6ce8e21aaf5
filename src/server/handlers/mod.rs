//! Server message handlers
//!
//! The route handler implements the session's `MessageHandler` for the
//! server side of a connection.

mod route_handler;
pub use route_handler::ServerRouteHandler;

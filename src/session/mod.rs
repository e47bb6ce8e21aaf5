//! Session machinery shared by client and server.

pub mod request;
#[allow(clippy::module_inception)]
pub mod session;

pub use request::RequestManager;
pub use session::{ MessageHandler, Peer, Session };

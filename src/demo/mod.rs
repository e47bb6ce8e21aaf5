//! Demonstration server and client built on the library.
//!
//! The server offers arithmetic tools, a configuration resource template and
//! a greeting prompt; the client exercises all of them.

pub mod client;
pub mod prompts;
pub mod resources;
pub mod tools;

use crate::protocol::Error;
use crate::server::{ Server, ServerBuilder, ServerConfig };

const INSTRUCTIONS: &str = "Arithmetic tools, a configuration resource and a greeting prompt";

/// Default configuration of the demo server
pub fn server_config() -> ServerConfig {
    ServerConfig {
        server_name: "demo-server".to_string(),
        instructions: Some(INSTRUCTIONS.to_string()),
        ..ServerConfig::default()
    }
}

/// A builder with every demo tool, resource and prompt registered
pub fn server_builder(config: ServerConfig) -> ServerBuilder {
    let builder = Server::builder().with_config(config);
    let builder = tools::register(builder);
    let builder = resources::register(builder);
    prompts::register(builder)
}

/// Build the demo server
pub fn build_server(config: ServerConfig) -> Result<Server, Error> {
    server_builder(config).build()
}

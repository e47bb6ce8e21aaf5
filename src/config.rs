//! Environment overrides for the binaries.

use std::env;
use std::time::Duration;
use tracing::warn;

use crate::client::ClientConfig;
use crate::server::ServerConfig;

pub const REQUEST_TIMEOUT_VAR: &str = "MCP_REQUEST_TIMEOUT_SECS";
pub const CALLBACK_TIMEOUT_VAR: &str = "MCP_CALLBACK_TIMEOUT_SECS";
/// Address the demo server listens on, or the demo client connects to
pub const SERVER_ADDR_VAR: &str = "MCP_SERVER_ADDR";
/// Command line of a server the demo client spawns
pub const SERVER_CMD_VAR: &str = "MCP_SERVER_CMD";

fn secs_from_env(var: &str) -> Option<Duration> {
    let value = env::var(var).ok()?;
    match value.trim().parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(e) => {
            warn!("Ignoring {}={}: {}", var, value, e);
            None
        }
    }
}

/// Apply timeout overrides from the environment
pub fn server_config_from_env(mut config: ServerConfig) -> ServerConfig {
    if let Some(timeout) = secs_from_env(REQUEST_TIMEOUT_VAR) {
        config.request_timeout = timeout;
    }
    if let Some(timeout) = secs_from_env(CALLBACK_TIMEOUT_VAR) {
        config.callback_timeout = timeout;
    }
    config
}

pub fn client_config_from_env(mut config: ClientConfig) -> ClientConfig {
    if let Some(timeout) = secs_from_env(REQUEST_TIMEOUT_VAR) {
        config.request_timeout = timeout;
    }
    config
}

pub fn server_addr() -> Option<String> {
    env::var(SERVER_ADDR_VAR).ok().filter(|addr| !addr.trim().is_empty())
}

/// The server command split into program and arguments
pub fn server_command() -> Option<(String, Vec<String>)> {
    let command = env::var(SERVER_CMD_VAR).ok()?;
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

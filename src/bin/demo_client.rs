//! Demo client.
//!
//! Connects over TCP when `MCP_SERVER_ADDR` is set, otherwise spawns the
//! server given by `MCP_SERVER_CMD` (default: `demo-server` next to this
//! binary) and talks to it over its stdin/stdout.

use anyhow::{ Context, Result };
use std::collections::HashMap;
use std::path::PathBuf;

use mcp_duplex::config::{ client_config_from_env, server_addr, server_command };
use mcp_duplex::demo;
use mcp_duplex::logging::init_tracing;
use mcp_duplex::{ ClientConfig, StreamTransport };

fn sibling_server() -> Result<PathBuf> {
    let me = std::env::current_exe().context("cannot locate the current executable")?;
    let dir = me.parent().context("executable has no parent directory")?;
    Ok(dir.join("demo-server"))
}

async fn transport() -> Result<StreamTransport> {
    if let Some(addr) = server_addr() {
        return StreamTransport::connect_tcp(addr.as_str()).await
            .with_context(|| format!("failed to connect to {}", addr));
    }

    let (program, args) = match server_command() {
        Some(command) => command,
        None => (sibling_server()?.to_string_lossy().into_owned(), Vec::new()),
    };
    StreamTransport::spawn(&program, &args, &HashMap::new())
        .with_context(|| format!("failed to start {}", program))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");

    let config = client_config_from_env(ClientConfig {
        client_name: "demo-client".to_string(),
        ..ClientConfig::default()
    });
    let client = demo::client::client_builder()
        .with_config(config)
        .connect(transport().await?).await
        .context("failed to connect to the demo server")?;

    let outcome = demo::client::run(&client).await;
    client.close().await?;
    outcome?;
    Ok(())
}

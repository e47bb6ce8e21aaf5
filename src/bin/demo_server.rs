//! Demo server: stdio by default, TCP when `MCP_SERVER_ADDR` is set.

use anyhow::{ Context, Result };
use tokio::net::TcpListener;
use tracing::info;

use mcp_duplex::config::{ server_addr, server_config_from_env };
use mcp_duplex::demo;
use mcp_duplex::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");

    let config = server_config_from_env(demo::server_config());
    let server = demo::build_server(config).context("failed to build the demo server")?;

    match server_addr() {
        Some(addr) => {
            let listener = TcpListener::bind(&addr).await
                .with_context(|| format!("failed to bind {}", addr))?;
            server.serve_tcp(listener).await?;
        }
        None => {
            server.serve_stdio().await?;
        }
    }

    info!("Demo server stopped");
    Ok(())
}

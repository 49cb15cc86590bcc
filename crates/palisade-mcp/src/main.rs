//! Palisade MCP Server - Portfolio risk analytics via Model Context
//! Protocol.
//!
//! # Usage
//!
//! ```bash
//! palisade-mcp-server --demo
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use palisade_mcp::PalisadeMcpServer;

/// Palisade MCP Server - Portfolio Risk Analytics
#[derive(Parser, Debug)]
#[command(name = "palisade-mcp-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run against fixture data (no live providers required)
    #[arg(short, long)]
    demo: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("palisade_mcp=debug,rmcp=debug"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("palisade_mcp=info,rmcp=warn"))
    };

    // Log to stderr only; stdout carries the protocol.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if !args.demo {
        anyhow::bail!(
            "live provider credentials are configured by the hosting layer; \
             run with --demo for the fixture-backed service"
        );
    }

    tracing::info!("Starting Palisade MCP Server in demo mode");
    let server = PalisadeMcpServer::with_demo_mode();

    run_stdio_server(server).await
}

/// Run the server with stdio transport.
async fn run_stdio_server(server: PalisadeMcpServer) -> anyhow::Result<()> {
    use rmcp::{transport::stdio, ServiceExt};

    tracing::info!("Using stdio transport");
    let service = server.serve(stdio()).await?;
    tracing::info!("Palisade MCP Server ready");
    service.waiting().await?;
    Ok(())
}

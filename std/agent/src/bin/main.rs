//! Binary entry point for the mcp-agent MCP server.

use clap::Parser;
use mcp_agent::{
    AgentServer,
    http::{self, HttpConfig},
    roots::AllowedRoots,
};
use rmcp::ServiceExt;
use std::{net::IpAddr, path::PathBuf};
use tracing_subscriber::EnvFilter;

/// MCP Agent Server: reads files from allowed directories and counts 'r' characters.
#[derive(Parser)]
#[command(name = "mcp-agent", version, about)]
struct Cli {
    /// Directory the server may read from (repeatable). Defaults to
    /// ~/Documents, ~/Downloads, ~/Desktop and ~/github.
    #[arg(long = "allow", value_name = "DIR")]
    allowed_dirs: Vec<PathBuf>,

    /// Serve over HTTP instead of stdio.
    #[arg(long)]
    http: bool,

    /// Address to listen on in HTTP mode.
    #[arg(long, default_value_t = HttpConfig::default().host)]
    host: IpAddr,

    /// Preferred port in HTTP mode.
    #[arg(long, default_value_t = http::DEFAULT_PORT)]
    port: u16,

    /// Number of consecutive ports to try when the preferred one is in use.
    #[arg(long, default_value_t = http::DEFAULT_PORT_ATTEMPTS)]
    port_attempts: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let roots = if cli.allowed_dirs.is_empty() {
        AllowedRoots::from_home()?
    } else {
        AllowedRoots::new(cli.allowed_dirs)
    };
    if roots.is_empty() {
        tracing::warn!("no usable allowed directories, every read_file call will be rejected");
    }
    for dir in roots.dirs() {
        tracing::info!("allowing reads under {}", dir.display());
    }

    let server = AgentServer::new(roots);
    if cli.http {
        let config = HttpConfig {
            host: cli.host,
            port: cli.port,
            port_attempts: cli.port_attempts,
        };
        http::serve(server, &config).await?;
    } else {
        let transport = rmcp::transport::stdio();
        server.serve(transport).await?.waiting().await?;
    }
    Ok(())
}

//! camgrid server
//!
//! Run with: camgrid [BIND_ADDR]
//!
//! Settings come from `CAMGRID_*` environment variables; a bind address on
//! the command line overrides `CAMGRID_HOST`/`CAMGRID_PORT`.
//!
//! Examples:
//!   camgrid                     # binds to 0.0.0.0:8080
//!   camgrid localhost           # binds to 127.0.0.1:8080
//!   camgrid 127.0.0.1:9000      # binds to 127.0.0.1:9000
//!
//! Sources connect to `ws://HOST:PORT/ws` and send JPEG frames as binary
//! messages. Open `http://HOST:PORT/video` to watch the grid.

use std::net::{IpAddr, SocketAddr};

use camgrid::server::DEFAULT_PORT;
use camgrid::{GridServer, ServerConfig};

/// Parse bind address from command line argument
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:8080
/// - "localhost:9000" -> 127.0.0.1:9000
/// - "127.0.0.1" -> 127.0.0.1:8080
/// - "0.0.0.0:9000" -> 0.0.0.0:9000
fn parse_bind_addr(arg: &str, default_port: u16) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: camgrid [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:{DEFAULT_PORT})");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  CAMGRID_HOST, CAMGRID_PORT, CAMGRID_FRAME_RATE, CAMGRID_RING_CAPACITY,");
    eprintln!("  CAMGRID_MAX_EXPECTED_CLIENTS, CAMGRID_WORKER_THREADS, CAMGRID_CELL_WIDTH,");
    eprintln!("  CAMGRID_CELL_HEIGHT, CAMGRID_JPEG_QUALITY, CAMGRID_SHUTDOWN_GRACE_MS,");
    eprintln!("  CAMGRID_CLIENT_TTL_SECS, CAMGRID_CONTROL_POLICY, CAMGRID_MAX_CONNECTIONS");
    eprintln!("  RUST_LOG     Log filter (default: camgrid=info)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("camgrid=info".parse()?),
        )
        .init();

    let mut config = ServerConfig::from_env()?;

    if let Some(addr_str) = args.get(1) {
        match parse_bind_addr(addr_str, config.bind_addr.port()) {
            Ok(addr) => config = config.bind(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        }
    }

    let server = GridServer::new(config);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}

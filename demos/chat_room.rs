//! WebSocket chat rooms.
//!
//! Demonstrates:
//! - Binding a GroupServer to a hub
//! - Tying the hub to a root cancellation token
//! - Graceful shutdown on Ctrl+C
//!
//! Usage:
//!   cargo run --example chat_room
//!   cargo run --example chat_room -- --port 8080
//!   cargo run --example chat_room -- --debug
//!
//! Then connect any WebSocket client to `ws://127.0.0.1:{port}/ws/{room}`.

// ============================================================================
// Imports
// ============================================================================

use group_hub::transport::GroupServer;
use group_hub::{Hub, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_PORT: u16 = 8080;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    port: u16,
}

impl Args {
    /// Parse command-line arguments.
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let port = args
            .iter()
            .position(|a| a == "--port")
            .and_then(|i| args.get(i + 1))
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            port,
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Chat Rooms ===\n");

    let hub = Hub::builder().event_capacity(128).build()?;
    let root = CancellationToken::new();
    let finished = hub.run_lifecycle(root.clone());

    let server = GroupServer::builder()
        .port(args.port)
        .bind(hub.clone())
        .await?;

    println!("Join a room at {}", server.ws_url("{room}"));
    println!("Press Ctrl+C to exit...");

    let serving = tokio::spawn(server.run(root.child_token()));

    tokio::signal::ctrl_c().await.ok();
    println!("\nShutting down...");

    root.cancel();
    finished.wait().await;

    match serving.await {
        Ok(result) => result?,
        Err(e) => eprintln!("[ERROR] server task failed: {e}"),
    }

    println!("✓ All rooms closed");
    Ok(())
}

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug {
        "group_hub=debug"
    } else {
        "group_hub=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

//! metron CLI - run and query the metron timestamp cluster.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use metron_server::{init_tracing, LogFormat, TracingConfig};
use std::path::PathBuf;

/// metron - replicated monotonic timestamp oracle.
#[derive(Parser)]
#[command(name = "metron")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a cluster node with its HTTP API
    Serve {
        /// This node's Raft identity (1-based)
        #[arg(long, env = "NODE_ID")]
        node_id: u64,

        /// Raft listen address
        #[arg(long, env = "RAFT_ADDR", default_value = "127.0.0.1:5000")]
        raft_addr: String,

        /// Raft address advertised to peers (defaults to the listen address)
        #[arg(long, env = "RAFT_ADVERTISE_ADDR")]
        raft_advertise_addr: Option<String>,

        /// Host the HTTP server binds to
        #[arg(long, env = "HTTP_HOST", default_value = "0.0.0.0")]
        http_host: String,

        /// Port the HTTP server listens on
        #[arg(long, env = "HTTP_PORT", default_value = "8080")]
        http_port: u16,

        /// HTTP address advertised for leader redirects
        /// (defaults to 127.0.0.1:<http_port>)
        #[arg(long, env = "HTTP_ADDR")]
        http_addr: Option<String>,

        /// Static peer map: "id=raft_addr;http_addr,..."
        #[arg(long, env = "PEERS", default_value = "")]
        peers: String,

        /// Directory for the Raft log and the epoch record
        #[arg(long, env = "DATA_DIR", default_value = "./metron-data")]
        data_dir: PathBuf,

        /// Base round-trip estimate in milliseconds
        #[arg(long, env = "RTT_MS", default_value = "10")]
        rtt_ms: u64,

        /// Epoch advancer tick period in milliseconds
        #[arg(long, env = "EPOCH_INTERVAL_MS", default_value = "100")]
        epoch_interval_ms: u64,

        /// Consecutive propose deadlines before the process gives up
        #[arg(long, env = "EPOCH_DEADLINE_LIMIT", default_value = "100")]
        epoch_deadline_limit: u32,

        /// Capacity of the pending timestamp-request queue
        #[arg(long, env = "TIMESTAMP_REQUEST_BUFFER", default_value = "10000")]
        request_buffer: usize,

        /// Initialize the cluster from the static peer map on startup.
        /// Safe to pass on every restart; a no-op once initialized.
        #[arg(long)]
        bootstrap: bool,
    },

    /// Fetch timestamps from a running cluster
    Timestamp {
        /// Base URL of any cluster node
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,

        /// Number of timestamps to fetch
        #[arg(short, long, default_value = "1")]
        count: u32,

        /// Print raw 16-byte values as hex instead of parsed fields
        #[arg(long)]
        raw: bool,
    },

    /// Show the cluster membership
    Membership {
        /// Base URL of any cluster node
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
    },

    /// Show version information
    Version,
}

fn setup_logging(verbosity: u8) -> Result<()> {
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Explicit format override, otherwise auto-detect from the terminal.
    let log_format = std::env::var("METRON_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse::<LogFormat>().ok())
        .unwrap_or_else(|| {
            if std::io::IsTerminal::is_terminal(&std::io::stdout()) {
                LogFormat::Pretty
            } else {
                LogFormat::Compact
            }
        });

    init_tracing(TracingConfig::new(log_format, filter))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Serve {
            node_id,
            raft_addr,
            raft_advertise_addr,
            http_host,
            http_port,
            http_addr,
            peers,
            data_dir,
            rtt_ms,
            epoch_interval_ms,
            epoch_deadline_limit,
            request_buffer,
            bootstrap,
        } => {
            commands::serve::run(commands::serve::ServeOptions {
                node_id,
                raft_addr,
                raft_advertise_addr,
                http_host,
                http_port,
                http_addr,
                peers,
                data_dir,
                rtt_ms,
                epoch_interval_ms,
                epoch_deadline_limit,
                request_buffer,
                bootstrap,
            })
            .await
        }
        Commands::Timestamp { url, count, raw } => {
            commands::timestamp::run(&url, count, raw).await
        }
        Commands::Membership { url } => commands::membership::run(&url).await,
        Commands::Version => commands::version::run(),
    }
}

//! Serve command - run a cluster node with its HTTP API.

use anyhow::{Context, Result};
use metron_cluster::config::parse_peer_map;
use metron_cluster::{ClusterConfig, EpochNode};
use metron_server::{ApiServer, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;

/// Options assembled from flags and environment variables.
pub struct ServeOptions {
    pub node_id: u64,
    pub raft_addr: String,
    pub raft_advertise_addr: Option<String>,
    pub http_host: String,
    pub http_port: u16,
    pub http_addr: Option<String>,
    pub peers: String,
    pub data_dir: PathBuf,
    pub rtt_ms: u64,
    pub epoch_interval_ms: u64,
    pub epoch_deadline_limit: u32,
    pub request_buffer: usize,
    pub bootstrap: bool,
}

/// Run the serve command.
pub async fn run(options: ServeOptions) -> Result<()> {
    let advertised_http = options
        .http_addr
        .clone()
        .unwrap_or_else(|| format!("127.0.0.1:{}", options.http_port));

    let peers = parse_peer_map(&options.peers).context("invalid PEERS value")?;

    let mut builder = ClusterConfig::builder()
        .node_id(options.node_id)
        .listen_addr(options.raft_addr.clone())
        .http_addr(advertised_http.clone())
        .peers(peers)
        .data_dir(options.data_dir.clone())
        .rtt_ms(options.rtt_ms)
        .epoch_interval_ms(options.epoch_interval_ms)
        .epoch_deadline_limit(options.epoch_deadline_limit)
        .request_buffer(options.request_buffer);
    if let Some(advertise) = options.raft_advertise_addr.clone() {
        builder = builder.advertise_addr(advertise);
    }
    let config = builder.build().context("invalid cluster configuration")?;

    tracing::info!(
        node_id = options.node_id,
        raft_addr = %options.raft_addr,
        http = %advertised_http,
        "starting metron node"
    );

    let node = Arc::new(
        EpochNode::start(config)
            .await
            .context("failed to start cluster node")?,
    );

    if options.bootstrap {
        node.bootstrap()
            .await
            .context("failed to bootstrap cluster")?;
    }

    let server_config = ServerConfig::new(options.http_host.clone(), options.http_port);
    let mut server = ApiServer::new(server_config, Arc::clone(&node));

    println!("metron node {} serving:", options.node_id);
    println!("  GET http://{}:{}/up", options.http_host, options.http_port);
    println!("  GET http://{}:{}/ready", options.http_host, options.http_port);
    println!(
        "  GET http://{}:{}/timestamp?count=N",
        options.http_host, options.http_port
    );
    println!(
        "  GET http://{}:{}/membership",
        options.http_host, options.http_port
    );
    println!();
    println!("Press Ctrl+C to stop.");

    tokio::select! {
        result = server.run() => {
            result.context("HTTP server failed")?;
        }
        _ = shutdown_signal() => {
            tracing::warn!("received shutdown signal");
        }
    }

    drop(server);
    match Arc::try_unwrap(node) {
        Ok(mut node) => node
            .shutdown()
            .await
            .context("failed to shutdown cluster node")?,
        Err(_) => {
            // In-flight connections still hold the node; its Drop hook
            // stops the background tasks when they finish.
            tracing::warn!("connections still active, skipping graceful raft shutdown");
        }
    }

    tracing::info!("metron node stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

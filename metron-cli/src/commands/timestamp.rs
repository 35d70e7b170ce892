//! Timestamp command - fetch timestamps from a running cluster.

use anyhow::{Context, Result};
use metron_client::Client;

/// Run the timestamp command.
pub async fn run(url: &str, count: u32, raw: bool) -> Result<()> {
    let client = Client::new(url).context("invalid server URL")?;

    let timestamps = client
        .timestamps(count)
        .await
        .context("failed to fetch timestamps")?;

    for ts in timestamps {
        if raw {
            let mut bytes = [0u8; 16];
            bytes[..8].copy_from_slice(&ts.epoch.to_be_bytes());
            bytes[8..].copy_from_slice(&ts.index.to_be_bytes());
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            println!("{hex}");
        } else {
            println!("epoch={} index={}", ts.epoch, ts.index);
        }
    }

    Ok(())
}

//! Membership command - show the cluster membership.

use anyhow::{Context, Result};
use metron_client::Client;

/// Run the membership command.
pub async fn run(url: &str) -> Result<()> {
    let client = Client::new(url).context("invalid server URL")?;

    let membership = client
        .membership()
        .await
        .context("failed to fetch membership")?;

    println!("leader: node {} at {}", membership.leader.node_id, membership.leader.addr);
    println!("members:");
    for member in &membership.members {
        let marker = if member.node_id == membership.leader.node_id {
            " (leader)"
        } else {
            ""
        };
        println!("  node {} at {}{}", member.node_id, member.addr, marker);
    }

    Ok(())
}

//! Version command.

use anyhow::Result;

/// Print version information.
pub fn run() -> Result<()> {
    println!("metron {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}

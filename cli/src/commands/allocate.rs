//! Allocate command - take the next forwarder port from the host record.

use anyhow::Result;
use mter_core::ports::PortAllocatorPort;
use mter_core::{FilePortAllocator, MterConfig};
use serde::Serialize;

#[derive(Serialize)]
struct Allocation {
    port: u16,
    record: String,
}

pub async fn run(json: bool) -> Result<()> {
    let config = MterConfig::from_env()?;
    let allocator = FilePortAllocator::in_temp_dir(&config.lock_file_name, config.default_bind_port);
    let port = allocator.allocate().await?;

    if json {
        let allocation = Allocation {
            port,
            record: allocator.path().display().to_string(),
        };
        println!("{}", serde_json::to_string_pretty(&allocation)?);
        return Ok(());
    }

    println!("{}", port);
    Ok(())
}

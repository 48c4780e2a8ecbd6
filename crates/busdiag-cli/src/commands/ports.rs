//! Ports command - list serial ports

use anyhow::{Context, Result};
use busdiag_uds::transport::ports as available_ports;

use crate::output::{OutputContext, PortRow};

pub fn ports(ctx: &OutputContext) -> Result<()> {
    let ports = available_ports().context("Failed to list serial ports")?;
    if ports.is_empty() && !ctx.is_json() {
        ctx.info("No serial ports found");
        return Ok(());
    }

    let rows: Vec<PortRow> = ports
        .into_iter()
        .map(|p| PortRow {
            name: p.name,
            description: p.description.unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    ctx.print(&rows);
    Ok(())
}

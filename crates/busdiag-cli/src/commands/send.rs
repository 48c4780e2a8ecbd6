//! Send command - put one raw frame on the bus

use anyhow::{Context, Result};
use busdiag_core::{CanId, Direction};

use crate::device::Device;
use crate::output::{hex_bytes, OutputContext};

pub fn send(device: &Device, id: &str, data: &[u8], ctx: &OutputContext) -> Result<()> {
    let id = CanId::parse(id).with_context(|| format!("Invalid frame id '{}'", id))?;
    device
        .connection
        .send_raw_frame(id, data, Direction::Tx)
        .context("Failed to send frame")?;

    ctx.success(&format!("Sent {} [{}] {}", id, data.len(), hex_bytes(data)));
    Ok(())
}

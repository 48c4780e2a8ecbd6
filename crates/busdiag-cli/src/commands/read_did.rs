//! Read-did command - ReadDataByIdentifier

use anyhow::{bail, Result};

use crate::device::Device;
use crate::output::{DidRow, OutputContext};

/// Read each DID in turn; a failing DID is reported and skipped
pub async fn read_did(device: &Device, dids: &[u16], ctx: &OutputContext) -> Result<()> {
    let mut rows = Vec::with_capacity(dids.len());
    for &did in dids {
        match device.engine.read_did(did).await {
            Ok(reading) => rows.push(DidRow {
                did: format!("{:04X}", reading.did),
                name: reading.name,
                value: reading.value,
            }),
            Err(e) => ctx.error(&format!("DID {:04X}: {}", did, e)),
        }
    }

    if rows.is_empty() {
        bail!("No DID could be read");
    }
    ctx.print(&rows);
    Ok(())
}

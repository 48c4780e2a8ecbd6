//! Reset command - ECU reset

use anyhow::{Context, Result};
use busdiag_uds::ResetKind;

use crate::device::Device;
use crate::output::OutputContext;

pub async fn reset(device: &Device, kind: ResetKind, ctx: &OutputContext) -> Result<()> {
    let name = kind.to_string();
    ctx.info(&format!("Performing {} reset on {}...", name, device.endpoint_name()));

    device
        .engine
        .ecu_reset(kind)
        .await
        .with_context(|| format!("ECU {} reset failed", name))?;

    ctx.success(&format!("ECU {} reset successful", name));
    Ok(())
}

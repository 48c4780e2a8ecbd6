//! Dtc command - read or clear trouble codes

use anyhow::{Context, Result};

use crate::device::Device;
use crate::output::{DtcRow, OutputContext};

pub async fn dtc(device: &Device, mask: u8, clear: bool, ctx: &OutputContext) -> Result<()> {
    if clear {
        device
            .engine
            .clear_dtcs()
            .await
            .context("Failed to clear trouble codes")?;
        ctx.success("Trouble codes cleared");
        return Ok(());
    }

    let records = device
        .engine
        .read_dtcs(mask)
        .await
        .context("Failed to read trouble codes")?;

    if records.is_empty() && !ctx.is_json() {
        ctx.info("No trouble codes found");
        return Ok(());
    }

    let rows: Vec<DtcRow> = records
        .into_iter()
        .map(|r| DtcRow {
            description: r.description().unwrap_or("-").to_string(),
            category: r.category.to_string(),
            status: r.status.to_string(),
            code: r.code,
        })
        .collect();
    ctx.print(&rows);
    Ok(())
}

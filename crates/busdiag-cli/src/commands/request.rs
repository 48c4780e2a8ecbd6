//! Request command - generic diagnostic request

use anyhow::{Context, Result};
use busdiag_uds::uds::{annotate, service_name};

use crate::device::Device;
use crate::output::{hex_bytes, OutputContext};

/// Send `sid` + payload and print the positive response
pub async fn request(
    device: &Device,
    service_id: u8,
    payload: &[u8],
    ctx: &OutputContext,
) -> Result<()> {
    let service = service_name(service_id)
        .map(|name| format!("{} (0x{:02X})", name, service_id))
        .unwrap_or_else(|| format!("0x{:02X}", service_id));

    let response = device
        .engine
        .send_diagnostic_request(service_id, payload)
        .await
        .with_context(|| format!("Request {} failed", service))?;

    let mut pairs = vec![
        ("Service", service),
        ("Response", hex_bytes(&response)),
    ];
    if let Some(text) = annotate(&response, &device.dids) {
        pairs.push(("Meaning", text));
    }
    ctx.print_kv(&pairs);
    Ok(())
}

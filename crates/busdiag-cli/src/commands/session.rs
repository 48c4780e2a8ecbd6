//! Session command - diagnostic session control

use anyhow::{Context, Result};
use busdiag_uds::uds::session_type;

use crate::device::Device;
use crate::output::OutputContext;

pub async fn session(device: &Device, session: u8, ctx: &OutputContext) -> Result<()> {
    device
        .engine
        .start_session(session)
        .await
        .with_context(|| format!("Failed to start session 0x{:02X}", session))?;

    let name = match session {
        session_type::DEFAULT => "Default (0x01)".to_string(),
        session_type::PROGRAMMING => "Programming (0x02)".to_string(),
        session_type::EXTENDED => "Extended (0x03)".to_string(),
        other => format!("0x{:02X}", other),
    };
    ctx.success(&format!("Session changed to {}", name));
    ctx.print_kv(&[
        ("Phase", device.engine.phase().to_string()),
        ("Security", device.engine.security_state().to_string()),
    ]);
    Ok(())
}

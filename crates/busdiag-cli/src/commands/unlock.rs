//! Unlock command - session, seed request and key

use anyhow::{bail, Context, Result};
use busdiag_uds::{DiagError, KeyAlgorithm};

use crate::device::Device;
use crate::output::{hex_bytes, OutputContext};

/// How the key for the received seed is obtained
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Fixed key bytes
    Key(Vec<u8>),
    /// XOR secret applied to the seed
    Secret(Vec<u8>),
}

pub async fn unlock(
    device: &Device,
    session: u8,
    level: u8,
    source: Option<KeySource>,
    ctx: &OutputContext,
) -> Result<()> {
    let engine = &device.engine;

    engine
        .start_session(session)
        .await
        .with_context(|| format!("Failed to start session 0x{:02X}", session))?;

    let seed = engine
        .request_seed(level)
        .await
        .with_context(|| format!("Seed request for level 0x{:02X} failed", level))?;

    if engine.security_state().is_unlocked() {
        ctx.success(&format!("Level 0x{:02X} already unlocked", level));
        return Ok(());
    }
    ctx.info(&format!("Seed: {}", hex_bytes(&seed)));

    let key = match source {
        Some(KeySource::Key(key)) => key,
        Some(KeySource::Secret(secret)) => KeyAlgorithm::xor(secret).compute_key(&seed),
        None if device.is_simulated() => {
            KeyAlgorithm::xor(device.config.simulation.secret.clone()).compute_key(&seed)
        }
        None => bail!("A real adapter needs --key or --secret"),
    };

    match engine.send_key(&key).await {
        Ok(()) => {}
        Err(DiagError::SecurityDenied { attempts, limit }) => {
            bail!("Invalid key {} ({}/{} attempts)", hex_bytes(&key), attempts, limit)
        }
        Err(DiagError::LockedOut) => {
            bail!("Security access locked out; power cycle the ECU before retrying")
        }
        Err(e) => return Err(e).context("Key rejected"),
    }

    ctx.success(&format!("Security level 0x{:02X} unlocked", level));
    ctx.print_kv(&[
        ("Seed", hex_bytes(&seed)),
        ("Key", hex_bytes(&key)),
        ("Security", engine.security_state().to_string()),
    ]);
    Ok(())
}

//! Monitor command - print bus frames as they arrive

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use busdiag_core::BusFrame;
use busdiag_uds::bus::next_frame;
use busdiag_uds::{ConnectionState, TransportEvent};
use colored::Colorize;
use tokio::sync::broadcast;

use crate::device::Device;
use crate::output::{FrameRecord, OutputContext};

/// Print frames until Ctrl+C, the count is reached, or the link fails
pub async fn monitor(
    device: &Device,
    count: Option<usize>,
    annotate: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let mut frames = device.connection.bus().subscribe();
    let mut events = device.connection.subscribe_events();

    ctx.info(&format!(
        "Monitoring {} ({})",
        device.endpoint_name(),
        device.connection.codec().dialect()
    ));
    ctx.info("Press Ctrl+C to stop");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut seen = 0usize;
    while running.load(Ordering::SeqCst) {
        if count.is_some_and(|limit| seen >= limit) {
            break;
        }
        tokio::select! {
            frame = next_frame(&mut frames) => {
                let Some(frame) = frame else {
                    ctx.warn("Frame bus closed");
                    break;
                };
                let annotation = if annotate { device.engine.annotate(&frame) } else { None };
                print_frame(&frame, annotation, ctx);
                seen += 1;
            }
            event = events.recv() => {
                match event {
                    Ok(TransportEvent::StateChanged { state: ConnectionState::Failed, message }) => {
                        ctx.error(&format!(
                            "Connection failed: {}",
                            message.unwrap_or_else(|| "reconnect attempts exhausted".to_string())
                        ));
                        break;
                    }
                    Ok(TransportEvent::StateChanged { state, .. }) => {
                        ctx.warn(&format!("Connection {}", state));
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
    }

    ctx.info(&format!("\n{} frame(s) received", seen));
    Ok(())
}

fn print_frame(frame: &BusFrame, annotation: Option<String>, ctx: &OutputContext) {
    if ctx.is_json() {
        let record = FrameRecord { frame, annotation };
        if let Ok(line) = serde_json::to_string(&record) {
            println!("{}", line);
        }
        return;
    }
    match annotation {
        Some(text) => println!("{}  {}", frame, text.cyan()),
        None => println!("{}", frame),
    }
}

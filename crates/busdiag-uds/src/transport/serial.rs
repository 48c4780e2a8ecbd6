//! Serial port endpoint

use std::io::{self, Read, Write};
use std::time::Duration;

use serde::Serialize;
use serialport::{ClearBuffer, SerialPort, SerialPortType};

use super::{Connector, StreamHandle, TransportError};
use crate::config::SerialConfig;

/// A serial port found on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub name: String,
    /// USB product string, when the port is a USB device
    pub description: Option<String>,
}

/// List serial ports available on this host
pub fn ports() -> Result<Vec<PortInfo>, TransportError> {
    let ports = serialport::available_ports().map_err(|e| TransportError::Io(e.to_string()))?;
    Ok(ports
        .into_iter()
        .map(|p| {
            let description = match p.port_type {
                SerialPortType::UsbPort(usb) => usb.product,
                _ => None,
            };
            PortInfo {
                name: p.port_name,
                description,
            }
        })
        .collect())
}

/// Opens a serial port with 8N1 framing
#[derive(Debug, Clone)]
pub struct SerialConnector {
    config: SerialConfig,
    timeout: Duration,
}

impl SerialConnector {
    pub fn new(config: SerialConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }
}

impl Connector for SerialConnector {
    fn open(&self) -> Result<Box<dyn StreamHandle>, TransportError> {
        let port = serialport::new(&self.config.port, self.config.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => {
                    TransportError::Open(format!("{}: no such device", self.config.port))
                }
                _ => TransportError::Open(format!("{}: {}", self.config.port, e)),
            })?;
        Ok(Box::new(SerialStream { port }))
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.config.port, self.config.baud_rate)
    }
}

struct SerialStream {
    port: Box<dyn SerialPort>,
}

impl StreamHandle for SerialStream {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pending = self.port.bytes_to_read().map_err(io::Error::from)? as usize;
        if pending == 0 {
            return Ok(0);
        }
        let len = pending.min(buf.len());
        match self.port.read(&mut buf[..len]) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "serial port closed",
            )),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

//! In-memory byte stream standing in for a serial adapter

use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

use busdiag_core::{BusFrame, CanId, Dialect, Direction, Frame, LineCodec, TxCommand};
use tracing::{debug, trace, warn};

use super::{SimulatedEcu, TrafficGenerator};
use crate::transport::{LineAssembler, StreamHandle};

/// Speaks the configured dialect in both directions
///
/// Host commands are parsed with the codec; frames addressed to the ECU
/// request id are answered after the configured delay, rendered the way the
/// adapter would print a received frame. Random traffic is interleaved at
/// the configured interval; received traffic is printed, transmitted
/// traffic is handed over whole since most dialects print no direction.
pub struct SimulatedPort {
    codec: LineCodec,
    ecu: SimulatedEcu,
    traffic: Option<TrafficGenerator>,
    interval: Duration,
    next_traffic: Instant,
    response_delay: Duration,
    tx_id: CanId,
    rx_id: CanId,
    input: LineAssembler,
    scheduled: VecDeque<(Instant, String)>,
    output: VecDeque<u8>,
    frames: Vec<BusFrame>,
}

impl SimulatedPort {
    pub fn new(
        codec: LineCodec,
        ecu: SimulatedEcu,
        traffic: Option<TrafficGenerator>,
        interval: Duration,
        response_delay: Duration,
        tx_id: CanId,
        rx_id: CanId,
    ) -> Self {
        Self {
            codec,
            ecu,
            traffic,
            interval,
            next_traffic: Instant::now() + interval,
            response_delay,
            tx_id,
            rx_id,
            input: LineAssembler::new(),
            scheduled: VecDeque::new(),
            output: VecDeque::new(),
            frames: Vec::new(),
        }
    }

    fn handle_command(&mut self, line: &str) {
        let command = match self.codec.parse_command(line) {
            Ok(command) => command,
            Err(e) => {
                debug!(line, error = %e, "Simulated adapter ignored command");
                if self.codec.dialect() == Dialect::Slcan {
                    self.emit("\x07");
                }
                return;
            }
        };

        match command {
            TxCommand::Slcan(_) => self.emit("\r"),
            TxCommand::Init => self.emit("OK\r\n"),
            TxCommand::Frame { id, data } => {
                if self.codec.dialect() == Dialect::Slcan {
                    self.emit(if id.is_extended() { "Z\r" } else { "z\r" });
                }
                if id == self.tx_id {
                    self.answer(&data);
                }
            }
            TxCommand::Lin(frame) => {
                if u32::from(frame.pid().frame_id()) == self.tx_id.raw() {
                    self.answer(frame.data());
                }
            }
        }
    }

    fn answer(&mut self, request: &[u8]) {
        let Some(response) = self.ecu.process_request(request) else {
            return;
        };
        let frame = match Frame::new(self.rx_id, response, Direction::Rx) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Simulated ECU response does not fit a frame");
                return;
            }
        };
        match self.codec.format_line(&BusFrame::Can(frame)) {
            Ok(line) => {
                trace!(line = line.trim_end(), "Simulated ECU response scheduled");
                self.scheduled
                    .push_back((Instant::now() + self.response_delay, line));
            }
            Err(e) => warn!(error = %e, "Simulated ECU response cannot be rendered"),
        }
    }

    fn emit(&mut self, text: &str) {
        self.output.extend(text.as_bytes());
    }

    fn pump(&mut self, now: Instant) {
        while let Some((due, _)) = self.scheduled.front() {
            if *due > now {
                break;
            }
            if let Some((_, line)) = self.scheduled.pop_front() {
                self.output.extend(line.as_bytes());
            }
        }

        if now < self.next_traffic {
            return;
        }
        self.next_traffic = (self.next_traffic + self.interval).max(now);
        let Some(frame) = self.traffic.as_mut().and_then(|t| t.next_frame()) else {
            return;
        };
        if frame.direction() == Direction::Tx {
            self.frames.push(frame);
            return;
        }
        match self.codec.format_line(&frame) {
            Ok(line) => self.output.extend(line.as_bytes()),
            Err(e) => debug!(error = %e, "Traffic frame cannot be rendered"),
        }
    }
}

impl StreamHandle for SimulatedPort {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        for line in self.input.push(bytes) {
            self.handle_command(&line);
        }
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.pump(Instant::now());
        let n = buf.len().min(self.output.len());
        for (slot, byte) in buf.iter_mut().zip(self.output.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.output.clear();
        self.frames.clear();
        Ok(())
    }

    fn take_frames(&mut self) -> Vec<BusFrame> {
        std::mem::take(&mut self.frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;

    fn port(dialect: Dialect, tx: u32, rx: u32) -> SimulatedPort {
        let codec = LineCodec::new(dialect);
        SimulatedPort::new(
            codec,
            SimulatedEcu::new(&SimulationConfig::default(), 8),
            None,
            Duration::from_secs(3600),
            Duration::ZERO,
            CanId::standard(tx).unwrap(),
            CanId::standard(rx).unwrap(),
        )
    }

    fn read_all(port: &mut SimulatedPort) -> String {
        let mut buf = [0u8; 256];
        let n = port.read_available(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[test]
    fn test_slcan_session_request() {
        let mut port = port(Dialect::Slcan, 0x7E0, 0x7E8);
        port.write_all(b"C\rS6\rO\r").unwrap();
        assert_eq!(read_all(&mut port), "\r\r\r");

        port.write_all(b"t7E0210").unwrap();
        port.write_all(b"03\r").unwrap();
        assert_eq!(read_all(&mut port), "z\rt7E865003001901F4\r");
    }

    #[test]
    fn test_mcp2515_seed_request() {
        let mut port = port(Dialect::Mcp2515, 0x7E0, 0x7E8);
        port.write_all(b"INIT\r\n").unwrap();
        port.clear_input().unwrap();
        port.write_all(b"SEND:7E0,2,27,01\r\n").unwrap();
        let line = read_all(&mut port);
        let frame = LineCodec::new(Dialect::Mcp2515)
            .decode_line(line.trim_end())
            .unwrap();
        assert_eq!(frame.data(), &[0x67, 0x01, 0xAA, 0xBB]);
    }

    #[test]
    fn test_other_ids_and_suppressed_requests_are_silent() {
        let mut port = port(Dialect::Csv, 0x7E0, 0x7E8);
        port.write_all(b"12:00:00.000,123,0102,TX\n").unwrap();
        port.write_all(b"12:00:00.000,7E0,3E80,TX\n").unwrap();
        assert_eq!(read_all(&mut port), "");
    }

    #[test]
    fn test_lin_diagnostic_frames() {
        let mut port = port(Dialect::Lin, 0x3C, 0x3D);
        let codec = LineCodec::new(Dialect::Lin);
        let command = codec
            .encode_frame(CanId::standard(0x3C).unwrap(), &[0x3E, 0x00])
            .unwrap();
        port.write_all(&command).unwrap();
        let line = read_all(&mut port);
        match codec.decode_line(line.trim_end()).unwrap() {
            BusFrame::Lin(frame) => {
                assert_eq!(frame.pid().frame_id(), 0x3D);
                assert_eq!(frame.data(), &[0x7E, 0x00]);
            }
            other => panic!("expected LIN frame, got {other:?}"),
        }
    }

    #[test]
    fn test_transmitted_traffic_keeps_direction() {
        let config = SimulationConfig::default();
        let mut port = SimulatedPort::new(
            LineCodec::new(Dialect::Slcan),
            SimulatedEcu::new(&config, 8),
            Some(TrafficGenerator::seeded(5, &config, 0x7E8, Dialect::Slcan, 8)),
            Duration::from_millis(1),
            Duration::ZERO,
            CanId::standard(0x7E0).unwrap(),
            CanId::standard(0x7E8).unwrap(),
        );

        let codec = LineCodec::new(Dialect::Slcan);
        let mut buf = [0u8; 256];
        let (mut rx, mut tx) = (0, 0);
        for _ in 0..200 {
            std::thread::sleep(Duration::from_millis(2));
            let n = port.read_available(&mut buf).unwrap();
            for line in String::from_utf8_lossy(&buf[..n]).split('\r') {
                if !line.is_empty() {
                    assert_eq!(codec.decode_line(line).unwrap().direction(), Direction::Rx);
                    rx += 1;
                }
            }
            for frame in port.take_frames() {
                assert_eq!(frame.direction(), Direction::Tx);
                tx += 1;
            }
        }
        assert!(rx > 0 && tx > 0, "rx {rx}, tx {tx}");
    }

    #[test]
    fn test_response_delay() {
        let mut port = SimulatedPort::new(
            LineCodec::new(Dialect::Csv),
            SimulatedEcu::new(&SimulationConfig::default(), 8),
            None,
            Duration::from_secs(3600),
            Duration::from_millis(50),
            CanId::standard(0x7E0).unwrap(),
            CanId::standard(0x7E8).unwrap(),
        );
        port.write_all(b"00:00:00.000,7E0,1003,TX\n").unwrap();
        assert_eq!(read_all(&mut port), "");
        std::thread::sleep(Duration::from_millis(80));
        assert!(read_all(&mut port).contains(",7E8,50030019"));
    }
}

//! Connection to one adapter endpoint
//!
//! One background thread per open connection reads the stream, splits it
//! into lines and hands them to the codec. Every access to the stream
//! handle (open, close, write, each non-blocking read) goes through one
//! mutex; the reader sleeps outside it, so writers never wait longer than
//! a single read.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use busdiag_core::{BusFrame, CanBitrate, CanId, Dialect, Direction, LineCodec};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use super::{
    Connector, ConnectionState, ErrorKind, FrameLink, LineAssembler, ReconnectPolicy,
    SerialConnector, StreamHandle, TransportError, TransportEvent,
};
use crate::bus::FrameBus;
use crate::config::{BusDiagConfig, ConnectionConfig, EndpointConfig};
use crate::sim::SimulatedConnector;

const EVENT_CAPACITY: usize = 256;
const READ_CHUNK: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub dialect: Dialect,
    pub bitrate: CanBitrate,
    pub max_payload: usize,
    pub read_poll: Duration,
    pub join_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ConnectionOptions {
    pub fn from_config(config: &ConnectionConfig) -> Result<Self, TransportError> {
        let bitrate = config.can_bitrate().ok_or_else(|| {
            TransportError::InvalidConfig(format!("unsupported bitrate {}", config.bitrate))
        })?;
        Ok(Self {
            dialect: config.dialect,
            bitrate,
            max_payload: config.max_payload,
            read_poll: config.read_poll(),
            join_timeout: config.join_timeout(),
            reconnect: ReconnectPolicy::from(&config.reconnect),
        })
    }

    pub fn codec(&self) -> LineCodec {
        LineCodec::new(self.dialect).with_max_payload(self.max_payload)
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            bitrate: CanBitrate::default(),
            max_payload: busdiag_core::MAX_CLASSIC_PAYLOAD,
            read_poll: Duration::from_millis(1),
            join_timeout: Duration::from_secs(2),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Frame counters for one connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub frames_received: u64,
    pub frames_sent: u64,
}

struct Shared {
    connector: Arc<dyn Connector>,
    options: ConnectionOptions,
    codec: LineCodec,
    handle: Mutex<Option<Box<dyn StreamHandle>>>,
    state: RwLock<ConnectionState>,
    events: broadcast::Sender<TransportEvent>,
    bus: FrameBus,
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
}

struct Reader {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    thread: JoinHandle<()>,
}

pub struct Connection {
    shared: Arc<Shared>,
    reader: Mutex<Option<Reader>>,
}

impl Connection {
    pub fn new(connector: Arc<dyn Connector>, options: ConnectionOptions, bus: FrameBus) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                connector,
                codec: options.codec(),
                options,
                handle: Mutex::new(None),
                state: RwLock::new(ConnectionState::Disconnected),
                events,
                bus,
                frames_received: AtomicU64::new(0),
                frames_sent: AtomicU64::new(0),
            }),
            reader: Mutex::new(None),
        }
    }

    /// Build the endpoint described by the configuration (not yet connected)
    pub fn from_config(config: &BusDiagConfig, bus: FrameBus) -> Result<Self, TransportError> {
        let options = ConnectionOptions::from_config(&config.connection)?;
        let connector: Arc<dyn Connector> = match &config.connection.endpoint {
            EndpointConfig::Serial(serial) => Arc::new(SerialConnector::new(
                serial.clone(),
                config.connection.read_poll(),
            )),
            EndpointConfig::Simulation => Arc::new(SimulatedConnector::new(
                &config.simulation,
                &config.session,
                options.codec(),
            )?),
        };
        Ok(Self::new(connector, options, bus))
    }

    /// Open the endpoint, initialise the adapter and start the reader
    ///
    /// An open failure is reported as an `Open` error event and returned;
    /// it is not retried.
    pub fn connect(&self) -> Result<(), TransportError> {
        if self.reader.lock().is_some() {
            self.disconnect();
        }

        let shared = &self.shared;
        shared.set_state(ConnectionState::Connecting, None);
        let handle = match shared.open_handle() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(endpoint = %shared.connector.describe(), error = %e, "Connect failed");
                shared.emit_error(ErrorKind::Open, e.to_string());
                shared.set_state(ConnectionState::Disconnected, Some(e.to_string()));
                return Err(e);
            }
        };
        *shared.handle.lock() = Some(handle);
        shared.frames_received.store(0, Ordering::Relaxed);
        shared.frames_sent.store(0, Ordering::Relaxed);
        shared.set_state(
            ConnectionState::Connected,
            Some(shared.connector.describe()),
        );

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let worker = Arc::clone(shared);
        let spawned = std::thread::Builder::new()
            .name("busdiag-reader".to_string())
            .spawn(move || {
                worker.read_loop(&stop_rx);
                let _ = done_tx.send(());
            });
        match spawned {
            Ok(thread) => {
                *self.reader.lock() = Some(Reader {
                    stop_tx,
                    done_rx,
                    thread,
                });
                Ok(())
            }
            Err(e) => {
                shared.handle.lock().take();
                shared.set_state(ConnectionState::Disconnected, Some(e.to_string()));
                Err(TransportError::Io(e.to_string()))
            }
        }
    }

    /// Stop the reader (bounded wait), send the close sequence, release the handle
    pub fn disconnect(&self) {
        self.stop_reader();
        if let Some(mut handle) = self.shared.handle.lock().take() {
            for command in self.shared.codec.close_sequence() {
                if let Err(e) = handle.write_all(&command) {
                    debug!(error = %e, "Close command failed");
                }
            }
        }
        self.shared.set_state(ConnectionState::Disconnected, None);
    }

    /// Write raw bytes to the adapter
    pub fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut guard = self.shared.handle.lock();
        let handle = guard.as_mut().ok_or(TransportError::NotConnected)?;
        handle.write_all(bytes)?;
        Ok(())
    }

    /// Encode and send one frame, then publish it on the bus
    pub fn send_raw_frame(
        &self,
        id: CanId,
        data: &[u8],
        direction: Direction,
    ) -> Result<(), TransportError> {
        let codec = &self.shared.codec;
        let bytes = codec.encode_directed(id, data, direction)?;
        let frame = codec.tx_frame(id, data, direction)?;
        self.send(&bytes)?;
        self.shared.frames_sent.fetch_add(1, Ordering::Relaxed);
        trace!(%id, data = %hex::encode_upper(data), "TX");
        self.shared.bus.publish(frame);
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            frames_received: self.shared.frames_received.load(Ordering::Relaxed),
            frames_sent: self.shared.frames_sent.load(Ordering::Relaxed),
        }
    }

    pub fn bus(&self) -> &FrameBus {
        &self.shared.bus
    }

    pub fn codec(&self) -> LineCodec {
        self.shared.codec
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TransportEvent> {
        self.shared.events.subscribe()
    }

    fn stop_reader(&self) {
        let Some(reader) = self.reader.lock().take() else {
            return;
        };
        let _ = reader.stop_tx.send(());
        match reader.done_rx.recv_timeout(self.shared.options.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if reader.thread.join().is_err() {
                    warn!("Reader thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.shared.options.join_timeout.as_millis() as u64,
                    "Reader thread did not stop in time, detaching"
                );
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.stop_reader();
        if let Some(mut handle) = self.shared.handle.lock().take() {
            for command in self.shared.codec.close_sequence() {
                let _ = handle.write_all(&command);
            }
        }
    }
}

#[async_trait]
impl FrameLink for Connection {
    async fn send_frame(&self, id: CanId, data: &[u8]) -> Result<(), TransportError> {
        self.send_raw_frame(id, data, Direction::Tx)
    }

    fn subscribe_frames(&self) -> broadcast::Receiver<BusFrame> {
        self.shared.bus.subscribe()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<TransportEvent> {
        self.shared.events.subscribe()
    }

    fn state(&self) -> ConnectionState {
        Connection::state(self)
    }

    fn max_payload(&self) -> usize {
        self.shared.codec.max_payload()
    }
}

impl Shared {
    fn open_handle(&self) -> Result<Box<dyn StreamHandle>, TransportError> {
        let mut handle = self.connector.open()?;
        for command in self.codec.init_sequence(self.options.bitrate) {
            handle.write_all(&command)?;
        }
        handle.clear_input()?;
        Ok(handle)
    }

    fn read_loop(&self, stop_rx: &Receiver<()>) {
        let mut buf = [0u8; READ_CHUNK];
        let mut lines = LineAssembler::new();
        let mut attempts = 0u32;

        loop {
            if stop_requested(stop_rx) {
                break;
            }

            let (result, whole) = {
                let mut guard = self.handle.lock();
                match guard.as_mut() {
                    Some(handle) => (handle.read_available(&mut buf), handle.take_frames()),
                    None => (
                        Err(io::Error::new(io::ErrorKind::NotConnected, "stream closed")),
                        Vec::new(),
                    ),
                }
            };
            for frame in whole {
                self.publish_frame(frame);
            }

            match result {
                Ok(0) => {
                    if wait_for_stop(stop_rx, self.options.read_poll) {
                        break;
                    }
                }
                Ok(n) => {
                    attempts = 0;
                    for line in lines.push(&buf[..n]) {
                        self.handle_line(&line);
                    }
                }
                Err(e) => {
                    warn!(endpoint = %self.connector.describe(), error = %e, "Read failed");
                    self.handle.lock().take();
                    lines.clear();
                    self.emit_error(ErrorKind::Io, e.to_string());
                    if !self.reconnect(stop_rx, &mut attempts) {
                        break;
                    }
                }
            }
        }
        debug!("Reader stopped");
    }

    /// Returns false when the reader should exit
    fn reconnect(&self, stop_rx: &Receiver<()>, attempts: &mut u32) -> bool {
        let policy = self.options.reconnect;
        if !policy.enabled {
            self.give_up(format!(
                "Connection to {} lost, auto-reconnect disabled",
                self.connector.describe()
            ));
            return false;
        }

        self.set_state(ConnectionState::Reconnecting, None);
        loop {
            if *attempts >= policy.max_attempts {
                self.give_up(format!(
                    "Failed to reconnect to {} after {} attempts",
                    self.connector.describe(),
                    attempts
                ));
                return false;
            }

            let delay = policy.delay(*attempts);
            *attempts += 1;
            info!(
                attempt = *attempts,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );
            if wait_for_stop(stop_rx, delay) {
                return false;
            }

            match self.open_handle() {
                Ok(handle) => {
                    *self.handle.lock() = Some(handle);
                    self.set_state(ConnectionState::Connected, Some("reconnected".to_string()));
                    return true;
                }
                Err(e) => {
                    warn!(attempt = *attempts, error = %e, "Reconnect attempt failed");
                    self.emit_error(ErrorKind::Open, e.to_string());
                }
            }
        }
    }

    fn give_up(&self, message: String) {
        warn!(%message, "Giving up on connection");
        self.set_state(ConnectionState::Failed, Some(message.clone()));
        self.emit_error(ErrorKind::ConnectionLost, message);
    }

    fn handle_line(&self, line: &str) {
        trace!(line, "RX line");
        let _ = self.events.send(TransportEvent::RawLine(line.to_string()));
        match self.codec.decode_line(line) {
            Ok(frame) => self.publish_frame(frame),
            Err(e) if e.is_chatter() => debug!(line, "Adapter chatter"),
            Err(e) => warn!(line, error = %e, "Skipping malformed line"),
        }
    }

    fn publish_frame(&self, frame: BusFrame) {
        let counter = match frame.direction() {
            Direction::Rx => &self.frames_received,
            Direction::Tx => &self.frames_sent,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.bus.publish(frame);
    }

    fn set_state(&self, state: ConnectionState, message: Option<String>) {
        {
            let mut current = self.state.write();
            if *current == state {
                return;
            }
            *current = state;
        }
        info!(%state, message = message.as_deref().unwrap_or(""), "Connection state changed");
        let _ = self
            .events
            .send(TransportEvent::StateChanged { state, message });
    }

    fn emit_error(&self, kind: ErrorKind, message: String) {
        let _ = self.events.send(TransportEvent::Error { kind, message });
    }
}

fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty))
}

/// Sleep up to `timeout`; true if a stop arrived meanwhile
fn wait_for_stop(stop_rx: &Receiver<()>, timeout: Duration) -> bool {
    !matches!(stop_rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use busdiag_core::Frame;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone)]
    enum Step {
        Data(&'static [u8]),
        Fail,
    }

    struct ScriptedStream {
        steps: VecDeque<Step>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl StreamHandle for ScriptedStream {
        fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.written.lock().extend_from_slice(bytes);
            Ok(())
        }

        fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                None => Ok(0),
                Some(Step::Data(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(bytes);
                    Ok(bytes.len())
                }
                Some(Step::Fail) => Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")),
            }
        }

        fn clear_input(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Every open hands out a fresh copy of the same script
    struct ScriptedConnector {
        script: Vec<Step>,
        written: Arc<Mutex<Vec<u8>>>,
        opens: AtomicUsize,
    }

    impl ScriptedConnector {
        fn new(script: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                script,
                written: Arc::new(Mutex::new(Vec::new())),
                opens: AtomicUsize::new(0),
            })
        }
    }

    impl Connector for ScriptedConnector {
        fn open(&self) -> Result<Box<dyn StreamHandle>, TransportError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedStream {
                steps: self.script.iter().cloned().collect(),
                written: Arc::clone(&self.written),
            }))
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn options(dialect: Dialect) -> ConnectionOptions {
        ConnectionOptions {
            dialect,
            reconnect: ReconnectPolicy {
                enabled: true,
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
            ..ConnectionOptions::default()
        }
    }

    async fn next_can(rx: &mut broadcast::Receiver<BusFrame>) -> Frame {
        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("frame in time")
            .unwrap();
        frame.as_can().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_lines_are_decoded_and_published() {
        let connector = ScriptedConnector::new(vec![
            Step::Data(b"t7E8"),
            Step::Data(b"25003\rz\rgarbage\rt1001"),
            Step::Data(b"AA\r"),
        ]);
        let bus = FrameBus::default();
        let mut frames = bus.subscribe();
        let conn = Connection::new(connector.clone(), options(Dialect::Slcan), bus);

        conn.connect().unwrap();
        assert_eq!(conn.state(), ConnectionState::Connected);

        let first = next_can(&mut frames).await;
        assert_eq!(first.id().raw(), 0x7E8);
        assert_eq!(first.data(), &[0x50, 0x03]);
        let second = next_can(&mut frames).await;
        assert_eq!(second.id().raw(), 0x100);
        assert_eq!(conn.stats().frames_received, 2);

        conn.disconnect();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        // init on connect, close on disconnect
        assert_eq!(connector.written.lock().as_slice(), b"C\rS6\rO\rC\r");
    }

    #[tokio::test]
    async fn test_send_raw_frame_writes_and_publishes() {
        let connector = ScriptedConnector::new(Vec::new());
        let bus = FrameBus::default();
        let mut frames = bus.subscribe();
        let conn = Connection::new(connector.clone(), options(Dialect::Mcp2515), bus);
        conn.connect().unwrap();

        let id = CanId::standard(0x7E0).unwrap();
        conn.send_raw_frame(id, &[0x10, 0x03], Direction::Tx).unwrap();

        let sent = next_can(&mut frames).await;
        assert_eq!(sent.direction(), Direction::Tx);
        assert_eq!(sent.data(), &[0x10, 0x03]);
        assert_eq!(conn.stats().frames_sent, 1);
        assert!(connector
            .written
            .lock()
            .ends_with(b"SEND:7E0,2,10,03\r\n"));
        conn.disconnect();
    }

    #[test]
    fn test_send_requires_connection() {
        let conn = Connection::new(
            ScriptedConnector::new(Vec::new()),
            options(Dialect::Csv),
            FrameBus::default(),
        );
        let id = CanId::standard(0x7E0).unwrap();
        assert!(matches!(
            conn.send_raw_frame(id, &[0x3E, 0x00], Direction::Tx),
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            conn.send_raw_frame(id, &[0; 9], Direction::Tx),
            Err(TransportError::Encode(_))
        ));
    }

    #[tokio::test]
    async fn test_successful_read_resets_attempts() {
        // each stream yields one frame then fails; with max_attempts = 2 the
        // connection only survives several cycles if the counter resets
        let connector = ScriptedConnector::new(vec![Step::Data(b"1,100,01,RX\n"), Step::Fail]);
        let conn = Connection::new(connector.clone(), options(Dialect::Csv), FrameBus::default());
        let mut events = conn.subscribe_events();
        conn.connect().unwrap();

        let mut reconnects = 0;
        while reconnects < 4 {
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("event in time")
                .unwrap();
            match event {
                TransportEvent::StateChanged {
                    state: ConnectionState::Connected,
                    ..
                } => reconnects += 1,
                TransportEvent::StateChanged {
                    state: ConnectionState::Failed,
                    ..
                } => panic!("connection gave up"),
                _ => {}
            }
        }
        conn.disconnect();
        assert!(connector.opens.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test]
    async fn test_reconnect_disabled_fails_immediately() {
        let connector = ScriptedConnector::new(vec![Step::Fail]);
        let mut opts = options(Dialect::Csv);
        opts.reconnect = ReconnectPolicy::disabled();
        let conn = Connection::new(connector.clone(), opts, FrameBus::default());
        let mut events = conn.subscribe_events();
        conn.connect().unwrap();

        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("event in time")
                .unwrap();
            if let TransportEvent::Error {
                kind: ErrorKind::ConnectionLost,
                ..
            } = event
            {
                break;
            }
        }
        assert_eq!(conn.state(), ConnectionState::Failed);
        assert_eq!(connector.opens.load(Ordering::SeqCst), 1);
    }
}

// src/channel/mod.rs
//
// A single serial channel: owns the device handle, configuration, line
// framer, ring buffer and statistics. The reader runs blocking serial IO on
// a dedicated thread and publishes framed lines onto the event bus; writes
// share the port handle through a brief lock so transmit works while the
// reader keeps streaming.

pub mod encoding;
pub mod framer;
pub mod manager;
pub mod ring;

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::decode::DecoderRegistry;
use crate::error::MonitorError;
use crate::events::{Event, EventBus};
use crate::types::{now_ms, Direction, LineEntry, Parity, PortConfig, SendMode, Stats, StopBits};

use encoding::encode_payload;
use framer::LineFramer;
use ring::RingBuffer;

/// Open attempts longer than this fail with `DeviceUnavailable`.
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Blocking read timeout; also bounds how long close waits for the reader
/// to notice cancellation.
const READ_TIMEOUT: Duration = Duration::from_millis(10);

const READ_CHUNK: usize = 256;

// ============================================================================
// Device abstraction
// ============================================================================

/// Byte-stream handle to an open device.
pub trait SerialIo: Read + Write + Send {}
impl<T: Read + Write + Send> SerialIo for T {}

/// Shared port handle: the reader and writers take the lock briefly per
/// operation so neither starves the other.
pub type SharedPort = Arc<Mutex<Option<Box<dyn SerialIo>>>>;

/// Opens device handles. Injectable so tests can run channels against an
/// in-memory port.
pub trait PortOpener: Send + Sync {
    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialIo>, MonitorError>;
}

/// Opener backed by the OS serial stack.
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialIo>, MonitorError> {
        let data_bits = match config.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            _ => serialport::DataBits::Eight,
        };
        let stop_bits = match config.stop_bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
            StopBits::OnePointFive => {
                return Err(MonitorError::invalid_config(
                    "1.5 stop bits are not supported by the host serial stack",
                ))
            }
        };
        let parity = match config.parity {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Mark | Parity::Space => {
                return Err(MonitorError::invalid_config(
                    "mark/space parity is not supported by the host serial stack",
                ))
            }
        };
        let flow_control = match config.flow_control {
            crate::types::FlowControl::None => serialport::FlowControl::None,
            crate::types::FlowControl::RtsCts => serialport::FlowControl::Hardware,
            crate::types::FlowControl::XonXoff => serialport::FlowControl::Software,
        };

        let port = serialport::new(&config.path, config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(flow_control)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| MonitorError::from_serial_open(&config.path, e))?;

        Ok(Box::new(port))
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Mutable state shared with the reader thread. Locked only for short
/// critical sections, never across an await.
struct ChannelCore {
    config: Option<PortConfig>,
    connected: bool,
    stats: Stats,
    buffer: RingBuffer,
    next_index: u64,
}

impl ChannelCore {
    fn new() -> Self {
        Self {
            config: None,
            connected: false,
            stats: Stats::default(),
            buffer: RingBuffer::new(),
            next_index: 0,
        }
    }

    /// Flip to disconnected, reporting whether this call made the change.
    /// Guards the exactly-once `disconnected` event.
    fn mark_disconnected(&mut self) -> bool {
        let was_connected = self.connected;
        self.connected = false;
        self.config = None;
        self.stats.connected_at = None;
        was_connected
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PortState {
    Closed,
    Opening,
    Open,
    Closing,
}

/// Open/close bookkeeping, serialised by the lifecycle mutex.
struct Lifecycle {
    state: PortState,
    reader: Option<tokio::task::JoinHandle<()>>,
}

/// Point-in-time channel snapshot.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<PortConfig>,
    pub stats: Stats,
    pub buffer_size: usize,
}

pub struct Channel {
    id: String,
    bus: EventBus,
    decoders: Arc<DecoderRegistry>,
    core: Arc<Mutex<ChannelCore>>,
    port: SharedPort,
    cancel: Arc<AtomicBool>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
}

impl Channel {
    pub fn new(id: impl Into<String>, bus: EventBus, decoders: Arc<DecoderRegistry>) -> Self {
        Self {
            id: id.into(),
            bus,
            decoders,
            core: Arc::new(Mutex::new(ChannelCore::new())),
            port: Arc::new(Mutex::new(None)),
            cancel: Arc::new(AtomicBool::new(false)),
            lifecycle: tokio::sync::Mutex::new(Lifecycle {
                state: PortState::Closed,
                reader: None,
            }),
        }
    }

    /// Open the device. An already-open channel is closed first and
    /// reopened. Counters reset; the ring buffer is kept.
    pub async fn open(
        &self,
        config: PortConfig,
        opener: Arc<dyn PortOpener>,
    ) -> Result<(), MonitorError> {
        let mut life = self.lifecycle.lock().await;
        if life.state == PortState::Open || life.reader.is_some() {
            debug!("[serial:{}] open on open channel, reopening", self.id);
            self.close_locked(&mut life).await;
        }
        life.state = PortState::Opening;

        let open_config = config.clone();
        let opened = tokio::time::timeout(
            OPEN_TIMEOUT,
            tokio::task::spawn_blocking(move || opener.open(&open_config)),
        )
        .await;

        let handle = match opened {
            Err(_) => {
                life.state = PortState::Closed;
                return Err(MonitorError::device_unavailable(
                    &config.path,
                    "open timed out",
                ));
            }
            Ok(Err(join_err)) => {
                life.state = PortState::Closed;
                return Err(MonitorError::device_unavailable(
                    &config.path,
                    format!("open task failed: {}", join_err),
                ));
            }
            Ok(Ok(Err(e))) => {
                life.state = PortState::Closed;
                return Err(e);
            }
            Ok(Ok(Ok(handle))) => handle,
        };

        *self.port.lock().expect("port lock poisoned") = Some(handle);
        self.cancel.store(false, Ordering::SeqCst);
        {
            let mut core = self.core.lock().expect("channel lock poisoned");
            core.stats = Stats {
                connected_at: Some(now_ms()),
                ..Stats::default()
            };
            core.config = Some(config.clone());
            core.connected = true;
        }

        life.reader = Some(self.spawn_reader());
        life.state = PortState::Open;

        info!(
            "[serial:{}] opened {} at {} baud",
            self.id, config.path, config.baud_rate
        );
        self.bus.publish(Event::Connected {
            channel_id: self.id.clone(),
            config,
        });
        Ok(())
    }

    /// Close the device. Idempotent; publishes `disconnected` exactly once
    /// per prior connect.
    pub async fn close(&self) {
        let mut life = self.lifecycle.lock().await;
        self.close_locked(&mut life).await;
    }

    async fn close_locked(&self, life: &mut Lifecycle) {
        if life.state == PortState::Closed && life.reader.is_none() {
            return;
        }
        life.state = PortState::Closing;
        self.cancel.store(true, Ordering::SeqCst);

        if let Some(handle) = life.reader.take() {
            let _ = handle.await;
        }
        if let Ok(mut guard) = self.port.lock() {
            *guard = None;
        }

        let was_connected = self
            .core
            .lock()
            .expect("channel lock poisoned")
            .mark_disconnected();
        if was_connected {
            info!("[serial:{}] closed", self.id);
            self.bus.publish(Event::Disconnected {
                channel_id: self.id.clone(),
            });
        }
        life.state = PortState::Closed;
    }

    /// Encode and write one payload. Encoding and connection problems fail
    /// the call; a transient write error is surfaced on the bus instead.
    pub fn send(&self, data: &str, mode: SendMode) -> Result<(), MonitorError> {
        let payload = encode_payload(data, mode)?;

        if !self.core.lock().expect("channel lock poisoned").connected {
            return Err(MonitorError::not_connected(&self.id));
        }

        let write_result = {
            let mut guard = self.port.lock().expect("port lock poisoned");
            match guard.as_mut() {
                None => return Err(MonitorError::not_connected(&self.id)),
                Some(port) => port.write_all(&payload).and_then(|_| port.flush()),
            }
        };

        match write_result {
            Ok(()) => {
                let entry = {
                    let mut core = self.core.lock().expect("channel lock poisoned");
                    core.stats.bytes_tx += payload.len() as u64;
                    core.stats.lines_tx += 1;
                    let entry = LineEntry {
                        timestamp: now_ms(),
                        direction: Direction::Tx,
                        data: data.to_string(),
                        mode: Some(mode),
                        index: core.next_index,
                        channel_id: self.id.clone(),
                    };
                    core.next_index += 1;
                    core.buffer.push(entry.clone());
                    entry
                };
                self.bus.publish(Event::Line {
                    channel_id: self.id.clone(),
                    entry,
                    decoded: Vec::new(),
                });
                Ok(())
            }
            Err(e) => {
                warn!("[serial:{}] write failed: {}", self.id, e);
                self.core.lock().expect("channel lock poisoned").stats.errors += 1;
                self.bus.publish(Event::ChannelError {
                    channel_id: self.id.clone(),
                    error: MonitorError::transient_io(&self.id, format!("write failed: {}", e))
                        .to_string(),
                });
                Ok(())
            }
        }
    }

    /// Empty the ring buffer and rewind the index counter. Stats untouched.
    pub fn clear_buffer(&self) {
        {
            let mut core = self.core.lock().expect("channel lock poisoned");
            core.buffer.clear();
            core.next_index = 0;
        }
        self.bus.publish(Event::Cleared {
            channel_id: self.id.clone(),
        });
    }

    pub fn status(&self) -> ChannelStatus {
        let core = self.core.lock().expect("channel lock poisoned");
        ChannelStatus {
            connected: core.connected,
            config: core.config.clone(),
            stats: core.stats.clone(),
            buffer_size: core.buffer.len(),
        }
    }

    /// Buffer-relative slice copy.
    pub fn get_buffer(&self, start: usize, count: Option<usize>) -> Vec<LineEntry> {
        self.core
            .lock()
            .expect("channel lock poisoned")
            .buffer
            .slice(start, count)
    }

    fn spawn_reader(&self) -> tokio::task::JoinHandle<()> {
        let id = self.id.clone();
        let core = self.core.clone();
        let port = self.port.clone();
        let cancel = self.cancel.clone();
        let bus = self.bus.clone();
        let decoders = self.decoders.clone();

        tokio::spawn(async move {
            let task_id = id.clone();
            let result = tokio::task::spawn_blocking(move || {
                run_reader(id, core, port, cancel, bus, decoders);
            })
            .await;
            if let Err(e) = result {
                error!("[serial:{}] reader task panicked: {:?}", task_id, e);
            }
        })
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Blocking read loop. Frames lines, feeds decoders from the raw chunk
/// path, and publishes onto the bus until cancelled or the device fails.
fn run_reader(
    id: String,
    core: Arc<Mutex<ChannelCore>>,
    port: SharedPort,
    cancel: Arc<AtomicBool>,
    bus: EventBus,
    decoders: Arc<DecoderRegistry>,
) {
    let mut framer = LineFramer::new();
    let mut buf = [0u8; READ_CHUNK];
    let mut pending_decoded = Vec::new();

    loop {
        if cancel.load(Ordering::SeqCst) {
            debug!("[serial:{}] reader cancelled", id);
            break;
        }

        // Take the port lock only for the read itself so writers get a turn
        let read_result = {
            let mut guard = match port.lock() {
                Ok(g) => g,
                Err(_) => break,
            };
            match guard.as_mut() {
                Some(port) => port.read(&mut buf),
                // Port released externally
                None => break,
            }
        };

        match read_result {
            Ok(0) => {
                if !cancel.load(Ordering::SeqCst) {
                    reader_fatal(&id, &core, &port, &bus, "device closed the stream");
                }
                break;
            }
            Ok(n) => {
                let timestamp = now_ms();
                let chunk = &buf[..n];

                bus.publish(Event::RawData {
                    channel_id: id.clone(),
                    bytes: chunk.to_vec(),
                    timestamp,
                });

                // Decoders see pre-framing bytes; results ride on the next
                // emitted line.
                pending_decoded.extend(decoders.decode_all(chunk));

                let lines = framer.feed(chunk);
                let mut events = Vec::with_capacity(lines.len());
                {
                    let mut core = match core.lock() {
                        Ok(c) => c,
                        Err(_) => break,
                    };
                    core.stats.bytes_rx += n as u64;
                    for line in lines {
                        let entry = LineEntry {
                            timestamp,
                            direction: Direction::Rx,
                            data: line,
                            mode: None,
                            index: core.next_index,
                            channel_id: id.clone(),
                        };
                        core.next_index += 1;
                        core.stats.lines_rx += 1;
                        core.buffer.push(entry.clone());
                        events.push(Event::Line {
                            channel_id: id.clone(),
                            entry,
                            decoded: std::mem::take(&mut pending_decoded),
                        });
                    }
                }
                for event in events {
                    bus.publish(event);
                }
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {
                // Recoverable hiccup: count it, tell subscribers, keep going
                if let Ok(mut core) = core.lock() {
                    core.stats.errors += 1;
                }
                bus.publish(Event::ChannelError {
                    channel_id: id.clone(),
                    error: MonitorError::transient_io(&id, e.to_string()).to_string(),
                });
            }
            Err(e) => {
                if !cancel.load(Ordering::SeqCst) {
                    reader_fatal(&id, &core, &port, &bus, &format!("read failed: {}", e));
                }
                break;
            }
        }
    }

    if framer.pending() > 0 {
        debug!(
            "[serial:{}] discarding {} unterminated bytes",
            id,
            framer.pending()
        );
    }
}

/// Unrecoverable device failure: publish `error` then `disconnected` (in
/// that order), release the port, leave the channel closed.
fn reader_fatal(
    id: &str,
    core: &Arc<Mutex<ChannelCore>>,
    port: &SharedPort,
    bus: &EventBus,
    message: &str,
) {
    warn!("[serial:{}] {}", id, message);
    if let Ok(mut core) = core.lock() {
        core.stats.errors += 1;
    }
    bus.publish(Event::ChannelError {
        channel_id: id.to_string(),
        error: MonitorError::fatal_io(id, message).to_string(),
    });

    if let Ok(mut guard) = port.lock() {
        *guard = None;
    }
    let was_connected = core
        .lock()
        .map(|mut core| core.mark_disconnected())
        .unwrap_or(false);
    if was_connected {
        bus.publish(Event::Disconnected {
            channel_id: id.to_string(),
        });
    }
}

// ============================================================================
// Test support
// ============================================================================


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::events::Subscription;

    fn setup() -> (EventBus, Arc<DecoderRegistry>, Arc<FakeOpener>) {
        (
            EventBus::new(),
            Arc::new(DecoderRegistry::with_all()),
            FakeOpener::new(),
        )
    }

    async fn next_event(sub: &mut Subscription) -> Arc<Event> {
        tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("timed out waiting for event")
            .expect("bus closed")
    }

    /// Skip raw-data events, returning the next line event.
    async fn next_line(sub: &mut Subscription) -> (LineEntry, Vec<crate::decode::DecodedFrame>) {
        loop {
            let event = next_event(sub).await;
            if let Event::Line { entry, decoded, .. } = event.as_ref() {
                return (entry.clone(), decoded.clone());
            }
        }
    }

    #[tokio::test]
    async fn test_single_line_rx() {
        let (bus, decoders, opener) = setup();
        let channel = Channel::new("a", bus.clone(), decoders);
        let mut sub = bus.subscribe();

        channel
            .open(test_config("/dev/loop0"), opener.clone())
            .await
            .unwrap();
        assert!(matches!(
            next_event(&mut sub).await.as_ref(),
            Event::Connected { .. }
        ));

        opener.device("/dev/loop0").emit(b"hello\n");

        let (entry, decoded) = next_line(&mut sub).await;
        assert_eq!(entry.data, "hello");
        assert_eq!(entry.direction, Direction::Rx);
        assert_eq!(entry.index, 0);
        assert!(decoded.is_empty());

        let status = channel.status();
        assert_eq!(status.stats.lines_rx, 1);
        assert_eq!(status.stats.bytes_rx, 6);
        assert_eq!(status.buffer_size, 1);

        channel.close().await;
    }

    #[tokio::test]
    async fn test_split_terminator() {
        let (bus, decoders, opener) = setup();
        let channel = Channel::new("a", bus.clone(), decoders);
        let mut sub = bus.subscribe();

        channel
            .open(test_config("/dev/loop0"), opener.clone())
            .await
            .unwrap();

        let device = opener.device("/dev/loop0");
        device.emit(b"foo\r");
        // Give the reader a pass so the chunks arrive separately
        tokio::time::sleep(Duration::from_millis(30)).await;
        device.emit(b"\nbar\n");

        let (first, _) = next_line(&mut sub).await;
        let (second, _) = next_line(&mut sub).await;
        assert_eq!(first.data, "foo");
        assert_eq!(second.data, "bar");
        assert_eq!(first.index, 0);
        assert_eq!(second.index, 1);
        assert!(second.timestamp >= first.timestamp);

        channel.close().await;
    }

    #[tokio::test]
    async fn test_modbus_decode_attached_to_line() {
        let (bus, decoders, opener) = setup();
        let channel = Channel::new("a", bus.clone(), decoders);
        let mut sub = bus.subscribe();

        channel
            .open(test_config("/dev/loop0"), opener.clone())
            .await
            .unwrap();

        // Valid Read Holding Registers response; the 0x0A payload byte
        // doubles as the line terminator.
        opener
            .device("/dev/loop0")
            .emit(&[0x01, 0x03, 0x02, 0x00, 0x0A, 0x38, 0x43]);

        let (_, decoded) = next_line(&mut sub).await;
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].protocol, "Modbus RTU");
        assert_eq!(decoded[0].fields["slaveAddress"], 1);
        assert_eq!(decoded[0].fields["functionCode"], "0x03");
        assert_eq!(decoded[0].fields["crcValid"], true);

        channel.close().await;
    }

    #[tokio::test]
    async fn test_send_appends_tx_entry() {
        let (bus, decoders, opener) = setup();
        let channel = Channel::new("a", bus.clone(), decoders);

        channel
            .open(test_config("/dev/loop0"), opener.clone())
            .await
            .unwrap();

        channel.send("PING", SendMode::Ascii).unwrap();

        // The tx entry is in the buffer before send returns
        let entries = channel.get_buffer(0, None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].data, "PING");
        assert_eq!(entries[0].direction, Direction::Tx);
        assert_eq!(entries[0].mode, Some(SendMode::Ascii));

        let status = channel.status();
        assert_eq!(status.stats.lines_tx, 1);
        assert_eq!(status.stats.bytes_tx, 5);

        assert_eq!(opener.device("/dev/loop0").written(), b"PING\n".to_vec());

        channel.close().await;
    }

    #[tokio::test]
    async fn test_send_requires_open_channel() {
        let (bus, decoders, _) = setup();
        let channel = Channel::new("a", bus, decoders);
        let result = channel.send("PING", SendMode::Ascii);
        assert!(matches!(result, Err(MonitorError::NotConnected { .. })));
    }

    #[tokio::test]
    async fn test_send_surfaces_write_errors_on_bus() {
        let (bus, decoders, opener) = setup();
        let channel = Channel::new("a", bus.clone(), decoders);
        let mut sub = bus.subscribe();

        channel
            .open(test_config("/dev/loop0"), opener.clone())
            .await
            .unwrap();
        let _ = next_event(&mut sub).await; // connected

        opener.device("/dev/loop0").fail_writes(true);
        // Write failure does not fail the call
        channel.send("PING", SendMode::Ascii).unwrap();

        loop {
            let event = next_event(&mut sub).await;
            if let Event::ChannelError { error, .. } = event.as_ref() {
                assert!(error.contains("write failed"));
                break;
            }
        }
        assert_eq!(channel.status().stats.errors, 1);

        channel.close().await;
    }

    #[tokio::test]
    async fn test_clear_buffer_is_idempotent() {
        let (bus, decoders, opener) = setup();
        let channel = Channel::new("a", bus.clone(), decoders);

        channel
            .open(test_config("/dev/loop0"), opener.clone())
            .await
            .unwrap();
        channel.send("one", SendMode::Ascii).unwrap();
        let stats_before = channel.status().stats.clone();

        channel.clear_buffer();
        channel.clear_buffer();

        assert_eq!(channel.status().buffer_size, 0);
        // Index restarts from zero, stats keep counting
        channel.send("two", SendMode::Ascii).unwrap();
        let entries = channel.get_buffer(0, None);
        assert_eq!(entries[0].index, 0);
        assert!(channel.status().stats.lines_tx > stats_before.lines_tx);

        channel.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (bus, decoders, opener) = setup();
        let channel = Channel::new("a", bus.clone(), decoders);
        let mut sub = bus.subscribe();

        channel
            .open(test_config("/dev/loop0"), opener.clone())
            .await
            .unwrap();
        let _ = next_event(&mut sub).await; // connected

        channel.close().await;
        channel.close().await;

        let mut disconnects = 0;
        while let Some(event) = sub.try_recv() {
            if matches!(event.as_ref(), Event::Disconnected { .. }) {
                disconnects += 1;
            }
        }
        assert_eq!(disconnects, 1);
        assert!(!channel.status().connected);
    }

    #[tokio::test]
    async fn test_reopen_resets_stats_but_keeps_buffer() {
        let (bus, decoders, opener) = setup();
        let channel = Channel::new("a", bus.clone(), decoders);

        channel
            .open(test_config("/dev/loop0"), opener.clone())
            .await
            .unwrap();
        channel.send("kept", SendMode::Ascii).unwrap();
        channel.close().await;

        channel
            .open(test_config("/dev/loop0"), opener.clone())
            .await
            .unwrap();
        let status = channel.status();
        assert_eq!(status.stats.lines_tx, 0);
        assert_eq!(status.buffer_size, 1);
        // Index continues, never rewound by reopen
        channel.send("next", SendMode::Ascii).unwrap();
        let entries = channel.get_buffer(0, None);
        assert_eq!(entries[1].index, 1);

        channel.close().await;
    }

    #[tokio::test]
    async fn test_device_eof_publishes_error_then_disconnected() {
        let (bus, decoders, opener) = setup();
        let channel = Channel::new("a", bus.clone(), decoders);
        let mut sub = bus.subscribe();

        channel
            .open(test_config("/dev/loop0"), opener.clone())
            .await
            .unwrap();
        let _ = next_event(&mut sub).await; // connected

        opener.device("/dev/loop0").hang_up();

        let mut saw_error = false;
        loop {
            let event = next_event(&mut sub).await;
            match event.as_ref() {
                Event::ChannelError { .. } => saw_error = true,
                Event::Disconnected { .. } => {
                    assert!(saw_error, "error event must precede disconnected");
                    break;
                }
                _ => {}
            }
        }
        assert!(!channel.status().connected);

        // A later explicit close adds no second disconnected event
        channel.close().await;
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_open_failure_maps_to_device_unavailable() {
        let (bus, decoders, opener) = setup();
        let channel = Channel::new("a", bus, decoders);
        opener.mark_unavailable("/dev/gone");

        let result = channel.open(test_config("/dev/gone"), opener.clone()).await;
        assert!(matches!(
            result,
            Err(MonitorError::DeviceUnavailable { .. })
        ));
        assert!(!channel.status().connected);
    }

    #[tokio::test]
    async fn test_raw_data_precedes_line() {
        let (bus, decoders, opener) = setup();
        let channel = Channel::new("a", bus.clone(), decoders);
        let mut sub = bus.subscribe();

        channel
            .open(test_config("/dev/loop0"), opener.clone())
            .await
            .unwrap();
        let _ = next_event(&mut sub).await; // connected

        opener.device("/dev/loop0").emit(b"ok\n");

        let first = next_event(&mut sub).await;
        match first.as_ref() {
            Event::RawData { bytes, .. } => assert_eq!(bytes, b"ok\n"),
            other => panic!("expected raw-data first, got {:?}", other),
        }
        let second = next_event(&mut sub).await;
        assert!(matches!(second.as_ref(), Event::Line { .. }));

        channel.close().await;
    }
}

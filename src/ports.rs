// src/ports.rs
//
// Serial port enumeration and hot-plug detection.
// Polls the OS port list on an interval and publishes deltas on the bus.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::MonitorError;
use crate::events::{Event, EventBus};

/// Information about an available serial port
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub friendly_name: String,
}

/// List available serial ports.
///
/// On macOS, filters out /dev/tty.* devices and only shows /dev/cu.* devices.
/// The cu (calling unit) devices are non-blocking and preferred for outgoing
/// connections; the tty devices block on open waiting for carrier detect.
pub fn list_ports() -> Result<Vec<PortInfo>, MonitorError> {
    let ports = serialport::available_ports()
        .map_err(|e| MonitorError::transient_io("ports", format!("enumeration failed: {}", e)))?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let (manufacturer, product, serial_number, vendor_id, product_id) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    info.manufacturer,
                    info.product,
                    info.serial_number,
                    Some(format!("{:04x}", info.vid)),
                    Some(format!("{:04x}", info.pid)),
                ),
                _ => (None, None, None, None, None),
            };
            let friendly_name = product.unwrap_or_else(|| p.port_name.clone());
            PortInfo {
                path: p.port_name,
                manufacturer,
                serial_number,
                vendor_id,
                product_id,
                friendly_name,
            }
        })
        .collect())
}

// ============================================================================
// Hot-plug watcher
// ============================================================================

/// Enumeration source, injectable for tests.
pub type PortLister = Arc<dyn Fn() -> Result<Vec<PortInfo>, MonitorError> + Send + Sync>;

/// Periodic port enumeration task. Compares the sorted path set against the
/// previous snapshot and publishes `ports-changed` with the full new list on
/// any difference. Enumeration failures are logged and treated as no change.
pub struct PortWatcher {
    bus: EventBus,
    lister: PortLister,
    stop: Arc<Notify>,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PortWatcher {
    pub fn new(bus: EventBus, lister: PortLister) -> Self {
        Self {
            bus,
            lister,
            stop: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        }
    }

    /// Watcher backed by the OS enumeration.
    pub fn system(bus: EventBus) -> Self {
        Self::new(bus, Arc::new(list_ports))
    }

    /// Start the poll loop. A second call while running is a no-op.
    pub fn start(&self, interval_ms: u64) {
        let mut guard = match self.handle.lock() {
            Ok(g) => g,
            Err(_) => return,
        };
        if guard.is_some() {
            return;
        }

        let bus = self.bus.clone();
        let lister = self.lister.clone();
        let stop = self.stop.clone();
        let interval = Duration::from_millis(interval_ms.max(100));

        info!("[ports] watching for hot-plug every {:?}", interval);
        *guard = Some(tokio::spawn(async move {
            run_poll_loop(bus, lister, stop, interval).await;
        }));
    }

    /// Stop the poll loop and wait for the task to finish.
    pub async fn stop(&self) {
        let handle = match self.handle.lock() {
            Ok(mut g) => g.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            self.stop.notify_one();
            let _ = handle.await;
            debug!("[ports] watcher stopped");
        }
    }
}

async fn run_poll_loop(bus: EventBus, lister: PortLister, stop: Arc<Notify>, interval: Duration) {
    let mut previous: Vec<String> = Vec::new();
    let mut first = true;

    loop {
        if !first {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stop.notified() => break,
            }
        }
        first = false;

        let lister = lister.clone();
        let ports = match tokio::task::spawn_blocking(move || lister()).await {
            Ok(Ok(ports)) => ports,
            Ok(Err(e)) => {
                warn!("[ports] enumeration failed: {}", e);
                continue;
            }
            Err(e) => {
                warn!("[ports] enumeration task failed: {}", e);
                continue;
            }
        };

        let mut paths: Vec<String> = ports.iter().map(|p| p.path.clone()).collect();
        paths.sort();

        if paths != previous {
            debug!("[ports] set changed: {:?}", paths);
            previous = paths;
            bus.publish(Event::PortsChanged { ports });
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn port(path: &str) -> PortInfo {
        PortInfo {
            path: path.to_string(),
            manufacturer: None,
            serial_number: None,
            vendor_id: None,
            product_id: None,
            friendly_name: path.to_string(),
        }
    }

    #[tokio::test]
    async fn test_publishes_once_per_change() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        // First poll sees one port, later polls see two.
        let polls = Arc::new(AtomicUsize::new(0));
        let polls_clone = polls.clone();
        let lister: PortLister = Arc::new(move || {
            let n = polls_clone.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(vec![port("/dev/ttyUSB0")])
            } else {
                Ok(vec![port("/dev/ttyUSB0"), port("/dev/ttyUSB1")])
            }
        });

        let watcher = PortWatcher::new(bus.clone(), lister);
        watcher.start(100);

        // Initial snapshot broadcast
        let first = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .unwrap()
            .unwrap();
        match first.as_ref() {
            Event::PortsChanged { ports } => assert_eq!(ports.len(), 1),
            other => panic!("unexpected event: {:?}", other),
        }

        // Hot-plug broadcast with both paths
        let second = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .unwrap()
            .unwrap();
        match second.as_ref() {
            Event::PortsChanged { ports } => {
                let paths: Vec<&str> = ports.iter().map(|p| p.path.as_str()).collect();
                assert_eq!(paths, vec!["/dev/ttyUSB0", "/dev/ttyUSB1"]);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // No further broadcast while the set stays stable
        let quiet = tokio::time::timeout(Duration::from_millis(400), sub.recv()).await;
        assert!(quiet.is_err(), "expected no broadcast for unchanged set");

        watcher.stop().await;
    }

    #[tokio::test]
    async fn test_enumeration_failure_is_no_change() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        let polls = Arc::new(AtomicUsize::new(0));
        let polls_clone = polls.clone();
        let lister: PortLister = Arc::new(move || {
            let n = polls_clone.fetch_add(1, Ordering::SeqCst);
            match n {
                0 => Ok(vec![port("/dev/ttyUSB0")]),
                1 => Err(MonitorError::transient_io("ports", "enumeration failed")),
                _ => Ok(vec![port("/dev/ttyUSB0")]),
            }
        });

        let watcher = PortWatcher::new(bus.clone(), lister);
        watcher.start(100);

        let first = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first.as_ref(), Event::PortsChanged { .. }));

        // The failed poll and the identical recovery poll publish nothing.
        let quiet = tokio::time::timeout(Duration::from_millis(400), sub.recv()).await;
        assert!(quiet.is_err());

        watcher.stop().await;
    }
}

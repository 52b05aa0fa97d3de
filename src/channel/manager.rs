// src/channel/manager.rs
//
// Mapping from channel id to channel, with lazy allocation and lifecycle
// delegation. The manager is the single owner of the opener and hands every
// channel the shared bus and decoder registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::decode::DecoderRegistry;
use crate::error::MonitorError;
use crate::events::EventBus;
use crate::types::{LineEntry, PortConfig, SendMode, DEFAULT_CHANNEL};

use super::{Channel, ChannelStatus, PortOpener};

pub struct ChannelManager {
    channels: Mutex<HashMap<String, Arc<Channel>>>,
    bus: EventBus,
    decoders: Arc<DecoderRegistry>,
    opener: Arc<dyn PortOpener>,
}

impl ChannelManager {
    pub fn new(bus: EventBus, decoders: Arc<DecoderRegistry>, opener: Arc<dyn PortOpener>) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            bus,
            decoders,
            opener,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Normalise a caller-supplied id; empty falls back to the reserved
    /// default channel.
    fn normalise(id: &str) -> &str {
        if id.is_empty() {
            DEFAULT_CHANNEL
        } else {
            id
        }
    }

    /// Fetch the channel, creating a fresh closed one if absent. The single
    /// entry point for new channels.
    pub fn get(&self, id: &str) -> Arc<Channel> {
        let id = Self::normalise(id);
        let mut channels = self.channels.lock().expect("channel map lock poisoned");
        channels
            .entry(id.to_string())
            .or_insert_with(|| {
                Arc::new(Channel::new(id, self.bus.clone(), self.decoders.clone()))
            })
            .clone()
    }

    pub async fn connect(&self, id: &str, config: PortConfig) -> Result<(), MonitorError> {
        self.get(id).open(config, self.opener.clone()).await
    }

    pub async fn disconnect(&self, id: &str) {
        self.get(id).close().await;
    }

    pub fn send(&self, id: &str, data: &str, mode: SendMode) -> Result<(), MonitorError> {
        self.get(id).send(data, mode)
    }

    pub fn clear_buffer(&self, id: &str) {
        self.get(id).clear_buffer();
    }

    pub fn get_buffer(&self, id: &str, start: usize, count: Option<usize>) -> Vec<LineEntry> {
        self.get(id).get_buffer(start, count)
    }

    pub fn get_status(&self, id: &str) -> ChannelStatus {
        self.get(id).status()
    }

    /// Snapshot of every known channel's status, keyed by id.
    pub fn status_all(&self) -> HashMap<String, ChannelStatus> {
        let channels: Vec<(String, Arc<Channel>)> = {
            let map = self.channels.lock().expect("channel map lock poisoned");
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        channels
            .into_iter()
            .map(|(id, channel)| (id, channel.status()))
            .collect()
    }

    /// Close (if open) and drop the channel entirely. Later references
    /// create a fresh one. Returns whether the id existed.
    pub async fn remove_channel(&self, id: &str) -> bool {
        let removed = {
            let mut channels = self.channels.lock().expect("channel map lock poisoned");
            channels.remove(Self::normalise(id))
        };
        match removed {
            Some(channel) => {
                channel.close().await;
                info!("[manager] removed channel '{}'", Self::normalise(id));
                true
            }
            None => false,
        }
    }

    /// Close every open channel and wait for their readers. Best effort,
    /// called on process termination.
    pub async fn shutdown_all(&self) {
        let channels: Vec<Arc<Channel>> = {
            let map = self.channels.lock().expect("channel map lock poisoned");
            map.values().cloned().collect()
        };
        for channel in channels {
            channel.close().await;
        }
        info!("[manager] all channels closed");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testutil::{test_config, FakeOpener};
    use crate::events::Event;
    use std::time::Duration;

    fn manager_with_fakes() -> (Arc<ChannelManager>, Arc<FakeOpener>, EventBus) {
        let bus = EventBus::new();
        let opener = FakeOpener::new();
        let manager = Arc::new(ChannelManager::new(
            bus.clone(),
            Arc::new(DecoderRegistry::with_all()),
            opener.clone(),
        ));
        (manager, opener, bus)
    }

    #[tokio::test]
    async fn test_lazy_channel_creation() {
        let (manager, _, _) = manager_with_fakes();
        let status = manager.get_status("fresh");
        assert!(!status.connected);
        assert_eq!(status.buffer_size, 0);
        assert_eq!(manager.status_all().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_id_falls_back_to_default() {
        let (manager, _, _) = manager_with_fakes();
        manager.get("");
        assert!(manager.status_all().contains_key(DEFAULT_CHANNEL));
    }

    #[tokio::test]
    async fn test_two_channel_isolation() {
        let (manager, opener, bus) = manager_with_fakes();
        let mut sub = bus.subscribe();

        manager.connect("a", test_config("/dev/loopA")).await.unwrap();
        manager.connect("b", test_config("/dev/loopB")).await.unwrap();

        manager.send("a", "only a", SendMode::Ascii).unwrap();

        let status_b = manager.get_status("b");
        assert_eq!(status_b.stats.lines_tx, 0);
        assert_eq!(status_b.buffer_size, 0);
        assert_eq!(manager.get_status("a").stats.lines_tx, 1);

        // No line event for channel b
        tokio::time::sleep(Duration::from_millis(50)).await;
        while let Some(event) = sub.try_recv() {
            if let Event::Line { channel_id, .. } = event.as_ref() {
                assert_eq!(channel_id, "a");
            }
        }

        // Clearing a must not touch b
        manager.send("b", "for b", SendMode::Ascii).unwrap();
        manager.clear_buffer("a");
        assert_eq!(manager.get_status("a").buffer_size, 0);
        assert_eq!(manager.get_status("b").buffer_size, 1);

        manager.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_remove_channel_forgets_state() {
        let (manager, _, _) = manager_with_fakes();

        manager.connect("a", test_config("/dev/loopA")).await.unwrap();
        manager.send("a", "hello", SendMode::Ascii).unwrap();
        assert!(manager.remove_channel("a").await);
        assert!(!manager.remove_channel("a").await);

        // A later reference creates a fresh closed channel
        let status = manager.get_status("a");
        assert!(!status.connected);
        assert_eq!(status.buffer_size, 0);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_via_manager() {
        let (manager, _, bus) = manager_with_fakes();
        let mut sub = bus.subscribe();

        manager.connect("a", test_config("/dev/loopA")).await.unwrap();
        manager.disconnect("a").await;
        manager.disconnect("a").await;

        let mut disconnects = 0;
        while let Some(event) = sub.try_recv() {
            if matches!(event.as_ref(), Event::Disconnected { .. }) {
                disconnects += 1;
            }
        }
        assert_eq!(disconnects, 1);
    }

    #[tokio::test]
    async fn test_shutdown_all_closes_everything() {
        let (manager, _, _) = manager_with_fakes();
        manager.connect("a", test_config("/dev/loopA")).await.unwrap();
        manager.connect("b", test_config("/dev/loopB")).await.unwrap();

        manager.shutdown_all().await;

        for status in manager.status_all().values() {
            assert!(!status.connected);
        }
    }
}

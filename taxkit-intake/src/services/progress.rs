//! Progress broadcaster
//!
//! Registry mapping a customer id to the set of live progress listeners.
//! `publish` is best-effort fan-out and a no-op (not an error) with no
//! listeners; dropping the last subscription for a key removes the key.
//! Safe for concurrent subscribe/publish/unsubscribe from any number of
//! connections.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use taxkit_common::events::IntakeEvent;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 64;

/// Concurrent registry of per-customer progress channels
#[derive(Clone)]
pub struct ProgressRegistry {
    channels: Arc<Mutex<HashMap<Uuid, broadcast::Sender<IntakeEvent>>>>,
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to progress events for one customer
    ///
    /// The returned subscription removes itself from the registry on drop;
    /// when the last listener for a key departs, the key entry is dropped.
    pub fn subscribe(&self, key: Uuid) -> ProgressSubscription {
        let rx = {
            let mut channels = self.channels.lock().expect("progress registry poisoned");
            channels
                .entry(key)
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .subscribe()
        };

        tracing::debug!(customer_id = %key, "Progress listener subscribed");

        ProgressSubscription {
            key,
            rx: Some(rx),
            registry: self.clone(),
        }
    }

    /// Deliver an event to every live listener for the key
    ///
    /// No listeners is a no-op. A listener that has lagged past channel
    /// capacity misses old events but keeps receiving new ones; a dead
    /// listener is cleaned up when its subscription drops.
    pub fn publish(&self, key: Uuid, event: IntakeEvent) {
        let mut channels = self.channels.lock().expect("progress registry poisoned");
        if let Some(tx) = channels.get(&key) {
            if tx.send(event).is_err() {
                // All receivers vanished without unsubscribing cleanly
                channels.remove(&key);
            }
        }
    }

    /// Number of live listeners for a key
    pub fn listener_count(&self, key: Uuid) -> usize {
        let channels = self.channels.lock().expect("progress registry poisoned");
        channels.get(&key).map_or(0, |tx| tx.receiver_count())
    }

    /// Number of keys currently held
    pub fn key_count(&self) -> usize {
        self.channels.lock().expect("progress registry poisoned").len()
    }

    fn release(&self, key: Uuid) {
        let mut channels = self.channels.lock().expect("progress registry poisoned");
        if let Some(tx) = channels.get(&key) {
            if tx.receiver_count() == 0 {
                channels.remove(&key);
                tracing::debug!(customer_id = %key, "Last progress listener gone; key dropped");
            }
        }
    }
}

/// Live handle to a customer's progress stream
pub struct ProgressSubscription {
    key: Uuid,
    rx: Option<broadcast::Receiver<IntakeEvent>>,
    registry: ProgressRegistry,
}

impl ProgressSubscription {
    /// Receive the next event; None when the channel is gone
    ///
    /// Lagging (joining mid-sequence or falling behind) skips missed
    /// events rather than ending the stream — there is no replay.
    pub async fn recv(&mut self) -> Option<IntakeEvent> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(customer_id = %self.key, skipped, "Progress listener lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        // Drop our receiver first so the registry sees the true count
        self.rx.take();
        self.registry.release(self.key);
    }
}

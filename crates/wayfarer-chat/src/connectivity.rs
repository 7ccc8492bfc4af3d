//! Online/offline signal.
//!
//! The host updates the signal from whatever connectivity source it has;
//! the chat view reads it before every send.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::info;

use wayfarer_core::events::{ChatEvent, EventBus};

/// Shared boolean connectivity state. Clones observe the same value.
#[derive(Debug, Clone)]
pub struct ConnectivitySignal {
    tx: Arc<watch::Sender<bool>>,
    events: EventBus,
}

impl ConnectivitySignal {
    pub fn new(online: bool, events: EventBus) -> Self {
        let (tx, _) = watch::channel(online);
        Self {
            tx: Arc::new(tx),
            events,
        }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Publish a new state. Emits `ConnectivityChanged` only on a transition.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "Connectivity changed");
            self.events.emit(ChatEvent::ConnectivityChanged {
                online,
                timestamp: Utc::now(),
            });
        }
    }

    /// Watch for transitions.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let signal = ConnectivitySignal::new(true, EventBus::default());
        assert!(signal.is_online());
    }

    #[test]
    fn test_clones_share_state() {
        let signal = ConnectivitySignal::new(true, EventBus::default());
        let other = signal.clone();
        other.set_online(false);
        assert!(!signal.is_online());
    }

    #[test]
    fn test_event_only_on_transition() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        let signal = ConnectivitySignal::new(true, bus);

        signal.set_online(true);
        assert!(sub.try_recv().is_none());

        signal.set_online(false);
        match sub.try_recv() {
            Some(ChatEvent::ConnectivityChanged { online, .. }) => assert!(!online),
            other => panic!("unexpected event: {:?}", other),
        }
        signal.set_online(false);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_watch_sees_transition() {
        let signal = ConnectivitySignal::new(false, EventBus::default());
        let mut rx = signal.watch();
        signal.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}

//! Subscription manager for broadcasting session events.

use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{
    DropReason, SessionEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};

/// Internal subscription state.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<SessionEvent>,
}

impl Subscription {
    /// Try to send an event. Returns false if buffer is full (subscriber will be dropped).
    fn try_send(&self, event: SessionEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }

    fn wants(&self, event: &SessionEvent) -> bool {
        match event {
            SessionEvent::CheckpointCreated { .. } => self.config.include_checkpoints,
            SessionEvent::ScopeEntered { .. } | SessionEvent::ScopeExited { .. } => {
                self.config.include_scopes
            }
            SessionEvent::CallbackCompleted { .. } => self.config.include_callbacks,
            SessionEvent::Finished { .. } | SessionEvent::Dropped { .. } => true,
        }
    }
}

/// Manages subscriptions and broadcasts events.
///
/// Broadcasting never blocks the capturing thread: a subscriber whose buffer
/// is full is dropped.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.subscriptions
            .write()
            .insert(id, Subscription { config, sender });

        SubscriptionHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.remove(&id) {
            // Send dropped event (best effort)
            let _ = sub.sender.try_send(SessionEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Whether anyone is listening. Lets callers skip building events.
    pub fn has_subscribers(&self) -> bool {
        !self.subscriptions.read().is_empty()
    }

    /// Send an event to every interested subscriber. Drops subscribers that
    /// fail to receive.
    pub fn broadcast(&self, event: SessionEvent) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if sub.wants(&event) && !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        // Remove dropped subscriptions
        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    tracing::warn!(subscription = id.0, "dropping slow subscriber");
                    // Try to notify about the drop (might fail, that's ok)
                    let _ = sub.sender.try_send(SessionEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Step;
    use std::time::Duration;

    #[test]
    fn test_subscribe_unsubscribe() {
        let manager = SubscriptionManager::new();

        let handle = manager.subscribe(SubscriptionConfig::default());
        assert_eq!(manager.subscription_count(), 1);

        manager.unsubscribe(handle.id);
        assert_eq!(manager.subscription_count(), 0);

        let event = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(
            event,
            SessionEvent::Dropped {
                reason: DropReason::Unsubscribed
            }
        );
    }

    #[test]
    fn test_broadcast_to_matching() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig::default());

        manager.broadcast(SessionEvent::CheckpointCreated { step: Step(4) });

        let event = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(event, SessionEvent::CheckpointCreated { step: Step(4) });
    }

    #[test]
    fn test_broadcast_filters_non_matching() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig::lifecycle());

        manager.broadcast(SessionEvent::CheckpointCreated { step: Step(0) });

        let result = handle.recv_timeout(Duration::from_millis(50));
        assert!(result.is_err());
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let manager = SubscriptionManager::new();
        let config = SubscriptionConfig {
            buffer_size: 2,
            ..Default::default()
        };
        let _handle = manager.subscribe(config);

        // Flood with events
        for i in 0..10 {
            manager.broadcast(SessionEvent::CheckpointCreated { step: Step(i) });
        }

        // Subscriber should be dropped
        assert_eq!(manager.subscription_count(), 0);
    }
}

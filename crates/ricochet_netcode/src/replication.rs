//! # State Replication
//!
//! Publish/subscribe of immutable snapshots. The server publishes; clients
//! react. No shared mutable state, no change callbacks.
//!
//! [`ReplicationChannel`] is the seam the real transport implements.
//! [`LocalReplication`] fans messages out to in-process subscribers over
//! bounded crossbeam channels; tests and the headless server use it.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use ricochet_shared::{DamageEvent, EffectEvent, EntityId, StateUpdate};

/// Everything the server replicates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Replicated {
    /// Authoritative snapshot of one entity
    State(StateUpdate),
    /// Damage dealt
    Damage(DamageEvent),
    /// Fire-and-forget effect
    Effect(EffectEvent),
}

impl Replicated {
    /// The state update, if this is one addressed to `entity`.
    #[must_use]
    pub fn state_for(&self, entity: EntityId) -> Option<&StateUpdate> {
        match self {
            Self::State(update) if update.entity == entity => Some(update),
            _ => None,
        }
    }
}

/// Outbound side of the replication transport. Must never block.
pub trait ReplicationChannel {
    /// Broadcasts one entity's snapshot.
    fn publish_state(&self, update: &StateUpdate);

    /// Broadcasts a damage event.
    fn publish_damage(&self, event: &DamageEvent);

    /// Broadcasts an effect.
    fn publish_effect(&self, event: &EffectEvent);
}

/// Discards everything. For benchmarks and server-only tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullReplication;

impl ReplicationChannel for NullReplication {
    fn publish_state(&self, _update: &StateUpdate) {}
    fn publish_damage(&self, _event: &DamageEvent) {}
    fn publish_effect(&self, _event: &EffectEvent) {}
}

/// In-process fan-out to any number of subscribers.
#[derive(Debug)]
pub struct LocalReplication {
    subscribers: RwLock<Vec<Sender<Replicated>>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl LocalReplication {
    /// Creates a channel whose subscriber queues hold `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Registers a subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<Replicated> {
        let (tx, rx) = crossbeam_channel::bounded(self.capacity);
        self.subscribers.write().push(tx);
        rx
    }

    /// Live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Messages dropped because a subscriber queue was full
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn publish(&self, message: Replicated) {
        // Upgradable: indices stay valid until the upgrade below.
        let subscribers = self.subscribers.upgradable_read();
        let mut closed = Vec::new();

        for (index, tx) in subscribers.iter().enumerate() {
            match tx.try_send(message) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => closed.push(index),
            }
        }

        if !closed.is_empty() {
            let mut subscribers = RwLockUpgradableReadGuard::upgrade(subscribers);
            for index in closed.into_iter().rev() {
                subscribers.swap_remove(index);
            }
        }
    }
}

impl Default for LocalReplication {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl ReplicationChannel for LocalReplication {
    fn publish_state(&self, update: &StateUpdate) {
        self.publish(Replicated::State(*update));
    }

    fn publish_damage(&self, event: &DamageEvent) {
        self.publish(Replicated::Damage(*event));
    }

    fn publish_effect(&self, event: &EffectEvent) {
        self.publish(Replicated::Effect(*event));
    }
}

impl<T: ReplicationChannel + ?Sized> ReplicationChannel for &T {
    fn publish_state(&self, update: &StateUpdate) {
        (**self).publish_state(update);
    }

    fn publish_damage(&self, event: &DamageEvent) {
        (**self).publish_damage(event);
    }

    fn publish_effect(&self, event: &EffectEvent) {
        (**self).publish_effect(event);
    }
}

impl<T: ReplicationChannel + ?Sized> ReplicationChannel for std::sync::Arc<T> {
    fn publish_state(&self, update: &StateUpdate) {
        (**self).publish_state(update);
    }

    fn publish_damage(&self, event: &DamageEvent) {
        (**self).publish_damage(event);
    }

    fn publish_effect(&self, event: &EffectEvent) {
        (**self).publish_effect(event);
    }
}

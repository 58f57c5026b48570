//! In-process trigger bus (dev mode, async ingress, tests).

use std::sync::{Mutex, mpsc};

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InMemoryBusError {
    /// The subscriber list lock was poisoned.
    Poisoned,
    /// Nobody is listening; the trigger would be lost.
    NoSubscribers,
}

impl core::fmt::Display for InMemoryBusError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            InMemoryBusError::Poisoned => f.write_str("trigger bus lock poisoned"),
            InMemoryBusError::NoSubscribers => f.write_str("no live subscriber for trigger"),
        }
    }
}

impl std::error::Error for InMemoryBusError {}

/// Fan-out bus over std channels.
///
/// Every live subscriber gets a clone of each trigger. Dropped subscribers are
/// pruned on publish, and a publish that reaches nobody is an error rather than
/// a silent drop: at-least-once delivery starts with someone receiving it once.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscribers as of the last publish (dropped ones are pruned lazily).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|subs| subs.len()).unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self
            .subscribers
            .lock()
            .map_err(|_| InMemoryBusError::Poisoned)?;

        subs.retain(|tx| tx.send(message.clone()).is_ok());
        if subs.is_empty() {
            return Err(InMemoryBusError::NoSubscribers);
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventEnvelope, PrincipalCreated, SyncTrigger};
    use claimsync_core::PrincipalId;

    fn created(uid: &str) -> EventEnvelope<SyncTrigger> {
        EventEnvelope::received(SyncTrigger::from(PrincipalCreated {
            principal_id: PrincipalId::new(uid).unwrap(),
        }))
    }

    #[test]
    fn every_subscriber_receives_each_trigger() {
        let bus = InMemoryEventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        let first = created("uid-1");
        let second = created("uid-2");
        bus.publish(first.clone()).unwrap();
        bus.publish(second.clone()).unwrap();

        assert_eq!(a.recv().unwrap(), first);
        assert_eq!(a.recv().unwrap(), second);
        assert_eq!(b.recv().unwrap(), first);
        assert_eq!(b.recv().unwrap(), second);
    }

    #[test]
    fn redelivered_triggers_travel_unchanged_but_for_the_attempt() {
        let bus = InMemoryEventBus::new();
        let sub = bus.subscribe();
        let env = created("uid-1");

        bus.publish(env.clone().redelivered()).unwrap();
        let got = sub.recv().unwrap();
        assert_eq!(got.event_id(), env.event_id());
        assert_eq!(got.arrival(), env.arrival());
        assert_eq!(got.delivery_attempt(), 2);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = InMemoryEventBus::new();
        drop(bus.subscribe());
        let live = bus.subscribe();

        bus.publish(created("uid-1")).unwrap();
        assert!(live.try_recv().is_ok());
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn publishing_to_nobody_is_an_error() {
        let bus = InMemoryEventBus::new();
        assert_eq!(bus.publish(created("uid-1")), Err(InMemoryBusError::NoSubscribers));

        drop(bus.subscribe());
        assert_eq!(bus.publish(created("uid-1")), Err(InMemoryBusError::NoSubscribers));
    }
}

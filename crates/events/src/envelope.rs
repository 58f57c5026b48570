use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use claimsync_core::{DomainError, EventId};

/// When an event entered the pipeline, plus a tie-break sequence.
///
/// Either stamped by an [`ArrivalClock`] (strictly increasing sequence, so two
/// events within the same millisecond still order deterministically) or read
/// from the trigger source's own UUIDv7 event id. Redeliveries keep the
/// original stamp.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arrival {
    pub at: DateTime<Utc>,
    pub sequence: u64,
}

/// Stamps arrivals with a monotonically increasing sequence.
#[derive(Debug)]
pub struct ArrivalClock {
    next: AtomicU64,
}

impl Default for ArrivalClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrivalClock {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn stamp(&self) -> Arrival {
        Arrival {
            at: Utc::now(),
            sequence: self.next.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Wrap a freshly received event.
    pub fn receive<E>(&self, payload: E) -> EventEnvelope<E> {
        EventEnvelope::new(EventId::new(), self.stamp(), payload)
    }
}

impl Arrival {
    /// The arrival recorded in a source-minted UUIDv7 event id.
    ///
    /// Every delivery of the same id yields the same arrival, which is what
    /// keeps redeliveries across processes from looking newer than they are.
    pub fn of_event(event_id: EventId) -> Result<Self, DomainError> {
        let invalid =
            |reason: &str| DomainError::invalid_id(format!("EventId: {event_id} {reason}"));
        let minted = event_id.minted().ok_or_else(|| invalid("is not a UUIDv7"))?;
        let at = i64::try_from(minted.unix_ms)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| invalid("has no usable timestamp"))?;
        Ok(Self {
            at,
            sequence: minted.order,
        })
    }
}

static PROCESS_ARRIVALS: ArrivalClock = ArrivalClock::new();

/// Delivery envelope for a trigger event.
///
/// Notes:
/// - `event_id` and `arrival` are stable across redeliveries of the same event.
/// - `arrival` is the version source of last resort, when the profile carries
///   no revision or update time of its own.
/// - `delivery_attempt` starts at 1 and grows on every redelivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: EventId,
    arrival: Arrival,
    delivery_attempt: u32,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(event_id: EventId, arrival: Arrival, payload: E) -> Self {
        Self {
            event_id,
            arrival,
            delivery_attempt: 1,
            payload,
        }
    }

    /// Wrap an event the source identified itself; the arrival comes from the id.
    pub fn identified(event_id: EventId, payload: E) -> Result<Self, DomainError> {
        Ok(Self::new(event_id, Arrival::of_event(event_id)?, payload))
    }

    /// Wrap a freshly received event using the process-wide arrival clock.
    pub fn received(payload: E) -> Self {
        PROCESS_ARRIVALS.receive(payload)
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn arrival(&self) -> Arrival {
        self.arrival
    }

    pub fn delivery_attempt(&self) -> u32 {
        self.delivery_attempt
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    /// The same event, handed out again.
    pub fn redelivered(mut self) -> Self {
        self.delivery_attempt = self.delivery_attempt.saturating_add(1);
        self
    }
}

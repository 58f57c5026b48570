//! `claimsync-events`: inbound trigger events and their delivery mechanics.
//!
//! Triggers arrive at-least-once, unordered and possibly duplicated. Nothing in
//! this crate tries to fix that; consumers are expected to be idempotent.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod trigger;

pub use bus::{EventBus, Subscription};
pub use envelope::{Arrival, ArrivalClock, EventEnvelope};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use trigger::{PrincipalCreated, ProfileUpdated, SyncTrigger};

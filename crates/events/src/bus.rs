//! Trigger delivery abstraction (mechanics only).
//!
//! The bus stands in for whatever infrastructure delivers identity and profile
//! triggers: a webhook queue, a broker topic, or an in-process channel in tests.
//! It promises **at-least-once** delivery and nothing about order. The sync
//! pipeline is built so that neither duplicates nor reordering change the final
//! claims.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// A subscription to the trigger stream.
///
/// Each subscription receives its own copy of every published message. Meant for
/// a single consuming thread; poll with [`Subscription::recv_timeout`] so the
/// consumer can notice shutdown requests.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Publish/subscribe transport for trigger envelopes.
///
/// `publish` is also how redelivery is requested: a consumer that classifies a
/// failure as transient publishes the envelope again (see the sync worker).
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}

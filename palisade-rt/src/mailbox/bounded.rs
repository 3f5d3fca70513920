//! Bounded mailbox over a tokio mpsc channel.
//!
//! One receiver per entity, owned by its consumer task; senders are
//! cheap clones held by the system's routing index. Admission is strictly
//! non-blocking: a full queue rejects the message instead of applying
//! backpressure to the caller.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use tokio::sync::mpsc;

// Layer 3: Internal module imports
use crate::actor::EntityActor;
use crate::message::Envelope;

/// Mailbox errors surfaced on the send path.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    /// Mailbox is at capacity; the message was not enqueued.
    #[error("mailbox is full (capacity: {capacity})")]
    Full { capacity: usize },

    /// Receiver side is gone or closed; the entity is stopping.
    #[error("mailbox is closed")]
    Closed,
}

/// Receiving half, owned by the entity's consumer task.
pub struct Mailbox<A: EntityActor> {
    receiver: mpsc::Receiver<Envelope<A>>,
    capacity: usize,
}

/// Sending half held by the routing index.
pub struct MailboxSender<A: EntityActor> {
    sender: mpsc::Sender<Envelope<A>>,
    capacity: usize,
}

// Manual impl: `A` itself need not be Clone.
impl<A: EntityActor> Clone for MailboxSender<A> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            capacity: self.capacity,
        }
    }
}

impl<A: EntityActor> Mailbox<A> {
    /// Create a bounded mailbox and its sender.
    pub fn new(capacity: usize) -> (Self, MailboxSender<A>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Self { receiver, capacity },
            MailboxSender { sender, capacity },
        )
    }

    /// Receive the next envelope; `None` once closed and drained.
    pub async fn recv(&mut self) -> Option<Envelope<A>> {
        self.receiver.recv().await
    }

    /// Stop accepting new envelopes while keeping buffered ones
    /// receivable. Used when the entity enters its stopping drain.
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<A: EntityActor> MailboxSender<A> {
    /// Enqueue without blocking.
    ///
    /// # Errors
    ///
    /// [`MailboxError::Full`] when the queue is at capacity,
    /// [`MailboxError::Closed`] when the entity no longer receives.
    pub fn try_send(&self, envelope: Envelope<A>) -> Result<(), MailboxError> {
        self.sender.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MailboxError::Full {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => MailboxError::Closed,
        })
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

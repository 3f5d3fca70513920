//! Envelope carried through an entity mailbox.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

// Layer 3: Internal module imports
use crate::actor::EntityActor;
use crate::system::AskError;

/// One-shot sink an entity completes to answer an ask.
///
/// Dropping the receiving side (deadline expiry on the asking task)
/// makes the eventual `send` a no-op: the reply is simply discarded.
pub type ReplyTo<A> = oneshot::Sender<Result<<A as EntityActor>::Reply, AskError>>;

/// What the consumer task should do with this envelope.
///
/// `Save` and `Stop` are reserved system kinds enqueued by the
/// maintenance ticks; loading happens implicitly before the first
/// envelope is consumed.
pub enum Directive<A: EntityActor> {
    /// Ordinary request for [`EntityActor::handle`].
    Request(A::Request),

    /// Persist now if dirty; enqueued by the save tick.
    Save,

    /// Begin orderly stop; enqueued by eviction and shutdown.
    Stop,
}

/// Mailbox element: a directive plus optional reply sink.
pub struct Envelope<A: EntityActor> {
    /// What to do.
    pub directive: Directive<A>,

    /// Where the reply goes, for ask-style requests.
    pub reply_to: Option<ReplyTo<A>>,

    /// When the envelope was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl<A: EntityActor> Envelope<A> {
    /// Fire-and-forget request.
    pub fn request(request: A::Request) -> Self {
        Self {
            directive: Directive::Request(request),
            reply_to: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Request with a reply sink.
    pub fn ask(request: A::Request, reply_to: ReplyTo<A>) -> Self {
        Self {
            directive: Directive::Request(request),
            reply_to: Some(reply_to),
            enqueued_at: Utc::now(),
        }
    }

    /// Reserved save directive.
    pub fn save() -> Self {
        Self {
            directive: Directive::Save,
            reply_to: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Reserved stop directive.
    pub fn stop() -> Self {
        Self {
            directive: Directive::Stop,
            reply_to: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Answer the sender, if anyone is still waiting.
    pub fn reply(self, outcome: Result<A::Reply, AskError>) {
        if let Some(sink) = self.reply_to {
            let _ = sink.send(outcome);
        }
    }
}

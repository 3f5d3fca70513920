//! Mailbox envelopes and system directives.

mod envelope;

pub use envelope::{Directive, Envelope, ReplyTo};

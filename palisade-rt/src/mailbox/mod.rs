//! Bounded per-entity message queue.

mod bounded;

pub use bounded::{Mailbox, MailboxError, MailboxSender};

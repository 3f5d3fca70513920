//! Static per-handler metadata.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::codec::protocol_key;

/// Default slow-request threshold.
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(200);

/// Where a handler executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOn {
    /// Inline on the connection's read task; must be brief.
    Caller,

    /// On the general-purpose task pool; the reply is posted back later.
    Async,

    /// On the mailbox of the entity keyed by the session's role.
    Actor,
}

/// Authentication requirement of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Follow `security.auth_required_by_default`.
    Inherit,

    /// Always require an authenticated session.
    Required,

    /// Open to unauthenticated sessions (login, reconnect).
    Open,
}

/// Immutable description of a registered protocol handler.
///
/// Built once by the handler and resolved against the security config at
/// registry build time; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct HandlerDescriptor {
    /// Composite `(protocol_id << 8) | method_id` key; unique per registry.
    pub key: u32,

    /// Handler name for logs and stats.
    pub name: &'static str,

    /// Authentication requirement.
    pub auth: AuthPolicy,

    /// Whether a bound role is required.
    pub require_role: bool,

    /// Per-second admission limit; 0 disables the limiter.
    pub rate_limit_per_sec: u32,

    /// Requests slower than this are reported to the monitor sink.
    pub slow_threshold: Duration,

    /// Execution placement.
    pub run_on: RunOn,
}

impl HandlerDescriptor {
    /// Descriptor with defaults: inherit auth, no role requirement, no
    /// rate limit, caller execution.
    pub fn new(protocol_id: u16, method_id: u16, name: &'static str) -> Self {
        Self {
            key: protocol_key(protocol_id, method_id),
            name,
            auth: AuthPolicy::Inherit,
            require_role: false,
            rate_limit_per_sec: 0,
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
            run_on: RunOn::Caller,
        }
    }

    /// Open this handler to unauthenticated sessions.
    pub fn open(mut self) -> Self {
        self.auth = AuthPolicy::Open;
        self
    }

    /// Always require an authenticated session.
    pub fn authenticated(mut self) -> Self {
        self.auth = AuthPolicy::Required;
        self
    }

    /// Require a bound role.
    pub fn with_role(mut self) -> Self {
        self.require_role = true;
        self
    }

    /// Cap admissions per second.
    pub fn rate_limited(mut self, per_sec: u32) -> Self {
        self.rate_limit_per_sec = per_sec;
        self
    }

    /// Override the slow-request threshold.
    pub fn slow_after(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Run on the general-purpose task pool.
    pub fn on_async(mut self) -> Self {
        self.run_on = RunOn::Async;
        self
    }

    /// Run on the role's entity actor. Implies a bound role.
    pub fn on_actor(mut self) -> Self {
        self.run_on = RunOn::Actor;
        self.require_role = true;
        self
    }
}

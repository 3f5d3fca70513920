//! Runtime configuration with sensible defaults.

// Layer 1: Standard library
use std::time::Duration;

// Layer 2: Third-party
use serde::{Deserialize, Serialize};

// Layer 3: Internal
// (none)

/// Default mailbox capacity per entity
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1000;

/// Default soft cap on resident entities (eviction target)
pub const DEFAULT_MAX_RESIDENT: usize = 8192;

/// Default hard cap on resident entities (admission bound)
pub const DEFAULT_HARD_CAP: usize = 10_240;

/// Default idle timeout before eviction (30 minutes)
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default minimum residency before an entity may be evicted
pub const DEFAULT_MIN_RESIDENCY: Duration = Duration::from_secs(60);

/// Default dirty-state flush interval
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(60);

/// Default idle-sweep interval
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Default ask deadline
pub const DEFAULT_ASK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bounded drain on graceful shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// What to do with messages still queued when an entity stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrainPolicy {
    /// Handle remaining messages normally before the final save.
    Process,

    /// Answer remaining askers with a stopped error and drop the rest.
    Discard,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self::Process
    }
}

/// System-wide configuration for the entity runtime.
///
/// # Examples
///
/// ```rust
/// use palisade_rt::system::{RuntimeConfig, DEFAULT_MAILBOX_CAPACITY};
/// use std::time::Duration;
///
/// let config = RuntimeConfig::default();
/// assert_eq!(config.mailbox_capacity, DEFAULT_MAILBOX_CAPACITY);
///
/// let config = RuntimeConfig::builder()
///     .with_mailbox_capacity(64)
///     .with_idle_timeout(Duration::from_secs(300))
///     .build()
///     .unwrap();
/// assert_eq!(config.mailbox_capacity, 64);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Mailbox capacity per entity
    pub mailbox_capacity: usize,

    /// Soft cap on resident entities; the sweep evicts least-recently
    /// active entities beyond it (0 = unlimited)
    pub max_resident: usize,

    /// Hard cap on resident entities; creations beyond it are rejected
    /// (0 = unlimited)
    pub hard_cap: usize,

    /// Idle time after which a ready entity is stopped
    pub idle_timeout: Duration,

    /// Minimum residency before eviction may touch an entity
    pub min_residency: Duration,

    /// Dirty-state flush interval
    pub save_interval: Duration,

    /// Idle-sweep interval
    pub sweep_interval: Duration,

    /// Default deadline for `ask`
    pub ask_timeout: Duration,

    /// Bounded drain on graceful shutdown; leftovers are force-stopped
    pub shutdown_timeout: Duration,

    /// Policy for messages queued when an entity stops
    pub drain_policy: DrainPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            max_resident: DEFAULT_MAX_RESIDENT,
            hard_cap: DEFAULT_HARD_CAP,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            min_residency: DEFAULT_MIN_RESIDENCY,
            save_interval: DEFAULT_SAVE_INTERVAL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            ask_timeout: DEFAULT_ASK_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            drain_policy: DrainPolicy::Process,
        }
    }
}

impl RuntimeConfig {
    /// Create a new configuration builder.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Validate configuration values.
    ///
    /// Returns `Err` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.mailbox_capacity == 0 {
            return Err("mailbox_capacity must be > 0".to_string());
        }

        if self.save_interval.is_zero() {
            return Err("save_interval must be > 0".to_string());
        }

        if self.sweep_interval.is_zero() {
            return Err("sweep_interval must be > 0".to_string());
        }

        if self.ask_timeout.is_zero() {
            return Err("ask_timeout must be > 0".to_string());
        }

        if self.hard_cap > 0 && self.max_resident > self.hard_cap {
            return Err("hard_cap must be >= max_resident".to_string());
        }

        Ok(())
    }
}

/// Builder for [`RuntimeConfig`] with a fluent API.
#[derive(Debug, Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    /// Set the per-entity mailbox capacity.
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.config.mailbox_capacity = capacity;
        self
    }

    /// Set the soft resident cap (eviction target, 0 = unlimited).
    pub fn with_max_resident(mut self, max: usize) -> Self {
        self.config.max_resident = max;
        self
    }

    /// Set the hard resident cap (admission bound, 0 = unlimited).
    pub fn with_hard_cap(mut self, cap: usize) -> Self {
        self.config.hard_cap = cap;
        self
    }

    /// Set the idle timeout before eviction.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Set the minimum residency before eviction.
    pub fn with_min_residency(mut self, residency: Duration) -> Self {
        self.config.min_residency = residency;
        self
    }

    /// Set the dirty-state flush interval.
    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.config.save_interval = interval;
        self
    }

    /// Set the idle-sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Set the default ask deadline.
    pub fn with_ask_timeout(mut self, timeout: Duration) -> Self {
        self.config.ask_timeout = timeout;
        self
    }

    /// Set the bounded drain on graceful shutdown.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Set the stop-drain policy.
    pub fn with_drain_policy(mut self, policy: DrainPolicy) -> Self {
        self.config.drain_policy = policy;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<RuntimeConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

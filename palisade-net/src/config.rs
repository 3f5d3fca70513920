//! Gateway configuration tree with sensible defaults.

// Layer 1: Standard library
use std::time::Duration;

// Layer 2: Third-party
use serde::{Deserialize, Serialize};

// Layer 3: Internal
use palisade_rt::RuntimeConfig;

/// Default listen host
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 9100;

/// Default maximum frame length (length field value), 64 KiB
pub const DEFAULT_MAX_FRAME: usize = 64 * 1024;

/// Default per-connection outbound buffer, in frames
pub const DEFAULT_WRITE_BUFFER: usize = 256;

/// Default connection close on no inbound read
pub const DEFAULT_IDLE_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Default reconnect grace window
pub const DEFAULT_RECONNECT_GRACE: Duration = Duration::from_secs(30);

/// Default session reap interval
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(5);

/// Default per-request deadline
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default timestamp tolerance for signed requests
pub const DEFAULT_TIMESTAMP_TOLERANCE: Duration = Duration::from_secs(300);

/// TCP listen address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Interface to bind
    pub host: String,

    /// Port to bind (0 lets the OS pick, useful in tests)
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Session lifecycle tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Close the connection when nothing was read for this long
    pub idle_read_timeout: Duration,

    /// Window during which a dropped session can be recovered by token
    pub reconnect_grace: Duration,

    /// Cadence of the reap tick removing grace-expired sessions
    pub reap_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_read_timeout: DEFAULT_IDLE_READ_TIMEOUT,
            reconnect_grace: DEFAULT_RECONNECT_GRACE,
            reap_interval: DEFAULT_REAP_INTERVAL,
        }
    }
}

/// Dispatcher tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Per-request deadline; expiry answers `Timeout` and discards the
    /// eventual handler reply
    pub default_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Security policy knobs.
///
/// `auth_required_by_default` seeds the auth gate for handlers that do
/// not state a policy of their own; the signing knobs are consumed by
/// the login/auth collaborator, the core only carries them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Handlers without an explicit policy require an authenticated session
    pub auth_required_by_default: bool,

    /// Whether the auth collaborator verifies request signatures
    pub request_sign_enabled: bool,

    /// Allowed clock skew for signed request timestamps
    pub timestamp_tolerance: Duration,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            auth_required_by_default: true,
            request_sign_enabled: false,
            timestamp_tolerance: DEFAULT_TIMESTAMP_TOLERANCE,
        }
    }
}

/// Top-level gateway configuration.
///
/// # Examples
///
/// ```rust
/// use palisade_net::GateConfig;
/// use std::time::Duration;
///
/// let config = GateConfig::builder()
///     .with_listen("127.0.0.1", 0)
///     .with_reconnect_grace(Duration::from_secs(10))
///     .build()
///     .unwrap();
/// assert_eq!(config.listen.port, 0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Listen address
    pub listen: ListenConfig,

    /// Maximum frame length accepted or produced
    #[serde(default = "default_max_frame")]
    pub max_frame: usize,

    /// Per-connection outbound buffer, in frames
    #[serde(default = "default_write_buffer")]
    pub write_buffer: usize,

    /// Session lifecycle tunables
    pub session: SessionConfig,

    /// Dispatcher tunables
    pub dispatcher: DispatcherConfig,

    /// Security policy
    pub security: SecurityConfig,

    /// Entity runtime configuration
    pub actor: RuntimeConfig,
}

fn default_max_frame() -> usize {
    DEFAULT_MAX_FRAME
}

fn default_write_buffer() -> usize {
    DEFAULT_WRITE_BUFFER
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            max_frame: DEFAULT_MAX_FRAME,
            write_buffer: DEFAULT_WRITE_BUFFER,
            session: SessionConfig::default(),
            dispatcher: DispatcherConfig::default(),
            security: SecurityConfig::default(),
            actor: RuntimeConfig::default(),
        }
    }
}

impl GateConfig {
    /// Create a new configuration builder.
    pub fn builder() -> GateConfigBuilder {
        GateConfigBuilder::default()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_frame < crate::codec::HEADER_LEN {
            return Err("max_frame must cover the frame header".to_string());
        }
        if self.write_buffer == 0 {
            return Err("write_buffer must be > 0".to_string());
        }
        if self.session.idle_read_timeout.is_zero() {
            return Err("idle_read_timeout must be > 0".to_string());
        }
        if self.session.reap_interval.is_zero() {
            return Err("reap_interval must be > 0".to_string());
        }
        if self.dispatcher.default_timeout.is_zero() {
            return Err("default_timeout must be > 0".to_string());
        }
        self.actor.validate()
    }
}

/// Builder for [`GateConfig`] with a fluent API.
#[derive(Debug, Default)]
pub struct GateConfigBuilder {
    config: GateConfig,
}

impl GateConfigBuilder {
    /// Set the listen address.
    pub fn with_listen(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.listen = ListenConfig {
            host: host.into(),
            port,
        };
        self
    }

    /// Set the maximum frame length.
    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.config.max_frame = max_frame;
        self
    }

    /// Set the per-connection outbound buffer.
    pub fn with_write_buffer(mut self, frames: usize) -> Self {
        self.config.write_buffer = frames;
        self
    }

    /// Set the idle read timeout.
    pub fn with_idle_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.session.idle_read_timeout = timeout;
        self
    }

    /// Set the reconnect grace window.
    pub fn with_reconnect_grace(mut self, grace: Duration) -> Self {
        self.config.session.reconnect_grace = grace;
        self
    }

    /// Set the session reap interval.
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.config.session.reap_interval = interval;
        self
    }

    /// Set the per-request deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.dispatcher.default_timeout = timeout;
        self
    }

    /// Replace the security policy.
    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.config.security = security;
        self
    }

    /// Replace the entity runtime configuration.
    pub fn with_actor(mut self, actor: RuntimeConfig) -> Self {
        self.config.actor = actor;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<GateConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GateConfig::default();
        assert_eq!(config.listen.host, "0.0.0.0");
        assert_eq!(config.listen.port, 9100);
        assert_eq!(config.max_frame, 64 * 1024);
        assert_eq!(config.session.reconnect_grace, Duration::from_secs(30));
        assert_eq!(config.dispatcher.default_timeout, Duration::from_millis(5000));
        assert!(config.security.auth_required_by_default);
        assert!(!config.security.request_sign_enabled);
    }

    #[test]
    fn test_default_validates() {
        assert!(GateConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_write_buffer_rejected() {
        let result = GateConfig::builder().with_write_buffer(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_tiny_max_frame_rejected() {
        let result = GateConfig::builder().with_max_frame(4).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_chaining() {
        let config = GateConfig::builder()
            .with_listen("127.0.0.1", 0)
            .with_max_frame(1024)
            .with_reconnect_grace(Duration::from_millis(200))
            .with_request_timeout(Duration::from_millis(100))
            .build()
            .unwrap();

        assert_eq!(config.listen.host, "127.0.0.1");
        assert_eq!(config.max_frame, 1024);
        assert_eq!(config.session.reconnect_grace, Duration::from_millis(200));
        assert_eq!(config.dispatcher.default_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_invalid_actor_config_bubbles_up() {
        let actor = RuntimeConfig {
            mailbox_capacity: 0,
            ..Default::default()
        };
        let result = GateConfig::builder().with_actor(actor).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = GateConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let decoded: GateConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.listen.port, decoded.listen.port);
        assert_eq!(config.max_frame, decoded.max_frame);
    }
}

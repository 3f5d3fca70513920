//! Handler registry, populated once at startup.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use super::descriptor::{AuthPolicy, HandlerDescriptor, RunOn};
use super::handler::{EntityProtocolHandler, EntityRoute, ProtocolHandler, StatelessRoute};
use super::limiter::RateWindow;
use super::stats::{HandlerStats, StatsSnapshot};
use crate::config::SecurityConfig;

/// Registration failures; both are fatal at boot.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two handlers claimed the same protocol key.
    #[error("duplicate protocol key {key:#06x}: {name} collides with {existing}")]
    DuplicateKey {
        key: u32,
        name: &'static str,
        existing: &'static str,
    },

    /// A handler's declared executor does not match its registration.
    #[error("handler {name} declares executor {declared:?}, expected {expected}")]
    WrongExecutor {
        name: &'static str,
        declared: RunOn,
        expected: &'static str,
    },
}

/// The two kinds of erased handlers the registry stores.
pub(crate) enum Route<S: Send + Sync + 'static> {
    Stateless(Arc<dyn StatelessRoute>),
    Entity(Arc<dyn EntityRoute<S>>),
}

/// Resolved, immutable routing entry plus its runtime cells (limiter,
/// statistics).
pub(crate) struct RouteEntry<S: Send + Sync + 'static> {
    pub(crate) route: Route<S>,
    pub(crate) key: u32,
    pub(crate) name: &'static str,
    pub(crate) run_on: RunOn,
    pub(crate) require_auth: bool,
    pub(crate) require_role: bool,
    pub(crate) slow_threshold: Duration,
    pub(crate) limiter: Option<RateWindow>,
    pub(crate) stats: HandlerStats,
}

/// Immutable handler registry keyed by protocol key.
pub struct DispatchRegistry<S: Send + Sync + 'static> {
    entries: HashMap<u32, Arc<RouteEntry<S>>>,
}

impl<S: Send + Sync + 'static> DispatchRegistry<S> {
    pub(crate) fn lookup(&self, key: u32) -> Option<Arc<RouteEntry<S>>> {
        self.entries.get(&key).map(Arc::clone)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Statistics snapshot for one handler.
    pub fn stats(&self, key: u32) -> Option<StatsSnapshot> {
        self.entries.get(&key).map(|entry| entry.stats.snapshot())
    }

    /// Registered protocol keys.
    pub fn keys(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }
}

/// Startup-time registry builder.
///
/// Explicit registration only; a duplicate key or a mismatched executor
/// fails the build before the server ever accepts a connection.
pub struct RegistryBuilder<S: Send + Sync + 'static> {
    default_require_auth: bool,
    entries: HashMap<u32, Arc<RouteEntry<S>>>,
}

impl<S: Send + Sync + 'static> RegistryBuilder<S> {
    /// Builder resolving `AuthPolicy::Inherit` against the security
    /// configuration.
    pub fn new(security: &SecurityConfig) -> Self {
        Self {
            default_require_auth: security.auth_required_by_default,
            entries: HashMap::new(),
        }
    }

    /// Register a stateless handler (`Caller` or `Async`).
    pub fn stateless<H: ProtocolHandler>(mut self, handler: H) -> Result<Self, RegistryError> {
        let descriptor = ProtocolHandler::descriptor(&handler).clone();
        if descriptor.run_on == RunOn::Actor {
            return Err(RegistryError::WrongExecutor {
                name: descriptor.name,
                declared: descriptor.run_on,
                expected: "Caller or Async",
            });
        }
        let route = Route::Stateless(Arc::new(handler) as Arc<dyn StatelessRoute>);
        self.insert(descriptor, route)?;
        Ok(self)
    }

    /// Register an entity-bound handler (`Actor`).
    pub fn entity<H: EntityProtocolHandler<S>>(mut self, handler: H) -> Result<Self, RegistryError> {
        let descriptor = <H as EntityProtocolHandler<S>>::descriptor(&handler).clone();
        if descriptor.run_on != RunOn::Actor {
            return Err(RegistryError::WrongExecutor {
                name: descriptor.name,
                declared: descriptor.run_on,
                expected: "Actor",
            });
        }
        let route = Route::Entity(Arc::new(handler) as Arc<dyn EntityRoute<S>>);
        self.insert(descriptor, route)?;
        Ok(self)
    }

    fn insert(&mut self, descriptor: HandlerDescriptor, route: Route<S>) -> Result<(), RegistryError> {
        if let Some(existing) = self.entries.get(&descriptor.key) {
            return Err(RegistryError::DuplicateKey {
                key: descriptor.key,
                name: descriptor.name,
                existing: existing.name,
            });
        }

        let require_auth = match descriptor.auth {
            AuthPolicy::Inherit => self.default_require_auth,
            AuthPolicy::Required => true,
            AuthPolicy::Open => false,
        };
        let limiter = (descriptor.rate_limit_per_sec > 0)
            .then(|| RateWindow::new(descriptor.rate_limit_per_sec));

        self.entries.insert(
            descriptor.key,
            Arc::new(RouteEntry {
                route,
                key: descriptor.key,
                name: descriptor.name,
                run_on: descriptor.run_on,
                require_auth,
                require_role: descriptor.require_role,
                slow_threshold: descriptor.slow_threshold,
                limiter,
                stats: HandlerStats::new(),
            }),
        );
        Ok(())
    }

    /// Finish the registry.
    pub fn build(self) -> DispatchRegistry<S> {
        DispatchRegistry {
            entries: self.entries,
        }
    }
}

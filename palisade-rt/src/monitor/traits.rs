//! The `SystemMonitor` trait.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

/// Sink for runtime incidents the surrounding service should see.
///
/// The runtime already logs every incident through `tracing`; this trait
/// exists for alerting and metrics pipelines that need structured
/// callbacks (repeated save failures in particular are expected to
/// escalate somewhere louder than a log line). All methods default to
/// no-ops so implementations pick what they care about.
pub trait SystemMonitor: Send + Sync + 'static {
    /// A handler returned an error or panicked. The entity keeps running.
    fn handler_fault(&self, kind: &'static str, entity: &str, detail: &str) {
        let _ = (kind, entity, detail);
    }

    /// Loading persisted state failed; queued messages were rejected.
    fn entity_load_failed(&self, kind: &'static str, entity: &str, detail: &str) {
        let _ = (kind, entity, detail);
    }

    /// A save attempt failed; the entity stays dirty and will retry.
    fn save_failed(&self, kind: &'static str, entity: &str, detail: &str) {
        let _ = (kind, entity, detail);
    }

    /// The idle sweep (or resident cap) asked an entity to stop.
    fn entity_evicted(&self, kind: &'static str, entity: &str, idle_for: Duration) {
        let _ = (kind, entity, idle_for);
    }
}

//! Entity lifecycle phases and the shared vitals cell.
//!
//! The maintenance ticks (save, idle sweep) inspect entities without
//! touching their state, so phase, dirty flag, and activity stamps live
//! in an atomically-readable cell shared between the consumer task and
//! the system.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};

// Layer 3: Internal module imports
// (none)

/// Phase of an entity in the lifecycle state machine.
///
/// # State Transitions
///
/// ```text
/// New ──send──▶ Loading ──load-ok──▶ Ready
///                  │                   │
///                  │ load-fail         │ idle-timeout OR system-stop
///                  ▼                   ▼
///               Stopped ◀──save───── Stopping
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityPhase {
    /// Entry created, consumer task not yet running.
    New,

    /// Consumer task is loading persisted state.
    Loading,

    /// Processing ordinary requests.
    Ready,

    /// Draining remaining messages; new sends are rejected.
    Stopping,

    /// Terminal; the entry is removed from the system index.
    Stopped,
}

impl EntityPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::New,
            1 => Self::Loading,
            2 => Self::Ready,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::New => 0,
            Self::Loading => 1,
            Self::Ready => 2,
            Self::Stopping => 3,
            Self::Stopped => 4,
        }
    }

    /// True once the entity no longer accepts new sends.
    pub fn rejects_sends(self) -> bool {
        matches!(self, Self::Stopping | Self::Stopped)
    }

    /// True for the terminal phase.
    pub fn is_terminal(self) -> bool {
        self == Self::Stopped
    }
}

impl Default for EntityPhase {
    fn default() -> Self {
        Self::New
    }
}

/// Shared per-entity flags readable without the entity's state.
///
/// Written by the consumer task (phase transitions, activity stamps) and
/// by handlers through their context (dirty flag); read by the
/// maintenance ticks and by admission checks on the send path.
#[derive(Debug)]
pub struct EntityVitals {
    phase: AtomicU8,
    dirty: AtomicBool,
    last_active_ms: AtomicI64,
    created_at: DateTime<Utc>,
}

impl EntityVitals {
    /// Create vitals for a freshly routed entity.
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(EntityPhase::New.as_u8()),
            dirty: AtomicBool::new(false),
            last_active_ms: AtomicI64::new(Utc::now().timestamp_millis()),
            created_at: Utc::now(),
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> EntityPhase {
        EntityPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: EntityPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }

    /// Whether state changed since the last successful save.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    /// Stamp the entity as active now.
    pub(crate) fn touch(&self) {
        self.last_active_ms
            .store(Utc::now().timestamp_millis(), Ordering::Release);
    }

    /// Milliseconds since the last handled request (or creation).
    pub fn idle_millis(&self, now: DateTime<Utc>) -> i64 {
        (now.timestamp_millis() - self.last_active_ms.load(Ordering::Acquire)).max(0)
    }

    /// Milliseconds since the entity entry was created.
    pub fn age_millis(&self, now: DateTime<Utc>) -> i64 {
        (now.timestamp_millis() - self.created_at.timestamp_millis()).max(0)
    }

    /// Raw last-active stamp, for least-recently-active ordering.
    pub fn last_active_millis(&self) -> i64 {
        self.last_active_ms.load(Ordering::Acquire)
    }

    /// Creation timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Default for EntityVitals {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_roundtrip() {
        for phase in [
            EntityPhase::New,
            EntityPhase::Loading,
            EntityPhase::Ready,
            EntityPhase::Stopping,
            EntityPhase::Stopped,
        ] {
            assert_eq!(EntityPhase::from_u8(phase.as_u8()), phase);
        }
    }

    #[test]
    fn test_phase_default() {
        assert_eq!(EntityPhase::default(), EntityPhase::New);
    }

    #[test]
    fn test_rejects_sends() {
        assert!(!EntityPhase::New.rejects_sends());
        assert!(!EntityPhase::Loading.rejects_sends());
        assert!(!EntityPhase::Ready.rejects_sends());
        assert!(EntityPhase::Stopping.rejects_sends());
        assert!(EntityPhase::Stopped.rejects_sends());
    }

    #[test]
    fn test_terminal() {
        assert!(EntityPhase::Stopped.is_terminal());
        assert!(!EntityPhase::Stopping.is_terminal());
    }

    #[test]
    fn test_vitals_phase_transitions() {
        let vitals = EntityVitals::new();
        assert_eq!(vitals.phase(), EntityPhase::New);

        vitals.set_phase(EntityPhase::Loading);
        assert_eq!(vitals.phase(), EntityPhase::Loading);

        vitals.set_phase(EntityPhase::Ready);
        assert_eq!(vitals.phase(), EntityPhase::Ready);
    }

    #[test]
    fn test_vitals_dirty_flag() {
        let vitals = EntityVitals::new();
        assert!(!vitals.is_dirty());

        vitals.mark_dirty();
        assert!(vitals.is_dirty());

        vitals.clear_dirty();
        assert!(!vitals.is_dirty());
    }

    #[test]
    fn test_vitals_idle_accounting() {
        let vitals = EntityVitals::new();
        std::thread::sleep(std::time::Duration::from_millis(15));

        let now = Utc::now();
        assert!(vitals.idle_millis(now) >= 10);

        vitals.touch();
        assert!(vitals.idle_millis(Utc::now()) < 10);
    }

    #[test]
    fn test_vitals_age_grows() {
        let vitals = EntityVitals::new();
        std::thread::sleep(std::time::Duration::from_millis(15));
        assert!(vitals.age_millis(Utc::now()) >= 10);
    }
}

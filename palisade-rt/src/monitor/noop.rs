//! Zero-overhead default monitor.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::traits::SystemMonitor;

/// Monitor that ignores every incident.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl SystemMonitor for NoopMonitor {}

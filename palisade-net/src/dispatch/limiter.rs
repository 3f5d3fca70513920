//! Windowed per-second rate limiter.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use chrono::Utc;
use parking_lot::Mutex;

// Layer 3: Internal module imports
// (none)

/// One-second windowed counter.
///
/// Admissions within the current wall-clock second are counted; the
/// counter resets when the second rolls over. Deliberately coarse: the
/// limit is a protective bound, not a traffic shaper.
#[derive(Debug)]
pub struct RateWindow {
    limit: u32,
    window: Mutex<WindowState>,
}

#[derive(Debug)]
struct WindowState {
    second: i64,
    count: u32,
}

impl RateWindow {
    /// Limiter admitting `limit` requests per second.
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            window: Mutex::new(WindowState {
                second: 0,
                count: 0,
            }),
        }
    }

    /// Try to admit one request now.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Utc::now().timestamp())
    }

    pub(crate) fn try_acquire_at(&self, second: i64) -> bool {
        let mut window = self.window.lock();
        if window.second != second {
            window.second = second;
            window.count = 0;
        }
        if window.count >= self.limit {
            return false;
        }
        window.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_within_one_second() {
        let limiter = RateWindow::new(3);
        assert!(limiter.try_acquire_at(100));
        assert!(limiter.try_acquire_at(100));
        assert!(limiter.try_acquire_at(100));
        assert!(!limiter.try_acquire_at(100));
        assert!(!limiter.try_acquire_at(100));
    }

    #[test]
    fn test_window_rolls_over() {
        let limiter = RateWindow::new(2);
        assert!(limiter.try_acquire_at(100));
        assert!(limiter.try_acquire_at(100));
        assert!(!limiter.try_acquire_at(100));

        assert!(limiter.try_acquire_at(101));
        assert!(limiter.try_acquire_at(101));
        assert!(!limiter.try_acquire_at(101));
    }

    #[test]
    fn test_zero_limit_rejects_everything() {
        let limiter = RateWindow::new(0);
        assert!(!limiter.try_acquire_at(1));
    }
}

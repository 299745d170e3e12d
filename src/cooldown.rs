//! Attendance log deduplication
//!
//! At most one attendance row per employee per cooldown window. Claims are
//! written before the log append so that duplicate recognitions arriving
//! during a slow append are blocked rather than queued behind it; a failed
//! append releases the claim so the event can be retried immediately.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

/// Tracks when each employee was last logged
///
/// Shared by every in-flight recognition request.
pub struct CooldownTracker {
    last_logged: Mutex<HashMap<String, i64>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self {
            last_logged: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically claim the right to log `employee_id` at `now`.
    ///
    /// The check and the timestamp write happen in one critical section:
    /// of two concurrent claims for the same employee, exactly one wins.
    pub fn try_claim(&self, employee_id: &str, now: i64, window_seconds: i64) -> bool {
        let mut map = self.last_logged.lock();
        if let Some(&last) = map.get(employee_id) {
            if now - last < window_seconds {
                return false;
            }
        }
        map.insert(employee_id.to_string(), now);
        true
    }

    /// Roll back a claim after the log append failed.
    ///
    /// The employee returns to the unclaimed state immediately, so the
    /// next recognition can retry without waiting out the window.
    pub fn release(&self, employee_id: &str) {
        if self.last_logged.lock().remove(employee_id).is_some() {
            debug!("Released attendance claim for '{}'", employee_id);
        }
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_claim_within_window_fails() {
        let tracker = CooldownTracker::new();
        assert!(tracker.try_claim("e1", 1000, 60));
        assert!(!tracker.try_claim("e1", 1030, 60));
        assert!(tracker.try_claim("e1", 1061, 60));
    }

    #[test]
    fn test_claims_are_per_employee() {
        let tracker = CooldownTracker::new();
        assert!(tracker.try_claim("e1", 1000, 60));
        assert!(tracker.try_claim("e2", 1000, 60));
    }

    #[test]
    fn test_release_allows_immediate_retry() {
        let tracker = CooldownTracker::new();
        assert!(tracker.try_claim("e1", 1000, 60));
        tracker.release("e1");
        assert!(tracker.try_claim("e1", 1001, 60));
    }

    #[test]
    fn test_successful_claim_refreshes_window() {
        let tracker = CooldownTracker::new();
        assert!(tracker.try_claim("e1", 1000, 60));
        assert!(tracker.try_claim("e1", 1100, 60));
        // The window now starts at 1100, not 1000
        assert!(!tracker.try_claim("e1", 1159, 60));
    }

    #[test]
    fn test_concurrent_claims_admit_exactly_one() {
        let tracker = Arc::new(CooldownTracker::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || tracker.try_claim("e1", 1000, 60))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&claimed| claimed)
            .count();
        assert_eq!(admitted, 1);
    }
}

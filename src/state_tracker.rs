//! # Stage: State Tracker
//!
//! ## Responsibility
//! Remembers the last state published for every item and decides whether a
//! freshly observed value is a change worth republishing.
//!
//! ## Guarantees
//! - Thread-safe: check-and-set runs under a single lock
//! - The lock is never held across an `.await`
//! - `clear()` is all-or-nothing
//!
//! ## NOT Responsible For
//! - Publishing (the poller does that)
//! - Persistence: a fresh process starts empty

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Last-published state per item name.
///
/// Shared between the poll loop and the command path via `Arc`.
#[derive(Debug, Default)]
pub struct StateTracker {
    previous: Mutex<HashMap<String, String>>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned map is still a valid map; keep going with it.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.previous.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Record `state` for `name` and report whether it should be republished.
    ///
    /// Returns `true` when `name` has never been seen (or was cleared) or when
    /// the stored value differs. The stored value is overwritten either way.
    pub fn observe(&self, name: &str, state: &str) -> bool {
        let mut map = self.lock();
        match map.get_mut(name) {
            Some(prev) if prev == state => false,
            Some(prev) => {
                state.clone_into(prev);
                true
            }
            None => {
                map.insert(name.to_string(), state.to_string());
                true
            }
        }
    }

    /// Forget every item so the next poll republishes everything.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Last stored state for `name`, if any.
    pub fn get(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn first_observation_is_a_change() {
        let t = StateTracker::new();
        assert!(t.observe("Light1", "ON"));
        assert_eq!(t.get("Light1").as_deref(), Some("ON"));
    }

    #[test]
    fn identical_observation_is_not_a_change() {
        let t = StateTracker::new();
        t.observe("Light1", "ON");
        assert!(!t.observe("Light1", "ON"));
    }

    #[test]
    fn different_value_is_a_change_and_overwrites() {
        let t = StateTracker::new();
        t.observe("Light1", "ON");
        assert!(t.observe("Light1", "OFF"));
        assert_eq!(t.get("Light1").as_deref(), Some("OFF"));
        assert!(t.observe("Light1", "ON"));
    }

    #[test]
    fn items_are_independent() {
        let t = StateTracker::new();
        assert!(t.observe("A", "1"));
        assert!(t.observe("B", "1"));
        assert!(!t.observe("A", "1"));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn clear_forces_republish_of_same_value() {
        let t = StateTracker::new();
        t.observe("Light1", "ON");
        t.clear();
        assert!(t.is_empty());
        assert!(t.observe("Light1", "ON"));
    }

    #[test]
    fn concurrent_observers_see_exactly_one_change() {
        let t = Arc::new(StateTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = Arc::clone(&t);
                std::thread::spawn(move || t.observe("Shared", "X"))
            })
            .collect();
        let changes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|changed| *changed)
            .count();
        assert_eq!(changes, 1);
    }

    proptest! {
        #[test]
        fn observe_matches_reference_model(
            ops in proptest::collection::vec((0u8..4, 0u8..3), 0..64)
        ) {
            let t = StateTracker::new();
            let mut model: HashMap<String, String> = HashMap::new();
            for (n, s) in ops {
                let name = format!("item{n}");
                let state = format!("s{s}");
                let expected = model.get(&name) != Some(&state);
                model.insert(name.clone(), state.clone());
                prop_assert_eq!(t.observe(&name, &state), expected);
            }
        }
    }
}

//! API key rotation.
//!
//! Deterministic round-robin over the configured credential slots, with a
//! memory of which slots are currently rate limited. The slot list is fixed
//! at construction (it mirrors persisted config); the rotation cursor and the
//! limited set are process-scoped and never serialized.
//!
//! One instance is shared by every in-flight exchange for a provider, so a
//! rate limit observed by one exchange steers the next key choice for all.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct RotationState {
    current: usize,
    limited: HashSet<usize>,
}

/// Round-robin credential selection with rate-limit tracking.
///
/// Blank slots are inactive placeholders and are never selected. All
/// operations take one short critical section; nothing is held across I/O.
#[derive(Debug)]
pub struct KeyRotation {
    keys: Vec<String>,
    state: Mutex<RotationState>,
}

impl KeyRotation {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            state: Mutex::new(RotationState::default()),
        }
    }

    fn usable(&self, index: usize) -> bool {
        !self.keys[index].trim().is_empty()
    }

    /// The credential at the rotation cursor, as `(slot index, key)`.
    ///
    /// Wraps to the start when the cursor is out of range and falls forward
    /// past blank slots. `None` when no non-blank key exists.
    pub fn current(&self) -> Option<(usize, String)> {
        let mut state = self.state.lock().unwrap();
        if self.keys.is_empty() {
            return None;
        }
        if state.current >= self.keys.len() {
            state.current = 0;
        }
        if self.usable(state.current) {
            return Some((state.current, self.keys[state.current].clone()));
        }
        for offset in 1..self.keys.len() {
            let index = (state.current + offset) % self.keys.len();
            if self.usable(index) {
                state.current = index;
                return Some((index, self.keys[index].clone()));
            }
        }
        None
    }

    /// Record that the key in `index` hit a rate limit. Infallible.
    pub fn mark_rate_limited(&self, index: usize) {
        self.state.lock().unwrap().limited.insert(index);
    }

    /// Advance to the next usable key that is not marked rate limited,
    /// scanning forward from the cursor modulo the slot count.
    ///
    /// `None` means every usable key is limited: exhaustion.
    pub fn advance(&self) -> Option<(usize, String)> {
        let mut state = self.state.lock().unwrap();
        if self.keys.is_empty() {
            return None;
        }
        for offset in 1..=self.keys.len() {
            let index = (state.current + offset) % self.keys.len();
            if self.usable(index) && !state.limited.contains(&index) {
                state.current = index;
                return Some((index, self.keys[index].clone()));
            }
        }
        None
    }

    /// Clear all rate-limit marks and rewind the cursor to slot 0.
    ///
    /// Called after any exchange that finishes without a rate-limit error,
    /// so a key whose quota recovered is not excluded forever.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.current = 0;
        state.limited.clear();
    }

    /// True when at least one non-blank key is configured.
    pub fn has_usable_key(&self) -> bool {
        (0..self.keys.len()).any(|i| self.usable(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("key-{i}")).collect()
    }

    #[test]
    fn current_starts_at_first_key() {
        let rotation = KeyRotation::new(keys(3));
        assert_eq!(rotation.current(), Some((0, "key-0".to_string())));
    }

    #[test]
    fn empty_and_all_blank_lists_have_no_credential() {
        let rotation = KeyRotation::new(Vec::new());
        assert_eq!(rotation.current(), None);
        assert_eq!(rotation.advance(), None);

        let rotation = KeyRotation::new(vec!["".into(), "   ".into()]);
        assert_eq!(rotation.current(), None);
        assert!(!rotation.has_usable_key());
    }

    #[test]
    fn blank_slots_are_skipped() {
        let rotation = KeyRotation::new(vec!["".into(), "a".into(), "".into(), "b".into()]);
        assert_eq!(rotation.current(), Some((1, "a".to_string())));
        assert_eq!(rotation.advance(), Some((3, "b".to_string())));
        assert_eq!(rotation.advance(), Some((1, "a".to_string())));
    }

    #[test]
    fn advance_never_returns_a_marked_index() {
        for n in 1..=10usize {
            for k in 0..n {
                let rotation = KeyRotation::new(keys(n));
                for index in 0..k {
                    rotation.mark_rate_limited(index);
                }
                let unmarked = n - k;
                let mut seen = Vec::new();
                for _ in 0..unmarked {
                    let (index, _) = rotation.advance().expect("unmarked key available");
                    assert!(index >= k, "marked index {index} returned (n={n}, k={k})");
                    seen.push(index);
                }
                // One full cycle visits every unmarked index before repeating.
                let mut sorted = seen.clone();
                sorted.sort_unstable();
                sorted.dedup();
                assert_eq!(sorted.len(), unmarked);
                let (again, _) = rotation.advance().expect("cycle repeats");
                assert_eq!(again, seen[0]);
            }
        }
    }

    #[test]
    fn exhaustion_when_all_keys_marked() {
        let rotation = KeyRotation::new(keys(4));
        for index in 0..4 {
            rotation.mark_rate_limited(index);
        }
        assert_eq!(rotation.advance(), None);
    }

    #[test]
    fn reset_restores_first_key_and_clears_marks() {
        let rotation = KeyRotation::new(keys(3));
        rotation.mark_rate_limited(0);
        rotation.mark_rate_limited(1);
        rotation.advance();
        rotation.reset();
        assert_eq!(rotation.current(), Some((0, "key-0".to_string())));
        // All marks cleared: a full cycle is available again.
        assert_eq!(rotation.advance(), Some((1, "key-1".to_string())));
        assert_eq!(rotation.advance(), Some((2, "key-2".to_string())));
    }

    #[test]
    fn advance_wraps_modulo_key_count() {
        let rotation = KeyRotation::new(keys(2));
        assert_eq!(rotation.advance(), Some((1, "key-1".to_string())));
        assert_eq!(rotation.advance(), Some((0, "key-0".to_string())));
        assert_eq!(rotation.current(), Some((0, "key-0".to_string())));
    }
}

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// The single authority on which URLs have already been scheduled.
///
/// URLs are expected to be normalized before they get here.
#[derive(Debug, Default)]
pub struct VisitedSet {
    seen: Mutex<HashSet<String>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `url`, returning `true` only for the first caller to do so.
    pub fn mark_seen(&self, url: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if seen.contains(url) {
            false
        } else {
            seen.insert(url.to_string())
        }
    }

    pub fn has(&self, url: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(url)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

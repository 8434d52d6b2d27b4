use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use crate::pattern::AdUnitPattern;

/// `PatternStore` holds validated ad unit patterns in insertion order.
///
/// The store is append-only: patterns are never updated or removed. Readers get a snapshot that is
/// not affected by later additions, so one batch always matches against a consistent list.
#[derive(Debug, Default)]
pub struct PatternStore {
    patterns: RwLock<Vec<Arc<AdUnitPattern>>>,
}

impl PatternStore {
    /// Create a new empty pattern store.
    pub fn new() -> Self {
        PatternStore::default()
    }

    /// Validate and append `raw_patterns`. Invalid patterns are logged and skipped without
    /// affecting the rest of the batch.
    ///
    /// Returns the number of patterns added.
    pub fn add_ad_unit_patterns(&self, raw_patterns: &[Value]) -> usize {
        // Compiling before requesting the lock to minimize lock span.
        let compiled = raw_patterns
            .iter()
            .filter_map(|raw| match AdUnitPattern::compile(raw) {
                Ok(pattern) => Some(Arc::new(pattern)),
                Err(err) => {
                    log::error!(target: "ppi",
                                pattern:serde = raw;
                                "error creating ad unit pattern: {err}");
                    None
                }
            })
            .collect::<Vec<_>>();

        let added = compiled.len();
        log::debug!(target: "ppi", added, rejected = raw_patterns.len() - added; "added ad unit patterns");

        // The list is never left half-written, so a poisoned lock is still usable.
        let mut patterns = self.patterns.write().unwrap_or_else(PoisonError::into_inner);
        patterns.extend(compiled);
        added
    }

    /// Snapshot of all stored patterns, in insertion order.
    pub fn patterns(&self) -> Vec<Arc<AdUnitPattern>> {
        self.patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

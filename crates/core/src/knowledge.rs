use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::types::EquivClass;

/// Runtime fallback for equivalence classes with no samples yet.
const DEFAULT_RUNTIME_MS: u64 = 100;

#[derive(Debug, Clone, Copy, Default)]
struct RuntimeStats {
    samples: u64,
    mean_ms: f64,
}

/// Per-equivalence-class runtime statistics, fed by task completions and
/// read by cost models when pricing cluster-aggregator arcs.
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    runtimes: HashMap<EquivClass, RuntimeStats>,
}

pub type SharedKnowledgeBase = Arc<RwLock<KnowledgeBase>>;

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedKnowledgeBase {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Record an observed runtime for a task equivalence class.
    pub fn add_runtime_sample(&mut self, tec: EquivClass, runtime_ms: u64) {
        let stats = self.runtimes.entry(tec).or_default();
        stats.samples += 1;
        // Incremental mean keeps the entry O(1).
        stats.mean_ms += (runtime_ms as f64 - stats.mean_ms) / stats.samples as f64;
    }

    /// Average observed runtime (ms) for a class, or the default for
    /// classes never seen.
    pub fn avg_runtime_for_tec(&self, tec: EquivClass) -> u64 {
        self.runtimes
            .get(&tec)
            .map(|s| s.mean_ms.round() as u64)
            .unwrap_or(DEFAULT_RUNTIME_MS)
    }

    pub fn sample_count(&self, tec: EquivClass) -> u64 {
        self.runtimes.get(&tec).map(|s| s.samples).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_class_uses_default() {
        let kb = KnowledgeBase::new();
        assert_eq!(kb.avg_runtime_for_tec(123), DEFAULT_RUNTIME_MS);
        assert_eq!(kb.sample_count(123), 0);
    }

    #[test]
    fn mean_tracks_samples() {
        let mut kb = KnowledgeBase::new();
        kb.add_runtime_sample(1, 100);
        kb.add_runtime_sample(1, 300);
        assert_eq!(kb.avg_runtime_for_tec(1), 200);
        assert_eq!(kb.sample_count(1), 2);
    }

    #[test]
    fn classes_are_independent() {
        let mut kb = KnowledgeBase::new();
        kb.add_runtime_sample(1, 50);
        kb.add_runtime_sample(2, 5000);
        assert_eq!(kb.avg_runtime_for_tec(1), 50);
        assert_eq!(kb.avg_runtime_for_tec(2), 5000);
    }
}

//! Tunables of a [`Bdd`][crate::bdd::Bdd] manager.

/// Configuration for a [`Bdd`][crate::bdd::Bdd] manager.
///
/// ```
/// use bdd_decide::config::BddConfig;
///
/// let config = BddConfig::default()
///     .with_initial_nodes(1 << 10)
///     .with_gc_threshold(100_000);
/// assert_eq!(config.gc_threshold, Some(100_000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BddConfig {
    /// Number of node slots to pre-allocate.
    pub initial_nodes: usize,
    /// Initial capacity of the computed table.
    pub cache_capacity: usize,
    /// Live-node count above which a top-level operation first collects
    /// garbage. `None` disables automatic collection.
    pub gc_threshold: Option<usize>,
}

impl Default for BddConfig {
    fn default() -> Self {
        Self {
            initial_nodes: 1 << 16,
            cache_capacity: 1 << 14,
            gc_threshold: None,
        }
    }
}

impl BddConfig {
    pub fn with_initial_nodes(mut self, initial_nodes: usize) -> Self {
        self.initial_nodes = initial_nodes;
        self
    }

    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    pub fn with_gc_threshold(mut self, threshold: usize) -> Self {
        self.gc_threshold = Some(threshold);
        self
    }

    pub fn without_gc(mut self) -> Self {
        self.gc_threshold = None;
        self
    }
}

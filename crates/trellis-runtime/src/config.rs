//! Runtime configuration

/// Tunables for a turn.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum context-tree depth during full expansion; guards against
    /// runaway `uses` recursion
    pub max_tree_depth: usize,
    /// Maximum records accepted by one `run` batch
    pub max_run_records: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_tree_depth: 8,
            max_run_records: 256,
        }
    }
}

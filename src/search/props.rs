use serde::{Deserialize, Serialize};

/// Heuristic knobs for pair enumeration and the plan search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairGenProps {
    /// Order candidate pairs by the number of distinct positions left in the
    /// residual goal, fewest first.
    pub sort_distinct_pos: bool,
    /// Visit distance groups in ascending L1 distance.
    pub short_distance_first: bool,
    /// Prefer ratios close to one, so pairs without scaling come first.
    pub low_scale_first: bool,
    /// Enumerate exhaustive allocations of elementary moves.
    pub exhaustive: bool,
    /// Include the greedy line allocation.
    pub line: bool,
    /// Materialize the full pair list up front instead of streaming it. Only
    /// the materialized list can be reordered or shuffled.
    pub generate_all: bool,
    /// In exhaustive mode, only yield allocations that take all available
    /// slots of an elementary move.
    pub max_sets: bool,
    /// Shuffle the materialized pair list.
    pub randomize: bool,
    /// Record every solution in the statistics, not only improvements.
    pub log_all: bool,
}

impl Default for PairGenProps {
    fn default() -> Self {
        Self {
            sort_distinct_pos: true,
            short_distance_first: true,
            low_scale_first: true,
            exhaustive: false,
            line: true,
            generate_all: true,
            max_sets: true,
            randomize: false,
            log_all: true,
        }
    }
}

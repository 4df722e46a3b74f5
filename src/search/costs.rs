use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Search costs are totally ordered floats so the planner can start from an
/// infinite bound.
pub type Cost = OrderedFloat<f64>;

/// Per-operation weights of the target array. Additions are by far the most
/// expensive step on the analog plane, nearest-neighbour shifts are nearly
/// free; scaling sits in between. The table is plain configuration and is
/// passed to every stage that needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostModel {
    pub add: u32,
    pub shift: u32,
    pub double: u32,
    pub div: u32,
    pub neg: u32,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            add: 100,
            shift: 1,
            double: 5,
            div: 5,
            neg: 2,
        }
    }
}

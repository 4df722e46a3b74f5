mod costs;
mod deadline;
mod pair_gen;
mod planner;
mod props;
mod solution_stats;

pub use costs::{Cost, CostModel};
pub use deadline::Deadline;
pub use pair_gen::{generate_pairs, pair_stream, CandidatePair, PairStream};
pub use planner::{
    generate_initial_state, is_end_state, search, PairDecomposition, Plan, PlanStep,
    SearchOutcome, GEN_ID_START,
};
pub use props::PairGenProps;
pub use solution_stats::SolutionStats;

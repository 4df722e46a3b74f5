use crate::search::Cost;
use serde::Serialize;
use std::time::Instant;
use tracing::info;

/// The anytime trajectory of the plan search: one `(elapsed seconds, cost)`
/// sample per recorded solution. The clock starts when the statistics are
/// created.
#[derive(Debug, Clone, Serialize)]
pub struct SolutionStats {
    samples: Vec<(f64, f64)>,
    #[serde(skip_serializing)]
    start_time: Instant,
}

impl Default for SolutionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SolutionStats {
    pub fn new() -> Self {
        Self {
            samples: vec![],
            start_time: Instant::now(),
        }
    }

    pub fn log_solution(&mut self, cost: Cost) {
        self.samples.push((self.start_time.elapsed().as_secs_f64(), cost.into_inner()));
    }

    pub fn samples(&self) -> &[(f64, f64)] {
        &self.samples
    }

    /// The cheapest recorded cost, if any solution was recorded.
    pub fn best_cost(&self) -> Option<f64> {
        self.samples
            .iter()
            .map(|&(_, cost)| cost)
            .min_by(|a, b| a.total_cmp(b))
    }

    pub fn finalise(&self) {
        info!(
            solutions = self.samples.len(),
            best_cost = self.best_cost(),
            search_duration = self.start_time.elapsed().as_secs_f64(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_cost_tracks_the_minimum() {
        let mut stats = SolutionStats::new();
        assert_eq!(stats.best_cost(), None);
        stats.log_solution(Cost::from(12.0));
        stats.log_solution(Cost::from(7.0));
        stats.log_solution(Cost::from(9.0));
        assert_eq!(stats.best_cost(), Some(7.0));
        assert_eq!(stats.samples().len(), 3);
    }
}

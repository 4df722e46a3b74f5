use memory_stats::memory_stats;
use std::time::{Duration, Instant};
use tracing::info;

/// Absolute bound on a planner run: a wall-clock deadline and an optional
/// memory ceiling. The planner polls this after every recursive return and
/// unwinds with its best-so-far plans intact.
#[derive(Debug)]
pub struct Deadline {
    end_time: Instant,
    memory_limit_mb: Option<usize>,
}

impl Deadline {
    pub fn new(budget: Duration, memory_limit_mb: Option<usize>) -> Self {
        info!(
            time_limit = budget.as_secs_f64(),
            memory_limit_mb = memory_limit_mb,
        );
        Self {
            end_time: Instant::now() + budget,
            memory_limit_mb,
        }
    }

    pub fn expired(&self) -> bool {
        if Instant::now() > self.end_time {
            return true;
        }
        if let Some(limit_mb) = self.memory_limit_mb {
            if let Some(usage) = memory_stats() {
                if usage.physical_mem / 1024 / 1024 > limit_mb {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_after_the_budget() {
        let deadline = Deadline::new(Duration::from_secs(3600), None);
        assert!(!deadline.expired());

        let deadline = Deadline::new(Duration::ZERO, None);
        std::thread::sleep(Duration::from_millis(1));
        assert!(deadline.expired());
    }
}

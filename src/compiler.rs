//! The compilation driver: approximate the filter, translate it to an atom
//! goal, search for plans, lower the cheapest plan to a meta-program, relax
//! it, allocate registers, emit program text and validate it symbolically.

use crate::algebra::{translate_goal, Item};
use crate::approx::approx_filter;
use crate::codegen::{
    alloc, eliminate_empty_shifts, generate_meta_program, generate_program, relax, total_cost,
    CodegenError, Dialect, MetaInstruction,
};
use crate::search::{search, CostModel, PairGenProps, SolutionStats};
use crate::sim::validate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Everything the compiler needs besides the filter itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Planner wall-clock budget.
    pub search_time: Duration,
    /// Optional planner memory ceiling.
    pub memory_limit_mb: Option<usize>,
    /// Physical register names; one of them is reserved for shifting, so the
    /// planner may keep `available_regs.len() - 1` intermediate goals live.
    pub available_regs: Vec<String>,
    pub start_reg: String,
    pub target_reg: String,
    pub pair_props: PairGenProps,
    pub costs: CostModel,
    pub approx_depth: u32,
    pub max_approx_coeffs: Option<usize>,
    pub dialect: Dialect,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_time: Duration::from_secs(3),
            memory_limit_mb: None,
            available_regs: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            start_reg: "A".to_string(),
            target_reg: "B".to_string(),
            pair_props: PairGenProps::default(),
            costs: CostModel::default(),
            approx_depth: 5,
            max_approx_coeffs: None,
            dialect: Dialect::Apron,
        }
    }
}

/// The emitted program, its length in primitive instructions, and the
/// solution trajectory of the search.
#[derive(Debug)]
pub struct CompileOutput {
    pub program: Vec<String>,
    pub program_length: usize,
    pub stats: SolutionStats,
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("the filter approximates to nothing at the requested depth")]
    EmptyApproximation,
    #[error("no plan found within the search budget")]
    NoPlanFound,
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error("emitted program does not reconstruct the filter ({} missing, {} extra)", .missing.len(), .extra.len())]
    ValidationMismatch { missing: Vec<Item>, extra: Vec<Item> },
}

/// Compiles a filter into a program for the processor array.
pub fn generate(filter: &Array2<f64>, config: &Config) -> Result<CompileOutput, CompileError> {
    let n_reg = config.available_regs.len() - 1;

    let (pre_goal, approximated) = approx_filter(filter, config.approx_depth, config.max_approx_coeffs);
    if pre_goal.is_empty() {
        return Err(CompileError::EmptyApproximation);
    }
    debug!(items = pre_goal.len(), ?approximated, "filter approximated");

    let global_scale = pre_goal
        .iter()
        .map(|item| item.scale)
        .max()
        .expect("pre-goal is non-empty")
        .max(0);
    let (final_goal, _) = translate_goal(&pre_goal, global_scale, 0);

    let outcome = search(
        final_goal,
        n_reg,
        config.search_time,
        global_scale,
        &config.pair_props,
        &config.costs,
        config.memory_limit_mb,
    );
    if outcome.plans.is_empty() {
        return Err(CompileError::NoPlanFound);
    }

    let cheapest = outcome
        .plans
        .iter()
        .map(|(cost, _)| *cost)
        .min()
        .expect("plans are non-empty");
    let (_, best_plan) = outcome
        .plans
        .iter()
        .find(|(cost, _)| *cost == cheapest)
        .expect("a plan with the minimum cost exists");
    info!(
        plans = outcome.plans.len(),
        cost = cheapest.into_inner(),
        "lowering the cheapest plan"
    );

    let mut meta_program = generate_meta_program(best_plan)?;
    if meta_program.is_empty() {
        // The whole convolution is the input itself; move it into place.
        meta_program.push(MetaInstruction::move_to(0, 1, 0, (0, 0)));
    }
    debug!(
        instructions = meta_program.len(),
        cost = total_cost(&meta_program),
        "meta-program generated"
    );

    let meta_program = {
        let cleaned = eliminate_empty_shifts(meta_program);
        if cleaned.is_empty() {
            cleaned
        } else {
            relax(cleaned, n_reg)
        }
    };
    let meta_program = if meta_program.is_empty() {
        vec![MetaInstruction::move_to(0, 1, 0, (0, 0))]
    } else {
        meta_program
    };
    debug!(cost = total_cost(&meta_program), "meta-program relaxed");

    let meta_program = alloc(meta_program, n_reg + 1)?;

    let (program, program_length) = generate_program(
        meta_program,
        &config.available_regs,
        &config.start_reg,
        &config.target_reg,
        config.dialect,
    );
    info!(lines = program.len(), program_length, "program emitted");

    validate(
        &program,
        &pre_goal,
        &config.start_reg,
        &config.target_reg,
        config.dialect,
    )
    .map_err(|mismatch| CompileError::ValidationMismatch {
        missing: mismatch.missing,
        extra: mismatch.extra,
    })?;

    Ok(CompileOutput {
        program,
        program_length,
        stats: outcome.stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn config(search_secs: u64) -> Config {
        Config {
            search_time: Duration::from_secs(search_secs),
            ..Config::default()
        }
    }

    #[test]
    fn sobel_filter_compiles_and_validates() {
        let filter = array![[1.0, 0.0, -1.0], [2.0, 0.0, -2.0], [1.0, 0.0, -1.0]];
        let output = generate(
            &filter,
            &Config {
                approx_depth: 4,
                ..config(3)
            },
        )
        .unwrap();
        assert!(output.program_length > 0);
        assert!(!output.stats.samples().is_empty());

        // At most the three configured registers appear in the code.
        for line in output.program.iter().filter(|l| !l.starts_with("//")) {
            for reg in line.chars().filter(char::is_ascii_uppercase) {
                assert!(matches!(reg, 'A' | 'B' | 'C'));
            }
        }
    }

    #[test]
    fn identity_filter_is_a_single_copy() {
        let filter = array![[1.0]];
        let output = generate(&filter, &config(1)).unwrap();
        let code: Vec<&String> = output
            .program
            .iter()
            .filter(|l| !l.starts_with("//"))
            .collect();
        assert_eq!(code, vec!["B = copy(A)"]);
        assert_eq!(output.program_length, 0);
    }

    #[test]
    fn box_filter_covers_all_nine_positions() {
        let filter = array![[1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0]];
        let output = generate(&filter, &config(3)).unwrap();

        let state = crate::sim::interpret(&output.program, "A", Dialect::Apron);
        let result = &state["B"];
        assert_eq!(result.len(), 9);
        for item in result {
            assert_eq!(item.scale, 0);
            assert!(!item.neg);
            assert!(item.x.abs() <= 1 && item.y.abs() <= 1);
        }
    }

    #[test]
    fn halving_filter_divides_and_shifts() {
        let filter = array![[0.5, 0.5]];
        let output = generate(&filter, &config(2)).unwrap();
        let code: Vec<&String> = output
            .program
            .iter()
            .filter(|l| !l.starts_with("//"))
            .collect();
        assert!(code.iter().any(|l| l.contains("div2")));
        assert!(code
            .iter()
            .any(|l| l.contains("east") || l.contains("west")));
    }

    #[test]
    fn fractional_filter_validates_with_monotone_stats() {
        let filter = array![
            [0.342, 0.125, 0.513],
            [0.851, 0.111, 0.455],
            [0.513, 0.131, 0.634]
        ];
        let output = generate(
            &filter,
            &Config {
                approx_depth: 3,
                ..config(10)
            },
        )
        .unwrap();

        // Improvements only ever lower the cost.
        let mut best = f64::INFINITY;
        for &(_, cost) in output.stats.samples() {
            if cost < best {
                best = cost;
            }
        }
        assert!(best.is_finite());
    }

    #[test]
    fn csim_output_validates_too() {
        let filter = array![[1.0, 0.0, -1.0]];
        let output = generate(
            &filter,
            &Config {
                dialect: Dialect::Csim,
                ..config(2)
            },
        )
        .unwrap();
        assert!(output.program.iter().any(|l| l.starts_with("_transform(")));
    }

    #[test]
    fn relaxation_preserves_program_semantics() {
        use crate::sim::interpret;
        use std::collections::HashSet;

        let meta = vec![
            MetaInstruction::move_to(0, 1, 0, (2, 1)),
            MetaInstruction::move_to(0, 2, 0, (2, -1)),
            MetaInstruction::Add {
                source1: 1,
                source2: 2,
                s1neg: false,
                s2neg: false,
                target: 3,
            },
        ];

        let run = |meta: Vec<MetaInstruction>| -> HashSet<Item> {
            let regs: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
            let allocated = alloc(meta, 4).unwrap();
            let (program, _) = generate_program(allocated, &regs, "A", "Z", Dialect::Apron);
            interpret(&program, "A", Dialect::Apron)["Z"].clone()
        };

        let reference = run(meta.clone());
        let relaxed = relax(meta.clone(), 4);
        assert!(total_cost(&relaxed) < total_cost(&meta));
        assert_eq!(run(relaxed), reference);
    }

    #[test]
    fn zero_filter_is_rejected() {
        let filter = array![[0.0]];
        assert!(matches!(
            generate(&filter, &config(1)),
            Err(CompileError::EmptyApproximation)
        ));
    }
}

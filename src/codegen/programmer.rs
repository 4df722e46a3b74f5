//! Lowers a plan to a meta-program. Walking the plan in execution order, the
//! programmer tracks which goal every virtual register holds. A step goal
//! that matches a held goal is carried over untouched; every other goal must
//! decompose into the shift-image of the register holding the step's source
//! set, plus previously held goals that are subsets of it.

use crate::algebra::{Goal, PosKey};
use crate::codegen::{CodegenError, MetaInstruction, VirtReg};
use crate::search::{PairDecomposition, Plan};
use std::collections::{BTreeMap, BTreeSet};

/// The uniform transform of a pair decomposition: scalings, shift and
/// polarity flip that map the source set onto the produced set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shift {
    pub scale: i32,
    pub dx: i32,
    pub dy: i32,
    pub neg: bool,
}

fn position_counts(goal: &Goal) -> BTreeMap<PosKey, usize> {
    let mut counts = BTreeMap::new();
    for atom in goal {
        *counts.entry(atom.val()).or_insert(0) += 1;
    }
    counts
}

/// Recovers the transform of a pair decomposition. Any position of the
/// source (`down`) side works as a pivot: the matching produced position
/// must hold `count * ratio` atoms, and the resulting distance must map
/// every source position onto a produced one. A pair admitting no such
/// transform is invalid.
pub fn get_shift(pair: &PairDecomposition) -> Result<Shift, CodegenError> {
    let n_down = pair.down.len();
    let n_up = pair.up.len();
    if n_down == 0 || n_up == 0 {
        return Err(CodegenError::InvalidPair);
    }
    let scale = (n_down as f64 / n_up as f64).log2() as i32;

    let down = position_counts(&pair.down);
    let up = position_counts(&pair.up);
    if down.len() != up.len() {
        return Err(CodegenError::InvalidPair);
    }

    let (&(px, py, pneg), &pivot_count) = down.iter().next().expect("down side is non-empty");
    for (&(ux, uy, uneg), &up_count) in &up {
        // The candidate pivot must respect the cardinality ratio.
        if up_count * n_down != pivot_count * n_up {
            continue;
        }
        let (dx, dy, dneg) = (ux - px, uy - py, uneg != pneg);
        let consistent = down
            .keys()
            .all(|&(x, y, neg)| up.contains_key(&(x + dx, y + dy, neg != dneg)));
        if consistent {
            return Ok(Shift {
                scale,
                dx,
                dy,
                neg: dneg,
            });
        }
    }
    Err(CodegenError::InvalidPair)
}

fn find_goal_in_reg(reg_state: &BTreeMap<VirtReg, Goal>, needle: &Goal) -> Option<VirtReg> {
    reg_state
        .iter()
        .find(|(_, goal)| *goal == needle)
        .map(|(&reg, _)| reg)
}

/// Lowers a plan (in execution order) to meta-instructions over a fresh
/// virtual register space. Register 0 holds the initial state.
pub fn generate_meta_program(plan: &Plan) -> Result<Vec<MetaInstruction>, CodegenError> {
    let mut meta_program = vec![];

    let first_step = plan.first().ok_or(CodegenError::UnmatchedGoal)?;
    let mut prev_state: BTreeMap<VirtReg, Goal> = BTreeMap::new();
    prev_state.insert(0, first_step.pair.down.clone());
    let mut next_reg: VirtReg = 1;

    for step in plan {
        let mut trivial: BTreeSet<VirtReg> = BTreeSet::new();
        let mut new_state: BTreeMap<VirtReg, Goal> = BTreeMap::new();
        let mut non_trivial: Vec<&Goal> = vec![];

        for goal in &step.goals {
            match find_goal_in_reg(&prev_state, goal) {
                Some(reg) => {
                    new_state.insert(reg, goal.clone());
                    trivial.insert(reg);
                }
                None => non_trivial.push(goal),
            }
        }
        if non_trivial.is_empty() {
            continue;
        }
        if non_trivial.len() > 2 {
            return Err(CodegenError::TooManyNonTrivialGoals(non_trivial.len()));
        }

        let shift_gen_set = &step.pair.up;
        let shift_source =
            find_goal_in_reg(&prev_state, &step.pair.down).ok_or(CodegenError::UnmatchedGoal)?;

        // A non-trivial goal is the shift-image of the source set, optionally
        // unioned with held goals that are subsets of it. At most one goal
        // needs the shift and at most one goes without; the one without must
        // be assembled first.
        let mut goal_props: Vec<(bool, BTreeSet<VirtReg>, Goal)> = vec![];
        for &goal in &non_trivial {
            let mut subset_sources = BTreeSet::new();
            let mut shift_portion = goal.clone();
            for (&reg, prev_goal) in &prev_state {
                if prev_goal.is_subset(goal) {
                    subset_sources.insert(reg);
                    shift_portion = shift_portion.difference(prev_goal).copied().collect();
                }
            }
            if !shift_portion.is_empty() && shift_portion != *shift_gen_set {
                let with_source: Goal = shift_portion.union(&step.pair.down).copied().collect();
                if with_source != *shift_gen_set {
                    return Err(CodegenError::UnmatchedGoal);
                }
            }
            goal_props.push((!shift_portion.is_empty(), subset_sources, goal.clone()));
        }
        goal_props.sort_by_key(|(needs_shift, _, _)| *needs_shift);

        if goal_props.len() > 1 {
            let (_, subset_sources, goal) = &goal_props[0];
            if subset_sources.len() != 2 {
                return Err(CodegenError::UnmatchedGoal);
            }
            let mut sources = subset_sources.iter();
            let (&s1, &s2) = (
                sources.next().expect("two subset sources"),
                sources.next().expect("two subset sources"),
            );
            let target = next_reg;
            next_reg += 1;
            meta_program.push(MetaInstruction::Add {
                source1: s1,
                source2: s2,
                s1neg: false,
                s2neg: false,
                target,
            });
            new_state.insert(target, goal.clone());
        }

        let (_, mut subset_sources, shift_goal) = goal_props.pop().expect("at least one goal");
        let Shift {
            scale,
            dx,
            dy,
            neg: polarity,
        } = get_shift(&step.pair)?;

        // Under a scale-only transform the source register is produced by the
        // move itself, not folded in as a subset.
        if !polarity && dx == 0 && dy == 0 {
            subset_sources.remove(&shift_source);
        }

        let target;
        if subset_sources.len() < 2 || subset_sources.is_subset(&trivial) {
            let mut current = next_reg;
            next_reg += 1;
            // With no adds to follow, the polarity flip folds into the move.
            meta_program.push(MetaInstruction::Move {
                source: shift_source,
                target: current,
                scale,
                shift: (dx, dy),
                neg: subset_sources.is_empty() && polarity,
            });
            let mut prev_polarity = polarity;
            for &subset_source in &subset_sources {
                let prev_target = current;
                current = next_reg;
                next_reg += 1;
                meta_program.push(MetaInstruction::Add {
                    source1: subset_source,
                    source2: prev_target,
                    s1neg: false,
                    s2neg: prev_polarity,
                    target: current,
                });
                prev_polarity = false;
            }
            target = current;
        } else {
            // Two live subset sources: adding them first needs one register
            // fewer than shifting first.
            let mut sources = subset_sources.iter();
            let (&s1, &s2) = (
                sources.next().expect("two subset sources"),
                sources.next().expect("two subset sources"),
            );
            let sub_target = next_reg;
            next_reg += 1;
            meta_program.push(MetaInstruction::Add {
                source1: s1,
                source2: s2,
                s1neg: false,
                s2neg: false,
                target: sub_target,
            });
            let shift_target = next_reg;
            next_reg += 1;
            meta_program.push(MetaInstruction::move_to(
                shift_source,
                shift_target,
                scale,
                (dx, dy),
            ));
            target = next_reg;
            next_reg += 1;
            meta_program.push(MetaInstruction::Add {
                source1: sub_target,
                source2: shift_target,
                s1neg: false,
                s2neg: polarity,
                target,
            });
        }

        new_state.insert(target, shift_goal);
        prev_state = new_state;
    }

    Ok(meta_program)
}

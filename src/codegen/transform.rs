//! Liveness-aware peephole rewrites of the meta-program. Both relaxations
//! preserve the program's semantics while cutting its primitive instruction
//! count: common-shift factoring hoists the shared component of sibling
//! moves into one intermediate move, and rebalancing shifts weight between a
//! parent move and its children towards the median.

use crate::codegen::{get_liveness, MetaInstruction, VirtReg};
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

/// Total primitive-instruction cost of a meta-program.
pub fn total_cost(meta_program: &[MetaInstruction]) -> usize {
    meta_program.iter().map(MetaInstruction::cost).sum()
}

fn highest_reg(meta_program: &[MetaInstruction]) -> VirtReg {
    meta_program
        .iter()
        .flat_map(|instr| {
            instr
                .source_regs()
                .into_iter()
                .chain(std::iter::once(instr.target()))
        })
        .max()
        .unwrap_or(0)
}

/// Def/use edges of a meta-program: for every register, the move and add
/// instructions reading it and the instruction writing it.
struct Edges {
    shift_out: BTreeMap<VirtReg, BTreeSet<usize>>,
    add_out: BTreeMap<VirtReg, BTreeSet<usize>>,
    reg_in: BTreeMap<VirtReg, usize>,
}

fn edges(meta_program: &[MetaInstruction]) -> Edges {
    let mut shift_out: BTreeMap<VirtReg, BTreeSet<usize>> = BTreeMap::new();
    let mut add_out: BTreeMap<VirtReg, BTreeSet<usize>> = BTreeMap::new();
    let mut reg_in = BTreeMap::new();

    for (i, instr) in meta_program.iter().enumerate() {
        reg_in.insert(instr.target(), i);
        match instr {
            MetaInstruction::Move { source, .. } => {
                shift_out.entry(*source).or_default().insert(i);
            }
            MetaInstruction::Add {
                source1, source2, ..
            } => {
                add_out.entry(*source1).or_default().insert(i);
                add_out.entry(*source2).or_default().insert(i);
            }
        }
    }

    Edges {
        shift_out,
        add_out,
        reg_in,
    }
}

/// Removes moves with no transform, rewiring every later reader of their
/// target to their source.
pub fn eliminate_empty_shifts(meta_program: Vec<MetaInstruction>) -> Vec<MetaInstruction> {
    let mut alias: HashMap<VirtReg, VirtReg> = HashMap::new();
    let mut kept = vec![];

    for mut instr in meta_program {
        match &mut instr {
            MetaInstruction::Move { source, .. } => {
                if let Some(&root) = alias.get(source) {
                    *source = root;
                }
            }
            MetaInstruction::Add {
                source1, source2, ..
            } => {
                if let Some(&root) = alias.get(source1) {
                    *source1 = root;
                }
                if let Some(&root) = alias.get(source2) {
                    *source2 = root;
                }
            }
        }
        if instr.is_identity_move() {
            alias.insert(instr.target(), instr.primary_source());
        } else {
            kept.push(instr);
        }
    }
    kept
}

struct ShiftCandidate {
    source: VirtReg,
    shift: (i32, i32),
    scale: i32,
    instrs: Vec<usize>,
}

impl ShiftCandidate {
    fn benefit(&self) -> usize {
        self.instrs.len()
            * (self.shift.0.unsigned_abs() + self.shift.1.unsigned_abs() + self.scale.unsigned_abs())
                as usize
    }
}

fn move_transform(instr: &MetaInstruction) -> (i32, i32, i32) {
    match instr {
        MetaInstruction::Move { scale, shift, .. } => (shift.0, shift.1, *scale),
        MetaInstruction::Add { .. } => unreachable!("only moves carry a transform"),
    }
}

/// Finds the subsets of sibling moves that share a signed transform
/// component. A subset qualifies only while liveness stays below the
/// register budget across the affected range.
fn same_shift_candidates(
    meta_program: &[MetaInstruction],
    edges: &Edges,
    n_reg: usize,
) -> Vec<ShiftCandidate> {
    let liveness = get_liveness(meta_program);
    let mut candidates = vec![];

    for (&reg, readers) in &edges.shift_out {
        if readers.len() < 2 {
            continue;
        }
        if readers.len() > 20 {
            warn!(
                siblings = readers.len(),
                "too many moves from one register, the subset space is not enumerable"
            );
            return vec![];
        }

        for size in 2..=readers.len() {
            for subset in readers.iter().copied().combinations(size) {
                let lo = *subset.first().expect("non-empty subset");
                let hi = *subset.last().expect("non-empty subset");
                if (lo..=hi).any(|i| liveness[i].len() >= n_reg) {
                    continue;
                }

                // The signed component present in every sibling.
                let (mut xp, mut xn, mut yp, mut yn, mut sp, mut sn) =
                    (i32::MAX, i32::MAX, i32::MAX, i32::MAX, i32::MAX, i32::MAX);
                for &i in &subset {
                    let (dx, dy, scale) = move_transform(&meta_program[i]);
                    xp = xp.min(dx).max(0);
                    xn = xn.min(-dx).max(0);
                    yp = yp.min(dy).max(0);
                    yn = yn.min(-dy).max(0);
                    sp = sp.min(scale).max(0);
                    sn = sn.min(-scale).max(0);
                }
                if xp > 0 || xn > 0 || yp > 0 || yn > 0 || sp > 0 || sn > 0 {
                    candidates.push(ShiftCandidate {
                        source: reg,
                        shift: (xp - xn, yp - yn),
                        scale: sp - sn,
                        instrs: subset,
                    });
                }
            }
        }
    }
    candidates
}

/// Factors the common component out of sibling moves: one move from the
/// original source into a fresh intermediate register carries the shared
/// transform, and every sibling becomes a residual move from there. Applied
/// repeatedly, best candidate first, until no candidate remains.
pub fn relax_same_shift(meta_program: Vec<MetaInstruction>, n_reg: usize) -> Vec<MetaInstruction> {
    let mut meta_program = eliminate_empty_shifts(meta_program);
    loop {
        let edges = edges(&meta_program);
        let candidates = same_shift_candidates(&meta_program, &edges, n_reg);
        let Some(best) = candidates.into_iter().max_by_key(ShiftCandidate::benefit) else {
            break;
        };

        let temp_reg = highest_reg(&meta_program) + 1;
        meta_program.insert(
            best.instrs[0],
            MetaInstruction::move_to(best.source, temp_reg, best.scale, best.shift),
        );
        for &i in &best.instrs {
            let MetaInstruction::Move {
                target,
                scale,
                shift,
                neg,
                ..
            } = meta_program[i + 1]
            else {
                unreachable!("candidate instructions are moves");
            };
            meta_program[i + 1] = MetaInstruction::Move {
                source: temp_reg,
                target,
                scale: scale - best.scale,
                shift: (shift.0 - best.shift.0, shift.1 - best.shift.1),
                neg,
            };
        }
    }
    eliminate_empty_shifts(meta_program)
}

struct RebalanceCandidate {
    benefit: i64,
    shift_diff: (i32, i32),
    scale_diff: i32,
    parent: usize,
    add_instrs: BTreeSet<usize>,
    move_instrs: BTreeSet<usize>,
    out_reg: VirtReg,
}

fn floor_median(mut weights: Vec<i64>) -> i64 {
    weights.sort_unstable();
    let n = weights.len();
    let median = if n % 2 == 1 {
        weights[n / 2] as f64
    } else {
        (weights[n / 2 - 1] + weights[n / 2]) as f64 / 2.0
    };
    median.floor() as i64
}

fn axis_diff_and_benefit(
    move_values: &[i32],
    n_adds: usize,
    parent_value: i32,
) -> (i64, i64) {
    let mut weights: Vec<i64> = move_values.iter().map(|&v| i64::from(v)).collect();
    weights.extend(std::iter::repeat(0).take(n_adds));
    weights.push(-i64::from(parent_value));
    let diff = floor_median(weights.clone());
    let benefit = weights.iter().map(|w| w.abs()).sum::<i64>()
        - weights.iter().map(|w| (w - diff).abs()).sum::<i64>();
    (diff, benefit)
}

fn rebalance_pairs(
    meta_program: &[MetaInstruction],
    edges: &Edges,
    liveness: &[std::collections::HashSet<VirtReg>],
) -> Vec<(VirtReg, VirtReg)> {
    let mut pairs: Vec<(VirtReg, VirtReg)> = edges.reg_in.keys().map(|&r| (r, r)).collect();

    // Chain pairs: a move producing a register that is alone in its live set
    // can trade movement with a non-move consumer in the same situation.
    let mut moves_in = vec![];
    let mut others_in = vec![];
    for (&reg, &def) in &edges.reg_in {
        if liveness[def].len() == 1 {
            if matches!(meta_program[def], MetaInstruction::Move { .. }) {
                moves_in.push(reg);
            } else {
                others_in.push(reg);
            }
        }
    }
    for &ri in &moves_in {
        for &ro in &others_in {
            pairs.push((ri, ro));
        }
    }
    pairs
}

fn rebalance_candidates(
    meta_program: &[MetaInstruction],
    edges: &Edges,
    n_reg: usize,
) -> Vec<RebalanceCandidate> {
    let liveness = get_liveness(meta_program);
    let mut candidates = vec![];

    for (ri, ro) in rebalance_pairs(meta_program, edges, &liveness) {
        let Some(move_instrs) = edges.shift_out.get(&ro) else {
            continue;
        };
        let Some(&parent) = edges.reg_in.get(&ri) else {
            continue;
        };
        if !matches!(meta_program[parent], MetaInstruction::Move { .. }) {
            continue;
        }

        let add_instrs = edges.add_out.get(&ro).cloned().unwrap_or_default();
        if let (Some(&first_add), Some(&last_add)) =
            (add_instrs.iter().next(), add_instrs.iter().last())
        {
            let moves_precede_adds =
                *move_instrs.iter().last().expect("at least one move") < first_add;
            let under_live = (first_add.saturating_sub(1)..last_add)
                .all(|i| liveness[i].len() < n_reg);
            if !moves_precede_adds && !under_live {
                continue;
            }
        }

        let transforms: Vec<(i32, i32, i32)> = move_instrs
            .iter()
            .map(|&i| move_transform(&meta_program[i]))
            .collect();
        let (px, py, ps) = move_transform(&meta_program[parent]);

        let xs: Vec<i32> = transforms.iter().map(|t| t.0).collect();
        let ys: Vec<i32> = transforms.iter().map(|t| t.1).collect();
        let ss: Vec<i32> = transforms.iter().map(|t| t.2).collect();
        let n_adds = add_instrs.len();

        let (x_diff, x_benefit) = axis_diff_and_benefit(&xs, n_adds, px);
        let (y_diff, y_benefit) = axis_diff_and_benefit(&ys, n_adds, py);
        let (s_diff, s_benefit) = axis_diff_and_benefit(&ss, n_adds, ps);

        let benefit = x_benefit + y_benefit + s_benefit;
        if (x_diff != 0 || y_diff != 0 || s_diff != 0) && benefit > 0 {
            candidates.push(RebalanceCandidate {
                benefit,
                shift_diff: (x_diff as i32, y_diff as i32),
                scale_diff: s_diff as i32,
                parent,
                add_instrs,
                move_instrs: move_instrs.clone(),
                out_reg: ro,
            });
        }
    }
    candidates
}

fn apply_transform_delta(instr: &mut MetaInstruction, shift_diff: (i32, i32), scale_diff: i32) {
    let MetaInstruction::Move { scale, shift, .. } = instr else {
        unreachable!("only moves carry a transform");
    };
    shift.0 += shift_diff.0;
    shift.1 += shift_diff.1;
    *scale += scale_diff;
}

/// Moves transform weight between a parent move and the consumers of its
/// result: the median of the children's per-axis movement is absorbed into
/// the parent, and add consumers are compensated through one inverse move.
pub fn relax_rebalance(meta_program: Vec<MetaInstruction>, n_reg: usize) -> Vec<MetaInstruction> {
    let mut meta_program = eliminate_empty_shifts(meta_program);
    loop {
        let edges = edges(&meta_program);
        let candidates = rebalance_candidates(&meta_program, &edges, n_reg);
        let Some(best) = candidates.into_iter().max_by_key(|c| c.benefit) else {
            break;
        };

        apply_transform_delta(&mut meta_program[best.parent], best.shift_diff, best.scale_diff);
        for &i in &best.move_instrs {
            apply_transform_delta(
                &mut meta_program[i],
                (-best.shift_diff.0, -best.shift_diff.1),
                -best.scale_diff,
            );
        }

        if !best.add_instrs.is_empty() {
            let temp_reg = highest_reg(&meta_program) + 1;
            for &i in &best.add_instrs {
                let MetaInstruction::Add {
                    source1, source2, ..
                } = &mut meta_program[i]
                else {
                    unreachable!("add edges point at adds");
                };
                if *source1 == best.out_reg {
                    *source1 = temp_reg;
                }
                if *source2 == best.out_reg {
                    *source2 = temp_reg;
                }
            }
            let first_add = *best.add_instrs.iter().next().expect("non-empty");
            meta_program.insert(
                first_add,
                MetaInstruction::move_to(
                    best.out_reg,
                    temp_reg,
                    -best.scale_diff,
                    (-best.shift_diff.0, -best.shift_diff.1),
                ),
            );
        }
    }
    eliminate_empty_shifts(meta_program)
}

/// Runs both relaxations until the total cost stops improving.
pub fn relax(mut meta_program: Vec<MetaInstruction>, n_reg: usize) -> Vec<MetaInstruction> {
    let mut cost = total_cost(&meta_program);
    loop {
        meta_program = relax_same_shift(meta_program, n_reg);
        meta_program = relax_rebalance(meta_program, n_reg);
        let new_cost = total_cost(&meta_program);
        if new_cost >= cost {
            break;
        }
        cost = new_cost;
    }
    meta_program
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_shifts_are_removed_and_readers_rewired() {
        let meta = vec![
            MetaInstruction::move_to(0, 1, 0, (0, 0)),
            MetaInstruction::move_to(1, 2, 1, (0, 0)),
            MetaInstruction::Add {
                source1: 1,
                source2: 2,
                s1neg: false,
                s2neg: false,
                target: 3,
            },
        ];
        let cleaned = eliminate_empty_shifts(meta);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0], MetaInstruction::move_to(0, 2, 1, (0, 0)));
        assert_eq!(
            cleaned[1],
            MetaInstruction::Add {
                source1: 0,
                source2: 2,
                s1neg: false,
                s2neg: false,
                target: 3,
            }
        );
    }

    #[test]
    fn common_shift_is_factored_out_once() {
        // Two siblings both move three east; the shared component should be
        // hoisted into a single intermediate move.
        let meta = vec![
            MetaInstruction::move_to(0, 1, 0, (3, 0)),
            MetaInstruction::move_to(0, 2, 0, (3, 1)),
            MetaInstruction::Add {
                source1: 1,
                source2: 2,
                s1neg: false,
                s2neg: false,
                target: 3,
            },
        ];
        let before = total_cost(&meta);
        let relaxed = relax_same_shift(meta, 4);
        assert!(total_cost(&relaxed) < before);

        // The hoisted move carries the common shift; exactly one residual
        // move survives (the other became an empty shift and was removed).
        assert_eq!(relaxed[0], MetaInstruction::move_to(0, 4, 0, (3, 0)));
        assert!(relaxed
            .iter()
            .any(|i| matches!(i, MetaInstruction::Move { source: 4, shift: (0, 1), .. })));
    }

    #[test]
    fn liveness_guard_blocks_overfull_factoring() {
        let meta = vec![
            MetaInstruction::move_to(0, 1, 0, (3, 0)),
            MetaInstruction::move_to(0, 2, 0, (3, 1)),
            MetaInstruction::Add {
                source1: 1,
                source2: 2,
                s1neg: false,
                s2neg: false,
                target: 3,
            },
        ];
        // With everything live at once, no candidate passes the guard.
        let relaxed = relax_same_shift(meta.clone(), 2);
        assert_eq!(relaxed, meta);
    }

    #[test]
    fn rebalancing_moves_weight_into_the_parent() {
        // A parent move feeding two children that both still travel east:
        // the median movement shifts into the parent.
        let meta = vec![
            MetaInstruction::move_to(0, 1, 0, (0, 1)),
            MetaInstruction::move_to(1, 2, 0, (2, 0)),
            MetaInstruction::move_to(1, 3, 0, (2, 0)),
            MetaInstruction::Add {
                source1: 2,
                source2: 3,
                s1neg: false,
                s2neg: false,
                target: 4,
            },
        ];
        let before = total_cost(&meta);
        let relaxed = relax_rebalance(meta, 4);
        assert!(total_cost(&relaxed) < before);
    }

    #[test]
    fn relax_terminates_when_no_gain_remains() {
        let meta = vec![
            MetaInstruction::move_to(0, 1, 0, (1, 0)),
            MetaInstruction::Add {
                source1: 0,
                source2: 1,
                s1neg: false,
                s2neg: false,
                target: 2,
            },
        ];
        let relaxed = relax(meta.clone(), 3);
        assert_eq!(relaxed, meta);
    }
}

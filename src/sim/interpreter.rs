//! Symbolic interpretation of an emitted program. Every register holds a set
//! of items; the input register starts as the unit item at the origin.
//! Re-interpreting the program and comparing against the pre-goal closes the
//! compilation loop.

use crate::algebra::Item;
use crate::codegen::Dialect;
use crate::sim::{parse_program, BinaryOp, SimInstruction, UnaryOp};
use std::collections::{HashMap, HashSet};

pub type RegState = HashMap<String, HashSet<Item>>;

fn shift_set(items: &HashSet<Item>, scale: i32, dx: i32, dy: i32, neg: bool) -> HashSet<Item> {
    items
        .iter()
        .map(|item| Item::new(item.scale + scale, item.x + dx, item.y + dy, item.neg != neg))
        .collect()
}

/// Adds two item sets. Items present on both sides collapse into one item of
/// the next coarser scale (a duplicate of weight `w` contributes `2w`), which
/// may cascade until the sides are disjoint.
fn add_sets(lhs: &HashSet<Item>, rhs: &HashSet<Item>) -> HashSet<Item> {
    let mut lhs = lhs.clone();
    let mut rhs = rhs.clone();
    while !lhs.is_disjoint(&rhs) {
        let common: HashSet<Item> = lhs.intersection(&rhs).copied().collect();
        lhs = lhs.symmetric_difference(&rhs).copied().collect();
        rhs = shift_set(&common, -1, 0, 0, false);
    }
    lhs.union(&rhs).copied().collect()
}

fn negate_set(items: &HashSet<Item>) -> HashSet<Item> {
    items.iter().map(|item| -*item).collect()
}

fn read(state: &RegState, reg: &str) -> HashSet<Item> {
    state.get(reg).cloned().unwrap_or_default()
}

/// Interprets the program over item sets, starting from
/// `{start_reg: {Item(0, 0, 0)}}`, and returns the final register state.
pub fn interpret(program: &[String], start_reg: &str, dialect: Dialect) -> RegState {
    let mut state = RegState::new();
    state.insert(
        start_reg.to_string(),
        HashSet::from([Item::positive(0, 0, 0)]),
    );

    for instruction in parse_program(program, dialect) {
        match instruction {
            SimInstruction::Binary {
                op,
                target,
                lhs,
                rhs,
            } => {
                let lhs = read(&state, &lhs);
                let rhs = read(&state, &rhs);
                let result = match op {
                    BinaryOp::Add => add_sets(&lhs, &rhs),
                    BinaryOp::Sub => add_sets(&lhs, &negate_set(&rhs)),
                    BinaryOp::AddNeg => negate_set(&add_sets(&lhs, &rhs)),
                };
                state.insert(target, result);
            }
            SimInstruction::Unary { op, target, source } => {
                let source = read(&state, &source);
                let result = match op {
                    UnaryOp::North => shift_set(&source, 0, 0, 1, false),
                    UnaryOp::East => shift_set(&source, 0, 1, 0, false),
                    UnaryOp::South => shift_set(&source, 0, 0, -1, false),
                    UnaryOp::West => shift_set(&source, 0, -1, 0, false),
                    UnaryOp::Div2 => shift_set(&source, 1, 0, 0, false),
                    UnaryOp::Neg => shift_set(&source, 0, 0, 0, true),
                    UnaryOp::Copy => source,
                };
                state.insert(target, result);
            }
            SimInstruction::Transform {
                target,
                source,
                dx,
                dy,
                scale,
                neg,
            } => {
                let source = read(&state, &source);
                state.insert(target, shift_set(&source, scale, dx, dy, neg));
            }
        }
    }
    state
}

/// The difference between the expected and the reconstructed item sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub missing: Vec<Item>,
    pub extra: Vec<Item>,
}

/// Validates an emitted program: its symbolic interpretation must leave
/// exactly the expected item set in `target_reg`.
pub fn validate(
    program: &[String],
    expected: &[Item],
    start_reg: &str,
    target_reg: &str,
    dialect: Dialect,
) -> Result<(), Mismatch> {
    let state = interpret(program, start_reg, dialect);
    let actual = read(&state, target_reg);
    let expected: HashSet<Item> = expected.iter().copied().collect();

    if actual.len() == expected.len() && expected.is_subset(&actual) {
        return Ok(());
    }

    let mut missing: Vec<Item> = expected.difference(&actual).copied().collect();
    let mut extra: Vec<Item> = actual.difference(&expected).copied().collect();
    missing.sort();
    extra.sort();
    Err(Mismatch { missing, extra })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &[&str]) -> Vec<String> {
        text.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn duplicate_items_promote_to_a_coarser_scale() {
        let a = HashSet::from([Item::positive(0, 0, 0)]);
        let b = HashSet::from([Item::positive(0, 0, 0)]);
        assert_eq!(add_sets(&a, &b), HashSet::from([Item::positive(-1, 0, 0)]));

        // Cascading: 1 + 1 already holds a 2, so adding two of them gives 4.
        let c = HashSet::from([Item::positive(-1, 0, 0)]);
        assert_eq!(add_sets(&c, &c), HashSet::from([Item::positive(-2, 0, 0)]));
    }

    #[test]
    fn disjoint_sets_union() {
        let a = HashSet::from([Item::positive(0, 0, 0)]);
        let b = HashSet::from([Item::positive(0, 1, 0)]);
        assert_eq!(add_sets(&a, &b).len(), 2);
    }

    #[test]
    fn apron_program_reconstructs_a_shifted_sum() {
        let program = lines(&[
            "// generated",
            "B = east(A)",
            "C = add(A, B)",
        ]);
        let state = interpret(&program, "A", Dialect::Apron);
        assert_eq!(
            state["C"],
            HashSet::from([Item::positive(0, 0, 0), Item::positive(0, 1, 0)])
        );
    }

    #[test]
    fn sub_negates_the_second_operand() {
        let program = lines(&["B = east(A)", "C = sub(A, B)"]);
        let state = interpret(&program, "A", Dialect::Apron);
        assert_eq!(
            state["C"],
            HashSet::from([Item::positive(0, 0, 0), Item::new(0, 1, 0, true)])
        );
    }

    #[test]
    fn csim_transform_applies_the_whole_move() {
        let program = lines(&[
            "_transform(B, A, 1, -2, 1, 1);",
            "// east(B, A);",
        ]);
        let state = interpret(&program, "A", Dialect::Csim);
        assert_eq!(state["B"], HashSet::from([Item::new(1, 1, -2, true)]));
    }

    #[test]
    fn validation_reports_missing_and_extra_items() {
        let program = lines(&["B = east(A)"]);
        let expected = vec![Item::positive(0, 0, 0)];
        let mismatch = validate(&program, &expected, "A", "B", Dialect::Apron).unwrap_err();
        assert_eq!(mismatch.missing, vec![Item::positive(0, 0, 0)]);
        assert_eq!(mismatch.extra, vec![Item::positive(0, 1, 0)]);

        let expected = vec![Item::positive(0, 1, 0)];
        assert!(validate(&program, &expected, "A", "B", Dialect::Apron).is_ok());
    }
}

//! Formats a register-allocated meta-program as textual instructions in one
//! of the two supported dialects. APRON is assignment style
//! (`X = op(Y[, Z])`); CSIM is call style (`op(X, Y[, Z]);`) and carries the
//! move semantics in comment-annotated `_transform` convenience lines, with
//! the primitive shift steps commented out.

use crate::codegen::{MetaInstruction, VirtReg};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// The output dialect of the emitter.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[clap(rename_all = "UPPER")]
pub enum Dialect {
    #[strum(serialize = "APRON")]
    Apron,
    #[strum(serialize = "CSIM")]
    Csim,
}

/// Primitive array operations, named by their textual mnemonic. A doubling
/// is its own operation even though it prints as an add of a register onto
/// itself: in CSIM it belongs to the `_transform` and is only annotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
enum Op {
    Copy,
    South,
    North,
    West,
    East,
    #[strum(serialize = "add")]
    Double,
    Div2,
    Sneg,
    Neg,
    Add,
    Sub,
    Addneg,
}

fn unary(dialect: Dialect, op: Op, target: &str, source: &str) -> String {
    match dialect {
        Dialect::Apron => format!("{target} = {op}({source})"),
        Dialect::Csim => match op {
            Op::Copy => format!("mov({target}, {source});"),
            // Shift steps are informational in CSIM; the `_transform` line
            // carries the semantics.
            Op::South | Op::North | Op::West | Op::East | Op::Div2 => {
                format!("// {op}({target}, {source});")
            }
            Op::Sneg | Op::Neg => format!("neg({target}, {source});"),
            _ => unreachable!("binary op used as unary"),
        },
    }
}

fn binary(dialect: Dialect, op: Op, target: &str, a: &str, b: &str) -> String {
    match dialect {
        Dialect::Apron => format!("{target} = {op}({a}, {b})"),
        Dialect::Csim => match op {
            Op::Double => format!("// add({target}, {a}, {b});"),
            _ => format!("{op}({target}, {a}, {b});"),
        },
    }
}

/// Expands one move into primitive steps, ping-ponging through the target
/// register: the first step reads the source, every later one the target.
/// Returns the move's contribution to the program length.
fn emit_move(
    dialect: Dialect,
    source: VirtReg,
    target: VirtReg,
    scale: i32,
    shift: (i32, i32),
    neg: bool,
    reg_names: &[String],
    program: &mut Vec<String>,
) -> usize {
    let s = reg_names[source].as_str();
    let t = reg_names[target].as_str();
    let (dx, dy) = shift;

    program.push(format!(
        "// [{t}] <- [{s}] || x:{dx} y:{dy} s:{scale} neg:{}",
        u8::from(neg)
    ));
    if dialect == Dialect::Csim {
        program.push(format!(
            "_transform({t}, {s}, {dx}, {dy}, {scale}, {});",
            u8::from(neg)
        ));
    }

    if scale == 0 && shift == (0, 0) && !neg {
        program.push(unary(dialect, Op::Copy, t, s));
        return 0;
    }

    let mut src = s;
    for _ in 0..(-dy).max(0) {
        program.push(unary(dialect, Op::South, t, src));
        src = t;
    }
    for _ in 0..dy.max(0) {
        program.push(unary(dialect, Op::North, t, src));
        src = t;
    }
    for _ in 0..(-dx).max(0) {
        program.push(unary(dialect, Op::West, t, src));
        src = t;
    }
    for _ in 0..dx.max(0) {
        program.push(unary(dialect, Op::East, t, src));
        src = t;
    }
    for _ in 0..(-scale).max(0) {
        program.push(binary(dialect, Op::Double, t, src, src));
        src = t;
    }
    for _ in 0..scale.max(0) {
        program.push(unary(dialect, Op::Div2, t, src));
        src = t;
    }
    if neg {
        // An in-place negation has its own mnemonic.
        let op = if src == t { Op::Sneg } else { Op::Neg };
        program.push(unary(dialect, op, t, src));
    }

    (scale.unsigned_abs() + dx.unsigned_abs() + dy.unsigned_abs()) as usize + usize::from(neg)
}

fn emit_add(
    dialect: Dialect,
    source1: VirtReg,
    source2: VirtReg,
    s1neg: bool,
    s2neg: bool,
    target: VirtReg,
    reg_names: &[String],
    program: &mut Vec<String>,
) -> usize {
    let s1 = reg_names[source1].as_str();
    let s2 = reg_names[source2].as_str();
    let t = reg_names[target].as_str();
    let line = match (s1neg, s2neg) {
        (false, false) => binary(dialect, Op::Add, t, s1, s2),
        (false, true) => binary(dialect, Op::Sub, t, s1, s2),
        (true, false) => binary(dialect, Op::Sub, t, s2, s1),
        (true, true) => binary(dialect, Op::Addneg, t, s1, s2),
    };
    program.push(line);
    1
}

/// Formats the allocated meta-program. The physical register names are
/// reshuffled so that the first instruction reads `start_reg` (a no-op move
/// is prepended when `start_reg` is not part of the working set) and the
/// last instruction writes `target_reg`. Returns the program text and its
/// length in primitive instructions.
pub fn generate_program(
    mut meta_program: Vec<MetaInstruction>,
    available_regs: &[String],
    start_reg: &str,
    target_reg: &str,
    dialect: Dialect,
) -> (Vec<String>, usize) {
    let mut reg_names: Vec<String> = available_regs.to_vec();
    let expected_slot = meta_program[0].primary_source();

    if let Some(pos) = reg_names.iter().position(|name| name == start_reg) {
        reg_names.remove(pos);
        reg_names.insert(expected_slot, start_reg.to_string());
    } else {
        reg_names.push(start_reg.to_string());
        meta_program.insert(
            0,
            MetaInstruction::move_to(reg_names.len() - 1, expected_slot, 0, (0, 0)),
        );
    }

    reg_names.push(target_reg.to_string());
    meta_program
        .last_mut()
        .expect("meta-program is non-empty")
        .set_target(reg_names.len() - 1);

    let mut program = vec![
        "// ----------------------------------------------------".to_string(),
        "// DO NOT MODIFY! (Automatically generated kernel code)".to_string(),
    ];
    let mut length = 0;
    for instr in &meta_program {
        length += match *instr {
            MetaInstruction::Move {
                source,
                target,
                scale,
                shift,
                neg,
            } => emit_move(
                dialect, source, target, scale, shift, neg, &reg_names, &mut program,
            ),
            MetaInstruction::Add {
                source1,
                source2,
                s1neg,
                s2neg,
                target,
            } => emit_add(
                dialect, source1, source2, s1neg, s2neg, target, &reg_names, &mut program,
            ),
        };
    }
    program.push("// ----------------------------------------------------".to_string());
    (program, length)
}

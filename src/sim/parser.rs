//! Parsers for the emitted program text. One parser per dialect construct;
//! lines that parse as no known instruction (comments, banners) are skipped
//! by [`parse_program`].

use crate::codegen::Dialect;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, digit1, one_of, space0};
use nom::combinator::{map, map_opt, opt, recognize};
use nom::multi::separated_list1;
use nom::sequence::{delimited, pair, tuple};

pub type Span<'a> = nom_locate::LocatedSpan<&'a str>;

pub type ParseError<'a> = nom_greedyerror::GreedyError<Span<'a>, nom::error::ErrorKind>;

pub type ParseResult<'a, T, E = ParseError<'a>> = nom::IResult<Span<'a>, T, E>;

/// A parsed program instruction, ready for symbolic interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimInstruction {
    Binary {
        op: BinaryOp,
        target: String,
        lhs: String,
        rhs: String,
    },
    Unary {
        op: UnaryOp,
        target: String,
        source: String,
    },
    Transform {
        target: String,
        source: String,
        dx: i32,
        dy: i32,
        scale: i32,
        neg: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    North,
    East,
    South,
    West,
    Div2,
    Neg,
    Copy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    AddNeg,
}

fn parse_reg<'a>(input: Span<'a>) -> ParseResult<'a, String> {
    map(
        take_while1(|c: char| c.is_ascii_uppercase() || c.is_ascii_digit()),
        |name: Span| name.fragment().to_string(),
    )(input)
}

fn parse_op_name<'a>(input: Span<'a>) -> ParseResult<'a, String> {
    map(
        take_while1(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit()),
        |name: Span| name.fragment().to_string(),
    )(input)
}

fn parse_args<'a>(input: Span<'a>) -> ParseResult<'a, Vec<String>> {
    delimited(
        char('('),
        separated_list1(pair(char(','), space0), parse_reg),
        char(')'),
    )(input)
}

fn parse_i32<'a>(input: Span<'a>) -> ParseResult<'a, i32> {
    map_opt(
        recognize(pair(opt(one_of("+-")), digit1)),
        |number: Span| number.fragment().parse::<i32>().ok(),
    )(input)
}

/// Parses an assignment-style instruction, `T = op(S[, S2])`.
pub fn parse_apron_instruction<'a>(input: Span<'a>) -> ParseResult<'a, SimInstruction> {
    map_opt(
        tuple((
            parse_reg,
            delimited(space0, char('='), space0),
            parse_op_name,
            parse_args,
        )),
        |(target, _, op, args)| match (op.as_str(), args.as_slice()) {
            ("add", [lhs, rhs]) => Some(binary(BinaryOp::Add, target, lhs, rhs)),
            ("sub", [lhs, rhs]) => Some(binary(BinaryOp::Sub, target, lhs, rhs)),
            ("addneg", [lhs, rhs]) => Some(binary(BinaryOp::AddNeg, target, lhs, rhs)),
            ("north", [source]) => Some(unary(UnaryOp::North, target, source)),
            ("east", [source]) => Some(unary(UnaryOp::East, target, source)),
            ("south", [source]) => Some(unary(UnaryOp::South, target, source)),
            ("west", [source]) => Some(unary(UnaryOp::West, target, source)),
            ("div2", [source]) => Some(unary(UnaryOp::Div2, target, source)),
            ("neg" | "sneg", [source]) => Some(unary(UnaryOp::Neg, target, source)),
            ("copy", [source]) => Some(unary(UnaryOp::Copy, target, source)),
            _ => None,
        },
    )(input)
}

/// Parses a call-style instruction, `op(T, S[, S2]);` or a `_transform`
/// convenience line.
pub fn parse_csim_instruction<'a>(input: Span<'a>) -> ParseResult<'a, SimInstruction> {
    alt((parse_transform, parse_csim_call))(input)
}

fn parse_csim_call<'a>(input: Span<'a>) -> ParseResult<'a, SimInstruction> {
    map_opt(
        tuple((parse_op_name, parse_args, char(';'))),
        |(op, args, _)| match (op.as_str(), args.as_slice()) {
            ("add", [target, lhs, rhs]) => Some(binary(BinaryOp::Add, target.clone(), lhs, rhs)),
            ("sub", [target, lhs, rhs]) => Some(binary(BinaryOp::Sub, target.clone(), lhs, rhs)),
            ("addneg", [target, lhs, rhs]) => {
                Some(binary(BinaryOp::AddNeg, target.clone(), lhs, rhs))
            }
            ("mov", [target, source]) => Some(unary(UnaryOp::Copy, target.clone(), source)),
            // A `neg` call restates what the preceding `_transform` already
            // applies, so it carries no meaning of its own here.
            _ => None,
        },
    )(input)
}

fn parse_transform<'a>(input: Span<'a>) -> ParseResult<'a, SimInstruction> {
    let separator = || pair(char(','), space0);
    map(
        tuple((
            tag("_transform("),
            parse_reg,
            separator(),
            parse_reg,
            separator(),
            parse_i32,
            separator(),
            parse_i32,
            separator(),
            parse_i32,
            separator(),
            one_of("01"),
            tag(");"),
        )),
        |(_, target, _, source, _, dx, _, dy, _, scale, _, neg, _)| SimInstruction::Transform {
            target,
            source,
            dx,
            dy,
            scale,
            neg: neg == '1',
        },
    )(input)
}

fn binary(op: BinaryOp, target: String, lhs: &String, rhs: &String) -> SimInstruction {
    SimInstruction::Binary {
        op,
        target,
        lhs: lhs.clone(),
        rhs: rhs.clone(),
    }
}

fn unary(op: UnaryOp, target: String, source: &String) -> SimInstruction {
    SimInstruction::Unary {
        op,
        target,
        source: source.clone(),
    }
}

/// Parses the lines of an emitted program, skipping comments and anything
/// that is no instruction of the given dialect.
pub fn parse_program(program: &[String], dialect: Dialect) -> Vec<SimInstruction> {
    program
        .iter()
        .filter(|line| !line.starts_with("//"))
        .filter_map(|line| {
            let parsed = match dialect {
                Dialect::Apron => parse_apron_instruction(Span::new(line)),
                Dialect::Csim => parse_csim_instruction(Span::new(line)),
            };
            parsed.ok().map(|(_, instruction)| instruction)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apron_binary_and_unary_lines_parse() {
        let (_, instruction) = parse_apron_instruction(Span::new("B = add(A, C)")).unwrap();
        assert_eq!(
            instruction,
            SimInstruction::Binary {
                op: BinaryOp::Add,
                target: "B".to_string(),
                lhs: "A".to_string(),
                rhs: "C".to_string(),
            }
        );

        let (_, instruction) = parse_apron_instruction(Span::new("B = north(B)")).unwrap();
        assert_eq!(
            instruction,
            SimInstruction::Unary {
                op: UnaryOp::North,
                target: "B".to_string(),
                source: "B".to_string(),
            }
        );

        assert!(parse_apron_instruction(Span::new("B = frobnicate(A)")).is_err());
    }

    #[test]
    fn csim_transform_lines_parse_with_signs() {
        let (_, instruction) =
            parse_csim_instruction(Span::new("_transform(B, A, -2, 1, 0, 1);")).unwrap();
        assert_eq!(
            instruction,
            SimInstruction::Transform {
                target: "B".to_string(),
                source: "A".to_string(),
                dx: -2,
                dy: 1,
                scale: 0,
                neg: true,
            }
        );
    }

    #[test]
    fn comments_and_banners_are_skipped() {
        let program = vec![
            "// ----------------------------------------------------".to_string(),
            "// east(B, A);".to_string(),
            "mov(B, A);".to_string(),
            "add(C, A, B);".to_string(),
        ];
        let instructions = parse_program(&program, Dialect::Csim);
        assert_eq!(instructions.len(), 2);
        assert!(matches!(
            instructions[0],
            SimInstruction::Unary {
                op: UnaryOp::Copy,
                ..
            }
        ));
    }
}

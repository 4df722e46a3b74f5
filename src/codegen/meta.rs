use smallvec::SmallVec;
use std::fmt;

/// A virtual register id, handed out monotonically by the meta-programmer
/// and collapsed to a physical register by the allocator.
pub type VirtReg = usize;

/// An abstract instruction over virtual registers. A move copies a register
/// while applying a transform: `scale` doublings (negative) or halvings
/// (positive), `shift` east/north steps (negative west/south), and an
/// optional final negation. An add sums two registers with either side
/// optionally pre-negated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaInstruction {
    Move {
        source: VirtReg,
        target: VirtReg,
        scale: i32,
        shift: (i32, i32),
        neg: bool,
    },
    Add {
        source1: VirtReg,
        source2: VirtReg,
        s1neg: bool,
        s2neg: bool,
        target: VirtReg,
    },
}

impl MetaInstruction {
    pub fn move_to(source: VirtReg, target: VirtReg, scale: i32, shift: (i32, i32)) -> Self {
        Self::Move {
            source,
            target,
            scale,
            shift,
            neg: false,
        }
    }

    /// Number of primitive array instructions this instruction expands to.
    pub fn cost(&self) -> usize {
        match self {
            Self::Move {
                scale, shift, neg, ..
            } => {
                (scale.unsigned_abs() + shift.0.unsigned_abs() + shift.1.unsigned_abs()) as usize
                    + usize::from(*neg)
            }
            Self::Add { .. } => 1,
        }
    }

    pub fn target(&self) -> VirtReg {
        match self {
            Self::Move { target, .. } => *target,
            Self::Add { target, .. } => *target,
        }
    }

    pub fn set_target(&mut self, reg: VirtReg) {
        match self {
            Self::Move { target, .. } => *target = reg,
            Self::Add { target, .. } => *target = reg,
        }
    }

    /// The first (for adds: left) source register.
    pub fn primary_source(&self) -> VirtReg {
        match self {
            Self::Move { source, .. } => *source,
            Self::Add { source1, .. } => *source1,
        }
    }

    pub fn source_regs(&self) -> SmallVec<[VirtReg; 2]> {
        match self {
            Self::Move { source, .. } => SmallVec::from_slice(&[*source]),
            Self::Add {
                source1, source2, ..
            } => SmallVec::from_slice(&[*source1, *source2]),
        }
    }

    /// True for a move with no transform at all.
    pub fn is_identity_move(&self) -> bool {
        matches!(
            self,
            Self::Move {
                scale: 0,
                shift: (0, 0),
                neg: false,
                ..
            }
        )
    }
}

impl fmt::Display for MetaInstruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Move {
                source,
                target,
                scale,
                shift,
                neg,
            } => {
                write!(
                    f,
                    "m [{source}]->[{target}] || x:{} y:{} s:{scale}{}",
                    shift.0,
                    shift.1,
                    if *neg { " !" } else { "" }
                )
            }
            Self::Add {
                source1,
                source2,
                s1neg,
                s2neg,
                target,
            } => {
                let (a, b, op) = if *s1neg {
                    (source2, source1, '-')
                } else if *s2neg {
                    (source1, source2, '-')
                } else {
                    (source1, source2, '+')
                };
                write!(f, "+ [{a}]{op}[{b}]->[{target}]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_cost_counts_every_primitive_step() {
        let mv = MetaInstruction::Move {
            source: 0,
            target: 1,
            scale: -2,
            shift: (3, -1),
            neg: true,
        };
        assert_eq!(mv.cost(), 7);
        assert_eq!(MetaInstruction::move_to(0, 1, 0, (0, 0)).cost(), 0);
    }

    #[test]
    fn identity_move_detection() {
        assert!(MetaInstruction::move_to(0, 1, 0, (0, 0)).is_identity_move());
        assert!(!MetaInstruction::move_to(0, 1, 1, (0, 0)).is_identity_move());
        let negated = MetaInstruction::Move {
            source: 0,
            target: 1,
            scale: 0,
            shift: (0, 0),
            neg: true,
        };
        assert!(!negated.is_identity_move());
    }
}

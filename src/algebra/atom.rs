use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The observable effect of an atom: its coordinates and polarity, with the
/// unit id erased. Atoms are grouped by position key whenever only their
/// combined contribution matters.
pub type PosKey = (i32, i32, bool);

/// One unit share contributing to the convolution at `(x, y)`. Every atom
/// carries a globally unique id `nr`; two atoms are equal iff `(nr, x, y)`
/// match. Polarity is deliberately excluded from identity so that flipping
/// the sign of an atom does not mint a new one.
#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct Atom {
    pub nr: u64,
    pub x: i32,
    pub y: i32,
    pub neg: bool,
}

impl Atom {
    pub fn new(nr: u64, x: i32, y: i32, neg: bool) -> Self {
        Self { nr, x, y, neg }
    }

    /// The position key of this atom.
    #[inline(always)]
    pub fn val(&self) -> PosKey {
        (self.x, self.y, self.neg)
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.nr == other.nr && self.x == other.x && self.y == other.y
    }
}

impl Eq for Atom {}

impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.nr, self.x, self.y).hash(state);
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}([{}] {} {})",
            if self.neg { "-" } else { "" },
            self.nr,
            self.x,
            self.y
        )
    }
}

/// A goal is a finite set of atoms.
pub type Goal = HashSet<Atom>;

pub const TYPICAL_NUM_REGS: usize = 4;

/// An ordered list of disjoint goals, one per live intermediate register.
pub type MultiGoal = SmallVec<[Goal; TYPICAL_NUM_REGS]>;

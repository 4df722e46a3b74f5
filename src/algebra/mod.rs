mod atom;
mod item;
mod translate;

pub use atom::{Atom, Goal, MultiGoal, PosKey, TYPICAL_NUM_REGS};
pub use item::Item;
pub use translate::{distinct_positions, get_scales, translate_back_set, translate_goal};

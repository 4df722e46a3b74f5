//! Translation between the item and atom views of a goal. Items are the
//! dyadic coefficients of the approximated filter; atoms are the unit shares
//! the planner reasons about. An item of scale `s` expands to `2^(g - s)`
//! atoms, where `g` is the global scale of the goal.

use crate::algebra::{Atom, Goal, Item, PosKey};
use std::collections::{HashMap, HashSet};

/// Returns the item scales whose unit-share counts sum to `count` under the
/// global scale `g`: bit `i` of `count` maps to scale `g - i`.
pub fn get_scales(count: u64, g: i32) -> Vec<i32> {
    let mut scales = vec![];
    let mut acc = count;
    let mut scale = g;
    while acc > 0 {
        if acc & 1 == 1 {
            scales.push(scale);
        }
        acc >>= 1;
        scale -= 1;
    }
    scales
}

/// Expands every item into its unit-share atoms, minting fresh ids from
/// `nr_offset`. Returns the atom goal and the next free id.
pub fn translate_goal(igoal: &[Item], g: i32, nr_offset: u64) -> (Goal, u64) {
    let mut agoal = Goal::new();
    let mut nr = nr_offset;
    for item in igoal {
        let n_atoms = 1u64 << (g - item.scale);
        for _ in 0..n_atoms {
            agoal.insert(Atom::new(nr, item.x, item.y, item.neg));
            nr += 1;
        }
    }
    (agoal, nr)
}

/// Collapses an atom goal back into items: group by position key, count, and
/// expand every count through [`get_scales`]. Unit ids are lost, so this is
/// an inverse of [`translate_goal`] only up to the bit pattern of the counts.
pub fn translate_back_set(goal: &Goal, g: i32) -> HashSet<Item> {
    let mut counts: HashMap<PosKey, u64> = HashMap::new();
    for atom in goal {
        *counts.entry(atom.val()).or_insert(0) += 1;
    }

    let mut items = HashSet::new();
    for ((x, y, neg), count) in counts {
        for scale in get_scales(count, g) {
            items.insert(Item::new(scale, x, y, neg));
        }
    }
    items
}

/// The number of distinct position keys among the given atoms.
pub fn distinct_positions<'a>(atoms: impl IntoIterator<Item = &'a Atom>) -> usize {
    let keys: HashSet<PosKey> = atoms.into_iter().map(Atom::val).collect();
    keys.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_follow_the_set_bits() {
        assert_eq!(get_scales(0, 3), Vec::<i32>::new());
        assert_eq!(get_scales(1, 3), vec![3]);
        assert_eq!(get_scales(0b101, 3), vec![3, 1]);
        assert_eq!(get_scales(0b110, 2), vec![1, 0]);
    }

    #[test]
    fn item_expands_to_a_power_of_two_of_atoms() {
        let igoal = vec![Item::positive(0, 1, -1)];
        let (agoal, next) = translate_goal(&igoal, 3, 0);
        assert_eq!(agoal.len(), 8);
        assert_eq!(next, 8);
        assert!(agoal.iter().all(|a| a.val() == (1, -1, false)));
    }

    #[test]
    fn translation_round_trips() {
        let igoal = vec![
            Item::positive(0, 0, 0),
            Item::positive(2, 0, 0),
            Item::new(1, -1, 2, true),
        ];
        let (agoal, _) = translate_goal(&igoal, 2, 0);
        // 4 + 1 + 2 atoms in total.
        assert_eq!(agoal.len(), 7);

        let round_tripped = translate_back_set(&agoal, 2);
        let expected: HashSet<Item> = igoal.into_iter().collect();
        assert_eq!(round_tripped, expected);
    }

    #[test]
    fn distinct_positions_ignores_ids() {
        let atoms = vec![
            Atom::new(0, 0, 0, false),
            Atom::new(1, 0, 0, false),
            Atom::new(2, 0, 0, true),
            Atom::new(3, 1, 0, false),
        ];
        assert_eq!(distinct_positions(&atoms), 3);
    }
}

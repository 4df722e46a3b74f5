use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Neg;

/// A signed dyadic fraction placed at an offset from the filter centre. An
/// [`Item`] of scale `s` has value `(-1)^neg * 2^(-s)` at `(x, y)`, so a
/// positive scale denotes a fractional coefficient. Items of equal
/// coordinates and polarity but different scale coexist in a pre-goal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub scale: i32,
    pub x: i32,
    pub y: i32,
    pub neg: bool,
}

impl Item {
    pub fn new(scale: i32, x: i32, y: i32, neg: bool) -> Self {
        Self { scale, x, y, neg }
    }

    pub fn positive(scale: i32, x: i32, y: i32) -> Self {
        Self::new(scale, x, y, false)
    }

    /// The real value this item contributes at its position.
    pub fn value(&self) -> f64 {
        let magnitude = 2f64.powi(-self.scale);
        if self.neg {
            -magnitude
        } else {
            magnitude
        }
    }
}

impl Neg for Item {
    type Output = Item;

    fn neg(self) -> Item {
        Item::new(self.scale, self.x, self.y, !self.neg)
    }
}

impl Ord for Item {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.scale, self.x, self.y, self.neg).cmp(&(other.scale, other.x, other.y, other.neg))
    }
}

impl PartialOrd for Item {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}({} {} {})",
            if self.neg { "-" } else { "" },
            self.scale,
            self.x,
            self.y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negation_flips_polarity_only() {
        let item = Item::positive(1, 2, -3);
        let negated = -item;
        assert_eq!(negated, Item::new(1, 2, -3, true));
        assert_eq!(-negated, item);
    }

    #[test]
    fn order_is_scale_then_x_then_y() {
        let mut items = vec![
            Item::positive(1, 0, 0),
            Item::positive(0, 1, 0),
            Item::positive(0, 0, 2),
            Item::positive(0, 0, 1),
        ];
        items.sort();
        assert_eq!(
            items,
            vec![
                Item::positive(0, 0, 1),
                Item::positive(0, 0, 2),
                Item::positive(0, 1, 0),
                Item::positive(1, 0, 0),
            ]
        );
    }

    #[test]
    fn value_accounts_for_scale_and_sign() {
        assert_eq!(Item::positive(0, 0, 0).value(), 1.0);
        assert_eq!(Item::positive(1, 0, 0).value(), 0.5);
        assert_eq!(Item::new(-1, 0, 0, true).value(), -2.0);
    }
}

//! Greedy signed-binary approximation of filter coefficients. Every
//! coefficient becomes a short signed sum of powers of two; the items of the
//! resulting pre-goal carry `scale = -log2(term)` so that positive scales
//! denote fractional terms.

use crate::algebra::Item;
use ndarray::Array2;

/// One term of an approximation, with weight `(-1)^negative * 2^exp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DyadicTerm {
    pub exp: i32,
    pub negative: bool,
}

impl DyadicTerm {
    pub fn value(&self) -> f64 {
        let magnitude = 2f64.powi(self.exp);
        if self.negative {
            -magnitude
        } else {
            magnitude
        }
    }
}

/// Approximates `target` by a signed sum of powers of two. The candidate
/// coefficient starts at `2^8` and halves once per iteration for `depth + 8`
/// iterations, so terms down to `2^-depth` are considered. A term is
/// committed only when the remaining error exceeds three quarters of the
/// current coefficient; below that, the finer terms still to come can close
/// the gap alone. (A `1/2 * c` threshold circulates in older builds of this
/// expansion; it overcommits near the midpoints.)
///
/// Stops early on an exact hit, or once `max_coeff` terms were emitted.
/// Returns the achieved total and the committed terms.
pub fn approx(target: f64, depth: u32, max_coeff: Option<usize>) -> (f64, Vec<DyadicTerm>) {
    let mut terms = vec![];
    let mut total = 0.0;
    let mut current = 256f64;
    let mut exp = 8i32;

    for _ in 0..depth + 8 {
        if total == target {
            break;
        }

        if (total - target).abs() > 0.75 * current {
            // Pick the direction that lands closer to the target.
            if ((total - current) - target).abs() > ((total + current) - target).abs() {
                terms.push(DyadicTerm {
                    exp,
                    negative: false,
                });
                total += current;
            } else {
                terms.push(DyadicTerm {
                    exp,
                    negative: true,
                });
                total -= current;
            }
        }
        current /= 2.0;
        exp -= 1;

        if let Some(max_coeff) = max_coeff {
            if terms.len() >= max_coeff {
                break;
            }
        }
    }

    (total, terms)
}

/// Approximates every coefficient of `filter` and assembles the pre-goal: one
/// item per committed term, positioned relative to the filter centre (x grows
/// east, y grows north). Coefficients that approximate to nothing contribute
/// no items. Also returns the effectively realised filter.
pub fn approx_filter(
    filter: &Array2<f64>,
    depth: u32,
    max_coeff: Option<usize>,
) -> (Vec<Item>, Array2<f64>) {
    let (h, w) = filter.dim();
    let mut approximated = Array2::zeros(filter.raw_dim());
    let mut pre_goal = vec![];

    for ((y, x), &value) in filter.indexed_iter() {
        let (total, terms) = approx(value, depth, max_coeff);
        approximated[(y, x)] = total;
        let item_x = x as i32 - w as i32 / 2;
        let item_y = h as i32 / 2 - y as i32;
        pre_goal.extend(
            terms
                .iter()
                .map(|term| Item::new(-term.exp, item_x, item_y, term.negative)),
        );
    }

    (pre_goal, approximated)
}

/// Reconstructs the effective filter realised by a pre-goal. Diagnostic
/// inverse of [`approx_filter`].
pub fn filter_from_pre_goal(pre_goal: &[Item]) -> Array2<f64> {
    assert!(!pre_goal.is_empty(), "pre-goal must not be empty");
    let min_x = pre_goal.iter().map(|i| i.x).min().unwrap();
    let max_x = pre_goal.iter().map(|i| i.x).max().unwrap();
    let min_y = pre_goal.iter().map(|i| i.y).min().unwrap();
    let max_y = pre_goal.iter().map(|i| i.y).max().unwrap();

    let width = (max_x - min_x + 1) as usize;
    let height = (max_y - min_y + 1) as usize;

    let mut filter = Array2::zeros((height, width));
    for item in pre_goal {
        let row = height - 1 - (item.y - min_y) as usize;
        let col = (item.x - min_x) as usize;
        filter[(row, col)] += item.value();
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::array;

    #[test]
    fn exact_dyadic_targets_terminate_early() {
        let (total, terms) = approx(0.5, 5, None);
        assert_eq!(total, 0.5);
        assert_eq!(
            terms,
            vec![DyadicTerm {
                exp: -1,
                negative: false
            }]
        );
    }

    #[test]
    fn zero_target_emits_no_terms() {
        let (total, terms) = approx(0.0, 5, Some(1));
        assert_eq!(total, 0.0);
        assert!(terms.is_empty());
    }

    #[test]
    fn error_is_bounded_by_the_depth() {
        for &target in &[0.342, 0.851, -0.455, 1.731, 0.1] {
            for depth in 0..8 {
                let (total, terms) = approx(target, depth, None);
                let bound = 2f64.powi(-(depth as i32) + 1);
                assert!(
                    (total - target).abs() <= bound,
                    "approx({target}, {depth}) missed by {}",
                    (total - target).abs()
                );
                let reconstructed: f64 = terms.iter().map(DyadicTerm::value).sum();
                assert_approx_eq!(reconstructed, total);
            }
        }
    }

    #[test]
    fn max_coeff_caps_the_expansion() {
        let (_, terms) = approx(0.342, 20, Some(1));
        assert_eq!(terms.len(), 1);
    }

    #[test]
    fn filter_items_are_centred() {
        let filter = array![[1.0, 0.0, -1.0], [2.0, 0.0, -2.0], [1.0, 0.0, -1.0]];
        let (pre_goal, approximated) = approx_filter(&filter, 4, None);
        assert_eq!(approximated, filter);

        assert!(pre_goal.contains(&Item::positive(0, -1, 1)));
        assert!(pre_goal.contains(&Item::new(0, 1, 1, true)));
        // The centre-row coefficient of 2 is a single scale -1 item.
        assert!(pre_goal.contains(&Item::positive(-1, -1, 0)));
        assert_eq!(pre_goal.len(), 6);
    }

    #[test]
    fn pre_goal_reconstructs_the_filter() {
        let filter = array![[0.5, 0.25], [1.0, -0.75]];
        let (pre_goal, approximated) = approx_filter(&filter, 6, None);
        let reconstructed = filter_from_pre_goal(&pre_goal);
        assert_eq!(reconstructed, approximated);
    }
}

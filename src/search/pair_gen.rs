//! Enumeration of candidate pair decompositions. A pair `(up, down)` is two
//! atom sets related by one shared shift/scale/negation; the planner replaces
//! the `up` portion of its goals by `down` and pays the cost of the shared
//! transform. Pairs are found by grouping atom-to-atom distances, clustering
//! each group by position-key endpoints, and allocating disjoint slices of
//! the clusters to elementary moves.

use crate::algebra::{distinct_positions, Atom, Goal, MultiGoal, PosKey};
use crate::search::{Cost, CostModel, PairGenProps};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// A candidate pair decomposition, in search orientation: `up` is removed
/// from the current goals, `down` is what remains to be produced.
#[derive(Debug, Clone)]
pub struct CandidatePair {
    pub up: Goal,
    pub down: Goal,
}

/// Distance between two atoms: offset plus polarity flip.
type Distance = (i32, i32, bool);

/// An elementary move between two position-key clusters: consume `n_sources`
/// of the available source ids and generate `n_targets` of the target ids.
/// Both counts are powers of two.
#[derive(Debug, Clone)]
struct ElemMove {
    sources: Vec<u64>,
    targets: Vec<u64>,
    n_sources: usize,
    n_targets: usize,
    mv: (PosKey, PosKey),
}

/// One elementary move with its slots filled in.
#[derive(Debug, Clone)]
struct AllocatedMove {
    up_key: PosKey,
    down_key: PosKey,
    sources: Vec<u64>,
    targets: Vec<u64>,
}

type Allocation = Vec<AllocatedMove>;

/// Collects atom-to-atom distances for every ordered goal combination and
/// groups them. Grouping stays within one goal combination, so a pair never
/// mixes source atoms of several goals. Within a combination, groups are
/// visited in lexicographic distance order, or by ascending L1 distance when
/// `short_distance_first` is set.
fn distance_groups(goals: &MultiGoal, props: &PairGenProps) -> Vec<(Distance, Vec<(Atom, Atom)>)> {
    let mut ordered = vec![];
    for i in 0..goals.len() {
        for j in i..goals.len() {
            let mut groups: BTreeMap<Distance, Vec<(Atom, Atom)>> = BTreeMap::new();
            for a in &goals[i] {
                for b in &goals[j] {
                    let dist = (a.x - b.x, a.y - b.y, a.neg != b.neg);
                    groups.entry(dist).or_default().push((*a, *b));
                }
            }

            let mut block: Vec<_> = groups.into_iter().collect();
            if props.short_distance_first {
                block.sort_by_key(|(dist, _)| dist.0.abs() + dist.1.abs());
            }
            ordered.extend(block);
        }
    }
    ordered
}

/// Forms the clusters of a distance group and emits every elementary move
/// with power-of-two source and target counts, except the trivial
/// self-identity move.
fn elementary_moves(group: &[(Atom, Atom)]) -> Vec<ElemMove> {
    let mut clusters: BTreeMap<(PosKey, PosKey), (BTreeSet<u64>, BTreeSet<u64>)> = BTreeMap::new();
    for (a, b) in group {
        let cluster = clusters.entry((a.val(), b.val())).or_default();
        cluster.0.insert(a.nr);
        cluster.1.insert(b.nr);
    }

    let mut emoves = vec![];
    for (mv, (sources, targets)) in clusters {
        let sources: Vec<u64> = sources.into_iter().collect();
        let targets: Vec<u64> = targets.into_iter().collect();
        for ls in 0..=sources.len().ilog2() {
            for lt in 0..=targets.len().ilog2() {
                if ls != lt || sources != targets {
                    emoves.push(ElemMove {
                        sources: sources.clone(),
                        targets: targets.clone(),
                        n_sources: 1 << ls,
                        n_targets: 1 << lt,
                        mv,
                    });
                }
            }
        }
    }
    emoves
}

fn unused(ids: &[u64], used: &HashSet<u64>) -> Vec<u64> {
    ids.iter().copied().filter(|nr| !used.contains(nr)).collect()
}

fn take_slots(emove: &ElemMove, used: &HashSet<u64>) -> Option<AllocatedMove> {
    let source_candidates = unused(&emove.sources, used);
    let target_candidates = unused(&emove.targets, used);
    if source_candidates.len() < emove.n_sources || target_candidates.len() < emove.n_targets {
        return None;
    }
    Some(AllocatedMove {
        up_key: emove.mv.0,
        down_key: emove.mv.1,
        sources: source_candidates[..emove.n_sources].to_vec(),
        targets: target_candidates[..emove.n_targets].to_vec(),
    })
}

/// Greedy allocation that slices the clusters along compact lines: moves are
/// ordered along the axis the transform does not travel, largest slices
/// first, and every move that still has free slots is taken.
fn allocate_line(mut emoves: Vec<ElemMove>) -> Allocation {
    let (s_pos, t_pos) = emoves[0].mv;
    let x_mov = s_pos.0 - t_pos.0;
    // Purely vertical movement prefers slices within a row, otherwise
    // within a column.
    if x_mov == 0 {
        emoves.sort_by_key(|e| (e.mv.0 .1, e.mv.0 .0, std::cmp::Reverse(e.n_sources)));
    } else {
        emoves.sort_by_key(|e| (e.mv.0 .0, e.mv.0 .1, std::cmp::Reverse(e.n_sources)));
    }

    let mut used: HashSet<u64> = HashSet::new();
    let mut allocation = vec![];
    for emove in &emoves {
        if let Some(taken) = take_slots(emove, &used) {
            used.extend(taken.sources.iter().copied());
            used.extend(taken.targets.iter().copied());
            allocation.push(taken);
        }
    }
    allocation
}

/// Exhaustive allocation: every subset of the elementary moves that can be
/// filled from disjoint slots becomes an allocation. With `max_sets`, a
/// subset may only end at a move that takes all of its remaining slots. The
/// recursion bottom yields nothing, so the empty allocation is never
/// produced.
fn allocate_exhaustive(
    emoves: &[ElemMove],
    pos: usize,
    used: &HashSet<u64>,
    max_sets: bool,
    out: &mut Vec<Allocation>,
) {
    if pos >= emoves.len() {
        return;
    }
    let emove = &emoves[pos];

    // Without this move.
    allocate_exhaustive(emoves, pos + 1, used, max_sets, out);

    // With this move, if its slots can still be filled.
    let source_candidates = unused(&emove.sources, used);
    let target_candidates = unused(&emove.targets, used);
    if let Some(taken) = take_slots(emove, used) {
        let mut deeper_used = used.clone();
        deeper_used.extend(taken.sources.iter().copied());
        deeper_used.extend(taken.targets.iter().copied());

        let mut deeper = vec![];
        allocate_exhaustive(emoves, pos + 1, &deeper_used, max_sets, &mut deeper);
        for mut allocation in deeper {
            allocation.insert(0, taken.clone());
            out.push(allocation);
        }

        let takes_all = taken.sources.len() == source_candidates.len()
            && taken.targets.len() == target_candidates.len();
        if takes_all || !max_sets {
            out.push(vec![taken]);
        }
    }
}

/// Groups the elementary moves of one distance group by ratio and produces
/// the allocations of every ratio, in the configured ratio order. Ratios
/// below one are skipped; they are redundant by symmetry of the search.
fn ratio_allocations(emoves: Vec<ElemMove>, props: &PairGenProps) -> Vec<Allocation> {
    let mut by_ratio: BTreeMap<i32, Vec<ElemMove>> = BTreeMap::new();
    for emove in emoves {
        let ratio_log2 = emove.n_sources.ilog2() as i32 - emove.n_targets.ilog2() as i32;
        by_ratio.entry(ratio_log2).or_default().push(emove);
    }

    let mut ratios: Vec<i32> = by_ratio.keys().copied().collect();
    if props.low_scale_first {
        ratios.sort_by_key(|ratio_log2| ratio_log2.abs());
    }

    let mut allocations = vec![];
    for ratio_log2 in ratios {
        if ratio_log2 < 0 {
            continue;
        }
        let group = &by_ratio[&ratio_log2];
        if props.line || !props.exhaustive {
            allocations.push(allocate_line(group.clone()));
        }
        if props.exhaustive {
            allocate_exhaustive(group, 0, &HashSet::new(), props.max_sets, &mut allocations);
        }
    }
    allocations
}

fn materialize(allocation: &Allocation) -> CandidatePair {
    let mut up = Goal::new();
    let mut down = Goal::new();
    for mv in allocation {
        let (ux, uy, uneg) = mv.up_key;
        let (dx, dy, dneg) = mv.down_key;
        up.extend(mv.sources.iter().map(|&nr| Atom::new(nr, ux, uy, uneg)));
        down.extend(mv.targets.iter().map(|&nr| Atom::new(nr, dx, dy, dneg)));
    }
    CandidatePair { up, down }
}

/// Heuristic cost of realising a pair: one add, the shift distance, a
/// negation when the transform is a pure polarity flip, and the scaling
/// steps dictated by the cardinality ratio.
fn pair_cost(dist: Distance, pair: &CandidatePair, costs: &CostModel) -> Cost {
    let base = f64::from(costs.add)
        + (dist.0.abs() + dist.1.abs()) as f64 * f64::from(costs.shift)
        + if dist.0 == 0 && dist.1 == 0 && dist.2 {
            f64::from(costs.neg)
        } else {
            0.0
        };

    debug_assert!(!pair.up.is_empty() && !pair.down.is_empty());
    let n_up = pair.up.len() as f64;
    let n_down = pair.down.len() as f64;
    let scale_cost = if n_up > n_down {
        (n_up / n_down).log2() * f64::from(costs.double)
    } else {
        (n_down / n_up).log2() * f64::from(costs.div)
    };

    Cost::from(base + scale_cost)
}

/// Lazy pair enumeration. Distance groups are expanded on demand; within a
/// group the allocations of one distance are buffered.
#[derive(Debug)]
pub struct PairStream<'a> {
    props: &'a PairGenProps,
    costs: &'a CostModel,
    groups: VecDeque<(Distance, Vec<(Atom, Atom)>)>,
    buffered: VecDeque<(Cost, CandidatePair)>,
}

impl Iterator for PairStream<'_> {
    type Item = (Cost, CandidatePair);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pair) = self.buffered.pop_front() {
                return Some(pair);
            }
            let (dist, group) = self.groups.pop_front()?;
            let emoves = elementary_moves(&group);
            for allocation in ratio_allocations(emoves, self.props) {
                if allocation.is_empty() {
                    continue;
                }
                let pair = materialize(&allocation);
                let cost = pair_cost(dist, &pair, self.costs);
                self.buffered.push_back((cost, pair));
            }
        }
    }
}

/// Streams the pairs applicable to the given goals.
pub fn pair_stream<'a>(
    goals: &MultiGoal,
    props: &'a PairGenProps,
    costs: &'a CostModel,
) -> PairStream<'a> {
    PairStream {
        props,
        costs,
        groups: distance_groups(goals, props).into(),
        buffered: VecDeque::new(),
    }
}

/// Materializes all pairs applicable to the given goals. When
/// `sort_distinct_pos` is set, pairs leaving fewer distinct residual
/// positions come first.
pub fn generate_pairs(
    goals: &MultiGoal,
    props: &PairGenProps,
    costs: &CostModel,
) -> Vec<(Cost, CandidatePair)> {
    let mut pairs: Vec<_> = pair_stream(goals, props, costs).collect();
    if props.sort_distinct_pos {
        let union: Goal = goals.iter().flatten().copied().collect();
        pairs.sort_by_key(|(_, pair)| {
            let residual = union.iter().filter(|a| !pair.up.contains(*a));
            distinct_positions(residual.chain(pair.down.iter()))
        });
    }
    pairs
}

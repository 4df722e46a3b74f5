//! Register allocation for the meta-program: liveness analysis, an
//! interference graph, and a backtracking colouring. Interference graphs
//! here have tens of nodes at most, so the backtracking search needs no
//! budget of its own.

use crate::codegen::{CodegenError, MetaInstruction, VirtReg};
use petgraph::graph::{Graph, NodeIndex};
use petgraph::Undirected;
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub type InterferenceGraph = Graph<VirtReg, (), Undirected, u32>;

/// The set of live registers at every instruction. A register is live from
/// its first definition up to (excluding) its last use; register 0 holds the
/// input and is live from the start.
pub fn get_liveness(meta_program: &[MetaInstruction]) -> Vec<HashSet<VirtReg>> {
    let mut first_def: HashMap<VirtReg, usize> = HashMap::from([(0, 0)]);
    let mut last_use: HashMap<VirtReg, usize> = HashMap::new();

    for (i, instr) in meta_program.iter().enumerate() {
        let target = instr.target();
        if !first_def.contains_key(&target) {
            first_def.insert(target, i);
            last_use.insert(target, i);
        }
        for source in instr.source_regs() {
            last_use.insert(source, i);
        }
    }

    let mut liveness = vec![HashSet::new(); meta_program.len()];
    for (&reg, &low) in &first_def {
        let high = last_use.get(&reg).copied().unwrap_or(low);
        for live_set in &mut liveness[low..high] {
            live_set.insert(reg);
        }
    }
    liveness
}

/// Builds the undirected interference graph: two registers interfere iff
/// they co-appear in some live set.
fn build_graph(liveness: &[HashSet<VirtReg>]) -> (InterferenceGraph, HashMap<VirtReg, NodeIndex>) {
    let mut graph = InterferenceGraph::default();
    let mut nodes: HashMap<VirtReg, NodeIndex> = HashMap::new();

    for live_set in liveness {
        for &reg in live_set {
            nodes
                .entry(reg)
                .or_insert_with(|| graph.add_node(reg));
        }
        for &a in live_set {
            for &b in live_set {
                if a < b {
                    graph.update_edge(nodes[&a], nodes[&b], ());
                }
            }
        }
    }
    (graph, nodes)
}

fn color_node(
    graph: &InterferenceGraph,
    node: NodeIndex,
    colors: &mut HashMap<NodeIndex, usize>,
    n_colors: usize,
) -> bool {
    'colors: for color in 0..n_colors {
        for neighbor in graph.neighbors(node) {
            if colors.get(&neighbor) == Some(&color) {
                continue 'colors;
            }
        }
        colors.insert(node, color);
        let mut all_colored = true;
        for neighbor in graph.neighbors(node) {
            if colors.contains_key(&neighbor) {
                continue;
            }
            if !color_node(graph, neighbor, colors, n_colors) {
                all_colored = false;
                break;
            }
        }
        if all_colored {
            return true;
        }
    }
    colors.remove(&node);
    false
}

/// Backtracking graph colouring. Disjoint components are coloured one after
/// another from any still-uncoloured node.
fn color_graph(graph: &InterferenceGraph, n_colors: usize) -> Option<HashMap<NodeIndex, usize>> {
    let mut colors = HashMap::new();
    while colors.len() < graph.node_count() {
        let start = graph
            .node_indices()
            .find(|node| !colors.contains_key(node))
            .expect("an uncoloured node exists");
        if !color_node(graph, start, &mut colors, n_colors) {
            return None;
        }
    }
    Some(colors)
}

/// Maps every virtual register of the meta-program to one of `n_colors`
/// physical register slots. Registers that never interfere collapse onto
/// slot 0. Fails with the minimum simultaneous liveness when that exceeds
/// the available slots or no colouring exists.
pub fn alloc(
    mut meta_program: Vec<MetaInstruction>,
    n_colors: usize,
) -> Result<Vec<MetaInstruction>, CodegenError> {
    let liveness = get_liveness(&meta_program);
    let required = liveness.iter().map(HashSet::len).max().unwrap_or(0);
    debug!(required, n_colors, "allocating registers");
    if n_colors < required {
        return Err(CodegenError::RegisterPressure { required });
    }

    let (graph, nodes) = build_graph(&liveness);
    let colors =
        color_graph(&graph, n_colors).ok_or(CodegenError::RegisterPressure { required })?;

    let color_of = |reg: VirtReg| -> VirtReg {
        nodes
            .get(&reg)
            .and_then(|node| colors.get(node))
            .copied()
            .unwrap_or(0)
    };

    for instr in &mut meta_program {
        match instr {
            MetaInstruction::Move { source, target, .. } => {
                *source = color_of(*source);
                *target = color_of(*target);
            }
            MetaInstruction::Add {
                source1,
                source2,
                target,
                ..
            } => {
                *source1 = color_of(*source1);
                *source2 = color_of(*source2);
                *target = color_of(*target);
            }
        }
    }
    Ok(meta_program)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(source1: VirtReg, source2: VirtReg, target: VirtReg) -> MetaInstruction {
        MetaInstruction::Add {
            source1,
            source2,
            s1neg: false,
            s2neg: false,
            target,
        }
    }

    #[test]
    fn liveness_spans_first_def_to_last_use() {
        let meta = vec![
            MetaInstruction::move_to(0, 1, 0, (1, 0)),
            MetaInstruction::move_to(1, 2, 0, (0, 1)),
            add(0, 2, 3),
        ];
        let liveness = get_liveness(&meta);
        assert_eq!(liveness.len(), 3);
        // Register 0 is read by the last instruction, 1 only by the second.
        assert_eq!(liveness[0], HashSet::from([0, 1]));
        assert_eq!(liveness[1], HashSet::from([0, 2]));
        assert!(liveness[2].is_empty());
    }

    #[test]
    fn interfering_registers_get_distinct_colors() {
        let meta = vec![
            MetaInstruction::move_to(0, 1, 0, (1, 0)),
            MetaInstruction::move_to(1, 2, 0, (0, 1)),
            add(0, 2, 3),
        ];
        let allocated = alloc(meta, 3).unwrap();

        let liveness_regs: Vec<(VirtReg, VirtReg)> = allocated
            .iter()
            .map(|i| (i.primary_source(), i.target()))
            .collect();
        // The move chain reuses slots but never collides with a live value.
        assert_ne!(liveness_regs[0].0, liveness_regs[0].1);
        assert!(allocated
            .iter()
            .flat_map(|i| i.source_regs().into_iter().chain([i.target()]))
            .all(|reg| reg < 3));
    }

    #[test]
    fn four_way_interference_needs_four_registers() {
        // Registers 0 to 3 are all live across the middle of the program.
        let meta = vec![
            MetaInstruction::move_to(0, 1, 0, (1, 0)),
            MetaInstruction::move_to(0, 2, 0, (2, 0)),
            MetaInstruction::move_to(0, 3, 0, (3, 0)),
            add(1, 2, 4),
            add(0, 3, 5),
        ];
        assert_eq!(
            alloc(meta.clone(), 2),
            Err(CodegenError::RegisterPressure { required: 4 })
        );
        assert!(alloc(meta, 4).is_ok());
    }
}

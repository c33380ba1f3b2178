//! Dependency scheduler (spec §4.5): Kahn's algorithm with a stable,
//! name-ordered tie-break, grouping tables into FK-respecting levels.
//! Grounded on `topological_sort`/`group_tables_by_dependency_level` in
//! `mysql_migration/migrator.py`, reimplemented over a `petgraph` graph.

use migrate_core::FkEdgeSet;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet};

/// Output of [`schedule_levels`]: a permutation of the input table set,
/// partitioned into ordered levels such that every edge (child, parent) has
/// `level(parent) < level(child)`. `had_cycle` is set when the algorithm
/// could not make further progress and dumped the remainder into one final
/// sorted pseudo-level (spec §4.5, "Cycle handling").
#[derive(Debug, Clone)]
pub struct ScheduleResult {
    pub levels: Vec<Vec<String>>,
    pub had_cycle: bool,
}

impl ScheduleResult {
    pub fn total_len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Flattens levels in order into a single topological ordering.
    pub fn flatten(&self) -> Vec<String> {
        self.levels.iter().flatten().cloned().collect()
    }
}

struct Graph {
    graph: DiGraph<String, ()>,
    index_of: BTreeMap<String, NodeIndex>,
}

fn build_graph(tables: &[String], edges: &FkEdgeSet) -> Graph {
    let mut graph = DiGraph::new();
    let mut index_of = BTreeMap::new();
    let table_set: BTreeSet<&String> = tables.iter().collect();

    for table in tables {
        let idx = graph.add_node(table.clone());
        index_of.insert(table.clone(), idx);
    }

    for child in tables {
        for parent in edges.parents_of(child) {
            if !table_set.contains(parent) || parent == child {
                continue; // only edges whose parent is in the set; self-edges dropped
            }
            let parent_idx = index_of[parent];
            let child_idx = index_of[child];
            graph.add_edge(parent_idx, child_idx, ());
        }
    }

    Graph { graph, index_of }
}

/// Partitions `tables` into dependency levels. Never drops a table: the
/// caller always receives exactly `tables.len()` entries across all levels
/// (spec §4.5 invariant).
pub fn schedule_levels(tables: &[String], edges: &FkEdgeSet) -> ScheduleResult {
    let Graph { graph, index_of } = build_graph(tables, edges);

    let mut remaining: BTreeSet<NodeIndex> = index_of.values().copied().collect();
    let mut levels: Vec<Vec<String>> = Vec::new();
    let mut had_cycle = false;

    while !remaining.is_empty() {
        // A node is ready once every parent edge (within `remaining`) is gone.
        let mut ready: Vec<NodeIndex> = remaining
            .iter()
            .copied()
            .filter(|&node| {
                graph
                    .neighbors_directed(node, petgraph::Direction::Incoming)
                    .all(|parent| !remaining.contains(&parent))
            })
            .collect();

        if ready.is_empty() {
            // Cycle: no node has all its dependencies satisfied. Emit a
            // warning and dump the rest, sorted, as one final pseudo-level.
            had_cycle = true;
            tracing::warn!(
                remaining = remaining.len(),
                "dependency cycle detected; emitting remaining tables as one pseudo-level"
            );
            let mut rest: Vec<String> = remaining
                .iter()
                .map(|&idx| graph[idx].clone())
                .collect();
            rest.sort();
            levels.push(rest);
            break;
        }

        ready.sort_by_key(|&idx| graph[idx].clone());
        let level: Vec<String> = ready.iter().map(|&idx| graph[idx].clone()).collect();
        for idx in &ready {
            remaining.remove(idx);
        }
        levels.push(level);
    }

    ScheduleResult { levels, had_cycle }
}

/// Total ordering variant of [`schedule_levels`]: Kahn's algorithm with a
/// stable, name-ordered ready queue, flattened to one sequence (spec §4.5).
pub fn topological_sort(tables: &[String], edges: &FkEdgeSet) -> (Vec<String>, bool) {
    let result = schedule_levels(tables, edges);
    (result.flatten(), result.had_cycle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(pairs: &[(&str, &str)]) -> FkEdgeSet {
        let mut e = FkEdgeSet::new();
        for (child, parent) in pairs {
            e.add_edge(child, parent);
        }
        e
    }

    #[test]
    fn fk_ordering_three_levels() {
        let tables = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let e = edges(&[("B", "A"), ("C", "B")]);
        let result = schedule_levels(&tables, &e);
        assert!(!result.had_cycle);
        assert_eq!(result.levels, vec![vec!["A"], vec!["B"], vec!["C"]]);
    }

    #[test]
    fn acyclic_output_is_permutation_with_level_ordering() {
        let tables = vec!["orders".to_string(), "users".to_string(), "items".to_string()];
        let e = edges(&[("orders", "users"), ("orders", "items")]);
        let result = schedule_levels(&tables, &e);
        assert_eq!(result.total_len(), tables.len());
        let flat = result.flatten();
        let level_of = |name: &str| {
            result
                .levels
                .iter()
                .position(|lvl| lvl.iter().any(|t| t == name))
                .unwrap()
        };
        assert!(level_of("users") < level_of("orders"));
        assert!(level_of("items") < level_of("orders"));
        assert_eq!(flat.len(), tables.len());
    }

    #[test]
    fn cyclic_edges_still_emit_every_table() {
        let tables = vec!["A".to_string(), "B".to_string()];
        let e = edges(&[("A", "B"), ("B", "A")]);
        let result = schedule_levels(&tables, &e);
        assert!(result.had_cycle);
        assert_eq!(result.total_len(), 2);
    }

    #[test]
    fn self_edges_are_dropped() {
        let tables = vec!["A".to_string()];
        let e = edges(&[("A", "A")]);
        let result = schedule_levels(&tables, &e);
        assert!(!result.had_cycle);
        assert_eq!(result.levels, vec![vec!["A"]]);
    }
}

//! Dependency graph: nodes, edges, and the topological processing order
//! (spec §3 "Dependency node", §4.7 "Edges"/"Processing order").

use crate::scope::{FieldSource, ScopeId};
use snapsql_ast::{NodeId, TableRef};
use snapsql_errors::{ErrorKind, SnapSqlError};
use snapsql_helpers::IndexMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

/// A stable ID for a [`DependencyNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyId(pub u32);

impl std::fmt::Display for DependencyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dep#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub(crate) struct DependencyIdGen {
    next: AtomicU32,
}

impl DependencyIdGen {
    pub(crate) fn next(&self) -> DependencyId {
        DependencyId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which of the four scope-producing constructs a node corresponds to
/// (spec §4.7 "Construction").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "PascalCase")]
pub enum DependencyKind {
    Cte,
    FromSubquery,
    SelectSubquery,
    Main,
}

/// One node of the dependency graph: a distinct SQL scope plus everything
/// it consumes and exposes (spec §3 "Dependency node").
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub id: DependencyId,
    /// The statement-arena entry this node structures.
    pub statement: NodeId,
    pub kind: DependencyKind,
    /// The CTE name or FROM-subquery alias; `None` for Main/SelectSubquery.
    pub name: Option<String>,
    /// Nodes whose results this one consumes, in reference order.
    pub depends_on: Vec<DependencyId>,
    /// The field sources this node exposes to whatever depends on it. For
    /// CTE/FromSubquery nodes these are wrapped as source-kind Subquery
    /// pointing back at `id` (spec §4.7 "Construction"); for Main/
    /// SelectSubquery they keep their natural kind since nothing resolves
    /// fields against them by name.
    pub produces: Vec<FieldSource>,
    pub table_refs: Vec<TableRef>,
    pub scope: ScopeId,
}

/// The full dependency graph built for one top-level statement (spec §4.7).
#[derive(Debug, Default)]
pub struct Graph {
    pub nodes: IndexMap<DependencyId, DependencyNode>,
    pub(crate) ids: DependencyIdGen,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, node: DependencyNode) {
        self.nodes.insert(node.id, node);
    }

    pub fn get(&self, id: DependencyId) -> Option<&DependencyNode> {
        self.nodes.get(&id)
    }

    /// Kahn's-algorithm topological order over the dependency edges (spec
    /// §4.7 "Processing order", §8 invariant 4: every dependency of a node
    /// is listed before the node itself). Returns `ErrCircularDependency`
    /// and no partial order when a cycle exists.
    pub fn processing_order(&self) -> Result<Vec<DependencyId>, SnapSqlError> {
        let mut indegree: IndexMap<DependencyId, usize> =
            self.nodes.keys().map(|&id| (id, 0)).collect();
        let mut successors: IndexMap<DependencyId, Vec<DependencyId>> =
            self.nodes.keys().map(|&id| (id, Vec::new())).collect();

        for node in self.nodes.values() {
            if let Some(deg) = indegree.get_mut(&node.id) {
                *deg += node.depends_on.len();
            }
            for &dep in &node.depends_on {
                if let Some(succ) = successors.get_mut(&dep) {
                    succ.push(node.id);
                }
            }
        }

        let mut ready: VecDeque<DependencyId> = self
            .nodes
            .keys()
            .copied()
            .filter(|id| indegree.get(id) == Some(&0))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_front() {
            order.push(id);
            if let Some(succs) = successors.get(&id) {
                for &succ in succs {
                    if let Some(deg) = indegree.get_mut(&succ) {
                        *deg -= 1;
                        if *deg == 0 {
                            ready.push_back(succ);
                        }
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(SnapSqlError::new(
                ErrorKind::CircularDependency,
                "dependency graph contains a cycle",
            ));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeId;

    fn node(id: u32, depends_on: Vec<u32>) -> DependencyNode {
        DependencyNode {
            id: DependencyId(id),
            statement: NodeId(id),
            kind: DependencyKind::Cte,
            name: None,
            depends_on: depends_on.into_iter().map(DependencyId).collect(),
            produces: Vec::new(),
            table_refs: Vec::new(),
            scope: ScopeId(id),
        }
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let mut graph = Graph::new();
        graph.insert(node(0, vec![]));
        graph.insert(node(1, vec![0]));
        graph.insert(node(2, vec![1]));
        let order = graph.processing_order().unwrap();
        assert_eq!(order, vec![DependencyId(0), DependencyId(1), DependencyId(2)]);
    }

    #[test]
    fn cycle_is_detected_and_rejected() {
        let mut graph = Graph::new();
        graph.insert(node(0, vec![1]));
        graph.insert(node(1, vec![0]));
        let err = graph.processing_order().unwrap_err();
        assert_eq!(err.kind, ErrorKind::CircularDependency);
    }
}

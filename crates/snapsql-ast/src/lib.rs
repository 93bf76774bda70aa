//! AST node hierarchy (spec §3, §9 "Polymorphic AST"). One tagged variant
//! per hierarchy (statement, clause, field kind, directive kind); the set
//! is closed, matching the teacher's `enum_dispatch`-flavored node model
//! without the open-ended-inheritance traps it explicitly warns against.

pub mod clause;
pub mod directive;
pub mod fields;
pub mod from;
pub mod statement;

use std::sync::atomic::{AtomicU32, Ordering};

/// A stable ID for a node the dependency graph / error model can refer to
/// by reference rather than by pointer (spec §9 "Cyclic data").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Hands out unique [`NodeId`]s for one compilation. Not `Clone` — a
/// generator is owned by exactly one pipeline run.
#[derive(Debug, Default)]
pub struct NodeIdGen {
    next: AtomicU32,
}

impl NodeIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> NodeId {
        NodeId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

pub use clause::{ClauseKind, RawClause};
pub use directive::{DirectiveNode, DirectiveStackError};
pub use fields::{FieldKind, FieldSourceKind, ProjectedField};
pub use from::{FromClause, JoinKind, TableRef};
pub use statement::{DeleteStatement, InsertStatement, SelectStatement, Statement, UpdateStatement};

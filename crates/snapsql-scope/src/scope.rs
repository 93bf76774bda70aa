//! Scope tree and field sources (spec §3 "Scope"/"Field source", §4.7).

use crate::graph::DependencyId;
use snapsql_ast::FieldSourceKind;
use snapsql_helpers::IndexMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// A stable ID for a [`Scope`], distinct from [`snapsql_ast::NodeId`] (which
/// addresses statement-arena entries, not lexical regions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub(crate) struct ScopeIdGen {
    next: AtomicU32,
}

impl ScopeIdGen {
    pub(crate) fn next(&self) -> ScopeId {
        ScopeId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// The origin of one exposed output column (spec §3 "Field source").
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSource {
    pub name: String,
    pub alias: Option<String>,
    pub kind: FieldSourceKind,
    /// The table alias this column came from, set only when `kind == Table`.
    pub table: Option<String>,
    /// The raw function/expression name, set only for `Expression`/`Aggregate`.
    pub expression: Option<String>,
    /// The dependency node that produces this value, set only when
    /// `kind == Subquery` (a CTE or FROM-subquery's own exposed column).
    pub subquery_ref: Option<DependencyId>,
    pub scope: ScopeId,
}

impl FieldSource {
    /// The name downstream references resolve against: the alias if any,
    /// else the bare name.
    pub fn exposed_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A lexical region with its own table/subquery alias bindings (spec §3
/// "Scope"). Corresponds to exactly one of {CTE body, FROM-subquery body,
/// SELECT-subquery body, main body}.
#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// Field sources reachable in this scope without a qualifier: the union
    /// of the exposed columns of every CTE/FROM-subquery this scope depends
    /// on directly (spec §4.7 "Field resolution"). Plain physical tables
    /// contribute nothing here — their columns are unknowable without a
    /// real schema (see DESIGN.md).
    pub field_sources: Vec<FieldSource>,
    /// Alias -> real table name, for ordinary physical table references.
    pub table_aliases: IndexMap<String, String>,
    /// Alias -> the dependency node producing it, for CTE and FROM-subquery
    /// references.
    pub subquery_aliases: IndexMap<String, DependencyId>,
}

impl Scope {
    pub(crate) fn new(id: ScopeId, parent: Option<ScopeId>) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            field_sources: Vec::new(),
            table_aliases: IndexMap::default(),
            subquery_aliases: IndexMap::default(),
        }
    }
}

//! SELECT/RETURNING field-list classification (C7, spec §4.6).

use crate::NodeId;
use snapsql_helpers::Position;
use snapsql_token::Token;
use snapsql_types::TypeNode;

/// How one projected field's value is produced (spec §3 "Field source").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "PascalCase")]
pub enum FieldSourceKind {
    Table,
    Expression,
    Subquery,
    Aggregate,
    Literal,
}

/// The closed set of SELECT/RETURNING field shapes (spec §4.6).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// A bare or qualified column reference, e.g. `id`.
    SingleField { name: String },
    /// A qualified column reference, e.g. `u.id`.
    TableField { table: String, name: String },
    /// A function call, e.g. `count(*)`, with its inferred return type
    /// when the function is in the well-known table (spec §4.6).
    FunctionField {
        function: String,
        inferred_type: TypeNode,
    },
    /// An expression using `->`/`->>` or otherwise not reducible to the
    /// simpler shapes.
    ComplexField,
    /// A literal value (string/number/bool/null).
    LiteralField,
    /// The synthetic placeholder token inserted after a variable directive
    /// (spec §4.5 step 1).
    DummyField { expression: String },
    /// Rejected shape (e.g. `*`/`t.*`, spec §4.6).
    InvalidField { reason: String },
}

/// One entry of a SELECT/RETURNING field list, fully classified (spec §3
/// "Field source" plus the syntactic detail spec §4.6 requires).
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedField {
    pub kind: FieldKind,
    pub source_kind: FieldSourceKind,
    pub alias: Option<String>,
    pub cast_to: Option<TypeNode>,
    pub subquery_ref: Option<NodeId>,
    pub tokens: Vec<Token>,
    pub position: Position,
}

impl ProjectedField {
    /// The name this field is addressed by downstream: its alias if any,
    /// else the bare column name for `SingleField`/`TableField`, else
    /// `None` (spec §4.6 "duplicate field names after alias resolution").
    pub fn output_name(&self) -> Option<&str> {
        if let Some(alias) = &self.alias {
            return Some(alias);
        }
        match &self.kind {
            FieldKind::SingleField { name } => Some(name),
            FieldKind::TableField { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The dotted identity used for duplicate detection: `table.field` is
    /// counted distinctly from a bare `field` (spec §9 "Open Questions" —
    /// left as an implementation decision; this workspace keeps them
    /// distinct, see DESIGN.md).
    pub fn duplicate_key(&self) -> Option<String> {
        if let Some(alias) = &self.alias {
            return Some(alias.clone());
        }
        match &self.kind {
            FieldKind::SingleField { name } => Some(name.clone()),
            FieldKind::TableField { table, name } => Some(format!("{table}.{name}")),
            _ => None,
        }
    }
}

/// Well-known SQL function return types (spec §4.6). Functions not listed
/// here inherit an unknown type unless explicitly cast.
pub fn well_known_function_return_type(name: &str) -> TypeNode {
    use snapsql_types::ScalarKind;
    let lower = name.to_ascii_lowercase();
    match lower.as_str() {
        "count" => TypeNode::Scalar(ScalarKind::Int),
        "sum" | "avg" => TypeNode::Scalar(ScalarKind::Decimal),
        "length" | "char_length" | "octet_length" => TypeNode::Scalar(ScalarKind::Int),
        "lower" | "upper" | "trim" | "concat" | "to_char" => TypeNode::Scalar(ScalarKind::String),
        "extract" | "date_part" => TypeNode::Scalar(ScalarKind::Decimal),
        "now" | "current_timestamp" => TypeNode::Scalar(ScalarKind::Timestamp),
        "current_date" => TypeNode::Scalar(ScalarKind::Date),
        "exists" | "isnull" | "notnull" | "isfinite" => TypeNode::Scalar(ScalarKind::Bool),
        _ => TypeNode::Unknown,
    }
}

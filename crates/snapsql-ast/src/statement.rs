//! Statement nodes (C6/C7, spec §3, §4.5–§4.6): the top-level discrimination
//! over SELECT/INSERT/UPDATE/DELETE plus the optional leading WITH clause
//! shared by all four.

use crate::clause::RawClause;
use crate::directive::DirectiveNode;
use crate::fields::ProjectedField;
use crate::from::FromClause;
use crate::NodeId;
use snapsql_helpers::Position;
use snapsql_token::Token;

/// One `WITH name [(cols)] AS (subquery)` entry. The subquery itself is a
/// nested [`Statement`] referenced by [`NodeId`] from the shared arena, not
/// inlined, so a CTE can be shared by ID without cloning its body (spec §9
/// "Cyclic data").
#[derive(Debug, Clone, PartialEq)]
pub struct CommonTableExpr {
    pub name: String,
    pub column_aliases: Vec<String>,
    pub body: NodeId,
    pub position: Position,
}

/// The shared leading `WITH` clause (spec §4.5 "statement discrimination").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WithClause {
    pub ctes: Vec<CommonTableExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub with: Option<WithClause>,
    pub distinct: Distinct,
    pub fields: Vec<ProjectedField>,
    pub from: Option<FromClause>,
    pub r#where: Option<RawClause>,
    pub group_by: Option<RawClause>,
    pub having: Option<RawClause>,
    pub order_by: Option<RawClause>,
    pub limit: Option<RawClause>,
    pub offset: Option<RawClause>,
    pub directives: Vec<DirectiveNode>,
    pub position: Position,
}

/// SELECT's de-duplication mode (spec §4.6).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Distinct {
    #[default]
    None,
    Distinct,
    /// `DISTINCT ON (expr, ...)`.
    DistinctOn(Vec<Token>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub with: Option<WithClause>,
    pub table: String,
    pub schema: Option<String>,
    pub columns: Vec<String>,
    /// Each inner `Vec` is one VALUES row's expression tokens, one entry per
    /// column. Bulk bindings (spec §4.6 "bulk-binding detection") collapse
    /// to a single directive-carrying row handled via `directives` instead.
    pub rows: Vec<Vec<Vec<Token>>>,
    pub is_bulk_binding: bool,
    pub on_conflict: Option<RawClause>,
    pub returning: Vec<ProjectedField>,
    pub directives: Vec<DirectiveNode>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetAssignment {
    pub column: String,
    pub value: Vec<Token>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub with: Option<WithClause>,
    pub table: String,
    pub schema: Option<String>,
    pub assignments: Vec<SetAssignment>,
    pub from: Option<FromClause>,
    pub r#where: Option<RawClause>,
    pub returning: Vec<ProjectedField>,
    pub directives: Vec<DirectiveNode>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub with: Option<WithClause>,
    pub table: String,
    pub schema: Option<String>,
    pub using: Option<FromClause>,
    pub r#where: Option<RawClause>,
    pub returning: Vec<ProjectedField>,
    pub directives: Vec<DirectiveNode>,
    pub position: Position,
}

/// The closed set of top-level statement shapes (spec §3 "Statement",
/// §9 "Polymorphic AST").
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    InsertInto(InsertStatement),
    Update(UpdateStatement),
    DeleteFrom(DeleteStatement),
}

impl Statement {
    pub fn with_clause(&self) -> Option<&WithClause> {
        match self {
            Statement::Select(s) => s.with.as_ref(),
            Statement::InsertInto(s) => s.with.as_ref(),
            Statement::Update(s) => s.with.as_ref(),
            Statement::DeleteFrom(s) => s.with.as_ref(),
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Statement::Select(s) => s.position,
            Statement::InsertInto(s) => s.position,
            Statement::Update(s) => s.position,
            Statement::DeleteFrom(s) => s.position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Position {
        Position::new(0, 1, 1, 1)
    }

    #[test]
    fn with_clause_accessor_covers_all_statement_kinds() {
        let select = Statement::Select(SelectStatement {
            with: Some(WithClause {
                ctes: vec![CommonTableExpr {
                    name: "recent".into(),
                    column_aliases: vec![],
                    body: NodeId(0),
                    position: pos(),
                }],
            }),
            distinct: Distinct::None,
            fields: vec![],
            from: None,
            r#where: None,
            group_by: None,
            having: None,
            order_by: None,
            limit: None,
            offset: None,
            directives: vec![],
            position: pos(),
        });
        assert_eq!(select.with_clause().unwrap().ctes[0].name, "recent");
    }

    #[test]
    fn distinct_on_carries_expression_tokens() {
        let d = Distinct::DistinctOn(vec![]);
        assert!(matches!(d, Distinct::DistinctOn(_)));
    }
}

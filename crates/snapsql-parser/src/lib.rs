//! Clause structurer (C6), clause finalizer (C7), and directive
//! integration (C9) for the snapsql template compiler (spec §4.5–§4.6,
//! §4.8).
//!
//! [`structure`] is the single entry point: it normalizes directives,
//! discriminates the statement kind, partitions clauses, finalizes each
//! clause's contents, and attaches directive nodes, recursing into CTEs and
//! subqueries so every nested statement lands in the returned [`Arena`].

pub mod directives;
pub mod dml_clause;
pub mod from_clause;
pub mod predicates;
pub mod select_clause;
pub mod split;

use snapsql_ast::statement::{
    CommonTableExpr, DeleteStatement, Distinct, InsertStatement, SelectStatement, Statement,
    UpdateStatement, WithClause,
};
use snapsql_ast::{ClauseKind, NodeId, NodeIdGen, RawClause};
use snapsql_errors::{ErrorContainer, ErrorKind, SnapSqlError};
use snapsql_helpers::{IndexMap, Position};
use snapsql_token::{Token, TokenKind};
use split::StatementKind;

/// An arena of every statement produced while structuring one top-level
/// template: the main statement plus every CTE and subquery discovered
/// while walking it (spec §9 "Cyclic data" — nodes referenced by ID, not
/// pointer).
#[derive(Debug, Default)]
pub struct Arena {
    pub statements: IndexMap<NodeId, Statement>,
    pub ids: NodeIdGen,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, statement: Statement) -> NodeId {
        let id = self.ids.next();
        self.statements.insert(id, statement);
        id
    }
}

fn clause_by_kind(clauses: &[RawClause], kind: ClauseKind) -> Option<&RawClause> {
    clauses.iter().find(|c| c.kind == kind)
}

fn split_top_level_commas(tokens: &[Token]) -> Vec<&[Token]> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, tok) in tokens.iter().enumerate() {
        match tok.kind {
            TokenKind::OpenedParens => depth += 1,
            TokenKind::ClosedParens => depth -= 1,
            TokenKind::Comma if depth == 0 => {
                out.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&tokens[start..]);
    out
}

/// Parses a `WITH` clause body into its CTE list, recursively structuring
/// each CTE's inner statement into `arena` (spec §4.7 "Construction").
fn parse_with_clause(body: &[Token], arena: &mut Arena, errors: &mut Vec<SnapSqlError>) -> WithClause {
    let mut with = WithClause::default();
    for entry in split_top_level_commas(body) {
        let code: Vec<usize> = entry.iter().enumerate().filter(|(_, t)| t.is_code()).map(|(i, _)| i).collect();
        let Some(&name_idx) = code.first() else { continue };
        let name = entry[name_idx].lexeme.to_string();

        let mut idx = 1usize;
        let mut column_aliases = Vec::new();
        if let Some(&open_rel) = code.get(idx) {
            if entry[open_rel].kind == TokenKind::OpenedParens {
                let mut depth = 1i32;
                let mut j = idx + 1;
                while j < code.len() && depth > 0 {
                    match entry[code[j]].kind {
                        TokenKind::OpenedParens => depth += 1,
                        TokenKind::ClosedParens => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        TokenKind::Identifier => column_aliases.push(entry[code[j]].lexeme.to_string()),
                        _ => {}
                    }
                    j += 1;
                }
                idx = j + 1;
            }
        }
        // Skip `AS`.
        if code.get(idx).map(|&i| entry[i].kind) == Some(TokenKind::As) {
            idx += 1;
        }
        let Some(&open_rel) = code.get(idx) else {
            errors.push(SnapSqlError::new(ErrorKind::InvalidSql, format!("CTE `{name}` has no body")));
            continue;
        };
        if entry[open_rel].kind != TokenKind::OpenedParens {
            errors.push(SnapSqlError::new(ErrorKind::InvalidSql, format!("CTE `{name}` must be `AS (subquery)`")));
            continue;
        }
        let mut depth = 1i32;
        let mut j = idx + 1;
        while j < code.len() && depth > 0 {
            match entry[code[j]].kind {
                TokenKind::OpenedParens => depth += 1,
                TokenKind::ClosedParens => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            j += 1;
        }
        let inner = entry[open_rel + 1..code[j]].to_vec();
        let position = Position::from_children(entry.iter().map(|t| &t.position)).unwrap_or_default();
        match structure(inner, arena) {
            Ok(body_id) => with.ctes.push(CommonTableExpr { name, column_aliases, body: body_id, position }),
            Err(mut e) => errors.append(&mut e.into_vec()),
        }
    }
    with
}

/// Structures one full statement's tokens (spec §4.5–§4.6, §4.8),
/// recursing into any CTEs via [`parse_with_clause`] and registering the
/// result in `arena`. Returns the [`NodeId`] of the structured statement.
pub fn structure(tokens: Vec<Token>, arena: &mut Arena) -> Result<NodeId, ErrorContainer> {
    let mut errors = ErrorContainer::new();
    let normalized = directives::normalize_directives(tokens);

    let (kind, _skip) = match split::discriminate(&normalized) {
        Ok(v) => v,
        Err(e) => {
            errors.push(e);
            return Err(errors);
        }
    };

    let clauses = split::split_clauses(&normalized);

    let mut directive_nodes = Vec::new();
    match directives::attach_directives(&normalized, &arena.ids, &mut Vec::new()) {
        Ok(nodes) => directive_nodes = nodes,
        Err(e) => errors.push(e),
    }

    let mut with_errors = Vec::new();
    let with = clause_by_kind(&clauses, ClauseKind::With)
        .map(|raw| parse_with_clause(&raw.body, arena, &mut with_errors));
    errors.extend(with_errors);

    let statement = match kind {
        StatementKind::Select => build_select(&clauses, with, directive_nodes, &mut errors),
        StatementKind::InsertInto => build_insert(&clauses, with, directive_nodes, &mut errors, arena),
        StatementKind::Update => build_update(&clauses, with, directive_nodes, &mut errors, arena),
        StatementKind::DeleteFrom => build_delete(&clauses, with, directive_nodes, &mut errors, arena),
    };

    if errors.has_blocking() {
        return Err(errors);
    }
    Ok(arena.insert(statement))
}

fn statement_position(clauses: &[RawClause]) -> Position {
    Position::from_children(clauses.iter().map(|c| &c.position)).unwrap_or_default()
}

fn build_select(
    clauses: &[RawClause],
    with: Option<WithClause>,
    directives: Vec<snapsql_ast::DirectiveNode>,
    errors: &mut ErrorContainer,
) -> Statement {
    let position = statement_position(clauses);

    let (distinct, fields) = if let Some(select_clause) = clause_by_kind(clauses, ClauseKind::Select) {
        let (distinct, fields, field_errors) = select_clause::classify_field_list(&select_clause.body, true);
        errors.extend(field_errors);
        (distinct.unwrap_or(Distinct::None), fields)
    } else {
        errors.push(SnapSqlError::new(ErrorKind::InvalidSql, "SELECT statement missing SELECT clause"));
        (Distinct::None, Vec::new())
    };

    let from = clause_by_kind(clauses, ClauseKind::From).map(|c| {
        let (clause, from_errors) = from_clause::build_from_clause(&c.body);
        errors.extend(from_errors);
        clause
    });

    let has_group_by = clause_by_kind(clauses, ClauseKind::GroupBy).is_some();
    let has_limit = clause_by_kind(clauses, ClauseKind::Limit).is_some();

    if let Some(c) = clause_by_kind(clauses, ClauseKind::Where) {
        if let Err(e) = predicates::validate_where(&c.body) {
            errors.push(e);
        }
    }
    if let Some(c) = clause_by_kind(clauses, ClauseKind::GroupBy) {
        errors.extend(predicates::validate_group_by(&c.body));
    }
    if let Some(c) = clause_by_kind(clauses, ClauseKind::Having) {
        errors.extend(predicates::validate_having(&c.body, has_group_by));
    }
    if let Some(c) = clause_by_kind(clauses, ClauseKind::OrderBy) {
        errors.extend(predicates::validate_order_by(&c.body));
    }
    if let Some(c) = clause_by_kind(clauses, ClauseKind::Limit) {
        if let Err(e) = predicates::validate_limit(&c.body) {
            errors.push(e);
        }
    }
    if let Some(c) = clause_by_kind(clauses, ClauseKind::Offset) {
        errors.extend(predicates::validate_offset(&c.body, has_limit));
    }

    Statement::Select(SelectStatement {
        with,
        distinct,
        fields,
        from,
        r#where: clause_by_kind(clauses, ClauseKind::Where).cloned(),
        group_by: clause_by_kind(clauses, ClauseKind::GroupBy).cloned(),
        having: clause_by_kind(clauses, ClauseKind::Having).cloned(),
        order_by: clause_by_kind(clauses, ClauseKind::OrderBy).cloned(),
        limit: clause_by_kind(clauses, ClauseKind::Limit).cloned(),
        offset: clause_by_kind(clauses, ClauseKind::Offset).cloned(),
        directives,
        position,
    })
}

fn build_insert(
    clauses: &[RawClause],
    with: Option<WithClause>,
    directives: Vec<snapsql_ast::DirectiveNode>,
    errors: &mut ErrorContainer,
    _arena: &mut Arena,
) -> Statement {
    let position = statement_position(clauses);
    let has_select = clause_by_kind(clauses, ClauseKind::Select).is_some();

    let (schema, table, columns) = if let Some(c) = clause_by_kind(clauses, ClauseKind::InsertInto) {
        match dml_clause::parse_insert_target(&c.body, has_select) {
            Ok(t) => (t.schema, t.table, t.columns),
            Err(mut e) => {
                errors.extend(e.drain(..));
                (None, String::new(), Vec::new())
            }
        }
    } else {
        errors.push(SnapSqlError::new(ErrorKind::InvalidSql, "INSERT statement missing INSERT INTO clause"));
        (None, String::new(), Vec::new())
    };

    let mut rows = Vec::new();
    let mut is_bulk_binding = false;
    if let Some(c) = clause_by_kind(clauses, ClauseKind::Values) {
        match dml_clause::parse_values_rows(&c.body, columns.len()) {
            Ok(r) => {
                is_bulk_binding = r.len() == 1 && r[0].len() == 1 && r[0][0].len() == 1
                    && r[0][0][0].kind == TokenKind::DummyLiteral;
                rows = r;
            }
            Err(e) => errors.push(e),
        }
    }

    let (returning, returning_errors) = clause_by_kind(clauses, ClauseKind::Returning)
        .map(|c| dml_clause::classify_returning(&c.body))
        .unwrap_or_default();
    errors.extend(returning_errors);

    Statement::InsertInto(InsertStatement {
        with,
        table,
        schema,
        columns,
        rows,
        is_bulk_binding,
        on_conflict: clause_by_kind(clauses, ClauseKind::OnConflict).cloned(),
        returning,
        directives,
        position,
    })
}

fn build_update(
    clauses: &[RawClause],
    with: Option<WithClause>,
    directives: Vec<snapsql_ast::DirectiveNode>,
    errors: &mut ErrorContainer,
    _arena: &mut Arena,
) -> Statement {
    let position = statement_position(clauses);

    let (schema, table) = if let Some(c) = clause_by_kind(clauses, ClauseKind::Update) {
        let code: Vec<&Token> = c.body.iter().filter(|t| t.is_code()).collect();
        match code.as_slice() {
            [name] => (None, name.lexeme.to_string()),
            [s, dot, name] if dot.kind == TokenKind::Dot => (Some(s.lexeme.to_string()), name.lexeme.to_string()),
            _ => {
                errors.push(SnapSqlError::new(ErrorKind::InvalidSql, "UPDATE requires a single table name"));
                (None, String::new())
            }
        }
    } else {
        errors.push(SnapSqlError::new(ErrorKind::InvalidSql, "UPDATE statement missing UPDATE clause"));
        (None, String::new())
    };

    let assignments = if let Some(c) = clause_by_kind(clauses, ClauseKind::Set) {
        let (assignments, set_errors) = predicates::validate_set(&c.body);
        errors.extend(set_errors);
        assignments
            .into_iter()
            .map(|(column, value)| {
                let position = Position::from_children(value.iter().map(|t| &t.position)).unwrap_or_default();
                snapsql_ast::statement::SetAssignment { column, value, position }
            })
            .collect()
    } else {
        errors.push(SnapSqlError::new(ErrorKind::InvalidSql, "UPDATE statement missing SET clause"));
        Vec::new()
    };

    if let Some(c) = clause_by_kind(clauses, ClauseKind::Where) {
        if let Err(e) = predicates::validate_where(&c.body) {
            errors.push(e);
        }
    }

    let from = clause_by_kind(clauses, ClauseKind::From).map(|c| {
        let (clause, from_errors) = from_clause::build_from_clause(&c.body);
        errors.extend(from_errors);
        clause
    });

    let (returning, returning_errors) = clause_by_kind(clauses, ClauseKind::Returning)
        .map(|c| dml_clause::classify_returning(&c.body))
        .unwrap_or_default();
    errors.extend(returning_errors);

    Statement::Update(UpdateStatement {
        with,
        table,
        schema,
        assignments,
        from,
        r#where: clause_by_kind(clauses, ClauseKind::Where).cloned(),
        returning,
        directives,
        position,
    })
}

fn build_delete(
    clauses: &[RawClause],
    with: Option<WithClause>,
    directives: Vec<snapsql_ast::DirectiveNode>,
    errors: &mut ErrorContainer,
    _arena: &mut Arena,
) -> Statement {
    let position = statement_position(clauses);

    let (schema, table) = if let Some(c) = clause_by_kind(clauses, ClauseKind::DeleteFrom) {
        let code: Vec<&Token> = c.body.iter().filter(|t| t.is_code()).collect();
        match code.as_slice() {
            [name] => (None, name.lexeme.to_string()),
            [s, dot, name] if dot.kind == TokenKind::Dot => (Some(s.lexeme.to_string()), name.lexeme.to_string()),
            _ => {
                errors.push(SnapSqlError::new(ErrorKind::InvalidSql, "DELETE FROM requires a single table name"));
                (None, String::new())
            }
        }
    } else {
        errors.push(SnapSqlError::new(ErrorKind::InvalidSql, "DELETE statement missing DELETE FROM clause"));
        (None, String::new())
    };

    if let Some(c) = clause_by_kind(clauses, ClauseKind::Where) {
        if let Err(e) = predicates::validate_where(&c.body) {
            errors.push(e);
        }
    }

    let using = clause_by_kind(clauses, ClauseKind::From).map(|c| {
        let (clause, from_errors) = from_clause::build_from_clause(&c.body);
        errors.extend(from_errors);
        clause
    });

    let (returning, returning_errors) = clause_by_kind(clauses, ClauseKind::Returning)
        .map(|c| dml_clause::classify_returning(&c.body))
        .unwrap_or_default();
    errors.extend(returning_errors);

    Statement::DeleteFrom(DeleteStatement {
        with,
        table,
        schema,
        using,
        r#where: clause_by_kind(clauses, ClauseKind::Where).cloned(),
        returning,
        directives,
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapsql_helpers::Position;

    fn tok(kind: TokenKind, lexeme: &str, offset: u32) -> Token {
        Token::new(kind, lexeme, Position::new(offset, 1, offset + 1, lexeme.chars().count() as u32))
    }
    fn ws(offset: u32) -> Token {
        tok(TokenKind::Whitespace, " ", offset)
    }

    #[test]
    fn s2_rejected_star_end_to_end() {
        let tokens = vec![
            tok(TokenKind::Select, "SELECT", 0),
            ws(6),
            tok(TokenKind::Multiply, "*", 7),
            ws(8),
            tok(TokenKind::From, "FROM", 9),
            ws(13),
            tok(TokenKind::Identifier, "users", 14),
        ];
        let mut arena = Arena::new();
        let result = structure(tokens, &mut arena);
        assert!(result.is_err());
        let container = result.unwrap_err();
        assert!(container.iter().any(|e| e.kind == ErrorKind::InvalidForSnapSql && e.matches("asterisk")));
    }

    #[test]
    fn structures_simple_select() {
        let tokens = vec![
            tok(TokenKind::Select, "SELECT", 0),
            ws(6),
            tok(TokenKind::Identifier, "id", 7),
            ws(9),
            tok(TokenKind::From, "FROM", 10),
            ws(14),
            tok(TokenKind::Identifier, "users", 15),
        ];
        let mut arena = Arena::new();
        let id = structure(tokens, &mut arena).unwrap();
        let Statement::Select(select) = arena.statements.get(&id).unwrap() else {
            panic!("expected a SELECT statement");
        };
        assert_eq!(select.fields.len(), 1);
        assert!(select.from.is_some());
    }

    #[test]
    fn s5_with_clause_builds_nested_ctes() {
        // WITH a AS (SELECT 1 AS x), b AS (SELECT x FROM a) SELECT x FROM b
        let tokens = vec![
            tok(TokenKind::With, "WITH", 0),
            ws(4),
            tok(TokenKind::Identifier, "a", 5),
            ws(6),
            tok(TokenKind::As, "AS", 7),
            ws(9),
            tok(TokenKind::OpenedParens, "(", 10),
            tok(TokenKind::Select, "SELECT", 11),
            ws(17),
            tok(TokenKind::Number, "1", 18),
            ws(19),
            tok(TokenKind::As, "AS", 20),
            ws(22),
            tok(TokenKind::Identifier, "x", 23),
            tok(TokenKind::ClosedParens, ")", 24),
            tok(TokenKind::Comma, ",", 25),
            ws(26),
            tok(TokenKind::Identifier, "b", 27),
            ws(28),
            tok(TokenKind::As, "AS", 29),
            ws(31),
            tok(TokenKind::OpenedParens, "(", 32),
            tok(TokenKind::Select, "SELECT", 33),
            ws(39),
            tok(TokenKind::Identifier, "x", 40),
            ws(41),
            tok(TokenKind::From, "FROM", 42),
            ws(46),
            tok(TokenKind::Identifier, "a", 47),
            tok(TokenKind::ClosedParens, ")", 48),
            ws(49),
            tok(TokenKind::Select, "SELECT", 50),
            ws(56),
            tok(TokenKind::Identifier, "x", 57),
            ws(58),
            tok(TokenKind::From, "FROM", 59),
            ws(63),
            tok(TokenKind::Identifier, "b", 64),
        ];
        let mut arena = Arena::new();
        let id = structure(tokens, &mut arena).unwrap();
        let Statement::Select(select) = arena.statements.get(&id).unwrap() else {
            panic!("expected a SELECT statement");
        };
        let with = select.with.as_ref().expect("WITH clause");
        assert_eq!(with.ctes.len(), 2);
        assert_eq!(with.ctes[0].name, "a");
        assert_eq!(with.ctes[1].name, "b");
        // 2 CTEs + the main statement are all present in the arena.
        assert_eq!(arena.statements.len(), 3);
    }
}

//! INSERT INTO / VALUES / RETURNING structuring (C7, spec §4.6).

use crate::select_clause::classify_field;
use snapsql_ast::fields::ProjectedField;
use snapsql_errors::{ErrorKind, SnapSqlError};
use snapsql_helpers::{IndexSet, Position};
use snapsql_token::{Token, TokenKind};

fn code_tokens(body: &[Token]) -> Vec<&Token> {
    body.iter().filter(|t| t.is_code()).collect()
}

fn split_on_commas(tokens: &[Token]) -> Vec<&[Token]> {
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

/// The parsed `INSERT INTO` heading target (spec §4.6): `schema?.table`
/// plus an optional parenthesized column list.
pub struct InsertTarget {
    pub schema: Option<String>,
    pub table: String,
    pub columns: Vec<String>,
}

/// Parses the `INSERT INTO` clause body up to (not including) `VALUES`/
/// `SELECT` (spec §4.6). Requires either an explicit column list or a
/// following `SELECT`, signalled by `has_following_select`.
pub fn parse_insert_target(body: &[Token], has_following_select: bool) -> Result<InsertTarget, Vec<SnapSqlError>> {
    let mut errors = Vec::new();
    let code = code_tokens(body);
    let Some(&name) = code.first() else {
        return Err(vec![SnapSqlError::new(ErrorKind::InvalidSql, "INSERT INTO requires a table name")]);
    };

    let mut idx = 1usize;
    let mut schema = None;
    let mut table = name.lexeme.to_string();
    if code.len() > 2 && code[1].kind == TokenKind::Dot {
        schema = Some(table);
        table = code[2].lexeme.to_string();
        idx = 3;
    }

    let mut columns = Vec::new();
    if let Some(open) = code.get(idx) {
        if open.kind == TokenKind::OpenedParens {
            let mut depth = 1i32;
            let mut j = idx + 1;
            let mut seen = IndexSet::default();
            while j < code.len() && depth > 0 {
                match code[j].kind {
                    TokenKind::OpenedParens => depth += 1,
                    TokenKind::ClosedParens => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    TokenKind::Identifier if depth == 1 => {
                        let col = code[j].lexeme.to_string();
                        if !seen.insert(col.clone()) {
                            errors.push(SnapSqlError::new(
                                ErrorKind::InvalidForSnapSql,
                                format!("duplicate column `{col}` in INSERT INTO column list"),
                            ));
                        }
                        columns.push(col);
                    }
                    _ => {}
                }
                j += 1;
            }
        }
    }

    if columns.is_empty() && !has_following_select {
        errors.push(SnapSqlError::new(
            ErrorKind::InvalidSql,
            "INSERT INTO requires either a column list or a following SELECT",
        ));
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(InsertTarget { schema, table, columns })
}

/// One parsed VALUES tuple's per-column expression tokens.
pub fn parse_values_rows(body: &[Token], column_count: usize) -> Result<Vec<Vec<Vec<Token>>>, SnapSqlError> {
    let code: Vec<usize> = body.iter().enumerate().filter(|(_, t)| t.is_code()).map(|(i, _)| i).collect();

    // Bulk binding: a single DummyLiteral (or directive-carrying token)
    // stands in for the whole tail (spec §4.6 "bulk-binding detection").
    if code.len() == 1 && body[code[0]].kind == TokenKind::DummyLiteral {
        return Ok(vec![vec![vec![body[code[0]].clone()]]]);
    }

    let mut rows = Vec::new();
    let mut depth = 0i32;
    let mut tuple_start: Option<usize> = None;
    for (i, tok) in body.iter().enumerate() {
        match tok.kind {
            TokenKind::OpenedParens => {
                if depth == 0 {
                    tuple_start = Some(i + 1);
                }
                depth += 1;
            }
            TokenKind::ClosedParens => {
                depth -= 1;
                if depth == 0 {
                    let start = tuple_start.take().unwrap_or(i);
                    let tuple_tokens = &body[start..i];
                    let cols = split_on_commas(tuple_tokens);
                    if column_count > 0 && cols.len() != column_count {
                        return Err(SnapSqlError::new(
                            ErrorKind::InvalidSql,
                            format!(
                                "VALUES tuple has {} entries, expected {column_count}",
                                cols.len()
                            ),
                        )
                        .with_position(tok.position));
                    }
                    rows.push(cols.into_iter().map(|c| c.to_vec()).collect());
                }
            }
            _ => {}
        }
    }

    if rows.is_empty() {
        return Err(SnapSqlError::new(ErrorKind::InvalidSql, "VALUES clause has no tuples"));
    }
    Ok(rows)
}

/// Classifies a RETURNING field list: like SELECT's but without
/// `DISTINCT`/`*` framing (spec §4.6).
pub fn classify_returning(body: &[Token]) -> (Vec<ProjectedField>, Vec<SnapSqlError>) {
    let mut errors = Vec::new();
    let groups = split_on_commas(body);
    let mut fields = Vec::with_capacity(groups.len());
    let mut seen = IndexSet::default();
    for group in groups {
        let position = Position::from_children(group.iter().map(|t| &t.position)).unwrap_or_default();
        let field = classify_field(group, position);
        if let Some(key) = field.duplicate_key() {
            if !seen.insert(key.clone()) {
                errors.push(SnapSqlError::new(
                    ErrorKind::InvalidForSnapSql,
                    format!("duplicate RETURNING field `{key}`"),
                ));
            }
        }
        fields.push(field);
    }
    (fields, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapsql_helpers::Position;

    fn tok(kind: TokenKind, lexeme: &str, offset: u32) -> Token {
        Token::new(kind, lexeme, Position::new(offset, 1, offset + 1, lexeme.chars().count() as u32))
    }

    #[test]
    fn parses_insert_target_with_columns() {
        let body = vec![
            tok(TokenKind::Identifier, "users", 0),
            tok(TokenKind::OpenedParens, "(", 5),
            tok(TokenKind::Identifier, "name", 6),
            tok(TokenKind::Comma, ",", 10),
            tok(TokenKind::Identifier, "email", 11),
            tok(TokenKind::ClosedParens, ")", 16),
        ];
        let target = parse_insert_target(&body, false).unwrap();
        assert_eq!(target.table, "users");
        assert_eq!(target.columns, vec!["name".to_string(), "email".to_string()]);
    }

    #[test]
    fn insert_without_columns_or_select_is_an_error() {
        let body = vec![tok(TokenKind::Identifier, "users", 0)];
        assert!(parse_insert_target(&body, false).is_err());
        assert!(parse_insert_target(&body, true).is_ok());
    }

    #[test]
    fn parses_two_values_tuples() {
        let body = vec![
            tok(TokenKind::OpenedParens, "(", 0),
            tok(TokenKind::Number, "1", 1),
            tok(TokenKind::Comma, ",", 2),
            tok(TokenKind::Number, "2", 3),
            tok(TokenKind::ClosedParens, ")", 4),
            tok(TokenKind::Comma, ",", 5),
            tok(TokenKind::OpenedParens, "(", 6),
            tok(TokenKind::Number, "3", 7),
            tok(TokenKind::Comma, ",", 8),
            tok(TokenKind::Number, "4", 9),
            tok(TokenKind::ClosedParens, ")", 10),
        ];
        let rows = parse_values_rows(&body, 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 2);
    }

    #[test]
    fn bulk_binding_directive_replaces_values_tail() {
        let body = vec![tok(TokenKind::DummyLiteral, "rows", 0)];
        let rows = parse_values_rows(&body, 2).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 1);
    }
}

//! WHERE / HAVING / GROUP BY / ORDER BY / LIMIT / OFFSET rules (C7, spec §4.6).

use snapsql_errors::{ErrorKind, SnapSqlError};
use snapsql_helpers::IndexSet;
use snapsql_token::{Token, TokenKind};

fn code_tokens(body: &[Token]) -> Vec<&Token> {
    body.iter().filter(|t| t.is_code()).collect()
}

fn require_nonempty(body: &[Token], clause_name: &str) -> Result<(), SnapSqlError> {
    if code_tokens(body).is_empty() {
        return Err(SnapSqlError::new(
            ErrorKind::InvalidSql,
            format!("{clause_name} clause body must not be empty"),
        ));
    }
    Ok(())
}

/// Validates a WHERE body (spec §4.6): non-empty only.
pub fn validate_where(body: &[Token]) -> Result<(), SnapSqlError> {
    require_nonempty(body, "WHERE")
}

/// Validates a HAVING body, additionally requiring a preceding GROUP BY
/// (spec §4.6).
pub fn validate_having(body: &[Token], has_group_by: bool) -> Vec<SnapSqlError> {
    let mut errors = Vec::new();
    if let Err(e) = require_nonempty(body, "HAVING") {
        errors.push(e);
    }
    if !has_group_by {
        errors.push(SnapSqlError::new(
            ErrorKind::InvalidSql,
            "HAVING requires a preceding GROUP BY clause",
        ));
    }
    errors
}

/// Validates LIMIT/OFFSET bodies (spec §4.6): rejects the MySQL `LIMIT a,
/// b` comma form, negative literals, and (for OFFSET) requires a LIMIT to
/// already be present.
pub fn validate_limit(body: &[Token]) -> Result<(), SnapSqlError> {
    require_nonempty(body, "LIMIT")?;
    let code = code_tokens(body);
    if code.iter().any(|t| t.kind == TokenKind::Comma) {
        return Err(SnapSqlError::new(
            ErrorKind::InvalidForSnapSql,
            "`LIMIT a, b` is not supported; use LIMIT and OFFSET separately",
        ));
    }
    if code.len() >= 2 && code[0].kind == TokenKind::Minus && code[1].kind == TokenKind::Number {
        return Err(SnapSqlError::new(
            ErrorKind::InvalidForSnapSql,
            "LIMIT cannot be a negative literal",
        )
        .with_position(code[0].position));
    }
    Ok(())
}

pub fn validate_offset(body: &[Token], has_limit: bool) -> Vec<SnapSqlError> {
    let mut errors = Vec::new();
    if let Err(e) = require_nonempty(body, "OFFSET") {
        errors.push(e);
    }
    if !has_limit {
        errors.push(SnapSqlError::new(
            ErrorKind::InvalidForSnapSql,
            "OFFSET without LIMIT is not supported",
        ));
    }
    let code = code_tokens(body);
    if code.len() >= 2 && code[0].kind == TokenKind::Minus && code[1].kind == TokenKind::Number {
        errors.push(
            SnapSqlError::new(ErrorKind::InvalidForSnapSql, "OFFSET cannot be a negative literal")
                .with_position(code[0].position),
        );
    }
    errors
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

/// The dotted-name form GROUP BY / ORDER BY reduce to for duplicate
/// detection (spec §4.6).
fn item_name(item: &[Token]) -> Option<String> {
    let code: Vec<&Token> = code_tokens(item);
    match code.as_slice() {
        [ident] if matches!(ident.kind, TokenKind::Identifier) => Some(ident.lexeme.to_string()),
        [table, dot, ident] if dot.kind == TokenKind::Dot => {
            Some(format!("{}.{}", table.lexeme, ident.lexeme))
        }
        _ => None,
    }
}

/// Validates a GROUP BY body (spec §4.6): accepts `NULL`,
/// `ROLLUP/CUBE/GROUPING SETS (...)`, or a comma list of
/// `ident`/`table.ident`/`CASE ...`; rejects bare numeric position and
/// duplicate columns.
pub fn validate_group_by(body: &[Token]) -> Vec<SnapSqlError> {
    let mut errors = Vec::new();
    let code = code_tokens(body);
    if code.is_empty() {
        errors.push(SnapSqlError::new(ErrorKind::InvalidSql, "GROUP BY clause body must not be empty"));
        return errors;
    }
    if code.len() == 1 && code[0].kind == TokenKind::Null {
        return errors;
    }
    if matches!(code[0].kind, TokenKind::Rollup | TokenKind::Cube)
        || (code[0].kind == TokenKind::Grouping && code.get(1).map(|t| t.kind) == Some(TokenKind::Sets))
    {
        return errors;
    }

    let items = split_on_commas(body);
    let mut seen = IndexSet::default();
    for item in items {
        let code = code_tokens(item);
        if code.len() == 1 && code[0].kind == TokenKind::Number {
            errors.push(
                SnapSqlError::new(
                    ErrorKind::InvalidForSnapSql,
                    "GROUP BY by ordinal position is not supported",
                )
                .with_position(code[0].position),
            );
            continue;
        }
        if code.first().map(|t| t.kind) == Some(TokenKind::Case) {
            continue;
        }
        if let Some(name) = item_name(item) {
            if !seen.insert(name.clone()) {
                errors.push(SnapSqlError::new(
                    ErrorKind::InvalidForSnapSql,
                    format!("duplicate GROUP BY column `{name}`"),
                ));
            }
        }
    }
    errors
}

/// Validates an ORDER BY body (spec §4.6).
pub fn validate_order_by(body: &[Token]) -> Vec<SnapSqlError> {
    let mut errors = Vec::new();
    if code_tokens(body).is_empty() {
        errors.push(SnapSqlError::new(ErrorKind::InvalidSql, "ORDER BY clause body must not be empty"));
        return errors;
    }

    let items = split_on_commas(body);
    let mut seen = IndexSet::default();
    for item in items {
        let code = code_tokens(item);
        if code.is_empty() {
            continue;
        }
        // Strip trailing COLLATE ident, ASC|DESC, NULLS FIRST|LAST.
        let mut end = code.len();
        if end >= 2 && matches!(code[end - 2].kind, TokenKind::Null) && code[end - 1].lexeme.eq_ignore_ascii_case("FIRST") {
            end -= 2;
        } else if end >= 2
            && code[end - 2].lexeme.eq_ignore_ascii_case("NULLS")
            && code[end - 1].lexeme.eq_ignore_ascii_case("LAST")
        {
            end -= 2;
        }
        if end > 0 && matches!(code[end - 1].kind, TokenKind::Asc | TokenKind::Desc) {
            end -= 1;
        }
        if end >= 2 && code[end - 2].kind == TokenKind::Collate {
            end -= 2;
        }
        let expr = &code[..end];
        if expr.is_empty() {
            continue;
        }
        if expr.len() == 1 && expr[0].kind == TokenKind::Number {
            errors.push(
                SnapSqlError::new(
                    ErrorKind::InvalidForSnapSql,
                    "ORDER BY by ordinal position is not supported",
                )
                .with_position(expr[0].position),
            );
            continue;
        }
        let is_field = matches!(expr, [ident] if ident.kind == TokenKind::Identifier)
            || matches!(expr, [t, dot, f] if dot.kind == TokenKind::Dot && t.kind == TokenKind::Identifier && f.kind == TokenKind::Identifier);
        let is_cast = expr.first().map(|t| t.kind) == Some(TokenKind::Cast)
            || expr.last().map(|t| t.kind) == Some(TokenKind::Identifier) && expr.iter().any(|t| t.kind == TokenKind::DoubleColon);
        let is_case = expr.first().map(|t| t.kind) == Some(TokenKind::Case);
        let is_field_function = expr.first().map(|t| t.lexeme.eq_ignore_ascii_case("FIELD")).unwrap_or(false)
            && expr.get(1).map(|t| t.kind) == Some(TokenKind::OpenedParens);

        if !(is_field || is_cast || is_case || is_field_function) {
            errors.push(
                SnapSqlError::new(
                    ErrorKind::InvalidForSnapSql,
                    "ORDER BY expression must be a field, cast, CASE, or FIELD(...) expression",
                )
                .with_position(expr[0].position),
            );
            continue;
        }

        if let Some(name) = item_name(expr) {
            if !seen.insert(name.clone()) {
                errors.push(SnapSqlError::new(
                    ErrorKind::InvalidForSnapSql,
                    format!("duplicate ORDER BY column `{name}`"),
                ));
            }
        }
    }
    errors
}

/// Validates a SET (UPDATE) body: comma-delimited `ident = value`, no
/// duplicate idents, non-empty (spec §4.6).
pub fn validate_set(body: &[Token]) -> (Vec<(String, Vec<Token>)>, Vec<SnapSqlError>) {
    let mut errors = Vec::new();
    let mut assignments = Vec::new();
    if code_tokens(body).is_empty() {
        errors.push(SnapSqlError::new(ErrorKind::InvalidSql, "SET clause body must not be empty"));
        return (assignments, errors);
    }
    let mut seen = IndexSet::default();
    for item in split_on_commas(body) {
        let code = code_tokens(item);
        let Some(eq_pos) = code.iter().position(|t| t.kind == TokenKind::Equal) else {
            errors.push(SnapSqlError::new(ErrorKind::InvalidSql, "SET assignment must be `column = value`"));
            continue;
        };
        if eq_pos != 1 || !matches!(code[0].kind, TokenKind::Identifier) {
            errors.push(SnapSqlError::new(ErrorKind::InvalidSql, "SET assignment target must be a bare column name"));
            continue;
        }
        let column = code[0].lexeme.to_string();
        if !seen.insert(column.clone()) {
            errors.push(SnapSqlError::new(
                ErrorKind::InvalidForSnapSql,
                format!("duplicate SET assignment for `{column}`"),
            ));
            continue;
        }
        let value: Vec<Token> = code[2..].iter().map(|&t| t.clone()).collect();
        assignments.push((column, value));
    }
    (assignments, errors)
}

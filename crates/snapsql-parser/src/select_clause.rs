//! SELECT and RETURNING field-list classification (C7, spec §4.6).

use snapsql_ast::fields::{well_known_function_return_type, FieldKind, FieldSourceKind, ProjectedField};
use snapsql_ast::statement::Distinct;
use snapsql_errors::{ErrorKind, SnapSqlError};
use snapsql_helpers::{IndexSet, Position};
use snapsql_token::{Token, TokenKind};

/// Splits `tokens` on top-level commas (respecting parenthesis nesting).
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

/// Recognizes a leading `DISTINCT`, `ALL`, or `DISTINCT ON (...)` and
/// returns it plus the remaining tokens (spec §4.6 "SELECT clause").
fn take_distinct(body: &[Token]) -> Result<(Distinct, &[Token]), SnapSqlError> {
    let code: Vec<usize> = body.iter().enumerate().filter(|(_, t)| t.is_code()).map(|(i, _)| i).collect();
    let Some(&first) = code.first() else {
        return Ok((Distinct::None, body));
    };
    match body[first].kind {
        TokenKind::All => Ok((Distinct::None, &body[first + 1..])),
        TokenKind::Distinct => {
            if let Some(&second) = code.get(1) {
                if body[second].lexeme.eq_ignore_ascii_case("ALL") {
                    return Err(SnapSqlError::new(
                        ErrorKind::InvalidSql,
                        "DISTINCT ALL is invalid",
                    )
                    .with_position(body[second].position));
                }
                if body[second].lexeme.eq_ignore_ascii_case("ON") {
                    let Some(&open) = code.get(2) else {
                        return Err(SnapSqlError::new(
                            ErrorKind::InvalidSql,
                            "DISTINCT ON requires a parenthesized column list",
                        )
                        .with_position(body[second].position));
                    };
                    if body[open].kind != TokenKind::OpenedParens {
                        return Err(SnapSqlError::new(
                            ErrorKind::InvalidSql,
                            "DISTINCT ON requires a parenthesized column list",
                        )
                        .with_position(body[open].position));
                    }
                    let mut depth = 1i32;
                    let mut close = open + 1;
                    while close < body.len() && depth > 0 {
                        match body[close].kind {
                            TokenKind::OpenedParens => depth += 1,
                            TokenKind::ClosedParens => depth -= 1,
                            _ => {}
                        }
                        if depth > 0 {
                            close += 1;
                        }
                    }
                    let cols = body[open + 1..close].to_vec();
                    return Ok((Distinct::DistinctOn(cols), &body[close + 1..]));
                }
            }
            Ok((Distinct::Distinct, &body[first + 1..]))
        }
        _ => Ok((Distinct::None, body)),
    }
}

/// Classifies one comma-separated field's tokens into a [`ProjectedField`]
/// (spec §4.6). `is_returning` disables `DISTINCT`/`*` framing (RETURNING
/// never carries either, but `*` rejection still applies implicitly since
/// the grammar never hands this function a bare `*`).
pub fn classify_field(tokens: &[Token], position: Position) -> ProjectedField {
    let code: Vec<usize> = tokens.iter().enumerate().filter(|(_, t)| t.is_code()).map(|(i, _)| i).collect();

    if code.is_empty() {
        return ProjectedField {
            kind: FieldKind::InvalidField {
                reason: "empty field expression".to_string(),
            },
            source_kind: FieldSourceKind::Literal,
            alias: None,
            cast_to: None,
            subquery_ref: None,
            tokens: tokens.to_vec(),
            position,
        };
    }

    // `*` / `t.*` rejection (spec §4.6).
    if code.len() == 1 && tokens[code[0]].lexeme == "*" {
        return ProjectedField {
            kind: FieldKind::InvalidField {
                reason: "asterisk field lists are not allowed; list columns explicitly".to_string(),
            },
            source_kind: FieldSourceKind::Literal,
            alias: None,
            cast_to: None,
            subquery_ref: None,
            tokens: tokens.to_vec(),
            position,
        };
    }
    if code.len() == 3
        && tokens[code[1]].kind == TokenKind::Dot
        && tokens[code[2]].lexeme == "*"
    {
        return ProjectedField {
            kind: FieldKind::InvalidField {
                reason: "asterisk field lists are not allowed; list columns explicitly".to_string(),
            },
            source_kind: FieldSourceKind::Literal,
            alias: None,
            cast_to: None,
            subquery_ref: None,
            tokens: tokens.to_vec(),
            position,
        };
    }

    // Trailing alias: `AS ident` or a bare trailing ident not preceded by
    // `.`/`::` (spec §4.6).
    let mut body_end = code.len();
    let mut alias = None;
    if body_end >= 2 {
        let last = code[body_end - 1];
        let prev = code[body_end - 2];
        if tokens[prev].kind == TokenKind::As {
            alias = Some(tokens[last].lexeme.to_string());
            body_end -= 2;
        } else if matches!(tokens[last].kind, TokenKind::Identifier | TokenKind::ContextualIdentifier)
            && !matches!(tokens[prev].kind, TokenKind::Dot | TokenKind::DoubleColon)
            && body_end > 1
        {
            alias = Some(tokens[last].lexeme.to_string());
            body_end -= 1;
        }
    }
    let expr_code = &code[..body_end];

    if expr_code.is_empty() {
        return ProjectedField {
            kind: FieldKind::InvalidField {
                reason: "field has an alias but no expression".to_string(),
            },
            source_kind: FieldSourceKind::Literal,
            alias,
            cast_to: None,
            subquery_ref: None,
            tokens: tokens.to_vec(),
            position,
        };
    }

    // `expr::type` cast suffix.
    let mut cast_to = None;
    let mut final_code = expr_code;
    if final_code.len() >= 2 {
        let last = final_code[final_code.len() - 1];
        let dc = final_code[final_code.len() - 2];
        if tokens[dc].kind == TokenKind::DoubleColon {
            cast_to = Some(snapsql_types::normalize_scalar_name(&tokens[last].lexeme));
            final_code = &final_code[..final_code.len() - 2];
        }
    }

    if final_code.is_empty() {
        return ProjectedField {
            kind: FieldKind::InvalidField {
                reason: "cast has no expression".to_string(),
            },
            source_kind: FieldSourceKind::Literal,
            alias,
            cast_to,
            subquery_ref: None,
            tokens: tokens.to_vec(),
            position,
        };
    }

    // `CAST(expr AS type)` wrapping.
    if tokens[final_code[0]].kind == TokenKind::Cast {
        // Leave as ComplexField; the AS-type is embedded and not further
        // decomposed here (the cast keyword already signals typed output).
        return ProjectedField {
            kind: FieldKind::ComplexField,
            source_kind: FieldSourceKind::Expression,
            alias,
            cast_to,
            subquery_ref: None,
            tokens: tokens.to_vec(),
            position,
        };
    }

    // JSON operators anywhere in the expression -> Complex.
    if final_code.iter().any(|&i| tokens[i].kind == TokenKind::JsonOperator) {
        return ProjectedField {
            kind: FieldKind::ComplexField,
            source_kind: FieldSourceKind::Expression,
            alias,
            cast_to,
            subquery_ref: None,
            tokens: tokens.to_vec(),
            position,
        };
    }

    // Subquery: a parenthesized group spanning the whole expression.
    if tokens[final_code[0]].kind == TokenKind::OpenedParens
        && tokens[final_code[final_code.len() - 1]].kind == TokenKind::ClosedParens
    {
        return ProjectedField {
            kind: FieldKind::ComplexField,
            source_kind: FieldSourceKind::Subquery,
            alias,
            cast_to,
            subquery_ref: None,
            tokens: tokens.to_vec(),
            position,
        };
    }

    // Dummy literal placeholder from a variable/const directive.
    if final_code.len() == 1 && tokens[final_code[0]].kind == TokenKind::DummyLiteral {
        return ProjectedField {
            kind: FieldKind::DummyField {
                expression: tokens[final_code[0]].lexeme.to_string(),
            },
            source_kind: FieldSourceKind::Expression,
            alias,
            cast_to,
            subquery_ref: None,
            tokens: tokens.to_vec(),
            position,
        };
    }

    // Literal value.
    if final_code.len() == 1
        && matches!(
            tokens[final_code[0]].kind,
            TokenKind::Number | TokenKind::String | TokenKind::Boolean | TokenKind::Null
        )
    {
        return ProjectedField {
            kind: FieldKind::LiteralField,
            source_kind: FieldSourceKind::Literal,
            alias,
            cast_to,
            subquery_ref: None,
            tokens: tokens.to_vec(),
            position,
        };
    }

    // Bare identifier: `name` or `table.name`.
    if final_code.len() == 1 && matches!(tokens[final_code[0]].kind, TokenKind::Identifier) {
        return ProjectedField {
            kind: FieldKind::SingleField {
                name: tokens[final_code[0]].lexeme.to_string(),
            },
            source_kind: FieldSourceKind::Table,
            alias,
            cast_to,
            subquery_ref: None,
            tokens: tokens.to_vec(),
            position,
        };
    }
    if final_code.len() == 3
        && tokens[final_code[1]].kind == TokenKind::Dot
        && matches!(tokens[final_code[0]].kind, TokenKind::Identifier)
        && matches!(tokens[final_code[2]].kind, TokenKind::Identifier)
    {
        return ProjectedField {
            kind: FieldKind::TableField {
                table: tokens[final_code[0]].lexeme.to_string(),
                name: tokens[final_code[2]].lexeme.to_string(),
            },
            source_kind: FieldSourceKind::Table,
            alias,
            cast_to,
            subquery_ref: None,
            tokens: tokens.to_vec(),
            position,
        };
    }

    // Function call: `ident (` ... `)` spanning to the end.
    if final_code.len() >= 3
        && matches!(tokens[final_code[0]].kind, TokenKind::Identifier)
        && tokens[final_code[1]].kind == TokenKind::OpenedParens
        && tokens[final_code[final_code.len() - 1]].kind == TokenKind::ClosedParens
    {
        let name = tokens[final_code[0]].lexeme.to_string();
        let inferred = well_known_function_return_type(&name);
        let is_aggregate = matches!(name.to_ascii_lowercase().as_str(), "count" | "sum" | "avg" | "min" | "max");
        return ProjectedField {
            kind: FieldKind::FunctionField {
                function: name,
                inferred_type: inferred,
            },
            source_kind: if is_aggregate {
                FieldSourceKind::Aggregate
            } else {
                FieldSourceKind::Expression
            },
            alias,
            cast_to,
            subquery_ref: None,
            tokens: tokens.to_vec(),
            position,
        };
    }

    ProjectedField {
        kind: FieldKind::ComplexField,
        source_kind: FieldSourceKind::Expression,
        alias,
        cast_to,
        subquery_ref: None,
        tokens: tokens.to_vec(),
        position,
    }
}

/// Classifies a full SELECT/RETURNING field list and checks for duplicate
/// output names (spec §4.6, §9 "Open Questions" on the dotted-vs-bare
/// duplicate key decision).
pub fn classify_field_list(body: &[Token], is_select: bool) -> (Option<Distinct>, Vec<ProjectedField>, Vec<SnapSqlError>) {
    let mut errors = Vec::new();
    let (distinct, rest) = if is_select {
        match take_distinct(body) {
            Ok((d, r)) => (Some(d), r),
            Err(e) => {
                errors.push(e);
                (Some(Distinct::None), body)
            }
        }
    } else {
        (None, body)
    };

    let groups = split_on_commas(rest);
    let mut fields = Vec::with_capacity(groups.len());
    for group in groups {
        let position = snapsql_helpers::Position::from_children(group.iter().map(|t| &t.position))
            .unwrap_or_default();
        let field = classify_field(group, position);
        if let FieldKind::InvalidField { reason } = &field.kind {
            errors.push(
                SnapSqlError::new(ErrorKind::InvalidForSnapSql, reason.clone()).with_position(field.position),
            );
        }
        fields.push(field);
    }

    let mut seen = IndexSet::default();
    for field in &fields {
        if let Some(key) = field.duplicate_key() {
            if !seen.insert(key.clone()) {
                errors.push(
                    SnapSqlError::new(
                        ErrorKind::InvalidForSnapSql,
                        format!("duplicate field name `{key}` in field list"),
                    )
                    .with_position(field.position),
                );
            }
        }
    }

    if let Some(Distinct::DistinctOn(cols)) = &distinct {
        errors.extend(check_distinct_on_entries(cols, &fields));
    }

    (distinct, fields, errors)
}

/// Rejects a `DISTINCT ON (...)` entry that names a projected field's
/// *alias* rather than a raw column/table-qualified name (spec §4.6:
/// "an entry that matches an alias ... of a projected field is invalid").
fn check_distinct_on_entries(cols: &[Token], fields: &[ProjectedField]) -> Vec<SnapSqlError> {
    let mut errors = Vec::new();
    for entry in split_on_commas(cols) {
        let code: Vec<usize> = entry.iter().enumerate().filter(|(_, t)| t.is_code()).map(|(i, _)| i).collect();
        let Some(&last) = code.last() else { continue };
        let name = entry[last].lexeme.as_str();
        if fields.iter().any(|f| f.alias.as_deref() == Some(name)) {
            errors.push(
                SnapSqlError::new(
                    ErrorKind::InvalidSql,
                    format!("DISTINCT ON entry `{name}` names a field alias, not a column"),
                )
                .with_position(entry[last].position),
            );
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapsql_helpers::Position;

    fn tok(kind: TokenKind, lexeme: &str, offset: u32) -> Token {
        Token::new(kind, lexeme, Position::new(offset, 1, offset + 1, lexeme.chars().count() as u32))
    }

    #[test]
    fn s2_rejected_star() {
        let body = vec![tok(TokenKind::Multiply, "*", 0)];
        let (_, fields, errors) = classify_field_list(&body, true);
        assert_eq!(fields.len(), 1);
        assert!(matches!(fields[0].kind, FieldKind::InvalidField { .. }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::InvalidForSnapSql);
        assert!(errors[0].message.contains("asterisk"));
    }

    #[test]
    fn classifies_table_field_and_alias() {
        let body = vec![
            tok(TokenKind::Identifier, "u", 0),
            tok(TokenKind::Dot, ".", 1),
            tok(TokenKind::Identifier, "id", 2),
            tok(TokenKind::Whitespace, " ", 4),
            tok(TokenKind::As, "AS", 5),
            tok(TokenKind::Whitespace, " ", 7),
            tok(TokenKind::Identifier, "user_id", 8),
        ];
        let field = classify_field(&body, Position::default());
        assert_eq!(
            field.kind,
            FieldKind::TableField { table: "u".to_string(), name: "id".to_string() }
        );
        assert_eq!(field.alias.as_deref(), Some("user_id"));
        assert_eq!(field.duplicate_key().as_deref(), Some("user_id"));
    }

    #[test]
    fn detects_duplicate_field_names() {
        let body = vec![
            tok(TokenKind::Identifier, "id", 0),
            tok(TokenKind::Comma, ",", 2),
            tok(TokenKind::Identifier, "id", 3),
        ];
        let (_, fields, errors) = classify_field_list(&body, true);
        assert_eq!(fields.len(), 2);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("duplicate"));
    }

    #[test]
    fn function_field_gets_well_known_return_type() {
        let body = vec![
            tok(TokenKind::Identifier, "count", 0),
            tok(TokenKind::OpenedParens, "(", 5),
            tok(TokenKind::Multiply, "*", 6),
            tok(TokenKind::ClosedParens, ")", 7),
        ];
        let field = classify_field(&body, Position::default());
        match field.kind {
            FieldKind::FunctionField { function, inferred_type } => {
                assert_eq!(function, "count");
                assert_eq!(inferred_type, snapsql_types::TypeNode::Scalar(snapsql_types::ScalarKind::Int));
            }
            other => panic!("expected FunctionField, got {other:?}"),
        }
        assert_eq!(field.source_kind, FieldSourceKind::Aggregate);
    }

    #[test]
    fn distinct_on_rejects_alias_entry() {
        // SELECT id AS row_id FROM t, with DISTINCT ON (row_id) rejected
        // because `row_id` is a field alias, not a raw column name.
        let body = vec![
            tok(TokenKind::Distinct, "DISTINCT", 0),
            tok(TokenKind::Whitespace, " ", 8),
            tok(TokenKind::Identifier, "ON", 9),
            tok(TokenKind::Whitespace, " ", 11),
            tok(TokenKind::OpenedParens, "(", 12),
            tok(TokenKind::Identifier, "row_id", 13),
            tok(TokenKind::ClosedParens, ")", 19),
            tok(TokenKind::Whitespace, " ", 20),
            tok(TokenKind::Identifier, "id", 21),
            tok(TokenKind::Whitespace, " ", 23),
            tok(TokenKind::As, "AS", 24),
            tok(TokenKind::Whitespace, " ", 26),
            tok(TokenKind::Identifier, "row_id", 27),
        ];
        let (distinct, _, errors) = classify_field_list(&body, true);
        assert!(matches!(distinct, Some(Distinct::DistinctOn(_))));
        assert!(errors.iter().any(|e| e.kind == ErrorKind::InvalidSql && e.message.contains("row_id")));
    }

    #[test]
    fn distinct_on_parses_column_list() {
        let body = vec![
            tok(TokenKind::Distinct, "DISTINCT", 0),
            tok(TokenKind::Whitespace, " ", 8),
            tok(TokenKind::Identifier, "ON", 9), // lexeme-matched, not a keyword token
            tok(TokenKind::Whitespace, " ", 11),
            tok(TokenKind::OpenedParens, "(", 12),
            tok(TokenKind::Identifier, "id", 13),
            tok(TokenKind::ClosedParens, ")", 15),
            tok(TokenKind::Whitespace, " ", 16),
            tok(TokenKind::Identifier, "id", 17),
        ];
        let (distinct, _, _errors) = classify_field_list(&body, true);
        assert!(matches!(distinct, Some(Distinct::DistinctOn(_))));
    }
}

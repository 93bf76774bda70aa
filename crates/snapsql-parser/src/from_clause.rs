//! FROM (and USING) clause structuring (C7, spec §4.6).

use snapsql_ast::from::{classify_join_keywords, FromClause, JoinKind, TableContext, TableRef};
use snapsql_errors::{ErrorKind, SnapSqlError};
use snapsql_helpers::Position;
use snapsql_token::{Token, TokenKind};

const JOIN_KEYWORDS: &[&str] = &["NATURAL", "LEFT", "RIGHT", "FULL", "INNER", "OUTER", "CROSS", "JOIN"];

fn is_join_keyword_token(tok: &Token) -> bool {
    JOIN_KEYWORDS.iter().any(|w| tok.lexeme.eq_ignore_ascii_case(w))
}

/// One FROM-list slot: the join-keyword tokens (empty for the first table)
/// and the table-reference tokens that follow, up to (not including) the
/// condition.
struct Slot<'a> {
    join_tokens: Vec<&'a Token>,
    table_tokens: &'a [Token],
    condition_tokens: &'a [Token],
}

/// Splits a FROM/USING body into join slots at top-level JOIN-keyword runs
/// and top-level commas (spec §4.6 — a bare comma is rejected as implicit
/// inner join rather than silently accepted).
fn split_slots(body: &[Token]) -> Result<Vec<Slot<'_>>, SnapSqlError> {
    let mut slots = Vec::new();
    let mut depth = 0i32;
    let code: Vec<usize> = body.iter().enumerate().filter(|(_, t)| t.is_code()).map(|(i, _)| i).collect();

    let mut slot_starts = vec![0usize];
    let mut in_join_run = false;
    let mut i = 0usize;
    while i < code.len() {
        let idx = code[i];
        match body[idx].kind {
            TokenKind::OpenedParens => {
                depth += 1;
                in_join_run = false;
            }
            TokenKind::ClosedParens => {
                depth -= 1;
                in_join_run = false;
            }
            TokenKind::Comma if depth == 0 => {
                return Err(SnapSqlError::new(
                    ErrorKind::InvalidForSnapSql,
                    "implicit inner joins via comma are not supported; use an explicit JOIN",
                )
                .with_position(body[idx].position));
            }
            _ if depth == 0 && is_join_keyword_token(&body[idx]) => {
                if !in_join_run {
                    // A fresh run of join keywords starts a new slot, unless
                    // it's the leading run before slot 0's table.
                    if idx != 0 {
                        slot_starts.push(idx);
                    }
                    in_join_run = true;
                }
            }
            _ => {
                in_join_run = false;
            }
        }
        i += 1;
    }
    slot_starts.push(body.len());

    for w in slot_starts.windows(2) {
        let (start, end) = (w[0], w[1]);
        if start == end {
            continue;
        }
        let chunk = &body[start..end];
        let chunk_code: Vec<usize> = chunk.iter().enumerate().filter(|(_, t)| t.is_code()).map(|(i, _)| i).collect();
        let mut p = 0usize;
        let mut join_tokens = Vec::new();
        while p < chunk_code.len() && is_join_keyword_token(&chunk[chunk_code[p]]) {
            join_tokens.push(&chunk[chunk_code[p]]);
            p += 1;
        }
        let table_start_rel = chunk_code.get(p).copied().unwrap_or(chunk.len());

        // Find ON/USING at depth 0 within the remaining chunk to split the
        // table reference from its join condition.
        let mut cond_depth = 0i32;
        let mut cond_start = chunk.len();
        for &ci in &chunk_code[p..] {
            match chunk[ci].kind {
                TokenKind::OpenedParens => cond_depth += 1,
                TokenKind::ClosedParens => cond_depth -= 1,
                TokenKind::On | TokenKind::Using if cond_depth == 0 => {
                    cond_start = ci;
                    break;
                }
                _ => {}
            }
        }

        slots.push(Slot {
            join_tokens,
            table_tokens: &chunk[table_start_rel..cond_start],
            condition_tokens: &chunk[cond_start..],
        });
    }

    Ok(slots)
}

/// Parses one table-reference slot's tokens into a [`TableRef`] (spec
/// §4.6): `ident`, `schema.ident`, or `(subquery) AS alias`.
fn parse_table_ref(tokens: &[Token], context: TableContext) -> Result<TableRef, SnapSqlError> {
    let code: Vec<usize> = tokens.iter().enumerate().filter(|(_, t)| t.is_code()).map(|(i, _)| i).collect();
    let position = Position::from_children(tokens.iter().map(|t| &t.position)).unwrap_or_default();

    if code.is_empty() {
        return Err(SnapSqlError::new(ErrorKind::InvalidSql, "expected a table reference").with_position(position));
    }

    if tokens[code[0]].kind == TokenKind::OpenedParens {
        // (subquery) [AS] alias — alias is mandatory.
        let mut depth = 1i32;
        let mut close_rel = 1usize;
        while close_rel < code.len() && depth > 0 {
            match tokens[code[close_rel]].kind {
                TokenKind::OpenedParens => depth += 1,
                TokenKind::ClosedParens => depth -= 1,
                _ => {}
            }
            if depth > 0 {
                close_rel += 1;
            }
        }
        let after = &code[close_rel + 1..];
        let alias_idx = if after.first().map(|&i| tokens[i].kind) == Some(TokenKind::As) {
            after.get(1)
        } else {
            after.first()
        };
        let Some(&alias_tok) = alias_idx else {
            return Err(SnapSqlError::new(
                ErrorKind::InvalidForSnapSql,
                "subquery in FROM requires an alias",
            )
            .with_position(position));
        };
        let alias = tokens[alias_tok].lexeme.to_string();
        let subquery_tokens = tokens[code[0] + 1..code[close_rel]].to_vec();
        return Ok(TableRef {
            name_in_query: alias.clone(),
            real_name: alias.clone(),
            schema: None,
            cte_or_subquery_alias: Some(alias),
            is_subquery: true,
            subquery_ref: None,
            subquery_tokens,
            join: JoinKind::None,
            join_condition: Vec::new(),
            context,
            position,
        });
    }

    // ident | schema.ident, optional [AS] alias.
    let name_idx = code[0];
    let mut next = 1usize;
    let mut schema = None;
    let mut real_name = tokens[name_idx].lexeme.to_string();
    if code.len() > 2 && tokens[code[1]].kind == TokenKind::Dot {
        schema = Some(real_name);
        real_name = tokens[code[2]].lexeme.to_string();
        next = 3;
    }

    let mut name_in_query = real_name.clone();
    if code.len() > next {
        let alias_idx = if tokens[code[next]].kind == TokenKind::As {
            code.get(next + 1)
        } else {
            code.get(next)
        };
        if let Some(&idx) = alias_idx {
            name_in_query = tokens[idx].lexeme.to_string();
        }
    }

    Ok(TableRef {
        name_in_query,
        real_name,
        schema,
        cte_or_subquery_alias: None,
        is_subquery: false,
        subquery_ref: None,
        subquery_tokens: Vec::new(),
        join: JoinKind::None,
        join_condition: Vec::new(),
        context,
        position,
    })
}

/// Builds a [`FromClause`] from a FROM clause's body tokens (spec §4.6).
pub fn build_from_clause(body: &[Token]) -> (FromClause, Vec<SnapSqlError>) {
    let mut errors = Vec::new();
    let mut clause = FromClause::default();

    let slots = match split_slots(body) {
        Ok(slots) => slots,
        Err(e) => {
            errors.push(e);
            return (clause, errors);
        }
    };

    for (i, slot) in slots.iter().enumerate() {
        let context = if i == 0 { TableContext::Main } else { TableContext::Join };
        let mut table = match parse_table_ref(slot.table_tokens, context) {
            Ok(t) => t,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };

        if i == 0 {
            table.join = JoinKind::None;
        } else {
            let words: Vec<&str> = slot.join_tokens.iter().map(|t| t.lexeme.as_str()).collect();
            let join = classify_join_keywords(&words);
            if join == JoinKind::Invalid {
                errors.push(
                    SnapSqlError::new(
                        ErrorKind::InvalidSql,
                        format!("invalid join keyword sequence `{}`", words.join(" ")),
                    )
                    .with_position(table.position),
                );
            }
            table.join = join;
            table.join_condition = slot.condition_tokens.to_vec();

            if join.is_natural() {
                errors.push(
                    SnapSqlError::new(ErrorKind::InvalidForSnapSql, "NATURAL joins are not supported")
                        .with_position(table.position),
                );
            }

            let has_condition = slot
                .condition_tokens
                .iter()
                .any(|t| t.is_code());
            if join.requires_condition() && !has_condition {
                errors.push(
                    SnapSqlError::new(
                        ErrorKind::InvalidSql,
                        format!("{join} JOIN requires an ON or USING condition"),
                    )
                    .with_position(table.position),
                );
            }
            if join == JoinKind::Cross && has_condition {
                errors.push(
                    SnapSqlError::new(ErrorKind::InvalidSql, "CROSS JOIN cannot carry ON or USING")
                        .with_position(table.position),
                );
            }
        }

        clause.push(table);
    }

    (clause, errors)
}

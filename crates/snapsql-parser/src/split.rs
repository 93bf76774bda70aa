//! Statement discrimination and clause partitioning (C6 steps 2–3, spec §4.5).

use snapsql_ast::{ClauseKind, RawClause};
use snapsql_errors::{ErrorKind, SnapSqlError};
use snapsql_token::{Token, TokenKind};

/// The statement kind decided by scanning leading non-trivia keywords
/// (spec §4.5 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    InsertInto,
    Update,
    DeleteFrom,
}

fn next_code<'a>(tokens: &'a [Token], after: usize) -> Option<(usize, &'a Token)> {
    tokens[after..]
        .iter()
        .enumerate()
        .find(|(_, t)| t.is_code())
        .map(|(rel, t)| (after + rel, t))
}

fn lexeme_is(token: &Token, word: &str) -> bool {
    token.lexeme.eq_ignore_ascii_case(word)
}

/// Scans the leading keywords of `tokens` (skipping a leading `WITH ...`
/// clause's keyword itself is not needed here — WITH precedes all four
/// shapes) to decide the statement kind. Returns the code-token index of
/// the first keyword belonging to the discriminating clause (i.e. past any
/// leading `WITH`), so callers know where clause partitioning should treat
/// the "first clause after WITH" as starting.
pub fn discriminate(tokens: &[Token]) -> Result<(StatementKind, usize), SnapSqlError> {
    let Some((mut idx, first)) = next_code(tokens, 0) else {
        return Err(SnapSqlError::new(
            ErrorKind::InvalidSql,
            "empty statement",
        ));
    };

    if first.kind == TokenKind::With {
        // Skip the WITH clause body by finding the statement keyword that
        // follows the balanced CTE list — callers pass the clause-split
        // function the whole token stream, so discrimination only needs to
        // find *a* later keyword; the partitioner handles the WITH clause
        // body itself via paren-nesting.
        let mut depth = 0i32;
        let mut i = idx + 1;
        loop {
            let Some((j, tok)) = next_code(tokens, i) else {
                return Err(SnapSqlError::new(
                    ErrorKind::InvalidSql,
                    "WITH clause has no following statement",
                ));
            };
            match tok.kind {
                TokenKind::OpenedParens => depth += 1,
                TokenKind::ClosedParens => depth -= 1,
                TokenKind::Select | TokenKind::Insert | TokenKind::Update | TokenKind::Delete
                    if depth == 0 =>
                {
                    idx = j;
                    break;
                }
                _ => {}
            }
            i = j + 1;
        }
    }

    let Some((_, kw)) = next_code(tokens, idx) else {
        return Err(SnapSqlError::new(ErrorKind::InvalidSql, "missing statement keyword"));
    };

    let kind = match kw.kind {
        TokenKind::Select => StatementKind::Select,
        TokenKind::Insert => {
            let Some((_, into)) = next_code(tokens, idx + 1) else {
                return Err(SnapSqlError::new(ErrorKind::InvalidSql, "INSERT without INTO"));
            };
            if into.kind != TokenKind::Into && !lexeme_is(into, "INTO") {
                return Err(SnapSqlError::new(ErrorKind::InvalidSql, "INSERT must be followed by INTO"));
            }
            StatementKind::InsertInto
        }
        TokenKind::Update => StatementKind::Update,
        TokenKind::Delete => {
            let Some((_, from)) = next_code(tokens, idx + 1) else {
                return Err(SnapSqlError::new(ErrorKind::InvalidSql, "DELETE without FROM"));
            };
            if from.kind != TokenKind::From {
                return Err(SnapSqlError::new(ErrorKind::InvalidSql, "DELETE must be followed by FROM"));
            }
            StatementKind::DeleteFrom
        }
        _ => {
            return Err(SnapSqlError::new(
                ErrorKind::InvalidSql,
                "statement must begin with SELECT, INSERT INTO, UPDATE or DELETE FROM",
            ))
        }
    };

    Ok((kind, idx))
}

struct BoundaryMatch {
    kind: ClauseKind,
    code_len: usize,
}

fn match_boundary(code_idx: &[usize], tokens: &[Token], p: usize) -> Option<BoundaryMatch> {
    let at = |off: usize| code_idx.get(p + off).map(|&i| &tokens[i]);
    let first = at(0)?;

    macro_rules! two_word {
        ($a:expr, $b:expr, $kind:expr) => {
            if lexeme_is(first, $a) {
                if let Some(second) = at(1) {
                    if lexeme_is(second, $b) {
                        return Some(BoundaryMatch { kind: $kind, code_len: 2 });
                    }
                }
            }
        };
    }

    two_word!("DELETE", "FROM", ClauseKind::DeleteFrom);
    two_word!("INSERT", "INTO", ClauseKind::InsertInto);
    two_word!("GROUP", "BY", ClauseKind::GroupBy);
    two_word!("ORDER", "BY", ClauseKind::OrderBy);
    two_word!("ON", "CONFLICT", ClauseKind::OnConflict);

    let one = |word: &str, kind: ClauseKind| -> Option<BoundaryMatch> {
        if lexeme_is(first, word) {
            Some(BoundaryMatch { kind, code_len: 1 })
        } else {
            None
        }
    };

    one("WITH", ClauseKind::With)
        .or_else(|| one("SELECT", ClauseKind::Select))
        .or_else(|| one("FROM", ClauseKind::From))
        .or_else(|| one("WHERE", ClauseKind::Where))
        .or_else(|| one("HAVING", ClauseKind::Having))
        .or_else(|| one("LIMIT", ClauseKind::Limit))
        .or_else(|| one("OFFSET", ClauseKind::Offset))
        .or_else(|| one("FOR", ClauseKind::For))
        .or_else(|| one("VALUES", ClauseKind::Values))
        .or_else(|| one("UPDATE", ClauseKind::Update))
        .or_else(|| one("SET", ClauseKind::Set))
        .or_else(|| one("RETURNING", ClauseKind::Returning))
}

/// Splits a full statement's token slice into clauses at depth-0
/// clause-introducer keyword sequences (spec §4.5 step 3). The caller must
/// pass the whole statement (starting at `WITH` or the leading statement
/// keyword); the first clause boundary is expected at offset 0.
pub fn split_clauses(tokens: &[Token]) -> Vec<RawClause> {
    let code_idx: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_code())
        .map(|(i, _)| i)
        .collect();

    let mut boundaries: Vec<(usize, ClauseKind, usize)> = Vec::new(); // (start_tok_idx, kind, last_code_tok_idx)
    let mut depth = 0i32;
    let mut p = 0usize;

    while p < code_idx.len() {
        let tok_idx = code_idx[p];
        match tokens[tok_idx].kind {
            TokenKind::OpenedParens => depth += 1,
            TokenKind::ClosedParens => depth -= 1,
            _ => {}
        }
        if depth == 0 {
            if let Some(m) = match_boundary(&code_idx, tokens, p) {
                let last_code_tok_idx = code_idx[p + m.code_len - 1];
                boundaries.push((tok_idx, m.kind, last_code_tok_idx));
                p += m.code_len;
                continue;
            }
        }
        p += 1;
    }

    let mut clauses = Vec::with_capacity(boundaries.len());
    for (i, (start, kind, last_code)) in boundaries.iter().enumerate() {
        let heading_end = tokens[*last_code + 1..]
            .iter()
            .position(|t| t.is_code())
            .map(|rel| last_code + 1 + rel)
            .unwrap_or(tokens.len());
        let body_end = boundaries.get(i + 1).map(|b| b.0).unwrap_or(tokens.len());
        let heading = tokens[*start..heading_end].to_vec();
        let body = tokens[heading_end..body_end].to_vec();
        clauses.push(RawClause::new(*kind, heading, body));
    }
    clauses
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

    /// `SELECT id FROM users`
    fn simple_select() -> Vec<Token> {
        vec![
            tok(TokenKind::Select, "SELECT", 0),
            ws(6),
            tok(TokenKind::Identifier, "id", 7),
            ws(9),
            tok(TokenKind::From, "FROM", 10),
            ws(14),
            tok(TokenKind::Identifier, "users", 15),
        ]
    }

    #[test]
    fn discriminates_plain_select() {
        let tokens = simple_select();
        let (kind, idx) = discriminate(&tokens).unwrap();
        assert_eq!(kind, StatementKind::Select);
        assert_eq!(idx, 0);
    }

    #[test]
    fn splits_select_and_from_clauses() {
        let tokens = simple_select();
        let clauses = split_clauses(&tokens);
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].kind, ClauseKind::Select);
        assert_eq!(clauses[1].kind, ClauseKind::From);
        // Parse/format fidelity (spec invariant 1): concatenation round-trips.
        let rejoined: String = clauses
            .iter()
            .flat_map(|c| c.tokens())
            .map(|t| t.lexeme.as_str())
            .collect();
        let original: String = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(rejoined, original);
    }

    #[test]
    fn parens_hide_nested_clause_keywords() {
        // SELECT (SELECT 1 FROM inner WHERE x) FROM outer
        let tokens = vec![
            tok(TokenKind::Select, "SELECT", 0),
            ws(6),
            tok(TokenKind::OpenedParens, "(", 7),
            tok(TokenKind::Select, "SELECT", 8),
            ws(14),
            tok(TokenKind::Number, "1", 15),
            ws(16),
            tok(TokenKind::From, "FROM", 17),
            ws(21),
            tok(TokenKind::Identifier, "inner", 22),
            ws(27),
            tok(TokenKind::Where, "WHERE", 28),
            ws(33),
            tok(TokenKind::Identifier, "x", 34),
            tok(TokenKind::ClosedParens, ")", 35),
            ws(36),
            tok(TokenKind::From, "FROM", 37),
            ws(41),
            tok(TokenKind::Identifier, "outer", 42),
        ];
        let clauses = split_clauses(&tokens);
        // Only the outer SELECT/FROM are depth-0 boundaries.
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].kind, ClauseKind::Select);
        assert_eq!(clauses[1].kind, ClauseKind::From);
        assert!(clauses[0].body.iter().any(|t| t.kind == TokenKind::Where));
    }

    #[test]
    fn delete_from_discriminates_as_two_word_keyword() {
        let tokens = vec![
            tok(TokenKind::Delete, "DELETE", 0),
            ws(6),
            tok(TokenKind::From, "FROM", 7),
            ws(11),
            tok(TokenKind::Identifier, "users", 12),
        ];
        let (kind, _) = discriminate(&tokens).unwrap();
        assert_eq!(kind, StatementKind::DeleteFrom);
        let clauses = split_clauses(&tokens);
        assert_eq!(clauses[0].kind, ClauseKind::DeleteFrom);
    }
}

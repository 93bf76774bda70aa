//! Raw clause nodes (C6, spec §4.5 step 3): the heading keyword(s) plus the
//! body tokens before the next clause introducer, with the invariant that
//! heading and body are disjoint and together span the original clause
//! (spec §3 invariants).

use snapsql_helpers::Position;
use snapsql_token::Token;

/// Which clause-introducer keyword sequence this node was split on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ClauseKind {
    With,
    Select,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    Offset,
    For,
    InsertInto,
    Values,
    Update,
    Set,
    DeleteFrom,
    OnConflict,
    Returning,
}

/// One clause's raw token split (spec §4.5 step 3, §3 data model). Every
/// node built by the finalizer (C7) embeds one of these for faithful
/// re-emission.
#[derive(Debug, Clone, PartialEq)]
pub struct RawClause {
    pub kind: ClauseKind,
    /// The clause keyword(s) and any directly following whitespace.
    pub heading: Vec<Token>,
    /// Everything up to (not including) the next clause introducer.
    pub body: Vec<Token>,
    pub position: Position,
}

impl RawClause {
    pub fn new(kind: ClauseKind, heading: Vec<Token>, body: Vec<Token>) -> Self {
        let position = Position::from_children(heading.iter().chain(&body).map(|t| &t.position))
            .unwrap_or_default();
        Self {
            kind,
            heading,
            body,
            position,
        }
    }

    /// Re-emits the original lexeme stream for this clause — heading then
    /// body, in order (spec §8 invariant 1, "parse/format fidelity").
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.heading.iter().chain(self.body.iter())
    }

    pub fn is_body_empty(&self) -> bool {
        !self.body.iter().any(|t| t.is_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapsql_token::TokenKind;

    fn pos(offset: u32) -> Position {
        Position::new(offset, 1, offset + 1, 1)
    }

    #[test]
    fn tokens_concatenate_heading_then_body() {
        let heading = vec![Token::new(TokenKind::Where, "WHERE", pos(0))];
        let body = vec![Token::new(TokenKind::Identifier, "x", pos(6))];
        let clause = RawClause::new(ClauseKind::Where, heading.clone(), body.clone());
        let all: Vec<&Token> = clause.tokens().collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].lexeme, "WHERE");
        assert_eq!(all[1].lexeme, "x");
    }
}

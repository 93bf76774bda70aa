//! Token model (C1). This crate owns no lexing logic — the tokenizer is an
//! upstream collaborator (spec §1, §6) — only the data shape every later
//! pass consumes.

use smol_str::SmolStr;
use snapsql_helpers::Position;

/// The finite set of token kinds the tokenizer is contracted to produce
/// (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    Whitespace,
    LineComment,
    BlockComment,
    String,
    Number,
    Boolean,
    Null,
    Identifier,
    ReservedIdentifier,
    ContextualIdentifier,
    Select,
    From,
    Where,
    Join,
    Left,
    Right,
    Full,
    Inner,
    Outer,
    Cross,
    Natural,
    On,
    Using,
    As,
    Group,
    By,
    Having,
    Order,
    Limit,
    Offset,
    For,
    Distinct,
    All,
    Rollup,
    Cube,
    Grouping,
    Sets,
    Case,
    When,
    Then,
    Else,
    End,
    With,
    Insert,
    Into,
    Values,
    Update,
    Set,
    Delete,
    Returning,
    Cast,
    Collate,
    Asc,
    Desc,
    Comma,
    Dot,
    DoubleColon,
    OpenedParens,
    ClosedParens,
    Equal,
    Minus,
    Plus,
    Multiply,
    Divide,
    Not,
    JsonOperator,
    DummyLiteral,
    Eof,
}

impl TokenKind {
    /// Whether this kind carries semantic content (as opposed to
    /// whitespace/comments that are preserved for faithful re-emission but
    /// skipped by structural matching).
    pub fn is_code(self) -> bool {
        !matches!(
            self,
            TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment
        )
    }
}

/// The five directive shapes a `BLOCK_COMMENT` token may additionally carry
/// (spec §6, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    /// `/*= expr */`
    Variable,
    /// `/*$ expr */`
    Const,
    /// `/*@ expr */`
    Env,
    /// `/*# if/elseif/else/for */`
    ControlFlow,
    /// `/*# end */`
    ControlFlowEnd,
}

/// One token as produced by the upstream tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: SmolStr,
    pub position: Position,
    pub directive: Option<DirectiveKind>,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<SmolStr>, position: Position) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            position,
            directive: None,
        }
    }

    pub fn with_directive(mut self, directive: DirectiveKind) -> Self {
        self.directive = Some(directive);
        self
    }

    pub fn is_code(&self) -> bool {
        self.kind.is_code()
    }

    /// Synthesizes the `DummyLiteral` token inserted after a variable/const
    /// directive (spec §4.5 step 1). `expr_text` is the directive's
    /// expression source, carried in the synthetic token's lexeme so later
    /// passes can recover which directive produced it.
    pub fn dummy_literal(expr_text: impl Into<SmolStr>, position: Position) -> Self {
        Token::new(TokenKind::DummyLiteral, expr_text, position)
    }
}

/// A cursor-friendly view over a token slice, used by every structural pass
/// (C6–C9) — mirrors the `is_code`/position-scanning idioms the teacher's
/// `root_parse_events` uses over its own `Token` type.
#[derive(Debug, Clone, Copy)]
pub struct TokenStream<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TokenStream<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn as_slice(&self) -> &'a [Token] {
        &self.tokens[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    pub fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    pub fn peek_code(&self) -> Option<&'a Token> {
        self.tokens[self.pos..].iter().find(|t| t.is_code())
    }

    pub fn advance(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// Index of the first code token in `tokens`, or `tokens.len()` if none.
    pub fn first_code_index(tokens: &[Token]) -> usize {
        tokens.iter().position(|t| t.is_code()).unwrap_or(tokens.len())
    }

    /// Index one past the last code token in `tokens`, or `0` if none.
    pub fn last_code_index_exclusive(tokens: &[Token]) -> usize {
        tokens
            .iter()
            .rposition(|t| t.is_code())
            .map_or(0, |idx| idx + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(offset: u32) -> Position {
        Position::new(offset, 1, offset + 1, 1)
    }

    #[test]
    fn is_code_excludes_trivia() {
        assert!(!TokenKind::Whitespace.is_code());
        assert!(!TokenKind::BlockComment.is_code());
        assert!(TokenKind::Select.is_code());
    }

    #[test]
    fn stream_finds_first_and_last_code_token() {
        let tokens = vec![
            Token::new(TokenKind::Whitespace, " ", pos(0)),
            Token::new(TokenKind::Select, "SELECT", pos(1)),
            Token::new(TokenKind::Identifier, "id", pos(8)),
            Token::new(TokenKind::Whitespace, " ", pos(10)),
        ];
        assert_eq!(TokenStream::first_code_index(&tokens), 1);
        assert_eq!(TokenStream::last_code_index_exclusive(&tokens), 3);
    }
}

//! FROM-clause structuring (C7, spec §4.6): table references and joins.

use crate::NodeId;
use snapsql_helpers::Position;
use snapsql_token::Token;

/// The mapped join type for one FROM-list slot (spec §4.6). `Invalid`
/// covers token sequences that don't map to a legal join (e.g. `INNER
/// OUTER`); `Natural*` variants parse but are flagged downstream as
/// unsupported (spec §4.6, `ErrNaturalJoin`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "PascalCase")]
pub enum JoinKind {
    /// The first table in the FROM list — no join keyword precedes it.
    None,
    Inner,
    Left,
    Right,
    Full,
    Cross,
    Natural,
    NaturalLeft,
    NaturalRight,
    NaturalFull,
    Invalid,
}

impl JoinKind {
    pub fn is_natural(self) -> bool {
        matches!(
            self,
            JoinKind::Natural | JoinKind::NaturalLeft | JoinKind::NaturalRight | JoinKind::NaturalFull
        )
    }

    pub fn requires_condition(self) -> bool {
        !matches!(self, JoinKind::None | JoinKind::Cross) && !self.is_natural()
    }
}

/// Which syntactic context a table reference appeared in (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableContext {
    Main,
    Join,
    Cte,
    Subquery,
}

/// One FROM-list / JOIN-list entry (spec §3 "Table reference").
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    /// The name this table is addressed by in the query: its alias if any,
    /// else its real name.
    pub name_in_query: String,
    pub real_name: String,
    pub schema: Option<String>,
    /// Set when this reference is a CTE or subquery alias.
    pub cte_or_subquery_alias: Option<String>,
    pub is_subquery: bool,
    pub subquery_ref: Option<NodeId>,
    /// The subquery's own token span (parens stripped), set only when
    /// `is_subquery` — kept here rather than discarded so the scope
    /// analyzer (C8) can structure it into the statement arena (spec §4.7
    /// "Construction").
    pub subquery_tokens: Vec<Token>,
    pub join: JoinKind,
    /// Tokens of the `ON …` / `USING (…)` condition, if any.
    pub join_condition: Vec<Token>,
    pub context: TableContext,
    pub position: Position,
}

impl TableRef {
    pub fn table(real_name: impl Into<String>, position: Position) -> Self {
        let real_name = real_name.into();
        Self {
            name_in_query: real_name.clone(),
            real_name,
            schema: None,
            cte_or_subquery_alias: None,
            is_subquery: false,
            subquery_ref: None,
            subquery_tokens: Vec::new(),
            join: JoinKind::None,
            join_condition: Vec::new(),
            context: TableContext::Main,
            position,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.name_in_query = alias.into();
        self
    }
}

/// The fully structured FROM clause: an ordered list of table references,
/// the first with `JoinKind::None`, each subsequent one carrying its join
/// type relative to the preceding entry (spec §3).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FromClause {
    pub tables: Vec<TableRef>,
}

impl FromClause {
    pub fn push(&mut self, table: TableRef) {
        self.tables.push(table);
    }
}

/// Parses a join-keyword-token-sequence slot into a [`JoinKind`] (spec
/// §4.6): `NATURAL` must be first or absent; `NATURAL CROSS` is invalid;
/// `OUTER` must be preceded by LEFT/RIGHT/FULL; `INNER OUTER`/`CROSS
/// OUTER` are invalid; bare `OUTER` is invalid.
pub fn classify_join_keywords(keywords: &[&str]) -> JoinKind {
    let upper: Vec<String> = keywords.iter().map(|k| k.to_ascii_uppercase()).collect();
    let words: Vec<&str> = upper.iter().map(String::as_str).collect();

    let natural = words.first() == Some(&"NATURAL");
    let rest: &[&str] = if natural { &words[1..] } else { &words };

    match rest {
        [] if natural => JoinKind::Natural,
        ["CROSS"] if natural => JoinKind::Invalid, // NATURAL CROSS is invalid
        ["JOIN"] if natural => JoinKind::Natural,
        ["LEFT", "JOIN"] if natural => JoinKind::NaturalLeft,
        ["RIGHT", "JOIN"] if natural => JoinKind::NaturalRight,
        ["FULL", "JOIN"] if natural => JoinKind::NaturalFull,
        ["LEFT", "OUTER", "JOIN"] if natural => JoinKind::NaturalLeft,
        ["RIGHT", "OUTER", "JOIN"] if natural => JoinKind::NaturalRight,
        ["FULL", "OUTER", "JOIN"] if natural => JoinKind::NaturalFull,
        [] => JoinKind::Invalid,
        ["JOIN"] => JoinKind::Inner,
        ["INNER", "JOIN"] => JoinKind::Inner,
        ["LEFT", "JOIN"] => JoinKind::Left,
        ["LEFT", "OUTER", "JOIN"] => JoinKind::Left,
        ["RIGHT", "JOIN"] => JoinKind::Right,
        ["RIGHT", "OUTER", "JOIN"] => JoinKind::Right,
        ["FULL", "JOIN"] => JoinKind::Full,
        ["FULL", "OUTER", "JOIN"] => JoinKind::Full,
        ["CROSS", "JOIN"] => JoinKind::Cross,
        ["OUTER", "JOIN"] => JoinKind::Invalid, // OUTER alone is invalid
        ["INNER", "OUTER", "JOIN"] => JoinKind::Invalid,
        ["CROSS", "OUTER", "JOIN"] => JoinKind::Invalid,
        _ => JoinKind::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_plain_and_outer_joins() {
        assert_eq!(classify_join_keywords(&["JOIN"]), JoinKind::Inner);
        assert_eq!(classify_join_keywords(&["LEFT", "JOIN"]), JoinKind::Left);
        assert_eq!(classify_join_keywords(&["LEFT", "OUTER", "JOIN"]), JoinKind::Left);
        assert_eq!(classify_join_keywords(&["CROSS", "JOIN"]), JoinKind::Cross);
    }

    #[test]
    fn rejects_invalid_outer_combinations() {
        assert_eq!(classify_join_keywords(&["OUTER", "JOIN"]), JoinKind::Invalid);
        assert_eq!(classify_join_keywords(&["INNER", "OUTER", "JOIN"]), JoinKind::Invalid);
        assert_eq!(classify_join_keywords(&["CROSS", "OUTER", "JOIN"]), JoinKind::Invalid);
        assert_eq!(classify_join_keywords(&["NATURAL", "CROSS"]), JoinKind::Invalid);
    }

    #[test]
    fn natural_family_parses_but_is_flagged_by_downstream() {
        let kind = classify_join_keywords(&["NATURAL", "LEFT", "JOIN"]);
        assert_eq!(kind, JoinKind::NaturalLeft);
        assert!(kind.is_natural());
    }

    #[test]
    fn cross_join_never_requires_a_condition() {
        assert!(!JoinKind::Cross.requires_condition());
        assert!(JoinKind::Inner.requires_condition());
    }
}

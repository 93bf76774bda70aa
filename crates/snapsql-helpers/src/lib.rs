//! Shared, dependency-light helpers used across every `snapsql-*` crate.

use std::hash::BuildHasherDefault;

/// `ahash`-keyed [`indexmap::IndexMap`] — preserves insertion order while
/// keeping lookups fast. Parameter schemas (C4) and field-source tables
/// (C8) rely on the ordering guarantee, not just the hashing speed.
pub type IndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<ahash::AHasher>>;
/// `ahash`-keyed [`indexmap::IndexSet`].
pub type IndexSet<V> = indexmap::IndexSet<V, BuildHasherDefault<ahash::AHasher>>;

/// Small builder idiom: `value.config(|v| v.field = x)`.
pub trait Config: Sized {
    fn config(mut self, f: impl FnOnce(&mut Self)) -> Self {
        f(&mut self);
        self
    }
}

impl<T> Config for T {}

/// A location within a source file: rune offset (0-based), line and column
/// (1-based), and the run length in runes. Every AST/token node carries one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub offset: u32,
    pub line: u32,
    pub column: u32,
    pub length: u32,
}

impl Position {
    pub const fn new(offset: u32, line: u32, column: u32, length: u32) -> Self {
        Self {
            offset,
            line,
            column,
            length,
        }
    }

    /// A zero-length marker at this position, useful for synthetic nodes.
    pub const fn point(offset: u32, line: u32, column: u32) -> Self {
        Self::new(offset, line, column, 0)
    }

    /// The position immediately following this one, inferring the new
    /// line/column by scanning `raw` for newlines (1-indexed columns).
    pub fn advance(&self, raw: &str) -> Position {
        if raw.is_empty() {
            return Position::point(self.offset, self.line, self.column + self.length);
        }
        let newlines = raw.bytes().filter(|&b| b == b'\n').count() as u32;
        let column = if newlines == 0 {
            self.column + self.length + raw.chars().count() as u32
        } else {
            raw.rsplit('\n').next().map(|s| s.chars().count()).unwrap_or(0) as u32 + 1
        };
        Position::point(
            self.offset + self.length,
            self.line + newlines,
            column,
        )
    }

    /// Merge a set of child positions into the smallest span covering all of them.
    pub fn from_children<'a>(children: impl Iterator<Item = &'a Position>) -> Option<Position> {
        let mut start: Option<Position> = None;
        let mut end_offset = 0u32;
        for child in children {
            end_offset = end_offset.max(child.offset + child.length);
            start = match start {
                None => Some(*child),
                Some(s) if child.offset < s.offset => Some(*child),
                Some(s) => Some(s),
            };
        }
        start.map(|s| Position::new(s.offset, s.line, s.column, end_offset - s.offset))
    }
}

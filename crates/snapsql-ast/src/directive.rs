//! Directive node hierarchy (C9, spec §4.8): the typed form directives take
//! once attached to the AST, after C6 has recognized them as block comments
//! carrying a [`snapsql_token::DirectiveKind`].

use crate::NodeId;
use snapsql_helpers::Position;
use snapsql_pathlang::PathExpr;

/// A parsed, attached directive node (spec §3 "Directive node", §4.8).
#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveNode {
    /// `/*= expr */` — substitutes a bound parameter, followed by a
    /// `DummyLiteral` token the directive owns (spec §4.5 step 1).
    VariableSubstitution {
        expr: PathExpr,
        expr_text: String,
        dummy_node: NodeId,
        position: Position,
    },
    /// `/*$ expr */` — substitutes a compile-time constant, never bound at
    /// runtime.
    ConstSubstitution {
        expr: PathExpr,
        expr_text: String,
        dummy_node: NodeId,
        position: Position,
    },
    /// `/*@ name */` — references an environment variable.
    EnvironmentReference {
        name: String,
        dummy_node: NodeId,
        position: Position,
    },
    /// `/*# if cond */ ... /*# elseif cond */ ... /*# else */ ... /*# end */`
    If {
        cond_text: String,
        elseifs: Vec<(String, NodeId)>,
        has_else: bool,
        body: NodeId,
        end: NodeId,
        position: Position,
    },
    /// `/*# for v : list */ ... /*# end */`
    For {
        var: String,
        list_text: String,
        body: NodeId,
        end: NodeId,
        position: Position,
    },
    /// The matching `/*# end */` for an `If`/`For` node, referenced by ID
    /// rather than nested, so the directive stack (below) can validate
    /// nesting in one linear pass over flat tokens.
    End { position: Position },
}

impl DirectiveNode {
    pub fn position(&self) -> Position {
        match self {
            DirectiveNode::VariableSubstitution { position, .. }
            | DirectiveNode::ConstSubstitution { position, .. }
            | DirectiveNode::EnvironmentReference { position, .. }
            | DirectiveNode::If { position, .. }
            | DirectiveNode::For { position, .. }
            | DirectiveNode::End { position } => *position,
        }
    }
}

/// What kind of opener a directive-nesting stack frame represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenerKind {
    If,
    For,
}

/// Raised by [`DirectiveStack`] when `/*# end */` directives don't nest
/// correctly against their openers (spec §4.8 `ErrMismatchedDirective`,
/// invariant 7 "directive nesting").
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectiveStackError {
    #[error("`/*# end */` at offset {offset} has no matching if/for directive")]
    UnmatchedEnd { offset: u32 },
    #[error("directive opened at offset {opener_offset} was never closed")]
    UnclosedOpener { opener_offset: u32 },
}

/// Validates that `/*# if */`/`/*# for */` openers and `/*# end */` closers
/// nest correctly, tracking position so errors can be rendered.
#[derive(Debug, Default)]
pub struct DirectiveStack {
    frames: Vec<(OpenerKind, u32)>,
}

impl DirectiveStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_if(&mut self, offset: u32) {
        self.frames.push((OpenerKind::If, offset));
    }

    pub fn push_for(&mut self, offset: u32) {
        self.frames.push((OpenerKind::For, offset));
    }

    /// Pops the innermost opener for a matching `/*# end */`. Errors if the
    /// stack is empty — an end with nothing open.
    pub fn pop_end(&mut self, end_offset: u32) -> Result<(), DirectiveStackError> {
        if self.frames.pop().is_none() {
            return Err(DirectiveStackError::UnmatchedEnd { offset: end_offset });
        }
        Ok(())
    }

    /// Called once all directives in a statement have been scanned: any
    /// remaining frame means an opener was never closed.
    pub fn finish(self) -> Result<(), DirectiveStackError> {
        if let Some((_, opener_offset)) = self.frames.into_iter().next() {
            return Err(DirectiveStackError::UnclosedOpener { opener_offset });
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_if_for_nesting_succeeds() {
        let mut stack = DirectiveStack::new();
        stack.push_if(0);
        stack.push_for(10);
        stack.pop_end(20).unwrap();
        stack.pop_end(30).unwrap();
        stack.finish().unwrap();
    }

    #[test]
    fn end_with_nothing_open_is_an_error() {
        let mut stack = DirectiveStack::new();
        assert_eq!(
            stack.pop_end(5),
            Err(DirectiveStackError::UnmatchedEnd { offset: 5 })
        );
    }

    #[test]
    fn unclosed_opener_is_an_error() {
        let mut stack = DirectiveStack::new();
        stack.push_if(0);
        assert_eq!(
            stack.finish(),
            Err(DirectiveStackError::UnclosedOpener { opener_offset: 0 })
        );
    }
}

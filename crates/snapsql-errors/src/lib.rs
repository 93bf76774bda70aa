//! Structured error model for the snapsql template compiler (spec §7).
//!
//! Every pass reports through [`ErrorKind`]/[`SnapSqlError`] and accumulates
//! into an [`ErrorContainer`] rather than failing fast, so one run can
//! surface many diagnostics at once.

use snapsql_helpers::Position;
use std::fmt;
use thiserror::Error;

/// The closed set of error categories a pass can raise (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "PascalCase")]
pub enum ErrorKind {
    InvalidSql,
    /// Legal SQL but not supported by the template system.
    InvalidForSnapSql,
    InvalidExpression,
    InvalidParameterName,
    InvalidNamingConvention,
    InvalidParameterValue,
    CommonTypeNotFound,
    CommonTypeFileNotFound,
    CircularDependency,
    CircularCommonType,
    NodeNotFound,
    ScopeNotFound,
    FieldSourceNotFound,
    FieldNotAccessible,
    ScopeViolation,
    MismatchedDirective,
    MismatchedParens,
    MismatchedQuotes,
    ConstraintViolation,
    DummyDataGeneration,
    UnsupportedParameterType,
    ParameterValidation,
    UnresolvedReference,
    TypeIncompatibility,
}

/// How strongly an error should affect the surrounding pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Recorded, the pass continues.
    Warning,
    /// Recorded, the pass continues but the overall compile will fail.
    Error,
    /// The pass stops immediately.
    Fatal,
}

impl ErrorKind {
    /// The default severity for this kind absent an explicit override —
    /// directive-placement violations are FATAL, everything else is ERROR
    /// (spec §7).
    pub fn default_severity(self) -> Severity {
        match self {
            ErrorKind::MismatchedDirective => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

/// One structured, user-facing parse error (spec §7).
#[derive(Debug, Clone, Error)]
#[error("{}", self.render())]
pub struct SnapSqlError {
    pub kind: ErrorKind,
    pub message: String,
    pub position: Option<Position>,
    pub severity: Severity,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
    pub related: Vec<String>,
}

impl SnapSqlError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let severity = kind.default_severity();
        Self {
            kind,
            message: message.into(),
            position: None,
            severity,
            context: None,
            suggestions: Vec::new(),
            related: Vec::new(),
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_related(mut self, id: impl Into<String>) -> Self {
        self.related.push(id.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Renders per the normative example in spec §7:
    /// `[<kind>] <message> at <file>:<line>:<col>\nContext: <snippet>\nSuggestions:\n  - …\nRelated: <ids>`
    pub fn render(&self) -> String {
        let mut out = format!("[{}] {}", self.kind, self.message);
        if let Some(pos) = self.position {
            out.push_str(&format!(" at {}:{}", pos.line, pos.column));
        }
        if let Some(ctx) = &self.context {
            out.push_str(&format!("\nContext: {ctx}"));
        }
        if !self.suggestions.is_empty() {
            out.push_str("\nSuggestions:");
            for s in &self.suggestions {
                out.push_str(&format!("\n  - {s}"));
            }
        }
        if !self.related.is_empty() {
            out.push_str(&format!("\nRelated: {}", self.related.join(", ")));
        }
        out
    }

    /// Convenience constructor matching the common "matches a regex" check
    /// the teacher's own test helpers use (`SQLParseError::matches`).
    pub fn matches(&self, needle: &str) -> bool {
        self.message.contains(needle)
    }
}

/// An ordered, multi-error accumulator. Between passes, a non-empty
/// container halts the pipeline; within a pass, errors accumulate so one
/// run can surface as many diagnostics as possible (spec §7).
#[derive(Debug, Clone, Default)]
pub struct ErrorContainer {
    errors: Vec<SnapSqlError>,
}

impl ErrorContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: SnapSqlError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = SnapSqlError>) {
        self.errors.extend(errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnapSqlError> {
        self.errors.iter()
    }

    pub fn into_vec(self) -> Vec<SnapSqlError> {
        self.errors
    }

    /// True if any recorded error is FATAL or ERROR (not just WARNING).
    pub fn has_blocking(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.severity != Severity::Warning)
    }

    /// Fold `self` into a `Result`, consuming it — `Ok(value)` if nothing
    /// blocking was recorded, `Err(self)` otherwise. Warnings-only
    /// containers are dropped on the `Ok` path; callers that need to
    /// surface warnings should inspect the container before calling this.
    pub fn into_result<T>(self, value: T) -> Result<T, ErrorContainer> {
        if self.has_blocking() {
            Err(self)
        } else {
            Ok(value)
        }
    }
}

impl fmt::Display for ErrorContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err.render())?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorContainer {}

impl FromIterator<SnapSqlError> for ErrorContainer {
    fn from_iter<T: IntoIterator<Item = SnapSqlError>>(iter: T) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_matches_normative_format() {
        let err = SnapSqlError::new(ErrorKind::InvalidForSnapSql, "asterisk is not allowed")
            .with_position(Position::new(7, 1, 8, 1))
            .with_context("SELECT * FROM users")
            .with_suggestion("list columns explicitly")
            .with_related("field#0");

        let rendered = err.render();
        assert!(rendered.starts_with("[InvalidForSnapSql] asterisk is not allowed at 1:8"));
        assert!(rendered.contains("Context: SELECT * FROM users"));
        assert!(rendered.contains("- list columns explicitly"));
        assert!(rendered.contains("Related: field#0"));
    }

    #[test]
    fn container_blocks_on_error_but_not_warning() {
        let mut container = ErrorContainer::new();
        container.push(
            SnapSqlError::new(ErrorKind::InvalidSql, "warn me").with_severity(Severity::Warning),
        );
        assert!(!container.has_blocking());

        container.push(SnapSqlError::new(ErrorKind::InvalidSql, "stop"));
        assert!(container.has_blocking());
        assert!(container.into_result(()).is_err());
    }

    #[test]
    fn mismatched_directive_defaults_to_fatal() {
        assert_eq!(
            ErrorKind::MismatchedDirective.default_severity(),
            Severity::Fatal
        );
        assert_eq!(ErrorKind::InvalidSql.default_severity(), Severity::Error);
    }
}

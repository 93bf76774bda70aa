//! PathLang parser and validator (C2, spec §4.1).
//!
//! ```text
//! expr       := identifier ( safe? ( '.' identifier | '[' integer ']' ) )*
//! identifier := (letter|'_') (letter|digit|'_')*
//! integer    := digit+
//! safe       := '?'
//! ```

use snapsql_errors::{ErrorKind, SnapSqlError};
use snapsql_helpers::{IndexMap, Position};
use snapsql_types::TypeNode;

/// One step of a parsed PathLang expression (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Identifier(String),
    Member { property: String, safe: bool },
    Index { index: u64, safe: bool },
}

/// A single parsed step with its source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionedStep {
    pub step: Step,
    pub position: Position,
}

/// A non-empty ordered sequence of steps whose first step is `Identifier`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    pub steps: Vec<PositionedStep>,
}

impl PathExpr {
    pub fn root_name(&self) -> &str {
        match &self.steps[0].step {
            Step::Identifier(name) => name,
            _ => unreachable!("first step is always Identifier"),
        }
    }
}

/// Parses `expr` to a [`PathExpr`]. `base_line`/`base_column` give the
/// 1-based location of `expr`'s first rune within the enclosing file, so
/// positions reported in [`PositionedStep`] are file-absolute.
pub fn parse(expr: &str, base_offset: u32, base_line: u32, base_column: u32) -> Result<PathExpr, SnapSqlError> {
    let chars: Vec<char> = expr.chars().collect();
    let mut idx = 0usize;
    let mut steps = Vec::new();

    let invalid = |msg: String, rune_idx: usize| {
        SnapSqlError::new(ErrorKind::InvalidExpression, msg).with_position(Position::new(
            base_offset + rune_idx as u32,
            base_line,
            base_column + rune_idx as u32,
            1,
        ))
    };

    let is_ident_start = |c: char| c.is_alphabetic() || c == '_';
    let is_ident_cont = |c: char| c.is_alphanumeric() || c == '_';

    if chars.is_empty() || !is_ident_start(chars[0]) {
        return Err(invalid(
            "expression must start with an identifier".to_string(),
            0,
        ));
    }

    let start = idx;
    while idx < chars.len() && is_ident_cont(chars[idx]) {
        idx += 1;
    }
    let name: String = chars[start..idx].iter().collect();
    steps.push(PositionedStep {
        step: Step::Identifier(name),
        position: Position::new(
            base_offset + start as u32,
            base_line,
            base_column + start as u32,
            (idx - start) as u32,
        ),
    });

    while idx < chars.len() {
        let step_start = idx;
        let safe = if chars[idx] == '?' {
            idx += 1;
            true
        } else {
            false
        };

        if idx >= chars.len() {
            return Err(invalid("dangling `?` with no following `.` or `[`".to_string(), step_start));
        }

        match chars[idx] {
            '.' => {
                idx += 1;
                let member_start = idx;
                if idx >= chars.len() || !is_ident_start(chars[idx]) {
                    return Err(invalid("expected identifier after `.`".to_string(), step_start));
                }
                while idx < chars.len() && is_ident_cont(chars[idx]) {
                    idx += 1;
                }
                let property: String = chars[member_start..idx].iter().collect();
                steps.push(PositionedStep {
                    step: Step::Member { property, safe },
                    position: Position::new(
                        base_offset + step_start as u32,
                        base_line,
                        base_column + step_start as u32,
                        (idx - step_start) as u32,
                    ),
                });
            }
            '[' => {
                idx += 1;
                let digit_start = idx;
                while idx < chars.len() && chars[idx].is_ascii_digit() {
                    idx += 1;
                }
                if idx == digit_start {
                    return Err(invalid("expected an integer index inside `[ ]`".to_string(), step_start));
                }
                let digits: String = chars[digit_start..idx].iter().collect();
                if idx >= chars.len() || chars[idx] != ']' {
                    return Err(invalid("unclosed `[`".to_string(), step_start));
                }
                idx += 1;
                let index: u64 = digits.parse().map_err(|_| {
                    invalid(format!("index `{digits}` is not a valid integer"), step_start)
                })?;
                steps.push(PositionedStep {
                    step: Step::Index { index, safe },
                    position: Position::new(
                        base_offset + step_start as u32,
                        base_line,
                        base_column + step_start as u32,
                        (idx - step_start) as u32,
                    ),
                });
            }
            _ => {
                if safe {
                    return Err(invalid("dangling `?` with no following `.` or `[`".to_string(), step_start));
                }
                return Err(invalid(format!("unexpected character `{}`", chars[idx]), idx));
            }
        }
    }

    Ok(PathExpr { steps })
}

/// Additional synthetic roots (e.g. `system`) available alongside the
/// parameter schema during validation.
pub type AdditionalRoots<'a> = IndexMap<String, &'a TypeNode>;

/// Validates a parsed path against a parameter type tree (spec §4.1). The
/// first unresolvable step halts validation for *this* path (later steps
/// in the same path are not reported) but callers should validate sibling
/// expressions independently.
pub fn validate(
    path: &PathExpr,
    roots: &IndexMap<String, TypeNode>,
    additional_roots: &AdditionalRoots,
) -> Vec<SnapSqlError> {
    let mut errors = Vec::new();
    let root_step = &path.steps[0];
    let Step::Identifier(root_name) = &root_step.step else {
        unreachable!()
    };

    let mut current: Option<&TypeNode> = roots
        .get(root_name)
        .or_else(|| additional_roots.get(root_name).copied());

    if current.is_none() {
        errors.push(
            SnapSqlError::new(
                ErrorKind::UnresolvedReference,
                format!("unknown root parameter {root_name}"),
            )
            .with_position(root_step.position),
        );
        return errors;
    }

    let mut path_so_far = root_name.clone();

    for positioned in &path.steps[1..] {
        let Some(ty) = current else {
            // Short-circuits per path once the type is Unknown (spec §4.1 rule 4).
            break;
        };

        match &positioned.step {
            Step::Member { property, .. } => match ty {
                TypeNode::Object(fields) => match fields.get(property) {
                    Some(field_ty) => {
                        path_so_far = format!("{path_so_far}.{property}");
                        current = Some(field_ty);
                    }
                    None => {
                        errors.push(
                            SnapSqlError::new(
                                ErrorKind::FieldSourceNotFound,
                                format!("unknown field {property} on parameter {path_so_far}"),
                            )
                            .with_position(positioned.position),
                        );
                        current = None;
                    }
                },
                other => {
                    errors.push(
                        SnapSqlError::new(
                            ErrorKind::TypeIncompatibility,
                            format!(
                                "cannot access member {property} on parameter {path_so_far} (type {})",
                                other.display_name()
                            ),
                        )
                        .with_position(positioned.position),
                    );
                    current = None;
                }
            },
            Step::Index { .. } => match ty {
                TypeNode::Array(elem) => {
                    path_so_far = format!("{path_so_far}[]");
                    current = Some(elem);
                }
                other => {
                    errors.push(
                        SnapSqlError::new(
                            ErrorKind::TypeIncompatibility,
                            format!(
                                "parameter {path_so_far} is not an array (type {})",
                                other.display_name()
                            ),
                        )
                        .with_position(positioned.position),
                    );
                    current = None;
                }
            },
            Step::Identifier(_) => unreachable!("only the first step is Identifier"),
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use snapsql_types::ScalarKind;

    fn roots() -> IndexMap<String, TypeNode> {
        let mut m = IndexMap::default();
        m.insert(
            "user".to_string(),
            TypeNode::Object(
                [
                    ("name".to_string(), TypeNode::Scalar(ScalarKind::String)),
                    (
                        "tags".to_string(),
                        TypeNode::array_of(TypeNode::Scalar(ScalarKind::String)),
                    ),
                ]
                .into_iter()
                .collect(),
            ),
        );
        m
    }

    #[test]
    fn parses_dotted_and_indexed_path() {
        let parsed = parse("a.b[0].c", 0, 1, 1).unwrap();
        assert_eq!(
            parsed.steps.iter().map(|s| s.step.clone()).collect::<Vec<_>>(),
            vec![
                Step::Identifier("a".to_string()),
                Step::Member { property: "b".to_string(), safe: false },
                Step::Index { index: 0, safe: false },
                Step::Member { property: "c".to_string(), safe: false },
            ]
        );
    }

    #[test]
    fn safe_operator_sets_flag_and_spans_leading_question_mark() {
        let parsed = parse("a?.b", 0, 1, 1).unwrap();
        assert_eq!(
            parsed.steps[1].step,
            Step::Member { property: "b".to_string(), safe: true }
        );
        assert_eq!(parsed.steps[1].position.column, 2);
        assert_eq!(parsed.steps[1].position.length, 3); // "?.b"
    }

    #[test]
    fn position_monotonicity_and_length_sum() {
        let expr = "abc.def[12]";
        let parsed = parse(expr, 0, 1, 1).unwrap();
        let mut last_end = 0u32;
        for step in &parsed.steps {
            assert!(step.position.offset >= last_end);
            last_end = step.position.offset + step.position.length;
        }
        assert_eq!(last_end, expr.chars().count() as u32);
    }

    #[test]
    fn s7_pathlang_errors() {
        assert!(parse("users[0", 0, 1, 1).is_err());
        assert!(parse("user?", 0, 1, 1).is_err());
        assert!(parse("1foo", 0, 1, 1).is_err());
    }

    #[test]
    fn validate_reports_unknown_root() {
        let path = parse("bogus.x", 0, 1, 1).unwrap();
        let errs = validate(&path, &roots(), &AdditionalRoots::default());
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ErrorKind::UnresolvedReference);
    }

    #[test]
    fn validate_accepts_member_and_index() {
        let path = parse("user.tags[0]", 0, 1, 1).unwrap();
        let errs = validate(&path, &roots(), &AdditionalRoots::default());
        assert!(errs.is_empty(), "{errs:?}");
    }

    #[test]
    fn validate_reports_member_on_non_object() {
        let path = parse("user.name.x", 0, 1, 1).unwrap();
        let errs = validate(&path, &roots(), &AdditionalRoots::default());
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ErrorKind::TypeIncompatibility);
    }
}

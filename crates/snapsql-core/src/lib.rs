//! Compilation facade (spec §1, §6): wires the function-definition loader
//! (C4), the clause structurer/finalizer/directive-integration passes
//! (C6/C7/C9), the scope and dependency-graph analyzer (C8), and the
//! expression environment (C5) into the single pipeline a downstream code
//! generator calls.
//!
//! [`compile`] is the only entry point this crate exposes: tokens plus a
//! parameter-schema YAML document go in, a [`CompiledTemplate`] — or a
//! blocking [`ErrorContainer`] — comes out.

use snapsql_ast::{DirectiveNode, NodeId, Statement};
use snapsql_errors::{ErrorContainer, SnapSqlError};
use snapsql_expr::ExprEnv;
use snapsql_funcdef::{common_types::Cache, FunctionDefinition};
use snapsql_helpers::IndexMap;
use snapsql_parser::Arena;
use snapsql_scope::Analysis;
use snapsql_token::Token;
use snapsql_types::TypeNode;
use std::path::Path;

/// The result of compiling one template: the loaded function definition,
/// the statement arena (main statement plus every CTE/subquery reached
/// while structuring it), the scope/dependency analysis, and any
/// non-blocking warnings collected along the way (spec §6 "Downstream
/// consumer").
#[derive(Debug)]
pub struct CompiledTemplate {
    pub function: FunctionDefinition,
    pub arena: Arena,
    pub root: NodeId,
    pub analysis: Analysis,
    pub warnings: Vec<SnapSqlError>,
}

/// Compiles a SQL template: loads `parameter_yaml` (C4), structures
/// `tokens` into an annotated statement tree (C6/C7/C9), analyzes its
/// scopes and dependency graph (C8), then type-checks every directive
/// expression against the parameter schema via a fresh [`ExprEnv`] per
/// statement (C5).
///
/// `base_dir` is the directory the template file lives in and
/// `project_root` bounds the ancestor search for `_common.yaml` files
/// (spec §4.3); pass the same path for both when common types are out of
/// scope.
pub fn compile(
    tokens: Vec<Token>,
    parameter_yaml: &str,
    fallback_name: &str,
    base_dir: &Path,
    project_root: &Path,
) -> Result<CompiledTemplate, ErrorContainer> {
    let mut cache = Cache::new();
    let function = snapsql_funcdef::load(parameter_yaml, fallback_name, base_dir, project_root, &mut cache)
        .map_err(|errors| errors.into_iter().collect::<ErrorContainer>())?;
    log::debug!(
        "loaded function definition `{}` with {} parameter(s)",
        function.name,
        function.parameters.len()
    );

    let root_types = function.parameter_types();

    let mut arena = Arena::new();
    let root = snapsql_parser::structure(tokens, &mut arena)?;
    log::debug!("structured statement tree rooted at {root}");

    let analysis = snapsql_scope::analyze(root, &mut arena)?;
    log::debug!(
        "scope analysis produced {} dependency node(s) in processing order {:?}",
        analysis.graph.nodes.len(),
        analysis.processing_order
    );

    let mut errors = ErrorContainer::new();
    for (_, statement) in arena.statements.iter() {
        errors.extend(validate_directives(directives_of(statement), &root_types));
    }

    let (blocking, warnings): (Vec<_>, Vec<_>) = errors
        .into_vec()
        .into_iter()
        .partition(|e| e.severity != snapsql_errors::Severity::Warning);
    if !blocking.is_empty() {
        return Err(blocking.into_iter().collect());
    }

    Ok(CompiledTemplate {
        function,
        arena,
        root,
        analysis,
        warnings,
    })
}

fn directives_of(statement: &Statement) -> &[DirectiveNode] {
    match statement {
        Statement::Select(s) => &s.directives,
        Statement::InsertInto(s) => &s.directives,
        Statement::Update(s) => &s.directives,
        Statement::DeleteFrom(s) => &s.directives,
    }
}

/// Type-checks one statement's directive list against the parameter
/// schema (spec §4.4, §4.8). Maintains a stack so `/*# for */` blocks push
/// a loop frame that every directive between the opener and its matching
/// `/*# end */` is evaluated under, mirroring
/// [`snapsql_ast::directive::DirectiveStack`]'s balance check but this time
/// threading the environment rather than just counting depth.
fn validate_directives(directives: &[DirectiveNode], root_types: &IndexMap<String, TypeNode>) -> Vec<SnapSqlError> {
    let mut errors = Vec::new();
    let mut env = ExprEnv::new(root_types);
    let mut pushed_loop: Vec<bool> = Vec::new();
    let additional_roots = snapsql_pathlang::AdditionalRoots::default();

    for node in directives {
        match node {
            DirectiveNode::VariableSubstitution { expr, expr_text, .. }
            | DirectiveNode::ConstSubstitution { expr, expr_text, .. } => {
                errors.extend(snapsql_pathlang::validate(expr, root_types, &additional_roots));
                if let Err(e) = env.eval(expr_text) {
                    errors.push(e);
                }
            }
            DirectiveNode::EnvironmentReference { .. } => {}
            DirectiveNode::If { cond_text, elseifs, .. } => {
                if let Err(e) = env.eval(cond_text) {
                    errors.push(e);
                }
                for (elseif_cond, _) in elseifs {
                    if let Err(e) = env.eval(elseif_cond) {
                        errors.push(e);
                    }
                }
            }
            DirectiveNode::For { var, list_text, .. } => match env.eval(list_text) {
                Ok((_, list_type)) => {
                    env.enter_loop(var, &list_type);
                    pushed_loop.push(true);
                }
                Err(e) => {
                    errors.push(e);
                    pushed_loop.push(false);
                }
            },
            DirectiveNode::End { .. } => {
                if matches!(pushed_loop.pop(), Some(true)) {
                    env.exit_loop();
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use snapsql_helpers::Position;
    use snapsql_token::{DirectiveKind, TokenKind};

    fn tok(kind: TokenKind, lexeme: &str, offset: u32) -> Token {
        Token::new(kind, lexeme, Position::new(offset, 1, offset + 1, lexeme.chars().count() as u32))
    }
    fn ws(offset: u32) -> Token {
        tok(TokenKind::Whitespace, " ", offset)
    }

    #[test]
    fn compiles_simple_select_end_to_end() {
        // SELECT id FROM users WHERE id = /*= user_id */1
        let tokens = vec![
            tok(TokenKind::Select, "SELECT", 0),
            ws(6),
            tok(TokenKind::Identifier, "id", 7),
            ws(9),
            tok(TokenKind::From, "FROM", 10),
            ws(14),
            tok(TokenKind::Identifier, "users", 15),
            ws(20),
            tok(TokenKind::Where, "WHERE", 21),
            ws(26),
            tok(TokenKind::Identifier, "id", 27),
            ws(29),
            tok(TokenKind::Equal, "=", 30),
            ws(31),
            tok(TokenKind::BlockComment, "/*= user_id */", 32).with_directive(DirectiveKind::Variable),
            tok(TokenKind::Number, "1", 46),
        ];
        let yaml = "name: find_user\nparameters:\n  user_id: int\n";
        let result = compile(tokens, yaml, "anonymous", Path::new("."), Path::new("."));
        let compiled = result.unwrap();
        assert_eq!(compiled.function.name, "find_user");
        assert_eq!(compiled.arena.statements.len(), 1);
        assert_eq!(compiled.analysis.processing_order.len(), 1);
        assert!(compiled.warnings.is_empty());
    }

    #[test]
    fn compiles_for_loop_directive_against_array_parameter() {
        // SELECT id FROM users WHERE /*# for u : users */ /*= u.id */1 /*# end */
        let tokens = vec![
            tok(TokenKind::Select, "SELECT", 0),
            ws(6),
            tok(TokenKind::Identifier, "id", 7),
            ws(9),
            tok(TokenKind::From, "FROM", 10),
            ws(14),
            tok(TokenKind::Identifier, "users", 15),
            ws(20),
            tok(TokenKind::Where, "WHERE", 21),
            ws(26),
            tok(TokenKind::BlockComment, "/*# for u : users */", 27).with_directive(DirectiveKind::ControlFlow),
            ws(48),
            tok(TokenKind::BlockComment, "/*= u.id */", 49).with_directive(DirectiveKind::Variable),
            tok(TokenKind::Number, "1", 60),
            ws(61),
            tok(TokenKind::BlockComment, "/*# end */", 62).with_directive(DirectiveKind::ControlFlowEnd),
        ];
        let yaml = "name: list_users\nparameters:\n  users:\n    - id: int\n      name: string\n";
        let compiled = compile(tokens, yaml, "anonymous", Path::new("."), Path::new(".")).unwrap();
        assert_eq!(compiled.function.name, "list_users");
    }

    #[test]
    fn rejects_unresolvable_variable_directive() {
        // SELECT id FROM users WHERE id = /*= bogus */1
        let tokens = vec![
            tok(TokenKind::Select, "SELECT", 0),
            ws(6),
            tok(TokenKind::Identifier, "id", 7),
            ws(9),
            tok(TokenKind::From, "FROM", 10),
            ws(14),
            tok(TokenKind::Identifier, "users", 15),
            ws(20),
            tok(TokenKind::Where, "WHERE", 21),
            ws(26),
            tok(TokenKind::Identifier, "id", 27),
            ws(29),
            tok(TokenKind::Equal, "=", 30),
            ws(31),
            tok(TokenKind::BlockComment, "/*= bogus */", 32).with_directive(DirectiveKind::Variable),
            tok(TokenKind::Number, "1", 44),
        ];
        let yaml = "name: find_user\nparameters:\n  user_id: int\n";
        let err = compile(tokens, yaml, "anonymous", Path::new("."), Path::new(".")).unwrap_err();
        assert!(err.iter().any(|e| e.kind == snapsql_errors::ErrorKind::UnresolvedReference));
    }

    #[test]
    fn rejects_invalid_parameter_schema_before_touching_sql() {
        let tokens = vec![tok(TokenKind::Select, "SELECT", 0), ws(6), tok(TokenKind::Number, "1", 7)];
        let yaml = "name: bad\nparameters:\n  \"1nope\": string\n";
        let err = compile(tokens, yaml, "anonymous", Path::new("."), Path::new(".")).unwrap_err();
        assert!(err.iter().any(|e| e.kind == snapsql_errors::ErrorKind::InvalidParameterName));
    }
}

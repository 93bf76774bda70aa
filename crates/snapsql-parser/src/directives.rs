//! Directive normalization and attachment (C6 step 1, C9, spec §4.5, §4.8).

use snapsql_ast::directive::{DirectiveNode, DirectiveStack, DirectiveStackError};
use snapsql_ast::{NodeId, NodeIdGen};
use snapsql_errors::{ErrorKind, SnapSqlError};
use snapsql_helpers::Position;
use snapsql_pathlang::{self, PathExpr};
use snapsql_token::{DirectiveKind, Token, TokenKind};

/// Strips a block comment's `/*`, trailing `*/`, and the leading sigil
/// (`=`, `$`, `@`, or `#`) to recover the directive's source text.
fn directive_body(lexeme: &str) -> &str {
    let trimmed = lexeme
        .strip_prefix("/*")
        .unwrap_or(lexeme)
        .strip_suffix("*/")
        .unwrap_or(lexeme);
    let trimmed = trimmed.trim();
    trimmed
        .strip_prefix(['=', '$', '@', '#'])
        .unwrap_or(trimmed)
        .trim()
}

/// Inserts a synthetic `DummyLiteral` token after every variable, const, or
/// environment-reference directive (spec §4.5 step 1). The token carries
/// the directive's expression text so later passes can recover which
/// directive produced it.
pub fn normalize_directives(tokens: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len() + 8);
    for tok in tokens {
        let needs_dummy = matches!(
            tok.directive,
            Some(DirectiveKind::Variable) | Some(DirectiveKind::Const) | Some(DirectiveKind::Env)
        );
        let expr_text = if needs_dummy {
            Some(directive_body(&tok.lexeme).to_string())
        } else {
            None
        };
        let end_offset = tok.position.offset + tok.position.length;
        let end_column = tok.position.column + tok.position.length;
        out.push(tok);
        if let Some(expr_text) = expr_text {
            out.push(Token::dummy_literal(
                expr_text,
                Position::new(end_offset, out.last().unwrap().position.line, end_column, 0),
            ));
        }
    }
    out
}

/// Scans a token slice for directive-carrying block comments and builds
/// the attached [`DirectiveNode`] list, validating `/*# ... */` nesting
/// along the way (spec §4.8).
pub fn attach_directives(
    tokens: &[Token],
    node_ids: &NodeIdGen,
    _errors_sink: &mut Vec<SnapSqlError>,
) -> Result<Vec<DirectiveNode>, SnapSqlError> {
    let mut nodes = Vec::new();
    let mut stack = DirectiveStack::new();
    // Parallel to `stack`'s frames: the `nodes` index of the currently open
    // `If` directive (`None` when the innermost open construct is a `for`),
    // so `elseif`/`else` can be folded into the right `If` node instead of
    // being silently dropped (spec §4.8).
    let mut open_if_index: Vec<Option<usize>> = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        let tok = &tokens[i];
        match tok.directive {
            Some(DirectiveKind::Variable) => {
                let expr_text = directive_body(&tok.lexeme).to_string();
                let expr = parse_expr(&expr_text, tok.position)?;
                nodes.push(DirectiveNode::VariableSubstitution {
                    expr,
                    expr_text,
                    dummy_node: node_ids.next(),
                    position: tok.position,
                });
            }
            Some(DirectiveKind::Const) => {
                let expr_text = directive_body(&tok.lexeme).to_string();
                let expr = parse_expr(&expr_text, tok.position)?;
                nodes.push(DirectiveNode::ConstSubstitution {
                    expr,
                    expr_text,
                    dummy_node: node_ids.next(),
                    position: tok.position,
                });
            }
            Some(DirectiveKind::Env) => {
                let name = directive_body(&tok.lexeme).to_string();
                nodes.push(DirectiveNode::EnvironmentReference {
                    name,
                    dummy_node: node_ids.next(),
                    position: tok.position,
                });
            }
            Some(DirectiveKind::ControlFlow) => {
                let body = directive_body(&tok.lexeme);
                let offset = tok.position.offset;
                if let Some(cond) = body.strip_prefix("if").map(str::trim) {
                    stack.push_if(offset);
                    open_if_index.push(Some(nodes.len()));
                    nodes.push(DirectiveNode::If {
                        cond_text: cond.to_string(),
                        elseifs: Vec::new(),
                        has_else: false,
                        body: NodeId(0),
                        end: NodeId(0),
                        position: tok.position,
                    });
                } else if let Some(rest) = body.strip_prefix("for").map(str::trim) {
                    let Some((var, list_text)) = rest.split_once(':') else {
                        return Err(SnapSqlError::new(
                            ErrorKind::MismatchedDirective,
                            format!("malformed for-directive `{body}`, expected `for v : list`"),
                        )
                        .with_position(tok.position));
                    };
                    stack.push_for(offset);
                    open_if_index.push(None);
                    nodes.push(DirectiveNode::For {
                        var: var.trim().to_string(),
                        list_text: list_text.trim().to_string(),
                        body: NodeId(0),
                        end: NodeId(0),
                        position: tok.position,
                    });
                } else if let Some(cond) = body.strip_prefix("elseif").map(str::trim) {
                    let Some(Some(if_index)) = open_if_index.last() else {
                        return Err(SnapSqlError::new(
                            ErrorKind::MismatchedDirective,
                            format!("`{body}` has no matching `if`"),
                        )
                        .with_position(tok.position));
                    };
                    let DirectiveNode::If { elseifs, .. } = &mut nodes[*if_index] else {
                        unreachable!("open_if_index always points at an If node")
                    };
                    elseifs.push((cond.to_string(), node_ids.next()));
                } else if body == "else" {
                    let Some(Some(if_index)) = open_if_index.last() else {
                        return Err(SnapSqlError::new(
                            ErrorKind::MismatchedDirective,
                            format!("`{body}` has no matching `if`"),
                        )
                        .with_position(tok.position));
                    };
                    let DirectiveNode::If { has_else, .. } = &mut nodes[*if_index] else {
                        unreachable!("open_if_index always points at an If node")
                    };
                    *has_else = true;
                } else {
                    return Err(SnapSqlError::new(
                        ErrorKind::MismatchedDirective,
                        format!("unrecognized control-flow directive `{body}`"),
                    )
                    .with_position(tok.position));
                }
            }
            Some(DirectiveKind::ControlFlowEnd) => {
                stack.pop_end(tok.position.offset).map_err(stack_error_to_snapsql(tok.position))?;
                open_if_index.pop();
                nodes.push(DirectiveNode::End {
                    position: tok.position,
                });
            }
            None => {}
        }
        i += 1;
    }

    stack.finish().map_err(stack_error_to_snapsql(
        tokens.last().map(|t| t.position).unwrap_or_default(),
    ))?;

    Ok(nodes)
}

fn stack_error_to_snapsql(position: Position) -> impl FnOnce(DirectiveStackError) -> SnapSqlError {
    move |e| SnapSqlError::new(ErrorKind::MismatchedDirective, e.to_string()).with_position(position)
}

fn parse_expr(text: &str, position: Position) -> Result<PathExpr, SnapSqlError> {
    snapsql_pathlang::parse(text, position.offset, position.line, position.column)
}

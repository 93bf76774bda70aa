//! Scope and dependency graph builder (C8, spec §4.7) for the snapsql
//! template compiler.
//!
//! [`analyze`] walks a statement already finalized by `snapsql-parser`,
//! creating one [`DependencyNode`] per CTE, FROM-subquery, SELECT-subquery
//! and the main body, threading CTE visibility down through nested scopes,
//! and recursively structuring subquery token spans into the shared arena
//! so every nested statement is reachable by [`snapsql_ast::NodeId`]. The
//! result is a [`Graph`] plus the Kahn's-algorithm processing order the
//! rest of a pipeline would compile statements in.

pub mod graph;
pub mod scope;

use graph::{DependencyId, DependencyKind, DependencyNode, Graph};
use scope::{FieldSource, Scope, ScopeId, ScopeIdGen};
use snapsql_ast::{FieldKind, FieldSourceKind, NodeId, ProjectedField, Statement};
use snapsql_errors::{ErrorContainer, ErrorKind, SnapSqlError};
use snapsql_helpers::IndexMap;
use snapsql_parser::Arena;
use snapsql_token::{Token, TokenKind};

/// The result of analyzing one top-level statement tree.
#[derive(Debug)]
pub struct Analysis {
    pub graph: Graph,
    pub scopes: IndexMap<ScopeId, Scope>,
    /// The Kahn's-algorithm processing order: every node's dependencies
    /// appear before it (spec §8 invariant 4).
    pub processing_order: Vec<DependencyId>,
    pub root: DependencyId,
}

/// Builds the scope and dependency graph for `root` (the [`NodeId`]
/// returned by `snapsql_parser::structure`), recursively structuring any
/// FROM- and SELECT-subqueries it finds into `arena` (spec §4.7
/// "Construction").
pub fn analyze(root: NodeId, arena: &mut Arena) -> Result<Analysis, ErrorContainer> {
    let mut builder = Builder {
        arena,
        graph: Graph::new(),
        scopes: IndexMap::default(),
        scope_ids: ScopeIdGen::default(),
        errors: ErrorContainer::new(),
    };

    let root_id = builder.build_node(root, DependencyKind::Main, None, None, &IndexMap::default());

    let order = match builder.graph.processing_order() {
        Ok(order) => order,
        Err(e) => {
            builder.errors.push(e);
            Vec::new()
        }
    };

    if builder.errors.has_blocking() {
        return Err(builder.errors);
    }

    Ok(Analysis {
        graph: builder.graph,
        scopes: builder.scopes,
        processing_order: order,
        root: root_id,
    })
}

struct Builder<'a> {
    arena: &'a mut Arena,
    graph: Graph,
    scopes: IndexMap<ScopeId, Scope>,
    scope_ids: ScopeIdGen,
    errors: ErrorContainer,
}

impl Builder<'_> {
    fn build_node(
        &mut self,
        statement_id: NodeId,
        kind: DependencyKind,
        name: Option<String>,
        parent_scope: Option<ScopeId>,
        visible_ctes: &IndexMap<String, DependencyId>,
    ) -> DependencyId {
        let id = self.graph.ids.next();
        let scope_id = self.scope_ids.next();
        self.scopes.insert(scope_id, Scope::new(scope_id, parent_scope));
        if let Some(parent) = parent_scope {
            if let Some(parent_scope) = self.scopes.get_mut(&parent) {
                parent_scope.children.push(scope_id);
            }
        }

        let statement = self
            .arena
            .statements
            .get(&statement_id)
            .expect("structure() always inserts before returning a NodeId")
            .clone();

        let mut visible_ctes = visible_ctes.clone();
        let mut depends_on = Vec::new();

        if let Some(with) = statement.with_clause() {
            for cte in with.ctes.clone() {
                let cte_id = self.build_node(cte.body, DependencyKind::Cte, Some(cte.name.clone()), Some(scope_id), &visible_ctes);
                visible_ctes.insert(cte.name.clone(), cte_id);
                if let Some(scope) = self.scopes.get_mut(&scope_id) {
                    scope.subquery_aliases.insert(cte.name, cte_id);
                }
            }
        }

        let mut from = match &statement {
            Statement::Select(s) => s.from.clone(),
            Statement::Update(s) => s.from.clone(),
            Statement::DeleteFrom(s) => s.using.clone(),
            Statement::InsertInto(_) => None,
        };

        if let Some(from_clause) = from.as_mut() {
            for table in from_clause.tables.iter_mut() {
                if table.is_subquery {
                    match snapsql_parser::structure(table.subquery_tokens.clone(), self.arena) {
                        Ok(sub_id) => {
                            let alias = table.cte_or_subquery_alias.clone().unwrap_or_else(|| table.name_in_query.clone());
                            let dep_id = self.build_node(sub_id, DependencyKind::FromSubquery, Some(alias), Some(scope_id), &visible_ctes);
                            table.subquery_ref = Some(sub_id);
                            depends_on.push(dep_id);
                            if let Some(scope) = self.scopes.get_mut(&scope_id) {
                                scope.subquery_aliases.insert(table.name_in_query.clone(), dep_id);
                            }
                        }
                        Err(errs) => self.errors.extend(errs.into_vec()),
                    }
                } else if let Some(&cte_id) = visible_ctes.get(&table.real_name) {
                    depends_on.push(cte_id);
                    if let Some(scope) = self.scopes.get_mut(&scope_id) {
                        scope.subquery_aliases.insert(table.name_in_query.clone(), cte_id);
                    }
                } else if let Some(scope) = self.scopes.get_mut(&scope_id) {
                    scope.table_aliases.insert(table.name_in_query.clone(), table.real_name.clone());
                }
            }
        }

        // Accessible field sources = the exposed columns of every direct
        // FROM dependency (spec §4.7 "Field resolution"). Plain physical
        // tables contribute nothing — see DESIGN.md.
        let accessible: Vec<FieldSource> = depends_on
            .iter()
            .filter_map(|&dep_id| self.graph.get(dep_id))
            .flat_map(|dep| dep.produces.clone())
            .collect();
        if let Some(scope) = self.scopes.get_mut(&scope_id) {
            scope.field_sources = accessible;
        }

        let mut fields: Vec<ProjectedField> = match &statement {
            Statement::Select(s) => s.fields.clone(),
            Statement::InsertInto(s) => s.returning.clone(),
            Statement::Update(s) => s.returning.clone(),
            Statement::DeleteFrom(s) => s.returning.clone(),
        };

        let correlated = matches!(kind, DependencyKind::SelectSubquery);
        for field in fields.iter_mut() {
            match &field.kind {
                FieldKind::SingleField { name } => {
                    let resolved = self
                        .scopes
                        .get(&scope_id)
                        .map(|s| s.field_sources.iter().any(|fs| fs.exposed_name() == name))
                        .unwrap_or(false);
                    if !resolved {
                        self.errors.push(
                            SnapSqlError::new(
                                ErrorKind::FieldSourceNotFound,
                                format!("field `{name}` does not resolve to any known field source in this scope"),
                            )
                            .with_position(field.position),
                        );
                    }
                }
                FieldKind::TableField { table, .. } => {
                    if !self.qualifier_visible(scope_id, table, correlated) {
                        self.errors.push(
                            SnapSqlError::new(
                                ErrorKind::FieldNotAccessible,
                                format!("table qualifier `{table}` is not visible in this scope"),
                            )
                            .with_position(field.position),
                        );
                    }
                }
                FieldKind::ComplexField if field.source_kind == FieldSourceKind::Subquery => {
                    let inner = select_subquery_inner_tokens(&field.tokens);
                    match snapsql_parser::structure(inner, self.arena) {
                        Ok(sub_id) => {
                            let dep_id = self.build_node(sub_id, DependencyKind::SelectSubquery, None, Some(scope_id), &visible_ctes);
                            field.subquery_ref = Some(sub_id);
                            depends_on.push(dep_id);
                        }
                        Err(errs) => self.errors.extend(errs.into_vec()),
                    }
                }
                _ => {}
            }
        }

        if let Some(stmt) = self.arena.statements.get_mut(&statement_id) {
            match stmt {
                Statement::Select(s) => {
                    s.from = from.clone();
                    s.fields = fields.clone();
                }
                Statement::Update(s) => {
                    s.from = from.clone();
                    s.returning = fields.clone();
                }
                Statement::DeleteFrom(s) => {
                    s.using = from.clone();
                    s.returning = fields.clone();
                }
                Statement::InsertInto(s) => {
                    s.returning = fields.clone();
                }
            }
        }

        let produces = match kind {
            DependencyKind::Cte | DependencyKind::FromSubquery => exposed_field_sources(&fields, id, scope_id),
            DependencyKind::Main | DependencyKind::SelectSubquery => natural_field_sources(&fields, scope_id),
        };
        let table_refs = from.map(|f| f.tables).unwrap_or_default();

        self.graph.insert(DependencyNode {
            id,
            statement: statement_id,
            kind,
            name,
            depends_on,
            produces,
            table_refs,
            scope: scope_id,
        });

        id
    }

    /// Resolves a `t.f` qualifier `t` structurally: looks it up in the
    /// current scope's alias tables, walking up parent scopes only for
    /// correlated SelectSubquery references (spec §4.7 "Scope visibility").
    fn qualifier_visible(&self, scope_id: ScopeId, qualifier: &str, correlated: bool) -> bool {
        let mut current = Some(scope_id);
        let mut first = true;
        while let Some(sid) = current {
            let Some(scope) = self.scopes.get(&sid) else { break };
            if scope.table_aliases.contains_key(qualifier) || scope.subquery_aliases.contains_key(qualifier) {
                return true;
            }
            if first && !correlated {
                break;
            }
            first = false;
            current = scope.parent;
        }
        false
    }
}

/// A CTE's or FROM-subquery's exposed columns, each wrapped as source-kind
/// Subquery pointing back at the node that produces them (spec §4.7
/// "Construction": "each projected field becomes a field source of
/// source-kind Subquery with SubqueryRef = <cte-id>").
fn exposed_field_sources(fields: &[ProjectedField], owner: DependencyId, scope_id: ScopeId) -> Vec<FieldSource> {
    fields
        .iter()
        .filter_map(|field| {
            let name = field.output_name()?.to_string();
            Some(FieldSource {
                name,
                alias: field.alias.clone(),
                kind: FieldSourceKind::Subquery,
                table: None,
                expression: None,
                subquery_ref: Some(owner),
                scope: scope_id,
            })
        })
        .collect()
}

/// A Main or SelectSubquery node's own projection, kept in its natural
/// source kind since nothing resolves fields against these by name.
fn natural_field_sources(fields: &[ProjectedField], scope_id: ScopeId) -> Vec<FieldSource> {
    fields
        .iter()
        .filter_map(|field| {
            let name = field.output_name()?.to_string();
            let table = match &field.kind {
                FieldKind::TableField { table, .. } => Some(table.clone()),
                _ => None,
            };
            let expression = match &field.kind {
                FieldKind::FunctionField { function, .. } => Some(function.clone()),
                _ => None,
            };
            Some(FieldSource {
                name,
                alias: field.alias.clone(),
                kind: field.source_kind,
                table,
                expression,
                subquery_ref: None,
                scope: scope_id,
            })
        })
        .collect()
}

/// Recovers a SELECT-subquery field's inner token span from its full
/// comma-group `tokens` (spec §4.6/§4.7): strips the trailing alias and
/// cast suffix the same way `select_clause::classify_field` identified
/// them, then the outer parens. Returns an empty `Vec` if the shape isn't
/// actually `(...)` after stripping — which shouldn't happen for a field
/// already classified with `source_kind == Subquery`.
fn select_subquery_inner_tokens(tokens: &[Token]) -> Vec<Token> {
    let code: Vec<usize> = tokens.iter().enumerate().filter(|(_, t)| t.is_code()).map(|(i, _)| i).collect();
    if code.len() < 2 {
        return Vec::new();
    }

    let mut end = code.len();
    let last = code[end - 1];
    let prev = code[end - 2];
    if tokens[prev].kind == TokenKind::As {
        end -= 2;
    } else if matches!(tokens[last].kind, TokenKind::Identifier | TokenKind::ContextualIdentifier)
        && !matches!(tokens[prev].kind, TokenKind::Dot | TokenKind::DoubleColon)
    {
        end -= 1;
    }

    if end >= 2 && tokens[code[end - 2]].kind == TokenKind::DoubleColon {
        end -= 2;
    }

    if end == 0 {
        return Vec::new();
    }
    let open = code[0];
    let close = code[end - 1];
    if tokens[open].kind != TokenKind::OpenedParens || tokens[close].kind != TokenKind::ClosedParens {
        return Vec::new();
    }
    tokens[open + 1..close].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapsql_helpers::Position;
    use snapsql_token::TokenKind;

    fn tok(kind: TokenKind, lexeme: &str, offset: u32) -> Token {
        Token::new(kind, lexeme, Position::new(offset, 1, offset + 1, lexeme.chars().count() as u32))
    }
    fn ws(offset: u32) -> Token {
        tok(TokenKind::Whitespace, " ", offset)
    }

    /// S5 — dependency order (spec §8): `WITH a AS (SELECT 1 AS x), b AS
    /// (SELECT x FROM a) SELECT x FROM b` processes as `[a, b, main]`.
    #[test]
    fn s5_dependency_order() {
        let tokens = vec![
            tok(TokenKind::With, "WITH", 0),
            ws(4),
            tok(TokenKind::Identifier, "a", 5),
            ws(6),
            tok(TokenKind::As, "AS", 7),
            ws(9),
            tok(TokenKind::OpenedParens, "(", 10),
            tok(TokenKind::Select, "SELECT", 11),
            ws(17),
            tok(TokenKind::Number, "1", 18),
            ws(19),
            tok(TokenKind::As, "AS", 20),
            ws(22),
            tok(TokenKind::Identifier, "x", 23),
            tok(TokenKind::ClosedParens, ")", 24),
            tok(TokenKind::Comma, ",", 25),
            ws(26),
            tok(TokenKind::Identifier, "b", 27),
            ws(28),
            tok(TokenKind::As, "AS", 29),
            ws(31),
            tok(TokenKind::OpenedParens, "(", 32),
            tok(TokenKind::Select, "SELECT", 33),
            ws(39),
            tok(TokenKind::Identifier, "x", 40),
            ws(41),
            tok(TokenKind::From, "FROM", 42),
            ws(46),
            tok(TokenKind::Identifier, "a", 47),
            tok(TokenKind::ClosedParens, ")", 48),
            ws(49),
            tok(TokenKind::Select, "SELECT", 50),
            ws(56),
            tok(TokenKind::Identifier, "x", 57),
            ws(58),
            tok(TokenKind::From, "FROM", 59),
            ws(63),
            tok(TokenKind::Identifier, "b", 64),
        ];
        let mut arena = Arena::new();
        let root = snapsql_parser::structure(tokens, &mut arena).unwrap();
        let analysis = analyze(root, &mut arena).unwrap();

        assert_eq!(analysis.processing_order.len(), 3);
        let names: Vec<Option<String>> = analysis
            .processing_order
            .iter()
            .map(|id| analysis.graph.get(*id).unwrap().name.clone())
            .collect();
        assert_eq!(names, vec![Some("a".to_string()), Some("b".to_string()), None]);

        let kinds: Vec<DependencyKind> = analysis
            .processing_order
            .iter()
            .map(|id| analysis.graph.get(*id).unwrap().kind)
            .collect();
        assert_eq!(kinds, vec![DependencyKind::Cte, DependencyKind::Cte, DependencyKind::Main]);

        // Invariant 4: every dependency appears before its dependent.
        let position_of = |id: DependencyId| analysis.processing_order.iter().position(|&o| o == id).unwrap();
        for node in analysis.graph.nodes.values() {
            for &dep in &node.depends_on {
                assert!(position_of(dep) < position_of(node.id));
            }
        }
    }

    /// S6 — unresolved field across scope (spec §8): `SELECT (SELECT bogus
    /// FROM inner_t) FROM outer_t` reports `FieldSourceNotFound` for
    /// `bogus` in the SelectSubquery scope, with the scope hierarchy intact.
    #[test]
    fn s6_unresolved_field_across_scope() {
        let tokens = vec![
            tok(TokenKind::Select, "SELECT", 0),
            ws(6),
            tok(TokenKind::OpenedParens, "(", 7),
            tok(TokenKind::Select, "SELECT", 8),
            ws(14),
            tok(TokenKind::Identifier, "bogus", 15),
            ws(20),
            tok(TokenKind::From, "FROM", 21),
            ws(25),
            tok(TokenKind::Identifier, "inner_t", 26),
            tok(TokenKind::ClosedParens, ")", 33),
            ws(34),
            tok(TokenKind::From, "FROM", 35),
            ws(39),
            tok(TokenKind::Identifier, "outer_t", 40),
        ];
        let mut arena = Arena::new();
        let root = snapsql_parser::structure(tokens, &mut arena).unwrap();
        let errors = analyze(root, &mut arena).unwrap_err();

        assert_eq!(errors.len(), 1);
        let err = errors.iter().next().unwrap();
        assert_eq!(err.kind, ErrorKind::FieldSourceNotFound);
        assert!(err.matches("bogus"));

        // Re-run outside the Result to inspect the scope hierarchy: a
        // top-level statement's SelectSubquery scope is a child of main.
        let mut arena = Arena::new();
        let root = snapsql_parser::structure(
            vec![
                tok(TokenKind::Select, "SELECT", 0),
                ws(6),
                tok(TokenKind::OpenedParens, "(", 7),
                tok(TokenKind::Select, "SELECT", 8),
                ws(14),
                tok(TokenKind::Identifier, "id", 15),
                ws(17),
                tok(TokenKind::From, "FROM", 18),
                ws(22),
                tok(TokenKind::Identifier, "inner_t", 23),
                tok(TokenKind::ClosedParens, ")", 30),
                ws(31),
                tok(TokenKind::From, "FROM", 32),
                ws(36),
                tok(TokenKind::Identifier, "outer_t", 37),
            ],
            &mut arena,
        )
        .unwrap();
        let analysis = analyze(root, &mut arena).unwrap();
        let main = analysis.graph.get(analysis.root).unwrap();
        let main_scope = analysis.scopes.get(&main.scope).unwrap();
        assert_eq!(main_scope.children.len(), 1);
        let child_scope = analysis.scopes.get(&main_scope.children[0]).unwrap();
        assert_eq!(child_scope.parent, Some(main.scope));
    }
}

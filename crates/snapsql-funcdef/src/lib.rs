//! Function definition loader (C4, spec §4.3) and its upstream-collaborator
//! seams (spec §6, SPEC_FULL §6): the markdown splitter contract and raw
//! SQL comment-block extraction.

pub mod common_types;
pub mod markdown;
pub mod params;
pub mod sql_comments;

use once_cell::sync::OnceCell;
use snapsql_errors::{ErrorKind, SnapSqlError};
use snapsql_helpers::IndexMap;
use snapsql_types::{generate_dummy, TypeNode, Value};
use std::path::Path;

/// `name + type node`, in declaration order (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: TypeNode,
    /// The original common-type reference string as authored, if any
    /// (e.g. `api/users/User`), kept for tooling (spec §4.3).
    pub original_reference: Option<String>,
}

/// Generator-specific knobs that do not affect parsing semantics but ride
/// along on the definition for the (out-of-scope) downstream code
/// generator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceHints {
    pub slow_query_threshold_ms: Option<u64>,
}

/// A fully loaded function definition (spec §3).
#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub generated_function_name: String,
    pub description: Option<String>,
    pub parameters: Vec<Parameter>,
    pub metadata: IndexMap<String, String>,
    pub performance: PerformanceHints,
    dummy_data: OnceCell<Value>,
}

impl PartialEq for FunctionDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.generated_function_name == other.generated_function_name
            && self.description == other.description
            && self.parameters == other.parameters
            && self.metadata == other.metadata
            && self.performance == other.performance
    }
}

impl FunctionDefinition {
    pub fn new(
        name: String,
        generated_function_name: String,
        description: Option<String>,
        parameters: Vec<Parameter>,
        metadata: IndexMap<String, String>,
        performance: PerformanceHints,
    ) -> Self {
        Self {
            name,
            generated_function_name,
            description,
            parameters,
            metadata,
            performance,
            dummy_data: OnceCell::new(),
        }
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn parameter_types(&self) -> IndexMap<String, TypeNode> {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.ty.clone()))
            .collect()
    }

    /// The cached dummy-data tree for this definition's parameters,
    /// generated lazily and memoized (spec §4.3 "Finalization"). Every
    /// retrieval after the first returns the same cached value — callers
    /// that need a private copy should clone it, matching the
    /// "deep copy on retrieval" discipline used for common types.
    pub fn dummy_data(&self) -> &Value {
        self.dummy_data.get_or_init(|| {
            let mut fields = IndexMap::default();
            for param in &self.parameters {
                fields.insert(param.name.clone(), generate_dummy(&param.ty));
            }
            Value::Object(fields)
        })
    }
}

/// Validates a parameter (or nested object field) name against
/// `[A-Za-z_][A-Za-z0-9_]*` (spec §3).
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Recursively validates every parameter/field name in a type tree,
/// accumulating one [`ErrorKind::InvalidParameterName`] per violation
/// (spec §4.3: "Any parameter name failing the identifier regex
/// invalidates the whole definition").
pub fn validate_names(name: &str, ty: &TypeNode, errors: &mut Vec<SnapSqlError>) {
    if !is_valid_identifier(name) {
        errors.push(SnapSqlError::new(
            ErrorKind::InvalidParameterName,
            format!("`{name}` is not a valid parameter name"),
        ));
    }
    if let TypeNode::Object(fields) = ty {
        for (field_name, field_ty) in fields {
            validate_names(field_name, field_ty, errors);
        }
    }
}

/// Loads a function definition end to end: parses the parameter YAML,
/// resolves every common-type reference against `project_root`, then
/// re-validates identifier names now that common-type object fields have
/// been spliced in (spec §4.3). This is the single entry point the rest of
/// a pipeline calls — callers never need to drive [`params`] and
/// [`common_types`] separately.
pub fn load(
    yaml_text: &str,
    fallback_name: &str,
    base_dir: &Path,
    project_root: &Path,
    cache: &mut common_types::Cache,
) -> Result<FunctionDefinition, Vec<SnapSqlError>> {
    let mut definition = params::parse_function_definition(yaml_text, fallback_name)?;

    let mut errors = Vec::new();
    for param in definition.parameters.iter_mut() {
        if let Err(e) = common_types::resolve(&mut param.ty, base_dir, project_root, cache) {
            errors.push(e);
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    for param in &definition.parameters {
        validate_names(&param.name, &param.ty, &mut errors);
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn load_resolves_common_types_and_caches_dummy_data() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(
            root.path().join("_common.yaml"),
            "User:\n  id: int\n  name: string\n",
        )
        .unwrap();

        let yaml = "name: find_user\nparameters:\n  user: User\n  limit: int\n";
        let mut cache = common_types::Cache::new();
        let definition = load(yaml, "anonymous", root.path(), root.path(), &mut cache).unwrap();

        assert_eq!(definition.name, "find_user");
        let types = definition.parameter_types();
        assert!(types["user"].is_object());
        assert_eq!(types["limit"], TypeNode::Scalar(snapsql_types::ScalarKind::Int));

        let dummy = definition.dummy_data();
        assert!(matches!(dummy, Value::Object(_)));
    }

    #[test]
    fn load_rejects_invalid_parameter_names() {
        let root = tempfile::tempdir().unwrap();
        let yaml = "name: bad\nparameters:\n  \"1nope\": string\n";
        let mut cache = common_types::Cache::new();
        let errors = load(yaml, "anonymous", root.path(), root.path(), &mut cache).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == ErrorKind::InvalidParameterName));
    }
}

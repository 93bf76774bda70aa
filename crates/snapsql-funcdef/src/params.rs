//! Parameter YAML parsing (spec §4.3). The YAML parser (`serde_yaml`) is
//! the "upstream YAML parser" collaborator of spec §6 — it is load-bearing
//! that its `Mapping` preserves insertion order, which `serde_yaml` does.

use crate::{FunctionDefinition, Parameter, PerformanceHints};
use snapsql_errors::{ErrorKind, SnapSqlError};
use snapsql_helpers::IndexMap;
use snapsql_types::{normalize_scalar_name, TypeNode};

/// Parses a function-definition YAML document into a [`FunctionDefinition`]
/// with its common-type references left unresolved — call
/// [`crate::common_types::resolve`] afterwards.
///
/// Accepts either a bare `parameters:` map or a document whose top level
/// *is* the parameters map (the shape produced directly by a `/*#`/`/*@`
/// SQL comment block, which never wraps parameters under a named key).
pub fn parse_function_definition(
    yaml_text: &str,
    fallback_name: &str,
) -> Result<FunctionDefinition, Vec<SnapSqlError>> {
    let doc: serde_yaml::Value = serde_yaml::from_str(yaml_text).map_err(|e| {
        vec![SnapSqlError::new(
            ErrorKind::ParameterValidation,
            format!("invalid parameter YAML: {e}"),
        )]
    })?;

    let mapping = doc.as_mapping().cloned().unwrap_or_default();

    let name = mapping
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or(fallback_name)
        .to_string();
    let generated_function_name = mapping
        .get("function_name")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| to_snake_case(&name));
    let description = mapping
        .get("description")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let has_parameters_key = mapping.contains_key("parameters");
    let params_value = mapping.get("parameters").cloned().unwrap_or(doc.clone());
    let params_mapping = params_value.as_mapping().cloned().unwrap_or_default();

    let mut parameters = Vec::new();
    let mut errors = Vec::new();

    for (key, value) in params_mapping.iter() {
        let Some(param_name) = key.as_str() else {
            errors.push(SnapSqlError::new(
                ErrorKind::InvalidParameterName,
                "parameter keys must be strings".to_string(),
            ));
            continue;
        };

        if !crate::is_valid_identifier(param_name) {
            errors.push(SnapSqlError::new(
                ErrorKind::InvalidParameterName,
                format!("`{param_name}` is not a valid parameter name"),
            ));
            continue;
        }

        let (ty, original_reference) = yaml_to_type_node(value);
        crate::validate_names(param_name, &ty, &mut errors);

        parameters.push(Parameter {
            name: param_name.to_string(),
            ty,
            original_reference,
        });
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let performance = PerformanceHints {
        slow_query_threshold_ms: mapping
            .get("slow_query_threshold_ms")
            .and_then(|v| v.as_u64()),
    };

    let metadata = if has_parameters_key {
        mapping
            .iter()
            .filter_map(|(k, v)| {
                let k = k.as_str()?;
                if matches!(
                    k,
                    "name" | "function_name" | "description" | "parameters" | "slow_query_threshold_ms"
                ) {
                    return None;
                }
                Some((k.to_string(), serde_yaml::to_string(v).unwrap_or_default()))
            })
            .collect::<IndexMap<_, _>>()
    } else {
        IndexMap::default()
    };

    Ok(FunctionDefinition::new(
        name,
        generated_function_name,
        description,
        parameters,
        metadata,
        performance,
    ))
}

/// Converts one parameter's YAML value into a [`TypeNode`], returning the
/// original common-type reference string when the value was a bare scalar
/// reference (spec §4.3 "Record, per parameter, the 'original' reference").
fn yaml_to_type_node(value: &serde_yaml::Value) -> (TypeNode, Option<String>) {
    match value {
        serde_yaml::Value::String(s) => {
            let ty = normalize_scalar_name(s);
            let reference = matches!(ty, TypeNode::CommonTypeRef { .. }).then(|| s.clone());
            (ty, reference)
        }
        serde_yaml::Value::Mapping(map) => {
            let fields = map
                .iter()
                .filter_map(|(k, v)| {
                    let k = k.as_str()?;
                    Some((k.to_string(), yaml_to_type_node(v).0))
                })
                .collect();
            (TypeNode::Object(fields), None)
        }
        serde_yaml::Value::Sequence(seq) => {
            // `[T]` is equivalent to `T[]` (spec §4.2/§4.3). Multi-element
            // arrays are retained element-wise — a test-fixture shape the
            // spec leaves informal; we normalize each element and only
            // collapse to a single array type when they agree.
            if seq.len() == 1 {
                let (elem, reference) = yaml_to_type_node(&seq[0]);
                (TypeNode::array_of(elem), reference)
            } else {
                let elems: Vec<TypeNode> = seq.iter().map(|v| yaml_to_type_node(v).0).collect();
                let first = elems.first().cloned().unwrap_or(TypeNode::Unknown);
                let uniform = elems.iter().all(|e| *e == first);
                (
                    TypeNode::array_of(if uniform { first } else { TypeNode::Unknown }),
                    None,
                )
            }
        }
        _ => (TypeNode::Unknown, None),
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::new();
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c == '-' || c == ' ' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use snapsql_types::ScalarKind;

    #[test]
    fn parameter_order_preservation() {
        let yaml = "parameters:\n  zeta: int\n  alpha: string\n  middle: bool\n";
        let def = parse_function_definition(yaml, "example").unwrap();
        assert_eq!(def.parameter_names(), vec!["zeta", "alpha", "middle"]);
    }

    #[test]
    fn nested_object_fields_are_validated() {
        let yaml = "parameters:\n  user:\n    name: string\n    1bad: int\n";
        let result = parse_function_definition(yaml, "example");
        let errors = result.unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].matches("1bad"));
    }

    #[test]
    fn bracketed_single_element_array_equals_trailing_brackets() {
        let yaml = "parameters:\n  tags: [string]\n";
        let def = parse_function_definition(yaml, "example").unwrap();
        assert_eq!(
            def.parameters[0].ty,
            TypeNode::array_of(TypeNode::Scalar(ScalarKind::String))
        );
    }

    #[test]
    fn bare_top_level_map_without_name_key_is_accepted() {
        let yaml = "user_id: int\nlimit: int\n";
        let def = parse_function_definition(yaml, "fallback").unwrap();
        assert_eq!(def.name, "fallback");
        assert_eq!(def.parameter_names(), vec!["user_id", "limit"]);
    }
}

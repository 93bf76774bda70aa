//! Type model and dummy-data generator (C3, spec §4.2).

use fancy_regex::Regex;
use snapsql_helpers::IndexMap;
use std::sync::LazyLock;

/// The closed set of normalized scalar type names (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ScalarKind {
    String,
    Int,
    Int8,
    Int16,
    Int32,
    Float,
    Float32,
    Decimal,
    Bool,
    Date,
    Datetime,
    Timestamp,
    Email,
    Uuid,
    Json,
    Any,
    Object,
}

/// A parameter type node (spec §3). Before common-type resolution (C4) a
/// reference like `./User` or `api/users/User[]` is kept as
/// [`TypeNode::CommonTypeRef`]; resolution replaces it with a deep copy of
/// the referenced definition.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeNode {
    Unknown,
    Scalar(ScalarKind),
    Object(IndexMap<String, TypeNode>),
    Array(Box<TypeNode>),
    CommonTypeRef { reference: String, array: bool },
}

impl TypeNode {
    pub fn array_of(elem: TypeNode) -> Self {
        TypeNode::Array(Box::new(elem))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TypeNode::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, TypeNode::Object(_))
    }

    pub fn element_type(&self) -> Option<&TypeNode> {
        match self {
            TypeNode::Array(elem) => Some(elem),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&TypeNode> {
        match self {
            TypeNode::Object(fields) => fields.get(name),
            _ => None,
        }
    }

    /// A short, human-readable name for diagnostics (`array`, `object`,
    /// `int`, …).
    pub fn display_name(&self) -> String {
        match self {
            TypeNode::Unknown => "unknown".to_string(),
            TypeNode::Scalar(s) => s.to_string(),
            TypeNode::Object(_) => "object".to_string(),
            TypeNode::Array(elem) => format!("{}[]", elem.display_name()),
            TypeNode::CommonTypeRef { reference, array } => {
                if *array {
                    format!("{reference}[]")
                } else {
                    reference.clone()
                }
            }
        }
    }
}

static COMMON_TYPE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([./]*)([A-Z]\w*)(\[\])?$").unwrap());

/// A string value matching `^[./]*[A-Z][A-Za-z0-9_]*(\[\])?$` is a
/// common-type reference (spec §3).
pub fn is_common_type_reference(raw: &str) -> bool {
    COMMON_TYPE_REF.is_match(raw).unwrap_or(false)
}

/// Splits `raw` into (path-prefix, bare-name, is-array) when it is a
/// common-type reference.
pub fn split_common_type_reference(raw: &str) -> Option<(String, String, bool)> {
    let caps = COMMON_TYPE_REF.captures(raw).ok().flatten()?;
    let prefix = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
    let name = caps.get(2)?.as_str().to_string();
    let array = caps.get(3).is_some();
    Some((prefix, name, array))
}

/// Normalizes a raw type string from parameter YAML into a [`TypeNode`]
/// (spec §3). Trailing `[]` is stripped recursively before the base name is
/// normalized. Common-type references are left unresolved for C4 to fill in.
pub fn normalize_scalar_name(raw: &str) -> TypeNode {
    let raw = raw.trim();

    if let Some(base) = raw.strip_suffix("[]") {
        return TypeNode::array_of(normalize_scalar_name(base));
    }

    if raw == "array" {
        return TypeNode::array_of(TypeNode::Scalar(ScalarKind::Any));
    }

    if is_common_type_reference(raw) {
        let (_, _, array) = split_common_type_reference(raw).unwrap();
        return TypeNode::CommonTypeRef {
            reference: raw.trim_end_matches("[]").to_string(),
            array,
        };
    }

    let normalized = match raw {
        "integer" | "long" | "int64" => "int",
        "smallint" => "int16",
        "tinyint" => "int8",
        "text" | "varchar" | "str" => "string",
        "double" | "number" => "float",
        "decimal" | "numeric" => "decimal",
        "boolean" => "bool",
        other => other,
    };

    match normalized.parse::<ScalarKind>() {
        Ok(kind) => TypeNode::Scalar(kind),
        Err(_) => TypeNode::Unknown,
    }
}

/// Infers a [`TypeNode`] from a literal value, used when a parameter's
/// default or a dummy element needs a type inferred rather than declared.
pub fn infer_type_from_literal(value: &Value) -> TypeNode {
    match value {
        Value::Null => TypeNode::Unknown,
        Value::Bool(_) => TypeNode::Scalar(ScalarKind::Bool),
        Value::Int(_) => TypeNode::Scalar(ScalarKind::Int),
        Value::Float(_) => TypeNode::Scalar(ScalarKind::Float),
        Value::String(_) => TypeNode::Scalar(ScalarKind::String),
        Value::Array(items) => {
            let elem = items
                .first()
                .map(infer_type_from_literal)
                .unwrap_or(TypeNode::Unknown);
            TypeNode::array_of(elem)
        }
        Value::Object(fields) => TypeNode::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), infer_type_from_literal(v)))
                .collect(),
        ),
    }
}

/// A runtime/dummy value. Mirrors the shapes a YAML/JSON document can take.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Produces the canonical dummy value for a type node (spec §4.2 table).
/// Arrays produce a single-element list of the element's canonical value;
/// objects produce a nested map.
pub fn generate_dummy(ty: &TypeNode) -> Value {
    match ty {
        TypeNode::Unknown => Value::Null,
        TypeNode::Scalar(kind) => scalar_dummy(*kind),
        TypeNode::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, field_ty)| (name.clone(), generate_dummy(field_ty)))
                .collect(),
        ),
        TypeNode::Array(elem) => Value::Array(vec![generate_dummy(elem)]),
        TypeNode::CommonTypeRef { .. } => {
            // Unresolved reference: treat like json/any/object per spec §4.2.
            let mut map = IndexMap::default();
            map.insert("#".to_string(), Value::String(ty.display_name()));
            Value::Object(map)
        }
    }
}

fn scalar_dummy(kind: ScalarKind) -> Value {
    match kind {
        ScalarKind::String => Value::String("dummy".to_string()),
        ScalarKind::Int => Value::Int(1),
        ScalarKind::Int32 => Value::Int(2),
        ScalarKind::Int16 => Value::Int(3),
        ScalarKind::Int8 => Value::Int(4),
        ScalarKind::Float => Value::Float(1.1),
        ScalarKind::Float32 => Value::Float(2.2),
        ScalarKind::Decimal => Value::String("1.0".to_string()),
        ScalarKind::Bool => Value::Bool(true),
        ScalarKind::Date => Value::String("2024-01-01".to_string()),
        ScalarKind::Datetime => Value::String("2024-01-01 00:00:00".to_string()),
        ScalarKind::Timestamp => Value::String("2024-01-02 00:00:00".to_string()),
        ScalarKind::Email => Value::String("user@example.com".to_string()),
        ScalarKind::Uuid => Value::String("00000000-0000-0000-0000-000000000000".to_string()),
        ScalarKind::Json | ScalarKind::Any | ScalarKind::Object => {
            let mut map = IndexMap::default();
            map.insert("#".to_string(), Value::String(kind.to_string()));
            Value::Object(map)
        }
    }
}

/// Inverts [`generate_dummy`] for scalar types — `infer_type_from_dummy(generate_dummy(T)) == T`
/// for every supported scalar `T` (testable property, spec §8 invariant 2).
/// Ambiguous scalar encodings (e.g. both `decimal` and the `json`/`any`/
/// `object` family can surface as a string or singleton map) are
/// disambiguated using the `#` marker `generate_dummy` writes for the
/// json/any/object family, and the exact canonical dummy magnitude
/// (1/2/3/4 for the int widths, 1.1/2.2 for the float widths) for the
/// numeric family — `scalar_dummy` assigns each width a distinct literal
/// specifically so this step can recover it.
pub fn infer_type_from_dummy(value: &Value) -> TypeNode {
    match value {
        Value::Null => TypeNode::Unknown,
        Value::Bool(_) => TypeNode::Scalar(ScalarKind::Bool),
        Value::Int(n) => TypeNode::Scalar(infer_int_scalar(*n)),
        Value::Float(f) => TypeNode::Scalar(infer_float_scalar(*f)),
        Value::String(s) => TypeNode::Scalar(infer_string_scalar(s)),
        Value::Array(items) => {
            let elem = items
                .first()
                .map(infer_type_from_dummy)
                .unwrap_or(TypeNode::Unknown);
            TypeNode::array_of(elem)
        }
        Value::Object(fields) => {
            if fields.len() == 1
                && let Some(Value::String(marker)) = fields.get("#")
                && let Ok(kind) = marker.parse::<ScalarKind>()
            {
                return TypeNode::Scalar(kind);
            }
            TypeNode::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), infer_type_from_dummy(v)))
                    .collect(),
            )
        }
    }
}

fn infer_int_scalar(n: i64) -> ScalarKind {
    match n {
        2 => ScalarKind::Int32,
        3 => ScalarKind::Int16,
        4 => ScalarKind::Int8,
        _ => ScalarKind::Int,
    }
}

fn infer_float_scalar(f: f64) -> ScalarKind {
    if f == 2.2 {
        ScalarKind::Float32
    } else {
        ScalarKind::Float
    }
}

fn infer_string_scalar(s: &str) -> ScalarKind {
    if s == "1.0" {
        ScalarKind::Decimal
    } else if s == "2024-01-01" {
        ScalarKind::Date
    } else if s == "2024-01-01 00:00:00" {
        ScalarKind::Datetime
    } else if s == "2024-01-02 00:00:00" {
        ScalarKind::Timestamp
    } else if s == "user@example.com" {
        ScalarKind::Email
    } else if s == "00000000-0000-0000-0000-000000000000" {
        ScalarKind::Uuid
    } else {
        ScalarKind::String
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalizes_aliases() {
        assert_eq!(normalize_scalar_name("integer"), TypeNode::Scalar(ScalarKind::Int));
        assert_eq!(normalize_scalar_name("long"), TypeNode::Scalar(ScalarKind::Int));
        assert_eq!(normalize_scalar_name("smallint"), TypeNode::Scalar(ScalarKind::Int16));
        assert_eq!(normalize_scalar_name("tinyint"), TypeNode::Scalar(ScalarKind::Int8));
        assert_eq!(normalize_scalar_name("varchar"), TypeNode::Scalar(ScalarKind::String));
        assert_eq!(normalize_scalar_name("number"), TypeNode::Scalar(ScalarKind::Float));
        assert_eq!(normalize_scalar_name("numeric"), TypeNode::Scalar(ScalarKind::Decimal));
        assert_eq!(normalize_scalar_name("boolean"), TypeNode::Scalar(ScalarKind::Bool));
    }

    #[test]
    fn trailing_brackets_apply_recursively() {
        assert_eq!(
            normalize_scalar_name("string[]"),
            TypeNode::array_of(TypeNode::Scalar(ScalarKind::String))
        );
        assert_eq!(
            normalize_scalar_name("int[][]"),
            TypeNode::array_of(TypeNode::array_of(TypeNode::Scalar(ScalarKind::Int)))
        );
    }

    #[test]
    fn bare_array_keyword_is_any_array() {
        assert_eq!(
            normalize_scalar_name("array"),
            TypeNode::array_of(TypeNode::Scalar(ScalarKind::Any))
        );
    }

    #[test]
    fn common_type_reference_detection() {
        assert!(is_common_type_reference("User"));
        assert!(is_common_type_reference("./User"));
        assert!(is_common_type_reference("../api/User[]"));
        assert!(is_common_type_reference("/GlobalType"));
        assert!(!is_common_type_reference("user"));
        assert!(!is_common_type_reference("string"));

        match normalize_scalar_name("api/users/User[]") {
            TypeNode::CommonTypeRef { reference, array } => {
                assert_eq!(reference, "api/users/User");
                assert!(array);
            }
            other => panic!("expected CommonTypeRef, got {other:?}"),
        }
    }

    #[test]
    fn dummy_round_trip_for_every_scalar() {
        let kinds = [
            ScalarKind::String,
            ScalarKind::Int,
            ScalarKind::Int8,
            ScalarKind::Int16,
            ScalarKind::Int32,
            ScalarKind::Float,
            ScalarKind::Float32,
            ScalarKind::Decimal,
            ScalarKind::Bool,
            ScalarKind::Date,
            ScalarKind::Datetime,
            ScalarKind::Timestamp,
            ScalarKind::Email,
            ScalarKind::Uuid,
            ScalarKind::Json,
            ScalarKind::Any,
            ScalarKind::Object,
        ];

        for kind in kinds {
            let ty = TypeNode::Scalar(kind);
            let dummy = generate_dummy(&ty);
            assert_eq!(infer_type_from_dummy(&dummy), ty, "round trip failed for {kind}");
        }
    }

    #[test]
    fn dummy_round_trip_for_array_and_object() {
        let ty = TypeNode::Object(
            [
                ("id".to_string(), TypeNode::Scalar(ScalarKind::Int)),
                (
                    "tags".to_string(),
                    TypeNode::array_of(TypeNode::Scalar(ScalarKind::String)),
                ),
            ]
            .into_iter()
            .collect(),
        );
        let dummy = generate_dummy(&ty);
        assert_eq!(infer_type_from_dummy(&dummy), ty);
    }
}

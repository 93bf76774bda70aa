//! Expression environment (C5, spec §4.4).
//!
//! The environment never has real runtime data to evaluate against — it
//! type-checks directive expressions using the canonical dummy values C3
//! generates for the parameter schema, and infers the result type back
//! into the dummy-type vocabulary (spec §4.2). This is what lets
//! `Eval(expr)` report a type without ever running the generated query.

use cel_interpreter::{Context, Program, Value as CelValue};
use snapsql_errors::{ErrorKind, SnapSqlError};
use snapsql_helpers::IndexMap;
use snapsql_types::{generate_dummy, infer_type_from_dummy, ScalarKind, TypeNode, Value};
use std::sync::Arc;

/// One stacked extension of the environment introduced by a `/*# for */`
/// block (spec §4.4 "Loop frames").
#[derive(Debug, Clone)]
pub struct LoopFrame {
    pub variable: String,
    pub element_type: TypeNode,
    pub element_dummy: Value,
}

/// The typed evaluation environment for one statement's directives.
/// Binds every root parameter plus whatever loop frames are currently
/// pushed (spec §4.4).
#[derive(Debug, Clone)]
pub struct ExprEnv {
    root_types: IndexMap<String, TypeNode>,
    root_dummies: IndexMap<String, Value>,
    frames: Vec<LoopFrame>,
}

impl ExprEnv {
    /// Seeds the environment from C4's resolved parameter schema.
    pub fn new(params: &IndexMap<String, TypeNode>) -> Self {
        let root_dummies = params
            .iter()
            .map(|(name, ty)| (name.clone(), generate_dummy(ty)))
            .collect();
        Self {
            root_types: params.clone(),
            root_dummies,
            frames: Vec::new(),
        }
    }

    /// Pushes a loop frame binding `variable` to a sample element of
    /// `list_type`'s element type. When the element type can't be
    /// determined (an empty/unknown array), synthesizes a dummy object
    /// with common member names so arbitrary member access still
    /// type-checks (spec §4.4, §9 open question).
    pub fn enter_loop(&mut self, variable: &str, list_type: &TypeNode) {
        let element_type = list_type.element_type().cloned().unwrap_or(TypeNode::Unknown);
        let element_dummy = match &element_type {
            TypeNode::Unknown => synthetic_loop_element(),
            other => generate_dummy(other),
        };
        self.frames.push(LoopFrame {
            variable: variable.to_string(),
            element_type,
            element_dummy,
        });
    }

    /// Pops the most recently pushed loop frame (LIFO, spec §4.4).
    pub fn exit_loop(&mut self) {
        self.frames.pop();
    }

    fn resolve_dummy(&self, name: &str) -> Option<&Value> {
        self.frames
            .iter()
            .rev()
            .find(|f| f.variable == name)
            .map(|f| &f.element_dummy)
            .or_else(|| self.root_dummies.get(name))
    }

    fn build_context(&self) -> Result<Context<'static>, SnapSqlError> {
        let mut ctx = Context::default();
        for (name, dummy) in &self.root_dummies {
            bind(&mut ctx, name, dummy)?;
        }
        for frame in &self.frames {
            bind(&mut ctx, &frame.variable, &frame.element_dummy)?;
        }
        Ok(ctx)
    }

    /// Compiles and evaluates `expr` against the current environment.
    /// Returns the dummy result value plus its inferred type in the
    /// dummy-type vocabulary (spec §4.4 "Evaluation contract").
    pub fn eval(&self, expr: &str) -> Result<(Value, TypeNode), SnapSqlError> {
        let program = Program::compile(expr).map_err(|e| {
            SnapSqlError::new(
                ErrorKind::InvalidExpression,
                format!("failed to compile expression `{expr}`: {e}"),
            )
        })?;

        let context = self.build_context()?;

        let result = program.execute(&context).map_err(|e| {
            SnapSqlError::new(
                ErrorKind::InvalidExpression,
                format!("failed to evaluate expression `{expr}`: {e}"),
            )
        })?;

        let value = cel_to_value(&result);
        let ty = infer_type_from_dummy(&value);
        Ok((value, ty))
    }
}

/// Evaluates `expr` against a literal runtime value rather than the
/// parameter schema (spec §4.4's "free constants context"), inferring the
/// type from the actual value instead of the dummy-type vocabulary.
pub fn eval_constant(expr: &str, constants: &IndexMap<String, Value>) -> Result<(Value, TypeNode), SnapSqlError> {
    let program = Program::compile(expr).map_err(|e| {
        SnapSqlError::new(
            ErrorKind::InvalidExpression,
            format!("failed to compile expression `{expr}`: {e}"),
        )
    })?;

    let mut ctx = Context::default();
    for (name, value) in constants {
        bind(&mut ctx, name, value)?;
    }

    let result = program.execute(&ctx).map_err(|e| {
        SnapSqlError::new(
            ErrorKind::InvalidExpression,
            format!("failed to evaluate expression `{expr}`: {e}"),
        )
    })?;

    let value = cel_to_value(&result);
    let ty = infer_type_from_dummy(&value);
    Ok((value, ty))
}

fn synthetic_loop_element() -> Value {
    let mut fields = IndexMap::default();
    fields.insert("id".to_string(), Value::Int(1));
    fields.insert("name".to_string(), Value::String("dummy".to_string()));
    fields.insert(
        "tags".to_string(),
        Value::Array(vec![
            Value::String("tag1".to_string()),
            Value::String("tag2".to_string()),
        ]),
    );
    fields.insert("value".to_string(), Value::Int(1));
    Value::Object(fields)
}

fn bind(ctx: &mut Context<'_>, name: &str, value: &Value) -> Result<(), SnapSqlError> {
    ctx.add_variable(name, value_to_cel(value)).map_err(|e| {
        SnapSqlError::new(
            ErrorKind::InvalidExpression,
            format!("failed to bind `{name}` into the expression environment: {e}"),
        )
    })
}

fn value_to_cel(value: &Value) -> CelValue {
    match value {
        Value::Null => CelValue::Null,
        Value::Bool(b) => CelValue::Bool(*b),
        Value::Int(i) => CelValue::Int(*i),
        Value::Float(f) => CelValue::Float(*f),
        Value::String(s) => CelValue::String(Arc::new(s.clone())),
        Value::Array(items) => CelValue::List(Arc::new(items.iter().map(value_to_cel).collect())),
        Value::Object(fields) => {
            let map: std::collections::HashMap<cel_interpreter::objects::Key, CelValue> = fields
                .iter()
                .map(|(k, v)| (cel_interpreter::objects::Key::String(Arc::new(k.clone())), value_to_cel(v)))
                .collect();
            CelValue::Map(cel_interpreter::objects::Map { map: Arc::new(map) })
        }
    }
}

fn cel_to_value(value: &CelValue) -> Value {
    match value {
        CelValue::Null => Value::Null,
        CelValue::Bool(b) => Value::Bool(*b),
        CelValue::Int(i) => Value::Int(*i),
        CelValue::UInt(u) => Value::Int(*u as i64),
        CelValue::Float(f) => Value::Float(*f),
        CelValue::String(s) => Value::String(s.as_str().to_string()),
        CelValue::Bytes(b) => Value::String(String::from_utf8_lossy(b).to_string()),
        CelValue::List(items) => Value::Array(items.iter().map(cel_to_value).collect()),
        CelValue::Map(m) => {
            let mut fields = IndexMap::default();
            for (k, v) in m.map.iter() {
                let key = match k {
                    cel_interpreter::objects::Key::String(s) => s.as_str().to_string(),
                    cel_interpreter::objects::Key::Int(i) => i.to_string(),
                    cel_interpreter::objects::Key::Uint(u) => u.to_string(),
                    cel_interpreter::objects::Key::Bool(b) => b.to_string(),
                };
                fields.insert(key, cel_to_value(v));
            }
            Value::Object(fields)
        }
        CelValue::Function(name, _) => Value::String(name.to_string()),
        CelValue::Duration(d) => Value::String(format!("{d}")),
        CelValue::Timestamp(t) => Value::String(t.to_rfc3339()),
    }
}

/// Maps a normalized parameter type to the expression language's type
/// vocabulary (spec §4.4 table). This is informational — `cel-interpreter`
/// is dynamically typed, so the mapping documents intent for tooling
/// rather than driving a static declaration step.
pub fn expression_type_name(ty: &TypeNode) -> &'static str {
    match ty {
        TypeNode::Scalar(ScalarKind::String | ScalarKind::Date | ScalarKind::Email | ScalarKind::Uuid) => "string",
        TypeNode::Scalar(ScalarKind::Int | ScalarKind::Int8 | ScalarKind::Int16 | ScalarKind::Int32) => "int",
        TypeNode::Scalar(ScalarKind::Float | ScalarKind::Float32) => "double",
        TypeNode::Scalar(ScalarKind::Decimal) => "decimal",
        TypeNode::Scalar(ScalarKind::Bool) => "bool",
        TypeNode::Scalar(ScalarKind::Datetime | ScalarKind::Timestamp) => "timestamp",
        TypeNode::Scalar(ScalarKind::Json) => "map<string, dyn>",
        TypeNode::Scalar(ScalarKind::Any | ScalarKind::Object) => "dyn",
        TypeNode::Array(_) => "list",
        TypeNode::Object(_) => "dyn",
        TypeNode::CommonTypeRef { .. } => "dyn",
        TypeNode::Unknown => "dyn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params() -> IndexMap<String, TypeNode> {
        let mut m = IndexMap::default();
        m.insert("limit".to_string(), TypeNode::Scalar(ScalarKind::Int));
        m.insert(
            "users".to_string(),
            TypeNode::array_of(TypeNode::Object(
                [
                    ("id".to_string(), TypeNode::Scalar(ScalarKind::Int)),
                    ("name".to_string(), TypeNode::Scalar(ScalarKind::String)),
                ]
                .into_iter()
                .collect(),
            )),
        );
        m
    }

    #[test]
    fn evaluates_scalar_parameter_reference() {
        let env = ExprEnv::new(&params());
        let (value, ty) = env.eval("limit").unwrap();
        assert_eq!(value, Value::Int(1));
        assert_eq!(ty, TypeNode::Scalar(ScalarKind::Int));
    }

    /// S4 — loop expression type inference (spec §8 scenario S4).
    #[test]
    fn s4_loop_expression_type_inference() {
        let mut env = ExprEnv::new(&params());
        let users_ty = params().get("users").unwrap().clone();
        env.enter_loop("u", &users_ty);

        let (_, ty) = env.eval("u.name").unwrap();
        assert_eq!(ty, TypeNode::Scalar(ScalarKind::String));

        env.exit_loop();
        assert!(env.eval("u.name").is_err(), "u should not resolve after the frame is popped");
    }

    #[test]
    fn empty_array_loop_synthesizes_typed_dummy_element() {
        let mut env = ExprEnv::new(&IndexMap::default());
        env.enter_loop("item", &TypeNode::array_of(TypeNode::Unknown));
        let (_, ty) = env.eval("item.name").unwrap();
        assert_eq!(ty, TypeNode::Scalar(ScalarKind::String));
    }
}

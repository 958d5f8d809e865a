use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// JSON shape a module parameter must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Bool,
    Object,
    Array,
    Any,
}

impl ParamKind {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Number => write!(f, "number"),
            Self::Bool => write!(f, "bool"),
            Self::Object => write!(f, "object"),
            Self::Array => write!(f, "array"),
            Self::Any => write!(f, "any"),
        }
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamField {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

/// Structural description of the parameters a module accepts.
///
/// Only shapes are checked here; range checks and cross references belong to
/// the module's own `validate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParamSchema {
    fields: Vec<ParamField>,
    allow_unknown: bool,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &'static str, kind: ParamKind) -> Self {
        self.fields.push(ParamField {
            name,
            kind,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: &'static str, kind: ParamKind) -> Self {
        self.fields.push(ParamField {
            name,
            kind,
            required: false,
        });
        self
    }

    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    pub fn fields(&self) -> &[ParamField] {
        &self.fields
    }

    /// Returns one message per problem, each prefixed with the parameter path.
    pub fn check(&self, params: &Value) -> Vec<String> {
        let object = match params.as_object() {
            Some(object) => object,
            None => {
                return vec![format!(
                    "params: expected object, got {}",
                    json_type_name(params)
                )]
            }
        };

        let mut issues = Vec::new();

        for field in &self.fields {
            match object.get(field.name) {
                Some(value) if !field.kind.matches(value) => issues.push(format!(
                    "params.{}: expected {}, got {}",
                    field.name,
                    field.kind,
                    json_type_name(value)
                )),
                None if field.required => {
                    issues.push(format!("params.{}: required parameter is missing", field.name))
                }
                _ => {}
            }
        }

        if !self.allow_unknown {
            for key in object.keys() {
                if !self.fields.iter().any(|f| f.name == key) {
                    issues.push(format!("params.{}: unknown parameter", key));
                }
            }
        }

        issues
    }
}

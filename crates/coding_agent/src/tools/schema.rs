use serde_json::{json, Map, Value};

use super::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    /// JSON number, or a string holding one.
    Number,
    Boolean,
}

impl ParamType {
    fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => {
                value.is_number()
                    || value
                        .as_str()
                        .is_some_and(|text| text.trim().parse::<f64>().is_ok())
            }
            Self::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamType,
    pub description: &'static str,
    pub default: Option<Value>,
    pub minimum: Option<i64>,
}

/// Declarative object shape for a tool's arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolSchema {
    params: Vec<Param>,
    required: Vec<&'static str>,
    additional_properties: bool,
}

impl ToolSchema {
    #[must_use]
    pub fn object() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn string(self, name: &'static str, description: &'static str) -> Self {
        self.param(name, ParamType::String, description)
    }

    #[must_use]
    pub fn integer(self, name: &'static str, description: &'static str) -> Self {
        self.param(name, ParamType::Integer, description)
    }

    #[must_use]
    pub fn number(self, name: &'static str, description: &'static str) -> Self {
        self.param(name, ParamType::Number, description)
    }

    #[must_use]
    pub fn boolean(self, name: &'static str, description: &'static str) -> Self {
        self.param(name, ParamType::Boolean, description)
    }

    #[must_use]
    pub fn param(mut self, name: &'static str, kind: ParamType, description: &'static str) -> Self {
        self.params.push(Param {
            name,
            kind,
            description,
            default: None,
            minimum: None,
        });
        self
    }

    /// Sets the advertised default of the most recently added parameter.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        if let Some(param) = self.params.last_mut() {
            param.default = Some(value);
        }
        self
    }

    /// Sets the inclusive minimum of the most recently added integer parameter.
    #[must_use]
    pub fn minimum(mut self, minimum: i64) -> Self {
        if let Some(param) = self.params.last_mut() {
            param.minimum = Some(minimum);
        }
        self
    }

    #[must_use]
    pub fn required(mut self, names: &[&'static str]) -> Self {
        self.required.extend_from_slice(names);
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// JSON Schema advertised to the model.
    pub fn to_json(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            let mut property = Map::new();
            property.insert("type".to_string(), json!(param.kind.json_type()));
            if !param.description.is_empty() {
                property.insert("description".to_string(), json!(param.description));
            }
            if let Some(default) = &param.default {
                property.insert("default".to_string(), default.clone());
            }
            if let Some(minimum) = param.minimum {
                property.insert("minimum".to_string(), json!(minimum));
            }
            properties.insert(param.name.to_string(), Value::Object(property));
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
            "additionalProperties": self.additional_properties,
        })
    }

    /// Checks required keys, unknown keys, value types and integer minimums.
    ///
    /// `null` counts as absent for optional parameters.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<(), ToolError> {
        for name in &self.required {
            if args.get(*name).map_or(true, Value::is_null) {
                return Err(ToolError::Validation(format!("Missing required arg: {name}")));
            }
        }

        for (key, value) in args {
            let Some(param) = self.params.iter().find(|param| param.name == key) else {
                if self.additional_properties {
                    continue;
                }
                return Err(ToolError::Validation(format!("Unexpected arg: {key}")));
            };

            if value.is_null() {
                continue;
            }

            if !param.kind.accepts(value) {
                return Err(ToolError::Validation(format!(
                    "Arg {key} must be of type {}",
                    param.kind.json_type()
                )));
            }

            if let (Some(minimum), Some(number)) = (param.minimum, value.as_i64()) {
                if number < minimum {
                    return Err(ToolError::Validation(format!(
                        "Arg {key} must be >= {minimum}"
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Typed read access to validated tool arguments.
#[derive(Debug, Clone, Copy)]
pub struct ToolArgs<'a> {
    values: &'a Map<String, Value>,
}

impl<'a> ToolArgs<'a> {
    #[must_use]
    pub fn new(values: &'a Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn str(&self, name: &str) -> Option<&'a str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn str_or(&self, name: &str, default: &'a str) -> &'a str {
        self.str(name).unwrap_or(default)
    }

    /// Non-blank string argument.
    pub fn required_str(&self, name: &str) -> Result<&'a str, ToolError> {
        self.str(name)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ToolError::Validation(format!("Missing required arg: {name}")))
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    pub fn u64_or(&self, name: &str, default: u64) -> u64 {
        self.values
            .get(name)
            .and_then(Value::as_u64)
            .unwrap_or(default)
    }

    /// Number argument, accepting numeric strings.
    pub fn f64(&self, name: &str) -> Option<f64> {
        match self.values.get(name)? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

//! Tool catalog: typed parameter metadata, argument validation and input schemas.
//!
//! Owns tool *metadata* only. Handlers live in the registry next to the entry;
//! the catalog never executes anything.

use crate::envelope::enums::{RiskSemantic, ToolCategory};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

// =============================================================================
// Parameter types
// =============================================================================

/// Parameter type for tool inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Int,
    Float,
    Bool,
    StringList,
    FloatList,
    Object,
    Enum(Vec<String>),
    Optional(Box<ParamType>),
}

impl ParamType {
    /// Wrap a type so that `null` is accepted.
    pub fn optional(inner: ParamType) -> Self {
        ParamType::Optional(Box::new(inner))
    }

    /// Validate a JSON value against this parameter type.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        match self {
            ParamType::String => expect(value.is_string(), "string", value),
            ParamType::Int => expect(value.is_i64() || value.is_u64(), "integer", value),
            ParamType::Float => expect(value.is_number(), "number", value),
            ParamType::Bool => expect(value.is_boolean(), "boolean", value),
            ParamType::Object => expect(value.is_object(), "object", value),
            ParamType::StringList => validate_list(value, |v| v.is_string(), "string"),
            ParamType::FloatList => validate_list(value, |v| v.is_number(), "number"),
            ParamType::Enum(variants) => {
                if let Some(s) = value.as_str() {
                    if variants.iter().any(|v| v == s) {
                        Ok(())
                    } else {
                        Err(format!(
                            "invalid enum value '{}', expected one of: {}",
                            s,
                            variants.join(", ")
                        ))
                    }
                } else {
                    Err(format!(
                        "expected string for enum, got {}",
                        value_type_name(value)
                    ))
                }
            }
            ParamType::Optional(inner) => {
                if value.is_null() {
                    Ok(())
                } else {
                    inner.validate(value)
                }
            }
        }
    }

    /// JSON-schema fragment for this type.
    pub fn json_schema(&self) -> Value {
        match self {
            ParamType::String => json!({"type": "string"}),
            ParamType::Int => json!({"type": "integer"}),
            ParamType::Float => json!({"type": "number"}),
            ParamType::Bool => json!({"type": "boolean"}),
            ParamType::Object => json!({"type": "object"}),
            ParamType::StringList => json!({"type": "array", "items": {"type": "string"}}),
            ParamType::FloatList => json!({"type": "array", "items": {"type": "number"}}),
            ParamType::Enum(variants) => json!({"type": "string", "enum": variants}),
            ParamType::Optional(inner) => {
                let mut schema = inner.json_schema();
                if let Some(ty) = schema.get("type").cloned() {
                    schema["type"] = json!([ty, "null"]);
                }
                schema
            }
        }
    }

    /// Human-readable type name.
    pub fn display_name(&self) -> String {
        match self {
            ParamType::String => "string".to_string(),
            ParamType::Int => "integer".to_string(),
            ParamType::Float => "number".to_string(),
            ParamType::Bool => "boolean".to_string(),
            ParamType::Object => "object".to_string(),
            ParamType::StringList => "string[]".to_string(),
            ParamType::FloatList => "number[]".to_string(),
            ParamType::Enum(variants) => format!("enum({})", variants.join("|")),
            ParamType::Optional(inner) => format!("{}?", inner.display_name()),
        }
    }
}

fn expect(ok: bool, expected: &str, value: &Value) -> Result<(), String> {
    if ok {
        Ok(())
    } else {
        Err(format!("expected {}, got {}", expected, value_type_name(value)))
    }
}

fn validate_list(value: &Value, item_ok: impl Fn(&Value) -> bool, item: &str) -> Result<(), String> {
    let arr = value
        .as_array()
        .ok_or_else(|| format!("expected array, got {}", value_type_name(value)))?;
    for (i, v) in arr.iter().enumerate() {
        if !item_ok(v) {
            return Err(format!(
                "expected {} at index {}, got {}",
                item,
                i,
                value_type_name(v)
            ));
        }
    }
    Ok(())
}

/// JSON type name of a value, as used in validation messages.
pub(crate) fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Parameter definition
// =============================================================================

/// A single parameter definition for a tool.
///
/// `default` is captured once when the schema is built and cloned into each
/// call, so no call can observe another call's mutation of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamDef {
    /// Parameter the caller must supply.
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            default: None,
        }
    }

    /// Parameter with a declared default.
    pub fn with_default(
        name: &str,
        param_type: ParamType,
        description: &str,
        default: Value,
    ) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            default: Some(default),
        }
    }

    /// Nullable parameter defaulting to `null`.
    pub fn optional(name: &str, inner: ParamType, description: &str) -> Self {
        Self::with_default(name, ParamType::optional(inner), description, Value::Null)
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none() && !matches!(self.param_type, ParamType::Optional(_))
    }
}

// =============================================================================
// Tool entry
// =============================================================================

/// Complete tool metadata entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEntry {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamDef>,
    pub category: ToolCategory,
    pub risk: RiskSemantic,
}

impl ToolEntry {
    /// One-line signature: `name(param1: type, param2?: type): description`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| {
                let optional = if p.is_required() { "" } else { "?" };
                format!("{}{}: {}", p.name, optional, p.param_type.display_name())
            })
            .collect();

        format!("{}({}): {}", self.name, params.join(", "), self.description)
    }

    /// JSON-schema object describing the tool's arguments (MCP `inputSchema`).
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            let mut schema = param.param_type.json_schema();
            schema["description"] = Value::String(param.description.clone());
            if let Some(default) = &param.default {
                schema["default"] = default.clone();
            }
            properties.insert(param.name.clone(), schema);
            if param.is_required() {
                required.push(Value::String(param.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Validate arguments against the parameter definitions.
    ///
    /// Returns a list of validation errors (empty = valid).
    pub fn validate_args(&self, args: &Map<String, Value>) -> Vec<String> {
        let mut errors = Vec::new();

        for param_def in &self.parameters {
            if param_def.is_required() && !args.contains_key(&param_def.name) {
                errors.push(format!("Missing required parameter: {}", param_def.name));
            }
        }

        let known_names: HashMap<&str, &ParamDef> = self
            .parameters
            .iter()
            .map(|p| (p.name.as_str(), p))
            .collect();

        for (key, value) in args {
            if let Some(param_def) = known_names.get(key.as_str()) {
                if let Err(e) = param_def.param_type.validate(value) {
                    errors.push(format!("Parameter '{}': {}", key, e));
                }
            } else {
                errors.push(format!("Unknown parameter: {}", key));
            }
        }

        errors
    }

    /// Fill in default values for missing parameters. Supplied values are never overwritten.
    pub fn fill_defaults(&self, args: &mut Map<String, Value>) {
        for param_def in &self.parameters {
            if !args.contains_key(&param_def.name) {
                if let Some(default) = &param_def.default {
                    args.insert(param_def.name.clone(), default.clone());
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_entry() -> ToolEntry {
        ToolEntry {
            name: "acquire_image".to_string(),
            description: "Acquire a new microscopy image".to_string(),
            parameters: vec![
                ParamDef::with_default("mode", ParamType::String, "Acquisition mode", json!("TEM")),
                ParamDef::with_default(
                    "exposure_time",
                    ParamType::Float,
                    "Exposure time in seconds",
                    json!(0.1),
                ),
                ParamDef::required("label", ParamType::String, "Image label"),
                ParamDef::optional("spot_size", ParamType::Int, "Spot size"),
            ],
            category: ToolCategory::Acquisition,
            risk: RiskSemantic::ReadOnly,
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_validate_args_valid() {
        let entry = sample_entry();
        let errors = entry.validate_args(&args(json!({"label": "grid-3"})));
        assert!(errors.is_empty(), "Expected no errors, got: {:?}", errors);
    }

    #[test]
    fn test_validate_args_missing_required() {
        let entry = sample_entry();
        let errors = entry.validate_args(&args(json!({})));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Missing required parameter: label"));
    }

    #[test]
    fn test_validate_args_wrong_type() {
        let entry = sample_entry();
        let errors = entry.validate_args(&args(json!({"label": "x", "exposure_time": "fast"})));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("expected number"));
    }

    #[test]
    fn test_validate_args_unknown_param() {
        let entry = sample_entry();
        let errors = entry.validate_args(&args(json!({"label": "x", "bogus": true})));
        assert_eq!(errors, vec!["Unknown parameter: bogus".to_string()]);
    }

    #[test]
    fn test_optional_accepts_null_and_inner_type() {
        let entry = sample_entry();
        assert!(entry
            .validate_args(&args(json!({"label": "x", "spot_size": null})))
            .is_empty());
        assert!(entry
            .validate_args(&args(json!({"label": "x", "spot_size": 3})))
            .is_empty());
        assert_eq!(
            entry
                .validate_args(&args(json!({"label": "x", "spot_size": 3.5})))
                .len(),
            1
        );
    }

    #[test]
    fn test_fill_defaults() {
        let entry = sample_entry();
        let mut params = args(json!({"mode": "STEM"}));
        entry.fill_defaults(&mut params);
        assert_eq!(params["mode"], "STEM");
        assert_eq!(params["exposure_time"], 0.1);
        assert_eq!(params["spot_size"], Value::Null);
        assert!(!params.contains_key("label"));
    }

    #[test]
    fn test_fill_defaults_is_isolated_between_calls() {
        let entry = sample_entry();
        let mut first = Map::new();
        entry.fill_defaults(&mut first);
        first.insert("mode".to_string(), json!("mutated"));

        let mut second = Map::new();
        entry.fill_defaults(&mut second);
        assert_eq!(second["mode"], "TEM");
    }

    #[test]
    fn test_signature_format() {
        let entry = sample_entry();
        assert_eq!(
            entry.signature(),
            "acquire_image(mode?: string, exposure_time?: number, label: string, spot_size?: integer?): Acquire a new microscopy image"
        );
    }

    #[test]
    fn test_input_schema() {
        let schema = sample_entry().input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["label"]));
        assert_eq!(schema["properties"]["exposure_time"]["default"], json!(0.1));
        assert_eq!(
            schema["properties"]["spot_size"]["type"],
            json!(["integer", "null"])
        );
    }

    #[test]
    fn test_param_type_enum_validation() {
        let pt = ParamType::Enum(vec!["TEM".to_string(), "STEM".to_string()]);
        assert!(pt.validate(&json!("TEM")).is_ok());
        assert!(pt.validate(&json!("SEM")).is_err());
        assert!(pt.validate(&json!(42)).is_err());
    }

    #[test]
    fn test_param_type_list_validation() {
        assert!(ParamType::StringList.validate(&json!(["a", "b"])).is_ok());
        assert!(ParamType::StringList.validate(&json!([1, 2])).is_err());
        assert!(ParamType::FloatList.validate(&json!([1, 2.5])).is_ok());
        assert!(ParamType::FloatList.validate(&json!("not array")).is_err());
    }

    proptest! {
        #[test]
        fn prop_float_accepts_any_finite_number(x in proptest::num::f64::NORMAL) {
            prop_assert!(ParamType::Float.validate(&json!(x)).is_ok());
        }

        #[test]
        fn prop_int_rejects_strings(s in "[a-z]{0,12}") {
            prop_assert!(ParamType::Int.validate(&json!(s)).is_err());
        }
    }
}

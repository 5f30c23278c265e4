//! JSON Schema generation and validation for tool inputs

use anyhow::{anyhow, Result};
use serde_json::{json, Map, Value};

use crate::catalog::{CommandSpec, OptionKind, ParamKind};

/// Input schema advertised for a command: one property per positional
/// parameter and option, required positionals listed, nothing else accepted.
pub fn input_schema(spec: &CommandSpec) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in &spec.params {
        let mut property = match param.kind {
            ParamKind::String => json!({ "type": "string" }),
            ParamKind::StringList => json!({
                "anyOf": [
                    { "type": "string" },
                    { "type": "array", "items": { "type": "string" } }
                ]
            }),
        };
        describe(&mut property, &param.description);
        properties.insert(param.name.clone(), property);
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    for option in &spec.options {
        let mut property = match option.kind {
            OptionKind::Bool => json!({ "type": "boolean", "default": false }),
            OptionKind::String => json!({ "type": "string" }),
        };
        let description = if option.description.is_empty() {
            format!("Pass {}", option.flag)
        } else {
            format!("{} ({})", option.description, option.flag)
        };
        describe(&mut property, &description);
        properties.insert(option.name.clone(), property);
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

fn describe(property: &mut Value, description: &str) {
    if description.is_empty() {
        return;
    }
    if let Value::Object(map) = property {
        map.insert("description".into(), Value::String(description.to_string()));
    }
}

/// Compile a schema, failing if it is not a valid JSON Schema document
pub fn compile(schema: &Value) -> Result<jsonschema::Validator> {
    jsonschema::validator_for(schema).map_err(|e| anyhow!("Invalid JSON schema: {e}"))
}

//! Typed tool requests and argument-vector assembly
//!
//! A [`ToolRequest`] is the checked form of a call's JSON arguments against
//! one [`CommandSpec`]. [`build_argv`] turns it into the exact tokens handed to
//! the external binary:
//!
//! `[binary] + base_args + positional values (declared order) + option tokens (declared order)`

use serde_json::Value;
use std::collections::HashMap;

use crate::catalog::{CommandSpec, OptionKind, ParamKind};
use crate::error::ExecError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Single(String),
    List(Vec<String>),
}

impl ParamValue {
    /// Non-empty values in order; a single value becomes a one-element list
    fn values(&self) -> Vec<&str> {
        let all: Vec<&str> = match self {
            ParamValue::Single(v) => vec![v.as_str()],
            ParamValue::List(vs) => vs.iter().map(String::as_str).collect(),
        };
        all.into_iter().filter(|v| !v.trim().is_empty()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Bool(bool),
    Text(String),
}

/// Argument values for one invocation, keyed by parameter/option name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolRequest {
    params: HashMap<String, ParamValue>,
    options: HashMap<String, OptionValue>,
}

impl ToolRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.params
            .insert(name.to_string(), ParamValue::Single(value.to_string()));
        self
    }

    pub fn list(mut self, name: &str, values: &[&str]) -> Self {
        self.params.insert(
            name.to_string(),
            ParamValue::List(values.iter().map(|v| v.to_string()).collect()),
        );
        self
    }

    pub fn flag(mut self, name: &str, enabled: bool) -> Self {
        self.options
            .insert(name.to_string(), OptionValue::Bool(enabled));
        self
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.options
            .insert(name.to_string(), OptionValue::Text(value.to_string()));
        self
    }

    /// Parse a JSON argument object against `spec`.
    ///
    /// Rejects names the spec does not declare and values of the wrong shape.
    /// `null` is treated as absent. Required-ness is checked later by
    /// [`build_argv`] so that rejected calls still reach the audit log.
    pub fn from_json(spec: &CommandSpec, arguments: &Value) -> Result<Self, ExecError> {
        let object = match arguments {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(ExecError::InvalidArgument {
                    param: "arguments".into(),
                    reason: format!("expected an object, got {}", json_type(other)),
                })
            }
        };

        let mut request = Self::default();
        for (name, value) in object {
            if value.is_null() {
                continue;
            }
            if let Some(param) = spec.param_spec(name) {
                let parsed = match (param.kind, value) {
                    (ParamKind::String, Value::String(s)) => ParamValue::Single(s.clone()),
                    (ParamKind::StringList, Value::String(s)) => ParamValue::List(vec![s.clone()]),
                    (ParamKind::StringList, Value::Array(items)) => {
                        ParamValue::List(string_items(name, items)?)
                    }
                    (kind, other) => {
                        return Err(ExecError::InvalidArgument {
                            param: name.clone(),
                            reason: format!("expected {}, got {}", param_type(kind), json_type(other)),
                        })
                    }
                };
                request.params.insert(name.clone(), parsed);
            } else if let Some(option) = spec.option_spec(name) {
                let parsed = match (option.kind, value) {
                    (OptionKind::Bool, Value::Bool(b)) => OptionValue::Bool(*b),
                    (OptionKind::String, Value::String(s)) => OptionValue::Text(s.clone()),
                    (OptionKind::Bool, other) => {
                        return Err(ExecError::InvalidArgument {
                            param: name.clone(),
                            reason: format!("expected a boolean, got {}", json_type(other)),
                        })
                    }
                    (OptionKind::String, other) => {
                        return Err(ExecError::InvalidArgument {
                            param: name.clone(),
                            reason: format!("expected a string, got {}", json_type(other)),
                        })
                    }
                };
                request.options.insert(name.clone(), parsed);
            } else {
                return Err(ExecError::InvalidArgument {
                    param: name.clone(),
                    reason: format!("'{}' does not accept this parameter", spec.name),
                });
            }
        }

        Ok(request)
    }
}

/// `[binary] + base_args`, the prefix every invocation of `spec` starts with
pub fn base_argv(binary: &str, spec: &CommandSpec) -> Vec<String> {
    let mut argv = Vec::with_capacity(1 + spec.base_args.len());
    argv.push(binary.to_string());
    argv.extend(spec.base_args.iter().cloned());
    argv
}

/// Assemble the full argument vector for one invocation
pub fn build_argv(
    binary: &str,
    spec: &CommandSpec,
    request: &ToolRequest,
) -> Result<Vec<String>, ExecError> {
    let mut argv = base_argv(binary, spec);

    for param in &spec.params {
        let values = request
            .params
            .get(&param.name)
            .map(ParamValue::values)
            .unwrap_or_default();

        if values.is_empty() {
            if param.required {
                return Err(ExecError::MissingArgument {
                    param: param.name.clone(),
                });
            }
            continue;
        }

        if param.kind == ParamKind::String && values.len() > 1 {
            return Err(ExecError::InvalidArgument {
                param: param.name.clone(),
                reason: "expected a single value".into(),
            });
        }

        for value in values {
            // A leading dash would be parsed by brew as a flag
            if value.starts_with('-') {
                return Err(ExecError::InvalidArgument {
                    param: param.name.clone(),
                    reason: format!("value '{value}' must not start with '-'"),
                });
            }
            argv.push(value.to_string());
        }
    }

    for option in &spec.options {
        match (option.kind, request.options.get(&option.name)) {
            (_, None) | (OptionKind::Bool, Some(OptionValue::Bool(false))) => {}
            (OptionKind::Bool, Some(OptionValue::Bool(true))) => {
                argv.push(option.flag.clone());
            }
            (OptionKind::String, Some(OptionValue::Text(value))) => {
                if !value.trim().is_empty() {
                    argv.push(option.flag.clone());
                    argv.push(value.clone());
                }
            }
            (OptionKind::Bool, Some(OptionValue::Text(_))) => {
                return Err(ExecError::InvalidArgument {
                    param: option.name.clone(),
                    reason: "expected a boolean".into(),
                });
            }
            (OptionKind::String, Some(OptionValue::Bool(_))) => {
                return Err(ExecError::InvalidArgument {
                    param: option.name.clone(),
                    reason: "expected a string".into(),
                });
            }
        }
    }

    Ok(argv)
}

fn string_items(name: &str, items: &[Value]) -> Result<Vec<String>, ExecError> {
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(ExecError::InvalidArgument {
                param: name.to_string(),
                reason: format!("list items must be strings, got {}", json_type(other)),
            }),
        })
        .collect()
}

fn param_type(kind: ParamKind) -> &'static str {
    match kind {
        ParamKind::String => "a string",
        ParamKind::StringList => "a string or list of strings",
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

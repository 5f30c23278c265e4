//! Tool Registry — stores tool definitions and dispatches calls to their handlers

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::error::{RegistrationError, ToolError};

/// What a caller sees when listing tools
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// A callable tool. Returns the text to hand back on success.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<String, ToolError>;
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// In-memory tool registry
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique and descriptions non-empty.
    pub fn register_tool(
        &mut self,
        definition: ToolDefinition,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistrationError> {
        if definition.description.trim().is_empty() {
            return Err(RegistrationError::MissingDescription(definition.name));
        }
        if self.tools.contains_key(&definition.name) {
            return Err(RegistrationError::DuplicateTool(definition.name));
        }

        info!("Registered tool: {}", definition.name);
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                handler,
            },
        );
        Ok(())
    }

    pub fn get_tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|t| &t.definition)
    }

    /// All definitions, sorted by name
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut tools: Vec<_> = self.tools.values().map(|t| t.definition.clone()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Dispatch a call to the named tool
    pub async fn call(&self, name: &str, arguments: Value) -> Result<String, ToolError> {
        let handler = self
            .tools
            .get(name)
            .map(|t| Arc::clone(&t.handler))
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        handler.call(arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, arguments: Value) -> Result<String, ToolError> {
            Ok(arguments.to_string())
        }
    }

    fn definition(name: &str, description: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: json!({"type": "object"}),
        }
    }

    #[test]
    fn test_register_and_get_tool() {
        let mut reg = ToolRegistry::new();
        reg.register_tool(definition("install", "Install"), Arc::new(Echo))
            .unwrap();

        let tool = reg.get_tool("install").unwrap();
        assert_eq!(tool.description, "Install");
        assert_eq!(reg.tool_count(), 1);
    }

    #[test]
    fn test_get_nonexistent_tool() {
        let reg = ToolRegistry::new();
        assert!(reg.get_tool("nonexistent").is_none());
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let mut reg = ToolRegistry::new();
        reg.register_tool(definition("list", "List"), Arc::new(Echo))
            .unwrap();
        let err = reg
            .register_tool(definition("list", "List again"), Arc::new(Echo))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateTool(ref n) if n == "list"));
        assert_eq!(reg.get_tool("list").unwrap().description, "List");
    }

    #[test]
    fn test_register_without_description_rejected() {
        let mut reg = ToolRegistry::new();
        let err = reg
            .register_tool(definition("doctor", ""), Arc::new(Echo))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::MissingDescription(_)));
        assert_eq!(reg.tool_count(), 0);
    }

    #[test]
    fn test_list_tools_sorted() {
        let mut reg = ToolRegistry::new();
        for name in ["upgrade", "doctor", "install"] {
            reg.register_tool(definition(name, "desc"), Arc::new(Echo))
                .unwrap();
        }
        let names: Vec<_> = reg.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["doctor", "install", "upgrade"]);
    }

    #[test]
    fn test_definition_serializes_camel_case_schema() {
        let value = serde_json::to_value(definition("info", "Info")).unwrap();
        assert!(value.get("inputSchema").is_some());
        assert!(value.get("input_schema").is_none());
    }

    #[tokio::test]
    async fn test_call_dispatches() {
        let mut reg = ToolRegistry::new();
        reg.register_tool(definition("echo", "Echo"), Arc::new(Echo))
            .unwrap();
        let out = reg.call("echo", json!({"a": 1})).await.unwrap();
        assert_eq!(out, r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_call_unknown_tool() {
        let reg = ToolRegistry::new();
        let err = reg.call("missing", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(ref n) if n == "missing"));
    }
}

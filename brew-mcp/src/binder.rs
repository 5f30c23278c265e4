//! Tool binder — turns every catalog entry into one registered tool

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::catalog::{Catalog, CommandSpec};
use crate::error::{RegistrationError, ToolError};
use crate::executor::Executor;
use crate::registry::{ToolDefinition, ToolHandler, ToolRegistry};
use crate::request::ToolRequest;
use crate::schema;

/// Handler for a single catalog command
pub struct CommandTool {
    spec: Arc<CommandSpec>,
    executor: Arc<Executor>,
    /// Checks shapes and unknown names; required parameters are left to the
    /// executor so that a missing one is reported and audited as such.
    validator: jsonschema::Validator,
}

impl CommandTool {
    pub fn new(
        spec: Arc<CommandSpec>,
        executor: Arc<Executor>,
    ) -> Result<(Self, ToolDefinition), RegistrationError> {
        let input_schema = schema::input_schema(&spec);

        let mut call_schema = input_schema.clone();
        if let Value::Object(map) = &mut call_schema {
            map.remove("required");
        }
        let invalid = |e: anyhow::Error| RegistrationError::InvalidSchema {
            tool: spec.name.clone(),
            reason: e.to_string(),
        };
        schema::compile(&input_schema).map_err(invalid)?;
        let validator = schema::compile(&call_schema).map_err(invalid)?;

        let definition = ToolDefinition {
            name: spec.name.clone(),
            description: spec.description.clone(),
            input_schema,
        };
        Ok((
            Self {
                spec,
                executor,
                validator,
            },
            definition,
        ))
    }
}

#[async_trait]
impl ToolHandler for CommandTool {
    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            Value::Object(mut map) => {
                map.retain(|_, v| !v.is_null());
                Value::Object(map)
            }
            other => other,
        };

        if let Err(error) = self.validator.validate(&arguments) {
            return Err(ToolError::InvalidArguments(error.to_string()));
        }

        let request = ToolRequest::from_json(&self.spec, &arguments)?;
        debug!("Calling {} with {:?}", self.spec.name, request);

        let result = self.executor.execute(&self.spec, &request).await?;
        Ok(result.into_output()?)
    }
}

/// Register one tool per catalog entry. Any failure aborts the whole set.
pub fn register_all(
    catalog: &Catalog,
    executor: Arc<Executor>,
    registry: &mut ToolRegistry,
) -> Result<usize, RegistrationError> {
    let mut registered = 0;
    for spec in catalog.iter() {
        let (tool, definition) = CommandTool::new(Arc::clone(spec), Arc::clone(&executor))?;
        registry.register_tool(definition, Arc::new(tool))?;
        registered += 1;
    }

    info!("Registered {registered} brew tools");
    Ok(registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::catalog::ParamKind;
    use crate::error::ExecError;
    use crate::executor::{ExecutorSettings, ProcessOutput, ProcessRunner};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    struct ScriptedRunner {
        calls: Mutex<Vec<Vec<String>>>,
        exit_code: i32,
        stdout: &'static str,
        stderr: &'static str,
    }

    #[async_trait]
    impl ProcessRunner for ScriptedRunner {
        async fn run(
            &self,
            argv: &[String],
            _env: &[(String, String)],
            _timeout: Duration,
        ) -> Result<ProcessOutput, ExecError> {
            self.calls.lock().unwrap().push(argv.to_vec());
            Ok(ProcessOutput {
                exit_code: Some(self.exit_code),
                stdout: self.stdout.as_bytes().to_vec(),
                stderr: self.stderr.as_bytes().to_vec(),
            })
        }
    }

    fn setup(
        exit_code: i32,
        stdout: &'static str,
        stderr: &'static str,
    ) -> (TempDir, Arc<ScriptedRunner>, ToolRegistry) {
        let dir = TempDir::new().unwrap();
        let audit = Arc::new(AuditLog::open(dir.path().join("audit.log")).unwrap());
        let runner = Arc::new(ScriptedRunner {
            calls: Mutex::new(Vec::new()),
            exit_code,
            stdout,
            stderr,
        });
        let settings = ExecutorSettings {
            binary: "brew".into(),
            timeout: Duration::from_secs(5),
            search_path: "/usr/bin:/bin".into(),
            home: None,
        };
        let executor = Arc::new(Executor::with_runner(settings, audit, runner.clone()));

        let mut registry = ToolRegistry::new();
        let catalog = Catalog::builtin().unwrap();
        register_all(&catalog, executor, &mut registry).unwrap();
        (dir, runner, registry)
    }

    #[test]
    fn test_every_catalog_entry_registered() {
        let (_dir, _runner, registry) = setup(0, "", "");
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(registry.tool_count(), catalog.len());
        for spec in catalog.iter() {
            let tool = registry.get_tool(&spec.name).unwrap();
            assert_eq!(tool.description, spec.description);
            assert!(!tool.description.is_empty());
        }
    }

    #[test]
    fn test_register_all_fails_on_existing_name() {
        let (dir, _runner, mut registry) = setup(0, "", "");
        let audit = Arc::new(AuditLog::open(dir.path().join("other.log")).unwrap());
        let settings = ExecutorSettings {
            binary: "brew".into(),
            timeout: Duration::from_secs(5),
            search_path: "/bin".into(),
            home: None,
        };
        let executor = Arc::new(Executor::new(settings, audit));
        let catalog = Catalog::new(vec![CommandSpec::new("install", "Install again")]).unwrap();

        let err = register_all(&catalog, executor, &mut registry).unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateTool(ref n) if n == "install"));
    }

    #[tokio::test]
    async fn test_success_returns_output() {
        let (_dir, runner, registry) = setup(0, "ok\n", "");
        let out = registry
            .call("install", json!({"packages": "wget", "force": true}))
            .await
            .unwrap();
        assert_eq!(out, "ok");
        assert_eq!(
            runner.calls.lock().unwrap()[0],
            vec!["brew", "install", "wget", "--force"]
        );
    }

    #[tokio::test]
    async fn test_failure_surfaces_message() {
        let (_dir, _runner, registry) = setup(1, "", "bad formula");
        let err = registry
            .call("install", json!({"packages": "nope"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "bad formula");
    }

    #[tokio::test]
    async fn test_missing_required_is_missing_argument() {
        let (dir, runner, registry) = setup(0, "", "");
        let err = registry.call("search", json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            ToolError::Exec(ExecError::MissingArgument { ref param }) if param == "query"
        ));
        assert!(runner.calls.lock().unwrap().is_empty());
        assert_eq!(
            AuditLog::read_records(dir.path().join("audit.log")).unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_argument_rejected_before_spawn() {
        let (_dir, runner, registry) = setup(0, "", "");
        let err = registry
            .call("list", json!({"everything": true}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_null_arguments_are_absent() {
        let (_dir, runner, registry) = setup(0, "", "");
        registry.call("outdated", Value::Null).await.unwrap();
        registry
            .call("upgrade", json!({"packages": null, "greedy": true}))
            .await
            .unwrap();
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0], vec!["brew", "outdated"]);
        assert_eq!(calls[1], vec!["brew", "upgrade", "--greedy"]);
    }

    #[tokio::test]
    async fn test_nested_subcommand_tool() {
        let (_dir, runner, registry) = setup(0, "", "");
        registry
            .call("services_list", json!({"json": true}))
            .await
            .unwrap();
        assert_eq!(
            runner.calls.lock().unwrap()[0],
            vec!["brew", "services", "list", "--json"]
        );
    }

    #[test]
    fn test_command_tool_definition_mirrors_command() {
        let dir = TempDir::new().unwrap();
        let audit = Arc::new(AuditLog::open(dir.path().join("audit.log")).unwrap());
        let settings = ExecutorSettings {
            binary: "brew".into(),
            timeout: Duration::from_secs(1),
            search_path: "/bin".into(),
            home: None,
        };
        let spec = Arc::new(
            CommandSpec::new("deps", "Show dependencies")
                .required("formula", ParamKind::String, "Formula")
                .switch("tree", "--tree", "As a tree"),
        );
        let (_tool, definition) =
            CommandTool::new(spec, Arc::new(Executor::new(settings, audit))).unwrap();
        assert_eq!(definition.name, "deps");
        assert_eq!(definition.input_schema["required"], json!(["formula"]));
        assert_eq!(definition.input_schema["properties"]["tree"]["type"], "boolean");
    }
}

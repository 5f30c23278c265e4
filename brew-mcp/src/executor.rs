//! Command execution pipeline
//!
//! Pipeline: build argv → spawn (minimal env, own process group) → bounded wait → normalize → audit
//!
//! Process spawning sits behind the [`ProcessRunner`] trait so the pipeline can
//! be exercised with a recording stub instead of a real `brew`.

use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditLog, AuditRecord};
use crate::catalog::CommandSpec;
use crate::config::BrewConfig;
use crate::error::ExecError;
use crate::request::{base_argv, build_argv, ToolRequest};

/// Used when the server process itself has no PATH
const FALLBACK_PATH: &str = "/usr/bin:/bin:/usr/sbin:/sbin";

/// Fixed variables passed to every invocation alongside PATH and HOME
const FIXED_ENV: &[(&str, &str)] = &[
    ("HOMEBREW_NO_AUTO_UPDATE", "1"),
    ("HOMEBREW_NO_ENV_HINTS", "1"),
    ("HOMEBREW_NO_COLOR", "1"),
];

/// Normalized outcome of a process that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// -1 when the process was terminated by a signal
    pub exit_code: i32,
}

impl InvocationResult {
    /// Caller-facing text: stdout on success; stderr on failure, or stdout if
    /// stderr is empty (brew reports some errors on stdout).
    pub fn message(&self) -> String {
        let stdout = self.stdout.trim();
        if self.success {
            return stdout.to_string();
        }
        match self.stderr.trim() {
            "" => stdout.to_string(),
            stderr => stderr.to_string(),
        }
    }

    pub fn into_output(self) -> Result<String, ExecError> {
        if self.success {
            Ok(self.message())
        } else {
            Err(ExecError::NonZeroExit {
                exit_code: self.exit_code,
                message: self.message(),
            })
        }
    }
}

/// Raw output of a finished child process
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl From<ProcessOutput> for InvocationResult {
    fn from(output: ProcessOutput) -> Self {
        let exit_code = output.exit_code.unwrap_or(-1);
        Self {
            success: exit_code == 0,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
        }
    }
}

/// Spawns `argv` with exactly `env` and waits at most `timeout`
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        argv: &[String],
        env: &[(String, String)],
        timeout: Duration,
    ) -> Result<ProcessOutput, ExecError>;
}

/// Runs real child processes through tokio
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(
        &self,
        argv: &[String],
        env: &[(String, String)],
        timeout: Duration,
    ) -> Result<ProcessOutput, ExecError> {
        let (program, args) = argv.split_first().ok_or_else(|| ExecError::InvalidArgument {
            param: "argv".into(),
            reason: "empty argument vector".into(),
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env_clear()
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ExecError::BinaryNotFound {
                    binary: program.clone(),
                })
            }
            Err(e) => {
                return Err(ExecError::Spawn {
                    binary: program.clone(),
                    source: e,
                })
            }
        };

        // Kills the whole group if this future is dropped before the child finishes
        let mut group = ProcessGroupGuard::new(child.id());
        debug!("Spawned {} (pid {:?})", program, child.id());

        let mut stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let mut stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let collect = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (status, _, _) = tokio::try_join!(
                child.wait(),
                stdout.read_to_end(&mut out),
                stderr.read_to_end(&mut err),
            )?;
            Ok::<_, std::io::Error>((status, out, err))
        };

        let waited = tokio::time::timeout(timeout, collect).await;
        match waited {
            Ok(collected) => {
                let (status, stdout, stderr) = collected?;
                group.disarm();
                Ok(ProcessOutput {
                    exit_code: status.code(),
                    stdout,
                    stderr,
                })
            }
            Err(_) => {
                drop(group);
                if let Err(e) = child.kill().await {
                    debug!("Child already gone after timeout: {e}");
                }
                Err(ExecError::Timeout {
                    command: argv.join(" "),
                    timeout,
                })
            }
        }
    }
}

fn missing_pipe(name: &str) -> ExecError {
    ExecError::Io(std::io::Error::new(
        ErrorKind::BrokenPipe,
        format!("child {name} was not captured"),
    ))
}

/// SIGKILLs a child's process group on drop unless disarmed
struct ProcessGroupGuard {
    pgid: Option<Pid>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|p| i32::try_from(p).ok()).map(Pid::from_raw),
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                debug!("killpg({pgid}) failed: {e}");
            }
        }
    }
}

/// Static execution parameters, resolved once at startup
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub binary: String,
    pub timeout: Duration,
    pub search_path: String,
    pub home: Option<String>,
}

impl ExecutorSettings {
    pub fn from_config(config: &BrewConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
            search_path: search_path(std::env::var_os("PATH"), &config.extra_path),
            home: config
                .home
                .clone()
                .or_else(|| std::env::var("HOME").ok()),
        }
    }

    /// The complete environment handed to the child; nothing else is inherited
    pub fn environment(&self) -> Vec<(String, String)> {
        let mut env = vec![("PATH".to_string(), self.search_path.clone())];
        if let Some(home) = &self.home {
            env.push(("HOME".to_string(), home.clone()));
        }
        env.extend(
            FIXED_ENV
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        env
    }
}

/// Inherited PATH with any missing `extra` directories appended
pub fn search_path(inherited: Option<std::ffi::OsString>, extra: &[String]) -> String {
    let mut dirs: Vec<PathBuf> = match inherited {
        Some(path) if !path.is_empty() => std::env::split_paths(&path).collect(),
        _ => std::env::split_paths(FALLBACK_PATH).collect(),
    };
    for dir in extra {
        let dir = PathBuf::from(dir);
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    std::env::join_paths(&dirs)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| FALLBACK_PATH.to_string())
}

/// Runs catalog commands and audits every attempt
pub struct Executor {
    settings: ExecutorSettings,
    runner: Arc<dyn ProcessRunner>,
    audit_log: Arc<AuditLog>,
}

impl Executor {
    pub fn new(settings: ExecutorSettings, audit_log: Arc<AuditLog>) -> Self {
        Self::with_runner(settings, audit_log, Arc::new(SystemRunner))
    }

    pub fn with_runner(
        settings: ExecutorSettings,
        audit_log: Arc<AuditLog>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            settings,
            runner,
            audit_log,
        }
    }

    /// Run one invocation of `spec`.
    ///
    /// A process that ran to completion is `Ok` regardless of exit status;
    /// use [`InvocationResult::into_output`] to turn a non-zero exit into
    /// [`ExecError::NonZeroExit`]. Exactly one audit record is written before
    /// this returns, or when the future is dropped mid-run.
    pub async fn execute(
        &self,
        spec: &CommandSpec,
        request: &ToolRequest,
    ) -> Result<InvocationResult, ExecError> {
        let execution_id = Uuid::new_v4();
        let start = Instant::now();

        let argv = match build_argv(&self.settings.binary, spec, request) {
            Ok(argv) => argv,
            Err(e) => {
                warn!("Rejected {}: {e}", spec.name);
                self.audit_log.record(&AuditRecord::failed(
                    execution_id,
                    &spec.name,
                    base_argv(&self.settings.binary, spec),
                    &e,
                    start.elapsed(),
                ));
                return Err(e);
            }
        };

        info!("Executing [{execution_id}]: {}", argv.join(" "));

        // Dropped mid-run (cancelled): the guard writes the record instead
        let mut pending = PendingRecord {
            audit_log: &self.audit_log,
            execution_id,
            tool: &spec.name,
            argv: Some(argv.clone()),
            start,
        };

        let env = self.settings.environment();
        let outcome = self
            .runner
            .run(&argv, &env, self.settings.timeout)
            .await
            .map(InvocationResult::from);

        pending.disarm();
        let elapsed = start.elapsed();
        match &outcome {
            Ok(result) => {
                if result.success {
                    info!("{} succeeded in {}ms", spec.name, elapsed.as_millis());
                } else {
                    warn!(
                        "{} exited with {} after {}ms",
                        spec.name,
                        result.exit_code,
                        elapsed.as_millis()
                    );
                }
                self.audit_log.record(&AuditRecord::completed(
                    execution_id,
                    &spec.name,
                    argv,
                    result,
                    elapsed,
                ));
            }
            Err(e) => {
                warn!("{} failed: {e}", spec.name);
                self.audit_log
                    .record(&AuditRecord::failed(execution_id, &spec.name, argv, e, elapsed));
            }
        }

        outcome
    }
}

/// Audits an invocation whose future is dropped before the runner returns
struct PendingRecord<'a> {
    audit_log: &'a AuditLog,
    execution_id: Uuid,
    tool: &'a str,
    argv: Option<Vec<String>>,
    start: Instant,
}

impl PendingRecord<'_> {
    fn disarm(&mut self) {
        self.argv = None;
    }
}

impl Drop for PendingRecord<'_> {
    fn drop(&mut self) {
        let Some(argv) = self.argv.take() else {
            return;
        };
        let err = ExecError::Cancelled {
            command: argv.join(" "),
        };
        warn!("{} [{}]: {err}", self.tool, self.execution_id);
        self.audit_log.record(&AuditRecord::failed(
            self.execution_id,
            self.tool,
            argv,
            &err,
            self.start.elapsed(),
        ));
    }
}

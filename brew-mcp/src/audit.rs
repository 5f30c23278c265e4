//! Audit logging — append-only JSON-lines record of every tool invocation
//!
//! One record per call, serialized to a single line and written with one
//! `write_all` followed by a flush, so concurrent callers never interleave
//! partial lines and a crash right after a call cannot lose its record.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::ExecError;
use crate::executor::InvocationResult;

/// File name used when no audit path is configured
pub const DEFAULT_LOG_FILE: &str = "homebrew_mcp.log";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub execution_id: Uuid,
    pub tool: String,
    /// Exact argument vector that was run (or would have been, for rejected calls)
    pub command: Vec<String>,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    /// The process ran to completion, whatever its exit status
    pub fn completed(
        execution_id: Uuid,
        tool: &str,
        command: Vec<String>,
        result: &InvocationResult,
        elapsed: Duration,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            execution_id,
            tool: tool.to_string(),
            command,
            success: result.success,
            duration_ms: elapsed.as_millis() as u64,
            exit_code: Some(result.exit_code),
            stdout: Some(result.stdout.clone()),
            stderr: Some(result.stderr.clone()),
            error: (!result.success).then(|| result.message()),
        }
    }

    /// The call was rejected or the process could not be run to completion
    pub fn failed(
        execution_id: Uuid,
        tool: &str,
        command: Vec<String>,
        err: &ExecError,
        elapsed: Duration,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            execution_id,
            tool: tool.to_string(),
            command,
            success: false,
            duration_ms: elapsed.as_millis() as u64,
            exit_code: None,
            stdout: None,
            stderr: None,
            error: Some(err.to_string()),
        }
    }
}

/// Shared append-only audit file
pub struct AuditLog {
    file: Mutex<File>,
}

impl AuditLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create audit directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;

        info!("Audit log: {}", path.display());
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Append one record. Failures are logged, never propagated to the caller.
    pub fn record(&self, record: &AuditRecord) {
        if let Err(e) = self.try_record(record) {
            error!(
                "Failed to write audit record for {} ({}): {e:#}",
                record.tool, record.execution_id
            );
        }
    }

    fn try_record(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("Failed to serialize audit record")?;
        line.push('\n');

        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Read back every record in a log file, in write order
    pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;

        let mut records = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line)
                .with_context(|| format!("Malformed audit record on line {}", i + 1))?;
            records.push(record);
        }
        Ok(records)
    }
}

/// `homebrew_mcp.log` next to the running executable, or in the working
/// directory when the executable path cannot be resolved.
pub fn default_log_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_LOG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn ok_result(stdout: &str) -> InvocationResult {
        InvocationResult {
            success: true,
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    #[test]
    fn test_record_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::open(&path).unwrap();

        let cmd = argv(&["brew", "install", "wget", "--force"]);
        let record = AuditRecord::completed(
            Uuid::new_v4(),
            "install",
            cmd.clone(),
            &ok_result("installed"),
            Duration::from_millis(42),
        );
        log.record(&record);

        let records = AuditLog::read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], record);
        assert_eq!(records[0].command, cmd);
        assert_eq!(records[0].duration_ms, 42);
    }

    #[test]
    fn test_failed_record_carries_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::open(&path).unwrap();

        let err = ExecError::BinaryNotFound {
            binary: "brew".into(),
        };
        log.record(&AuditRecord::failed(
            Uuid::new_v4(),
            "list",
            argv(&["brew", "list"]),
            &err,
            Duration::ZERO,
        ));

        let records = AuditLog::read_records(&path).unwrap();
        assert!(!records[0].success);
        assert_eq!(records[0].exit_code, None);
        assert!(records[0].error.as_deref().unwrap().contains("not found"));
    }

    #[test]
    fn test_failed_completion_uses_message() {
        let result = InvocationResult {
            success: false,
            stdout: String::new(),
            stderr: "Error: No available formula\n".into(),
            exit_code: 1,
        };
        let record = AuditRecord::completed(
            Uuid::new_v4(),
            "install",
            argv(&["brew", "install", "nope"]),
            &result,
            Duration::ZERO,
        );
        assert_eq!(record.exit_code, Some(1));
        assert_eq!(record.error.as_deref(), Some("Error: No available formula"));
    }

    #[test]
    fn test_lines_are_independent_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::open(&path).unwrap();

        for i in 0..5 {
            log.record(&AuditRecord::completed(
                Uuid::new_v4(),
                "info",
                argv(&["brew", "info", &format!("pkg{i}")]),
                &ok_result("multi\nline\noutput"),
                Duration::ZERO,
            ));
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("timestamp").is_some());
            assert!(value.get("command").unwrap().is_array());
        }
    }

    #[test]
    fn test_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");

        for _ in 0..2 {
            let log = AuditLog::open(&path).unwrap();
            log.record(&AuditRecord::completed(
                Uuid::new_v4(),
                "doctor",
                argv(&["brew", "doctor"]),
                &ok_result("Your system is ready to brew."),
                Duration::ZERO,
            ));
        }

        assert_eq!(AuditLog::read_records(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/audit.log");
        let log = AuditLog::open(&path).unwrap();
        log.record(&AuditRecord::failed(
            Uuid::new_v4(),
            "install",
            vec!["brew".into(), "install".into()],
            &ExecError::MissingArgument { param: "packages".into() },
            Duration::ZERO,
        ));
        assert_eq!(AuditLog::read_records(&path).unwrap().len(), 1);
        assert!(path.exists());
    }

    #[test]
    fn test_concurrent_writers_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        let log = Arc::new(AuditLog::open(&path).unwrap());

        let big = "x".repeat(64 * 1024);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                let big = big.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        log.record(&AuditRecord::completed(
                            Uuid::new_v4(),
                            "search",
                            vec!["brew".into(), "search".into(), format!("t{t}-{i}")],
                            &ok_result(&big),
                            Duration::ZERO,
                        ));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let records = AuditLog::read_records(&path).unwrap();
        assert_eq!(records.len(), 80);
        assert!(records.iter().all(|r| r.stdout.as_deref() == Some(big.as_str())));
    }

    #[test]
    fn test_default_log_path_file_name() {
        assert_eq!(
            default_log_path().file_name().unwrap().to_str().unwrap(),
            DEFAULT_LOG_FILE
        );
    }
}

use fnport_domain::{handler_module_path, resolve_handler_file_name, HandlerIssue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{BuildError, ImportError, UploadError};
use crate::import::ImportReport;
use crate::upload::UploadOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self.status {
            CommandStatus::Ok => 0,
            CommandStatus::UserError => 1,
            CommandStatus::Failure => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

/// Outcome for a finished import attempt.
#[must_use]
pub fn import_outcome(result: &Result<ImportReport, ImportError>) -> ExecutionOutcome {
    match result {
        Ok(report) => {
            let message = if report.warnings.is_empty() {
                format!(
                    "imported {} into {}",
                    report.function,
                    report.destination.display()
                )
            } else {
                format!(
                    "imported {} into {} with {} warning(s)",
                    report.function,
                    report.destination.display(),
                    report.warnings.len()
                )
            };
            ExecutionOutcome::success(message, report.details())
        }
        Err(err @ ImportError::Handler { .. }) => {
            ExecutionOutcome::user_error(err.to_string(), err.details())
        }
        Err(err) => ExecutionOutcome::failure(err.to_string(), err.details()),
    }
}

/// Outcome for a finished upload attempt.
#[must_use]
pub fn upload_outcome(result: &Result<UploadOutcome, UploadError>) -> ExecutionOutcome {
    match result {
        Ok(UploadOutcome::Deployed(report)) => ExecutionOutcome::success(
            format!(
                "updated {} ({} bytes, {})",
                report.function, report.archive_bytes, report.strategy
            ),
            report.details(),
        ),
        Ok(UploadOutcome::Packaged(report)) => ExecutionOutcome::success(
            format!(
                "packaged {} ({} bytes); nothing was deployed",
                report.function, report.archive_bytes
            ),
            report.details(),
        ),
        Ok(UploadOutcome::Cancelled { function, expected }) => ExecutionOutcome::user_error(
            format!("upload of {function} cancelled"),
            json!({
                "function": function,
                "reason": "cancelled",
                "expected_handler": expected.display().to_string(),
                "hint": "Re-run with --yes to build without the handler file.",
            }),
        ),
        Err(
            err @ (UploadError::Read { .. }
            | UploadError::Build {
                source: BuildError::Failed { .. },
                ..
            }),
        ) => ExecutionOutcome::user_error(err.to_string(), err.details()),
        Err(err) => ExecutionOutcome::failure(err.to_string(), err.details()),
    }
}

/// Outcome for a local handler lookup; no remote calls involved.
#[must_use]
pub fn handler_outcome(runtime: &str, handler: &str) -> ExecutionOutcome {
    match resolve_handler_file_name(runtime, handler) {
        Ok(file) => {
            let module_path = handler_module_path(runtime, handler);
            ExecutionOutcome::success(
                file.clone(),
                json!({
                    "runtime": runtime,
                    "handler": handler,
                    "file": file,
                    "module_path": module_path,
                }),
            )
        }
        Err(issue) => {
            let hint = match &issue {
                HandlerIssue::UnsupportedRuntime { .. } => {
                    "Handler lookup supports python* and nodejs* runtimes."
                }
                HandlerIssue::MalformedHandler { .. } => "Use '<file>.<function>'.",
            };
            ExecutionOutcome::user_error(
                issue.to_string(),
                json!({
                    "reason": issue.reason(),
                    "runtime": runtime,
                    "handler": handler,
                    "hint": hint,
                }),
            )
        }
    }
}

#[must_use]
pub fn format_status_message(command: &str, message: &str) -> String {
    let prefix = format!("fnport {command}");
    if message.is_empty() {
        prefix
    } else if message.starts_with(&prefix) {
        message.to_string()
    } else {
        format!("{prefix}: {message}")
    }
}

/// `{status, message, details}` envelope printed for `--json`.
#[must_use]
pub fn to_json_response(command: &str, outcome: &ExecutionOutcome) -> Value {
    let status = match outcome.status {
        CommandStatus::Ok => "ok",
        CommandStatus::UserError => "user-error",
        CommandStatus::Failure => "error",
    };
    let details = match &outcome.details {
        Value::Object(_) => outcome.details.clone(),
        Value::Null => json!({}),
        other => json!({ "value": other }),
    };
    json!({
        "status": status,
        "message": format_status_message(command, &outcome.message),
        "details": details,
    })
}

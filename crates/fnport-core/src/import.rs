use std::path::{Path, PathBuf};

use fnport_domain::{handler_module_path, resolve_handler_file_name, FunctionDescriptor};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::archive::unpack_file;
use crate::effects::{Effects, ImportFollowUp};
use crate::errors::ImportError;
use crate::progress::{ProgressBudget, ProgressSink};
use crate::workspace::provision;

const FETCH_SHARE: u32 = 60;
const UNPACK_SHARE: u32 = 40;
const ARTIFACT_FILE_NAME: &str = "function.zip";

/// Linear import progression; there are no back-edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    Idle,
    Fetching,
    Extracting,
    Succeeded,
    Failed,
}

/// What a successful import left on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub function: String,
    pub destination: PathBuf,
    pub handler_path: Option<PathBuf>,
    pub bytes_downloaded: u64,
    pub files_extracted: usize,
    /// Soft failures from post-import steps; the import itself succeeded.
    pub warnings: Vec<String>,
}

impl ImportReport {
    #[must_use]
    pub fn details(&self) -> Value {
        json!({
            "function": self.function,
            "destination": self.destination.display().to_string(),
            "handler_path": self.handler_path.as_ref().map(|p| p.display().to_string()),
            "bytes_downloaded": self.bytes_downloaded,
            "files_extracted": self.files_extracted,
            "warnings": self.warnings,
        })
    }
}

/// Download a function's deployed code and extract it into `destination`.
pub fn import_function(
    effects: &dyn Effects,
    function: &FunctionDescriptor,
    destination: &Path,
    progress: &dyn ProgressSink,
) -> Result<ImportReport, ImportError> {
    import_function_with(effects, function, destination, progress, &[])
}

/// Like [`import_function`], then runs each follow-up against the handler
/// file. Follow-up failures are recorded as warnings.
pub fn import_function_with(
    effects: &dyn Effects,
    function: &FunctionDescriptor,
    destination: &Path,
    progress: &dyn ProgressSink,
    follow_ups: &[&dyn ImportFollowUp],
) -> Result<ImportReport, ImportError> {
    let mut state = ImportState::Idle;
    let result = run_import(effects, function, destination, progress, &mut state);
    match &result {
        Ok(report) => {
            transition(function, &mut state, ImportState::Succeeded);
            info!(
                function = %function.name,
                destination = %report.destination.display(),
                files = report.files_extracted,
                "imported function"
            );
        }
        Err(err) => {
            transition(function, &mut state, ImportState::Failed);
            warn!(function = %function.name, code = err.code(), error = %err, "import failed");
        }
    }
    let mut report = result?;
    run_follow_ups(function, &mut report, follow_ups);
    Ok(report)
}

fn run_import(
    effects: &dyn Effects,
    function: &FunctionDescriptor,
    destination: &Path,
    progress: &dyn ProgressSink,
    state: &mut ImportState,
) -> Result<ImportReport, ImportError> {
    let handler_file =
        resolve_handler_file_name(&function.runtime, &function.handler).map_err(|issue| {
            ImportError::Handler {
                function: function.name.clone(),
                issue,
            }
        })?;
    let budget = ProgressBudget::full(progress);

    transition(function, state, ImportState::Fetching);
    let url = effects
        .functions()
        .code_location(&function.arn)
        .map_err(|err| ImportError::Locate {
            function: function.name.clone(),
            message: format!("{err:#}"),
        })?;
    let workspace =
        provision(effects.temp(), effects.cleanup()).map_err(|err| ImportError::Workspace {
            function: function.name.clone(),
            message: format!("{err:#}"),
        })?;
    let artifact = workspace.join(ARTIFACT_FILE_NAME);
    let bytes_downloaded = effects
        .fetcher()
        .fetch(&url, &artifact, &budget.share(FETCH_SHARE))
        .map_err(|source| ImportError::Fetch {
            function: function.name.clone(),
            source,
        })?;

    transition(function, state, ImportState::Extracting);
    let summary = unpack_file(&artifact, destination, true, &budget.share(UNPACK_SHARE))
        .map_err(|source| ImportError::Unpack {
            function: function.name.clone(),
            destination: destination.to_path_buf(),
            source,
        })?;
    budget.complete(None);

    let mut warnings = Vec::new();
    let handler_path = locate_handler(function, destination, &handler_file);
    if handler_path.is_none() {
        warnings.push(format!(
            "handler file {handler_file} was not found in {}",
            destination.display()
        ));
    }

    Ok(ImportReport {
        function: function.name.clone(),
        destination: destination.to_path_buf(),
        handler_path,
        bytes_downloaded,
        files_extracted: summary.files,
        warnings,
    })
}

pub(crate) fn locate_handler(
    function: &FunctionDescriptor,
    destination: &Path,
    handler_file: &str,
) -> Option<PathBuf> {
    let module_path = handler_module_path(&function.runtime, &function.handler);
    std::iter::once(handler_file)
        .chain(module_path.as_deref())
        .map(|relative| destination.join(relative))
        .find(|candidate| candidate.is_file())
}

fn run_follow_ups(
    function: &FunctionDescriptor,
    report: &mut ImportReport,
    follow_ups: &[&dyn ImportFollowUp],
) {
    let Some(handler_path) = report.handler_path.clone() else {
        return;
    };
    for follow_up in follow_ups {
        if let Err(err) = follow_up.after_import(function, &report.destination, &handler_path) {
            warn!(
                function = %function.name,
                step = follow_up.name(),
                error = %format!("{err:#}"),
                "post-import step failed"
            );
            report
                .warnings
                .push(format!("{} failed: {err:#}", follow_up.name()));
        }
    }
}

fn transition(function: &FunctionDescriptor, state: &mut ImportState, next: ImportState) {
    debug!(function = %function.name, from = ?*state, to = ?next, "import state");
    *state = next;
}

#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]

pub mod archive;
pub mod build;
pub mod config;
pub mod effects;
pub mod errors;
pub mod fetch;
pub mod import;
pub(crate) mod net;
pub mod outcome;
pub(crate) mod process;
pub mod progress;
pub mod upload;
pub mod workspace;

#[cfg(test)]
mod test_support;

pub use fnport_domain::{
    handler_module_path, resolve_handler_file_name, FunctionDescriptor, HandlerIssue,
    RuntimeFamily,
};

pub use crate::archive::{pack_directory, pack_to_file, unpack_file, unpack_reader, UnpackSummary};
pub use crate::build::{BuildInvoker, BuildRequest, SamCliBuilder};
pub use crate::config::{Config, GlobalOptions};
pub use crate::effects::{
    AssumeYes, Effects, FunctionService, HandlerConfirm, ImportFollowUp, PipelineEffects,
};
pub use crate::errors::{
    BuildError, DeployError, FetchError, ImportError, PackError, ReadError, UnpackError,
    UploadError,
};
pub use crate::fetch::{ArtifactFetcher, HttpFetcher};
pub use crate::import::{import_function, import_function_with, ImportReport, ImportState};
pub use crate::net::redact_url;
pub use crate::outcome::{
    format_status_message, handler_outcome, import_outcome, to_json_response, upload_outcome,
    CommandStatus, ExecutionOutcome,
};
pub use crate::process::RunOutput;
pub use crate::progress::{NoProgress, ProgressBudget, ProgressSink, FULL_BUDGET};
pub use crate::upload::{
    upload_from_directory, upload_from_unbuilt_source, upload_from_zip_bytes,
    upload_from_zip_file, UploadOptions, UploadOutcome, UploadReport, UploadStrategy,
};
pub use crate::workspace::{CleanupRegistry, SystemTempProvisioner, TempProvisioner};

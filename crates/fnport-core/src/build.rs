use std::path::PathBuf;

use anyhow::Result;
use tracing::debug;

use crate::process::{run_tool, RunOutput};

/// Inputs for one external build run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub manifest_path: PathBuf,
    pub output_dir: PathBuf,
    pub base_dir: PathBuf,
    pub containerless: bool,
    pub skip_image_pull: bool,
}

/// Turns unbuilt source plus a manifest into a build output directory.
///
/// `Err` means the tool could not be run at all; a run that exits non-zero
/// comes back as `Ok` with the exit code.
pub trait BuildInvoker: Send + Sync {
    /// Name shown when the tool cannot be started.
    fn program(&self) -> &str;
    fn build(&self, request: &BuildRequest) -> Result<RunOutput>;
}

/// Runs `sam build` from the SAM CLI.
#[derive(Debug, Clone)]
pub struct SamCliBuilder {
    program: String,
}

impl SamCliBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    #[must_use]
    pub fn arguments(request: &BuildRequest) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "--template".to_string(),
            request.manifest_path.display().to_string(),
            "--build-dir".to_string(),
            request.output_dir.display().to_string(),
            "--base-dir".to_string(),
            request.base_dir.display().to_string(),
        ];
        if !request.containerless {
            args.push("--use-container".to_string());
        }
        if request.skip_image_pull {
            args.push("--skip-pull-image".to_string());
        }
        args
    }
}

impl BuildInvoker for SamCliBuilder {
    fn program(&self) -> &str {
        &self.program
    }

    fn build(&self, request: &BuildRequest) -> Result<RunOutput> {
        let args = Self::arguments(request);
        debug!(program = %self.program, args = ?args, "invoking build");
        run_tool(&self.program, &args, &request.base_dir)
    }
}

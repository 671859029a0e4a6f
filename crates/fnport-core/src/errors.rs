use std::io;
use std::path::PathBuf;

use fnport_domain::HandlerIssue;
use serde_json::{json, Value};

/// Download of a remote artifact failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to prepare download client: {message}")]
    Client { message: String },
    #[error("failed to fetch {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response for {url}: HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("stream error while downloading {url}: {source}")]
    Stream {
        url: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write download to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Expanding an archive into a directory failed.
#[derive(Debug, thiserror::Error)]
pub enum UnpackError {
    #[error("failed to open archive {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid archive: {source}")]
    Archive {
        #[source]
        source: zip::result::ZipError,
    },
    #[error("archive entry '{name}' escapes the destination directory")]
    UnsafeEntry { name: String },
    #[error("refusing to overwrite existing {}", .path.display())]
    Exists { path: PathBuf },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Packing a directory into an archive failed.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("{} is not a directory", .path.display())]
    NotADirectory { path: PathBuf },
    #[error("failed to walk {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write archive: {source}")]
    Archive {
        #[source]
        source: zip::result::ZipError,
    },
    #[error("failed to write archive to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A prebuilt zip selected for upload could not be read.
#[derive(Debug, thiserror::Error)]
#[error("failed to read {}: {source}", .path.display())]
pub struct ReadError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// The external build step failed or produced nothing usable.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to prepare build workspace: {message}")]
    Prepare { message: String },
    #[error("failed to run {program}: {message}")]
    Spawn { program: String, message: String },
    #[error("build exited with status {code}: {log_tail}")]
    Failed { code: i32, log_tail: String },
    #[error("build output {} is missing", .path.display())]
    MissingOutput { path: PathBuf },
}

/// The remote code update call failed.
#[derive(Debug, thiserror::Error)]
#[error("failed to update code for {function}: {message}")]
pub struct DeployError {
    pub function: String,
    pub message: String,
}

/// Import produced nothing usable.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("cannot import {function}: {issue}")]
    Handler {
        function: String,
        #[source]
        issue: HandlerIssue,
    },
    #[error("failed to locate code for {function}: {message}")]
    Locate { function: String, message: String },
    #[error("failed to prepare a temporary workspace for {function}: {message}")]
    Workspace { function: String, message: String },
    #[error("failed to download {function}: {source}")]
    Fetch {
        function: String,
        #[source]
        source: FetchError,
    },
    #[error("failed to extract {function} into {}: {source}", .destination.display())]
    Unpack {
        function: String,
        destination: PathBuf,
        #[source]
        source: UnpackError,
    },
}

impl ImportError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Handler { .. } => "FN101",
            Self::Locate { .. } => "FN102",
            Self::Workspace { .. } => "FN103",
            Self::Fetch { .. } => "FN104",
            Self::Unpack { .. } => "FN105",
        }
    }

    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Handler { issue, .. } => issue.reason(),
            Self::Locate { .. } => "code_location_unavailable",
            Self::Workspace { .. } => "temp_workspace_failed",
            Self::Fetch { .. } => "fetch_failed",
            Self::Unpack { .. } => "unpack_failed",
        }
    }

    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Handler { issue, .. } => match issue {
                HandlerIssue::UnsupportedRuntime { .. } => {
                    Some("Only Python and Node.js functions can be imported.")
                }
                HandlerIssue::MalformedHandler { .. } => {
                    Some("Fix the function's handler setting to '<file>.<function>'.")
                }
            },
            Self::Locate { .. } => Some("Check the function name, region, and credentials."),
            Self::Workspace { .. } => Some("Check FNPORT_TEMP_ROOT points at a writable directory."),
            Self::Fetch { .. } => Some("Re-run the import; the download link may have expired."),
            Self::Unpack { .. } => {
                Some("Check the destination is writable; it may contain a partial extraction.")
            }
        }
    }

    #[must_use]
    pub fn function(&self) -> &str {
        match self {
            Self::Handler { function, .. }
            | Self::Locate { function, .. }
            | Self::Workspace { function, .. }
            | Self::Fetch { function, .. }
            | Self::Unpack { function, .. } => function,
        }
    }

    #[must_use]
    pub fn details(&self) -> Value {
        let mut details = json!({
            "code": self.code(),
            "reason": self.reason(),
            "function": self.function(),
        });
        if let Value::Object(map) = &mut details {
            if let Some(hint) = self.hint() {
                map.insert("hint".into(), json!(hint));
            }
            match self {
                Self::Handler { issue, .. } => {
                    map.insert("error".into(), json!(issue.to_string()));
                }
                Self::Locate { message, .. } | Self::Workspace { message, .. } => {
                    map.insert("error".into(), json!(message));
                }
                Self::Fetch { source, .. } => {
                    map.insert("error".into(), json!(source.to_string()));
                }
                Self::Unpack {
                    destination,
                    source,
                    ..
                } => {
                    map.insert("destination".into(), json!(destination.display().to_string()));
                    map.insert("error".into(), json!(source.to_string()));
                }
            }
        }
        details
    }
}

/// Upload attempt failed; packaging failures never reach the deploy call.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("cannot upload {function}: {source}")]
    Read {
        function: String,
        #[source]
        source: ReadError,
    },
    #[error("failed to package {function}: {source}")]
    Packaging {
        function: String,
        #[source]
        source: PackError,
    },
    #[error("failed to build {function}: {source}")]
    Build {
        function: String,
        #[source]
        source: BuildError,
    },
    #[error("{source}")]
    Deploy {
        #[source]
        source: DeployError,
    },
}

impl UploadError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "FN201",
            Self::Packaging { .. } => "FN202",
            Self::Build { .. } => "FN203",
            Self::Deploy { .. } => "FN204",
        }
    }

    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Read { .. } => "archive_unreadable",
            Self::Packaging { .. } => "packaging_failed",
            Self::Build { source, .. } => match source {
                BuildError::Prepare { .. } => "build_workspace_failed",
                BuildError::Spawn { .. } => "build_tool_unavailable",
                BuildError::Failed { .. } => "build_failed",
                BuildError::MissingOutput { .. } => "build_output_missing",
            },
            Self::Deploy { .. } => "deploy_failed",
        }
    }

    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Read { .. } => Some("Check the zip file exists and is readable."),
            Self::Packaging { .. } => Some("Check every file under the directory is readable."),
            Self::Build { source, .. } => match source {
                BuildError::Spawn { .. } => {
                    Some("Install the SAM CLI or point FNPORT_SAM_CLI at it.")
                }
                BuildError::Failed { .. } => Some("Fix the build errors above and retry."),
                BuildError::Prepare { .. } | BuildError::MissingOutput { .. } => None,
            },
            Self::Deploy { .. } => {
                Some("Check credentials allow lambda:UpdateFunctionCode for this function.")
            }
        }
    }

    #[must_use]
    pub fn function(&self) -> &str {
        match self {
            Self::Read { function, .. }
            | Self::Packaging { function, .. }
            | Self::Build { function, .. } => function,
            Self::Deploy { source } => &source.function,
        }
    }

    /// Whether the failure happened before anything was sent to the service.
    #[must_use]
    pub fn is_packaging(&self) -> bool {
        !matches!(self, Self::Deploy { .. })
    }

    #[must_use]
    pub fn details(&self) -> Value {
        let mut details = json!({
            "code": self.code(),
            "reason": self.reason(),
            "function": self.function(),
        });
        if let Value::Object(map) = &mut details {
            if let Some(hint) = self.hint() {
                map.insert("hint".into(), json!(hint));
            }
            match self {
                Self::Read { source, .. } => {
                    map.insert("path".into(), json!(source.path.display().to_string()));
                    map.insert("error".into(), json!(source.source.to_string()));
                }
                Self::Packaging { source, .. } => {
                    map.insert("error".into(), json!(source.to_string()));
                }
                Self::Build { source, .. } => {
                    if let BuildError::Failed { code, log_tail } = source {
                        map.insert("exit_code".into(), json!(code));
                        map.insert("build_log".into(), json!(log_tail));
                    }
                    map.insert("error".into(), json!(source.to_string()));
                }
                Self::Deploy { source } => {
                    map.insert("error".into(), json!(source.message));
                }
            }
        }
        details
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_errors_carry_function_and_code() {
        let err = ImportError::Fetch {
            function: "fn1".into(),
            source: FetchError::Status {
                url: "https://example.com/fn1.zip".into(),
                status: 403,
            },
        };
        assert_eq!(err.code(), "FN104");
        let details = err.details();
        assert_eq!(details["function"], "fn1");
        assert_eq!(details["reason"], "fetch_failed");
        assert!(details["error"]
            .as_str()
            .is_some_and(|msg| msg.contains("HTTP 403")));
        assert!(details.get("hint").is_some());
    }

    #[test]
    fn handler_issue_reason_flows_through_import_error() {
        let err = ImportError::Handler {
            function: "fn-java".into(),
            issue: HandlerIssue::UnsupportedRuntime {
                runtime: "java21".into(),
            },
        };
        assert_eq!(err.reason(), "unsupported_runtime");
        assert!(err.to_string().contains("java21"));
    }

    #[test]
    fn only_deploy_failures_are_post_packaging() {
        let build = UploadError::Build {
            function: "fn1".into(),
            source: BuildError::Failed {
                code: 1,
                log_tail: "Build Failed".into(),
            },
        };
        assert!(build.is_packaging());
        assert_eq!(build.details()["exit_code"], 1);
        let deploy = UploadError::Deploy {
            source: DeployError {
                function: "fn1".into(),
                message: "AccessDenied".into(),
            },
        };
        assert!(!deploy.is_packaging());
        assert_eq!(deploy.function(), "fn1");
        assert_eq!(deploy.code(), "FN204");
    }
}

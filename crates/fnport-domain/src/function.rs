use std::fmt;

use serde::{Deserialize, Serialize};

/// Snapshot of a deployed function as seen by the caller.
///
/// The descriptor is owned by the calling workflow and handed to every
/// pipeline by reference; nothing in the transfer pipeline mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub arn: String,
    /// Dotted entry point, e.g. `app.handler` or `src/index.main`.
    pub handler: String,
    /// Runtime identifier such as `python3.12` or `nodejs20.x`.
    pub runtime: String,
    pub region: String,
}

impl FunctionDescriptor {
    pub fn new(
        name: impl Into<String>,
        arn: impl Into<String>,
        handler: impl Into<String>,
        runtime: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            arn: arn.into(),
            handler: handler.into(),
            runtime: runtime.into(),
            region: region.into(),
        }
    }

    pub fn runtime_family(&self) -> RuntimeFamily {
        RuntimeFamily::from_runtime(&self.runtime)
    }
}

/// Coarse language classification of a runtime identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeFamily {
    Python,
    NodeJs,
    Other,
}

impl RuntimeFamily {
    pub fn from_runtime(runtime: &str) -> Self {
        let runtime = runtime.trim().to_ascii_lowercase();
        if runtime.starts_with("python") {
            Self::Python
        } else if runtime.starts_with("nodejs") {
            Self::NodeJs
        } else {
            Self::Other
        }
    }

    /// Source file extension, `None` for families we cannot map.
    pub fn source_extension(self) -> Option<&'static str> {
        match self {
            Self::Python => Some("py"),
            Self::NodeJs => Some("js"),
            Self::Other => None,
        }
    }
}

impl fmt::Display for RuntimeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Python => "python",
            Self::NodeJs => "nodejs",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

use crate::function::RuntimeFamily;

/// Reasons a handler string cannot be mapped to a source file.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum HandlerIssue {
    #[error("runtime '{runtime}' is not supported for handler lookup")]
    UnsupportedRuntime { runtime: String },
    #[error("handler '{handler}' must look like '<file>.<function>'")]
    MalformedHandler { handler: String },
}

impl HandlerIssue {
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnsupportedRuntime { .. } => "unsupported_runtime",
            Self::MalformedHandler { .. } => "malformed_handler",
        }
    }
}

/// Map a runtime identifier and dotted handler to the file that defines it.
///
/// The last dot-separated segment names the exported symbol and is dropped;
/// the remaining segments are kept verbatim and joined with dots, then the
/// runtime family's extension is appended (`a.b.c.main` on Node.js becomes
/// `a.b.c.js`).
pub fn resolve_handler_file_name(runtime: &str, handler: &str) -> Result<String, HandlerIssue> {
    let extension = RuntimeFamily::from_runtime(runtime)
        .source_extension()
        .ok_or_else(|| HandlerIssue::UnsupportedRuntime {
            runtime: runtime.to_string(),
        })?;
    let base = handler_base(handler)?;
    Ok(format!("{base}.{extension}"))
}

/// Python handlers are module paths, so `src.app.handler` lives in
/// `src/app.py`. Returns that relative path when it differs from the
/// dotted file name.
pub fn handler_module_path(runtime: &str, handler: &str) -> Option<String> {
    if RuntimeFamily::from_runtime(runtime) != RuntimeFamily::Python {
        return None;
    }
    let base = handler_base(handler).ok()?;
    if !base.contains('.') {
        return None;
    }
    Some(format!("{}.py", base.replace('.', "/")))
}

fn handler_base(handler: &str) -> Result<&str, HandlerIssue> {
    let malformed = || HandlerIssue::MalformedHandler {
        handler: handler.to_string(),
    };
    let (base, symbol) = handler.rsplit_once('.').ok_or_else(malformed)?;
    if base.is_empty() || symbol.is_empty() {
        return Err(malformed());
    }
    Ok(base)
}

#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod function;
pub mod handler;
pub mod manifest;

pub use function::{FunctionDescriptor, RuntimeFamily};
pub use handler::{handler_module_path, resolve_handler_file_name, HandlerIssue};
pub use manifest::{BuildManifest, MANIFEST_FILE_NAME, MANIFEST_RESOURCE_NAME};

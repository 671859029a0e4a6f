use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use fnport_domain::{resolve_handler_file_name, BuildManifest, FunctionDescriptor};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::archive::pack_directory;
use crate::build::BuildRequest;
use crate::effects::{Effects, HandlerConfirm};
use crate::errors::{BuildError, DeployError, PackError, ReadError, UploadError};
use crate::import::locate_handler;
use crate::progress::{ProgressBudget, ProgressSink};
use crate::workspace::provision;

const PACKAGING_SHARE: u32 = 50;
const BUILD_SHARE: u32 = 30;
const BUILD_OUTPUT_DIR: &str = "output";

/// How the archive handed to the deploy call was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStrategy {
    PrebuiltZip,
    Directory,
    Build,
}

impl UploadStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrebuiltZip => "prebuilt_zip",
            Self::Directory => "directory",
            Self::Build => "build",
        }
    }
}

impl fmt::Display for UploadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Package only; the deploy call is skipped.
    pub dry_run: bool,
    /// Also write the finished archive here.
    pub archive_out: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub function: String,
    pub strategy: UploadStrategy,
    pub archive_bytes: u64,
    pub archive_sha256: String,
    pub archive_out: Option<PathBuf>,
    /// Expected handler file that was missing when the user chose to build
    /// anyway.
    pub handler_warning: Option<PathBuf>,
}

impl UploadReport {
    #[must_use]
    pub fn details(&self) -> Value {
        json!({
            "function": self.function,
            "strategy": self.strategy,
            "archive_bytes": self.archive_bytes,
            "archive_sha256": self.archive_sha256,
            "archive_out": self.archive_out.as_ref().map(|p| p.display().to_string()),
            "handler_warning": self.handler_warning.as_ref().map(|p| p.display().to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Deployed(UploadReport),
    /// Dry run: the archive was produced but never sent.
    Packaged(UploadReport),
    /// The user declined to build without the expected handler file.
    Cancelled { function: String, expected: PathBuf },
}

/// Strategy A with the archive read from disk.
pub fn upload_from_zip_file(
    effects: &dyn Effects,
    function: &FunctionDescriptor,
    zip_path: &Path,
    options: &UploadOptions,
    progress: &dyn ProgressSink,
) -> Result<UploadOutcome, UploadError> {
    let bytes = fs::read(zip_path).map_err(|source| UploadError::Read {
        function: function.name.clone(),
        source: ReadError {
            path: zip_path.to_path_buf(),
            source,
        },
    })?;
    debug!(function = %function.name, path = %zip_path.display(), bytes = bytes.len(), "read prebuilt archive");
    upload_from_zip_bytes(effects, function, bytes, options, progress)
}

/// Strategy A: the bytes are already a finished archive and go out as-is.
pub fn upload_from_zip_bytes(
    effects: &dyn Effects,
    function: &FunctionDescriptor,
    archive: Vec<u8>,
    options: &UploadOptions,
    progress: &dyn ProgressSink,
) -> Result<UploadOutcome, UploadError> {
    let budget = ProgressBudget::full(progress);
    budget.advance(budget.portion(PACKAGING_SHARE), Some("Archive ready"));
    finish(
        effects,
        function,
        UploadStrategy::PrebuiltZip,
        archive,
        None,
        options,
        &budget,
    )
}

/// Strategy B: pack an already-built directory.
pub fn upload_from_directory(
    effects: &dyn Effects,
    function: &FunctionDescriptor,
    directory: &Path,
    options: &UploadOptions,
    progress: &dyn ProgressSink,
) -> Result<UploadOutcome, UploadError> {
    let budget = ProgressBudget::full(progress);
    let archive = pack_directory(directory, &budget.share(budget.portion(PACKAGING_SHARE)))
        .map_err(|source| UploadError::Packaging {
            function: function.name.clone(),
            source,
        })?;
    finish(
        effects,
        function,
        UploadStrategy::Directory,
        archive,
        None,
        options,
        &budget,
    )
}

/// Strategy C: build `source_dir` with the external tool, then pack the
/// function's build output.
pub fn upload_from_unbuilt_source(
    effects: &dyn Effects,
    confirm: &dyn HandlerConfirm,
    function: &FunctionDescriptor,
    source_dir: &Path,
    options: &UploadOptions,
    progress: &dyn ProgressSink,
) -> Result<UploadOutcome, UploadError> {
    // The build tool runs from the source dir and also gets it as an argument.
    let source_dir = std::path::absolute(source_dir).map_err(|err| UploadError::Build {
        function: function.name.clone(),
        source: BuildError::Prepare {
            message: format!("cannot resolve {}: {err}", source_dir.display()),
        },
    })?;
    let source_dir = source_dir.as_path();
    let handler_warning = match check_handler(function, source_dir) {
        HandlerCheck::Present | HandlerCheck::Unchecked => None,
        HandlerCheck::Missing(expected) => {
            if !confirm.confirm_missing_handler(function, &expected) {
                info!(function = %function.name, expected = %expected.display(), "upload cancelled");
                return Ok(UploadOutcome::Cancelled {
                    function: function.name.clone(),
                    expected,
                });
            }
            warn!(
                function = %function.name,
                expected = %expected.display(),
                "building without the expected handler file"
            );
            Some(expected)
        }
    };

    let budget = ProgressBudget::full(progress);
    let packaging = budget.share(budget.portion(PACKAGING_SHARE));
    let built = run_build(effects, function, source_dir, &packaging.share(BUILD_SHARE))
        .map_err(|source| UploadError::Build {
            function: function.name.clone(),
            source,
        })?;
    let archive = pack_directory(&built, &packaging.share(packaging.remaining()))
        .map_err(|source| UploadError::Packaging {
            function: function.name.clone(),
            source,
        })?;
    finish(
        effects,
        function,
        UploadStrategy::Build,
        archive,
        handler_warning,
        options,
        &budget,
    )
}

enum HandlerCheck {
    Present,
    Missing(PathBuf),
    /// Runtime or handler shape the resolver cannot map; nothing to check.
    Unchecked,
}

fn check_handler(function: &FunctionDescriptor, source_dir: &Path) -> HandlerCheck {
    match resolve_handler_file_name(&function.runtime, &function.handler) {
        Ok(file_name) => {
            if locate_handler(function, source_dir, &file_name).is_some() {
                HandlerCheck::Present
            } else {
                HandlerCheck::Missing(source_dir.join(file_name))
            }
        }
        Err(issue) => {
            debug!(function = %function.name, reason = issue.reason(), "skipping handler check");
            HandlerCheck::Unchecked
        }
    }
}

/// Returns the directory holding this function's built code.
fn run_build(
    effects: &dyn Effects,
    function: &FunctionDescriptor,
    source_dir: &Path,
    progress: &ProgressBudget<'_>,
) -> Result<PathBuf, BuildError> {
    let prepare = |err: anyhow::Error| BuildError::Prepare {
        message: format!("{err:#}"),
    };
    let workspace = provision(effects.temp(), effects.cleanup()).map_err(prepare)?;
    let manifest = BuildManifest::for_function(function, source_dir);
    let manifest_path = manifest.write_into(&workspace).map_err(prepare)?;
    let output_dir = workspace.join(BUILD_OUTPUT_DIR);
    let request = BuildRequest {
        manifest_path,
        output_dir: output_dir.clone(),
        base_dir: source_dir.to_path_buf(),
        containerless: true,
        skip_image_pull: true,
    };

    progress.advance(0, Some("Building"));
    let builder = effects.builder();
    let output = builder.build(&request).map_err(|err| BuildError::Spawn {
        program: builder.program().to_string(),
        message: format!("{err:#}"),
    })?;
    if !output.succeeded() {
        return Err(BuildError::Failed {
            code: output.code,
            log_tail: output.log_tail,
        });
    }
    let built = output_dir.join(&manifest.resource_name);
    if !built.is_dir() {
        return Err(BuildError::MissingOutput { path: built });
    }
    progress.complete(None);
    Ok(built)
}

fn finish(
    effects: &dyn Effects,
    function: &FunctionDescriptor,
    strategy: UploadStrategy,
    archive: Vec<u8>,
    handler_warning: Option<PathBuf>,
    options: &UploadOptions,
    budget: &ProgressBudget<'_>,
) -> Result<UploadOutcome, UploadError> {
    if let Some(out) = &options.archive_out {
        write_archive_copy(out, &archive).map_err(|source| UploadError::Packaging {
            function: function.name.clone(),
            source,
        })?;
    }
    let report = UploadReport {
        function: function.name.clone(),
        strategy,
        archive_bytes: archive.len() as u64,
        archive_sha256: hex::encode(Sha256::digest(&archive)),
        archive_out: options.archive_out.clone(),
        handler_warning,
    };
    if options.dry_run {
        budget.complete(Some("Packaged"));
        info!(function = %function.name, strategy = %strategy, bytes = report.archive_bytes, "packaged without deploying");
        return Ok(UploadOutcome::Packaged(report));
    }

    deploy(effects, function, &archive, budget)?;
    info!(
        function = %function.name,
        strategy = %strategy,
        bytes = report.archive_bytes,
        sha256 = %report.archive_sha256,
        "updated function code"
    );
    Ok(UploadOutcome::Deployed(report))
}

fn deploy(
    effects: &dyn Effects,
    function: &FunctionDescriptor,
    archive: &[u8],
    budget: &ProgressBudget<'_>,
) -> Result<(), UploadError> {
    budget.advance(0, Some("Deploying"));
    effects
        .functions()
        .update_function_code(&function.name, archive)
        .map_err(|err| UploadError::Deploy {
            source: DeployError {
                function: function.name.clone(),
                message: format!("{err:#}"),
            },
        })?;
    budget.complete(Some("Deployed"));
    Ok(())
}

fn write_archive_copy(out: &Path, archive: &[u8]) -> Result<(), PackError> {
    let write_err = |source: std::io::Error| PackError::Write {
        path: out.to_path_buf(),
        source,
    };
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(out, archive).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        descriptor, read_tree, zip_bytes, RecordingBuilder, RecordingConfirm, RecordingSink,
        StubEffects,
    };
    use anyhow::Result;
    use std::io::Cursor;

    fn deployed(outcome: UploadOutcome) -> UploadReport {
        match outcome {
            UploadOutcome::Deployed(report) => report,
            other => panic!("expected a deploy, got {other:?}"),
        }
    }

    #[test]
    fn prebuilt_zip_is_sent_untouched() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let effects = StubEffects::new(temp.path())?;
        let function = descriptor("fn1", "python3.12", "app.handler");
        let archive = zip_bytes(&[("app.py", b"def handler(e, c): pass\n".as_slice())])?;
        let zip_path = temp.path().join("fn1.zip");
        fs::write(&zip_path, &archive)?;
        let sink = RecordingSink::default();

        let report = deployed(upload_from_zip_file(
            &effects,
            &function,
            &zip_path,
            &UploadOptions::default(),
            &sink,
        )?);

        assert_eq!(report.strategy, UploadStrategy::PrebuiltZip);
        assert_eq!(report.archive_bytes, archive.len() as u64);
        assert_eq!(
            effects.service().deployed(),
            vec![("fn1".to_string(), archive)]
        );
        assert_eq!(sink.total(), 100);
        Ok(())
    }

    #[test]
    fn unreadable_zip_is_a_read_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let effects = StubEffects::new(temp.path())?;
        let function = descriptor("fn1", "python3.12", "app.handler");

        let err = upload_from_zip_file(
            &effects,
            &function,
            &temp.path().join("missing.zip"),
            &UploadOptions::default(),
            &RecordingSink::default(),
        )
        .expect_err("missing zip must fail");

        assert!(matches!(err, UploadError::Read { .. }));
        assert!(err.is_packaging());
        assert!(effects.service().deployed().is_empty());
        Ok(())
    }

    #[test]
    fn directory_upload_deploys_packed_tree() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("built");
        fs::create_dir_all(source.join("lib"))?;
        fs::write(source.join("index.js"), b"exports.handler = async () => 1;\n")?;
        fs::write(source.join("lib/util.js"), b"module.exports = 2;\n")?;
        let effects = StubEffects::new(temp.path())?;
        let function = descriptor("fn2", "nodejs20.x", "index.handler");
        let sink = RecordingSink::default();

        let report = deployed(upload_from_directory(
            &effects,
            &function,
            &source,
            &UploadOptions::default(),
            &sink,
        )?);

        let sent = effects.service().deployed();
        assert_eq!(sent.len(), 1);
        assert_eq!(report.archive_bytes, sent[0].1.len() as u64);
        let unpacked = temp.path().join("unpacked");
        crate::archive::unpack_reader(
            Cursor::new(sent[0].1.clone()),
            &unpacked,
            false,
            &ProgressBudget::full(&crate::progress::NoProgress),
        )?;
        assert_eq!(read_tree(&unpacked)?, read_tree(&source)?);
        assert_eq!(sink.total(), 100);
        assert!(sink.is_monotonic_within(100));
        Ok(())
    }

    #[test]
    fn missing_directory_never_reaches_deploy() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let effects = StubEffects::new(temp.path())?;
        let function = descriptor("fn2", "nodejs20.x", "index.handler");

        let err = upload_from_directory(
            &effects,
            &function,
            &temp.path().join("nope"),
            &UploadOptions::default(),
            &RecordingSink::default(),
        )
        .expect_err("missing directory must fail");

        assert!(matches!(
            err,
            UploadError::Packaging {
                source: PackError::NotADirectory { .. },
                ..
            }
        ));
        assert!(effects.service().deployed().is_empty());
        Ok(())
    }

    #[test]
    fn deploy_failure_is_reported_as_deploy_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let effects = StubEffects::new(temp.path())?.failing_deploy("ResourceConflictException");
        let function = descriptor("fn1", "python3.12", "app.handler");
        let archive = zip_bytes(&[("app.py", b"x = 1\n".as_slice())])?;

        let err = upload_from_zip_bytes(
            &effects,
            &function,
            archive,
            &UploadOptions::default(),
            &RecordingSink::default(),
        )
        .expect_err("deploy must fail");

        assert!(!err.is_packaging());
        assert_eq!(err.code(), "FN204");
        assert!(err.to_string().contains("ResourceConflictException"));
        Ok(())
    }

    #[test]
    fn failed_build_never_deploys() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("src");
        fs::create_dir_all(&source)?;
        fs::write(source.join("app.py"), b"def handler(e, c): pass\n")?;
        let builder = RecordingBuilder::failing(2, "Build Failed: missing requirements");
        let effects = StubEffects::new(temp.path())?.with_builder(builder);
        let function = descriptor("fn1", "python3.12", "app.handler");

        let err = upload_from_unbuilt_source(
            &effects,
            &RecordingConfirm::answering(true),
            &function,
            &source,
            &UploadOptions::default(),
            &RecordingSink::default(),
        )
        .expect_err("build failure must abort");

        assert!(matches!(
            err,
            UploadError::Build {
                source: BuildError::Failed { code: 2, .. },
                ..
            }
        ));
        assert_eq!(effects.recorded_builder().requests().len(), 1);
        assert!(effects.service().deployed().is_empty());
        Ok(())
    }

    #[test]
    fn build_packs_only_the_function_output() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("src");
        fs::create_dir_all(&source)?;
        fs::write(source.join("app.py"), b"def handler(e, c): pass\n")?;
        let builder = RecordingBuilder::producing(&[
            ("app.py", b"def handler(e, c): pass\n".as_slice()),
            ("vendor/requests/__init__.py", b"".as_slice()),
        ]);
        let effects = StubEffects::new(temp.path())?.with_builder(builder);
        let function = descriptor("fn1", "python3.12", "app.handler");
        let sink = RecordingSink::default();

        let report = deployed(upload_from_unbuilt_source(
            &effects,
            &RecordingConfirm::answering(false),
            &function,
            &source,
            &UploadOptions::default(),
            &sink,
        )?);

        assert_eq!(report.strategy, UploadStrategy::Build);
        assert_eq!(report.handler_warning, None);
        let requests = effects.recorded_builder().requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].containerless);
        assert!(requests[0].skip_image_pull);
        assert_eq!(requests[0].base_dir, source);
        assert!(requests[0].manifest_path.ends_with("template.json"));

        let sent = effects.service().deployed();
        let unpacked = temp.path().join("sent");
        crate::archive::unpack_reader(
            Cursor::new(sent[0].1.clone()),
            &unpacked,
            false,
            &ProgressBudget::full(&crate::progress::NoProgress),
        )?;
        let tree = read_tree(&unpacked)?;
        assert!(tree.contains_key("app.py"));
        assert!(tree.contains_key("vendor/requests/__init__.py"));
        assert!(!tree.keys().any(|k| k.contains("FnportFunction")));
        assert_eq!(sink.total(), 100);
        Ok(())
    }

    #[test]
    fn missing_handler_asks_before_building() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("src");
        fs::create_dir_all(&source)?;
        fs::write(source.join("index.js"), b"exports.main = 1;\n")?;
        let effects = StubEffects::new(temp.path())?.with_builder(RecordingBuilder::producing(&[]));
        let function = descriptor("fn2", "nodejs18.x", "app.handler");
        let confirm = RecordingConfirm::answering(false);

        let outcome = upload_from_unbuilt_source(
            &effects,
            &confirm,
            &function,
            &source,
            &UploadOptions::default(),
            &RecordingSink::default(),
        )?;

        assert_eq!(
            outcome,
            UploadOutcome::Cancelled {
                function: "fn2".into(),
                expected: source.join("app.js"),
            }
        );
        assert_eq!(confirm.asked(), vec![source.join("app.js")]);
        assert!(effects.recorded_builder().requests().is_empty());
        assert!(effects.service().deployed().is_empty());
        Ok(())
    }

    #[test]
    fn confirmed_missing_handler_is_carried_in_report() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("src");
        fs::create_dir_all(&source)?;
        let effects = StubEffects::new(temp.path())?
            .with_builder(RecordingBuilder::producing(&[("other.js", b"1".as_slice())]));
        let function = descriptor("fn2", "nodejs18.x", "app.handler");

        let report = deployed(upload_from_unbuilt_source(
            &effects,
            &RecordingConfirm::answering(true),
            &function,
            &source,
            &UploadOptions::default(),
            &RecordingSink::default(),
        )?);

        assert_eq!(report.handler_warning, Some(source.join("app.js")));
        Ok(())
    }

    #[test]
    fn unsupported_runtime_builds_without_asking() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("src");
        fs::create_dir_all(&source)?;
        let effects = StubEffects::new(temp.path())?
            .with_builder(RecordingBuilder::producing(&[("bootstrap", b"\x7fELF".as_slice())]));
        let function = descriptor("fn-go", "provided.al2023", "bootstrap");
        let confirm = RecordingConfirm::answering(false);

        deployed(upload_from_unbuilt_source(
            &effects,
            &confirm,
            &function,
            &source,
            &UploadOptions::default(),
            &RecordingSink::default(),
        )?);

        assert!(confirm.asked().is_empty());
        assert_eq!(effects.recorded_builder().requests().len(), 1);
        Ok(())
    }

    #[test]
    fn relative_source_dir_reaches_the_build_as_absolute() -> Result<()> {
        let cwd = std::env::current_dir()?;
        let checkout = tempfile::Builder::new()
            .prefix("fnport-rel-")
            .tempdir_in(&cwd)?;
        fs::write(checkout.path().join("app.py"), b"def handler(e, c): pass\n")?;
        let relative = checkout.path().strip_prefix(&cwd)?.to_path_buf();
        assert!(relative.is_relative());
        let temp = tempfile::tempdir()?;
        let effects = StubEffects::new(temp.path())?
            .with_builder(RecordingBuilder::producing(&[("app.py", b"x".as_slice())]));
        let function = descriptor("fn1", "python3.12", "app.handler");
        let confirm = RecordingConfirm::answering(false);

        deployed(upload_from_unbuilt_source(
            &effects,
            &confirm,
            &function,
            &relative,
            &UploadOptions::default(),
            &RecordingSink::default(),
        )?);

        assert!(confirm.asked().is_empty());
        let requests = effects.recorded_builder().requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].base_dir.is_absolute());
        assert_eq!(requests[0].base_dir, cwd.join(&relative));
        let manifest: Value =
            serde_json::from_str(&fs::read_to_string(&requests[0].manifest_path)?)?;
        assert_eq!(
            manifest["Resources"]["FnportFunction"]["Properties"]["CodeUri"],
            cwd.join(&relative).display().to_string()
        );
        Ok(())
    }

    #[test]
    fn build_without_output_directory_is_a_build_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("src");
        fs::create_dir_all(&source)?;
        fs::write(source.join("app.py"), b"")?;
        let effects =
            StubEffects::new(temp.path())?.with_builder(RecordingBuilder::succeeding_empty());
        let function = descriptor("fn1", "python3.12", "app.handler");

        let err = upload_from_unbuilt_source(
            &effects,
            &RecordingConfirm::answering(true),
            &function,
            &source,
            &UploadOptions::default(),
            &RecordingSink::default(),
        )
        .expect_err("missing output must fail");

        assert_eq!(err.reason(), "build_output_missing");
        assert!(effects.service().deployed().is_empty());
        Ok(())
    }

    #[test]
    fn dry_run_writes_archive_without_deploying() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("built");
        fs::create_dir_all(&source)?;
        fs::write(source.join("index.mjs"), b"export const handler = () => 1;\n")?;
        let effects = StubEffects::new(temp.path())?;
        let function = descriptor("fn3", "nodejs20.x", "index.handler");
        let out = temp.path().join("dist/fn3.zip");
        let options = UploadOptions {
            dry_run: true,
            archive_out: Some(out.clone()),
        };

        let outcome =
            upload_from_directory(&effects, &function, &source, &options, &RecordingSink::default())?;

        let UploadOutcome::Packaged(report) = outcome else {
            panic!("dry run should only package");
        };
        let written = fs::read(&out)?;
        assert_eq!(report.archive_bytes, written.len() as u64);
        assert_eq!(report.archive_sha256, hex::encode(Sha256::digest(&written)));
        assert!(effects.service().deployed().is_empty());
        Ok(())
    }
}

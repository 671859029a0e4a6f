use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Write};
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use fnport_domain::{FunctionDescriptor, MANIFEST_RESOURCE_NAME};
use httptest::{matchers::request, responders::status_code, Expectation, Server};
use walkdir::WalkDir;
use zip::write::FileOptions;

use crate::build::{BuildInvoker, BuildRequest};
use crate::effects::{Effects, FunctionService, HandlerConfirm, ImportFollowUp};
use crate::fetch::{ArtifactFetcher, HttpFetcher};
use crate::process::RunOutput;
use crate::progress::ProgressSink;
use crate::workspace::{CleanupRegistry, SystemTempProvisioner, TempProvisioner};

pub(crate) fn descriptor(name: &str, runtime: &str, handler: &str) -> FunctionDescriptor {
    FunctionDescriptor::new(
        name,
        format!("arn:aws:lambda:us-east-1:123456789012:function:{name}"),
        handler,
        runtime,
        "us-east-1",
    )
}

/// In-memory zip with the given `(name, contents)` entries, in order.
pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer.start_file(*name, FileOptions::default())?;
        writer.write_all(contents)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Relative path (with `/`) to contents for every file under `root`.
pub(crate) fn read_tree(root: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut tree = BTreeMap::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root)?;
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        tree.insert(key, fs::read(entry.path())?);
    }
    Ok(tree)
}

/// Serves `body` once at `path`; `None` when no local server can be bound.
pub(crate) fn serve_zip(path: &'static str, body: Vec<u8>) -> Option<Server> {
    let Ok(server) = panic::catch_unwind(Server::run) else {
        eprintln!("skipping test (httptest server unavailable)");
        return None;
    };
    server.expect(
        Expectation::matching(request::method_path("GET", path))
            .respond_with(status_code(200).body(body)),
    );
    Some(server)
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    reports: Mutex<Vec<(u32, Option<String>)>>,
}

impl RecordingSink {
    pub(crate) fn increments(&self) -> Vec<u32> {
        self.reports.lock().unwrap().iter().map(|(inc, _)| *inc).collect()
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, msg)| msg.clone())
            .collect()
    }

    pub(crate) fn total(&self) -> u32 {
        self.increments().iter().sum()
    }

    /// Whether the running sum stayed at or under `limit` after every report.
    pub(crate) fn is_monotonic_within(&self, limit: u32) -> bool {
        let mut sum = 0u32;
        self.increments().into_iter().all(|inc| {
            sum += inc;
            sum <= limit
        })
    }
}

impl ProgressSink for RecordingSink {
    fn report(&self, increment: u32, message: Option<&str>) {
        self.reports
            .lock()
            .unwrap()
            .push((increment, message.map(str::to_string)));
    }
}

pub(crate) struct RecordingService {
    code_url: String,
    deploy_failure: Option<String>,
    location_calls: Mutex<Vec<String>>,
    deployed: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingService {
    fn new() -> Self {
        Self {
            code_url: "http://127.0.0.1:9/unset.zip".to_string(),
            deploy_failure: None,
            location_calls: Mutex::new(Vec::new()),
            deployed: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn location_calls(&self) -> Vec<String> {
        self.location_calls.lock().unwrap().clone()
    }

    pub(crate) fn deployed(&self) -> Vec<(String, Vec<u8>)> {
        self.deployed.lock().unwrap().clone()
    }
}

impl FunctionService for RecordingService {
    fn describe_function(&self, name_or_arn: &str) -> Result<FunctionDescriptor> {
        Ok(descriptor(name_or_arn, "python3.12", "app.handler"))
    }

    fn code_location(&self, arn: &str) -> Result<String> {
        self.location_calls.lock().unwrap().push(arn.to_string());
        Ok(self.code_url.clone())
    }

    fn update_function_code(&self, function_name: &str, archive: &[u8]) -> Result<()> {
        if let Some(message) = &self.deploy_failure {
            bail!("{message}");
        }
        self.deployed
            .lock()
            .unwrap()
            .push((function_name.to_string(), archive.to_vec()));
        Ok(())
    }
}

enum BuildBehaviour {
    Fail { code: i32, log_tail: String },
    Produce(Vec<(String, Vec<u8>)>),
    NoOutput,
}

/// Fake build tool that records each request.
pub(crate) struct RecordingBuilder {
    behaviour: BuildBehaviour,
    requests: Mutex<Vec<BuildRequest>>,
}

impl RecordingBuilder {
    fn with(behaviour: BuildBehaviour) -> Self {
        Self {
            behaviour,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(code: i32, log_tail: &str) -> Self {
        Self::with(BuildBehaviour::Fail {
            code,
            log_tail: log_tail.to_string(),
        })
    }

    /// Writes `files` under the function's output subdirectory.
    pub(crate) fn producing(files: &[(&str, &[u8])]) -> Self {
        Self::with(BuildBehaviour::Produce(
            files
                .iter()
                .map(|(name, body)| ((*name).to_string(), body.to_vec()))
                .collect(),
        ))
    }

    /// Exits 0 without writing anything.
    pub(crate) fn succeeding_empty() -> Self {
        Self::with(BuildBehaviour::NoOutput)
    }

    pub(crate) fn requests(&self) -> Vec<BuildRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl BuildInvoker for RecordingBuilder {
    fn program(&self) -> &str {
        "recording-build"
    }

    fn build(&self, request: &BuildRequest) -> Result<RunOutput> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.behaviour {
            BuildBehaviour::Fail { code, log_tail } => Ok(RunOutput {
                code: *code,
                log_tail: log_tail.clone(),
            }),
            BuildBehaviour::Produce(files) => {
                let root = request.output_dir.join(MANIFEST_RESOURCE_NAME);
                fs::create_dir_all(&root)?;
                for (name, body) in files {
                    let path = root.join(name);
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(path, body)?;
                }
                Ok(RunOutput {
                    code: 0,
                    log_tail: "Build Succeeded".to_string(),
                })
            }
            BuildBehaviour::NoOutput => Ok(RunOutput {
                code: 0,
                log_tail: String::new(),
            }),
        }
    }
}

pub(crate) struct RecordingConfirm {
    answer: bool,
    asked: Mutex<Vec<PathBuf>>,
}

impl RecordingConfirm {
    pub(crate) fn answering(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn asked(&self) -> Vec<PathBuf> {
        self.asked.lock().unwrap().clone()
    }
}

impl HandlerConfirm for RecordingConfirm {
    fn confirm_missing_handler(&self, _function: &FunctionDescriptor, expected: &Path) -> bool {
        self.asked.lock().unwrap().push(expected.to_path_buf());
        self.answer
    }
}

#[derive(Default)]
pub(crate) struct RecordingFollowUp {
    seen: Mutex<Vec<PathBuf>>,
}

impl RecordingFollowUp {
    pub(crate) fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

impl ImportFollowUp for RecordingFollowUp {
    fn name(&self) -> &str {
        "record"
    }

    fn after_import(
        &self,
        _function: &FunctionDescriptor,
        _destination: &Path,
        handler_path: &Path,
    ) -> Result<()> {
        self.seen.lock().unwrap().push(handler_path.to_path_buf());
        Ok(())
    }
}

pub(crate) struct FailingFollowUp;

impl ImportFollowUp for FailingFollowUp {
    fn name(&self) -> &str {
        "open-editor"
    }

    fn after_import(
        &self,
        _function: &FunctionDescriptor,
        _destination: &Path,
        _handler_path: &Path,
    ) -> Result<()> {
        Err(anyhow!("no editor configured"))
    }
}

/// Real fetcher and temp provisioner around recording collaborators.
pub(crate) struct StubEffects {
    service: RecordingService,
    fetcher: HttpFetcher,
    temp: SystemTempProvisioner,
    cleanup: CleanupRegistry,
    builder: RecordingBuilder,
}

impl StubEffects {
    pub(crate) fn new(base: &Path) -> Result<Self> {
        Ok(Self {
            service: RecordingService::new(),
            fetcher: HttpFetcher::with_timeout(Duration::from_secs(10), false)?,
            temp: SystemTempProvisioner::new(base.join("tmp")),
            cleanup: CleanupRegistry::new(),
            builder: RecordingBuilder::succeeding_empty(),
        })
    }

    pub(crate) fn with_code_url(mut self, url: String) -> Self {
        self.service.code_url = url;
        self
    }

    pub(crate) fn failing_deploy(mut self, message: &str) -> Self {
        self.service.deploy_failure = Some(message.to_string());
        self
    }

    pub(crate) fn with_builder(mut self, builder: RecordingBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub(crate) fn service(&self) -> &RecordingService {
        &self.service
    }

    pub(crate) fn recorded_builder(&self) -> &RecordingBuilder {
        &self.builder
    }
}

impl Effects for StubEffects {
    fn functions(&self) -> &dyn FunctionService {
        &self.service
    }

    fn fetcher(&self) -> &dyn ArtifactFetcher {
        &self.fetcher
    }

    fn temp(&self) -> &dyn TempProvisioner {
        &self.temp
    }

    fn cleanup(&self) -> &CleanupRegistry {
        &self.cleanup
    }

    fn builder(&self) -> &dyn BuildInvoker {
        &self.builder
    }
}

#[test]
fn recording_sink_tracks_running_total() {
    let sink = RecordingSink::default();
    sink.report(30, Some("a"));
    sink.report(0, None);
    sink.report(80, Some("b"));
    assert_eq!(sink.total(), 110);
    assert!(!sink.is_monotonic_within(100));
    assert_eq!(sink.messages(), vec!["a", "b"]);
}

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use atty::Stream;
use fnport_core::{FunctionDescriptor, HandlerConfirm, ImportFollowUp};
use serde_json::json;
use tracing::debug;

use crate::progress::TerminalProgress;

const LAUNCH_DIR: &str = ".fnport";
const LAUNCH_FILE: &str = "launch.json";

/// Asks on the terminal; declines when stdin is not interactive.
///
/// The progress indicator is paused for as long as the question is open.
pub(crate) struct TerminalConfirm<'a> {
    pub(crate) progress: &'a TerminalProgress,
}

impl HandlerConfirm for TerminalConfirm<'_> {
    fn confirm_missing_handler(&self, function: &FunctionDescriptor, expected: &Path) -> bool {
        if !atty::is(Stream::Stdin) {
            debug!("stdin is not a terminal; declining to build without handler");
            return false;
        }
        let _paused = self.progress.pause();
        eprintln!(
            "fnport ▸ {} expects its handler '{}' in {}, which does not exist.",
            function.name,
            function.handler,
            expected.display()
        );
        eprint!("fnport ▸ Build and deploy anyway? [y/N] ");
        let _ = io::stderr().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        is_yes(&answer)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Opens the handler file in `$VISUAL` or `$EDITOR` without waiting.
pub(crate) struct OpenInEditor;

impl ImportFollowUp for OpenInEditor {
    fn name(&self) -> &str {
        "open-editor"
    }

    fn after_import(
        &self,
        _function: &FunctionDescriptor,
        destination: &Path,
        handler_path: &Path,
    ) -> Result<()> {
        let Some(editor) = ["VISUAL", "EDITOR"]
            .iter()
            .find_map(|key| env::var(key).ok().filter(|value| !value.trim().is_empty()))
        else {
            bail!("no editor configured (set VISUAL or EDITOR)");
        };
        let mut parts = editor.split_whitespace();
        let program = parts.next().unwrap_or_default();
        Command::new(program)
            .args(parts)
            .arg(handler_path)
            .current_dir(destination)
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start {program}"))?;
        Ok(())
    }
}

/// Records how to invoke the handler locally in `<dest>/.fnport/launch.json`.
pub(crate) struct LaunchEntry;

impl ImportFollowUp for LaunchEntry {
    fn name(&self) -> &str {
        "launch-entry"
    }

    fn after_import(
        &self,
        function: &FunctionDescriptor,
        destination: &Path,
        handler_path: &Path,
    ) -> Result<()> {
        let dir = destination.join(LAUNCH_DIR);
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let relative = handler_path.strip_prefix(destination).unwrap_or(handler_path);
        let entry = json!({
            "name": format!("{} (local)", function.name),
            "function": function.name,
            "arn": function.arn,
            "region": function.region,
            "runtime": function.runtime,
            "handler": function.handler,
            "handler_file": relative.display().to_string(),
            "event": {},
        });
        let path = dir.join(LAUNCH_FILE);
        fs::write(&path, serde_json::to_string_pretty(&entry)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

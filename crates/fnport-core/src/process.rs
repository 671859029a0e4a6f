use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use anyhow::{anyhow, Context, Result};
use tracing::debug;

/// Lines of tool output kept for error reports.
pub const LOG_TAIL_LINES: usize = 40;

/// Exit code plus the last lines the tool printed on either stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub code: i32,
    pub log_tail: String,
}

impl RunOutput {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.code == 0
    }
}

/// Bounded, shared view of interleaved stdout/stderr lines.
#[derive(Debug)]
struct LogTail {
    lines: Mutex<VecDeque<String>>,
    limit: usize,
}

impl LogTail {
    fn new(limit: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(limit)),
            limit,
        }
    }

    fn push(&self, line: String) {
        if self.limit == 0 {
            return;
        }
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == self.limit {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    fn render(&self) -> String {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Run an external tool from `cwd`, logging every output line at debug
/// level and keeping the last [`LOG_TAIL_LINES`] of them.
///
/// # Errors
///
/// Returns an error when the tool cannot be started or waited on.
pub fn run_tool(program: &str, args: &[String], cwd: &Path) -> Result<RunOutput> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;

    let tail = Arc::new(LogTail::new(LOG_TAIL_LINES));
    let readers = [
        child
            .stdout
            .take()
            .map(|out| follow("stdout", out, Arc::clone(&tail))),
        child
            .stderr
            .take()
            .map(|err| follow("stderr", err, Arc::clone(&tail))),
    ];
    let status = child
        .wait()
        .with_context(|| format!("failed to wait for {program}"))?;
    for reader in readers.into_iter().flatten() {
        reader
            .join()
            .map_err(|_| anyhow!("output reader for {program} panicked"))?;
    }

    Ok(RunOutput {
        code: status.code().unwrap_or(-1),
        log_tail: tail.render(),
    })
}

fn follow(
    stream: &'static str,
    reader: impl Read + Send + 'static,
    tail: Arc<LogTail>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&raw).trim_end().to_string();
                    debug!(stream, "{line}");
                    tail.push(line);
                }
            }
        }
    })
}

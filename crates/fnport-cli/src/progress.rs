use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use fnport_core::{ProgressSink, FULL_BUDGET};

pub(crate) fn progress_enabled(configured: Option<bool>, quiet: bool, json: bool) -> bool {
    if quiet || json {
        return false;
    }
    configured.unwrap_or_else(|| io::stderr().is_terminal())
}

/// Single-line percentage indicator drawn on stderr by a background thread.
pub(crate) struct TerminalProgress {
    percent: Arc<AtomicU32>,
    label: Arc<Mutex<String>>,
    /// Number of live [`PausedProgress`] guards; nothing is drawn while > 0.
    paused: Arc<Mutex<u32>>,
    stop: Option<Arc<AtomicBool>>,
    handle: Option<thread::JoinHandle<()>>,
}

/// Keeps the indicator off the terminal while held, so prompts stay visible.
pub(crate) struct PausedProgress<'a> {
    paused: &'a Mutex<u32>,
}

impl Drop for PausedProgress<'_> {
    fn drop(&mut self) {
        let mut count = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
    }
}

impl TerminalProgress {
    pub(crate) fn start(label: impl Into<String>, enabled: bool) -> Self {
        let percent = Arc::new(AtomicU32::new(0));
        let label = Arc::new(Mutex::new(label.into()));
        let paused = Arc::new(Mutex::new(0));
        if !enabled {
            return Self {
                percent,
                label,
                paused,
                stop: None,
                handle: None,
            };
        }

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread_percent = Arc::clone(&percent);
        let thread_label = Arc::clone(&label);
        let thread_paused = Arc::clone(&paused);
        let handle = thread::spawn(move || {
            TerminalProgress::run(&thread_label, &thread_percent, &thread_paused, &thread_stop);
        });
        Self {
            percent,
            label,
            paused,
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    /// Clears the line and stops redrawing until the guard is dropped.
    pub(crate) fn pause(&self) -> PausedProgress<'_> {
        let mut count = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        *count += 1;
        if self.handle.is_some() {
            clear_line();
        }
        PausedProgress {
            paused: &self.paused,
        }
    }

    fn run(label: &Mutex<String>, percent: &AtomicU32, paused: &Mutex<u32>, stop: &AtomicBool) {
        let mut idx = 0;
        while !stop.load(AtomicOrdering::Relaxed) {
            {
                // Draw under the lock so no frame lands after a pause cleared the line.
                let count = paused.lock().unwrap_or_else(PoisonError::into_inner);
                if *count == 0 {
                    let line = frame_line(label, percent, idx);
                    let _ = io::stderr().write_all(line.as_bytes());
                    let _ = io::stderr().flush();
                    idx += 1;
                }
            }
            thread::sleep(Duration::from_millis(80));
        }
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop.store(true, AtomicOrdering::Relaxed);
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
            clear_line();
        }
    }

    #[cfg(test)]
    fn is_paused(&self) -> bool {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner) > 0
    }

    #[cfg(test)]
    fn percent(&self) -> u32 {
        self.percent.load(AtomicOrdering::Relaxed)
    }
}

fn frame_line(label: &Mutex<String>, percent: &AtomicU32, idx: usize) -> String {
    const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
    let frame = FRAMES[idx % FRAMES.len()];
    let current = percent.load(AtomicOrdering::Relaxed).min(FULL_BUDGET);
    let text = label
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    format!("\r\x1b[2Kfnport ▸ {text} [{current:>3}%] {frame}")
}

fn clear_line() {
    let _ = io::stderr().write_all(b"\r\x1b[2K");
    let _ = io::stderr().flush();
}

impl ProgressSink for TerminalProgress {
    fn report(&self, increment: u32, message: Option<&str>) {
        self.percent.fetch_add(increment, AtomicOrdering::Relaxed);
        if let Some(message) = message {
            *self.label.lock().unwrap_or_else(PoisonError::into_inner) = message.to_string();
        }
    }
}

impl Drop for TerminalProgress {
    fn drop(&mut self) {
        self.stop();
    }
}

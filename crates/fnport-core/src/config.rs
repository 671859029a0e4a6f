use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;
const DEFAULT_BUILD_PROGRAM: &str = "sam";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn flag_is_enabled(&self, key: &str) -> bool {
        self.var(key).is_some_and(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }

    pub(crate) fn flag_is_disabled(&self, key: &str) -> bool {
        self.var(key).is_some_and(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "" | "0" | "false" | "no" | "off"
            )
        })
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub temp: TempConfig,
    pub network: NetworkConfig,
    pub build: BuildConfig,
    pub progress: ProgressConfig,
}

#[derive(Debug, Clone)]
pub struct TempConfig {
    pub root: PathBuf,
    /// Leave registered workspaces on disk at teardown.
    pub keep: bool,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub timeout: Duration,
    pub keep_proxies: bool,
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub program: String,
}

#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// `None` means "decide from the terminal".
    pub enabled: Option<bool>,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    ///
    /// # Errors
    /// Returns an error if a numeric variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Result<Self> {
        let root = snapshot
            .var("FNPORT_TEMP_ROOT")
            .filter(|value| !value.trim().is_empty())
            .map_or_else(|| env::temp_dir().join("fnport"), PathBuf::from);
        let timeout_secs = match snapshot.var("FNPORT_HTTP_TIMEOUT") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("FNPORT_HTTP_TIMEOUT must be whole seconds (got '{raw}')"))?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };
        let program = snapshot
            .var("FNPORT_SAM_CLI")
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_BUILD_PROGRAM)
            .to_string();
        let progress = if snapshot.flag_is_disabled("FNPORT_PROGRESS") {
            Some(false)
        } else if snapshot.flag_is_enabled("FNPORT_PROGRESS") {
            Some(true)
        } else {
            None
        };

        Ok(Self {
            temp: TempConfig {
                root,
                keep: snapshot.flag_is_enabled("FNPORT_KEEP_TEMP"),
            },
            network: NetworkConfig {
                timeout: Duration::from_secs(timeout_secs.max(1)),
                keep_proxies: crate::net::keep_proxies(snapshot),
            },
            build: BuildConfig { program },
            progress: ProgressConfig { enabled: progress },
        })
    }

    #[must_use]
    pub fn with_temp_root(mut self, root: Option<PathBuf>) -> Self {
        if let Some(root) = root {
            self.temp.root = root;
        }
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        if let Some(secs) = secs {
            self.network.timeout = Duration::from_secs(secs.max(1));
        }
        self
    }

    #[must_use]
    pub fn with_build_program(mut self, program: Option<String>) -> Self {
        if let Some(program) = program.filter(|value| !value.trim().is_empty()) {
            self.build.program = program;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_apply_without_overrides() -> Result<()> {
        let config = Config::from_snapshot(&EnvSnapshot::testing(&[]))?;
        assert_eq!(config.temp.root, env::temp_dir().join("fnport"));
        assert!(!config.temp.keep);
        assert_eq!(config.network.timeout, Duration::from_secs(300));
        assert!(!config.network.keep_proxies);
        assert_eq!(config.build.program, "sam");
        assert_eq!(config.progress.enabled, None);
        Ok(())
    }

    #[test]
    fn env_overrides_are_honored() -> Result<()> {
        let snapshot = EnvSnapshot::testing(&[
            ("FNPORT_TEMP_ROOT", "/scratch/fnport"),
            ("FNPORT_HTTP_TIMEOUT", "12"),
            ("FNPORT_SAM_CLI", "/opt/sam/bin/sam"),
            ("FNPORT_PROGRESS", "0"),
            ("FNPORT_KEEP_TEMP", "yes"),
        ]);
        let config = Config::from_snapshot(&snapshot)?;
        assert_eq!(config.temp.root, PathBuf::from("/scratch/fnport"));
        assert!(config.temp.keep);
        assert_eq!(config.network.timeout, Duration::from_secs(12));
        assert_eq!(config.build.program, "/opt/sam/bin/sam");
        assert_eq!(config.progress.enabled, Some(false));
        Ok(())
    }

    #[test]
    fn rejects_non_numeric_timeout() {
        let snapshot = EnvSnapshot::testing(&[("FNPORT_HTTP_TIMEOUT", "soon")]);
        let err = Config::from_snapshot(&snapshot).expect_err("timeout should be rejected");
        assert!(err.to_string().contains("FNPORT_HTTP_TIMEOUT"));
    }

    #[test]
    fn flag_overrides_take_precedence() -> Result<()> {
        let config = Config::from_snapshot(&EnvSnapshot::testing(&[]))?
            .with_temp_root(Some(PathBuf::from("/tmp/elsewhere")))
            .with_timeout(Some(0))
            .with_build_program(Some("  ".into()));
        assert_eq!(config.temp.root, PathBuf::from("/tmp/elsewhere"));
        assert_eq!(config.network.timeout, Duration::from_secs(1));
        assert_eq!(config.build.program, "sam");
        Ok(())
    }

    #[test]
    #[serial]
    fn from_env_reads_process_environment() -> Result<()> {
        let previous = env::var("FNPORT_SAM_CLI").ok();
        env::set_var("FNPORT_SAM_CLI", "sam-nightly");
        let config = Config::from_env();
        match previous {
            Some(value) => env::set_var("FNPORT_SAM_CLI", value),
            None => env::remove_var("FNPORT_SAM_CLI"),
        }
        assert_eq!(config?.build.program, "sam-nightly");
        Ok(())
    }
}

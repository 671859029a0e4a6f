use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::NetworkConfig;
use crate::errors::FetchError;
use crate::net::{http_client, redact_url};
use crate::progress::ProgressBudget;

const CONNECTED_SHARE: u32 = 10;
const BUFFER_SIZE: usize = 64 * 1024;

/// Streams a remote artifact to a local path.
pub trait ArtifactFetcher: Send + Sync {
    /// Returns the number of bytes written. The destination only appears
    /// once the whole body has been received.
    fn fetch(&self, url: &str, dest: &Path, progress: &ProgressBudget<'_>)
        -> Result<u64, FetchError>;
}

/// Blocking HTTP(S) fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &NetworkConfig) -> Result<Self, FetchError> {
        Self::with_timeout(config.timeout, config.keep_proxies)
    }

    pub fn with_timeout(timeout: Duration, keep_proxies: bool) -> Result<Self, FetchError> {
        let client = http_client(timeout, keep_proxies).map_err(|err| FetchError::Client {
            message: format!("{err:#}"),
        })?;
        Ok(Self { client })
    }
}

impl ArtifactFetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: &ProgressBudget<'_>,
    ) -> Result<u64, FetchError> {
        let shown = redact_url(url);
        debug!(url = %shown, dest = %dest.display(), "fetching artifact");
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|source| FetchError::Connect {
                url: shown.clone(),
                source: source.without_url(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: shown,
                status: status.as_u16(),
            });
        }
        progress.advance(progress.portion(CONNECTED_SHARE), Some("Downloading"));

        let write_err = |source: std::io::Error| FetchError::Write {
            path: dest.to_path_buf(),
            source,
        };
        let parent = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(write_err)?;
        let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
        let mut written: u64 = 0;
        let mut buffer = vec![0u8; BUFFER_SIZE];
        loop {
            let read = response
                .read(&mut buffer)
                .map_err(|source| FetchError::Stream {
                    url: shown.clone(),
                    source,
                })?;
            if read == 0 {
                break;
            }
            tmp.write_all(&buffer[..read]).map_err(write_err)?;
            written += read as u64;
        }
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(dest).map_err(|err| write_err(err.error))?;

        info!(url = %shown, bytes = written, "downloaded artifact");
        progress.complete(None);
        Ok(written)
    }
}

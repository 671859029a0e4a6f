use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use url::Url;

use crate::config::EnvSnapshot;

pub(crate) const USER_AGENT: &str = concat!("fnport/", env!("CARGO_PKG_VERSION"));

const PROXY_KEYS: &[&str] = &[
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "ALL_PROXY",
    "all_proxy",
    "NO_PROXY",
    "no_proxy",
];

/// Decide whether fetches should honor standard proxy environment variables.
///
/// Behavior:
/// - `FNPORT_KEEP_PROXIES=1/true/yes/on` forces proxies on.
/// - `FNPORT_KEEP_PROXIES=0/false/no/off/""` forces proxies off.
/// - If unset, proxies are enabled only when at least one proxy env var is set.
pub(crate) fn keep_proxies(snapshot: &EnvSnapshot) -> bool {
    match snapshot.var("FNPORT_KEEP_PROXIES") {
        Some(_) => !snapshot.flag_is_disabled("FNPORT_KEEP_PROXIES"),
        None => PROXY_KEYS.iter().any(|key| {
            snapshot
                .var(key)
                .is_some_and(|value| !value.trim().is_empty())
        }),
    }
}

pub(crate) fn http_client(timeout: Duration, keep_proxies: bool) -> Result<Client> {
    let mut builder = Client::builder().user_agent(USER_AGENT).timeout(timeout);
    if !keep_proxies {
        builder = builder.no_proxy();
    }
    builder.build().context("failed to build http client")
}

/// Strip credentials, query and fragment so pre-signed URLs are safe to log.
pub fn redact_url(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(mut url) = Url::parse(raw) {
        let _ = url.set_username("");
        let _ = url.set_password(None);
        url.set_query(None);
        url.set_fragment(None);
        return url.to_string();
    }
    let mut redacted = raw.to_string();
    if let Some(pos) = redacted.find(['?', '#']) {
        redacted.truncate(pos);
    }
    redacted
}

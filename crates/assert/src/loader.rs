//! Loading trace and metric snapshots from files and live endpoints.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::de::DeserializeOwned;

use crate::env::expand_env;
use crate::error::{Error, Result};
use crate::exposition::parse_exposition;
use crate::model::{Family, TraceSnapshot};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Where actual metrics come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricsSource {
    /// A live endpoint serving the text exposition format
    Url(Url),
    /// A file holding exposition text or a JSON family array
    File(PathBuf),
}

impl MetricsSource {
    /// Classify `source` after environment expansion.
    ///
    /// Anything that parses as a URL with a non-empty scheme and a host is an
    /// endpoint (`file://` URLs become paths). Everything else, including
    /// host-less forms such as `C:/data/metrics.txt` or
    /// `localhost:9090/metrics`, is a filesystem path.
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let expanded = expand_env(source);
        match Url::parse(&expanded) {
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map_or_else(|()| Self::File(PathBuf::from(&expanded)), Self::File),
            Ok(url) if !url.scheme().is_empty() && url.has_host() => Self::Url(url),
            _ => Self::File(PathBuf::from(expanded)),
        }
    }
}

/// Load a trace snapshot and sort the spans of each trace by start time.
///
/// Files ending in `.yml`/`.yaml` are read as YAML, anything else as JSON.
///
/// # Errors
///
/// Returns [`Error::Io`] or [`Error::Parse`].
pub fn load_traces(path: impl AsRef<Path>) -> Result<TraceSnapshot> {
    let path = path.as_ref();
    let mut snapshot: TraceSnapshot = read_document(path)?;
    for trace in &mut snapshot.traces {
        trace.sort_spans();
    }
    tracing::debug!(path = %path.display(), traces = snapshot.traces.len(), "Loaded traces");
    Ok(snapshot)
}

/// Load an expected metric family array.
///
/// # Errors
///
/// Returns [`Error::Io`] or [`Error::Parse`].
pub fn load_expected_metrics(path: impl AsRef<Path>) -> Result<Vec<Family>> {
    read_document(path.as_ref())
}

/// Load actual metrics from an endpoint or a file, see [`MetricsSource`].
///
/// # Errors
///
/// Returns a transport error ([`Error::Http`], [`Error::HttpStatus`],
/// [`Error::Io`]) or a parse error ([`Error::Exposition`], [`Error::Parse`]).
pub async fn load_metrics(source: &str) -> Result<Vec<Family>> {
    match MetricsSource::parse(source) {
        MetricsSource::Url(url) => fetch_metrics(url).await,
        MetricsSource::File(path) => {
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::io(&path, e))?;
            if content.trim_start().starts_with('[') {
                serde_json::from_str(&content).map_err(|e| Error::parse(&path, e))
            } else {
                parse_exposition(&content)
            }
        }
    }
}

async fn fetch_metrics(url: Url) -> Result<Vec<Family>> {
    let endpoint = url.to_string();
    let http = |source: reqwest::Error| Error::Http {
        url: endpoint.clone(),
        source,
    };

    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(concat!("e2e-verify/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(http)?;

    tracing::debug!(url = %endpoint, "Fetching metrics");
    let response = client.get(url).send().await.map_err(http)?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            url: endpoint.clone(),
            status: status.as_u16(),
        });
    }

    let body = response.text().await.map_err(http)?;
    parse_exposition(&body)
}

fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"));

    if is_yaml {
        serde_yaml::from_str(&content).map_err(|e| Error::parse(path, e))
    } else {
        serde_json::from_str(&content).map_err(|e| Error::parse(path, e))
    }
}

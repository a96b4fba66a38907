//! Input loading: turn a user-supplied path or URL into a [`SourceDocument`].
//!
//! Every stage after this works on in-memory bytes, so URL downloads are
//! read straight into memory and nothing is staged on disk. Format checks
//! happen later, in detection; this module only fetches.

use crate::document::SourceDocument;
use crate::error::DoclensError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name given to a download whose URL and headers carry no usable filename.
/// No extension, so detection falls back to content sniffing.
const FALLBACK_DOWNLOAD_NAME: &str = "download";

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load one input, local or remote.
pub async fn load_source(input: &str, timeout_secs: u64) -> Result<SourceDocument, DoclensError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

/// Load many inputs concurrently, preserving input order.
///
/// The input count is checked against `max_batch_size` before anything is
/// read or downloaded.
pub async fn load_sources(
    inputs: &[String],
    max_batch_size: usize,
    timeout_secs: u64,
) -> Result<Vec<SourceDocument>, DoclensError> {
    if inputs.is_empty() {
        return Err(DoclensError::EmptyBatch);
    }
    if inputs.len() > max_batch_size {
        return Err(DoclensError::TooManyDocuments {
            count: inputs.len(),
            max: max_batch_size,
        });
    }
    let loads = inputs.iter().map(|i| load_source(i, timeout_secs));
    futures::future::try_join_all(loads).await
}

async fn read_local(path_str: &str) -> Result<SourceDocument, DoclensError> {
    let path = PathBuf::from(path_str);
    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => DoclensError::PermissionDenied { path: path.clone() },
        std::io::ErrorKind::NotFound => DoclensError::FileNotFound { path: path.clone() },
        _ => DoclensError::InvalidInput {
            input: format!("{}: {}", path.display(), e),
        },
    })?;
    let filename = file_name_of(&path).ok_or_else(|| DoclensError::InvalidInput {
        input: path_str.to_string(),
    })?;
    debug!("Read {} ({} bytes)", path.display(), bytes.len());
    Ok(SourceDocument::new(filename, bytes))
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceDocument, DoclensError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DoclensError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            DoclensError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            DoclensError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(DoclensError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let disposition = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let filename = extract_filename(url, disposition.as_deref());

    let bytes = response.bytes().await.map_err(map_send_err)?;
    info!("Downloaded {} ({} bytes)", filename, bytes.len());
    Ok(SourceDocument::new(filename, bytes.to_vec()))
}

/// Pick a filename: `Content-Disposition` first, then the last URL path
/// segment when it has an extension.
fn extract_filename(url: &str, content_disposition: Option<&str>) -> String {
    if let Some(name) = content_disposition.and_then(disposition_filename) {
        return name;
    }

    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    FALLBACK_DOWNLOAD_NAME.to_string()
}

fn disposition_filename(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|v| v.trim_matches('"').to_string())
        .filter(|v| !v.is_empty() && !v.contains('/'))
}

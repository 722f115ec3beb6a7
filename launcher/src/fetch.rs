//! Validator-aware retrieval of the artifact.

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};
use url::Url;

use crate::cache::{ResponseHeaders, Validator};
use crate::error::FetchError;
use crate::progress::DownloadProgress;

/// Result of a conditional fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The server confirmed the cached artifact is current. The caller must
    /// not touch the cache store.
    NotModified,

    /// Full payload plus the response headers to persist alongside it.
    Modified {
        bytes: Vec<u8>,
        headers: ResponseHeaders,
    },
}

/// Stream the artifact, sending `If-None-Match` / `If-Modified-Since` when a
/// validator is available.
///
/// The body is buffered in memory (the artifact is bounded to a few
/// megabytes), with `progress` updated after each chunk. A 304 maps to
/// [`FetchOutcome::NotModified`] only for conditional requests; any other
/// non-200 status is a [`FetchError::UnexpectedStatus`].
pub async fn fetch_pyz(
    client: &Client,
    url: &Url,
    validator: Option<&Validator>,
    progress: &mut DownloadProgress,
) -> Result<FetchOutcome, FetchError> {
    let mut request = client.get(url.clone());
    if let Some(validator) = validator {
        if let Some(last_modified) = &validator.last_modified {
            request = request.header(IF_MODIFIED_SINCE, last_modified.as_str());
        }
        if let Some(etag) = &validator.etag {
            request = request.header(IF_NONE_MATCH, etag.as_str());
        }
    }

    let response = request.send().await.map_err(|source| FetchError::Transport {
        url: url.clone(),
        source,
    })?;
    let status = response.status();
    tracing::info!(%url, %status, conditional = validator.is_some(), "downloading pip");

    if status == StatusCode::NOT_MODIFIED && validator.is_some() {
        return Ok(FetchOutcome::NotModified);
    }
    if status != StatusCode::OK {
        return Err(FetchError::UnexpectedStatus {
            url: url.clone(),
            status,
        });
    }

    let headers = lowercase_headers(response.headers());
    progress.set_total(response.content_length());

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| FetchError::Transport {
            url: url.clone(),
            source,
        })?;
        bytes.extend_from_slice(&chunk);
        progress.update(bytes.len() as u64);
    }
    progress.finish();

    tracing::info!(size = bytes.len(), "downloaded pip");
    Ok(FetchOutcome::Modified { bytes, headers })
}

fn lowercase_headers(headers: &HeaderMap) -> ResponseHeaders {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_ascii_lowercase(), value.to_string()))
        })
        .collect()
}

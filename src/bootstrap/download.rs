use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::header::USER_AGENT;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;

use crate::error::PrestartError;
use crate::progress::Reporter;

#[derive(Debug, Clone)]
pub struct DownloadTarget {
    pub url: String,
    pub dest: PathBuf,
    pub label: String,
    /// Sent as the `User-Agent` header.
    pub user_agent: String,
}

/// Where the body is streamed to before it is renamed onto the destination.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Downloads `target.url` into `target.dest` with a single GET request.
///
/// The body goes to a `.part` sibling first and is renamed onto `dest` only
/// once it has been written completely, so an existing `dest` is always a
/// finished download. A failed fetch may leave the `.part` file behind.
pub async fn fetch(
    client: &reqwest::Client,
    target: &DownloadTarget,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<u64, PrestartError> {
    let url = target.url.as_str();
    let dest = target.dest.as_path();
    match dest.parent() {
        Some(parent) if parent.as_os_str().is_empty() || parent.is_dir() => {}
        Some(parent) => return Err(PrestartError::MissingParent(parent.to_path_buf())),
        None => return Err(PrestartError::MissingParent(dest.to_path_buf())),
    }

    tracing::debug!("GET {url}");
    let request = client.get(url).header(USER_AGENT, &target.user_agent);
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(PrestartError::Cancelled),
        sent = request.send() => sent.map_err(|source| PrestartError::Request {
            url: url.to_string(),
            source,
        })?,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(PrestartError::HttpStatus {
            url: url.to_string(),
            status,
        });
    }

    let total = response.content_length();
    let part = part_path(dest);
    let file = tokio::fs::File::create(&part)
        .await
        .map_err(|e| PrestartError::fs(&part, e))?;
    let mut writer = BufWriter::new(file);

    reporter.start(&target.label, total);
    let written = stream_body(response, &mut writer, &part, url, reporter, cancel).await;
    reporter.finish();
    let written = written?;

    writer.flush().await.map_err(|e| PrestartError::fs(&part, e))?;
    drop(writer);
    tokio::fs::rename(&part, dest)
        .await
        .map_err(|e| PrestartError::fs(dest, e))?;

    tracing::debug!("saved {written} bytes to {}", dest.display());
    Ok(written)
}

async fn stream_body(
    response: reqwest::Response,
    writer: &mut BufWriter<tokio::fs::File>,
    part: &Path,
    url: &str,
    reporter: &dyn Reporter,
    cancel: &CancellationToken,
) -> Result<u64, PrestartError> {
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PrestartError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|source| PrestartError::Request {
            url: url.to_string(),
            source,
        })?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| PrestartError::fs(part, e))?;
        reporter.advance(chunk.len() as u64);
        written += chunk.len() as u64;
    }
    Ok(written)
}

//! The single-file fetcher: probe, skip, transfer, verify.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use md5::{Digest, Md5};
use reqwest::Method;
use reqwest::header::CONTENT_LENGTH;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::error::FetchError;
use super::probe::DownloadProbe;
use crate::batch::Job;
use crate::challenge::ChallengeGate;
use crate::request::{RequestClient, RequestError, RequestSpec, RetryPolicy, SessionCookie};

/// Timeout for the HEAD probe. Deliberately short: the probe only reads
/// headers, while the transfer itself may legitimately run much longer.
const DEFAULT_HEAD_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout for the file transfer. Large media files on slow hosts take a
/// while; 25 minutes matches the worst case seen in practice.
const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(25 * 60);

/// Per-fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Timeout for the HEAD probe.
    pub head_timeout: Duration,
    /// Timeout for the GET transfer.
    pub transfer_timeout: Duration,
    /// Re-download files that already exist on disk.
    pub overwrite_existing: bool,
    /// Whether this endpoint honors range requests.
    pub supports_range: bool,
    /// Retry policy for the fetch's requests.
    pub retry: RetryPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            head_timeout: DEFAULT_HEAD_TIMEOUT,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            overwrite_existing: false,
            supports_range: true,
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Final file path.
    pub path: PathBuf,
    /// Bytes written by this fetch (zero when skipped).
    pub bytes_transferred: u64,
    /// The file was already complete; nothing was transferred.
    pub skipped: bool,
    /// The transfer continued a partial file via a range request.
    pub resumed: bool,
}

/// Downloads one file per [`Job`], resuming partials and verifying
/// integrity. Requests go through the request engine, optionally behind a
/// [`ChallengeGate`].
#[derive(Debug, Clone)]
pub struct FileFetcher {
    client: RequestClient,
    gate: Option<ChallengeGate>,
    options: FetchOptions,
    cookies: Vec<SessionCookie>,
    headers: Vec<(String, String)>,
}

impl FileFetcher {
    /// Creates a fetcher over a shared request client.
    #[must_use]
    pub fn new(client: RequestClient, options: FetchOptions) -> Self {
        Self {
            client,
            gate: None,
            options,
            cookies: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Routes all requests through a challenge gate.
    #[must_use]
    pub fn with_gate(mut self, gate: ChallengeGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Attaches session cookies to every request.
    #[must_use]
    pub fn with_cookies(mut self, cookies: Vec<SessionCookie>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Attaches extra headers to every request.
    #[must_use]
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// The fetcher's options.
    #[must_use]
    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Fetches one job: probe, skip check, transfer, verify.
    ///
    /// Operations within one job are strictly sequential. Cancellation
    /// stops the transfer but leaves partial content on disk — cleanup
    /// policy belongs to the batch, and resumability depends on the
    /// partial surviving.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on request, IO, or integrity failure, and
    /// [`FetchError::Cancelled`] when the token fires.
    #[instrument(skip(self, job, cancel), fields(url = %job.url))]
    pub async fn fetch(
        &self,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError> {
        // Probe the expected size first; Content-Length is often missing
        // from the GET itself due to chunked encoding.
        let head_spec = self
            .base_spec(Method::HEAD, &job.url)
            .with_timeout(self.options.head_timeout)
            .check_status(true);
        let head = self.send(&head_spec, cancel).await?;
        let expected_size = content_length_of(&head);
        drop(head);

        let target = resolve_target_path(&job.file_path, &job.url).await?;
        let already_written = local_size(&target).await;
        let probe = DownloadProbe {
            expected_size,
            already_written,
            supports_range: self.options.supports_range,
        };
        debug!(?probe, path = %target.display(), "probed download state");

        if probe.can_skip(self.options.overwrite_existing) {
            info!(path = %target.display(), "file already complete, skipping");
            return Ok(FetchOutcome {
                path: target,
                bytes_transferred: 0,
                skipped: true,
                resumed: false,
            });
        }

        let mut resume_offset = probe.resume_offset();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = self
                .transfer(job, &target, resume_offset, cancel)
                .await?;

            let Some(expected_md5) = job.expected_md5.as_deref() else {
                return Ok(outcome);
            };
            let actual = md5_file(&target).await?;
            if actual.eq_ignore_ascii_case(expected_md5) {
                return Ok(outcome);
            }
            if attempt >= 2 {
                return Err(FetchError::ChecksumMismatch {
                    path: target,
                    expected: expected_md5.to_string(),
                    actual,
                });
            }
            // The partial/local content cannot be trusted after a checksum
            // mismatch; start over from byte zero.
            warn!(path = %target.display(), "checksum mismatch, re-downloading from scratch");
            tokio::fs::remove_file(&target)
                .await
                .map_err(|e| FetchError::io(&target, e))?;
            resume_offset = None;
        }
    }

    /// One transfer attempt: GET (optionally ranged), stream to disk,
    /// verify the resumed length.
    async fn transfer(
        &self,
        job: &Job,
        target: &Path,
        resume_offset: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError> {
        let mut spec = self
            .base_spec(Method::GET, &job.url)
            .with_timeout(self.options.transfer_timeout)
            .with_retry(self.options.retry.clone());
        if let Some(offset) = resume_offset {
            spec = spec.with_header("Range", format!("bytes={offset}-"));
        }

        let response = self.send(&spec, cancel).await?;
        let status = response.status().as_u16();
        if status != 200 && status != 206 {
            return Err(FetchError::request(
                &job.url,
                RequestError::status(&job.url, 1, status),
            ));
        }

        // A 200 despite our Range header means the server restarted from
        // byte zero; truncate and take the full body.
        let resumed = status == 206 && resume_offset.is_some();
        let existing = if resumed { resume_offset.unwrap_or(0) } else { 0 };
        let content_length =
            content_length_of(&response).map(|len| existing.saturating_add(len));

        let mut file = if resumed {
            let mut handle = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(target)
                .await
                .map_err(|e| FetchError::io(target, e))?;
            handle
                .seek(std::io::SeekFrom::End(0))
                .await
                .map_err(|e| FetchError::io(target, e))?;
            handle
        } else {
            File::create(target)
                .await
                .map_err(|e| FetchError::io(target, e))?
        };

        let streamed = stream_to_file(&mut file, response, &job.url, target, cancel).await;
        if let Err(error) = &streamed {
            // A fresh download that died mid-stream leaves garbage that
            // would wrongly pass the skip check next run. Cancelled
            // transfers keep their partial: that is what resume is for.
            if !resumed && !error.is_cancelled() {
                debug!(path = %target.display(), "removing partial file after stream failure");
                let _ = tokio::fs::remove_file(target).await;
            }
        }
        let written = streamed?;

        let final_size = existing.saturating_add(written);
        if resumed {
            if let Some(expected) = content_length {
                if expected != final_size {
                    return Err(FetchError::integrity(target, expected, final_size));
                }
            }
        }

        info!(
            path = %target.display(),
            bytes = final_size,
            resumed,
            "download complete"
        );
        Ok(FetchOutcome {
            path: target.to_path_buf(),
            bytes_transferred: written,
            skipped: false,
            resumed,
        })
    }

    /// Base request spec carrying the session's cookies and headers.
    fn base_spec(&self, method: Method, url: &str) -> RequestSpec {
        let mut spec = RequestSpec::new(method, url).with_cookies(self.cookies.clone());
        for (name, value) in &self.headers {
            spec = spec.with_header(name.clone(), value.clone());
        }
        spec
    }

    /// Sends through the challenge gate when one is configured.
    async fn send(
        &self,
        spec: &RequestSpec,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, FetchError> {
        match &self.gate {
            Some(gate) => gate
                .send(&self.client, spec, cancel)
                .await
                .map_err(FetchError::challenge),
            None => self
                .client
                .send(spec, cancel)
                .await
                .map_err(|e| FetchError::request(&spec.url, e)),
        }
    }
}

/// Streams the response body to the file, racing the cancellation token
/// per chunk. On cancellation the bytes written so far are flushed and
/// kept.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<u64, FetchError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                let _ = writer.flush().await;
                return Err(FetchError::Cancelled);
            }
            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };
        let chunk =
            chunk.map_err(|e| FetchError::request(url, RequestError::transport(url, 1, e)))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| FetchError::io(path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| FetchError::io(path, e))?;
    Ok(bytes_written)
}

/// Resolves where the job's bytes land.
///
/// A path with an extension is the file path (its extension is
/// normalized to lowercase); a bare directory path gets the
/// percent-decoded last URL segment appended.
async fn resolve_target_path(file_path: &Path, url: &str) -> Result<PathBuf, FetchError> {
    if file_path.extension().is_some() {
        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| FetchError::io(parent, e))?;
            }
        }
        return Ok(lowercase_extension(file_path));
    }

    tokio::fs::create_dir_all(file_path)
        .await
        .map_err(|e| FetchError::io(file_path, e))?;
    Ok(lowercase_extension(&file_path.join(filename_from_url(url))))
}

/// Normalizes the extension to lowercase, leaving the stem untouched.
fn lowercase_extension(path: &Path) -> PathBuf {
    match (
        path.file_stem().and_then(|stem| stem.to_str()),
        path.extension().and_then(|ext| ext.to_str()),
    ) {
        (Some(stem), Some(ext)) if ext.chars().any(char::is_uppercase) => {
            path.with_file_name(format!("{stem}.{}", ext.to_ascii_lowercase()))
        }
        _ => path.to_path_buf(),
    }
}

/// The last URL path segment, percent-decoded, query stripped.
fn filename_from_url(url: &str) -> String {
    let without_query = url.split('?').next().unwrap_or(url);
    let last = without_query.rsplit('/').next().unwrap_or("");
    let decoded = urlencoding::decode(last)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| last.to_string());
    let decoded = decoded.trim();
    if decoded.is_empty() {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        format!("download_{timestamp}.bin")
    } else {
        decoded.to_string()
    }
}

/// Size of the local file, or 0 when it does not exist.
async fn local_size(path: &Path) -> u64 {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.len())
        .unwrap_or(0)
}

fn content_length_of(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

/// MD5 hex digest of the file contents.
async fn md5_file(path: &Path) -> Result<String, FetchError> {
    let mut file = File::open(path)
        .await
        .map_err(|e| FetchError::io(path, e))?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| FetchError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect())
}

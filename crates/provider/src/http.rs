//! HTTP range-request byte source backed by reqwest.

use crate::{ByteSource, SourceOptions};
use async_trait::async_trait;
use exposure_core::error::{ExposureError, ExposureResult};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use std::time::Duration;

/// Reads byte ranges of a remote object (S3, any static file server).
///
/// ```ignore
/// let source = HttpRangeSource::connect(url, &SourceOptions::default()).await?;
/// ```
pub struct HttpRangeSource {
    client: reqwest::Client,
    url: url::Url,
    size: u64,
    max_retries: u32,
}

impl HttpRangeSource {
    /// Probes the object with a one-byte ranged GET to learn its size.
    pub async fn connect(url: url::Url, options: &SourceOptions) -> ExposureResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| ExposureError::Provider(format!("failed to build HTTP client: {e}")))?;

        let mut source = Self {
            client,
            url,
            size: 0,
            max_retries: options.max_retries,
        };

        let response = source.send_with_retry(0, 0).await?;
        source.size = total_size(&response).ok_or_else(|| {
            ExposureError::Provider(format!(
                "{} did not report its size (no Content-Range or Content-Length)",
                source.url
            ))
        })?;

        tracing::info!(url = %source.url, size = source.size, "connected");
        Ok(source)
    }

    /// Ranged GET with exponential backoff on 429, 5xx and transport errors.
    async fn send_with_retry(&self, first: u64, last: u64) -> ExposureResult<reqwest::Response> {
        let range = format!("bytes={first}-{last}");
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(200 * 2u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
            }

            match self
                .client
                .get(self.url.clone())
                .header(RANGE, &range)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    last_error = format!("HTTP {status} for {range}");
                    if is_retryable(status) && attempt < self.max_retries {
                        tracing::warn!(url = %self.url, %status, attempt, "retrying range read");
                        continue;
                    }
                    return Err(ExposureError::Provider(format!("{}: {last_error}", self.url)));
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < self.max_retries {
                        tracing::warn!(url = %self.url, error = %e, attempt, "retrying range read");
                        continue;
                    }
                }
            }
        }
        Err(ExposureError::Provider(format!(
            "{}: max retries exceeded: {last_error}",
            self.url
        )))
    }
}

#[async_trait]
impl ByteSource for HttpRangeSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_range(&self, offset: u64, len: usize) -> ExposureResult<Vec<u8>> {
        let Some(last) = last_byte(offset, len, self.size)? else {
            return Ok(Vec::new());
        };
        let expected = (last - offset + 1) as usize;

        let response = self.send_with_retry(offset, last).await?;
        let partial = response.status() == StatusCode::PARTIAL_CONTENT;
        let body = response
            .bytes()
            .await
            .map_err(|e| ExposureError::Provider(format!("{}: reading body: {e}", self.url)))?;

        // A server that ignores Range sends the whole object.
        let bytes = if partial {
            body.to_vec()
        } else {
            let start = offset as usize;
            body.get(start..start + expected)
                .ok_or_else(|| {
                    ExposureError::Provider(format!(
                        "{}: full response of {} bytes lacks range {offset}+{expected}",
                        self.url,
                        body.len()
                    ))
                })?
                .to_vec()
        };

        if bytes.len() != expected {
            return Err(ExposureError::Provider(format!(
                "{}: expected {expected} bytes at {offset}, got {}",
                self.url,
                bytes.len()
            )));
        }
        tracing::trace!(offset, len = expected, "range read");
        Ok(bytes)
    }

    fn describe(&self) -> &str {
        self.url.as_str()
    }
}

/// Inclusive end of the range `offset..offset + len`, clamped to the
/// object. `None` when nothing is left to read.
fn last_byte(offset: u64, len: usize, size: u64) -> ExposureResult<Option<u64>> {
    if len == 0 || offset >= size {
        return Ok(None);
    }
    let end = offset
        .checked_add(len as u64)
        .ok_or_else(|| ExposureError::Format(format!("byte range {offset}+{len} overflows")))?;
    Ok(Some((end - 1).min(size - 1)))
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Object size from `Content-Range: bytes a-b/total`, else `Content-Length`
/// of a non-partial response.
fn total_size(response: &reqwest::Response) -> Option<u64> {
    if let Some(range) = response.headers().get(CONTENT_RANGE) {
        return parse_content_range_total(range.to_str().ok()?);
    }
    if response.status() == StatusCode::PARTIAL_CONTENT {
        return None;
    }
    response
        .headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

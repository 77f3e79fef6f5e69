use std::time::Duration;

use async_trait::async_trait;
use catalog_core::image_extension;
use reqwest::{header, Client, Url};

use crate::error::MediaError;

/// Bytes of one remote image plus its accepted extension (with leading dot).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

/// Remote media fetch capability.
#[async_trait]
pub trait MediaFetch: Send + Sync {
    /// Download the image at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError`] when the URL is unusable, too large, or the
    /// remote server fails.
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, MediaError>;
}

/// HTTP client for third-party image URLs.
///
/// Every request is bounded by the configured timeout. A `HEAD` probe rejects
/// oversized files before any body is transferred; the `GET` body is capped
/// again while reading, since the advertised length may be missing or wrong.
pub struct HttpMediaFetcher {
    client: Client,
    max_bytes: u64,
}

impl HttpMediaFetcher {
    /// # Errors
    ///
    /// Returns [`MediaError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(timeout_secs: u64, user_agent: &str, max_bytes: u64) -> Result<Self, MediaError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client, max_bytes })
    }

    #[must_use]
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Parse `url` and require an `http`/`https` scheme with a host and a
    /// non-empty path.
    pub(crate) fn parse_url(url: &str) -> Result<Url, MediaError> {
        let invalid = || MediaError::InvalidUrl {
            url: url.to_owned(),
        };
        let parsed = Url::parse(url).map_err(|_| invalid())?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(invalid());
        }
        if parsed.path().trim_matches('/').is_empty() {
            return Err(invalid());
        }
        Ok(parsed)
    }

    fn check_size(&self, url: &str, bytes: u64) -> Result<(), MediaError> {
        if bytes > self.max_bytes {
            return Err(MediaError::TooLarge {
                url: url.to_owned(),
                bytes,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MediaFetch for HttpMediaFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, MediaError> {
        let extension = image_extension(url).ok_or_else(|| MediaError::UnsupportedExtension {
            url: url.to_owned(),
        })?;
        let parsed = Self::parse_url(url)?;

        // Only the advertised length matters here; servers that reject HEAD
        // still get a chance on GET.
        let head = self.client.head(parsed.clone()).send().await?;
        if let Some(advertised) = content_length(head.headers()) {
            self.check_size(url, advertised)?;
        }

        let mut response = self.client.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }
        if let Some(advertised) = content_length(response.headers()) {
            self.check_size(url, advertised)?;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            bytes.extend_from_slice(&chunk);
            self.check_size(url, bytes.len() as u64)?;
        }

        tracing::debug!(url, bytes = bytes.len(), "fetched remote media");
        Ok(FetchedMedia { bytes, extension })
    }
}

fn content_length(headers: &header::HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;

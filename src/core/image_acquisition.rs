// Image acquisition - fetches corpus images over HTTP and decodes them

use crate::core::config::Config;
use crate::models::frame::{AcquisitionError, AcquisitionResult, CorpusIndex, RawImage};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Anything that can produce the decoded image for a corpus index
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Location of the image for `index`, as shown to the user
    fn url_for(&self, index: CorpusIndex) -> String;

    /// Fetch and decode the image for `index`
    async fn fetch(&self, index: CorpusIndex) -> AcquisitionResult<RawImage>;
}

/// Build the URL of a corpus image: `{base}{index}.jpg{suffix}`
///
/// `base` is used verbatim, so it needs its own trailing slash.
pub fn corpus_url(base: &str, index: CorpusIndex, suffix: &str) -> String {
    format!("{}{}.jpg{}", base, index, suffix)
}

/// Recover the index from a URL produced by [`corpus_url`] with the same `base` and `suffix`
pub fn parse_corpus_index(base: &str, suffix: &str, url: &str) -> Option<CorpusIndex> {
    let digits = url
        .strip_prefix(base)?
        .strip_suffix(suffix)?
        .strip_suffix(".jpg")?;

    // Only the canonical spelling maps back, so "05" or "+5" are rejected
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    digits.parse().ok().map(CorpusIndex)
}

/// Decode encoded image bytes (JPEG, PNG, ...) into an RGBA bitmap
pub fn decode_image(bytes: &[u8]) -> AcquisitionResult<RawImage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| AcquisitionError::Decode(e.to_string()))?;
    Ok(RawImage::from(decoded.to_rgba8()))
}

/// Corpus served over HTTP(S)
pub struct HttpImageSource {
    client: reqwest::Client,
    base_url: String,
    url_suffix: String,
}

impl HttpImageSource {
    pub fn new(
        base_url: impl Into<String>,
        url_suffix: impl Into<String>,
        timeout: Duration,
    ) -> AcquisitionResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AcquisitionError::Network(e.to_string()))?;

        Ok(Self::with_client(base_url, url_suffix, client))
    }

    /// Use a pre-configured client
    pub fn with_client(
        base_url: impl Into<String>,
        url_suffix: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            url_suffix: url_suffix.into(),
        }
    }

    pub fn from_config(config: &Config) -> AcquisitionResult<Self> {
        let timeout = config
            .http_timeout()
            .ok_or(AcquisitionError::InvalidTimeout(config.http_timeout_secs))?;

        Self::new(config.base_url.clone(), config.url_suffix.clone(), timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    fn url_for(&self, index: CorpusIndex) -> String {
        corpus_url(&self.base_url, index, &self.url_suffix)
    }

    async fn fetch(&self, index: CorpusIndex) -> AcquisitionResult<RawImage> {
        let url_string = self.url_for(index);
        let url = reqwest::Url::parse(&url_string)
            .map_err(|e| AcquisitionError::InvalidUrl(format!("{}: {}", url_string, e)))?;

        debug!(%index, url = %url_string, "Fetching corpus image");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AcquisitionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::Status {
                status: status.as_u16(),
                url: url_string,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AcquisitionError::Network(e.to_string()))?;

        debug!(%index, bytes = bytes.len(), "Decoding corpus image");

        tokio::task::spawn_blocking(move || decode_image(&bytes))
            .await
            .map_err(|e| AcquisitionError::Decode(format!("Decoder task failed: {}", e)))?
    }
}

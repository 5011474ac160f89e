// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fetching operator-supplied media.
//!
//! Accepts `data:` URLs, Google image-search wrappers (`imgres?imgurl=`)
//! and plain HTTP(S) URLs. Bodies are read incrementally so an oversized
//! file is rejected without buffering all of it.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use omnichat_config::model::{HttpConfig, MediaConfig};
use omnichat_core::OmnichatError;
use omnichat_core::media;
use omnichat_token::http;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use url::Url;

/// A fetched media blob.
#[derive(Clone, PartialEq)]
pub struct FetchedMedia {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub filename: String,
}

impl std::fmt::Debug for FetchedMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedMedia")
            .field("len", &self.bytes.len())
            .field("content_type", &self.content_type)
            .field("filename", &self.filename)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct MediaFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl MediaFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, OmnichatError> {
        Ok(Self {
            client: http::build_client(timeout)?,
            timeout,
            max_bytes,
        })
    }

    pub fn from_config(media: &MediaConfig, http: &HttpConfig) -> Result<Self, OmnichatError> {
        Self::new(Duration::from_secs(http.timeout_secs), media.max_bytes)
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Fetch `url` and require an `image/*` payload within the size limit.
    pub async fn fetch_image(&self, url: &str) -> Result<FetchedMedia, OmnichatError> {
        let fetched = self.fetch(url).await?;
        if !media::is_image(&fetched.content_type) {
            return Err(OmnichatError::Validation(format!(
                "expected an image, got {}",
                fetched.content_type
            )));
        }
        Ok(fetched)
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedMedia, OmnichatError> {
        let url = url.trim();
        if url.starts_with("data:") {
            let fetched = decode_data_url(url)?;
            self.check_size(fetched.bytes.len())?;
            return Ok(fetched);
        }
        let target = unwrap_google_image(url).unwrap_or_else(|| url.to_string());
        let parsed = Url::parse(&target)
            .map_err(|e| OmnichatError::Validation(format!("invalid media url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(OmnichatError::Validation(format!(
                "unsupported media url scheme {}",
                parsed.scheme()
            )));
        }

        let mut response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| http::send_error(e, self.timeout))?;
        let status = response.status();
        if !status.is_success() {
            return Err(OmnichatError::Validation(format!(
                "media url answered HTTP {}",
                status.as_u16()
            )));
        }
        if let Some(len) = response.content_length() {
            self.check_size(len as usize)?;
        }
        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| http::send_error(e, self.timeout))?
        {
            bytes.extend_from_slice(&chunk);
            self.check_size(bytes.len())?;
        }
        if bytes.is_empty() {
            return Err(OmnichatError::Validation("media url returned no data".into()));
        }
        debug!(url = %parsed, len = bytes.len(), "media fetched");

        let content_type = media::infer_content_type(declared.as_deref(), &bytes);
        let filename = filename_for(&parsed, &content_type, &bytes);
        Ok(FetchedMedia {
            bytes,
            content_type,
            filename,
        })
    }

    fn check_size(&self, len: usize) -> Result<(), OmnichatError> {
        if len > self.max_bytes {
            return Err(OmnichatError::Validation(format!(
                "media exceeds {} bytes",
                self.max_bytes
            )));
        }
        Ok(())
    }
}

/// Decode `data:[<mediatype>][;base64],<data>`.
pub fn decode_data_url(url: &str) -> Result<FetchedMedia, OmnichatError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| OmnichatError::Validation("not a data url".into()))?;
    let (meta, data) = rest
        .split_once(',')
        .ok_or_else(|| OmnichatError::Validation("data url has no payload".into()))?;
    let is_base64 = meta.ends_with(";base64");
    let declared = meta.trim_end_matches(";base64");
    let bytes = if is_base64 {
        STANDARD
            .decode(data.trim())
            .map_err(|e| OmnichatError::Validation(format!("invalid base64 in data url: {e}")))?
    } else {
        data.as_bytes().to_vec()
    };
    if bytes.is_empty() {
        return Err(OmnichatError::Validation("data url is empty".into()));
    }
    let declared = Some(declared).filter(|d| !d.is_empty());
    let content_type = media::infer_content_type(declared, &bytes);
    let filename = format!(
        "image.{}",
        media::infer_extension(Some(&content_type), &bytes)
    );
    Ok(FetchedMedia {
        bytes,
        content_type,
        filename,
    })
}

/// The real image behind a Google image-search link, if `url` is one.
pub fn unwrap_google_image(url: &str) -> Option<String> {
    if !(url.contains("google.") && url.contains("/imgres")) && !url.contains("imgurl=") {
        return None;
    }
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "imgurl")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

fn filename_for(url: &Url, content_type: &str, bytes: &[u8]) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or("image");
    if last.contains('.') {
        last.to_string()
    } else {
        format!("{last}.{}", media::infer_extension(Some(content_type), bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_with_declared_type() {
        let url = format!("data:image/png;base64,{}", STANDARD.encode([1u8; 10]));
        let fetched = decode_data_url(&url).unwrap();
        assert_eq!(fetched.bytes.len(), 10);
        assert_eq!(fetched.content_type, "image/png");
        assert_eq!(fetched.filename, "image.png");
    }

    #[test]
    fn data_url_sniffs_when_undeclared() {
        let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
        png.extend_from_slice(&[0; 4]);
        let url = format!("data:;base64,{}", STANDARD.encode(&png));
        assert_eq!(decode_data_url(&url).unwrap().content_type, "image/png");
    }

    #[test]
    fn bad_data_urls() {
        assert!(decode_data_url("data:image/png;base64").is_err());
        assert!(decode_data_url("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn google_wrapper_is_unwrapped() {
        let wrapped = "https://www.google.com/imgres?imgurl=https%3A%2F%2Fcdn.example.com%2Fcat.jpg&imgrefurl=x";
        assert_eq!(
            unwrap_google_image(wrapped).as_deref(),
            Some("https://cdn.example.com/cat.jpg")
        );
        assert_eq!(unwrap_google_image("https://cdn.example.com/cat.jpg"), None);
    }

    #[tokio::test]
    async fn oversized_data_url_is_rejected() {
        let fetcher = MediaFetcher::new(Duration::from_secs(5), 8).unwrap();
        let url = format!("data:image/png;base64,{}", STANDARD.encode([0u8; 9]));
        assert!(matches!(
            fetcher.fetch_image(&url).await,
            Err(OmnichatError::Validation(_))
        ));
    }
}

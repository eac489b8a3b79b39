use std::time::Duration;

use anyhow::{bail, Context, Result};
use image::RgbImage;
use reqwest::blocking::Client as HttpClient;
use tracing::{info, warn};

use crate::error_chain_text;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Image,
    Video,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Image => "image",
            ContentKind::Video => "video",
        }
    }

    pub fn file_extension(self) -> &'static str {
        match self {
            ContentKind::Image => "png",
            ContentKind::Video => "mp4",
        }
    }
}

/// Fetched content tagged by whether it decodes as a still image.
///
/// `bytes` are always the fetched bytes, untouched. `visual` is the decoded
/// frame for images and a placeholder for video.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedContent {
    pub kind: ContentKind,
    pub url: String,
    pub bytes: Vec<u8>,
    pub visual: RgbImage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Classified(ClassifiedContent),
    Failed {
        url: String,
        error: String,
        placeholder: RgbImage,
    },
}

impl FetchOutcome {
    pub fn visual(&self) -> &RgbImage {
        match self {
            FetchOutcome::Classified(content) => &content.visual,
            FetchOutcome::Failed { placeholder, .. } => placeholder,
        }
    }

    pub fn kind(&self) -> Option<ContentKind> {
        match self {
            FetchOutcome::Classified(content) => Some(content.kind),
            FetchOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            FetchOutcome::Classified(_) => None,
            FetchOutcome::Failed { error, .. } => Some(error.as_str()),
        }
    }
}

/// Neutral black frame, so consumers always get a valid fixed-rank visual.
pub fn placeholder_visual(dims: (u32, u32)) -> RgbImage {
    let (width, height) = dims;
    RgbImage::new(width.max(1), height.max(1))
}

/// Tries a still-image decode; anything that fails is treated as video.
pub fn classify_bytes(url: &str, bytes: Vec<u8>, fallback_dims: (u32, u32)) -> ClassifiedContent {
    match image::load_from_memory(&bytes) {
        Ok(decoded) => ClassifiedContent {
            kind: ContentKind::Image,
            url: url.to_string(),
            visual: decoded.to_rgb8(),
            bytes,
        },
        Err(_) => ClassifiedContent {
            kind: ContentKind::Video,
            url: url.to_string(),
            visual: placeholder_visual(fallback_dims),
            bytes,
        },
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContentFetcher {
    http: HttpClient,
}

impl ContentFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: HttpClient) -> Self {
        Self { http }
    }

    pub fn fetch(&self, url: &str, fallback_dims: (u32, u32)) -> FetchOutcome {
        match self.download(url) {
            Ok(bytes) => {
                let content = classify_bytes(url, bytes, fallback_dims);
                info!(
                    kind = content.kind.as_str(),
                    bytes = content.bytes.len(),
                    "content classified"
                );
                FetchOutcome::Classified(content)
            }
            Err(err) => {
                let error = error_chain_text(&err, 1000);
                warn!(url, error = %error, "content fetch failed");
                FetchOutcome::Failed {
                    url: url.to_string(),
                    error,
                    placeholder: placeholder_visual(fallback_dims),
                }
            }
        }
    }

    fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .with_context(|| format!("content download failed ({url})"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("content download failed ({})", status.as_u16());
        }
        let bytes = response
            .bytes()
            .context("content body read failed")?
            .to_vec();
        if bytes.is_empty() {
            bail!("content download returned an empty body");
        }
        Ok(bytes)
    }
}

pub fn fetch_and_classify(url: &str, fallback_dims: (u32, u32)) -> FetchOutcome {
    ContentFetcher::new().fetch(url, fallback_dims)
}

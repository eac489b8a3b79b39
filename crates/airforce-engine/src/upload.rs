use std::io::Cursor;
use std::sync::OnceLock;
use std::time::Duration;

use airforce_contracts::config::Config;
use anyhow::{anyhow, bail, Context, Result};
use image::{DynamicImage, ImageFormat};
use regex::Regex;
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use serde_json::Value;
use tracing::{info, warn};

use crate::error_chain_text;

pub const MAX_REFERENCE_SLOTS: usize = 14;
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

const DIRECT_LINK_SUFFIX: &str = "/img.png";
const URL_FIELDS: [&str; 5] = ["url", "file_url", "directUrl", "link", "fileUrl"];
const BODY_SNIPPET_CHARS: usize = 200;
const STATUS_MAX_ERRORS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadResult {
    /// Resolved direct links, in slot order with failed slots removed.
    pub urls: Vec<String>,
    pub errors: Vec<String>,
    pub status: String,
}

impl UploadResult {
    /// Newline-joined URLs, ready to feed a profile builder's reference field.
    pub fn reference_urls_text(&self) -> String {
        self.urls.join("\n")
    }
}

/// Encodes an in-memory image as 8-bit RGB PNG bytes.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut bytes = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("PNG encode failed")?;
    Ok(bytes)
}

/// Pulls the hosted file URL out of an upload response body.
///
/// JSON bodies are checked for the known URL fields, then `file.url` and
/// `file.link`. Otherwise the first http(s) URL in the raw text wins, minus
/// trailing `.,;:)`.
pub fn extract_upload_url(body: &str) -> Option<String> {
    let text = body.trim();
    if let Some(object) = serde_json::from_str::<Value>(text)
        .ok()
        .as_ref()
        .and_then(Value::as_object)
    {
        for key in URL_FIELDS {
            if let Some(url) = object
                .get(key)
                .and_then(Value::as_str)
                .filter(|url| url.starts_with("http"))
            {
                return Some(url.to_string());
            }
        }
        if let Some(file) = object.get("file").and_then(Value::as_object) {
            let nested = file
                .get("url")
                .and_then(Value::as_str)
                .filter(|url| !url.is_empty())
                .or_else(|| file.get("link").and_then(Value::as_str));
            if let Some(url) = nested.filter(|url| url.starts_with("http")) {
                return Some(url.to_string());
            }
        }
    }
    let found = url_pattern()?.find(text)?;
    Some(
        found
            .as_str()
            .trim_end_matches(['.', ',', ';', ':', ')'])
            .to_string(),
    )
}

fn url_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"https?://[^\s"'<>]+"#).ok())
        .as_ref()
}

/// Best-effort batch uploader for reference images.
#[derive(Debug, Clone, Default)]
pub struct ReferenceUploader {
    http: HttpClient,
}

impl ReferenceUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: HttpClient) -> Self {
        Self { http }
    }

    /// Uploads every non-empty slot (numbered from 1, at most
    /// [`MAX_REFERENCE_SLOTS`]). A failing slot is recorded in `errors` and
    /// the remaining slots still upload.
    pub fn upload(&self, config: &Config, images: &[Option<DynamicImage>]) -> UploadResult {
        let key = config.upload_key();
        if key.is_empty() {
            return UploadResult {
                urls: Vec::new(),
                errors: Vec::new(),
                status: "No upload key configured".to_string(),
            };
        }
        let endpoint = config.upload_endpoint();
        let mut urls = Vec::new();
        let mut errors = Vec::new();

        for (idx, slot) in images.iter().take(MAX_REFERENCE_SLOTS).enumerate() {
            let index = idx + 1;
            let Some(image) = slot else {
                continue;
            };
            if image.width() == 0 || image.height() == 0 {
                continue;
            }
            let png = match encode_png(image) {
                Ok(bytes) => bytes,
                Err(err) => {
                    errors.push(format!(
                        "image_{index} convert failed: {}",
                        error_chain_text(&err, BODY_SNIPPET_CHARS)
                    ));
                    continue;
                }
            };
            match self.upload_one(&endpoint, key, index, png) {
                Ok(url) => {
                    info!(slot = index, url = %url, "reference image uploaded");
                    urls.push(url);
                }
                Err(err) => {
                    warn!(slot = index, error = %err, "reference image upload failed");
                    errors.push(err.to_string());
                }
            }
        }

        let status = upload_status(urls.len(), &errors);
        UploadResult {
            urls,
            errors,
            status,
        }
    }

    fn upload_one(&self, endpoint: &str, key: &str, index: usize, png: Vec<u8>) -> Result<String> {
        let part = MultipartPart::bytes(png)
            .file_name(format!("ref_{index}.png"))
            .mime_str("image/png")
            .map_err(|err| anyhow!("image_{index} request error: {err}"))?;
        let form = MultipartForm::new().part("file", part);
        let response = self
            .http
            .post(endpoint)
            .query(&[("key", key)])
            .multipart(form)
            .timeout(UPLOAD_TIMEOUT)
            .send()
            .map_err(|err| request_error(index, err))?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|err| request_error(index, err))?;
        if status != 200 {
            bail!("image_{index} upload HTTP {status}: {}", snippet(&body));
        }
        let Some(url) = extract_upload_url(&body) else {
            bail!("image_{index} no URL in response: {}", snippet(&body));
        };
        Ok(format!("{}{DIRECT_LINK_SUFFIX}", url.trim_end_matches('/')))
    }
}

pub fn upload(config: &Config, images: &[Option<DynamicImage>]) -> UploadResult {
    ReferenceUploader::new().upload(config, images)
}

fn upload_status(uploaded: usize, errors: &[String]) -> String {
    let mut status = if uploaded > 0 {
        format!("Uploaded {uploaded} image(s)")
    } else {
        "No images uploaded".to_string()
    };
    if !errors.is_empty() {
        status.push_str("; ");
        status.push_str(
            &errors
                .iter()
                .take(STATUS_MAX_ERRORS)
                .cloned()
                .collect::<Vec<String>>()
                .join("; "),
        );
        if errors.len() > STATUS_MAX_ERRORS {
            status.push_str(" ...");
        }
    }
    status
}

// The request URL carries `?key=`, so it is stripped before the error is kept.
fn request_error(index: usize, err: reqwest::Error) -> anyhow::Error {
    anyhow!("image_{index} request error: {}", err.without_url())
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_CHARS).collect()
}

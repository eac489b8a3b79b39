use std::env;
use std::fmt;

pub const DEFAULT_BASE_URL: &str = "https://api.airforce/v1";
pub const DEFAULT_UPLOAD_BASE_URL: &str = "https://anondrop.net";

/// Endpoint and credential settings threaded through every request.
///
/// Both base URLs are trimmed of whitespace and trailing `/` on construction,
/// so `{base_url}/images/generations` never doubles the separator.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    base_url: String,
    api_key: String,
    upload_key: String,
    upload_base_url: String,
}

impl Config {
    pub fn new(
        base_url: impl AsRef<str>,
        api_key: impl AsRef<str>,
        upload_key: impl AsRef<str>,
        upload_base_url: impl AsRef<str>,
    ) -> Self {
        Self {
            base_url: normalize_base(base_url.as_ref(), DEFAULT_BASE_URL),
            api_key: api_key.as_ref().trim().to_string(),
            upload_key: upload_key.as_ref().trim().to_string(),
            upload_base_url: normalize_base(upload_base_url.as_ref(), DEFAULT_UPLOAD_BASE_URL),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            non_empty_env("AIRFORCE_BASE_URL").unwrap_or_default(),
            non_empty_env("AIRFORCE_API_KEY").unwrap_or_default(),
            non_empty_env("ANONDROP_KEY").unwrap_or_default(),
            non_empty_env("ANONDROP_BASE_URL").unwrap_or_default(),
        )
    }

    /// Returns a copy with any non-empty override applied on top.
    pub fn with_overrides(
        &self,
        base_url: Option<&str>,
        api_key: Option<&str>,
        upload_key: Option<&str>,
        upload_base_url: Option<&str>,
    ) -> Self {
        let pick = |over: Option<&str>, current: &str| {
            over.map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(current)
                .to_string()
        };
        Self::new(
            pick(base_url, &self.base_url),
            pick(api_key, &self.api_key),
            pick(upload_key, &self.upload_key),
            pick(upload_base_url, &self.upload_base_url),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn upload_key(&self) -> &str {
        &self.upload_key
    }

    pub fn upload_base_url(&self) -> &str {
        &self.upload_base_url
    }

    pub fn generations_endpoint(&self) -> String {
        format!("{}/images/generations", self.base_url)
    }

    pub fn upload_endpoint(&self) -> String {
        format!("{}/upload", self.upload_base_url)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("", "", "", "")
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("upload_key", &redact(&self.upload_key))
            .field("upload_base_url", &self.upload_base_url)
            .finish()
    }
}

fn normalize_base(raw: &str, default: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return default.to_string();
    }
    trimmed.to_string()
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "***"
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

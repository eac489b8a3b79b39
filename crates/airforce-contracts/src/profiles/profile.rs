use serde_json::{Map, Value};

use super::registry::{MediaKind, ModelFamily};

pub const PLACEHOLDER_SIZE: &str = "1024x1024";
pub const FALLBACK_DIMS: (u32, u32) = (512, 512);

/// A packed, flat request payload for one model family.
///
/// Unknown keys are carried through untouched so newer families can be
/// forwarded without changes here.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterProfile {
    payload: Map<String, Value>,
    media: MediaKind,
}

impl ParameterProfile {
    pub fn new(payload: Map<String, Value>, media: MediaKind) -> Self {
        Self { payload, media }
    }

    /// Wraps an arbitrary payload, inferring media kind from its `model` key.
    pub fn from_payload(payload: Map<String, Value>) -> Self {
        let media = payload
            .get("model")
            .and_then(Value::as_str)
            .and_then(ModelFamily::from_model)
            .map(ModelFamily::media)
            .unwrap_or(MediaKind::Image);
        Self { payload, media }
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn into_payload(self) -> Map<String, Value> {
        self.payload
    }

    pub fn media(&self) -> MediaKind {
        self.media
    }

    pub fn model(&self) -> Option<&str> {
        self.payload.get("model").and_then(Value::as_str)
    }

    pub fn placeholder_dims(&self) -> (u32, u32) {
        parse_placeholder_size(&self.payload)
    }
}

/// Parses the payload's `size` field (`"WxH"`, 64..=4096 per side).
/// Anything else yields 512x512.
pub fn parse_placeholder_size(payload: &Map<String, Value>) -> (u32, u32) {
    let Some(raw) = payload.get("size").and_then(Value::as_str) else {
        return FALLBACK_DIMS;
    };
    let lowered = raw.trim().to_ascii_lowercase();
    let parts = lowered.split('x').collect::<Vec<&str>>();
    if parts.len() != 2 {
        return FALLBACK_DIMS;
    }
    let (Ok(width), Ok(height)) = (
        parts[0].trim().parse::<u32>(),
        parts[1].trim().parse::<u32>(),
    ) else {
        return FALLBACK_DIMS;
    };
    if (64..=4096).contains(&width) && (64..=4096).contains(&height) {
        return (width, height);
    }
    FALLBACK_DIMS
}

/// Caller-supplied fields for a profile builder. Each family reads the
/// subset it understands and ignores the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileFields {
    pub model: Option<String>,
    pub aspect_ratio: Option<String>,
    pub resolution: Option<String>,
    pub quality: Option<String>,
    pub mode: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub duration: Option<i64>,
    pub sound: Option<bool>,
    pub custom_mode: Option<bool>,
    pub instrumental: Option<bool>,
    pub style: Option<String>,
    pub reference_urls: Option<String>,
}

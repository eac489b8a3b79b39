use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::now_utc_iso;

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

/// Record of one generation call as persisted next to its saved content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReceipt {
    pub schema_version: u64,
    pub run_id: String,
    pub model: Option<String>,
    pub media: String,
    pub prompt: String,
    pub request: Value,
    #[serde(default)]
    pub events: Vec<Value>,
    pub content_url: Option<String>,
    pub content_kind: Option<String>,
    pub saved_path: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
}

impl GenerationReceipt {
    pub fn new(run_id: impl Into<String>, media: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            schema_version: RECEIPT_SCHEMA_VERSION,
            run_id: run_id.into(),
            model: None,
            media: media.into(),
            prompt: prompt.into(),
            request: Value::Null,
            events: Vec::new(),
            content_url: None,
            content_kind: None,
            saved_path: None,
            error: None,
            created_at: now_utc_iso(),
        }
    }

    /// Accepts the executor's debug request text; JSON is stored structured,
    /// anything else as a plain string.
    pub fn with_request_text(mut self, debug_request: &str) -> Self {
        self.request = serde_json::from_str(debug_request)
            .unwrap_or_else(|_| Value::String(debug_request.to_string()));
        self
    }

    pub fn with_events(mut self, events: &[Value]) -> Self {
        self.events = events.iter().map(sanitize_payload).collect();
        self
    }
}

pub fn write_receipt(path: &Path, receipt: &GenerationReceipt) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(receipt)?)?;
    Ok(())
}

fn sanitize_payload(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(rows) => Value::Array(rows.iter().map(sanitize_payload).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                let lowered = key.to_ascii_lowercase();
                if matches!(lowered.as_str(), "b64_json" | "image_bytes" | "authorization") {
                    out.insert(key.clone(), Value::String("<omitted>".to_string()));
                    continue;
                }
                out.insert(key.clone(), sanitize_payload(row));
            }
            Value::Object(out)
        }
    }
}

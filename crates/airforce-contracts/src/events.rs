use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::bail;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Steps of one generation run, in the order a run normally passes them.
///
/// Serialized with the step name under `type`; `UploadFinished` and
/// `ContentClassified` are skipped when the run has nothing to upload or
/// nothing to fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        family: String,
        prompt: String,
    },
    UploadFinished {
        urls: Vec<String>,
        errors: Vec<String>,
        status: String,
    },
    ProfilePacked {
        model: Option<String>,
        media: String,
        payload: Map<String, Value>,
    },
    GenerationFinished {
        status: Option<u16>,
        content_url: Option<String>,
        error: Option<String>,
        memo_hit: bool,
    },
    ContentClassified {
        url: String,
        /// `None` when the fetch failed.
        kind: Option<String>,
        bytes: Option<usize>,
        error: Option<String>,
    },
    RunFinished {
        stage: String,
        saved_path: Option<String>,
    },
}

impl RunEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::RunStarted { .. } => "run_started",
            RunEvent::UploadFinished { .. } => "upload_finished",
            RunEvent::ProfilePacked { .. } => "profile_packed",
            RunEvent::GenerationFinished { .. } => "generation_finished",
            RunEvent::ContentClassified { .. } => "content_classified",
            RunEvent::RunFinished { .. } => "run_finished",
        }
    }
}

/// Append-only `events.jsonl` for one run. Every line is the event's fields
/// plus `run_id` and a UTC `ts`.
#[derive(Debug, Clone)]
pub struct EventWriter {
    path: PathBuf,
    run_id: String,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            run_id: run_id.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn record(&self, event: &RunEvent) -> anyhow::Result<Value> {
        let Value::Object(mut line) = serde_json::to_value(event)? else {
            bail!("{} did not serialize to an object", event.name());
        };
        line.insert("run_id".to_string(), Value::String(self.run_id.clone()));
        line.insert("ts".to_string(), Value::String(now_utc_iso()));

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(&line)?)?;
        Ok(Value::Object(line))
    }
}

pub(crate) fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

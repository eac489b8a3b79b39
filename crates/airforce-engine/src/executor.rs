use std::io::{self, BufRead, BufReader};
use std::time::Duration;

use airforce_contracts::config::Config;
use airforce_contracts::profiles::{MediaKind, ParameterProfile};
use anyhow::{Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::error_chain_text;

pub const IMAGE_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
pub const VIDEO_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
pub const REDACTED_AUTHORIZATION: &str = "Bearer sk-air-***";

const EVENT_PREFIX: &str = "data: ";
const DONE_LINE: &str = "data: [DONE]";
const KEEPALIVE_LINE: &str = "data: : keepalive";
const ERROR_TEXT_MAX_CHARS: usize = 2000;

/// Which class of failure a finished call ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Non-200 status, empty result list, or no URL in the stream.
    Application,
    /// Connect, timeout, or read failure. The only kind worth retrying.
    Transport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub content_url: Option<String>,
    pub debug_request: String,
    pub debug_response: String,
    pub error: Option<String>,
    pub status: Option<u16>,
    pub events: Vec<Value>,
}

impl ExecutionResult {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        if self.error.is_some() {
            return Some(FailureKind::Transport);
        }
        if self.content_url.is_none() {
            return Some(FailureKind::Application);
        }
        None
    }
}

/// Parsed `data:` events of one response, in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventStream {
    pub events: Vec<Value>,
    pub last: Option<Value>,
}

impl EventStream {
    /// Feeds one line; returns whether it produced an event.
    ///
    /// Non-`data:` lines, the done marker, keepalives and unparseable payloads
    /// are skipped without touching state.
    pub fn push_line(&mut self, line: &str) -> bool {
        if line == DONE_LINE || line == KEEPALIVE_LINE {
            return false;
        }
        let Some(body) = line.strip_prefix(EVENT_PREFIX) else {
            return false;
        };
        match serde_json::from_str::<Value>(body) {
            Ok(event) => {
                self.last = Some(event.clone());
                self.events.push(event);
                true
            }
            Err(_) => false,
        }
    }

    /// URL of the first entry in the last event's `data` list.
    pub fn result_url(&self) -> Option<String> {
        self.last
            .as_ref()?
            .get("data")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("url"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
    }

    pub fn transcript(&self) -> String {
        if self.events.is_empty() {
            return "[]".to_string();
        }
        serde_json::to_string_pretty(&self.events).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Reads an event stream line by line as bytes arrive.
pub fn parse_event_stream<R: BufRead>(mut reader: R) -> io::Result<EventStream> {
    let mut stream = EventStream::default();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf)?;
        if read == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            continue;
        }
        if stream.push_line(line) {
            debug!(events = stream.events.len(), "stream event parsed");
        }
    }
    Ok(stream)
}

pub fn request_timeout(media: MediaKind) -> Duration {
    match media {
        MediaKind::Image => IMAGE_REQUEST_TIMEOUT,
        MediaKind::Video => VIDEO_REQUEST_TIMEOUT,
    }
}

enum Submitted {
    Rejected { status: u16, body: String },
    Streamed { status: u16, stream: EventStream },
}

/// Submits generation requests and turns the streamed reply into an [`ExecutionResult`].
#[derive(Debug, Clone, Default)]
pub struct GenerationExecutor {
    http: HttpClient,
}

impl GenerationExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: HttpClient) -> Self {
        Self { http }
    }

    pub fn execute(
        &self,
        config: &Config,
        profile: &ParameterProfile,
        prompt: &str,
    ) -> ExecutionResult {
        let endpoint = config.generations_endpoint();
        let mut payload = profile.payload().clone();
        payload.insert("prompt".to_string(), Value::String(prompt.to_string()));
        payload.insert("sse".to_string(), Value::Bool(true));
        let debug_request = debug_request_text(&endpoint, &payload);
        let media = profile.media();

        info!(
            model = profile.model().unwrap_or("unknown"),
            media = media.as_str(),
            "submitting generation request"
        );

        match self.submit(&endpoint, config.api_key(), &payload, request_timeout(media)) {
            Ok(Submitted::Rejected { status, body }) => {
                warn!(status, "generation request rejected");
                ExecutionResult {
                    content_url: None,
                    debug_request,
                    debug_response: format!("Error {status}:\n{}", pretty_body(&body)),
                    error: None,
                    status: Some(status),
                    events: Vec::new(),
                }
            }
            Ok(Submitted::Streamed { status, stream }) => {
                let transcript = stream.transcript();
                let content_url = stream.result_url();
                let debug_response = if content_url.is_some() {
                    transcript
                } else {
                    warn!(events = stream.events.len(), "stream yielded no result URL");
                    format!("No {} URL in SSE response:\n{transcript}", media.as_str())
                };
                info!(
                    events = stream.events.len(),
                    resolved = content_url.is_some(),
                    "generation stream consumed"
                );
                ExecutionResult {
                    content_url,
                    debug_request,
                    debug_response,
                    error: None,
                    status: Some(status),
                    events: stream.events,
                }
            }
            Err(err) => {
                let message = error_chain_text(&err, ERROR_TEXT_MAX_CHARS);
                warn!(error = %message, "generation transport failure");
                ExecutionResult {
                    content_url: None,
                    debug_request,
                    debug_response: format!("Run error: {message}"),
                    error: Some(message),
                    status: None,
                    events: Vec::new(),
                }
            }
        }
    }

    fn submit(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<Submitted> {
        let response = self
            .http
            .post(endpoint)
            .bearer_auth(api_key)
            .json(payload)
            .timeout(timeout)
            .send()
            .with_context(|| format!("generation request failed ({endpoint})"))?;
        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().unwrap_or_else(|err| {
                warn!(status, error = %err, "generation error body unreadable");
                String::new()
            });
            return Ok(Submitted::Rejected { status, body });
        }
        let stream = parse_event_stream(BufReader::new(response))
            .context("generation event stream read failed")?;
        Ok(Submitted::Streamed { status, stream })
    }
}

pub fn execute(config: &Config, profile: &ParameterProfile, prompt: &str) -> ExecutionResult {
    GenerationExecutor::new().execute(config, profile, prompt)
}

fn debug_request_text(endpoint: &str, payload: &Map<String, Value>) -> String {
    let snapshot = json!({
        "url": endpoint,
        "method": "POST",
        "headers": {"Authorization": REDACTED_AUTHORIZATION},
        "body": payload,
    });
    serde_json::to_string_pretty(&snapshot).unwrap_or_default()
}

fn pretty_body(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| body.to_string())
}

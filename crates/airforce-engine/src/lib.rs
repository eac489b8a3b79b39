mod classify;
mod executor;
mod pipeline;
mod upload;

pub use classify::{
    classify_bytes, fetch_and_classify, placeholder_visual, ClassifiedContent, ContentFetcher,
    ContentKind, FetchOutcome, FETCH_TIMEOUT,
};
pub use executor::{
    execute, parse_event_stream, request_timeout, EventStream, ExecutionResult, FailureKind,
    GenerationExecutor, IMAGE_REQUEST_TIMEOUT, REDACTED_AUTHORIZATION, VIDEO_REQUEST_TIMEOUT,
};
pub use pipeline::{generate, GenerationOutcome, GenerationPipeline, GenerationStage};
pub use upload::{
    encode_png, extract_upload_url, upload, ReferenceUploader, UploadResult,
    MAX_REFERENCE_SLOTS, UPLOAD_TIMEOUT,
};

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing: &String| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

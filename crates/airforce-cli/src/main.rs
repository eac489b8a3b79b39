use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use airforce_contracts::config::Config;
use airforce_contracts::events::{EventWriter, RunEvent};
use airforce_contracts::profiles::{pack, ModelFamily, ParameterProfile, ProfileFields};
use airforce_contracts::runs::memo::{run_key, MemoEntry, MemoStore};
use airforce_contracts::runs::receipts::{write_receipt, GenerationReceipt};
use airforce_engine::{
    ContentKind, ExecutionResult, FetchOutcome, GenerationOutcome, GenerationPipeline,
    ReferenceUploader, UploadResult, MAX_REFERENCE_SLOTS,
};
use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use image::{DynamicImage, ImageFormat};
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "airforce-rs", version, about = "Airforce media generation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List model families with their models, media kind and reference limits.
    Families,
    /// Print the request payload a family builder produces.
    Pack(PackArgs),
    /// Upload reference images and print their direct links.
    Upload(UploadArgs),
    /// Run one generation end to end.
    Generate(GenerateArgs),
}

#[derive(Debug, Args)]
struct ConnectionArgs {
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    upload_key: Option<String>,
    #[arg(long)]
    upload_base_url: Option<String>,
}

impl ConnectionArgs {
    fn resolve(&self) -> Config {
        Config::from_env().with_overrides(
            self.base_url.as_deref(),
            self.api_key.as_deref(),
            self.upload_key.as_deref(),
            self.upload_base_url.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Default, Args)]
struct FieldArgs {
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    aspect_ratio: Option<String>,
    #[arg(long)]
    resolution: Option<String>,
    #[arg(long)]
    quality: Option<String>,
    #[arg(long)]
    mode: Option<String>,
    #[arg(long)]
    width: Option<i64>,
    #[arg(long)]
    height: Option<i64>,
    #[arg(long)]
    duration: Option<i64>,
    #[arg(long)]
    sound: Option<bool>,
    #[arg(long)]
    custom_mode: Option<bool>,
    #[arg(long)]
    instrumental: Option<bool>,
    #[arg(long)]
    style: Option<String>,
    /// Newline- or comma-separated URLs of already hosted reference images.
    #[arg(long)]
    reference_urls: Option<String>,
}

impl FieldArgs {
    fn to_profile_fields(&self) -> ProfileFields {
        ProfileFields {
            model: self.model.clone(),
            aspect_ratio: self.aspect_ratio.clone(),
            resolution: self.resolution.clone(),
            quality: self.quality.clone(),
            mode: self.mode.clone(),
            width: self.width,
            height: self.height,
            duration: self.duration,
            sound: self.sound,
            custom_mode: self.custom_mode,
            instrumental: self.instrumental,
            style: self.style.clone(),
            reference_urls: self.reference_urls.clone(),
        }
    }
}

#[derive(Debug, Parser)]
struct PackArgs {
    #[arg(long)]
    family: ModelFamily,
    #[command(flatten)]
    fields: FieldArgs,
}

#[derive(Debug, Parser)]
struct UploadArgs {
    #[arg(long = "image", required = true)]
    images: Vec<PathBuf>,
    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    family: ModelFamily,
    #[arg(long)]
    prompt: String,
    #[command(flatten)]
    fields: FieldArgs,
    /// Local reference images, uploaded before packing.
    #[arg(long = "reference")]
    references: Vec<PathBuf>,
    /// Output prefix; content and receipt are written as `{prefix}-{timestamp}.*`.
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    memo: Option<PathBuf>,
    /// Cache-bypass key mixed into the memo key. Never sent upstream.
    #[arg(long, conflicts_with = "fresh")]
    invalidate: Option<String>,
    /// Force a new request with a random cache-bypass key.
    #[arg(long)]
    fresh: bool,
    #[command(flatten)]
    connection: ConnectionArgs,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("airforce-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Families => {
            print!("{}", families_table());
            Ok(0)
        }
        Command::Pack(args) => run_pack(args),
        Command::Upload(args) => run_upload(args),
        Command::Generate(args) => run_generate(args),
    }
}

fn families_table() -> String {
    let mut out = String::new();
    for family in ModelFamily::ALL {
        out.push_str(&format!(
            "{:<15} {:<6} refs={:<3} {}\n",
            family.label(),
            family.media().as_str(),
            family.max_reference_urls(),
            family.spec().models.join(", ")
        ));
    }
    out
}

fn run_pack(args: PackArgs) -> Result<i32> {
    let profile = pack(args.family, &args.fields.to_profile_fields());
    println!(
        "{}",
        serde_json::to_string_pretty(&Value::Object(profile.into_payload()))?
    );
    Ok(0)
}

fn run_upload(args: UploadArgs) -> Result<i32> {
    let config = args.connection.resolve();
    let images = load_reference_images(&args.images)?;
    let result = ReferenceUploader::new().upload(&config, &images);
    eprintln!("{}", result.status);
    if !result.urls.is_empty() {
        println!("{}", result.reference_urls_text());
    }
    Ok(upload_exit_code(&config, &result))
}

/// Non-zero when nothing could be uploaded: missing key, or every slot failed.
fn upload_exit_code(config: &Config, result: &UploadResult) -> i32 {
    if config.upload_key().is_empty() || (result.urls.is_empty() && !result.errors.is_empty()) {
        1
    } else {
        0
    }
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let config = args.connection.resolve();
    debug!(config = ?config, "resolved configuration");
    let run_id = Uuid::new_v4().to_string();
    let events = args
        .events
        .as_ref()
        .map(|path| EventWriter::new(path, run_id.clone()));
    record(
        events.as_ref(),
        RunEvent::RunStarted {
            family: args.family.label().to_string(),
            prompt: args.prompt.clone(),
        },
    )?;

    let mut fields = args.fields.to_profile_fields();
    if !args.references.is_empty() {
        let images = load_reference_images(&args.references)?;
        let uploaded = ReferenceUploader::new().upload(&config, &images);
        eprintln!("{}", uploaded.status);
        record(
            events.as_ref(),
            RunEvent::UploadFinished {
                urls: uploaded.urls.clone(),
                errors: uploaded.errors.clone(),
                status: uploaded.status.clone(),
            },
        )?;
        fields.reference_urls = merged_reference_urls(fields.reference_urls.as_deref(), &uploaded);
    }

    let profile = pack(args.family, &fields);
    record(
        events.as_ref(),
        RunEvent::ProfilePacked {
            model: profile.model().map(str::to_string),
            media: profile.media().as_str().to_string(),
            payload: profile.payload().clone(),
        },
    )?;

    let invalidation = if args.fresh {
        Some(Uuid::new_v4().to_string())
    } else {
        args.invalidate.clone()
    };
    let key = run_key(&profile, &args.prompt, invalidation.as_deref());
    let mut memo = args.memo.as_ref().map(MemoStore::new);
    let pipeline = GenerationPipeline::new();

    let cached = memo.as_mut().and_then(|store| store.get(&key));
    let from_memo = cached.is_some();
    let execution = match cached {
        Some(entry) => {
            info!(key = %key, "memo hit, skipping generation request");
            execution_from_memo(entry)
        }
        None => pipeline.execute(&config, &profile, &args.prompt),
    };
    if let (Some(store), false) = (memo.as_mut(), from_memo) {
        if let Some(entry) = memo_entry(&execution) {
            store.set(&key, &entry)?;
        }
    }
    record(
        events.as_ref(),
        RunEvent::GenerationFinished {
            status: execution.status,
            content_url: execution.content_url.clone(),
            error: execution.error.clone(),
            memo_hit: from_memo,
        },
    )?;

    let outcome = pipeline.complete(execution, &profile);
    if let Some(content) = &outcome.content {
        record(events.as_ref(), classified_event(content))?;
    }

    let stage = outcome.stage();
    let saved_path = match &args.out {
        Some(prefix) if stage.is_success() => Some(save_content(prefix, &outcome)?),
        _ => None,
    };
    if let Some(prefix) = &args.out {
        let receipt = build_receipt(&run_id, &profile, &args.prompt, &outcome, saved_path.as_deref());
        let receipt_path = sibling_path(prefix, "receipt.json");
        write_receipt(&receipt_path, &receipt)?;
        eprintln!("Receipt: {}", receipt_path.display());
    }

    record(
        events.as_ref(),
        RunEvent::RunFinished {
            stage: stage.as_str().to_string(),
            saved_path: saved_path.as_ref().map(|path| path.display().to_string()),
        },
    )?;

    if let Some(url) = &outcome.execution.content_url {
        println!("{url}");
    }
    if let Some(path) = &saved_path {
        println!("{}", path.display());
    }
    if stage.is_success() {
        Ok(0)
    } else {
        eprintln!("{}", outcome.execution.debug_response);
        Ok(1)
    }
}

fn record(events: Option<&EventWriter>, event: RunEvent) -> Result<()> {
    let Some(writer) = events else {
        return Ok(());
    };
    writer
        .record(&event)
        .with_context(|| format!("failed to write {} event", event.name()))?;
    Ok(())
}

fn load_reference_images(paths: &[PathBuf]) -> Result<Vec<Option<DynamicImage>>> {
    if paths.len() > MAX_REFERENCE_SLOTS {
        bail!(
            "at most {MAX_REFERENCE_SLOTS} reference images are supported, got {}",
            paths.len()
        );
    }
    paths
        .iter()
        .map(|path| {
            image::open(path)
                .map(Some)
                .with_context(|| format!("failed to read reference image {}", path.display()))
        })
        .collect()
}

/// Explicit URLs first, then freshly uploaded ones.
fn merged_reference_urls(explicit: Option<&str>, uploaded: &UploadResult) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(text) = explicit.map(str::trim).filter(|text| !text.is_empty()) {
        parts.push(text.to_string());
    }
    if !uploaded.urls.is_empty() {
        parts.push(uploaded.reference_urls_text());
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

fn memo_entry(execution: &ExecutionResult) -> Option<MemoEntry> {
    let content_url = execution.content_url.clone()?;
    Some(MemoEntry {
        content_url,
        debug_request: execution.debug_request.clone(),
        debug_response: execution.debug_response.clone(),
        recorded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

fn execution_from_memo(entry: MemoEntry) -> ExecutionResult {
    ExecutionResult {
        content_url: Some(entry.content_url),
        debug_request: entry.debug_request,
        debug_response: entry.debug_response,
        error: None,
        status: Some(200),
        events: Vec::new(),
    }
}

fn classified_event(content: &FetchOutcome) -> RunEvent {
    match content {
        FetchOutcome::Classified(classified) => RunEvent::ContentClassified {
            url: classified.url.clone(),
            kind: Some(classified.kind.as_str().to_string()),
            bytes: Some(classified.bytes.len()),
            error: None,
        },
        FetchOutcome::Failed { url, error, .. } => RunEvent::ContentClassified {
            url: url.clone(),
            kind: None,
            bytes: None,
            error: Some(error.clone()),
        },
    }
}

fn save_content(prefix: &Path, outcome: &GenerationOutcome) -> Result<PathBuf> {
    let Some(FetchOutcome::Classified(content)) = &outcome.content else {
        bail!("no classified content to save");
    };
    let path = sibling_path(prefix, content.kind.file_extension());
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    match content.kind {
        ContentKind::Image => outcome
            .visual
            .save_with_format(&path, ImageFormat::Png)
            .with_context(|| format!("failed to save image {}", path.display()))?,
        ContentKind::Video => fs::write(&path, &content.bytes)
            .with_context(|| format!("failed to save video {}", path.display()))?,
    }
    Ok(path)
}

fn build_receipt(
    run_id: &str,
    profile: &ParameterProfile,
    prompt: &str,
    outcome: &GenerationOutcome,
    saved_path: Option<&Path>,
) -> GenerationReceipt {
    let mut receipt = GenerationReceipt::new(run_id, profile.media().as_str(), prompt)
        .with_request_text(&outcome.execution.debug_request)
        .with_events(&outcome.execution.events);
    receipt.model = profile.model().map(str::to_string);
    receipt.content_url = outcome.execution.content_url.clone();
    receipt.content_kind = outcome
        .content
        .as_ref()
        .and_then(FetchOutcome::kind)
        .map(|kind| kind.as_str().to_string());
    receipt.saved_path = saved_path.map(|path| path.display().to_string());
    receipt.error = outcome
        .execution
        .error
        .clone()
        .or_else(|| outcome.content.as_ref().and_then(FetchOutcome::error).map(str::to_string));
    receipt
}

/// `{prefix}-{timestamp}.{suffix}`, one timestamp per process so the content
/// file and its receipt share a stem.
fn sibling_path(prefix: &Path, suffix: &str) -> PathBuf {
    let stamp = run_timestamp();
    let mut name = prefix
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "airforce".to_string());
    name.push_str(&format!("-{stamp}.{suffix}"));
    prefix.with_file_name(name)
}

fn run_timestamp() -> &'static str {
    static STAMP: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    STAMP.get_or_init(|| Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string())
}

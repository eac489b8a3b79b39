use airforce_contracts::config::Config;
use airforce_contracts::profiles::ParameterProfile;
use image::RgbImage;
use reqwest::blocking::Client as HttpClient;

use crate::classify::{placeholder_visual, ContentFetcher, ContentKind, FetchOutcome};
use crate::executor::{ExecutionResult, GenerationExecutor};

/// Terminal state of one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStage {
    /// Upstream answered with a non-200 status.
    Rejected(u16),
    /// Stream consumed but no event carried a result URL.
    NoUrl,
    TransportFailed,
    FetchFailed,
    Image,
    Video,
}

impl GenerationStage {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationStage::Rejected(_) => "rejected",
            GenerationStage::NoUrl => "no_url",
            GenerationStage::TransportFailed => "transport_failed",
            GenerationStage::FetchFailed => "fetch_failed",
            GenerationStage::Image => "image",
            GenerationStage::Video => "video",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, GenerationStage::Image | GenerationStage::Video)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub execution: ExecutionResult,
    pub content: Option<FetchOutcome>,
    /// Decoded frame on image success, otherwise a placeholder sized from the profile.
    pub visual: RgbImage,
}

impl GenerationOutcome {
    pub fn stage(&self) -> GenerationStage {
        if self.execution.error.is_some() {
            return GenerationStage::TransportFailed;
        }
        match &self.content {
            Some(FetchOutcome::Classified(content)) => match content.kind {
                ContentKind::Image => GenerationStage::Image,
                ContentKind::Video => GenerationStage::Video,
            },
            Some(FetchOutcome::Failed { .. }) => GenerationStage::FetchFailed,
            None => match self.execution.status {
                Some(status) if status != 200 => GenerationStage::Rejected(status),
                _ => GenerationStage::NoUrl,
            },
        }
    }
}

/// Executor chained onto the classifier: submit, stream, fetch, classify.
#[derive(Debug, Clone, Default)]
pub struct GenerationPipeline {
    executor: GenerationExecutor,
    fetcher: ContentFetcher,
}

impl GenerationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: HttpClient) -> Self {
        Self {
            executor: GenerationExecutor::with_client(http.clone()),
            fetcher: ContentFetcher::with_client(http),
        }
    }

    pub fn generate(
        &self,
        config: &Config,
        profile: &ParameterProfile,
        prompt: &str,
    ) -> GenerationOutcome {
        let execution = self.execute(config, profile, prompt);
        self.complete(execution, profile)
    }

    pub fn execute(
        &self,
        config: &Config,
        profile: &ParameterProfile,
        prompt: &str,
    ) -> ExecutionResult {
        self.executor.execute(config, profile, prompt)
    }

    /// Fetches and classifies whatever URL `execution` resolved. Callers that
    /// already hold a result (for example from a memo) enter here directly.
    pub fn complete(
        &self,
        mut execution: ExecutionResult,
        profile: &ParameterProfile,
    ) -> GenerationOutcome {
        let fallback_dims = profile.placeholder_dims();
        let Some(url) = execution.content_url.clone() else {
            return GenerationOutcome {
                execution,
                content: None,
                visual: placeholder_visual(fallback_dims),
            };
        };

        let content = self.fetcher.fetch(&url, fallback_dims);
        match &content {
            FetchOutcome::Classified(classified) => {
                execution.debug_response = format!(
                    "{}\n\nGenerated 1 {}",
                    execution.debug_response.trim_end(),
                    classified.kind.as_str()
                );
            }
            FetchOutcome::Failed { error, .. } => {
                execution.debug_response = format!(
                    "{}\n\nDownload failed: {error}",
                    execution.debug_response.trim_end()
                );
            }
        }
        let visual = content.visual().clone();
        GenerationOutcome {
            execution,
            content: Some(content),
            visual,
        }
    }
}

pub fn generate(config: &Config, profile: &ParameterProfile, prompt: &str) -> GenerationOutcome {
    GenerationPipeline::new().generate(config, profile, prompt)
}

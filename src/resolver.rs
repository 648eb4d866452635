use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::ResolveError;
use crate::generation::{
    clean_generation, EncodedImage, GenerationError, GenerationParams, GenerativeBackend,
    VisionCaptioner,
};
use crate::logging::CaptionTrace;
use crate::matching::{self, MatchMode};
use crate::prompt::{PromptBuilder, Tone, ToneTable};
use crate::sample::SampleRow;

const DEFAULT_TEMPERATURE: f32 = 0.9;
const DEFAULT_MAX_LENGTH: u32 = 60;

/// What the user asked for. The catalog is consulted first when an asset name
/// is present; `description` is the base caption for generation otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionRequest {
    pub asset_name: Option<String>,
    pub description: Option<String>,
    pub tone: Tone,
    pub temperature: f32,
    pub max_length: u32,
}

impl Default for CaptionRequest {
    fn default() -> Self {
        Self {
            asset_name: None,
            description: None,
            tone: Tone::default(),
            temperature: DEFAULT_TEMPERATURE,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

impl CaptionRequest {
    pub fn for_asset(name: impl Into<String>) -> Self {
        Self {
            asset_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn for_description(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tone(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length;
        self
    }

    /// Non-blank free-text base caption, trimmed.
    fn base_description(&self) -> Option<&str> {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionSource {
    Catalog,
    Generated,
}

impl CaptionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionSource::Catalog => "catalog",
            CaptionSource::Generated => "generated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptionResult {
    pub base: String,
    pub marketing: String,
    pub source: CaptionSource,
}

/// Fixed generation knobs applied to every delegated request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverSettings {
    pub match_mode: MatchMode,
    pub top_p: Option<f32>,
    pub repetition_penalty: Option<f32>,
    pub sampling: bool,
    /// Upper bound on one backend call, retries included.
    pub timeout: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            match_mode: MatchMode::default(),
            top_p: Some(0.95),
            repetition_penalty: Some(1.2),
            sampling: true,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ResolverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            match_mode: config.match_mode,
            top_p: config.generation.top_p,
            repetition_penalty: config.generation.repetition_penalty,
            sampling: config.generation.sampling,
            timeout: config.generation.request_timeout(),
        }
    }
}

/// Maps caption requests to caption pairs: catalog first, generation second.
///
/// Holds only shared read-only state, so one resolver can serve concurrent
/// requests.
#[derive(Clone)]
pub struct CaptionResolver {
    catalog: Arc<Catalog>,
    tones: Arc<ToneTable>,
    backend: Option<Arc<dyn GenerativeBackend>>,
    settings: ResolverSettings,
}

impl CaptionResolver {
    pub fn new(catalog: Arc<Catalog>, tones: Arc<ToneTable>) -> Self {
        Self {
            catalog,
            tones,
            backend: None,
            settings: ResolverSettings::default(),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn GenerativeBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_settings(mut self, settings: ResolverSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn tones(&self) -> &ToneTable {
        &self.tones
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn resolve(&self, request: &CaptionRequest) -> Result<CaptionResult, ResolveError> {
        let mut trace = CaptionTrace::new(trace_input(request), request.tone);
        let outcome = self.resolve_traced(request, &mut trace).await;
        trace.emit(&outcome_summary(&outcome));
        outcome
    }

    /// Like [`resolve`](Self::resolve), but a catalog miss without a
    /// description asks `captioner` to describe the photo at `image` first.
    /// The photo is only read when that fallback is actually needed.
    pub async fn resolve_with_vision(
        &self,
        request: &CaptionRequest,
        image: &Path,
        captioner: &dyn VisionCaptioner,
    ) -> Result<CaptionResult, ResolveError> {
        let mut trace = CaptionTrace::new(trace_input(request), request.tone);
        let hit = self.lookup(request, &mut trace);
        let outcome = match (hit, request.base_description()) {
            (Some(result), _) => Ok(result),
            (None, Some(base)) => self.generate(base, request, &mut trace).await,
            (None, None) => match self.describe(image, captioner).await {
                Ok(described) => {
                    trace.vision(captioner.name(), Ok(described.as_str()));
                    self.generate(&described, request, &mut trace).await
                }
                Err(err) => {
                    warn!(
                        captioner = captioner.name(),
                        image = ?image,
                        "Vision caption failed: {err}"
                    );
                    trace.vision(captioner.name(), Err(err.to_string().as_str()));
                    Err(ResolveError::generation("", err))
                }
            },
        };
        trace.emit(&outcome_summary(&outcome));
        outcome
    }

    /// Generates a marketing caption for a sample table row, using the row's
    /// synthesized base caption.
    pub async fn resolve_sample(
        &self,
        row: &SampleRow,
        tone: Tone,
        temperature: f32,
        max_length: u32,
    ) -> Result<CaptionResult, ResolveError> {
        let request = CaptionRequest::for_description(row.base_caption())
            .with_tone(tone)
            .with_temperature(temperature)
            .with_max_length(max_length);
        self.resolve(&request).await
    }

    async fn resolve_traced(
        &self,
        request: &CaptionRequest,
        trace: &mut CaptionTrace,
    ) -> Result<CaptionResult, ResolveError> {
        if let Some(result) = self.lookup(request, trace) {
            return Ok(result);
        }
        match request.base_description() {
            Some(base) => self.generate(base, request, trace).await,
            None => Err(self.no_match(request)),
        }
    }

    fn lookup(&self, request: &CaptionRequest, trace: &mut CaptionTrace) -> Option<CaptionResult> {
        let raw = request.asset_name.as_deref()?;
        trace.normalized(raw, &matching::normalize_name(raw));

        let Some(entry) = self.catalog.find(raw, self.settings.match_mode) else {
            trace.catalog_miss(self.catalog.len());
            return None;
        };
        trace.catalog_hit(entry.key());
        debug!(
            name = raw,
            key = entry.key(),
            mode = self.settings.match_mode.as_str(),
            "Catalog hit"
        );

        Some(CaptionResult {
            base: entry.base().to_string(),
            marketing: entry.marketing().to_string(),
            source: CaptionSource::Catalog,
        })
    }

    async fn describe(
        &self,
        path: &Path,
        captioner: &dyn VisionCaptioner,
    ) -> Result<String, GenerationError> {
        let image = EncodedImage::from_path(path).await?;
        info!(
            captioner = captioner.name(),
            bytes = image.len(),
            "No catalog match; describing image"
        );

        match timeout(self.settings.timeout, captioner.describe(&image)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            Ok(Ok(_)) => Err(GenerationError::Empty),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(GenerationError::Timeout(self.settings.timeout)),
        }
    }

    fn no_match(&self, request: &CaptionRequest) -> ResolveError {
        let known_keys = self.catalog.keys();
        warn!(
            name = request.asset_name.as_deref().unwrap_or_default(),
            known = known_keys.len(),
            "No catalog match and no base description"
        );
        ResolveError::NoMatch { known_keys }
    }

    fn params_for(&self, request: &CaptionRequest) -> GenerationParams {
        let profile = self.tones.profile(request.tone);
        GenerationParams {
            temperature: profile.bound_temperature(request.temperature),
            max_length: profile.bound_length(request.max_length),
            top_p: self.settings.top_p,
            repetition_penalty: self.settings.repetition_penalty,
            sampling: self.settings.sampling,
        }
        .clamped()
    }

    async fn generate(
        &self,
        base: &str,
        request: &CaptionRequest,
        trace: &mut CaptionTrace,
    ) -> Result<CaptionResult, ResolveError> {
        let Some(backend) = self.backend.as_ref() else {
            return Err(ResolveError::generation(base, GenerationError::NotConfigured));
        };

        let prompt = PromptBuilder::new(&self.tones).render(request.tone, base);
        trace.prompt(&prompt);

        let params = self.params_for(request);
        info!(
            backend = backend.name(),
            tone = request.tone.as_str(),
            temperature = params.temperature,
            max_length = params.max_length,
            "Generating marketing caption"
        );

        let raw = match timeout(self.settings.timeout, backend.generate(&prompt, &params)).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                warn!(backend = backend.name(), "Generation failed: {err}");
                trace.generated(backend.name(), &params, Err(err.to_string().as_str()));
                return Err(ResolveError::generation(base, err));
            }
            Err(_) => {
                warn!(
                    backend = backend.name(),
                    timeout = ?self.settings.timeout,
                    "Generation timed out"
                );
                let err = GenerationError::Timeout(self.settings.timeout);
                trace.generated(backend.name(), &params, Err(err.to_string().as_str()));
                return Err(ResolveError::generation(base, err));
            }
        };
        trace.generated(backend.name(), &params, Ok(raw.as_str()));

        let marketing = clean_generation(&raw, &prompt);
        trace.cleaned(&raw, &marketing);
        if marketing.is_empty() {
            warn!(backend = backend.name(), "Backend returned no usable caption");
            return Err(ResolveError::generation(base, GenerationError::Empty));
        }

        Ok(CaptionResult {
            base: base.to_string(),
            marketing,
            source: CaptionSource::Generated,
        })
    }
}

fn trace_input(request: &CaptionRequest) -> String {
    match (&request.asset_name, request.base_description()) {
        (Some(name), Some(description)) => format!("{name} | {description}"),
        (Some(name), None) => name.clone(),
        (None, Some(description)) => description.to_string(),
        (None, None) => String::new(),
    }
}

fn outcome_summary(outcome: &Result<CaptionResult, ResolveError>) -> String {
    match outcome {
        Ok(result) => format!("{}: {}", result.source.as_str(), result.marketing),
        Err(err) => err.to_string(),
    }
}

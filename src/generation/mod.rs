mod error;
mod gemini;
mod groq;
mod image;
mod postprocess;

use std::env;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{GenerationConfig, GenerationProvider};

pub use error::GenerationError;
pub use gemini::GeminiGenerator;
pub use groq::GroqGenerator;
pub use image::{mime_type_for, EncodedImage};
pub use postprocess::clean_generation;

pub const MIN_TEMPERATURE: f32 = 0.5;
pub const MAX_TEMPERATURE: f32 = 1.5;
pub const MIN_MAX_LENGTH: u32 = 20;
pub const MAX_MAX_LENGTH: u32 = 80;

const MAX_BACKOFF: Duration = Duration::from_millis(5_000);
const BASE_BACKOFF: Duration = Duration::from_millis(250);

/// Sampling settings handed to a backend alongside the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_length: u32,
    pub top_p: Option<f32>,
    pub repetition_penalty: Option<f32>,
    pub sampling: bool,
}

impl GenerationParams {
    pub fn new(temperature: f32, max_length: u32) -> Self {
        Self {
            temperature,
            max_length,
            top_p: None,
            repetition_penalty: None,
            sampling: true,
        }
    }

    /// Clamps temperature into `[0.5, 1.5]` and max length into `[20, 80]`.
    pub fn clamped(mut self) -> Self {
        self.temperature = if self.temperature.is_finite() {
            self.temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
        } else {
            MIN_TEMPERATURE
        };
        self.max_length = self.max_length.clamp(MIN_MAX_LENGTH, MAX_MAX_LENGTH);
        self
    }
}

/// Text generation service: `(prompt, params) -> text`.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError>;
}

/// Produces a plain base caption from a product photo.
#[async_trait]
pub trait VisionCaptioner: Send + Sync {
    fn name(&self) -> &'static str;
    async fn describe(&self, image: &EncodedImage) -> Result<String, GenerationError>;
}

/// Hosted backends selected by `generation.provider`.
pub struct Backends {
    pub generator: Option<Arc<dyn GenerativeBackend>>,
    pub vision: Option<Arc<dyn VisionCaptioner>>,
}

impl Backends {
    pub fn none() -> Self {
        Self {
            generator: None,
            vision: None,
        }
    }

    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        if config.provider == GenerationProvider::None {
            debug!("No generative provider configured; catalog-only mode");
            return Ok(Self::none());
        }

        let client = build_http_client(config.request_timeout())?;
        let attempts = config.max_retries.saturating_add(1);

        let backends = match config.provider {
            GenerationProvider::None => Self::none(),
            GenerationProvider::Groq => {
                let api_key = required_env(&["GROQ_API_KEY"])?;
                let groq = GroqGenerator::new(client, &config.groq, api_key, attempts)?;
                Self {
                    generator: Some(Arc::new(groq)),
                    vision: None,
                }
            }
            GenerationProvider::Gemini => {
                let api_key = required_env(&["GEMINI_API_KEY", "GOOGLE_API_KEY"])?;
                let gemini = Arc::new(GeminiGenerator::new(
                    client,
                    &config.gemini,
                    api_key,
                    attempts,
                )?);
                Self {
                    generator: Some(gemini.clone()),
                    vision: Some(gemini),
                }
            }
        };

        info!(
            provider = config.provider.as_str(),
            vision = backends.vision.is_some(),
            "Generative backend ready"
        );
        Ok(backends)
    }
}

fn required_env(keys: &[&str]) -> Result<String, GenerationError> {
    for key in keys {
        match env::var(key) {
            Ok(value) if !value.trim().is_empty() => return Ok(value),
            Ok(_) | Err(env::VarError::NotPresent) => continue,
            Err(env::VarError::NotUnicode(_)) => {
                return Err(GenerationError::Configuration(format!(
                    "{key} contains invalid UTF-8"
                )))
            }
        }
    }
    Err(GenerationError::MissingEnvironment(keys.join(" or ")))
}

fn build_http_client(timeout: Duration) -> Result<Client, GenerationError> {
    Client::builder()
        .user_agent("brandcap-rs/0.1")
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .tcp_keepalive(Some(Duration::from_secs(30)))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(|err| {
            GenerationError::Configuration(format!("failed to build HTTP client: {}", err))
        })
}

/// Runs `op` up to `max_attempts` times, backing off between retryable
/// failures.
pub(crate) async fn with_retry<T, F, Fut>(
    provider: &'static str,
    max_attempts: u32,
    mut op: F,
) -> Result<T, GenerationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    let attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= attempts || !err.is_retryable() {
                    return Err(err);
                }

                warn!(
                    attempt,
                    max_attempts = attempts,
                    provider,
                    error = %err,
                    "Generation attempt failed"
                );

                let delay = retry_delay(attempt);
                debug!(?delay, provider, "Waiting before retrying generation");
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

fn retry_delay(attempt: u32) -> Duration {
    let multiplier = 1u32 << attempt.saturating_sub(1).min(16);
    BASE_BACKOFF
        .checked_mul(multiplier)
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn clamps_params_into_supported_ranges() {
        let params = GenerationParams::new(3.0, 500).clamped();
        assert_eq!(params.temperature, MAX_TEMPERATURE);
        assert_eq!(params.max_length, MAX_MAX_LENGTH);

        let params = GenerationParams::new(0.1, 5).clamped();
        assert_eq!(params.temperature, MIN_TEMPERATURE);
        assert_eq!(params.max_length, MIN_MAX_LENGTH);

        let params = GenerationParams::new(f32::NAN, 64).clamped();
        assert_eq!(params.temperature, MIN_TEMPERATURE);
        assert_eq!(params.max_length, 64);
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(retry_delay(1), Duration::from_millis(250));
        assert_eq!(retry_delay(2), Duration::from_millis(500));
        assert_eq!(retry_delay(3), Duration::from_millis(1_000));
        assert_eq!(retry_delay(40), MAX_BACKOFF);
    }

    #[test]
    fn catalog_only_config_builds_no_backends() {
        let backends = Backends::from_config(&GenerationConfig::default()).expect("build");
        assert!(backends.generator.is_none());
        assert!(backends.vision.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_retryable_errors_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry("stub", 3, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(GenerationError::Empty)
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.expect("third attempt succeeds"), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_non_retryable_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry("stub", 5, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(GenerationError::Configuration("bad".into()))
        })
        .await;

        assert!(matches!(result, Err(GenerationError::Configuration(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

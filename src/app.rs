use anyhow::{Context, Result};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::{result_log_path, Config, ConfigManager};
use crate::error::{CaptionError, ResolveError};
use crate::generation::{Backends, VisionCaptioner};
use crate::prompt::{Tone, ToneTable};
use crate::resolver::{CaptionRequest, CaptionResolver, CaptionResult, ResolverSettings};
use crate::result_log::{ResultLog, ResultLogEntry};
use crate::sample::{SampleRow, SampleTable};

/// Everything a front end needs to show for one request.
#[derive(Debug)]
pub struct CaptionOutcome {
    pub original_name: String,
    pub resolution: Result<CaptionResult, ResolveError>,
    /// Secondary warning when saving the result failed.
    pub log_error: Option<CaptionError>,
}

/// User input for one caption request, before defaults are applied.
#[derive(Debug, Clone, Default)]
pub struct CaptionInput {
    pub asset_name: Option<String>,
    pub description: Option<String>,
    pub image: Option<PathBuf>,
    pub tone: Option<Tone>,
    pub temperature: Option<f32>,
    pub max_length: Option<u32>,
    pub save: bool,
}

pub struct BrandcapApp {
    config: Config,
    resolver: CaptionResolver,
    vision: Option<Arc<dyn VisionCaptioner>>,
    samples: Option<SampleTable>,
    log_path: PathBuf,
    result_log: Option<ResultLog>,
}

impl BrandcapApp {
    pub fn new(config_manager: &ConfigManager) -> Result<Self> {
        let config = config_manager.get();
        let log_path = result_log_path(&config)?;
        Self::from_config(config, log_path)
    }

    pub fn from_config(config: Config, log_path: PathBuf) -> Result<Self> {
        let catalog = load_catalog(&config)?;
        let tones = Arc::new(ToneTable::with_overrides(&config.tone_templates));
        let backends =
            Backends::from_config(&config.generation).context("Failed to set up generation")?;

        let mut resolver = CaptionResolver::new(Arc::new(catalog), tones)
            .with_settings(ResolverSettings::from_config(&config));
        if let Some(generator) = backends.generator {
            resolver = resolver.with_backend(generator);
        }

        let samples = match &config.samples_path {
            Some(path) => Some(
                SampleTable::load(path)
                    .with_context(|| format!("Failed to load sample table {:?}", path))?,
            ),
            None => None,
        };

        info!(
            "✅ Ready: {} catalog entries, generation {}",
            resolver.catalog().len(),
            if resolver.has_backend() {
                config.generation.provider.as_str()
            } else {
                "disabled"
            }
        );

        Ok(Self {
            config,
            resolver,
            vision: backends.vision,
            samples,
            log_path,
            result_log: None,
        })
    }

    /// Replaces the configured vision backend.
    pub fn with_vision(mut self, vision: Arc<dyn VisionCaptioner>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &CaptionResolver {
        &self.resolver
    }

    pub fn samples(&self) -> Option<&SampleTable> {
        self.samples.as_ref()
    }

    pub fn result_log_path(&self) -> &Path {
        &self.log_path
    }

    /// Rebuilds the app when the config changed; keeps the current one when
    /// the new config cannot be applied.
    pub fn apply_config_update(&mut self, new_config: Config) -> Result<()> {
        if new_config == self.config {
            debug!("Config unchanged; ignoring update");
            return Ok(());
        }

        let log_path = result_log_path(&new_config)?;
        *self = Self::from_config(new_config, log_path)?;
        info!("Applied config update");
        Ok(())
    }

    pub fn request_for(&self, input: &CaptionInput) -> CaptionRequest {
        CaptionRequest {
            asset_name: input.asset_name.clone(),
            description: input.description.clone(),
            tone: input.tone.unwrap_or(self.config.default_tone),
            temperature: input.temperature.unwrap_or(self.config.default_temperature),
            max_length: input.max_length.unwrap_or(self.config.default_max_length),
        }
    }

    /// Catalog first; the image is only read after a miss with no
    /// description. Every failure is reported inside the outcome.
    pub async fn caption(&mut self, input: &CaptionInput) -> CaptionOutcome {
        let request = self.request_for(input);
        let resolution = match (&input.image, &self.vision) {
            (Some(path), Some(vision)) => {
                self.resolver
                    .resolve_with_vision(&request, path, vision.as_ref())
                    .await
            }
            (Some(_), None) => {
                debug!("Image given but no vision backend configured");
                self.resolver.resolve(&request).await
            }
            _ => self.resolver.resolve(&request).await,
        };

        let original_name = input
            .asset_name
            .clone()
            .or_else(|| input.image.as_deref().map(display_name))
            .unwrap_or_default();

        let log_error = match (&resolution, input.save) {
            (Ok(result), true) => self.save(&original_name, result).err(),
            _ => None,
        };

        CaptionOutcome {
            original_name,
            resolution,
            log_error,
        }
    }

    /// Picks a random sample row and generates a caption for it.
    pub async fn caption_sample<R: Rng>(
        &mut self,
        rng: &mut R,
        input: &CaptionInput,
    ) -> Result<(SampleRow, CaptionOutcome)> {
        let row = self
            .samples
            .as_ref()
            .context("No sample table configured (set samples_path)")?
            .pick(rng)
            .context("Sample table is empty")?
            .clone();

        let request = self.request_for(input);
        let resolution = self
            .resolver
            .resolve_sample(&row, request.tone, request.temperature, request.max_length)
            .await;

        let log_error = match (&resolution, input.save) {
            (Ok(result), true) => self.save(&row.image, result).err(),
            _ => None,
        };

        let outcome = CaptionOutcome {
            original_name: row.image.clone(),
            resolution,
            log_error,
        };
        Ok((row, outcome))
    }

    fn save(&mut self, original_name: &str, result: &CaptionResult) -> Result<(), CaptionError> {
        if self.result_log.is_none() {
            self.result_log = Some(ResultLog::open(&self.log_path)?);
        }
        let Some(log) = self.result_log.as_ref() else {
            return Ok(());
        };

        let entry = ResultLogEntry::new(original_name, &result.base, &result.marketing);
        log.append(&entry).inspect_err(|err| warn!("{err}"))
    }
}

fn load_catalog(config: &Config) -> Result<Catalog> {
    let Some(path) = &config.catalog_path else {
        debug!("Using built-in demo catalog");
        return Ok(Catalog::demo());
    };

    let (catalog, report) =
        Catalog::load(path).with_context(|| format!("Failed to load catalog {:?}", path))?;
    if !report.is_clean() {
        warn!(
            skipped = report.skipped.len(),
            repaired = report.repaired.len(),
            "Catalog loaded with problems"
        );
    }
    Ok(catalog)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{EncodedImage, GenerationError};
    use crate::resolver::CaptionSource;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingVision {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VisionCaptioner for CountingVision {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn describe(&self, _image: &EncodedImage) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("A red dress for women.".into())
        }
    }

    fn app_in(dir: &Path, config: Config) -> BrandcapApp {
        BrandcapApp::from_config(config, dir.join("results.tsv")).expect("app")
    }

    #[tokio::test]
    async fn saves_catalog_hits_when_asked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut app = app_in(dir.path(), Config::default());

        let input = CaptionInput {
            asset_name: Some("IMG001_red_dress.jpg".into()),
            save: true,
            ..CaptionInput::default()
        };
        let outcome = app.caption(&input).await;

        assert!(outcome.resolution.is_ok());
        assert!(outcome.log_error.is_none());
        let logged = fs::read_to_string(dir.path().join("results.tsv")).expect("log");
        assert!(logged.starts_with("IMG001_red_dress.jpg\tA red dress for women.\tTurn heads"));
    }

    #[tokio::test]
    async fn misses_are_not_logged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut app = app_in(dir.path(), Config::default());

        let input = CaptionInput {
            asset_name: Some("blue_shirt.png".into()),
            save: true,
            ..CaptionInput::default()
        };
        let outcome = app.caption(&input).await;

        assert!(matches!(outcome.resolution, Err(ResolveError::NoMatch { .. })));
        assert!(!dir.path().join("results.tsv").exists());
    }

    #[tokio::test]
    async fn catalog_hit_wins_over_unreadable_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vision = Arc::new(CountingVision::default());
        let mut app = app_in(dir.path(), Config::default()).with_vision(vision.clone());

        let outcome = app
            .caption(&CaptionInput {
                asset_name: Some("red_dress.jpg".into()),
                image: Some(PathBuf::from("/nonexistent/red_dress.jpg")),
                ..CaptionInput::default()
            })
            .await;

        let result = outcome.resolution.expect("catalog hit");
        assert_eq!(result.source, CaptionSource::Catalog);
        assert_eq!(result.base, "A red dress for women.");
        assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreadable_image_after_a_miss_is_generation_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vision = Arc::new(CountingVision::default());
        let mut app = app_in(dir.path(), Config::default()).with_vision(vision.clone());

        let missing = app
            .caption(&CaptionInput {
                asset_name: Some("purple_hat.jpg".into()),
                image: Some(dir.path().join("purple_hat.jpg")),
                ..CaptionInput::default()
            })
            .await;
        match missing.resolution {
            Err(ResolveError::GenerationFailed { base, source }) => {
                assert_eq!(base, "");
                assert!(matches!(source, GenerationError::Io(_)));
            }
            other => panic!("expected GenerationFailed, got {other:?}"),
        }

        let unsupported = app
            .caption(&CaptionInput {
                image: Some(PathBuf::from("clip.gif")),
                ..CaptionInput::default()
            })
            .await;
        assert_eq!(unsupported.original_name, "clip.gif");
        assert!(matches!(
            unsupported.resolution,
            Err(ResolveError::GenerationFailed {
                source: GenerationError::Image(_),
                ..
            })
        ));
        assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn request_uses_config_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            default_tone: Tone::Formal,
            default_max_length: 42,
            ..Config::default()
        };
        let app = app_in(dir.path(), config);

        let request = app.request_for(&CaptionInput {
            temperature: Some(1.1),
            ..CaptionInput::default()
        });
        assert_eq!(request.tone, Tone::Formal);
        assert_eq!(request.max_length, 42);
        assert_eq!(request.temperature, 1.1);
    }

    #[test]
    fn dropping_custom_log_path_restores_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let custom = dir.path().join("custom.tsv");
        let config = Config {
            result_log_path: Some(custom.clone()),
            ..Config::default()
        };
        let mut app = BrandcapApp::from_config(config.clone(), custom.clone()).expect("app");
        assert_eq!(app.result_log_path(), custom.as_path());

        let reverted = Config {
            result_log_path: None,
            ..config
        };
        app.apply_config_update(reverted.clone()).expect("update");

        let default_path = result_log_path(&reverted).expect("default path");
        assert_ne!(default_path, custom);
        assert_eq!(app.result_log_path(), default_path.as_path());
    }

    #[test]
    fn loads_catalog_from_config_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog_path = dir.path().join("catalog.jsonc");
        fs::write(
            &catalog_path,
            r#"{ "green_scarf.jpg": { "base": "A green scarf.", "marketing": "Wrap up." } }"#,
        )
        .expect("write");

        let config = Config {
            catalog_path: Some(catalog_path),
            ..Config::default()
        };
        let app = app_in(dir.path(), config);
        assert_eq!(app.resolver().catalog().keys(), vec!["green_scarf.jpg"]);
    }
}

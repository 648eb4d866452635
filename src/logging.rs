use owo_colors::OwoColorize;
use similar::{ChangeTag, TextDiff};
use std::fmt::{self, Write as _};
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    registry::LookupSpan,
};

use crate::generation::GenerationParams;
use crate::prompt::Tone;

const TRACE_TARGET: &str = "brandcap::trace";
const CRATE_PREFIX: &str = "brandcap::";
const DETAIL_LIMIT: usize = 96;
const CLOCK_FORMAT: &[FormatItem<'_>] = format_description!("[hour]:[minute]:[second]");

/// Resolution stage a trace line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    Catalog,
    Vision,
    Prompt,
    Generate,
    Clean,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Normalize => "normalize",
            Stage::Catalog => "catalog",
            Stage::Vision => "vision",
            Stage::Prompt => "prompt",
            Stage::Generate => "generate",
            Stage::Clean => "clean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStep {
    pub stage: Stage,
    pub detail: String,
}

/// How one request turned into a caption pair, or why it did not.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionTrace {
    request: String,
    tone: Tone,
    steps: Vec<TraceStep>,
}

impl CaptionTrace {
    pub fn new(request: impl Into<String>, tone: Tone) -> Self {
        Self {
            request: request.into(),
            tone,
            steps: Vec::new(),
        }
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn normalized(&mut self, raw: &str, normalized: &str) {
        self.push(Stage::Normalize, format!("{raw} -> {normalized}"));
    }

    pub fn catalog_hit(&mut self, key: &str) {
        self.push(Stage::Catalog, format!("hit {key}"));
    }

    pub fn catalog_miss(&mut self, known: usize) {
        self.push(Stage::Catalog, format!("miss ({known} keys)"));
    }

    pub fn vision(&mut self, captioner: &str, outcome: Result<&str, &str>) {
        let detail = match outcome {
            Ok(described) => format!("{captioner}: {}", shorten(described)),
            Err(err) => format!("{captioner} failed: {err}"),
        };
        self.push(Stage::Vision, detail);
    }

    pub fn prompt(&mut self, prompt: &str) {
        self.push(
            Stage::Prompt,
            format!("{} chars: {}", prompt.chars().count(), shorten(prompt)),
        );
    }

    pub fn generated(&mut self, backend: &str, params: &GenerationParams, outcome: Result<&str, &str>) {
        let settings = format!(
            "{backend} t={:.2} max={}",
            params.temperature, params.max_length
        );
        let detail = match outcome {
            Ok(raw) => format!("{settings} -> {}", shorten(raw)),
            Err(err) => format!("{settings} failed: {err}"),
        };
        self.push(Stage::Generate, detail);
    }

    /// Records what post-processing removed from the raw generation.
    pub fn cleaned(&mut self, raw: &str, cleaned: &str) {
        let detail = if cleaned.is_empty() {
            "rejected: nothing usable left".to_string()
        } else {
            let stripped = stripped_fragments(raw, cleaned);
            if stripped.is_empty() {
                "unchanged".to_string()
            } else {
                let quoted: Vec<String> = stripped.iter().map(|part| format!("{part:?}")).collect();
                format!("stripped {}", quoted.join(", "))
            }
        };
        self.push(Stage::Clean, detail);
    }

    pub fn render(&self, outcome: &str) -> String {
        let mut out = format!("caption trace for {:?} (tone {})", self.request, self.tone);
        for step in &self.steps {
            let _ = write!(out, "\n  {:<9} {}", step.stage.as_str(), step.detail);
        }
        let _ = write!(out, "\n  => {}", shorten(outcome));
        out
    }

    /// Emits the rendered trace at DEBUG on its own target.
    pub fn emit(&self, outcome: &str) {
        if !tracing::enabled!(target: TRACE_TARGET, Level::DEBUG) {
            return;
        }
        tracing::debug!(
            target: TRACE_TARGET,
            tone = self.tone.as_str(),
            steps = self.steps.len(),
            "{}",
            self.render(outcome)
        );
    }

    fn push(&mut self, stage: Stage, detail: String) {
        self.steps.push(TraceStep { stage, detail });
    }
}

/// Runs of characters present in `before` but dropped from `after`.
fn stripped_fragments(before: &str, after: &str) -> Vec<String> {
    let diff = TextDiff::from_chars(before, after);
    let mut fragments = Vec::new();
    let mut current = String::new();

    for change in diff.iter_all_changes() {
        if change.tag() == ChangeTag::Delete {
            current.push_str(change.value());
        } else if !current.is_empty() {
            fragments.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        fragments.push(current);
    }
    fragments
}

fn shorten(text: &str) -> String {
    let flat = text.replace(['\r', '\n'], " ");
    if flat.chars().count() <= DETAIL_LIMIT {
        return flat;
    }
    let mut cut: String = flat.chars().take(DETAIL_LIMIT).collect();
    cut.push('…');
    cut
}

/// `HH:MM:SS LEVEL module: message` with the crate prefix dropped from
/// targets.
#[derive(Default)]
pub struct CaptionLogFormatter;

impl<S, N> FormatEvent<S, N> for CaptionLogFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let clock = OffsetDateTime::now_local()
            .unwrap_or_else(|_| OffsetDateTime::now_utc())
            .format(&CLOCK_FORMAT)
            .unwrap_or_default();
        let target = metadata
            .target()
            .strip_prefix(CRATE_PREFIX)
            .unwrap_or(metadata.target());

        if writer.has_ansi_escapes() {
            write!(
                writer,
                "{} {} {}: ",
                clock.dimmed(),
                level_badge(*metadata.level()),
                target.blue()
            )?;
        } else {
            write!(writer, "{clock} {:>5} {target}: ", metadata.level())?;
        }

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn level_badge(level: Level) -> String {
    match level {
        Level::ERROR => "ERROR".red().bold().to_string(),
        Level::WARN => " WARN".yellow().bold().to_string(),
        Level::INFO => " INFO".green().to_string(),
        Level::DEBUG => "DEBUG".cyan().to_string(),
        Level::TRACE => "TRACE".dimmed().to_string(),
    }
}

/// Installs the global subscriber: `RUST_LOG` wins, then `default_filter`.
pub fn init(default_filter: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().event_format(CaptionLogFormatter))
        .try_init();
}

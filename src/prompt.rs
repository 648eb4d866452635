use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const BASE_PLACEHOLDER: &str = "{base}";

/// Style directive controlling how the marketing caption is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Trendy,
    Formal,
    Luxury,
    Playful,
    Minimalist,
    Fun,
}

impl Tone {
    pub const ALL: [Tone; 6] = [
        Tone::Trendy,
        Tone::Formal,
        Tone::Luxury,
        Tone::Playful,
        Tone::Minimalist,
        Tone::Fun,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Trendy => "trendy",
            Tone::Formal => "formal",
            Tone::Luxury => "luxury",
            Tone::Playful => "playful",
            Tone::Minimalist => "minimalist",
            Tone::Fun => "fun",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase();
        Tone::ALL
            .into_iter()
            .find(|tone| tone.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Tone::ALL.iter().map(Tone::as_str).collect();
                format!("unknown tone '{}' (expected one of: {})", raw.trim(), known.join(", "))
            })
    }
}

/// Template and generation limits for one tone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneProfile {
    /// Instruction text; `{base}` marks where the base caption goes.
    pub template: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
}

impl ToneProfile {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            min_temperature: None,
            max_temperature: None,
            max_length: None,
        }
    }

    pub fn with_temperature_bounds(mut self, min: Option<f32>, max: Option<f32>) -> Self {
        self.min_temperature = min;
        self.max_temperature = max;
        self
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Fits a requested temperature into this tone's bounds.
    pub fn bound_temperature(&self, requested: f32) -> f32 {
        let mut value = requested;
        if let Some(min) = self.min_temperature {
            value = value.max(min);
        }
        if let Some(max) = self.max_temperature {
            value = value.min(max);
        }
        value
    }

    /// Caps a requested output length at this tone's limit.
    pub fn bound_length(&self, requested: u32) -> u32 {
        self.max_length
            .map_or(requested, |limit| requested.min(limit))
    }
}

/// Tone-to-profile lookup. Built once and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneTable {
    profiles: HashMap<Tone, ToneProfile>,
}

impl Default for ToneTable {
    fn default() -> Self {
        let profiles = Tone::ALL
            .into_iter()
            .map(|tone| (tone, builtin_profile(tone)))
            .collect();
        Self { profiles }
    }
}

impl ToneTable {
    /// Built-in profiles with the given tones replaced.
    pub fn with_overrides(overrides: &HashMap<Tone, ToneProfile>) -> Self {
        let mut table = Self::default();
        for (tone, profile) in overrides {
            if profile.template.trim().is_empty() {
                tracing::warn!(tone = tone.as_str(), "Ignoring blank tone template override");
                continue;
            }
            table.profiles.insert(*tone, profile.clone());
        }
        table
    }

    pub fn profile(&self, tone: Tone) -> &ToneProfile {
        // every tone is populated by `default`, overrides only replace
        &self.profiles[&tone]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tone, &ToneProfile)> {
        Tone::ALL
            .into_iter()
            .map(move |tone| (tone, self.profile(tone)))
    }
}

fn builtin_profile(tone: Tone) -> ToneProfile {
    match tone {
        Tone::Trendy => ToneProfile::new(
            "You are a social media copywriter for a trend-setting fashion label. \
             Rewrite the product description below as a catchy, upbeat caption that feels current, \
             and finish with two relevant hashtags.\n\nProduct: {base}\nCaption:",
        ),
        Tone::Formal => ToneProfile::new(
            "You are a copywriter for a heritage menswear and womenswear house. \
             Rewrite the product description below as a polished, professional caption \
             without slang, emoji or hashtags.\n\nProduct: {base}\nCaption:",
        )
        .with_temperature_bounds(None, Some(0.9)),
        Tone::Luxury => ToneProfile::new(
            "You are a copywriter for an exclusive luxury boutique. \
             Rewrite the product description below as an elegant, aspirational caption \
             that evokes craftsmanship and exclusivity.\n\nProduct: {base}\nCaption:",
        ),
        Tone::Playful => ToneProfile::new(
            "You are a witty copywriter for a youthful lifestyle brand. \
             Rewrite the product description below as a playful caption with a light pun \
             and at most one emoji.\n\nProduct: {base}\nCaption:",
        ),
        Tone::Minimalist => ToneProfile::new(
            "You are a copywriter for a minimalist design brand. \
             Rewrite the product description below as one short, understated sentence.\
             \n\nProduct: {base}\nCaption:",
        )
        .with_max_length(30),
        Tone::Fun => ToneProfile::new(
            "You are an enthusiastic copywriter for a fun, colourful fashion store. \
             Rewrite the product description below as an energetic caption full of excitement, \
             with emoji and hashtags.\n\nProduct: {base}\nCaption:",
        )
        .with_temperature_bounds(Some(0.9), None),
    }
}

/// Renders a tone and a base caption into the instruction sent to a backend.
pub struct PromptBuilder<'a> {
    tones: &'a ToneTable,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(tones: &'a ToneTable) -> Self {
        Self { tones }
    }

    /// Pure: the same tone and base caption always yield the same prompt.
    /// No truncation is applied.
    pub fn render(&self, tone: Tone, base: &str) -> String {
        let template = self.tones.profile(tone).template.as_str();
        let base = base.trim();

        if template.contains(BASE_PLACEHOLDER) {
            template.replace(BASE_PLACEHOLDER, base)
        } else {
            format!("{}\n{}", template.trim_end(), base)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tones_case_insensitively() {
        assert_eq!("Luxury".parse::<Tone>(), Ok(Tone::Luxury));
        assert_eq!(" minimalist ".parse::<Tone>(), Ok(Tone::Minimalist));
        let err = "grumpy".parse::<Tone>().unwrap_err();
        assert!(err.contains("trendy, formal, luxury, playful, minimalist, fun"));
    }

    #[test]
    fn every_builtin_template_has_a_placeholder() {
        let table = ToneTable::default();
        for (tone, profile) in table.iter() {
            assert!(
                profile.template.contains(BASE_PLACEHOLDER),
                "{tone} template lacks {BASE_PLACEHOLDER}"
            );
        }
    }

    #[test]
    fn trendy_is_the_default_tone() {
        assert_eq!(Tone::default(), Tone::Trendy);
    }

    #[test]
    fn render_is_deterministic_for_every_tone() {
        let table = ToneTable::default();
        let builder = PromptBuilder::new(&table);
        for tone in Tone::ALL {
            let first = builder.render(tone, "A red dress for women.");
            let second = builder.render(tone, "A red dress for women.");
            assert_eq!(first, second);
            assert!(first.contains("Product: A red dress for women.\n"));
        }
    }

    #[test]
    fn luxury_prompt_substitutes_base_caption() {
        let table = ToneTable::default();
        let prompt = PromptBuilder::new(&table).render(Tone::Luxury, "  A red dress for women. ");
        let expected = table
            .profile(Tone::Luxury)
            .template
            .replace("{base}", "A red dress for women.");
        assert_eq!(prompt, expected);
    }

    #[test]
    fn override_without_placeholder_appends_base() {
        let mut overrides = HashMap::new();
        overrides.insert(Tone::Fun, ToneProfile::new("Make it sparkle:  "));
        let table = ToneTable::with_overrides(&overrides);
        let prompt = PromptBuilder::new(&table).render(Tone::Fun, "Blue jeans for men.");
        assert_eq!(prompt, "Make it sparkle:\nBlue jeans for men.");
        // untouched tones keep their built-in template
        assert_eq!(table.profile(Tone::Formal), &builtin_profile(Tone::Formal));
    }

    #[test]
    fn blank_override_is_ignored() {
        let mut overrides = HashMap::new();
        overrides.insert(Tone::Trendy, ToneProfile::new("   "));
        let table = ToneTable::with_overrides(&overrides);
        assert_eq!(table, ToneTable::default());
    }

    #[test]
    fn profile_bounds_apply_to_requests() {
        let table = ToneTable::default();
        assert_eq!(table.profile(Tone::Formal).bound_temperature(1.4), 0.9);
        assert_eq!(table.profile(Tone::Fun).bound_temperature(0.6), 0.9);
        assert_eq!(table.profile(Tone::Luxury).bound_temperature(1.1), 1.1);
        assert_eq!(table.profile(Tone::Minimalist).bound_length(64), 30);
        assert_eq!(table.profile(Tone::Trendy).bound_length(64), 64);
    }
}

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use jsonc_parser::{parse_to_serde_value, ParseOptions};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{CaptionError, Result};
use crate::matching::{self, MatchMode};

/// A demo asset and its canned caption pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    key: String,
    normalized: String,
    base: String,
    marketing: String,
}

impl CatalogEntry {
    /// Catalog key as written in the source, after load-time repair.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn normalized_key(&self) -> &str {
        &self.normalized
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn marketing(&self) -> &str {
        &self.marketing
    }
}

/// What happened while building a [`Catalog`].
#[derive(Debug, Default)]
pub struct CatalogLoadReport {
    pub loaded: usize,
    /// Entries rejected as [`CaptionError::InvalidCatalogEntry`].
    pub skipped: Vec<CaptionError>,
    /// Keys whose doubled extension was collapsed, as `(original, repaired)`.
    pub repaired: Vec<(String, String)>,
}

impl CatalogLoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.repaired.is_empty()
    }
}

/// Ordered, read-only table of demo assets.
///
/// Iteration order is insertion order and decides which entry wins when more
/// than one key matches a name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

const DEMO_ENTRIES: &[(&str, &str, &str)] = &[
    (
        "grey_shoes.jpg",
        "Grey formal shoes for men.",
        "Step into sophistication with our classic grey formal shoes 👞 — where comfort meets class. Perfect for the boardroom or beyond. #SmartLook #StyleThatSpeaks",
    ),
    (
        "brown_jacket.jpg",
        "A brown jacket for men.",
        "Stay warm and stylish with our rugged brown jacket 🧥 — crafted for confidence and comfort. Own the season in style! #WinterVibes #BoldAndClassic",
    ),
    (
        "blue_jeans.jpg",
        "Blue jeans for men.",
        "Classic fit, timeless style. Rock your day in our versatile blue jeans 👖 — made for every mood, every move. #DenimVibes #EverydayEssential",
    ),
    (
        "white_sneakers.jpg",
        "White sneakers for men.",
        "Step into comfort and confidence with our crisp white sneakers 👟 — minimal, clean, and made to move. #EverydayStyle #FreshKicks",
    ),
    (
        "red_dress.jpg",
        "A red dress for women.",
        "Turn heads in our stunning red dress ❤️ — elegant, bold, and made to make memories. Perfect for every occasion! #StyleGoals #RedHotFashion",
    ),
];

impl Catalog {
    /// The built-in demo table.
    pub fn demo() -> Self {
        let (catalog, _) = Self::from_entries(
            DEMO_ENTRIES
                .iter()
                .map(|(key, base, marketing)| (*key, Some(*base), Some(*marketing))),
        );
        catalog
    }

    /// Builds a catalog from `(key, base, marketing)` records, skipping the
    /// invalid ones.
    pub fn from_entries<K, S>(
        records: impl IntoIterator<Item = (K, Option<S>, Option<S>)>,
    ) -> (Self, CatalogLoadReport)
    where
        K: AsRef<str>,
        S: AsRef<str>,
    {
        let mut report = CatalogLoadReport::default();
        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for (raw_key, base, marketing) in records {
            let raw_key = raw_key.as_ref().trim();
            let key = match matching::collapse_doubled_extension(raw_key) {
                Some(repaired) => {
                    warn!(
                        original = raw_key,
                        repaired = repaired.as_str(),
                        "Catalog key has a doubled extension; collapsing"
                    );
                    report.repaired.push((raw_key.to_string(), repaired.clone()));
                    repaired
                }
                None => raw_key.to_string(),
            };

            let base: Option<&str> = base.as_ref().map(|text| text.as_ref());
            let marketing: Option<&str> = marketing.as_ref().map(|text| text.as_ref());

            match validate_entry(&key, base, marketing, &seen) {
                Ok(entry) => {
                    seen.insert(entry.normalized.clone());
                    entries.push(entry);
                }
                Err(err) => {
                    warn!("Skipping catalog entry: {err}");
                    report.skipped.push(err);
                }
            }
        }

        report.loaded = entries.len();
        debug!(
            loaded = report.loaded,
            skipped = report.skipped.len(),
            repaired = report.repaired.len(),
            "Catalog built"
        );

        (Self { entries }, report)
    }

    /// Parses a JSON (or JSONC) object of `name -> { base, marketing }`.
    pub fn from_json_str(content: &str) -> Result<(Self, CatalogLoadReport)> {
        let value = parse_to_serde_value(content, &ParseOptions::default())
            .map_err(|err| CaptionError::Config(format!("catalog is not valid JSONC: {err}")))?
            .ok_or_else(|| CaptionError::Config("catalog file is empty".into()))?;

        let Value::Object(map) = value else {
            return Err(CaptionError::Config(
                "catalog must be a JSON object keyed by asset name".into(),
            ));
        };

        let mut malformed = Vec::new();
        let records: Vec<(String, Option<String>, Option<String>)> = map
            .into_iter()
            .filter_map(|(key, record)| match record {
                Value::Object(fields) => {
                    let field = |name: &str| {
                        fields
                            .get(name)
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    };
                    Some((key, field("base"), field("marketing")))
                }
                _ => {
                    malformed.push(CaptionError::invalid_entry(key, "record is not an object"));
                    None
                }
            })
            .collect();

        let (catalog, mut report) = Self::from_entries(records);
        for err in malformed {
            warn!("Skipping catalog entry: {err}");
            report.skipped.push(err);
        }

        Ok((catalog, report))
    }

    pub fn load(path: &Path) -> Result<(Self, CatalogLoadReport)> {
        let content = fs::read_to_string(path)?;
        let (catalog, report) = Self::from_json_str(&content)?;
        info!(
            "Loaded catalog from {:?} ({} entries, {} skipped)",
            path,
            report.loaded,
            report.skipped.len()
        );
        Ok((catalog, report))
    }

    /// Finds the first entry, in catalog order, whose key occurs in `raw_name`.
    pub fn find(&self, raw_name: &str, mode: MatchMode) -> Option<&CatalogEntry> {
        let name = matching::normalize_name(raw_name);
        self.entries
            .iter()
            .find(|entry| matching::matches(&entry.normalized, &name, mode))
    }

    /// Display keys in catalog order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_entry(
    key: &str,
    base: Option<&str>,
    marketing: Option<&str>,
    seen: &HashSet<String>,
) -> Result<CatalogEntry> {
    let normalized = matching::normalize_name(key);
    if normalized.is_empty() {
        return Err(CaptionError::invalid_entry(key, "key is empty"));
    }
    if seen.contains(&normalized) {
        return Err(CaptionError::invalid_entry(
            key,
            format!("duplicate of an earlier key (normalized '{normalized}')"),
        ));
    }

    let base = required_field(key, "base", base)?;
    let marketing = required_field(key, "marketing", marketing)?;

    Ok(CatalogEntry {
        key: key.to_string(),
        normalized,
        base,
        marketing,
    })
}

fn required_field(key: &str, field: &str, value: Option<&str>) -> Result<String> {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        Some(_) => Err(CaptionError::invalid_entry(key, format!("'{field}' is blank"))),
        None => Err(CaptionError::invalid_entry(key, format!("missing '{field}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Record<'a> = (&'a str, Option<&'a str>, Option<&'a str>);

    fn entry<'a>(key: &'a str, base: &'a str, marketing: &'a str) -> Record<'a> {
        (key, Some(base), Some(marketing))
    }

    #[test]
    fn demo_catalog_keeps_source_order() {
        let catalog = Catalog::demo();
        assert_eq!(
            catalog.keys(),
            vec![
                "grey_shoes.jpg",
                "brown_jacket.jpg",
                "blue_jeans.jpg",
                "white_sneakers.jpg",
                "red_dress.jpg",
            ]
        );
        assert!(catalog.iter().all(|e| !e.base().is_empty() && !e.marketing().is_empty()));
    }

    #[test]
    fn finds_key_inside_longer_upload_name() {
        let catalog = Catalog::demo();
        let hit = catalog
            .find("IMG_2024_red_dress.jpg", MatchMode::Boundary)
            .expect("match");
        assert_eq!(hit.key(), "red_dress.jpg");
        assert_eq!(hit.base(), "A red dress for women.");
    }

    #[test]
    fn first_entry_in_catalog_order_wins() {
        let (catalog, _) = Catalog::from_entries([
            entry("shoe", "A shoe.", "Shoe!"),
            entry("shoes", "Some shoes.", "Shoes!"),
        ]);
        let hit = catalog.find("shoes_shoe.png", MatchMode::Boundary).expect("match");
        assert_eq!(hit.key(), "shoe");

        let hit = catalog.find("shoes.png", MatchMode::Substring).expect("match");
        assert_eq!(hit.key(), "shoe");

        let hit = catalog.find("shoes.png", MatchMode::Boundary).expect("match");
        assert_eq!(hit.key(), "shoes");
    }

    #[test]
    fn skips_incomplete_and_duplicate_records() {
        let (catalog, report) = Catalog::from_entries([
            ("good.jpg", Some("Base."), Some("Marketing.")),
            ("no_marketing.jpg", Some("Base."), None),
            ("blank_base.jpg", Some("   "), Some("Marketing.")),
            ("Good.png", Some("Other."), Some("Other!")),
        ]);

        assert_eq!(catalog.keys(), vec!["good.jpg"]);
        assert_eq!(report.loaded, 1);
        assert_eq!(report.skipped.len(), 3);
        assert!(report
            .skipped
            .iter()
            .all(|err| matches!(err, CaptionError::InvalidCatalogEntry { .. })));
    }

    #[test]
    fn repairs_doubled_extension_at_load() {
        let (catalog, report) =
            Catalog::from_entries([entry("red_dress.jpg.jpg", "A red dress.", "Wow.")]);
        assert_eq!(catalog.keys(), vec!["red_dress.jpg"]);
        assert_eq!(
            report.repaired,
            vec![("red_dress.jpg.jpg".to_string(), "red_dress.jpg".to_string())]
        );
        assert!(catalog.find("red_dress.jpg", MatchMode::Boundary).is_some());
    }

    #[test]
    fn parses_jsonc_preserving_order() {
        let content = r#"{
            // newest first
            "zebra_print.jpg": { "base": "A zebra print scarf.", "marketing": "Wild." },
            "apple_green.jpg": { "base": "A green top.", "marketing": "Fresh." },
            "broken.jpg": "not an object",
            "partial.jpg": { "base": "Only base." }
        }"#;

        let (catalog, report) = Catalog::from_json_str(content).expect("parse");
        assert_eq!(catalog.keys(), vec!["zebra_print.jpg", "apple_green.jpg"]);
        assert_eq!(report.skipped.len(), 2);
        assert!(!report.is_clean());
    }

    #[test]
    fn rejects_non_object_catalog() {
        let err = Catalog::from_json_str("[1, 2, 3]").expect_err("array is not a catalog");
        assert!(matches!(err, CaptionError::Config(_)));
    }
}

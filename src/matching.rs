use serde::{Deserialize, Serialize};

/// How a normalized catalog key is located inside a normalized asset name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Key must appear delimited by the string edge or a non-alphanumeric
    /// character on both sides (`shoe` does not match `shoehorn_ad`).
    #[default]
    Boundary,
    /// Plain substring containment.
    Substring,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Boundary => "boundary",
            MatchMode::Substring => "substring",
        }
    }
}

/// Normalizes an uploaded file name or catalog key for matching.
///
/// Keeps only the basename, lower-cases it, turns spaces into underscores and
/// strips exactly one trailing extension.
pub fn normalize_name(raw: &str) -> String {
    let basename = raw
        .trim()
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();

    let lowered = basename.to_lowercase().replace(' ', "_");
    strip_extension(&lowered).to_string()
}

/// Drops everything after the last `.`, unless that dot starts the name.
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Collapses a repeated trailing extension (`name.jpg.jpg` -> `name.jpg`).
///
/// Returns `None` when the name carries no doubled extension.
pub fn collapse_doubled_extension(name: &str) -> Option<String> {
    let (stem, last) = split_extension(name)?;
    let (_, previous) = split_extension(stem)?;
    if previous.eq_ignore_ascii_case(last) {
        Some(stem.to_string())
    } else {
        None
    }
}

fn split_extension(name: &str) -> Option<(&str, &str)> {
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some((&name[..idx], &name[idx + 1..])),
    }
}

pub fn matches(normalized_key: &str, normalized_name: &str, mode: MatchMode) -> bool {
    if normalized_key.is_empty() || normalized_name.is_empty() {
        return false;
    }

    match mode {
        MatchMode::Substring => normalized_name.contains(normalized_key),
        MatchMode::Boundary => normalized_name
            .match_indices(normalized_key)
            .any(|(start, found)| {
                let end = start + found.len();
                let before = normalized_name[..start].chars().next_back();
                let after = normalized_name[end..].chars().next();
                is_delimiter(before) && is_delimiter(after)
            }),
    }
}

fn is_delimiter(ch: Option<char>) -> bool {
    ch.map_or(true, |c| !c.is_alphanumeric())
}

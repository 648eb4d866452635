use regex::Regex;

const QUOTE_PAIRS: &[(char, char)] = &[('"', '"'), ('\'', '\''), ('“', '”'), ('‘', '’')];

/// Turns raw backend output into a marketing caption, or an empty string when
/// nothing usable remains.
pub fn clean_generation(output: &str, prompt: &str) -> String {
    let mut text = output.trim();
    if text.is_empty() {
        return String::new();
    }

    // completion-style models echo the prompt before the continuation
    let trimmed_prompt = prompt.trim();
    if !trimmed_prompt.is_empty() {
        if let Some(rest) = text.strip_prefix(trimmed_prompt) {
            text = rest.trim();
        }
    }

    if is_prompt_artifact(text, prompt) {
        return String::new();
    }

    let unlabeled = strip_caption_label(text);
    let unquoted = strip_wrapping_quotes(unlabeled.trim());
    unquoted.trim().to_string()
}

fn strip_caption_label(text: &str) -> &str {
    let Ok(label) = Regex::new(r"(?i)^(?:marketing\s+)?caption\s*:\s*") else {
        return text;
    };
    match label.find(text) {
        Some(found) => &text[found.end()..],
        None => text,
    }
}

fn strip_wrapping_quotes(text: &str) -> &str {
    for (open, close) in QUOTE_PAIRS {
        if let Some(inner) = text
            .strip_prefix(*open)
            .and_then(|rest| rest.strip_suffix(*close))
        {
            if !inner.trim().is_empty() {
                return inner;
            }
        }
    }
    text
}

/// True when the output only repeats the prompt or one of its sentences.
pub(crate) fn is_prompt_artifact(output: &str, prompt: &str) -> bool {
    let trimmed_prompt = prompt.trim();
    let core = output.trim();
    if trimmed_prompt.is_empty() || core.is_empty() {
        return false;
    }

    let mut phrases = vec![trimmed_prompt.to_string()];
    phrases.extend(
        trimmed_prompt
            .split(|c| c == '.' || c == '!' || c == '?' || c == '\n')
            .map(str::trim)
            .filter(|segment| segment.len() > 3)
            .map(|segment| segment.to_string()),
    );

    for phrase in phrases {
        let escaped = regex::escape(&phrase);
        let pattern = format!(r#"(?i)^(?:{}\s*[.!?\s"]*)+$"#, escaped);
        if let Ok(re) = Regex::new(&pattern) {
            if re.is_match(core) {
                return true;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROMPT: &str = "Rewrite the product description below.\n\nProduct: A red dress.\nCaption:";

    #[test]
    fn keeps_plain_output() {
        assert_eq!(
            clean_generation("  Opulence redefined.  ", PROMPT),
            "Opulence redefined."
        );
    }

    #[test]
    fn strips_echoed_prompt_and_label() {
        let raw = format!("{PROMPT} Red, radiant, yours.");
        assert_eq!(clean_generation(&raw, PROMPT), "Red, radiant, yours.");
        assert_eq!(
            clean_generation("Marketing caption: Bold in red.", PROMPT),
            "Bold in red."
        );
    }

    #[test]
    fn strips_wrapping_quotes() {
        assert_eq!(clean_generation("\"Made to be seen.\"", PROMPT), "Made to be seen.");
        assert_eq!(clean_generation("“Made to be seen.”", PROMPT), "Made to be seen.");
        assert_eq!(clean_generation("\"\"", PROMPT), "\"\"");
    }

    #[test]
    fn prompt_echo_alone_is_empty() {
        assert_eq!(clean_generation(PROMPT, PROMPT), "");
        assert_eq!(
            clean_generation("Rewrite the product description below.", PROMPT),
            ""
        );
        assert_eq!(clean_generation("   ", PROMPT), "");
    }

    #[test]
    fn empty_prompt_is_tolerated() {
        assert_eq!(clean_generation("Fresh kicks.", ""), "Fresh kicks.");
        assert!(!is_prompt_artifact("Fresh kicks.", ""));
    }
}

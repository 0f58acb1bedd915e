//! Content and name validation: reject obviously hostile input before it reaches an
//! agent, and HTML-escape anything that might later be rendered.

use crate::error::{OrchestratorError, Result};
use regex::Regex;
use std::sync::OnceLock;

static ACTION_NAME_PATTERN: OnceLock<Regex> = OnceLock::new();

fn action_name_pattern() -> &'static Regex {
    ACTION_NAME_PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]{1,63}$").unwrap())
}

/// `snake_case`, starting with a letter, 2-64 characters.
pub fn validate_action_name(name: &str) -> Result<()> {
    if action_name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(OrchestratorError::Validation(format!(
            "action name {:?} must be snake_case, 2-64 chars, starting with a letter",
            name
        )))
    }
}

/// Caps task/utterance content length and strips control characters before an agent or
/// the classifier ever sees it.
pub fn sanitize_content(raw: &str, max_len: usize) -> String {
    let truncated: String = raw.chars().take(max_len).collect();
    truncated.chars().filter(|c| !c.is_control() || *c == '\n').collect()
}

/// Escapes content for any downstream consumer that renders it as HTML (e.g. a log
/// viewer or a transcript UI).
pub fn escape_for_display(raw: &str) -> String {
    html_escape::encode_text(raw).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_action_names() {
        assert!(validate_action_name("create_note").is_ok());
    }

    #[test]
    fn rejects_names_starting_with_a_digit() {
        assert!(validate_action_name("1note").is_err());
    }

    #[test]
    fn sanitize_truncates_and_strips_control_chars() {
        let raw = "hello\u{0007}world";
        let cleaned = sanitize_content(raw, 100);
        assert_eq!(cleaned, "helloworld");
    }

    #[test]
    fn escape_for_display_neutralizes_markup() {
        let escaped = escape_for_display("<script>");
        assert!(!escaped.contains('<'));
    }
}

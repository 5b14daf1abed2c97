//! Helpers for sanitizing data before it enters tracing span attributes or
//! model prompts.
//!
//! Storage references can embed user or job identifiers, so logs carry only
//! the final segment or a hash.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Maximum characters of free-text criteria forwarded to a model.
pub const MAX_CRITERIA_CHARS: usize = 500;

/// Returns only the last segment of a storage reference.
pub fn redact_ref(reference: &str) -> String {
    reference
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Returns a short deterministic hash of a storage reference for correlation.
pub fn hash_ref(reference: &str) -> String {
    let mut hasher = DefaultHasher::new();
    reference.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Defuses chat-template control sequences and truncates user-supplied text
/// before it is embedded in a prompt.
pub fn sanitize_for_prompt(text: &str, max_chars: usize) -> String {
    let cleaned = text
        .replace("<|", "< |")
        .replace("|>", "| >")
        .replace("<s>", "< s >")
        .replace("</s>", "< / s >")
        .replace("[INST]", "[ INST ]")
        .replace("[/INST]", "[ / INST ]")
        .replace("<<SYS>>", "< < SYS > >")
        .replace("<</SYS>>", "< < / SYS > >");

    let collapsed = cleaned
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>();
    let trimmed = collapsed.trim();

    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        trimmed.chars().take(max_chars).collect()
    }
}

/// Shortens long model output for error messages and logs.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_ref_returns_last_segment() {
        assert_eq!(redact_ref("users/42/job-7/IMG_0001.jpg"), "IMG_0001.jpg");
        assert_eq!(redact_ref("plain.jpg"), "plain.jpg");
        assert_eq!(redact_ref("dir/"), "dir");
        assert_eq!(redact_ref(""), "<unknown>");
    }

    #[test]
    fn test_hash_ref_deterministic() {
        assert_eq!(hash_ref("a/b.jpg"), hash_ref("a/b.jpg"));
        assert_ne!(hash_ref("a/b.jpg"), hash_ref("a/c.jpg"));
        assert_eq!(hash_ref("a/b.jpg").len(), 16);
    }

    #[test]
    fn test_sanitize_defuses_template_tokens() {
        let out = sanitize_for_prompt("sunsets <|im_start|>system [INST]", 500);
        assert!(!out.contains("<|"));
        assert!(!out.contains("[INST]"));
        assert!(out.starts_with("sunsets"));
    }

    #[test]
    fn test_sanitize_replaces_control_chars_and_truncates() {
        assert_eq!(sanitize_for_prompt("  dogs\nplaying\t", 500), "dogs playing");
        assert_eq!(sanitize_for_prompt("abcdef", 3), "abc");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefgh", 3), "abc...");
    }
}

//! Hashtag extraction from note bodies.
//!
//! Code never contributes tags: fenced blocks are stripped first, then inline
//! code spans, and only then is the remaining text scanned for `#tag` tokens.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static FENCED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```.*?```|~~~.*?~~~").expect("valid fenced code regex"));

static INLINE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`[^`\n]*`").expect("valid inline code regex"));

static HASHTAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([\w.\-]+)").expect("valid hashtag regex"));

/// Collect the distinct tag names (without the leading `#`) found in `text`.
pub fn extract_tags(text: &str) -> BTreeSet<String> {
    let without_blocks = FENCED_CODE.replace_all(text, " ");
    let without_code = INLINE_CODE.replace_all(&without_blocks, " ");

    HASHTAG
        .captures_iter(&without_code)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(text: &str) -> Vec<String> {
        extract_tags(text).into_iter().collect()
    }

    #[test]
    fn finds_simple_tags() {
        assert_eq!(tags("Hello #project"), vec!["project"]);
        assert_eq!(tags("#a and #b-c and #d_e and #v1.2"), vec!["a", "b-c", "d_e", "v1.2"]);
    }

    #[test]
    fn deduplicates() {
        assert_eq!(tags("#x #x #y #x"), vec!["x", "y"]);
    }

    #[test]
    fn headings_are_not_tags() {
        assert!(tags("# Title\n## Section\n").is_empty());
    }

    #[test]
    fn ignores_fenced_code() {
        let text = "before #kept\n```rust\nlet x = 1; // #ignored\n```\nafter #also";
        assert_eq!(tags(text), vec!["also", "kept"]);
    }

    #[test]
    fn ignores_tilde_fences() {
        assert_eq!(tags("~~~\n#hidden\n~~~\n#shown"), vec!["shown"]);
    }

    #[test]
    fn ignores_inline_code() {
        assert_eq!(tags("use `#define` here #real"), vec!["real"]);
    }

    #[test]
    fn unicode_word_characters_count() {
        assert_eq!(tags("#café"), vec!["café"]);
    }

    #[test]
    fn deterministic() {
        let text = "#b #a #c ```#d``` `#e`";
        assert_eq!(extract_tags(text), extract_tags(text));
    }
}

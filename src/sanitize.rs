//! JSON extraction and repair for model replies.
//!
//! Model output is noisy: code fences, invisible characters, chatter around
//! the payload, full-width punctuation and typographic quotes. [`sanitize`]
//! reduces such a reply to the best JSON-shaped substring it can find. It is
//! total, deterministic and idempotent; whether the result actually parses is
//! left to the caller (see [`extract_json`]).

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Code fence markers, optionally tagged as JSON.
static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?i:json)?").expect("code fence pattern is valid"));

/// Characters that may start the payload, full-width forms included.
const JSON_OPENERS: [char; 4] = ['{', '[', '\u{FF5B}', '\u{FF3B}'];

/// Reduce a raw model reply to its JSON payload.
///
/// Returns `raw` unchanged when no opening bracket exists at all.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let cleaned = strip_code_fences(&strip_control_chars(&normalize_chars(raw)));

    let Some(start) = cleaned.find(JSON_OPENERS) else {
        return raw.to_string();
    };

    let normalized = normalize_structure(&cleaned[start..]);
    let (open, close) = if normalized.starts_with('[') {
        ('[', ']')
    } else {
        ('{', '}')
    };

    if let Some(end) = balanced_end(&normalized, open, close) {
        return normalized[..=end].trim().to_string();
    }
    // Truncated or malformed: cut at the last closer we can see
    if let Some(end) = normalized.rfind(close) {
        return normalized[..=end].trim().to_string();
    }
    normalized.trim().to_string()
}

/// Sanitize `raw` and deserialize the result.
pub fn extract_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let cleaned = sanitize(raw);
    serde_json::from_str(&cleaned).map_err(Error::parse)
}

/// Drop BOM and zero-width characters, fold exotic spaces and separators.
fn normalize_chars(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' => None,
            '\u{00A0}' | '\u{202F}' => Some(' '),
            '\u{2028}' | '\u{2029}' => Some('\n'),
            other => Some(other),
        })
        .collect()
}

fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// Remove fence markers until none remain.
///
/// A single pass can leave a new fence behind (five backticks leave two, a
/// removed marker can join its neighbours), so repeat to a fixed point.
fn strip_code_fences(text: &str) -> String {
    let mut current = text.to_string();
    while current.contains("```") {
        current = CODE_FENCE.replace_all(&current, "").into_owned();
    }
    current
}

/// Closing glyph for a typographic or CJK opening quote.
fn closing_quote(open: char) -> Option<char> {
    match open {
        '\u{201C}' | '\u{201D}' => Some('\u{201D}'), // “ ”
        '\u{2018}' | '\u{2019}' => Some('\u{2019}'), // ‘ ’
        '\u{201E}' => Some('\u{201C}'),              // „ “
        '\u{00AB}' => Some('\u{00BB}'),              // « »
        '\u{300C}' => Some('\u{300D}'),              // 「 」
        '\u{300E}' => Some('\u{300F}'),              // 『 』
        '\u{FF02}' => Some('\u{FF02}'),              // ＂
        _ => None,
    }
}

/// ASCII equivalent of full-width structural punctuation.
fn ascii_structural(c: char) -> Option<char> {
    match c {
        '\u{FF1A}' => Some(':'),
        '\u{FF0C}' => Some(','),
        '\u{FF1B}' => Some(';'),
        '\u{FF3B}' => Some('['),
        '\u{FF3D}' => Some(']'),
        '\u{FF5B}' => Some('{'),
        '\u{FF5D}' => Some('}'),
        '\u{FF08}' => Some('('),
        '\u{FF09}' => Some(')'),
        _ => None,
    }
}

/// Rewrite punctuation and quotes outside string literals to ASCII.
///
/// Inside a string everything passes through, except the string's closing
/// glyph (rewritten to `"`) and a bare `"` inside a typographically quoted
/// string, which is escaped so the output scans with the same string
/// boundaries as the input did.
fn normalize_structure(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Some(glyph) while inside a string that `glyph` terminates
    let mut closing: Option<char> = None;
    let mut escaped = false;

    for c in text.chars() {
        match closing {
            Some(close) => {
                if escaped {
                    escaped = false;
                    out.push(c);
                } else if c == '\\' {
                    escaped = true;
                    out.push(c);
                } else if c == close {
                    closing = None;
                    out.push('"');
                } else if c == '"' {
                    out.push_str("\\\"");
                } else {
                    out.push(c);
                }
            }
            None => {
                if c == '"' {
                    closing = Some('"');
                    out.push('"');
                } else if let Some(close) = closing_quote(c) {
                    closing = Some(close);
                    out.push('"');
                } else if let Some(ascii) = ascii_structural(c) {
                    out.push(ascii);
                } else if c == '`' {
                    // fence debris
                } else if c.is_ascii() || c.is_whitespace() {
                    out.push(c);
                }
            }
        }
    }
    out
}

/// Byte index where the container opened at `text[0]` closes.
fn balanced_end(text: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '"' {
            in_string = true;
        } else if c == open {
            depth += 1;
        } else if c == close && depth > 0 {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn extracts_object_from_surrounding_noise() {
        let raw = r#"  noise {"a": 1, "b": [1,2,{"c":"x"}]} trailing junk"#;
        assert_eq!(sanitize(raw), r#"{"a": 1, "b": [1,2,{"c":"x"}]}"#);
    }

    #[test]
    fn maps_full_width_punctuation() {
        assert_eq!(sanitize("\u{FF5B}\"a\"\u{FF1A}1\u{FF5D}"), r#"{"a":1}"#);
    }

    #[test]
    fn leading_prose_with_full_width_colon_is_discarded() {
        assert_eq!(sanitize("结果：｛\"a\"：1｝"), r#"{"a":1}"#);
    }

    #[test]
    fn strips_code_fences() {
        let raw = "Here you go:\n```json\n{\"scene\": \"harbor\"}\n```\nEnjoy!";
        assert_eq!(sanitize(raw), r#"{"scene": "harbor"}"#);
    }

    #[test]
    fn strips_uppercase_fence_tag() {
        assert_eq!(sanitize("```JSON\n[1, 2]\n```"), "[1, 2]");
    }

    #[test]
    fn removes_bom_and_zero_width_chars() {
        assert_eq!(sanitize("\u{FEFF}{\"a\":\u{200B}1\u{200D}}"), r#"{"a":1}"#);
    }

    #[test]
    fn folds_nbsp_and_line_separators() {
        assert_eq!(sanitize("{\"a\":\u{00A0}1,\u{2028}\"b\": 2}"), "{\"a\": 1,\n\"b\": 2}");
    }

    #[test]
    fn removes_control_chars_but_keeps_whitespace() {
        assert_eq!(sanitize("{\"a\":\u{0007}1}"), r#"{"a":1}"#);
        assert_eq!(sanitize("{\n\t\"a\": 1\r\n}"), "{\n\t\"a\": 1\r\n}");
    }

    #[test]
    fn converts_smart_quotes_to_ascii() {
        let raw = "{\u{201C}name\u{201D}: \u{201C}Lyra\u{201D}, \u{201C}hp\u{201D}: 10}";
        assert_eq!(sanitize(raw), r#"{"name": "Lyra", "hp": 10}"#);
    }

    #[test]
    fn converts_cjk_bracket_quotes() {
        let raw = "{\u{300C}name\u{300D}\u{FF1A}\u{300C}夜\u{300D}}";
        assert_eq!(sanitize(raw), r#"{"name":"夜"}"#);
    }

    #[test]
    fn non_ascii_inside_strings_is_preserved() {
        let raw = r#"{"line": "“Halt!” cried the guard — ｛not a brace｝"}"#;
        assert_eq!(sanitize(raw), raw);
    }

    #[test]
    fn drops_non_ascii_artifacts_outside_strings() {
        assert_eq!(sanitize(r#"{"a": 1, ✨ "b": 2}"#), r#"{"a": 1,  "b": 2}"#);
    }

    #[test]
    fn ascii_quote_inside_smart_string_is_escaped() {
        let raw = "{\u{201C}say\u{201D}: \u{201C}he said \"hi\"\u{201D}}";
        let cleaned = sanitize(raw);
        assert_eq!(cleaned, r#"{"say": "he said \"hi\""}"#);
        let value: Value = serde_json::from_str(&cleaned).unwrap();
        assert_eq!(value["say"], "he said \"hi\"");
    }

    #[test]
    fn braces_inside_strings_do_not_count() {
        let raw = r#"{"text": "a } b", "n": 1} tail }"#;
        assert_eq!(sanitize(raw), r#"{"text": "a } b", "n": 1}"#);
    }

    #[test]
    fn escaped_quotes_keep_string_state() {
        let raw = r#"{"q": "she said \"}\" loudly"} x"#;
        assert_eq!(sanitize(raw), r#"{"q": "she said \"}\" loudly"}"#);
    }

    #[test]
    fn array_container_counts_only_square_brackets() {
        let raw = r#"Here: [1, [2, 3], {"k": [4]}] done"#;
        assert_eq!(sanitize(raw), r#"[1, [2, 3], {"k": [4]}]"#);
    }

    #[test]
    fn truncated_object_falls_back_to_last_closer() {
        let raw = r#"{"a": {"b": 1}, "c": [1, 2"#;
        assert_eq!(sanitize(raw), r#"{"a": {"b": 1}"#);
    }

    #[test]
    fn truncated_without_closer_returns_trimmed_text() {
        assert_eq!(sanitize("junk {\"a\": 1, \"b\"  \n"), r#"{"a": 1, "b""#);
    }

    #[test]
    fn text_without_brackets_is_returned_unchanged() {
        assert_eq!(sanitize("The dragon sleeps."), "The dragon sleeps.");
        assert_eq!(sanitize("```no payload```"), "```no payload```");
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn valid_json_passes_through() {
        let raw = r#"{"events":[{"type":"move","to":"cellar"}]}"#;
        assert_eq!(sanitize(raw), raw);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let corpus = [
            r#"  noise {"a": 1, "b": [1,2,{"c":"x"}]} trailing junk"#,
            "\u{FF5B}\"a\"\u{FF1A}1\u{FF5D}",
            "```json\n{\"a\": 1}\n```",
            "{\u{201C}a\"\u{FF1A}\u{201D}: 1}",
            "{\u{201C}a\\\u{201D} still string\u{201D}: 2}",
            "{\"a\": 1 ``é` }",
            "``\u{200B}`json {\"x\": 1}",
            r#"{"a": {"b": 1}, "c": [1, 2"#,
            "{\"a\": 1, \"b\"  ",
            "[\u{300C}x\u{300D}, \u{00AB}y\u{00BB}, \u{201E}z\u{201C}]",
            "plain prose only",
            "{\"t\": \"tab\there\", \"u\": \"\\u00e9\"}",
            "\u{3000}{\u{3000}\"k\"\u{3000}:\u{3000}1\u{3000}}",
            "[}]{",
            "{",
            "",
        ];
        for raw in corpus {
            let once = sanitize(raw);
            assert_eq!(sanitize(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn extract_json_parses_sanitized_reply() {
        let raw = "Sure!\n```json\n{\u{201C}mood\u{201D}\u{FF1A} \u{201C}tense\u{201D}}\n```";
        let value: Value = extract_json(raw).unwrap();
        assert_eq!(value, json!({"mood": "tense"}));
    }

    #[test]
    fn extract_json_reports_parse_failure() {
        let err = extract_json::<Value>("no json here").unwrap_err();
        assert!(err.to_string().starts_with("failed to parse response"));
    }
}

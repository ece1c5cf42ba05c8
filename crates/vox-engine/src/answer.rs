//! Answer normalization and comparison.
//!
//! Answers are compared leniently: case, surrounding whitespace, a fixed
//! set of punctuation, and repeated interior spaces never make an answer
//! wrong. Word order does.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Punctuation removed before comparison.
static PUNCTUATION: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"[.,/#!$%^&*;:{}=\-_`~()]").ok());

/// Runs of two or more whitespace characters.
static WHITESPACE_RUN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\s{2,}").ok());

/// Normalizes one operand for comparison.
///
/// Non-string values normalize to the empty string.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use vox_engine::normalize;
///
/// assert_eq!(normalize(&json!("  Hello,   World! ")), "hello world");
/// assert_eq!(normalize(&json!(42)), "");
/// ```
#[must_use]
pub fn normalize(value: &Value) -> String {
    value.as_str().map_or_else(String::new, normalize_str)
}

/// Normalizes a string: lower-case, trim, strip punctuation, collapse
/// whitespace runs, trim again.
#[must_use]
pub fn normalize_str(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let (Some(punctuation), Some(whitespace)) = (PUNCTUATION.as_ref(), WHITESPACE_RUN.as_ref())
    else {
        return lowered.trim().to_string();
    };
    let stripped = punctuation.replace_all(lowered.trim(), "");
    whitespace.replace_all(&stripped, " ").trim().to_string()
}

/// Returns `true` if `input` matches `solution`.
///
/// A sequence solution needs a sequence input of the same length whose
/// elements match position by position. Anything else is compared as a
/// single normalized string.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use vox_engine::check_answer;
///
/// assert!(check_answer(&json!("Hello, World!"), &json!("hello world")));
/// assert!(!check_answer(&json!(["happy", "am", "I"]), &json!(["I", "am", "happy"])));
/// ```
#[must_use]
pub fn check_answer(input: &Value, solution: &Value) -> bool {
    match solution {
        Value::Array(expected) => match input {
            Value::Array(given) => {
                given.len() == expected.len()
                    && given
                        .iter()
                        .zip(expected)
                        .all(|(g, e)| normalize(g) == normalize(e))
            }
            _ => false,
        },
        _ => normalize(input) == normalize(solution),
    }
}

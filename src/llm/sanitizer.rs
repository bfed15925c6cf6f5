//! Structured payload recovery from noisy provider text.
//!
//! Providers wrap JSON in prose, Markdown fences and search-citation markers,
//! and occasionally emit raw control characters inside strings. The sanitizer
//! peels those layers off in a fixed order:
//!
//! 1. Keep the innermost fenced block that looks like the payload.
//! 2. Drop numeric citation markers such as `[1]` outside of JSON context.
//! 3. Cut from the first opening delimiter to the last closing one.
//! 4. Remove control characters JSON does not allow.
//! 5. Parse strictly, then try exactly one repair pass.

use crate::lazy_regex;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

static CITATION: Lazy<Regex> = lazy_regex!(r"\[\d{1,3}\]");

const FENCE: &str = "```";

/// Shape the caller expects at the top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedShape {
    /// A JSON object (`{...}`).
    Object,
    /// A JSON array (`[...]`).
    Array,
    /// Whichever of the two opens first.
    Any,
}

impl ExpectedShape {
    const fn openers(self) -> &'static [char] {
        match self {
            Self::Object => &['{'],
            Self::Array => &['['],
            Self::Any => &['{', '['],
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => value.is_object() || value.is_array(),
        }
    }
}

/// A recovered payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredPayload {
    value: Value,
    repaired: bool,
}

impl StructuredPayload {
    /// Borrows the parsed value.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// Consumes the payload, returning the parsed value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Whether the repair pass was needed.
    #[must_use]
    pub const fn was_repaired(&self) -> bool {
        self.repaired
    }

    /// Decodes the payload into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExtractionFailed`] if the value does not match `T`.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.value)
            .map_err(|e| Error::ExtractionFailed(format!("payload does not match schema: {e}")))
    }
}

/// Recovers structured payloads from raw provider responses.
#[derive(Debug, Clone, Copy)]
pub struct ResponseSanitizer {
    repair: bool,
}

impl Default for ResponseSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSanitizer {
    /// Creates a sanitizer with the repair pass enabled.
    #[must_use]
    pub const fn new() -> Self {
        Self { repair: true }
    }

    /// Enables or disables the repair pass.
    #[must_use]
    pub const fn with_repair(mut self, enabled: bool) -> Self {
        self.repair = enabled;
        self
    }

    /// Extracts a payload of the expected shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExtractionFailed`] when no delimiter span exists, the
    /// span does not parse after repair, or the top-level shape is wrong.
    ///
    /// # Example
    ///
    /// ```rust
    /// use trendvault::llm::{ExpectedShape, ResponseSanitizer};
    ///
    /// let raw = "Sure! ```json\n{\"a\":1}\n``` [1][2]";
    /// let payload = ResponseSanitizer::new().extract(raw, ExpectedShape::Object)?;
    /// assert_eq!(payload.value(), &serde_json::json!({"a": 1}));
    /// # Ok::<(), trendvault::Error>(())
    /// ```
    pub fn extract(&self, raw: &str, shape: ExpectedShape) -> Result<StructuredPayload> {
        let result = self.extract_inner(raw, shape);
        let status = match &result {
            Ok(payload) if payload.repaired => "repaired",
            Ok(_) => "ok",
            Err(_) => "failed",
        };
        metrics::counter!("sanitizer_extractions_total", "status" => status).increment(1);
        if let Err(err) = &result {
            tracing::debug!(error = %err, raw_len = raw.len(), "Structured extraction failed");
        }
        result
    }

    fn extract_inner(&self, raw: &str, shape: ExpectedShape) -> Result<StructuredPayload> {
        let unfenced = select_fenced(raw, shape);
        let uncited = strip_citations(unfenced);
        let span = delimited_span(&uncited, shape)?;
        let clean = strip_control_chars(span);

        let (value, repaired) = match serde_json::from_str::<Value>(&clean) {
            Ok(value) => (value, false),
            Err(strict_err) if self.repair => {
                let repaired = repair_json(&clean);
                let value = serde_json::from_str::<Value>(&repaired).map_err(|e| {
                    Error::ExtractionFailed(format!(
                        "unparseable after repair: {e} (strict: {strict_err})"
                    ))
                })?;
                (value, true)
            },
            Err(e) => return Err(Error::ExtractionFailed(format!("unparseable: {e}"))),
        };

        if !shape.matches(&value) {
            return Err(Error::ExtractionFailed(format!(
                "expected {shape:?} at top level"
            )));
        }
        Ok(StructuredPayload { value, repaired })
    }
}

/// Collects the contents of fenced blocks, innermost content for nested fences.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let parts: Vec<&str> = text.split(FENCE).collect();
    let mut blocks = Vec::new();
    let mut i = 1;
    while i + 1 < parts.len() {
        let body = strip_info_string(parts[i]);
        // An opener immediately followed by another opener.
        if body.trim().is_empty() && i + 2 < parts.len() {
            i += 1;
            continue;
        }
        blocks.push(body);
        i += 2;
    }
    blocks
}

/// Drops a fence info string such as `json` from the first line.
fn strip_info_string(block: &str) -> &str {
    match block.split_once('\n') {
        Some((first, rest)) if is_info_string(first) => rest,
        None if is_info_string(block) => "",
        _ => block,
    }
}

fn is_info_string(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+'))
}

/// Picks the first fenced block holding an opener of the expected shape, or
/// the whole text when no block does.
fn select_fenced(text: &str, shape: ExpectedShape) -> &str {
    fenced_blocks(text)
        .into_iter()
        .find(|block| block.contains(shape.openers()))
        .unwrap_or(text)
}

/// Removes `[n]` citation markers unless they sit in JSON value position.
fn strip_citations(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for found in CITATION.find_iter(text) {
        let preceding = text[..found.start()].trim_end().chars().last();
        if matches!(preceding, Some(':' | ',' | '[' | '(')) {
            continue;
        }
        out.push_str(&text[last..found.start()]);
        last = found.end();
    }
    out.push_str(&text[last..]);
    out
}

/// Returns the span from the first opener to the last matching closer.
fn delimited_span(text: &str, shape: ExpectedShape) -> Result<&str> {
    let (start, opener) = text
        .char_indices()
        .find(|(_, c)| shape.openers().contains(c))
        .ok_or_else(|| Error::ExtractionFailed("no opening delimiter".to_string()))?;
    let closer = if opener == '{' { '}' } else { ']' };
    let end = text
        .rfind(closer)
        .filter(|&end| end > start)
        .ok_or_else(|| Error::ExtractionFailed(format!("no closing '{closer}' after '{opener}'")))?;
    Ok(&text[start..=end])
}

/// Removes C0 control characters other than tab, newline and carriage return.
fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|&c| u32::from(c) > 0x1f || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

/// Escapes raw whitespace inside strings and drops trailing commas.
fn repair_json(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            match c {
                _ if escaped => {
                    escaped = false;
                    out.push(c);
                },
                '\\' => {
                    escaped = true;
                    out.push(c);
                },
                '"' => {
                    in_string = false;
                    out.push(c);
                },
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            },
            ',' => {
                let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
                if !matches!(next, Some('}' | ']')) {
                    out.push(c);
                }
            },
            _ => out.push(c),
        }
    }
    out
}

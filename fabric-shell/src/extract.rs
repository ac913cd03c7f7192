//! Field extraction from free-text command output.
//!
//! Device output is unstructured; fields are pulled out with a fixed
//! `Label <ws>:<ws> token` pattern. A missing field is a normal result,
//! never an error.

use std::sync::LazyLock;

use regex::Regex;

/// Label of the system-name line in `show sys-info`.
pub const SYS_NAME_LABEL: &str = "SysName";

static SYS_NAME: LazyLock<Extractor> = LazyLock::new(|| Extractor::new(SYS_NAME_LABEL));

/// Outcome of one extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractionResult {
    value: Option<String>,
}

impl ExtractionResult {
    /// A successful extraction of `value`.
    pub fn found(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
        }
    }

    /// No match in the text.
    pub fn not_found() -> Self {
        Self { value: None }
    }

    /// Whether the field was present.
    pub fn is_found(&self) -> bool {
        self.value.is_some()
    }

    /// The extracted token, if found.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Take the extracted token, if found.
    pub fn into_value(self) -> Option<String> {
        self.value
    }
}

/// Extracts the token following `label :` in a block of text.
#[derive(Debug, Clone)]
pub struct Extractor {
    label: String,
    pattern: Regex,
}

impl Extractor {
    /// Build an extractor for a literal field label.
    pub fn new(label: &str) -> Self {
        // The label is escaped, so the pattern is always valid.
        let pattern = Regex::new(&format!(r"{}\s+:\s+(\S+)", regex::escape(label)))
            .unwrap_or_else(|e| unreachable!("escaped label produced invalid regex: {e}"));
        Self {
            label: label.to_string(),
            pattern,
        }
    }

    /// The shared `SysName` extractor.
    pub fn sys_name() -> &'static Extractor {
        &SYS_NAME
    }

    /// The field label this extractor looks for.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Return the first match's token, or not-found.
    pub fn extract(&self, text: &str) -> ExtractionResult {
        match self.pattern.captures(text).and_then(|c| c.get(1)) {
            Some(m) => ExtractionResult::found(m.as_str()),
            None => ExtractionResult::not_found(),
        }
    }
}

/// Extract the device's system name from `show sys-info` output.
pub fn extract_sys_name(text: &str) -> ExtractionResult {
    Extractor::sys_name().extract(text)
}

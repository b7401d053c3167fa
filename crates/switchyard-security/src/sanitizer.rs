use regex::Regex;
use std::sync::OnceLock;

/// Parent-directory segments, including percent-encoded variants.
fn traversal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"(?i)(^|[/\\])(\.|%2e){2}([/\\]|$)").expect("static traversal regex is valid")
    })
}

/// Input validation for prompts and file references sent to backends, and
/// log-safe rendering of backend output.
pub struct Sanitizer {
    max_prompt_length: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            max_prompt_length: 200_000,
        }
    }
}

impl Sanitizer {
    /// A sanitizer rejecting prompts longer than `max_prompt_length` characters.
    pub fn new(max_prompt_length: usize) -> Self {
        Self { max_prompt_length }
    }

    /// Validate a prompt: enforce the global length cap and reject NUL bytes,
    /// which cannot be passed through process arguments.
    pub fn check_prompt(&self, prompt: &str) -> Result<(), String> {
        if prompt.chars().count() > self.max_prompt_length {
            return Err(format!(
                "prompt exceeds maximum length of {} characters",
                self.max_prompt_length
            ));
        }
        if prompt.contains('\0') {
            return Err("prompt contains NUL bytes".to_string());
        }
        Ok(())
    }

    /// Validate a file reference: non-empty, no control characters and no
    /// parent-directory traversal.
    pub fn check_file_ref(&self, path: &str) -> Result<(), String> {
        if path.trim().is_empty() {
            return Err("empty file reference".to_string());
        }
        if path.chars().any(char::is_control) {
            return Err(format!(
                "file reference '{}' contains control characters",
                self.sanitize_for_log(path)
            ));
        }
        if traversal_pattern().is_match(path) {
            return Err(format!("path traversal in file reference '{path}'"));
        }
        Ok(())
    }

    /// Strip control characters and cap length so backend-provided text
    /// cannot poison structured logs.
    pub fn sanitize_for_log(&self, value: &str) -> String {
        value
            .chars()
            .filter(|c| !c.is_control())
            .take(1000)
            .collect()
    }
}

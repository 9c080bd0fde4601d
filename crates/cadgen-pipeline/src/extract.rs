//! Pull a program out of free-form model text

use regex::Regex;

use crate::convention::Convention;

/// Finds the program in a model response.
///
/// The first fenced block wins. Without a fence, everything from the first
/// domain import onward is taken. Neither yields an empty string, which the
/// validator turns into an error.
#[derive(Debug, Clone)]
pub struct Extractor {
    fence: Regex,
    import: Regex,
}

impl Extractor {
    pub fn new(convention: &Convention) -> Self {
        let fence = format!(
            r"(?s)```(?:{})?[ \t]*\n(.*?)```",
            regex::escape(convention.language)
        );
        let import = format!(r"(?s)({}.*)", regex::escape(&convention.import_marker()));
        // Both patterns are built from escaped literals
        Self {
            fence: Regex::new(&fence).expect("fence pattern"),
            import: Regex::new(&import).expect("import pattern"),
        }
    }

    /// Extract the program text, trimmed. Returns "" when nothing matches.
    pub fn extract(&self, text: &str) -> String {
        if let Some(caps) = self.fence.captures(text) {
            return caps[1].trim().to_string();
        }
        self.import
            .captures(text)
            .map(|caps| caps[1].trim().to_string())
            .unwrap_or_default()
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(&Convention::build123d())
    }
}

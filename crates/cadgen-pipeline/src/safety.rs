//! Substring denylist checked before anything is executed

use crate::error::{PipelineError, Result};

/// Literal substrings that reject a program, matched case-sensitively
/// anywhere in the text, comments and strings included.
pub const BANNED: &[&str] = &[
    "os.system",
    "subprocess",
    "eval(",
    "exec(",
    "__import__",
    "shutil.",
    "requests.",
    "urllib",
];

/// Every banned substring present in `code`, in denylist order
pub fn banned_matches(code: &str) -> Vec<String> {
    BANNED
        .iter()
        .filter(|banned| code.contains(*banned))
        .map(|banned| banned.to_string())
        .collect()
}

/// Reject `code` if it contains any banned substring
pub fn check(code: &str) -> Result<()> {
    let matches = banned_matches(code);
    if matches.is_empty() {
        Ok(())
    } else {
        tracing::warn!("safety gate rejected program: {:?}", matches);
        Err(PipelineError::UnsafeCodeRejected { matches })
    }
}

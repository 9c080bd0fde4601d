//! Follow-up prompt text

use crate::convention::Convention;

/// Code-only re-prompt sent, with empty history, after a response that
/// yielded no usable program
pub fn corrective_prompt(convention: &Convention, request: &str) -> String {
    format!(
        "Return only a code block (```{} ... ```), no explanation.\n\
         The previous reply did not contain a code block.\n\
         Original request: {}",
        convention.language, request
    )
}

/// Repair request quoting the failing program and its error verbatim
pub fn fix_prompt(convention: &Convention, error: &str, code: &str) -> String {
    format!(
        "An error occurred in the following code. Return the corrected code.\n\n\
         [Error]\n{}\n\n[Code]\n```{}\n{}\n```",
        error, convention.language, code
    )
}

/// Self-contained prompt for pasting into an external chat
pub fn manual_prompt(convention: &Convention, request: &str) -> String {
    format!(
        "{}\n\n[What to build]\n{}",
        convention.system_prompt(),
        request.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrective_prompt_quotes_request() {
        let prompt = corrective_prompt(&Convention::build123d(), "10mm cube");
        assert!(prompt.starts_with("Return only a code block (```python ... ```)"));
        assert!(prompt.ends_with("Original request: 10mm cube"));
    }

    #[test]
    fn test_fix_prompt_embeds_error_and_code() {
        let prompt = fix_prompt(
            &Convention::build123d(),
            "NameError: name 'Bx' is not defined",
            "Bx(1, 1, 1)",
        );
        assert!(prompt.contains("[Error]\nNameError: name 'Bx' is not defined\n"));
        assert!(prompt.ends_with("[Code]\n```python\nBx(1, 1, 1)\n```"));
    }

    #[test]
    fn test_manual_prompt_appends_request() {
        let convention = Convention::build123d();
        let prompt = manual_prompt(&convention, "  a pipe  ");
        assert!(prompt.starts_with(&convention.system_prompt()));
        assert!(prompt.ends_with("[What to build]\na pipe"));
    }
}

//! Plausibility check on extracted programs

use crate::convention::Convention;
use crate::error::{PipelineError, Result};

/// Number of characters quoted back in validation diagnostics
pub const PREVIEW_CHARS: usize = 200;

/// Check that extraction produced something that looks like a program for
/// the convention's library. `raw` is only used for the diagnostic.
pub fn validate(convention: &Convention, code: &str, raw: &str) -> Result<()> {
    if code.is_empty() {
        return Err(PipelineError::EmptyExtraction {
            preview: preview(raw),
        });
    }
    if !convention
        .domain_markers()
        .iter()
        .any(|marker| code.contains(marker.as_str()))
    {
        return Err(PipelineError::MissingDomainMarkers {
            preview: preview(code),
        });
    }
    Ok(())
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

//! cadgen-pipeline: LLM-authored CAD programs, checked and executed
//!
//! A request flows through one provider call, code extraction and
//! validation (with a single corrective re-prompt), rule-based auto-patching,
//! a safety gate and isolated execution. Failures can be handed to a bounded
//! repair loop that feeds the error back to the model.

pub mod artifacts;
pub mod client;
pub mod convention;
pub mod error;
pub mod events;
pub mod executor;
pub mod extract;
mod generate;
pub mod patch;
pub mod pipeline;
pub mod prompts;
mod repair;
pub mod safety;
pub mod session;
pub mod validate;

#[cfg(test)]
mod test_support;

pub use client::{ClientFactory, HttpClientFactory};
pub use convention::Convention;
pub use error::{PipelineError, Result};
pub use events::{PipelineEvent, RunKind};
pub use executor::{ExecOutcome, Executor, PythonExecutor};
pub use extract::Extractor;
pub use patch::{Patched, auto_patch};
pub use pipeline::{MAX_REPAIR_ATTEMPTS, Pipeline, PipelineConfig, PipelineHandle, RunOutcome};
pub use session::{HistoryEntry, ProviderSettings, Session};

//! Bounded repair loop over the last failing program

use cadgen_ai::ChatMessage;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{PipelineError, Result},
    events::{PipelineEvent, RunKind},
    pipeline::{MAX_REPAIR_ATTEMPTS, Pipeline, RunOutcome},
    prompts,
    session::Session,
    validate::validate,
};

impl Pipeline {
    /// Ask the model to fix `session.last_code` up to `max_attempts` times.
    ///
    /// Each attempt quotes the previous error and program. The loop keeps a
    /// local history that grows by the fix request and reply of every failed
    /// attempt; the session history only gains the pair of the attempt that
    /// succeeds. A provider error or safety rejection ends the loop early.
    pub async fn repair(&self, session: &mut Session, max_attempts: u32) -> Result<RunOutcome> {
        if !session.has_failure() {
            return Err(self.fail(PipelineError::NothingToRetry));
        }
        if !session.active().has_credentials() {
            return Err(self.fail(PipelineError::NoCredentials {
                provider: session.provider,
            }));
        }

        let max_attempts = max_attempts.clamp(1, MAX_REPAIR_ATTEMPTS);
        let label = format!("up to {} attempt(s)", max_attempts);
        let (_guard, cancel) = self.begin(RunKind::Repair, &label)?;
        let result = self.repair_inner(session, max_attempts, &cancel).await;
        self.finish(result)
    }

    async fn repair_inner(
        &self,
        session: &mut Session,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let convention = &self.config.convention;
        let client = self.clients.create(session.provider, session.active())?;

        let mut history: Vec<ChatMessage> = session.history.clone();
        let mut code = session.last_code.clone();
        let mut error = session.last_error.clone();

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            tracing::info!("repair attempt {}/{}", attempt, max_attempts);
            self.emit(PipelineEvent::RepairAttempt {
                attempt,
                max_attempts,
            });

            let fix = prompts::fix_prompt(convention, &error, &code);
            let raw = self.call(client.as_ref(), &history, &fix, cancel).await?;
            session.last_response = raw.clone();
            let extracted = self.extractor.extract(&raw);

            if self.config.validate_repairs {
                if let Err(e) = validate(convention, &extracted, &raw) {
                    error = e.to_string();
                    self.emit(PipelineEvent::AttemptFailed {
                        attempt,
                        error: error.clone(),
                    });
                    history.push(ChatMessage::user(fix));
                    history.push(ChatMessage::assistant(raw));
                    continue;
                }
            }

            let result = self.execute_program(&extracted, cancel).await;
            match result.result {
                Ok(exec) => {
                    session.record_success(&fix, &raw, &result.patched.code);
                    return Ok(self.outcome(result.patched, exec, Some(attempt)));
                }
                Err(e) if e.is_repairable() => {
                    code = result.patched.code;
                    error = e.to_string();
                    session.record_failure(&code, &error);
                    self.emit(PipelineEvent::AttemptFailed {
                        attempt,
                        error: error.clone(),
                    });
                    history.push(ChatMessage::user(fix));
                    history.push(ChatMessage::assistant(raw));
                }
                // Safety rejections and operational failures are not fed back
                Err(e) => return Err(e),
            }
        }

        Err(PipelineError::RetryExhausted {
            attempts: max_attempts,
            last_error: error,
        })
    }
}

//! Generation: request, extract, validate (one corrective re-prompt), execute

use tokio_util::sync::CancellationToken;

use crate::{
    error::{PipelineError, Result},
    events::{PipelineEvent, RunKind},
    pipeline::{Pipeline, RunOutcome},
    prompts,
    session::Session,
    validate::validate,
};

impl Pipeline {
    /// Turn a natural-language request into an executed program.
    ///
    /// History is replayed to the provider and grows by one user and one
    /// assistant turn only when the program runs successfully. A failed
    /// execution leaves `last_code`/`last_error` for [`Pipeline::repair`].
    pub async fn generate(&self, session: &mut Session, request: &str) -> Result<RunOutcome> {
        let request = request.trim();
        if request.is_empty() {
            return Err(self.fail(PipelineError::EmptyRequest));
        }
        if !session.active().has_credentials() {
            return Err(self.fail(PipelineError::NoCredentials {
                provider: session.provider,
            }));
        }

        let (_guard, cancel) = self.begin(RunKind::Generate, request)?;
        let result = self.generate_inner(session, request, &cancel).await;
        self.finish(result)
    }

    async fn generate_inner(
        &self,
        session: &mut Session,
        request: &str,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let convention = &self.config.convention;
        let client = self.clients.create(session.provider, session.active())?;

        let mut raw = self.call(client.as_ref(), &session.history, request, cancel).await?;
        session.last_response = raw.clone();
        let mut code = self.extractor.extract(&raw);

        if let Err(first) = validate(convention, &code, &raw) {
            tracing::info!("extraction failed, sending corrective prompt: {}", first.kind());
            self.emit(PipelineEvent::CorrectivePrompt {
                reason: first.to_string(),
            });

            // Sent without the prior conversation
            let corrective = prompts::corrective_prompt(convention, request);
            raw = self.call(client.as_ref(), &[], &corrective, cancel).await?;
            session.last_response = raw.clone();
            code = self.extractor.extract(&raw);

            validate(convention, &code, &raw).map_err(|e| PipelineError::ExtractionFailed {
                reason: e.to_string(),
            })?;
        }

        self.emit(PipelineEvent::Extracted {
            lines: code.lines().count(),
        });

        let attempt = self.execute_program(&code, cancel).await;
        match attempt.result {
            Ok(exec) => {
                session.record_success(request, &raw, &attempt.patched.code);
                Ok(self.outcome(attempt.patched, exec, None))
            }
            Err(e) => {
                self.settle_failure(session, &attempt.patched.code, &e);
                Err(e)
            }
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use picker_core::{
    Decision, LlmFailure, NotificationEvent, NotificationKind, OverrideRequest, PassThroughCause,
    PickerConfig, ReleaseCandidate, ReleaseSummary,
};
use tokio::time::Instant;

use crate::llm::{ChatCompleter, LlmChoice};
use crate::notify::Notifier;
use crate::prompt;
use crate::store::PromptStore;

/// Knobs the engine reads on every decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Lowercased tag that disables AI selection.
    pub skip_tag: String,
    /// Decide but never override.
    pub dry_run: bool,
    /// Total wall-clock budget for the LLM, retry included.
    pub llm_timeout: Duration,
    /// Allow one extra attempt after a timeout or transport error.
    pub retry: bool,
}

impl EngineSettings {
    pub fn from_config(config: &PickerConfig) -> Self {
        Self {
            skip_tag: config.skip_tag.clone(),
            dry_run: config.dry_run,
            llm_timeout: config.llm.timeout,
            retry: config.llm.retry,
        }
    }
}

/// Why a request was not answered with a choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassThrough {
    pub cause: PassThroughCause,
    pub reason: String,
}

impl PassThrough {
    fn new(cause: PassThroughCause, reason: impl Into<String>) -> Self {
        Self {
            cause,
            reason: reason.into(),
        }
    }

    fn from_failure(failure: &LlmFailure) -> Self {
        let cause = match failure {
            LlmFailure::Timeout(_) | LlmFailure::Transport(_) => PassThroughCause::LlmFailure,
            LlmFailure::InvalidResponse(_) => PassThroughCause::InvalidResponse,
        };
        Self::new(cause, format!("AI failed: {failure}, using default"))
    }

    fn is_failure(&self) -> bool {
        matches!(
            self.cause,
            PassThroughCause::LlmFailure | PassThroughCause::InvalidResponse
        )
    }
}

impl From<PassThrough> for Decision {
    fn from(p: PassThrough) -> Self {
        Decision::PassThrough {
            cause: p.cause,
            reason: p.reason,
        }
    }
}

/// A validated LLM answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    /// 1-based index into the request's candidates.
    pub index: usize,
    pub guid: String,
    pub reason: String,
}

/// Turns an override request into a [`Decision`].
///
/// Stateless apart from the shared prompt cache; requests never affect
/// each other. Every failure resolves to a pass-through, so `decide` has
/// no error path.
pub struct DecisionEngine {
    prompts: Arc<PromptStore>,
    llm: Arc<dyn ChatCompleter>,
    notifier: Arc<dyn Notifier>,
    settings: EngineSettings,
}

impl DecisionEngine {
    pub fn new(
        prompts: Arc<PromptStore>,
        llm: Arc<dyn ChatCompleter>,
        notifier: Arc<dyn Notifier>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            prompts,
            llm,
            notifier,
            settings,
        }
    }

    pub fn prompts(&self) -> &PromptStore {
        &self.prompts
    }

    pub fn llm(&self) -> &dyn ChatCompleter {
        self.llm.as_ref()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Decide which release the arr should grab.
    ///
    /// Skip tag and missing prompt short-circuit before the LLM is called.
    /// LLM failures and unusable answers emit a failure notification. An
    /// override notification is only sent when the choice differs from the
    /// arr's own pick, and never in dry-run mode.
    pub async fn decide(&self, request: &OverrideRequest) -> Decision {
        let (choice, selected) = match self.choose(request).await {
            Ok(chosen) => chosen,
            Err(pass) => {
                if pass.is_failure() {
                    tracing::warn!(
                        media = %request.media_title(),
                        cause = %pass.cause,
                        reason = %pass.reason,
                        "AI made no valid selection"
                    );
                    self.notifier.notify(NotificationEvent {
                        kind: NotificationKind::Failure,
                        service: request.service(),
                        media_title: request.media_title().to_string(),
                        profile_name: request.profile_name().to_string(),
                        release: None,
                        reason: pass.reason.clone(),
                    });
                }
                return pass.into();
            }
        };

        if self.settings.dry_run {
            tracing::info!(
                media = %request.media_title(),
                release = %selected.title,
                index = choice.index,
                "[DRY RUN] would select"
            );
            return PassThrough::new(
                PassThroughCause::DryRun,
                format!("[DRY RUN] Would select: {}", selected.title),
            )
            .into();
        }

        if selected.guid == request.default_pick().guid {
            tracing::info!(
                media = %request.media_title(),
                release = %selected.title,
                "AI confirms {} selection",
                request.service().display_name()
            );
        } else {
            tracing::info!(
                media = %request.media_title(),
                release = %selected.title,
                size = %prompt::format_size(selected.size),
                "AI overrides selection"
            );
            self.notifier.notify(NotificationEvent {
                kind: NotificationKind::Override,
                service: request.service(),
                media_title: request.media_title().to_string(),
                profile_name: request.profile_name().to_string(),
                release: Some(ReleaseSummary::from(selected)),
                reason: choice.reason.clone(),
            });
        }

        Decision::Override {
            guid: choice.guid,
            reason: choice.reason,
        }
    }

    /// Ask for a choice without notifying and without dry-run gating.
    ///
    /// # Errors
    ///
    /// Returns the [`PassThrough`] that [`decide`](Self::decide) would
    /// have produced before its dry-run check.
    pub async fn simulate(&self, request: &OverrideRequest) -> Result<Choice, PassThrough> {
        self.choose(request).await.map(|(choice, _)| choice)
    }

    async fn choose<'r>(
        &self,
        request: &'r OverrideRequest,
    ) -> Result<(Choice, &'r ReleaseCandidate), PassThrough> {
        let service = request.service();
        let profile = request.profile_name();

        if request.tags().contains(&self.settings.skip_tag) {
            tracing::info!(
                media = %request.media_title(),
                tag = %self.settings.skip_tag,
                "skipping AI, skip tag present"
            );
            return Err(PassThrough::new(
                PassThroughCause::SkipTag,
                format!("Skipped: tag {} present", self.settings.skip_tag),
            ));
        }

        let system_prompt = match self.prompts.lookup(service, profile) {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::info!(%service, profile, "no prompt configured, AI bypassed");
                return Err(PassThrough::new(
                    PassThroughCause::NoPrompt,
                    format!("AI bypassed - no prompt for {service}/{profile}"),
                ));
            }
            Err(e) => {
                tracing::warn!(%service, profile, error = %e, "prompt unusable, AI bypassed");
                return Err(PassThrough::new(
                    PassThroughCause::NoPrompt,
                    format!("AI bypassed - {e}"),
                ));
            }
        };

        let user_prompt = prompt::build_user_prompt(request);
        tracing::info!(
            model = %self.llm.model(),
            media = %request.media_title(),
            %service,
            profile,
            releases = request.candidates().len(),
            "asking AI"
        );

        let answer = self
            .call_llm(&system_prompt, &user_prompt)
            .await
            .map_err(|e| PassThrough::from_failure(&e))?;

        let total = request.candidates().len();
        let (index, selected) = usize::try_from(answer.choice)
            .ok()
            .and_then(|i| request.candidate_at(i).map(|c| (i, c)))
            .ok_or_else(|| {
                PassThrough::from_failure(&LlmFailure::InvalidResponse(format!(
                    "choice {} is out of range 1..={total}",
                    answer.choice
                )))
            })?;
        tracing::info!(index, reason = %answer.reason, "AI selected release");

        let choice = Choice {
            index,
            guid: selected.guid.clone(),
            reason: answer.reason,
        };
        Ok((choice, selected))
    }

    /// One LLM call bounded by the configured timeout, with at most one
    /// retry inside the same deadline.
    async fn call_llm(&self, system_prompt: &str, user_prompt: &str) -> Result<LlmChoice, LlmFailure> {
        let deadline = Instant::now() + self.settings.llm_timeout;

        match self.attempt(system_prompt, user_prompt, deadline).await {
            Err(e) if self.settings.retry && e.is_retryable() => {
                if deadline <= Instant::now() {
                    return Err(e);
                }
                tracing::warn!(error = %e, "LLM call failed, retrying once");
                self.attempt(system_prompt, user_prompt, deadline).await
            }
            result => result,
        }
    }

    async fn attempt(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        deadline: Instant,
    ) -> Result<LlmChoice, LlmFailure> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let call = self.llm.complete(system_prompt, user_prompt, remaining);
        match tokio::time::timeout_at(deadline, call).await {
            Ok(Err(LlmFailure::Timeout(_))) | Err(_) => {
                Err(LlmFailure::Timeout(self.settings.llm_timeout))
            }
            Ok(result) => result,
        }
    }
}

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur across the release picker.
///
/// Library crates use this type directly; the binary reports it as a
/// `miette` diagnostic. Nothing in the webhook path lets one of these
/// escape to the HTTP layer.
///
/// # Examples
///
/// ```
/// use picker_core::PickerError;
///
/// let err = PickerError::Config("LLM_MODEL".into());
/// assert!(err.to_string().contains("LLM_MODEL"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum PickerError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    #[diagnostic(
        code(picker::config),
        help("LLM_API_URL and LLM_MODEL are required, plus a RADARR or SONARR URL/API key pair")
    )]
    Config(String),

    /// A prompt file exists but could not be used.
    #[error("prompt unreadable at {}: {reason}", .path.display())]
    #[diagnostic(code(picker::prompt_read))]
    PromptRead {
        /// Path of the offending `system.txt`.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// An override request violated its invariants.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Radarr/Sonarr REST API failure.
    #[error("arr API error: {0}")]
    Arr(String),

    /// Notification delivery failure.
    #[error("notification error: {0}")]
    Notify(String),
}

/// Failure modes of a single LLM round-trip.
///
/// Every call site matches on this exhaustively; none of these are ever
/// surfaced to the webhook caller.
///
/// # Examples
///
/// ```
/// use picker_core::LlmFailure;
/// use std::time::Duration;
///
/// let failure = LlmFailure::Timeout(Duration::from_secs(90));
/// assert!(failure.is_retryable());
/// assert!(!LlmFailure::InvalidResponse("```json".into()).is_retryable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmFailure {
    /// The hard wall-clock deadline expired.
    #[error("LLM request timed out after {}", format_timeout(.0))]
    Timeout(Duration),

    /// Network, TLS, auth, or non-2xx status.
    #[error("LLM transport error: {0}")]
    Transport(String),

    /// The model answered, but not with a usable `{"choice": n}` object.
    #[error("invalid LLM response: {0}")]
    InvalidResponse(String),
}

impl LlmFailure {
    /// Whether a second attempt could plausibly succeed.
    ///
    /// A malformed answer is unlikely to self-correct, so only timeouts
    /// and transport errors qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmFailure::Timeout(_) | LlmFailure::Transport(_))
    }
}

/// Whole seconds where exact, milliseconds below one second.
fn format_timeout(timeout: &Duration) -> String {
    if timeout.as_secs() == 0 {
        format!("{}ms", timeout.as_millis())
    } else if timeout.subsec_millis() == 0 {
        format!("{}s", timeout.as_secs())
    } else {
        format!("{:.1}s", timeout.as_secs_f64())
    }
}

//! Core types, configuration, and error handling for the release picker.
//!
//! This crate provides the shared foundation used by the other crates:
//! - [`PickerError`] and [`LlmFailure`]: error taxonomy using `thiserror`
//! - [`PickerConfig`]: configuration loaded from the environment
//! - Shared types: [`Service`], [`ReleaseCandidate`], [`OverrideRequest`],
//!   [`Decision`], [`NotificationEvent`]

mod config;
mod error;
mod types;

pub use config::{
    ArrConfig, LlmConfig, NtfyConfig, PickerConfig, DEFAULT_LLM_TIMEOUT_SECS,
    DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_NTFY_TOPIC, DEFAULT_PROMPTS_DIR, DEFAULT_SKIP_TAG,
};
pub use error::{LlmFailure, PickerError};
pub use types::{
    Decision, NotificationEvent, NotificationKind, OverrideRequest, PassThroughCause,
    ReleaseCandidate, ReleaseSummary, Service,
};

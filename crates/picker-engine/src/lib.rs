//! Decision engine for LLM-driven release selection.
//!
//! Provides the prompt store, candidate formatting, the LLM client, the
//! override/pass-through decision logic, ntfy notifications, and the
//! Radarr/Sonarr REST client used around it.

pub mod arr;
pub mod engine;
pub mod llm;
pub mod notify;
pub mod prompt;
pub mod store;

//! HTTP surface for the release picker.
//!
//! Exposes the override webhooks, `/simulate`, `/test`, `/reload`, and
//! `/health` over axum. All decision logic lives in `picker-engine`; this
//! crate only parses payloads, talks to the arr for context, and shapes
//! responses.

pub mod routes;
pub mod server;

pub use server::{build_router, run_server, AppState};

//! Turn-gated conversational session engine.
//!
//! An external dialogue loop (voice or chat, driven by a language model)
//! invokes named operations against a persisted record. This crate decides
//! whether each invocation may run, computes the resulting state and writes it
//! through before reporting success. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (gates, transitions, views).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (record store, config, transcripts).
//!   Behind traits where tests need to inject failures.
//!
//! [`controller`] orchestrates one invocation end-to-end; [`engine`],
//! [`dialogue`] and [`validate`] wire it up for the CLI and the tool server.
//! Scenario vocabulary (phases, statuses, operations) is data, see [`scenario`].

pub mod controller;
pub mod core;
pub mod dialogue;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod record;
pub mod scenario;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;

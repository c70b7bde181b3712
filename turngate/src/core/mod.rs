//! Deterministic, pure logic shared by the session engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! sessions and records and return deterministic outputs suitable for tests.

pub mod args;
pub mod gate;
pub mod invariants;
pub mod normalize;
pub mod session;
pub mod transition;
pub mod types;
pub mod view;

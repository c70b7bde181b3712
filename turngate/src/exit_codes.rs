//! Stable exit codes for turngate CLI commands.

/// Command succeeded; a dialogue ended at EOF without a terminal outcome.
pub const OK: i32 = 0;
/// Command failed due to invalid layout/config/scenario/records or other errors.
pub const INVALID: i32 = 1;
/// `turngate session` ended on a terminal outcome.
pub const TERMINAL: i32 = 3;

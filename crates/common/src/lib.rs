//! Shared utilities used across all switchboard crates: the one-line
//! diagnostic logger and the `.context()` helper macro for crate errors.

pub mod diag;
pub mod error;

pub use {diag::Logger, error::FromMessage};

//! The block validation pipeline (§2 C4-C6, C8): given a header and its
//! subtree roots, reconstructs and validates a candidate block against
//! consensus rules.
//!
//! An ordered list of check functions under `check`, a `Validator` that
//! runs them with early-exit, and the fetch/retry plumbing (C5) built on
//! `tower-fallback`/`tower-batch`.

pub mod bloom;
pub mod check;
pub mod config;
pub mod error;
pub mod fetch;
mod sharded_map;
pub mod validator;

pub use bloom::{BloomIndex, BloomStats};
pub use config::Config;
pub use error::BlockValidationError;
pub use fetch::SubtreeFetchService;
pub use validator::{ValidationContext, Validator};

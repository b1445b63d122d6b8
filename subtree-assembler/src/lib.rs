//! The block-assembly subtree processor (§2 C2, C3): a lock-free intake
//! queue feeding a single owner task that maintains the chain of completed
//! subtrees and the currently-open one, including reorg handling.
//!
//! A state machine driven by typed requests over channels rather than a
//! mutex-guarded struct, so that no caller ever blocks the owner task on
//! its own I/O.

pub mod config;
mod processor;
mod queue;
mod remove_map;
#[cfg(test)]
mod test_support;

pub use config::Config;
pub use processor::{spawn, ProcessorError, ProcessorHandle};
pub use queue::IntakeSender;

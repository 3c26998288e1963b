//! Lifecycle operations for kfn functions.
//!
//! [`LifecycleManager`] deploys, invokes, tails and deletes resolved
//! definitions against a [`kfn_platform::PlatformClient`]. [`Commands`] is
//! the surface a front end calls: resolve the artifact, then run one
//! operation.

pub mod commands;
pub mod lifecycle;

pub use commands::Commands;
pub use lifecycle::{CALL_DATA_PROMPT, InvokeOutcome, LifecycleManager, LogOutcome};

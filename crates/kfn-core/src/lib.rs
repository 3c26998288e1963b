//! Core model for kfn.
//!
//! A source artifact on disk, the persisted [`FunctionDefinition`] that maps
//! it to a platform function, and the remote deployment drift apart
//! independently. This crate owns the first two: the runtime table, the
//! project-local [`DefinitionStore`], the [`DefinitionResolver`] that
//! reconciles an artifact with its record, and the [`SinkRegistry`] the
//! lifecycle operations report through.

pub mod config;
pub mod definition;
pub mod error;
pub mod interaction;
pub mod resolver;
pub mod runtime;
pub mod sink;
pub mod store;

pub use config::{KfnConfig, PlatformConfig, PlatformProvider};
pub use definition::{EventKind, FunctionDefinition, SourceArtifact, TriggerEvent};
pub use error::KfnError;
pub use interaction::{ScriptedInterface, UserInterface};
pub use resolver::DefinitionResolver;
pub use sink::{OutputSink, SinkKind, SinkRegistry, SinkWriter};
pub use store::DefinitionStore;

//! Standard sub-loaders for the loadstone orchestrator.
//!
//! - [`DependencyLoader`]: validates declared inter-addon dependencies
//!   against the host's addon directory on load.
//! - [`ScriptFileLoader`]: accumulates replayable command text, persists it
//!   to a profile-scoped script file on unload, and replays it on load.
//!
//! Both implement the [`Loader`](loadstone_core::Loader) contract and are
//! registered through the ordinary factory path.

pub mod dependency;
pub mod persist;

pub use dependency::{DependencyLoader, Requirement};
pub use persist::{CommandLog, ScriptFileLoader, SCRIPT_EXTENSION};

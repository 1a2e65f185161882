//! Loadstone core: the addon lifecycle orchestrator.
//!
//! A [`LoaderRegistry`] tracks named, pluggable units of setup/teardown logic
//! ([`Loader`]s), groups them by profile, and drives their activation and
//! deactivation as deterministic, priority-ordered transactions with
//! partial-failure aggregation. Independently authored addons register
//! loaders without coordinating with each other; the registry guarantees:
//!
//! - One loader instance per `(profile, kind)` pair, cached on first request
//! - A total execution order per transaction: ascending priority, ties broken
//!   by registration order, unload order computed from unload priorities alone
//! - No short-circuit: a failing loader never prevents its siblings from
//!   running; failures are aggregated into one [`TransactionError`]
//! - At most one active profile per registry, tracked by a per-profile
//!   [`StateMachine`]
//!
//! Everything is synchronous and single-owner; no call suspends and no
//! loaders run in parallel.

pub mod context;
pub mod error;
pub mod loader;
pub mod registry;
pub mod schedule;
pub mod state;

pub use context::{
    AddonDirectory, LoaderContext, NullDirectory, NullRunner, ScriptRunner, TableDirectory,
};
pub use error::{LoaderError, LoaderFailure, RegistryError, Result, TransactionError};
pub use loader::{Loader, LoaderFactory, LoaderKind, DEFAULT_PRIORITY};
pub use registry::{AddonRegistry, LoaderRegistry, DEFAULT_PROFILE};
pub use schedule::TransactionPhase;
pub use state::{ProfileState, StateMachine, StateTransition};

//! Error types for the loader registry.
//!
//! Two layers of errors exist:
//! - [`RegistryError`]: what the registry itself raises: registration errors,
//!   precondition (guard) errors, and the composite transaction error.
//! - [`LoaderError`]: what an individual loader body raises during
//!   `load`/`unload`/`reload`. These never abort a transaction on their own;
//!   they are collected into a [`TransactionError`].

use std::sync::Arc;

use crate::schedule::TransactionPhase;
use crate::state::ProfileState;

/// Errors raised by individual loader implementations.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// Dependency validation errors.
    #[error("Dependency error: {0}")]
    Dependency(String),

    /// Persistence/replay errors.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Command registration/execution errors.
    #[error("Command error: {0}")]
    Command(String),

    /// Filesystem errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else a loader author wants to surface.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One loader failure captured during a transaction.
///
/// The same `Arc` is retained as the offending loader's last error, so the
/// originating cause is preserved without any late field mutation.
#[derive(Debug, Clone)]
pub struct LoaderFailure {
    /// Kind of the loader that raised the error.
    pub kind: String,
    /// The error it raised.
    pub error: Arc<LoaderError>,
}

/// Composite error aggregating every loader failure from one transaction.
///
/// Non-empty by construction: the registry only raises this after at least
/// one loader failed, and only after every loader has been attempted.
#[derive(Debug, thiserror::Error)]
#[error("{} loader(s) failed during {phase} transaction", failures.len())]
pub struct TransactionError {
    /// Which transaction was running.
    pub phase: TransactionPhase,
    /// Individual failures, in execution order.
    pub failures: Vec<LoaderFailure>,
}

/// Errors raised by the registry itself.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The factory's kind name is blank and cannot identify a loader type.
    #[error("Invalid loader kind: `{0}` does not name a concrete loader type")]
    InvalidLoaderKind(String),

    /// The factory names the abstract loader contract itself.
    #[error("`{0}` is the abstract loader contract and cannot be instantiated")]
    AbstractLoaderKind(String),

    /// A cached loader under this kind is not the requested concrete type.
    #[error("Loader `{kind}` is not a `{expected}`")]
    LoaderKindMismatch {
        kind: String,
        expected: &'static str,
    },

    /// Load requested for a profile that is already active.
    #[error("Profile `{0}` is already loaded")]
    AlreadyLoaded(String),

    /// Unload/reload requested for a profile that is not active.
    #[error("Profile `{0}` is not loaded")]
    NotLoaded(String),

    /// Load requested while a different profile is active on this registry.
    #[error("Profile `{active}` is active; unload it before loading `{requested}`")]
    ProfileActive { active: String, requested: String },

    /// An off-graph profile state transition was attempted.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: ProfileState, to: ProfileState },

    /// One or more loaders failed during a transaction.
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Result type alias for registry operations.
///
/// The error type defaults to [`RegistryError`] but may be overridden, so
/// code that imports this alias can still spell out `Result<T, LoaderError>`.
pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_error_display() {
        let err = TransactionError {
            phase: TransactionPhase::Load,
            failures: vec![LoaderFailure {
                kind: "dependency".to_string(),
                error: Arc::new(LoaderError::Dependency("missing addon".to_string())),
            }],
        };
        assert_eq!(err.to_string(), "1 loader(s) failed during load transaction");
    }

    #[test]
    fn test_profile_active_display_names_both_profiles() {
        let err = RegistryError::ProfileActive {
            active: "bench".to_string(),
            requested: "field".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("bench"));
        assert!(msg.contains("field"));
    }

    #[test]
    fn test_result_alias_accepts_explicit_error_type() {
        // The alias must stay usable for loader signatures in scopes that
        // import it alongside the default registry-error form.
        fn loader_side() -> Result<(), LoaderError> {
            Ok(())
        }
        fn registry_side() -> Result<()> {
            Ok(())
        }
        assert!(loader_side().is_ok());
        assert!(registry_side().is_ok());
    }

    #[test]
    fn test_loader_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = LoaderError::from(io);
        assert!(matches!(err, LoaderError::Io(_)));
    }
}

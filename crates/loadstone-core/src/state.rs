//! Profile lifecycle states and the transition machine.
//!
//! Every profile held by a registry owns one [`StateMachine`]. Transitions
//! are driven exclusively by the registry's transaction engine; the machine
//! validates edges and keeps a timestamped history of what happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Lifecycle state of one profile within a registry.
///
/// The `*Error` variants mean the corresponding transaction completed but at
/// least one loader failed; they are still well-defined states from which a
/// compatible follow-up transaction is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileState {
    /// Initial state; no transaction has run yet.
    #[default]
    Registered,
    /// A load transaction completed with no failures.
    Loaded,
    /// A load transaction completed with at least one failure.
    LoadedError,
    /// An unload transaction completed with no failures.
    Unloaded,
    /// An unload transaction completed with at least one failure.
    UnloadedError,
    /// A reload transaction completed with no failures.
    Reloaded,
    /// A reload transaction completed with at least one failure.
    ReloadedError,
}

impl ProfileState {
    /// String representation, matching the serde encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileState::Registered => "registered",
            ProfileState::Loaded => "loaded",
            ProfileState::LoadedError => "loaded_error",
            ProfileState::Unloaded => "unloaded",
            ProfileState::UnloadedError => "unloaded_error",
            ProfileState::Reloaded => "reloaded",
            ProfileState::ReloadedError => "reloaded_error",
        }
    }

    /// Whether this profile counts as currently activated.
    ///
    /// The active set is also the set from which `unload` and `reload` are
    /// permitted.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ProfileState::Loaded
                | ProfileState::LoadedError
                | ProfileState::Reloaded
                | ProfileState::ReloadedError
        )
    }

    /// Whether the last transaction on this profile recorded failures.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ProfileState::LoadedError | ProfileState::UnloadedError | ProfileState::ReloadedError
        )
    }
}

impl std::fmt::Display for ProfileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded profile state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// Previous state.
    pub from: ProfileState,
    /// New state.
    pub to: ProfileState,
    /// When the transition happened.
    pub at: DateTime<Utc>,
    /// Why the transition happened.
    pub reason: String,
}

/// State machine tracking one profile's lifecycle.
#[derive(Debug, Default)]
pub struct StateMachine {
    current: ProfileState,
    history: Vec<StateTransition>,
}

impl StateMachine {
    /// Create a new machine in the [`ProfileState::Registered`] state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current state.
    pub fn current(&self) -> ProfileState {
        self.current
    }

    /// Transition to a new state, recording it in the history.
    pub fn transition(&mut self, to: ProfileState, reason: String) -> Result<(), RegistryError> {
        Self::validate_transition(self.current, to)?;

        self.history.push(StateTransition {
            from: self.current,
            to,
            at: Utc::now(),
            reason,
        });
        self.current = to;
        Ok(())
    }

    /// Get the transition history, oldest first.
    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Validate a state transition edge.
    fn validate_transition(from: ProfileState, to: ProfileState) -> Result<(), RegistryError> {
        use ProfileState::*;

        let valid = match (from, to) {
            // First load from the initial state.
            (Registered, Loaded | LoadedError) => true,
            // Re-load after a completed unload.
            (Unloaded | UnloadedError, Loaded | LoadedError) => true,
            // Unload or reload while activated.
            (f, Unloaded | UnloadedError | Reloaded | ReloadedError) if f.is_active() => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(RegistryError::InvalidTransition { from, to })
        }
    }
}

//! Transaction phases and the deterministic execution order.
//!
//! Every transaction is a single priority-ordered pass over a profile's
//! loaders. Ordering is an explicit stable sort on
//! `(priority, insertion sequence)` tuples, so the stability guarantee does
//! not depend on any container's native tie-breaking.

use crate::context::LoaderContext;
use crate::error::LoaderError;
use crate::loader::Loader;
use crate::state::ProfileState;

/// Which lifecycle transaction is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    /// Activate every loader via `load`.
    Load,
    /// Deactivate every loader via `unload`.
    Unload,
    /// One pass over every loader's `reload`; not an unload plus a load.
    Reload,
}

impl TransactionPhase {
    /// String representation for logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionPhase::Load => "load",
            TransactionPhase::Unload => "unload",
            TransactionPhase::Reload => "reload",
        }
    }

    /// Which priority of a loader governs this phase.
    ///
    /// Reload ends in the loaded arrangement, so it schedules like a load.
    pub(crate) fn priority_of(&self, loader: &dyn Loader) -> i32 {
        match self {
            TransactionPhase::Load | TransactionPhase::Reload => loader.load_priority(),
            TransactionPhase::Unload => loader.unload_priority(),
        }
    }

    /// Target states on success and on failure.
    pub(crate) fn target_states(&self) -> (ProfileState, ProfileState) {
        match self {
            TransactionPhase::Load => (ProfileState::Loaded, ProfileState::LoadedError),
            TransactionPhase::Unload => (ProfileState::Unloaded, ProfileState::UnloadedError),
            TransactionPhase::Reload => (ProfileState::Reloaded, ProfileState::ReloadedError),
        }
    }

    /// Invoke this phase's method on one loader.
    pub(crate) fn invoke(
        &self,
        loader: &mut dyn Loader,
        ctx: &mut LoaderContext,
        profile: &str,
    ) -> Result<(), LoaderError> {
        match self {
            TransactionPhase::Load => loader.load(ctx, profile),
            TransactionPhase::Unload => loader.unload(ctx, profile),
            TransactionPhase::Reload => loader.reload(ctx, profile),
        }
    }
}

impl std::fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compute the execution order over loaders with the given priorities.
///
/// `priorities` is supplied in insertion order; the returned indices are
/// sorted by ascending priority, ties broken by ascending insertion sequence.
pub(crate) fn execution_order(priorities: impl IntoIterator<Item = i32>) -> Vec<usize> {
    let mut keyed: Vec<(i32, usize)> = priorities
        .into_iter()
        .enumerate()
        .map(|(seq, priority)| (priority, seq))
        .collect();
    keyed.sort_by_key(|&(priority, seq)| (priority, seq));
    keyed.into_iter().map(|(_, seq)| seq).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_by_ascending_priority() {
        assert_eq!(execution_order([200, 50, 100]), vec![1, 2, 0]);
    }

    #[test]
    fn test_equal_priorities_keep_insertion_order() {
        assert_eq!(execution_order([100, 100, 100, 100]), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_mixed_ties_are_stable() {
        // Two loaders at 50 and two at 10, interleaved.
        assert_eq!(execution_order([50, 10, 50, 10]), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_negative_priorities_sort_first() {
        assert_eq!(execution_order([0, -5, 5]), vec![1, 0, 2]);
    }

    #[test]
    fn test_empty_input() {
        assert!(execution_order([]).is_empty());
    }
}

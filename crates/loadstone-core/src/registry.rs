//! Loader registries: creation/caching, guards, and lifecycle transactions.
//!
//! [`LoaderRegistry`] is the orchestrator: per profile it owns an
//! insertion-ordered set of loaders plus a state machine, and drives
//! `load`/`unload`/`reload` as priority-ordered transactions with
//! partial-failure aggregation. [`AddonRegistry`] is the same engine scoped
//! to one addon name; the addon name only contributes logging context.
//!
//! At most one profile per registry may be active at a time. A guard failure
//! never mutates any state; a transaction failure still leaves the profile in
//! a well-defined error-variant state.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::context::LoaderContext;
use crate::error::{LoaderError, LoaderFailure, RegistryError, Result, TransactionError};
use crate::loader::{Loader, LoaderFactory, LoaderKind};
use crate::schedule::{self, TransactionPhase};
use crate::state::{ProfileState, StateMachine, StateTransition};

/// Reserved profile name used when the caller does not supply one.
pub const DEFAULT_PROFILE: &str = "default";

fn resolve_profile(profile: Option<&str>) -> &str {
    profile.unwrap_or(DEFAULT_PROFILE)
}

/// One cached loader and its bookkeeping.
struct LoaderEntry {
    kind: LoaderKind,
    loader: Box<dyn Loader>,
    /// Last error this loader raised during any transaction.
    last_error: Option<Arc<LoaderError>>,
}

/// Per-profile loader collection and lifecycle state.
///
/// `entries` preserves registration order; an entry's position is its
/// insertion sequence, the tie-break for equal priorities.
#[derive(Default)]
struct ProfileSlot {
    entries: Vec<LoaderEntry>,
    machine: StateMachine,
}

impl ProfileSlot {
    fn position(&self, kind: LoaderKind) -> Option<usize> {
        self.entries.iter().position(|entry| entry.kind == kind)
    }
}

/// Registry owning one or more profiles' loaders and their lifecycle state.
pub struct LoaderRegistry {
    profiles: HashMap<String, ProfileSlot>,
    /// The single profile currently in an activated state, if any.
    active_profile: Option<String>,
}

impl LoaderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            profiles: HashMap::new(),
            active_profile: None,
        }
    }

    // ------------------------------------------------------------------
    // Creation and caching
    // ------------------------------------------------------------------

    /// Get or create the loader for `(profile, factory.kind())`.
    ///
    /// Idempotent: a cached instance is returned unchanged. Otherwise the
    /// factory is validated (a blank kind and the abstract contract kind are
    /// each rejected with their own error, creating no entry), a fresh
    /// instance is built, and it is appended in registration order.
    pub fn get_or_create_dyn(
        &mut self,
        factory: &LoaderFactory,
        profile: Option<&str>,
    ) -> Result<&mut dyn Loader> {
        let profile = resolve_profile(profile);
        let kind = factory.kind();

        let existing = self
            .profiles
            .get(profile)
            .and_then(|slot| slot.position(kind));
        if let Some(idx) = existing {
            let slot = self.profiles.get_mut(profile).expect("profile slot exists");
            return Ok(slot.entries[idx].loader.as_mut());
        }

        if kind.is_blank() {
            return Err(RegistryError::InvalidLoaderKind(kind.to_string()));
        }
        if kind == LoaderKind::CONTRACT {
            return Err(RegistryError::AbstractLoaderKind(kind.to_string()));
        }

        let slot = self.profiles.entry(profile.to_string()).or_default();
        slot.entries.push(LoaderEntry {
            kind,
            loader: factory.build(),
            last_error: None,
        });
        tracing::info!(profile, kind = %kind, "loader registered");

        let entry = slot.entries.last_mut().expect("entry just pushed");
        Ok(entry.loader.as_mut())
    }

    /// Typed variant of [`get_or_create_dyn`](Self::get_or_create_dyn).
    ///
    /// Fails with [`RegistryError::LoaderKindMismatch`] if the cached
    /// instance under this kind is some other concrete type.
    pub fn get_or_create<L: Loader + 'static>(
        &mut self,
        factory: &LoaderFactory,
        profile: Option<&str>,
    ) -> Result<&mut L> {
        let kind = factory.kind();
        let loader = self.get_or_create_dyn(factory, profile)?;
        loader
            .as_any_mut()
            .downcast_mut::<L>()
            .ok_or_else(|| RegistryError::LoaderKindMismatch {
                kind: kind.to_string(),
                expected: std::any::type_name::<L>(),
            })
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Whether a loader of this kind exists for the profile.
    pub fn contains(&self, kind: LoaderKind, profile: Option<&str>) -> bool {
        self.profiles
            .get(resolve_profile(profile))
            .and_then(|slot| slot.position(kind))
            .is_some()
    }

    /// Borrow a cached loader by kind, downcast to its concrete type.
    pub fn loader<L: Loader + 'static>(
        &self,
        kind: LoaderKind,
        profile: Option<&str>,
    ) -> Option<&L> {
        let slot = self.profiles.get(resolve_profile(profile))?;
        let idx = slot.position(kind)?;
        slot.entries[idx].loader.as_any().downcast_ref::<L>()
    }

    /// Mutably borrow a cached loader by kind, downcast to its concrete type.
    pub fn loader_mut<L: Loader + 'static>(
        &mut self,
        kind: LoaderKind,
        profile: Option<&str>,
    ) -> Option<&mut L> {
        let slot = self.profiles.get_mut(resolve_profile(profile))?;
        let idx = slot.position(kind)?;
        slot.entries[idx].loader.as_any_mut().downcast_mut::<L>()
    }

    /// Kinds registered for a profile, in registration order.
    pub fn loader_kinds(&self, profile: Option<&str>) -> Vec<LoaderKind> {
        self.profiles
            .get(resolve_profile(profile))
            .map(|slot| slot.entries.iter().map(|entry| entry.kind).collect())
            .unwrap_or_default()
    }

    /// Names of every profile that has at least one loader or ran a transaction.
    pub fn profiles(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    /// Lifecycle state of a profile. Unknown profiles are `Registered`.
    pub fn state(&self, profile: Option<&str>) -> ProfileState {
        self.profiles
            .get(resolve_profile(profile))
            .map(|slot| slot.machine.current())
            .unwrap_or_default()
    }

    /// Transition history of a profile, oldest first.
    pub fn state_history(&self, profile: Option<&str>) -> &[StateTransition] {
        self.profiles
            .get(resolve_profile(profile))
            .map(|slot| slot.machine.history())
            .unwrap_or(&[])
    }

    /// The currently active profile, if any.
    pub fn active_profile(&self) -> Option<&str> {
        self.active_profile.as_deref()
    }

    /// Last error a loader raised during any transaction, if any.
    pub fn last_error(&self, kind: LoaderKind, profile: Option<&str>) -> Option<Arc<LoaderError>> {
        let slot = self.profiles.get(resolve_profile(profile))?;
        let idx = slot.position(kind)?;
        slot.entries[idx].last_error.clone()
    }

    // ------------------------------------------------------------------
    // Persistence hook forwarding
    // ------------------------------------------------------------------

    /// Forward the persistence hook to every loader of the profile,
    /// in registration order.
    pub fn save_commands(
        &mut self,
        profile: Option<&str>,
        section: &str,
        commands: &[String],
        addons: &BTreeSet<String>,
    ) {
        if let Some(slot) = self.profiles.get_mut(resolve_profile(profile)) {
            for entry in &mut slot.entries {
                entry.loader.save_commands(section, commands, addons);
            }
        }
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Run a load transaction over every loader of the profile.
    ///
    /// Rejected with [`RegistryError::ProfileActive`] while a different
    /// profile is active, and with [`RegistryError::AlreadyLoaded`] if this
    /// profile already is. A profile with no loaders is a true no-op.
    pub fn load(&mut self, ctx: &mut LoaderContext, profile: Option<&str>) -> Result<()> {
        let profile = resolve_profile(profile).to_string();

        if let Some(active) = &self.active_profile {
            if *active == profile {
                return Err(RegistryError::AlreadyLoaded(profile));
            }
            return Err(RegistryError::ProfileActive {
                active: active.clone(),
                requested: profile,
            });
        }

        if !self.has_loaders(&profile) {
            return Ok(());
        }

        let outcome = self.run_transaction(TransactionPhase::Load, ctx, &profile);
        // Both outcomes are activated states (Loaded / LoadedError).
        self.active_profile = Some(profile);
        outcome
    }

    /// Run an unload transaction over every loader of the profile.
    ///
    /// The profile must be the currently active one, else
    /// [`RegistryError::NotLoaded`].
    pub fn unload(&mut self, ctx: &mut LoaderContext, profile: Option<&str>) -> Result<()> {
        let profile = resolve_profile(profile).to_string();
        self.require_active(&profile)?;

        let outcome = self.run_transaction(TransactionPhase::Unload, ctx, &profile);
        // Both outcomes (Unloaded / UnloadedError) leave the profile deactivated.
        self.active_profile = None;
        outcome
    }

    /// Run a reload transaction over every loader of the profile.
    ///
    /// One transaction over each loader's `reload`, not an unload followed by
    /// a load. Same precondition as [`unload`](Self::unload). The active
    /// marker is unchanged by either outcome.
    pub fn reload(&mut self, ctx: &mut LoaderContext, profile: Option<&str>) -> Result<()> {
        let profile = resolve_profile(profile).to_string();
        self.require_active(&profile)?;

        self.run_transaction(TransactionPhase::Reload, ctx, &profile)
    }

    fn has_loaders(&self, profile: &str) -> bool {
        self.profiles
            .get(profile)
            .is_some_and(|slot| !slot.entries.is_empty())
    }

    fn require_active(&self, profile: &str) -> Result<()> {
        let active = self.active_profile.as_deref() == Some(profile)
            && self.state(Some(profile)).is_active();
        if active {
            Ok(())
        } else {
            Err(RegistryError::NotLoaded(profile.to_string()))
        }
    }

    /// The shared transaction engine.
    ///
    /// Orders the profile's loaders by `(phase priority, insertion sequence)`,
    /// invokes the phase method on each in turn, and aggregates failures
    /// without short-circuiting. Only after every loader has been attempted
    /// does the profile transition to the phase's success or failure state.
    fn run_transaction(
        &mut self,
        phase: TransactionPhase,
        ctx: &mut LoaderContext,
        profile: &str,
    ) -> Result<()> {
        let slot = match self.profiles.get_mut(profile) {
            Some(slot) if !slot.entries.is_empty() => slot,
            _ => return Ok(()),
        };

        let order = schedule::execution_order(
            slot.entries
                .iter()
                .map(|entry| phase.priority_of(entry.loader.as_ref())),
        );

        let mut failures = Vec::new();
        for idx in order {
            let entry = &mut slot.entries[idx];
            tracing::debug!(profile, kind = %entry.kind, phase = %phase, "invoking loader");
            if let Err(error) = phase.invoke(entry.loader.as_mut(), ctx, profile) {
                tracing::warn!(
                    profile,
                    kind = %entry.kind,
                    phase = %phase,
                    error = %error,
                    "loader failed; continuing with remaining loaders"
                );
                let error = Arc::new(error);
                entry.last_error = Some(error.clone());
                failures.push(LoaderFailure {
                    kind: entry.kind.to_string(),
                    error,
                });
            }
        }

        let (on_success, on_failure) = phase.target_states();
        if failures.is_empty() {
            slot.machine
                .transition(on_success, format!("{phase} transaction completed"))?;
            tracing::info!(profile, phase = %phase, "transaction completed");
            Ok(())
        } else {
            slot.machine.transition(
                on_failure,
                format!("{phase} transaction completed with {} failure(s)", failures.len()),
            )?;
            Err(TransactionError { phase, failures }.into())
        }
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`LoaderRegistry`] scoped to one addon.
///
/// Same engine, same semantics; the addon name is carried for logging and for
/// hosts that key their addon directory by it.
pub struct AddonRegistry {
    addon: String,
    inner: LoaderRegistry,
}

impl AddonRegistry {
    /// Create a registry for the named addon.
    pub fn new(addon: impl Into<String>) -> Self {
        let addon = addon.into();
        tracing::debug!(addon = %addon, "addon registry created");
        Self {
            addon,
            inner: LoaderRegistry::new(),
        }
    }

    /// The addon this registry belongs to.
    pub fn addon(&self) -> &str {
        &self.addon
    }

    /// See [`LoaderRegistry::get_or_create_dyn`].
    pub fn get_or_create_dyn(
        &mut self,
        factory: &LoaderFactory,
        profile: Option<&str>,
    ) -> Result<&mut dyn Loader> {
        self.inner.get_or_create_dyn(factory, profile)
    }

    /// See [`LoaderRegistry::get_or_create`].
    pub fn get_or_create<L: Loader + 'static>(
        &mut self,
        factory: &LoaderFactory,
        profile: Option<&str>,
    ) -> Result<&mut L> {
        self.inner.get_or_create(factory, profile)
    }

    /// See [`LoaderRegistry::load`].
    pub fn load(&mut self, ctx: &mut LoaderContext, profile: Option<&str>) -> Result<()> {
        tracing::debug!(addon = %self.addon, "load requested");
        self.inner.load(ctx, profile)
    }

    /// See [`LoaderRegistry::unload`].
    pub fn unload(&mut self, ctx: &mut LoaderContext, profile: Option<&str>) -> Result<()> {
        tracing::debug!(addon = %self.addon, "unload requested");
        self.inner.unload(ctx, profile)
    }

    /// See [`LoaderRegistry::reload`].
    pub fn reload(&mut self, ctx: &mut LoaderContext, profile: Option<&str>) -> Result<()> {
        tracing::debug!(addon = %self.addon, "reload requested");
        self.inner.reload(ctx, profile)
    }

    /// Whether this addon has the named profile.
    pub fn has_profile(&self, profile: &str) -> bool {
        self.inner.profiles.contains_key(profile)
    }

    /// Full registry surface, for inspection.
    pub fn registry(&self) -> &LoaderRegistry {
        &self.inner
    }

    /// Full registry surface, mutable.
    pub fn registry_mut(&mut self) -> &mut LoaderRegistry {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    #[derive(Default)]
    struct Noop;

    impl Loader for Noop {
        fn load(
            &mut self,
            _ctx: &mut LoaderContext,
            _profile: &str,
        ) -> std::result::Result<(), LoaderError> {
            Ok(())
        }

        fn unload(
            &mut self,
            _ctx: &mut LoaderContext,
            _profile: &str,
        ) -> std::result::Result<(), LoaderError> {
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn noop_factory(kind: &'static str) -> LoaderFactory {
        LoaderFactory::new(LoaderKind::new(kind), || Box::<Noop>::default())
    }

    #[test]
    fn test_default_profile_resolution() {
        let mut registry = LoaderRegistry::new();
        registry
            .get_or_create::<Noop>(&noop_factory("noop"), None)
            .unwrap();

        assert!(registry.contains(LoaderKind::new("noop"), Some(DEFAULT_PROFILE)));
        assert_eq!(registry.profiles(), vec![DEFAULT_PROFILE]);
    }

    #[test]
    fn test_unknown_profile_state_is_registered() {
        let registry = LoaderRegistry::new();
        assert_eq!(registry.state(Some("ghost")), ProfileState::Registered);
        assert!(registry.state_history(Some("ghost")).is_empty());
    }

    #[test]
    fn test_empty_profile_load_is_a_noop() {
        let mut registry = LoaderRegistry::new();
        let mut ctx = LoaderContext::new();

        registry.load(&mut ctx, Some("empty")).unwrap();
        assert_eq!(registry.state(Some("empty")), ProfileState::Registered);
        assert_eq!(registry.active_profile(), None);
    }

    #[test]
    fn test_addon_registry_delegates() {
        let mut registry = AddonRegistry::new("modbus");
        let mut ctx = LoaderContext::new();

        registry
            .get_or_create::<Noop>(&noop_factory("noop"), Some("bench"))
            .unwrap();
        registry.load(&mut ctx, Some("bench")).unwrap();

        assert_eq!(registry.addon(), "modbus");
        assert!(registry.has_profile("bench"));
        assert!(!registry.has_profile("field"));
        assert_eq!(registry.registry().state(Some("bench")), ProfileState::Loaded);
    }
}

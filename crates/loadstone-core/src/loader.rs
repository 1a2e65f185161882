//! The loader contract: the unit of extensible setup/teardown behavior.
//!
//! Addons implement [`Loader`] to hook into a registry's lifecycle
//! transactions. The registry caches one instance per `(profile, kind)` pair
//! and drives `load`/`unload`/`reload` in priority order; everything a loader
//! does inside those calls is its own business, carried out against the
//! opaque [`LoaderContext`] it is handed.

use std::any::Any;
use std::collections::BTreeSet;

use crate::context::LoaderContext;
use crate::error::LoaderError;

/// Priority assigned to loaders that do not care about ordering.
///
/// Lower values run first; ties are broken by registration order.
pub const DEFAULT_PRIORITY: i32 = 100;

/// Identity of a loader type within a registry.
///
/// The registry caches at most one loader instance per `(profile, kind)`
/// pair. Kinds are caller-supplied names; a concrete loader type usually
/// publishes its canonical kind as an associated constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoaderKind(&'static str);

impl LoaderKind {
    /// Reserved kind denoting the abstract loader contract itself.
    ///
    /// Never instantiable: a factory carrying this kind is rejected with
    /// [`RegistryError::AbstractLoaderKind`](crate::error::RegistryError).
    pub const CONTRACT: LoaderKind = LoaderKind("loader");

    /// Create a kind from a static name.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Get the kind name.
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Whether the name is empty or whitespace-only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Constructor for a concrete loader kind.
///
/// A factory pairs a [`LoaderKind`] with a closure that builds a fresh
/// instance. The registry invokes the closure at most once per
/// `(profile, kind)` pair; callers configure the returned instance afterwards.
pub struct LoaderFactory {
    kind: LoaderKind,
    build: Box<dyn Fn() -> Box<dyn Loader> + Send + Sync>,
}

impl LoaderFactory {
    /// Create a factory for the given kind.
    pub fn new<F>(kind: LoaderKind, build: F) -> Self
    where
        F: Fn() -> Box<dyn Loader> + Send + Sync + 'static,
    {
        Self {
            kind,
            build: Box::new(build),
        }
    }

    /// The kind this factory constructs.
    pub fn kind(&self) -> LoaderKind {
        self.kind
    }

    /// Build a fresh loader instance.
    pub(crate) fn build(&self) -> Box<dyn Loader> {
        (self.build)()
    }
}

impl std::fmt::Debug for LoaderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderFactory")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Contract implemented by every loader.
///
/// `load` and `unload` carry the loader's setup and teardown. `reload`
/// defaults to unload-then-load and may be overridden by loaders that can do
/// better. Side effects are entirely the loader's responsibility; the
/// registry never inspects them, it only sequences the calls and captures
/// failures.
pub trait Loader: Send {
    /// Activate this loader for `profile`.
    fn load(&mut self, ctx: &mut LoaderContext, profile: &str) -> Result<(), LoaderError>;

    /// Deactivate this loader for `profile`.
    fn unload(&mut self, ctx: &mut LoaderContext, profile: &str) -> Result<(), LoaderError>;

    /// Re-activate this loader for `profile`. Default: unload, then load.
    fn reload(&mut self, ctx: &mut LoaderContext, profile: &str) -> Result<(), LoaderError> {
        self.unload(ctx, profile)?;
        self.load(ctx, profile)
    }

    /// Scheduling priority for load transactions. Lower runs first.
    fn load_priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// Scheduling priority for unload transactions. Lower runs first.
    ///
    /// Computed independently from the load priority; unload order is never
    /// derived from load order.
    fn unload_priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// Persistence hook: accumulate replayable command text.
    ///
    /// A no-op by default. Persistence-aware loaders override this to record
    /// the commands; others that want to feed a persistence loader hold an
    /// explicit handle to its accumulator instead of chaining through here.
    fn save_commands(&mut self, section: &str, commands: &[String], addons: &BTreeSet<String>) {
        let _ = (section, commands, addons);
    }

    /// Downcast support for typed registry accessors.
    fn as_any(&self) -> &dyn Any;

    /// Downcast support for typed registry accessors.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counting {
        loads: usize,
        unloads: usize,
    }

    impl Loader for Counting {
        fn load(&mut self, _ctx: &mut LoaderContext, _profile: &str) -> Result<(), LoaderError> {
            self.loads += 1;
            Ok(())
        }

        fn unload(&mut self, _ctx: &mut LoaderContext, _profile: &str) -> Result<(), LoaderError> {
            self.unloads += 1;
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_default_reload_is_unload_then_load() {
        let mut ctx = LoaderContext::new();
        let mut loader = Counting::default();

        loader.reload(&mut ctx, "default").unwrap();
        assert_eq!(loader.unloads, 1);
        assert_eq!(loader.loads, 1);
    }

    #[test]
    fn test_default_priorities() {
        let loader = Counting::default();
        assert_eq!(loader.load_priority(), DEFAULT_PRIORITY);
        assert_eq!(loader.unload_priority(), DEFAULT_PRIORITY);
    }

    #[test]
    fn test_kind_blank_detection() {
        assert!(LoaderKind::new("").is_blank());
        assert!(LoaderKind::new("   ").is_blank());
        assert!(!LoaderKind::new("dependency").is_blank());
    }

    #[test]
    fn test_contract_kind_equality() {
        assert_eq!(LoaderKind::new("loader"), LoaderKind::CONTRACT);
        assert_ne!(LoaderKind::new("dependency"), LoaderKind::CONTRACT);
    }
}

//! Dependency-validating loader.
//!
//! An addon declares the other addons (and optionally which of their
//! profiles) it needs. On load, every declared pair is checked against the
//! host's [`AddonDirectory`](loadstone_core::AddonDirectory); failures are
//! aggregated so one missing addon never hides another. Presence is all that
//! is verified, never transitive activation.

use std::any::Any;

use loadstone_core::{
    Loader, LoaderContext, LoaderError, LoaderFactory, LoaderKind, DEFAULT_PRIORITY,
    DEFAULT_PROFILE,
};

/// One declared dependency: an addon name and, optionally, which of its
/// profiles must exist. `None` means the reserved default profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Name of the required addon.
    pub addon: String,
    /// Required profile of that addon, or `None` for the default profile.
    pub profile: Option<String>,
}

/// Loader that validates declared inter-addon dependencies on load.
#[derive(Debug, Default)]
pub struct DependencyLoader {
    requirements: Vec<Requirement>,
}

impl DependencyLoader {
    /// Canonical kind under which this loader registers.
    pub const KIND: LoaderKind = LoaderKind::new("dependency");

    /// Dependency checks run before ordinary loaders.
    pub const LOAD_PRIORITY: i32 = 20;

    /// Create an empty dependency loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory for registry registration.
    pub fn factory() -> LoaderFactory {
        LoaderFactory::new(Self::KIND, || Box::new(Self::new()))
    }

    /// Declare a dependency on `addon`, optionally on a specific profile.
    pub fn require(&mut self, addon: impl Into<String>, profile: Option<&str>) -> &mut Self {
        self.requirements.push(Requirement {
            addon: addon.into(),
            profile: profile.map(str::to_string),
        });
        self
    }

    /// The declared requirements, in declaration order.
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }
}

impl Loader for DependencyLoader {
    fn load(&mut self, ctx: &mut LoaderContext, _profile: &str) -> Result<(), LoaderError> {
        let mut unsatisfied = Vec::new();

        for req in &self.requirements {
            if !ctx.addons().contains(&req.addon) {
                unsatisfied.push(format!("addon `{}` is not registered", req.addon));
                continue;
            }
            let sub_profile = req.profile.as_deref().unwrap_or(DEFAULT_PROFILE);
            if !ctx.addons().has_profile(&req.addon, sub_profile) {
                unsatisfied.push(format!(
                    "addon `{}` has no profile `{}`",
                    req.addon, sub_profile
                ));
            }
        }

        if unsatisfied.is_empty() {
            Ok(())
        } else {
            tracing::warn!(
                count = unsatisfied.len(),
                "unsatisfied addon dependencies"
            );
            Err(LoaderError::Dependency(unsatisfied.join("; ")))
        }
    }

    fn unload(&mut self, _ctx: &mut LoaderContext, _profile: &str) -> Result<(), LoaderError> {
        // Nothing to tear down; declarations persist across transactions.
        Ok(())
    }

    fn load_priority(&self) -> i32 {
        Self::LOAD_PRIORITY
    }

    fn unload_priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadstone_core::TableDirectory;

    #[test]
    fn test_require_accumulates_in_order() {
        let mut loader = DependencyLoader::new();
        loader.require("modbus", None).require("canbus", Some("bench"));

        assert_eq!(loader.requirements().len(), 2);
        assert_eq!(loader.requirements()[0].addon, "modbus");
        assert_eq!(loader.requirements()[0].profile, None);
        assert_eq!(loader.requirements()[1].profile.as_deref(), Some("bench"));
    }

    #[test]
    fn test_load_passes_when_directory_satisfies_all_pairs() {
        let mut dir = TableDirectory::new();
        dir.insert("modbus", ["default"]);
        dir.insert("canbus", ["bench"]);
        let mut ctx = LoaderContext::new().with_addons(dir);

        let mut loader = DependencyLoader::new();
        loader.require("modbus", None).require("canbus", Some("bench"));

        assert!(loader.load(&mut ctx, "default").is_ok());
    }

    #[test]
    fn test_load_aggregates_one_failure_per_pair() {
        let mut dir = TableDirectory::new();
        dir.insert("modbus", ["default"]);
        let mut ctx = LoaderContext::new().with_addons(dir);

        let mut loader = DependencyLoader::new();
        loader
            .require("modbus", None) // satisfied
            .require("canbus", None) // missing addon
            .require("modbus", Some("bench")); // missing profile

        let err = loader.load(&mut ctx, "default").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("`canbus` is not registered"));
        assert!(msg.contains("`modbus` has no profile `bench`"));
    }

    #[test]
    fn test_missing_sub_profile_defaults_to_default_profile() {
        let mut dir = TableDirectory::new();
        dir.insert("modbus", ["bench"]); // no "default" profile
        let mut ctx = LoaderContext::new().with_addons(dir);

        let mut loader = DependencyLoader::new();
        loader.require("modbus", None);

        let err = loader.load(&mut ctx, "default").unwrap_err();
        assert!(err.to_string().contains("no profile `default`"));
    }

    #[test]
    fn test_unload_is_a_noop() {
        let mut ctx = LoaderContext::new();
        let mut loader = DependencyLoader::new();
        loader.require("anything", None);
        assert!(loader.unload(&mut ctx, "default").is_ok());
    }
}

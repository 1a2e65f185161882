//! The opaque context handle threaded through loader calls.
//!
//! The registry never inspects a [`LoaderContext`]; it forwards it unmodified
//! into every `load`/`unload`/`reload` call. Loaders use it to reach the
//! host's collaborators: a configuration bag, the addon directory consumed by
//! dependency validation, and the script runner used for persistence replay.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::error::LoaderError;

/// Presence view over the host's addon table.
///
/// Consumed by dependency-validating loaders; only presence lookups are
/// required, never transitive activation state.
pub trait AddonDirectory: Send {
    /// Whether an addon with this name is registered at all.
    fn contains(&self, addon: &str) -> bool;

    /// Whether the named addon has the named profile.
    fn has_profile(&self, addon: &str, profile: &str) -> bool;
}

/// Executes one persisted script statement against the host.
pub trait ScriptRunner: Send {
    /// Run a single script line.
    fn run_line(&mut self, line: &str) -> Result<(), LoaderError>;
}

/// Directory that knows no addons. The default for a bare context.
#[derive(Debug, Default)]
pub struct NullDirectory;

impl AddonDirectory for NullDirectory {
    fn contains(&self, _addon: &str) -> bool {
        false
    }

    fn has_profile(&self, _addon: &str, _profile: &str) -> bool {
        false
    }
}

/// Runner that accepts and discards every line. The default for a bare context.
#[derive(Debug, Default)]
pub struct NullRunner;

impl ScriptRunner for NullRunner {
    fn run_line(&mut self, _line: &str) -> Result<(), LoaderError> {
        Ok(())
    }
}

/// In-memory addon directory backed by a name -> profile-set table.
#[derive(Debug, Default)]
pub struct TableDirectory {
    table: HashMap<String, HashSet<String>>,
}

impl TableDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an addon together with its profile names.
    pub fn insert<I, S>(&mut self, addon: impl Into<String>, profiles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table
            .entry(addon.into())
            .or_default()
            .extend(profiles.into_iter().map(Into::into));
    }
}

impl AddonDirectory for TableDirectory {
    fn contains(&self, addon: &str) -> bool {
        self.table.contains_key(addon)
    }

    fn has_profile(&self, addon: &str, profile: &str) -> bool {
        self.table
            .get(addon)
            .is_some_and(|profiles| profiles.contains(profile))
    }
}

/// Opaque handle passed unmodified into every loader call.
pub struct LoaderContext {
    settings: Map<String, Value>,
    addons: Box<dyn AddonDirectory>,
    scripts: Box<dyn ScriptRunner>,
}

impl LoaderContext {
    /// Create a bare context with empty settings and null collaborators.
    pub fn new() -> Self {
        Self {
            settings: Map::new(),
            addons: Box::new(NullDirectory),
            scripts: Box::new(NullRunner),
        }
    }

    /// Attach an addon directory.
    pub fn with_addons(mut self, addons: impl AddonDirectory + 'static) -> Self {
        self.addons = Box::new(addons);
        self
    }

    /// Attach a script runner.
    pub fn with_scripts(mut self, scripts: impl ScriptRunner + 'static) -> Self {
        self.scripts = Box::new(scripts);
        self
    }

    /// Set a configuration value.
    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Look up a configuration value.
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// The addon directory.
    pub fn addons(&self) -> &dyn AddonDirectory {
        self.addons.as_ref()
    }

    /// The script runner.
    pub fn scripts_mut(&mut self) -> &mut dyn ScriptRunner {
        self.scripts.as_mut()
    }
}

impl Default for LoaderContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_directory_lookups() {
        let mut dir = TableDirectory::new();
        dir.insert("modbus", ["default", "bench"]);

        assert!(dir.contains("modbus"));
        assert!(!dir.contains("canbus"));
        assert!(dir.has_profile("modbus", "bench"));
        assert!(!dir.has_profile("modbus", "field"));
        assert!(!dir.has_profile("canbus", "default"));
    }

    #[test]
    fn test_context_settings() {
        let ctx = LoaderContext::new().with_setting("save_dir", json!("/tmp/scripts"));
        assert_eq!(ctx.setting("save_dir"), Some(&json!("/tmp/scripts")));
        assert_eq!(ctx.setting("missing"), None);
    }

    #[test]
    fn test_null_collaborators() {
        let mut ctx = LoaderContext::new();
        assert!(!ctx.addons().contains("anything"));
        assert!(ctx.scripts_mut().run_line("addon load x").is_ok());
    }
}

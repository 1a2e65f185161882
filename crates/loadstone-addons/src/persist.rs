//! Script persistence and replay loader.
//!
//! [`ScriptFileLoader`] accumulates replayable command text through the
//! `save_commands` hook, writes it to a profile-scoped script file on unload,
//! and replays a pre-existing file line by line on load. Individual replay
//! line failures are logged and tolerated; the replay never aborts.
//!
//! The accumulator is a cloneable [`CommandLog`] handle: loaders that want
//! their commands persisted hold a clone instead of forwarding through an
//! ancestor chain.

use std::any::Any;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use loadstone_core::{Loader, LoaderContext, LoaderError, LoaderFactory, LoaderKind};

/// File extension of persisted profile scripts.
pub const SCRIPT_EXTENSION: &str = "loadout";

#[derive(Debug, Default)]
struct LogInner {
    /// Sections in first-seen order, each holding its command lines in
    /// accumulation order.
    sections: Vec<(String, Vec<String>)>,
    /// Addons that produced the accumulated commands.
    addons: BTreeSet<String>,
}

/// Shared, ordered accumulator of replayable command text.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    inner: Arc<Mutex<LogInner>>,
}

impl CommandLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append commands under a section, noting the addons that produced them.
    pub fn record(&self, section: &str, commands: &[String], addons: &BTreeSet<String>) {
        let mut inner = self.inner.lock();
        let idx = match inner.sections.iter().position(|(name, _)| name == section) {
            Some(idx) => idx,
            None => {
                inner.sections.push((section.to_string(), Vec::new()));
                inner.sections.len() - 1
            }
        };
        inner.sections[idx].1.extend(commands.iter().cloned());
        inner.addons.extend(addons.iter().cloned());
    }

    /// Whether nothing has been accumulated.
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.sections.iter().all(|(_, lines)| lines.is_empty()) && inner.addons.is_empty()
    }

    /// Discard everything accumulated so far.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.sections.clear();
        inner.addons.clear();
    }

    /// Render the script text: one `addon load <name>` line per accumulated
    /// addon, then every command line, sections in first-seen order.
    pub fn render(&self) -> String {
        let inner = self.inner.lock();
        let mut out = String::new();
        for addon in &inner.addons {
            out.push_str("addon load ");
            out.push_str(addon);
            out.push('\n');
        }
        for (_, lines) in &inner.sections {
            for line in lines {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}

/// Loader that persists accumulated commands on unload and replays the
/// persisted script on load.
#[derive(Debug)]
pub struct ScriptFileLoader {
    dir: PathBuf,
    log: CommandLog,
    save_enabled: bool,
}

impl ScriptFileLoader {
    /// Canonical kind under which this loader registers.
    pub const KIND: LoaderKind = LoaderKind::new("script-file");

    /// Replay runs after ordinary loaders have set up their commands.
    pub const LOAD_PRIORITY: i32 = 200;

    /// The snapshot is written before ordinary loaders tear down.
    pub const UNLOAD_PRIORITY: i32 = 20;

    /// Create a loader persisting under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            log: CommandLog::new(),
            save_enabled: true,
        }
    }

    /// Factory for registry registration. The fresh instance persists under
    /// the current directory until [`set_dir`](Self::set_dir) is called.
    pub fn factory() -> LoaderFactory {
        LoaderFactory::new(Self::KIND, || Box::new(Self::new(".")))
    }

    /// Change the directory scripts are persisted under.
    pub fn set_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.dir = dir.into();
        self
    }

    /// Enable or disable writing the script on unload.
    pub fn set_save(&mut self, enabled: bool) -> &mut Self {
        self.save_enabled = enabled;
        self
    }

    /// A cloneable handle to the accumulator, for loaders that want their
    /// commands persisted.
    pub fn command_log(&self) -> CommandLog {
        self.log.clone()
    }

    /// The profile-scoped script path.
    pub fn script_path(&self, profile: &str) -> PathBuf {
        self.dir.join(format!("{profile}.{SCRIPT_EXTENSION}"))
    }

    fn replay(&self, path: &Path, ctx: &mut LoaderContext) -> Result<(), LoaderError> {
        let text = fs::read_to_string(path)?;
        let mut replayed = 0usize;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Err(error) = ctx.scripts_mut().run_line(line) {
                tracing::warn!(
                    path = %path.display(),
                    line,
                    error = %error,
                    "script line failed; continuing replay"
                );
            }
            replayed += 1;
        }
        tracing::info!(path = %path.display(), lines = replayed, "script replayed");
        Ok(())
    }
}

impl Loader for ScriptFileLoader {
    fn load(&mut self, ctx: &mut LoaderContext, profile: &str) -> Result<(), LoaderError> {
        let path = self.script_path(profile);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no script to replay");
            return Ok(());
        }
        self.replay(&path, ctx)
    }

    fn unload(&mut self, _ctx: &mut LoaderContext, profile: &str) -> Result<(), LoaderError> {
        if !self.save_enabled {
            tracing::debug!(profile, "script saving disabled");
            return Ok(());
        }
        if self.log.is_empty() {
            // Never clobber a previous session's script with nothing.
            tracing::debug!(profile, "no commands accumulated");
            return Ok(());
        }

        let path = self.script_path(profile);
        fs::write(&path, self.log.render()).map_err(|err| {
            LoaderError::Persistence(format!("failed to write {}: {err}", path.display()))
        })?;
        tracing::info!(path = %path.display(), "script saved");
        Ok(())
    }

    fn load_priority(&self) -> i32 {
        Self::LOAD_PRIORITY
    }

    fn unload_priority(&self) -> i32 {
        Self::UNLOAD_PRIORITY
    }

    fn save_commands(&mut self, section: &str, commands: &[String], addons: &BTreeSet<String>) {
        self.log.record(section, commands, addons);
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

    fn set_of(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_render_addon_lines_before_commands() {
        let log = CommandLog::new();
        log.record(
            "io",
            &["set pin 3 high".to_string()],
            &set_of(&["gpio"]),
        );
        log.record(
            "net",
            &["open tcp 192.168.0.7:502".to_string()],
            &set_of(&["modbus"]),
        );

        let text = log.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "addon load gpio",
                "addon load modbus",
                "set pin 3 high",
                "open tcp 192.168.0.7:502",
            ]
        );
    }

    #[test]
    fn test_record_appends_within_existing_section() {
        let log = CommandLog::new();
        log.record("io", &["a".to_string()], &set_of(&["x"]));
        log.record("net", &["b".to_string()], &set_of(&["x"]));
        log.record("io", &["c".to_string()], &set_of(&["x"]));

        let lines: Vec<String> = log.render().lines().map(str::to_string).collect();
        // Sections render in first-seen order: io (a, c), then net (b).
        assert_eq!(lines, vec!["addon load x", "a", "c", "b"]);
    }

    #[test]
    fn test_empty_and_clear() {
        let log = CommandLog::new();
        assert!(log.is_empty());
        log.record("io", &["a".to_string()], &set_of(&[]));
        assert!(!log.is_empty());
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_script_path_is_profile_scoped() {
        let loader = ScriptFileLoader::new("/var/lib/loadstone");
        assert_eq!(
            loader.script_path("bench"),
            PathBuf::from("/var/lib/loadstone/bench.loadout")
        );
    }
}

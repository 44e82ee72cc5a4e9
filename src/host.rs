//! Host environment facade
//!
//! Everything the engine needs to know about the machine it is installing
//! onto, gathered behind one object that is passed explicitly to the
//! condition evaluator, the variable expander and the actions:
//!
//! - known folders (desktop, start menu, program files, system root, temp)
//! - the registry hive
//! - the process-scope environment overlay
//! - the source root that relative source paths resolve against
//! - whether the run has administrator (root) privileges
//!
//! Tests build a `Host` rooted in a temporary directory with an in-memory
//! registry, so no test touches the real machine.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::registry::{FileRegistry, Registry};

/// Well-known install locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownFolders {
    pub desktop: PathBuf,
    pub start_menu: PathBuf,
    pub program_files: PathBuf,
    pub system_root: PathBuf,
    pub temp: PathBuf,
}

impl KnownFolders {
    /// Detect folders for the current user.
    ///
    /// Missing XDG directories fall back to paths under the home directory.
    pub fn detect() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
        let data = dirs::data_dir().unwrap_or_else(|| home.join(".local/share"));

        Self {
            desktop: dirs::desktop_dir().unwrap_or_else(|| home.join("Desktop")),
            start_menu: data.join("applications"),
            program_files: PathBuf::from("/opt"),
            system_root: PathBuf::from("/usr"),
            temp: std::env::temp_dir(),
        }
    }

    /// All folders below `base` (sandboxed runs and tests)
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            desktop: base.join("Desktop"),
            start_menu: base.join("StartMenu"),
            program_files: base.join("ProgramFiles"),
            system_root: base.join("System"),
            temp: base.join("Temp"),
        }
    }
}

/// Default location of the persistent registry hive
pub fn default_registry_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("setup-engine")
        .join("registry.json")
}

/// Machine-facing services shared by the evaluator, expander and actions
pub struct Host {
    registry: Arc<dyn Registry>,
    folders: KnownFolders,
    /// Process-scope variables set during this run
    environment: Mutex<BTreeMap<String, String>>,
    source_root: PathBuf,
    elevated: bool,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("folders", &self.folders)
            .field("source_root", &self.source_root)
            .field("elevated", &self.elevated)
            .finish_non_exhaustive()
    }
}

impl Host {
    pub fn new(registry: Arc<dyn Registry>, folders: KnownFolders, source_root: PathBuf) -> Self {
        Self {
            registry,
            folders,
            environment: Mutex::new(BTreeMap::new()),
            source_root,
            elevated: nix::unistd::geteuid().is_root(),
        }
    }

    /// Host for the real machine with the registry hive at `registry_path`
    pub fn detect(source_root: PathBuf, registry_path: &Path) -> Result<Self> {
        let registry = FileRegistry::open(registry_path)?;
        Ok(Self::new(
            Arc::new(registry),
            KnownFolders::detect(),
            source_root,
        ))
    }

    /// Fully sandboxed host: folders under `base`, in-memory registry.
    /// Counts as elevated since nothing outside `base` is touched.
    pub fn sandboxed(base: &Path) -> Self {
        Self::new(
            Arc::new(FileRegistry::in_memory()),
            KnownFolders::rooted_at(base),
            base.to_path_buf(),
        )
        .with_elevated(true)
    }

    pub fn with_elevated(mut self, elevated: bool) -> Self {
        self.elevated = elevated;
        self
    }

    /// True when running with administrator (root) privileges
    pub fn is_elevated(&self) -> bool {
        self.elevated
    }

    pub fn registry(&self) -> &dyn Registry {
        self.registry.as_ref()
    }

    pub fn folders(&self) -> &KnownFolders {
        &self.folders
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Resolve a relative source path against the source root
    pub fn resolve_source(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.source_root.join(path)
        }
    }

    /// Set a variable visible to this run and every process it spawns
    pub fn set_process_env(&self, name: &str, value: &str) {
        self.overlay().insert(name.to_string(), value.to_string());
    }

    /// Look up an environment variable, overlay first
    pub fn env_var(&self, name: &str) -> Option<String> {
        if let Some(value) = self.overlay().get(name) {
            return Some(value.clone());
        }
        std::env::var(name).ok()
    }

    /// Snapshot of the overlay for spawning child processes
    pub fn process_environment(&self) -> BTreeMap<String, String> {
        self.overlay().clone()
    }

    fn overlay(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.environment
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Free bytes on the filesystem that would hold `path`.
    ///
    /// Walks up to the nearest existing ancestor, since the install
    /// directory usually does not exist yet.
    pub fn available_space(&self, path: &Path) -> Result<u64> {
        let mut existing = path;
        while !existing.exists() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => break,
            }
        }

        let stats = nix::sys::statvfs::statvfs(existing)
            .map_err(std::io::Error::from)?;
        Ok(stats.blocks_available() as u64 * stats.fragment_size() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandboxed_folders() {
        let dir = tempfile::tempdir().unwrap();
        let host = Host::sandboxed(dir.path());

        assert_eq!(host.folders().desktop, dir.path().join("Desktop"));
        assert_eq!(host.source_root(), dir.path());
        assert_eq!(host.resolve_source("bin/app"), dir.path().join("bin/app"));
        assert_eq!(host.resolve_source("/usr/bin/env"), PathBuf::from("/usr/bin/env"));
    }

    #[test]
    fn test_sandboxed_host_is_elevated_unless_overridden() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Host::sandboxed(dir.path()).is_elevated());
        assert!(!Host::sandboxed(dir.path()).with_elevated(false).is_elevated());
    }

    #[test]
    fn test_overlay_shadows_process_environment() {
        let dir = tempfile::tempdir().unwrap();
        let host = Host::sandboxed(dir.path());

        assert_eq!(host.env_var("SETUP_ENGINE_TEST_UNSET_VAR"), None);
        host.set_process_env("SETUP_ENGINE_TEST_UNSET_VAR", "1");
        assert_eq!(
            host.env_var("SETUP_ENGINE_TEST_UNSET_VAR").as_deref(),
            Some("1")
        );
        assert_eq!(host.process_environment().len(), 1);
    }

    #[test]
    fn test_available_space_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let host = Host::sandboxed(dir.path());

        let space = host
            .available_space(&dir.path().join("not/yet/created"))
            .unwrap();
        assert!(space > 0);
    }

    #[test]
    fn test_detect_known_folders() {
        let folders = KnownFolders::detect();
        assert_eq!(folders.program_files, PathBuf::from("/opt"));
        assert!(folders.start_menu.ends_with("applications"));
    }
}

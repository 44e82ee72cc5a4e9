//! Registry abstraction
//!
//! Registry commands, registry conditions, file associations and persistent
//! environment variables all go through the [`Registry`] trait. The bundled
//! [`FileRegistry`] keeps a hierarchical key/value hive in a JSON file (or in
//! memory), which gives the same semantics on every host:
//!
//! - key paths use `\` (or `/`) separators and compare case-insensitively
//! - writing a value creates the key and all of its ancestors
//! - deleting a key removes all of its subkeys
//!
//! Each mutation is flushed to disk before the call returns, so no open
//! handle outlives the command that issued it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, SetupError};
use crate::types::{RegistryRoot, RegistryValueKind};

/// A typed registry value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RegistryValue {
    String(String),
    ExpandString(String),
    Dword(u32),
    Qword(u64),
    Binary(Vec<u8>),
}

impl RegistryValue {
    /// Parse the textual form used in setup documents.
    ///
    /// Integers accept decimal or `0x` hex; binary data is a hex string with
    /// optional space, comma or dash separators.
    pub fn parse(kind: RegistryValueKind, text: &str) -> Result<Self> {
        let invalid = |what: &str| {
            SetupError::validation(format!("Invalid {} registry value '{}'", what, text))
        };
        match kind {
            RegistryValueKind::String => Ok(Self::String(text.to_string())),
            RegistryValueKind::ExpandString => Ok(Self::ExpandString(text.to_string())),
            RegistryValueKind::Dword => parse_integer(text)
                .and_then(|v| u32::try_from(v).ok())
                .map(Self::Dword)
                .ok_or_else(|| invalid("dword")),
            RegistryValueKind::Qword => parse_integer(text)
                .map(Self::Qword)
                .ok_or_else(|| invalid("qword")),
            RegistryValueKind::Binary => parse_hex_bytes(text)
                .map(Self::Binary)
                .ok_or_else(|| invalid("binary")),
        }
    }
}

impl fmt::Display for RegistryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) | Self::ExpandString(s) => write!(f, "{}", s),
            Self::Dword(v) => write!(f, "{}", v),
            Self::Qword(v) => write!(f, "{}", v),
            Self::Binary(bytes) => {
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

fn parse_integer(text: &str) -> Option<u64> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn parse_hex_bytes(text: &str) -> Option<Vec<u8>> {
    let digits: String = text
        .chars()
        .filter(|c| !matches!(c, ' ' | ',' | '-'))
        .collect();
    if digits.len() % 2 != 0 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

/// Hierarchical key/value store
pub trait Registry: Send + Sync {
    /// Returns true if the key exists; errors count as "does not exist"
    fn key_exists(&self, root: RegistryRoot, key_path: &str) -> bool;

    fn get_value(&self, root: RegistryRoot, key_path: &str, name: &str) -> Option<RegistryValue>;

    /// Write a value, creating the key (and its ancestors) when missing.
    /// An empty `name` addresses the key's default value.
    fn set_value(
        &self,
        root: RegistryRoot,
        key_path: &str,
        name: &str,
        value: RegistryValue,
    ) -> Result<()>;

    /// Returns false when the value did not exist
    fn delete_value(&self, root: RegistryRoot, key_path: &str, name: &str) -> Result<bool>;

    /// Delete a key and all its subkeys; returns false when the key did not exist
    fn delete_key(&self, root: RegistryRoot, key_path: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredKey {
    /// Path as first written (display only)
    path: String,
    /// Lowercased name → (original name, value)
    values: BTreeMap<String, (String, RegistryValue)>,
}

type Hive = BTreeMap<RegistryRoot, BTreeMap<String, StoredKey>>;

/// JSON-backed registry hive
#[derive(Debug)]
pub struct FileRegistry {
    path: Option<PathBuf>,
    hive: Mutex<Hive>,
}

impl FileRegistry {
    /// A registry that lives only for this process
    pub fn in_memory() -> Self {
        Self {
            path: None,
            hive: Mutex::new(Hive::new()),
        }
    }

    /// Open (or lazily create) a hive file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let hive = if path.is_file() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|e| {
                SetupError::config(format!("Corrupt registry hive {:?}: {}", path, e))
            })?
        } else {
            Hive::new()
        };
        tracing::debug!("Opened registry hive {:?}", path);
        Ok(Self {
            path: Some(path),
            hive: Mutex::new(hive),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Hive> {
        self.hive.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn flush(&self, hive: &Hive) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(hive)?)?;
        Ok(())
    }
}

/// Normalize separators and case; returns the segments of the path
fn segments(key_path: &str) -> Vec<String> {
    key_path
        .split(['\\', '/'])
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .collect()
}

fn normalize(key_path: &str) -> String {
    segments(key_path).join("\\")
}

impl Registry for FileRegistry {
    fn key_exists(&self, root: RegistryRoot, key_path: &str) -> bool {
        let key = normalize(key_path);
        if key.is_empty() {
            return true;
        }
        self.lock()
            .get(&root)
            .is_some_and(|keys| keys.contains_key(&key))
    }

    fn get_value(&self, root: RegistryRoot, key_path: &str, name: &str) -> Option<RegistryValue> {
        let key = normalize(key_path);
        self.lock()
            .get(&root)
            .and_then(|keys| keys.get(&key))
            .and_then(|stored| stored.values.get(&name.to_ascii_lowercase()))
            .map(|(_, value)| value.clone())
    }

    fn set_value(
        &self,
        root: RegistryRoot,
        key_path: &str,
        name: &str,
        value: RegistryValue,
    ) -> Result<()> {
        let parts = segments(key_path);
        if parts.is_empty() {
            return Err(SetupError::validation("Registry key path must not be empty"));
        }

        let mut hive = self.lock();
        let keys = hive.entry(root).or_default();

        // Create ancestors
        let original: Vec<&str> = key_path.split(['\\', '/']).filter(|s| !s.is_empty()).collect();
        for depth in 1..=parts.len() {
            keys.entry(parts[..depth].join("\\"))
                .or_insert_with(|| StoredKey {
                    path: original[..depth].join("\\"),
                    values: BTreeMap::new(),
                });
        }

        if let Some(stored) = keys.get_mut(&parts.join("\\")) {
            stored
                .values
                .insert(name.to_ascii_lowercase(), (name.to_string(), value));
        }

        self.flush(&hive)
    }

    fn delete_value(&self, root: RegistryRoot, key_path: &str, name: &str) -> Result<bool> {
        let key = normalize(key_path);
        let mut hive = self.lock();
        let removed = hive
            .get_mut(&root)
            .and_then(|keys| keys.get_mut(&key))
            .and_then(|stored| stored.values.remove(&name.to_ascii_lowercase()))
            .is_some();
        if removed {
            self.flush(&hive)?;
        }
        Ok(removed)
    }

    fn delete_key(&self, root: RegistryRoot, key_path: &str) -> Result<bool> {
        let key = normalize(key_path);
        if key.is_empty() {
            return Err(SetupError::validation("Refusing to delete a registry root"));
        }
        let prefix = format!("{}\\", key);

        let mut hive = self.lock();
        let Some(keys) = hive.get_mut(&root) else {
            return Ok(false);
        };
        let before = keys.len();
        keys.retain(|k, _| *k != key && !k.starts_with(&prefix));
        let removed = keys.len() != before;
        if removed {
            self.flush(&hive)?;
        }
        Ok(removed)
    }
}

//! Setup document: the immutable configuration model.
//!
//! The document is JSON and is loaded once per process. Command parameters are
//! a closed, tagged set of typed records, so a malformed parameter block is a
//! configuration error at load time instead of a failure halfway through an
//! installation.
//!
//! ```json
//! {
//!   "application": { "name": "Demo", "version": "1.0.0" },
//!   "components": [{
//!     "id": "core",
//!     "name": "Core files",
//!     "required": true,
//!     "commands": [{
//!       "id": "copy-core",
//!       "type": "copy_directory",
//!       "parameters": { "source": "bin", "destination": "{InstallPath}" }
//!     }]
//!   }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SetupError};
use crate::types::{
    Architecture, CommandKind, CommandTiming, EnvironmentTarget, PageType, RegistryRoot,
    RegistryValueKind,
};

/// File names searched by [`SetupDefinition::discover`], in order
pub const DOCUMENT_SEARCH_PATHS: &[&str] = &["setup.json", "config/setup.json"];

fn default_true() -> bool {
    true
}

fn default_unit_directory() -> String {
    "/etc/systemd/system".to_string()
}

// ============================================================================
// Document root
// ============================================================================

/// Complete description of an installable product
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupDefinition {
    pub application: AppInfo,
    pub global_settings: GlobalSettings,
    /// Per-architecture overrides of `global_settings`
    pub architecture_settings: BTreeMap<Architecture, ArchitectureSettings>,
    /// `None` when no license page is needed
    pub license: Option<LicenseInfo>,
    pub components: Vec<Component>,
    pub pages: Vec<PageDefinition>,
    /// Commands that run regardless of component selection
    pub global_commands: Vec<Command>,
    /// Author variables usable as `{Key}` placeholders
    pub variables: BTreeMap<String, String>,
    /// Directory of the loaded document (relative paths resolve against it)
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl SetupDefinition {
    /// Parse a setup document from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let definition: Self = serde_json::from_str(json)
            .map_err(|e| SetupError::config(format!("Failed to parse setup document: {}", e)))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Load a setup document from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            SetupError::config(format!("Failed to read setup document {:?}: {}", path, e))
        })?;

        let mut definition = Self::from_json_str(&content)?;
        definition.base_dir = path.parent().map(Path::to_path_buf);

        tracing::info!(
            "Loaded setup document {:?}: {} {} ({} components, {} global commands)",
            path,
            definition.application.name,
            definition.application.version,
            definition.components.len(),
            definition.global_commands.len()
        );

        Ok(definition)
    }

    /// Find and load the setup document inside `dir`.
    ///
    /// Absence of a document is fatal for the caller.
    pub fn discover<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        for candidate in DOCUMENT_SEARCH_PATHS {
            let path = dir.join(candidate);
            if path.is_file() {
                return Self::load_from_file(path);
            }
        }
        Err(SetupError::config(format!(
            "No setup document found in {:?} (looked for {})",
            dir,
            DOCUMENT_SEARCH_PATHS.join(", ")
        )))
    }

    /// Save the document as pretty JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        Ok(())
    }

    /// Structural validation performed on every load
    pub fn validate(&self) -> Result<()> {
        if self.application.name.trim().is_empty() {
            return Err(SetupError::config("Application name must be specified"));
        }

        let mut component_ids = HashSet::new();
        for component in &self.components {
            if component.id.trim().is_empty() {
                return Err(SetupError::config(format!(
                    "Component '{}' has an empty id",
                    component.name
                )));
            }
            if !component_ids.insert(component.id.as_str()) {
                return Err(SetupError::config(format!(
                    "Duplicate component id '{}'",
                    component.id
                )));
            }

            validate_command_list(&component.commands, &component.id)?;
            for (arch, overrides) in &component.architecture_overrides {
                let scope = format!("{} ({})", component.id, arch);
                if let Some(commands) = &overrides.additional_commands {
                    validate_command_list(commands, &scope)?;
                }
                if let Some(commands) = &overrides.replacement_commands {
                    validate_command_list(commands, &scope)?;
                }
            }
        }

        validate_command_list(&self.global_commands, "global")?;

        Ok(())
    }

    /// Look up a component by id
    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Resolve a possibly relative path against the document directory
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// License text, read from `text_file_path` when no inline text is given
    pub fn license_text(&self) -> Result<Option<String>> {
        let Some(license) = &self.license else {
            return Ok(None);
        };
        if !license.text.is_empty() || license.text_file_path.is_empty() {
            return Ok(Some(license.text.clone()));
        }
        let path = self.resolve_path(&license.text_file_path);
        let text = fs::read_to_string(&path).map_err(|e| {
            SetupError::config(format!("Failed to read license text {:?}: {}", path, e))
        })?;
        Ok(Some(text))
    }
}

fn validate_command_list(commands: &[Command], scope: &str) -> Result<()> {
    let mut ids = HashSet::new();
    for command in commands {
        if command.id.trim().is_empty() {
            return Err(SetupError::config(format!(
                "Command '{}' in {} has an empty id",
                command.name, scope
            )));
        }
        if !ids.insert(command.id.as_str()) {
            return Err(SetupError::config(format!(
                "Duplicate command id '{}' in {}",
                command.id, scope
            )));
        }
    }
    Ok(())
}

// ============================================================================
// Application, settings, license
// ============================================================================

/// Application metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
    pub publisher: String,
    pub description: String,
    pub website: String,
    pub support_url: String,
    pub icon_path: String,
}

/// Global setup settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    /// Template, may contain placeholders
    pub default_install_path: String,
    pub allow_custom_install_path: bool,
    pub create_uninstaller: bool,
    pub require_administrator: bool,
    /// Bytes
    pub minimum_disk_space: u64,
    pub uninstaller_name: String,
    pub add_to_control_panel: bool,
    pub create_start_menu_entries: bool,
    pub create_desktop_shortcut: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            default_install_path: String::new(),
            allow_custom_install_path: true,
            create_uninstaller: true,
            require_administrator: false,
            minimum_disk_space: 50 * 1024 * 1024,
            uninstaller_name: "uninstall".to_string(),
            add_to_control_panel: true,
            create_start_menu_entries: true,
            create_desktop_shortcut: false,
        }
    }
}

/// Architecture-specific settings; every `Some` field overrides the global one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchitectureSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_install_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_custom_install_path: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_uninstaller: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_administrator: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_disk_space: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uninstaller_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_to_control_panel: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_start_menu_entries: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_desktop_shortcut: Option<bool>,
}

/// License terms shown before installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseInfo {
    pub title: String,
    pub text: String,
    /// Used when `text` is empty; relative to the document directory
    pub text_file_path: String,
    pub required: bool,
    pub accept_text: String,
    pub decline_text: String,
}

impl Default for LicenseInfo {
    fn default() -> Self {
        Self {
            title: "License Agreement".to_string(),
            text: String::new(),
            text_file_path: String::new(),
            required: true,
            accept_text: "I accept the terms in the License Agreement".to_string(),
            decline_text: "I do not accept the terms in the License Agreement".to_string(),
        }
    }
}

// ============================================================================
// Components
// ============================================================================

/// A selectable unit of installable functionality
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Component {
    /// Stable cross-reference key (not the display name)
    pub id: String,
    pub name: String,
    pub description: String,
    pub required: bool,
    pub default_selected: bool,
    pub size_bytes: u64,
    pub target_architecture: Architecture,
    /// Declared for documentation, not enforced
    pub dependencies: Vec<String>,
    /// Declared for documentation, not enforced
    pub conflicts: Vec<String>,
    pub conditions: Vec<Condition>,
    pub commands: Vec<Command>,
    pub architecture_overrides: BTreeMap<Architecture, ComponentOverride>,
}

/// Architecture-specific patch applied to a component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentOverride {
    pub name: Option<String>,
    pub description: Option<String>,
    pub default_selected: Option<bool>,
    pub size_bytes: Option<u64>,
    /// Appended after the base commands
    pub additional_commands: Option<Vec<Command>>,
    /// Fully supersedes the base commands (and `additional_commands`)
    pub replacement_commands: Option<Vec<Command>>,
}

// ============================================================================
// Commands
// ============================================================================

/// A single declarative installation action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Command type tag and its typed parameters
    #[serde(flatten)]
    pub action: CommandAction,
    #[serde(default)]
    pub timing: CommandTiming,
    #[serde(default = "default_true")]
    pub required: bool,
    /// Tie-break within a phase
    #[serde(default)]
    pub order: i32,
    /// Fails without running unless the host is elevated
    #[serde(default)]
    pub run_as_admin: bool,
    #[serde(default)]
    pub target_architecture: Architecture,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_criteria: Option<SuccessCriteria>,
}

impl Command {
    /// Create a required install-phase command with default settings
    pub fn new(id: impl Into<String>, action: CommandAction) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            action,
            timing: CommandTiming::Install,
            required: true,
            order: 0,
            run_as_admin: false,
            target_architecture: Architecture::Any,
            conditions: Vec::new(),
            success_criteria: None,
        }
    }

    pub fn with_timing(mut self, timing: CommandTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Command type tag
    pub fn kind(&self) -> CommandKind {
        self.action.kind()
    }

    /// Name used in progress labels and log messages
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Command type with its typed parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters", rename_all = "snake_case")]
pub enum CommandAction {
    CopyFile(CopyFileParams),
    CopyDirectory(CopyDirectoryParams),
    CreateShortcut(CreateShortcutParams),
    CreateDirectory(CreateDirectoryParams),
    WriteRegistry(WriteRegistryParams),
    DeleteRegistry(DeleteRegistryParams),
    RunExecutable(RunExecutableParams),
    RunShellCommand(RunShellCommandParams),
    ExtractArchive(ExtractArchiveParams),
    SetEnvironmentVariable(SetEnvironmentVariableParams),
    CreateFileAssociation(CreateFileAssociationParams),
    InstallService(InstallServiceParams),
    UninstallService(UninstallServiceParams),
    Custom(CustomParams),
}

impl CommandAction {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::CopyFile(_) => CommandKind::CopyFile,
            Self::CopyDirectory(_) => CommandKind::CopyDirectory,
            Self::CreateShortcut(_) => CommandKind::CreateShortcut,
            Self::CreateDirectory(_) => CommandKind::CreateDirectory,
            Self::WriteRegistry(_) => CommandKind::WriteRegistry,
            Self::DeleteRegistry(_) => CommandKind::DeleteRegistry,
            Self::RunExecutable(_) => CommandKind::RunExecutable,
            Self::RunShellCommand(_) => CommandKind::RunShellCommand,
            Self::ExtractArchive(_) => CommandKind::ExtractArchive,
            Self::SetEnvironmentVariable(_) => CommandKind::SetEnvironmentVariable,
            Self::CreateFileAssociation(_) => CommandKind::CreateFileAssociation,
            Self::InstallService(_) => CommandKind::InstallService,
            Self::UninstallService(_) => CommandKind::UninstallService,
            Self::Custom(_) => CommandKind::Custom,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyFileParams {
    pub source: String,
    pub destination: String,
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyDirectoryParams {
    pub source: String,
    pub destination: String,
    #[serde(default = "default_true")]
    pub recursive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateShortcutParams {
    pub target_path: String,
    pub shortcut_path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub working_directory: String,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub icon_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDirectoryParams {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRegistryParams {
    #[serde(default)]
    pub root: RegistryRoot,
    pub key_path: String,
    /// Empty string writes the key's default value
    #[serde(default)]
    pub value_name: String,
    pub value: String,
    #[serde(default)]
    pub value_type: RegistryValueKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRegistryParams {
    #[serde(default)]
    pub root: RegistryRoot,
    pub key_path: String,
    /// `None` deletes the whole key
    #[serde(default)]
    pub value_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunExecutableParams {
    pub executable: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default = "default_true")]
    pub wait_for_exit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunShellCommandParams {
    pub command: String,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default = "default_true")]
    pub wait_for_exit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractArchiveParams {
    pub archive_path: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetEnvironmentVariableParams {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub target: EnvironmentTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFileAssociationParams {
    pub extension: String,
    pub prog_id: String,
    #[serde(default)]
    pub description: String,
    pub executable: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallServiceParams {
    pub name: String,
    pub executable: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_unit_directory")]
    pub unit_directory: String,
    #[serde(default = "default_true")]
    pub enable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UninstallServiceParams {
    pub name: String,
    #[serde(default = "default_unit_directory")]
    pub unit_directory: String,
    #[serde(default = "default_true")]
    pub disable: bool,
}

/// Parameters of an extension command, passed to the registered handler as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomParams {
    pub handler: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

/// Author-declared success criteria
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuccessCriteria {
    pub expected_exit_code: Option<i32>,
    pub expected_output_contains: Option<String>,
    pub expected_file_exists: Option<String>,
    pub expected_registry_value: Option<String>,
}

// ============================================================================
// Conditions
// ============================================================================

/// Predicate gating a component, command or page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub expected_value: String,
    #[serde(default)]
    pub negate: bool,
}

impl Condition {
    pub fn new(
        kind: ConditionKind,
        target: impl Into<String>,
        expected_value: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            target: target.into(),
            expected_value: expected_value.into(),
            negate: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }
}

/// Condition type tag.
///
/// Tags outside the known set are preserved as `Unknown` so that documents
/// written for newer engines still load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionKind {
    FileExists,
    DirectoryExists,
    RegistryKeyExists,
    EnvironmentVariable,
    Architecture,
    DryRun,
    Unknown(String),
}

impl From<String> for ConditionKind {
    fn from(tag: String) -> Self {
        let normalized: String = tag
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "fileexists" => Self::FileExists,
            "directoryexists" => Self::DirectoryExists,
            "registrykey" | "registrykeyexists" => Self::RegistryKeyExists,
            "environmentvariable" => Self::EnvironmentVariable,
            "architecture" => Self::Architecture,
            "dryrun" => Self::DryRun,
            _ => Self::Unknown(tag),
        }
    }
}

impl From<ConditionKind> for String {
    fn from(kind: ConditionKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileExists => write!(f, "file_exists"),
            Self::DirectoryExists => write!(f, "directory_exists"),
            Self::RegistryKeyExists => write!(f, "registry_key_exists"),
            Self::EnvironmentVariable => write!(f, "environment_variable"),
            Self::Architecture => write!(f, "architecture"),
            Self::DryRun => write!(f, "dry_run"),
            Self::Unknown(tag) => write!(f, "{}", tag),
        }
    }
}

// ============================================================================
// Pages
// ============================================================================

/// Wizard page definition consumed by the UI collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageDefinition {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub enabled: bool,
    pub order: i32,
    pub page_type: PageType,
    pub properties: BTreeMap<String, serde_json::Value>,
    pub show_conditions: Vec<Condition>,
}

impl Default for PageDefinition {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            subtitle: String::new(),
            enabled: true,
            order: 0,
            page_type: PageType::Custom,
            properties: BTreeMap::new(),
            show_conditions: Vec::new(),
        }
    }
}

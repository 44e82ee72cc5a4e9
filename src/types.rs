//! Type-safe enumerations for the setup engine
//!
//! Closed sets used throughout the configuration model and runtime state.
//! Every enum serializes as a snake_case string in the setup document and
//! parses case-insensitively from user input (CLI, condition values).

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Target processor architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Architecture {
    /// Not tied to a specific architecture
    #[default]
    Any,
    X86,
    X64,
    Arm64,
}

impl Architecture {
    /// Detect the architecture of the running process.
    ///
    /// Unknown targets map to `Any`, which only matches architecture-neutral
    /// components.
    pub fn detect() -> Self {
        match std::env::consts::ARCH {
            "x86" => Self::X86,
            "x86_64" => Self::X64,
            "aarch64" => Self::Arm64,
            other => {
                tracing::warn!("Unrecognized architecture '{}', treating as 'any'", other);
                Self::Any
            }
        }
    }

    /// Returns true if something targeting `self` may run on `detected`
    pub fn matches(self, detected: Architecture) -> bool {
        self == Self::Any || self == detected
    }
}

/// Execution phase of a command
///
/// Declaration order is the execution order; `Ord` is derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CommandTiming {
    PreInstall,
    #[default]
    Install,
    PostInstall,
    Uninstall,
}

impl CommandTiming {
    /// Phases executed by an install run, in order
    pub const fn install_phases() -> &'static [Self] {
        &[Self::PreInstall, Self::Install, Self::PostInstall]
    }

    /// Status the pipeline enters while running this phase
    pub const fn status(self) -> Option<SetupStatus> {
        match self {
            Self::PreInstall => Some(SetupStatus::PreInstallation),
            Self::Install => Some(SetupStatus::Installing),
            Self::PostInstall => Some(SetupStatus::PostInstallation),
            Self::Uninstall => None,
        }
    }

    /// Prefix used for progress labels
    pub const fn label(self) -> &'static str {
        match self {
            Self::PreInstall => "Pre-installation",
            Self::Install => "Installing",
            Self::PostInstall => "Post-installation",
            Self::Uninstall => "Uninstalling",
        }
    }
}

/// Command type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CommandKind {
    CopyFile,
    CopyDirectory,
    CreateShortcut,
    CreateDirectory,
    WriteRegistry,
    DeleteRegistry,
    RunExecutable,
    RunShellCommand,
    ExtractArchive,
    SetEnvironmentVariable,
    CreateFileAssociation,
    InstallService,
    UninstallService,
    Custom,
}

/// Overall installation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(Serialize, Deserialize, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum SetupStatus {
    #[default]
    NotStarted,
    Initializing,
    PreInstallation,
    Installing,
    PostInstallation,
    Completed,
    Failed,
    Cancelled,
}

impl SetupStatus {
    /// Returns true if this is a terminal state (Completed, Failed or Cancelled)
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns the next status on the success path, or None at a terminal state
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::Initializing),
            Self::Initializing => Some(Self::PreInstallation),
            Self::PreInstallation => Some(Self::Installing),
            Self::Installing => Some(Self::PostInstallation),
            Self::PostInstallation => Some(Self::Completed),
            Self::Completed | Self::Failed | Self::Cancelled => None,
        }
    }

    /// Position on the success path (terminal failure states sort last)
    pub const fn order(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Initializing => 1,
            Self::PreInstallation => 2,
            Self::Installing => 3,
            Self::PostInstallation => 4,
            Self::Completed => 5,
            Self::Failed => 254,
            Self::Cancelled => 255,
        }
    }

    /// Returns a human-readable description of this status
    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::Initializing => "Initializing installation",
            Self::PreInstallation => "Running pre-installation steps",
            Self::Installing => "Installing",
            Self::PostInstallation => "Running post-installation steps",
            Self::Completed => "Installation complete",
            Self::Failed => "Installation failed",
            Self::Cancelled => "Installation cancelled",
        }
    }
}

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(Serialize, Deserialize, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

/// Category of an error recorded in the runtime state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ErrorKind {
    Configuration,
    Validation,
    Permission,
    DiskSpace,
    FileSystem,
    Registry,
    Network,
    Dependency,
    Command,
    Unknown,
}

/// Kind of wizard page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PageType {
    Welcome,
    License,
    Directory,
    Components,
    Progress,
    Completion,
    #[default]
    Custom,
}

/// Root hive of a registry path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RegistryRoot {
    #[default]
    LocalMachine,
    CurrentUser,
    ClassesRoot,
}

/// Declared type of a registry value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RegistryValueKind {
    #[default]
    String,
    ExpandString,
    Dword,
    Qword,
    Binary,
}

/// Scope of an environment variable written by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum EnvironmentTarget {
    /// Visible to this run and to processes it spawns
    Process,
    /// Persisted for the current user
    #[default]
    User,
    /// Persisted machine-wide
    Machine,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_architecture_parse_is_case_insensitive() {
        assert_eq!("X64".parse::<Architecture>().unwrap(), Architecture::X64);
        assert_eq!("arm64".parse::<Architecture>().unwrap(), Architecture::Arm64);
        assert!("sparc".parse::<Architecture>().is_err());
    }

    #[test]
    fn test_architecture_matches() {
        assert!(Architecture::Any.matches(Architecture::X64));
        assert!(Architecture::X64.matches(Architecture::X64));
        assert!(!Architecture::X86.matches(Architecture::X64));
    }

    #[test]
    fn test_timing_order_is_phase_order() {
        let timings: Vec<_> = CommandTiming::iter().collect();
        let mut sorted = timings.clone();
        sorted.sort();
        assert_eq!(timings, sorted);
        assert!(CommandTiming::PreInstall < CommandTiming::Install);
        assert!(CommandTiming::Install < CommandTiming::PostInstall);
    }

    #[test]
    fn test_status_next_forms_chain() {
        let mut current = SetupStatus::NotStarted;
        let mut count = 0;

        while let Some(next) = current.next() {
            current = next;
            count += 1;
            assert!(count < 20, "Infinite loop detected in status chain");
        }

        assert_eq!(current, SetupStatus::Completed);
        assert_eq!(count, 5);
    }

    #[test]
    fn test_terminal_states() {
        for status in SetupStatus::iter() {
            let expected = matches!(
                status,
                SetupStatus::Completed | SetupStatus::Failed | SetupStatus::Cancelled
            );
            assert_eq!(status.is_terminal(), expected, "{:?}", status);
        }
    }

    #[test]
    fn test_command_kind_serde_names() {
        let json = serde_json::to_string(&CommandKind::RunShellCommand).unwrap();
        assert_eq!(json, "\"run_shell_command\"");
        assert_eq!(CommandKind::SetEnvironmentVariable.to_string(), "set_environment_variable");
    }

    #[test]
    fn test_timing_status_mapping() {
        assert_eq!(
            CommandTiming::PreInstall.status(),
            Some(SetupStatus::PreInstallation)
        );
        assert_eq!(CommandTiming::Uninstall.status(), None);
    }
}

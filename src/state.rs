//! Runtime state of one setup run
//!
//! `SetupState` is the mutable, process-lifetime record of what this run has
//! decided and done: install path, selection, detected architecture, dry-run
//! flag, resolved variables, progress, and the append-only log, result and
//! error lists. It also owns the status state machine.
//!
//! # Status Flow
//!
//! ```text
//! NotStarted
//!     ↓
//! Initializing
//!     ↓
//! PreInstallation
//!     ↓
//! Installing
//!     ↓
//! PostInstallation
//!     ↓
//! Completed
//!
//! (Any non-terminal status can transition to Failed or Cancelled)
//! ```
//!
//! The state is never persisted; `write_report` exports a JSON snapshot for
//! diagnosis after the process exits.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

use crate::types::{Architecture, CommandKind, ErrorKind, LogLevel, SetupStatus};

/// Milliseconds since the UNIX epoch
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Errors that can occur during status transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusTransitionError {
    /// Attempted to skip one or more statuses
    #[error("Cannot skip from {from} to {to} (must transition through intermediate statuses)")]
    SkippedStatus { from: SetupStatus, to: SetupStatus },

    /// Attempted to go backwards
    #[error("Cannot go backwards from {from} to {to}")]
    BackwardTransition { from: SetupStatus, to: SetupStatus },

    /// Attempted to transition from a terminal status
    #[error("Cannot transition from terminal status {from}")]
    FromTerminalState { from: SetupStatus },

    /// Attempted to transition to the current status
    #[error("Already at status {status}")]
    AlreadyAtStatus { status: SetupStatus },
}

impl From<StatusTransitionError> for crate::error::SetupError {
    fn from(err: StatusTransitionError) -> Self {
        crate::error::SetupError::StatusTransition(err.to_string())
    }
}

/// A timestamped log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unix milliseconds
    pub timestamp: u64,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: unix_millis(),
            level,
            message: message.into(),
            command_id: None,
            component_id: None,
            error_detail: None,
        }
    }

    pub fn with_command(mut self, command_id: &str, component_id: Option<&str>) -> Self {
        self.command_id = Some(command_id.to_string());
        self.component_id = component_id.map(str::to_string);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }

    /// Mirror this entry to the tracing subscriber
    fn trace(&self) {
        let command = self.command_id.as_deref().unwrap_or("-");
        match (self.level, &self.error_detail) {
            (LogLevel::Debug, _) => tracing::debug!(command, "{}", self.message),
            (LogLevel::Info, _) => tracing::info!(command, "{}", self.message),
            (LogLevel::Warning, _) => tracing::warn!(command, "{}", self.message),
            (LogLevel::Error, None) => tracing::error!(command, "{}", self.message),
            (LogLevel::Error, Some(detail)) => {
                tracing::error!(command, detail = %detail, "{}", self.message)
            }
            (LogLevel::Critical, detail) => tracing::error!(
                command,
                critical = true,
                detail = detail.as_deref().unwrap_or(""),
                "{}",
                self.message
            ),
        }
    }
}

/// Outcome of a single command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command_id: String,
    /// `None` for global commands
    pub component_id: Option<String>,
    pub command_type: CommandKind,
    pub start_time: u64,
    pub end_time: u64,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub output: String,
    pub error_output: String,
    pub exception: Option<String>,
    pub was_skipped: bool,
    pub skip_reason: Option<String>,
}

impl CommandResult {
    /// Start a result record; `end_time` is set by `finish`
    pub fn begin(command_id: &str, component_id: Option<&str>, command_type: CommandKind) -> Self {
        let now = unix_millis();
        Self {
            command_id: command_id.to_string(),
            component_id: component_id.map(str::to_string),
            command_type,
            start_time: now,
            end_time: now,
            success: false,
            exit_code: None,
            output: String::new(),
            error_output: String::new(),
            exception: None,
            was_skipped: false,
            skip_reason: None,
        }
    }

    pub fn finish(mut self, success: bool) -> Self {
        self.success = success;
        self.end_time = unix_millis();
        self
    }

    pub fn skipped(mut self, reason: impl Into<String>) -> Self {
        self.was_skipped = true;
        self.skip_reason = Some(reason.into());
        self.finish(true)
    }
}

/// An error recorded during the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: u64,
    pub kind: ErrorKind,
    pub message: String,
    pub detail: Option<String>,
    pub command_id: Option<String>,
    pub is_fatal: bool,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>, is_fatal: bool) -> Self {
        Self {
            timestamp: unix_millis(),
            kind,
            message: message.into(),
            detail: None,
            command_id: None,
            is_fatal,
        }
    }

    pub fn with_command(mut self, command_id: &str) -> Self {
        self.command_id = Some(command_id.to_string());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Mutable record of one setup run.
///
/// # Example
///
/// ```
/// use setup_engine::state::SetupState;
/// use setup_engine::types::{Architecture, SetupStatus};
///
/// let mut state = SetupState::with_architecture(Architecture::X64);
/// state.set_install_path("/opt/demo");
/// state.select_component("core");
///
/// state.advance().unwrap();
/// assert_eq!(state.status(), SetupStatus::Initializing);
///
/// // Cannot skip statuses
/// assert!(state.transition_to(SetupStatus::Completed).is_err());
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct SetupState {
    install_path: String,
    license_accepted: bool,
    selected_components: BTreeSet<String>,
    architecture: Architecture,
    dry_run: bool,
    progress: u8,
    current_operation: String,
    variables: BTreeMap<String, String>,
    status: SetupStatus,
    /// (status, unix millis) for every transition taken
    status_history: Vec<(SetupStatus, u64)>,
    log: Vec<LogEntry>,
    results: Vec<CommandResult>,
    errors: Vec<ErrorRecord>,
}

impl Default for SetupState {
    fn default() -> Self {
        Self::new()
    }
}

impl SetupState {
    /// Create a state for the running machine's architecture
    pub fn new() -> Self {
        Self::with_architecture(Architecture::detect())
    }

    pub fn with_architecture(architecture: Architecture) -> Self {
        Self {
            install_path: String::new(),
            license_accepted: false,
            selected_components: BTreeSet::new(),
            architecture,
            dry_run: false,
            progress: 0,
            current_operation: String::new(),
            variables: BTreeMap::new(),
            status: SetupStatus::NotStarted,
            status_history: Vec::new(),
            log: Vec::new(),
            results: Vec::new(),
            errors: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Fields written by the UI before execution
    // ------------------------------------------------------------------

    #[inline]
    pub fn install_path(&self) -> &str {
        &self.install_path
    }

    pub fn set_install_path(&mut self, path: impl Into<String>) {
        self.install_path = path.into();
    }

    #[inline]
    pub fn license_accepted(&self) -> bool {
        self.license_accepted
    }

    pub fn set_license_accepted(&mut self, accepted: bool) {
        self.license_accepted = accepted;
    }

    /// Selected component ids in deterministic order
    pub fn selected_components(&self) -> &BTreeSet<String> {
        &self.selected_components
    }

    pub fn is_selected(&self, component_id: &str) -> bool {
        self.selected_components.contains(component_id)
    }

    pub fn select_component(&mut self, component_id: impl Into<String>) {
        self.selected_components.insert(component_id.into());
    }

    pub fn deselect_component(&mut self, component_id: &str) {
        self.selected_components.remove(component_id);
    }

    /// Replace the whole selection
    pub fn set_selected_components<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_components = ids.into_iter().map(Into::into).collect();
    }

    #[inline]
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    #[inline]
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    // ------------------------------------------------------------------
    // Progress
    // ------------------------------------------------------------------

    #[inline]
    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn current_operation(&self) -> &str {
        &self.current_operation
    }

    pub fn set_progress(&mut self, percentage: u8, operation: impl Into<String>) {
        self.progress = percentage.min(100);
        self.current_operation = operation.into();
    }

    // ------------------------------------------------------------------
    // Status state machine
    // ------------------------------------------------------------------

    #[inline]
    pub fn status(&self) -> SetupStatus {
        self.status
    }

    pub fn status_history(&self) -> &[(SetupStatus, u64)] {
        &self.status_history
    }

    /// Advance to the next status on the success path
    pub fn advance(&mut self) -> Result<SetupStatus, StatusTransitionError> {
        let Some(next) = self.status.next() else {
            return Err(StatusTransitionError::FromTerminalState { from: self.status });
        };
        self.record_transition(next);
        Ok(next)
    }

    /// Transition to `target`, which must be the immediate successor of the
    /// current status, or `Failed`/`Cancelled` from any non-terminal status.
    pub fn transition_to(
        &mut self,
        target: SetupStatus,
    ) -> Result<SetupStatus, StatusTransitionError> {
        if self.status.is_terminal() {
            return Err(StatusTransitionError::FromTerminalState { from: self.status });
        }

        if target == self.status {
            return Err(StatusTransitionError::AlreadyAtStatus { status: target });
        }

        if matches!(target, SetupStatus::Failed | SetupStatus::Cancelled) {
            self.record_transition(target);
            return Ok(target);
        }

        if target.order() < self.status.order() {
            return Err(StatusTransitionError::BackwardTransition {
                from: self.status,
                to: target,
            });
        }

        if self.status.next() != Some(target) {
            return Err(StatusTransitionError::SkippedStatus {
                from: self.status,
                to: target,
            });
        }

        self.record_transition(target);
        Ok(target)
    }

    /// Mark the run as failed
    pub fn fail(&mut self) -> Result<(), StatusTransitionError> {
        self.transition_to(SetupStatus::Failed).map(|_| ())
    }

    /// Mark the run as cancelled
    pub fn cancel(&mut self) -> Result<(), StatusTransitionError> {
        self.transition_to(SetupStatus::Cancelled).map(|_| ())
    }

    fn record_transition(&mut self, status: SetupStatus) {
        tracing::debug!("Status {} -> {}", self.status, status);
        self.status = status;
        self.status_history.push((status, unix_millis()));
    }

    // ------------------------------------------------------------------
    // Append-only records
    // ------------------------------------------------------------------

    pub fn log_entries(&self) -> &[LogEntry] {
        &self.log
    }

    /// Append a log entry (also mirrored to tracing)
    pub fn push_log(&mut self, entry: LogEntry) {
        entry.trace();
        self.log.push(entry);
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.push_log(LogEntry::new(level, message));
    }

    pub fn results(&self) -> &[CommandResult] {
        &self.results
    }

    pub fn record_result(&mut self, result: CommandResult) {
        self.results.push(result);
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn record_error(&mut self, error: ErrorRecord) {
        self.errors.push(error);
    }

    /// Write a JSON snapshot of the run (status, log, errors, results)
    pub fn write_report<P: AsRef<Path>>(&self, path: P) -> crate::error::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        tracing::info!("Wrote setup report to {:?}", path.as_ref());
        Ok(())
    }
}

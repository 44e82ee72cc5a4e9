//! Command actions
//!
//! One function per command type. Every action expands its own string
//! parameters immediately before use, so a change to the install path or a
//! runtime variable is picked up by the very next command. Actions return
//! `anyhow::Result` internally; [`execute`] maps that into [`ActionError`] so
//! the pipeline can tell an ordinary failure from a command it cannot run.

pub mod archive;
pub mod association;
pub mod custom;
pub mod environment;
pub mod files;
pub mod process;
pub mod registry;
pub mod service;
pub mod shortcut;

use std::path::PathBuf;
use thiserror::Error;

use crate::conditions::split_registry_root;
use crate::config::{Command, CommandAction, SetupDefinition};
use crate::host::Host;
use crate::process_guard::SharedChildren;
use crate::state::SetupState;
use crate::variables::VariableExpander;

pub use custom::{CustomCommandHandler, CustomHandlers};

/// Why an action did not produce an [`ActionOutput`]
#[derive(Debug, Error)]
pub enum ActionError {
    /// The engine cannot interpret this command at all (always fatal)
    #[error("unsupported command: {0}")]
    Unsupported(String),

    /// The action ran and failed
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// What an action produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Explanation when `success` is false
    pub message: Option<String>,
}

impl ActionOutput {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn ok_with(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Everything an action may read while it runs
#[derive(Clone, Copy)]
pub struct ActionContext<'a> {
    pub definition: &'a SetupDefinition,
    pub state: &'a SetupState,
    pub host: &'a Host,
    pub children: &'a SharedChildren,
    pub command: &'a Command,
    /// `None` for global commands
    pub component_id: Option<&'a str>,
}

impl<'a> ActionContext<'a> {
    pub fn expander(&self) -> VariableExpander<'a> {
        VariableExpander::new(self.definition, self.state, self.host)
    }

    /// Expand placeholders in a parameter
    pub fn expand(&self, value: &str) -> String {
        self.expander().expand(value)
    }

    /// Expand a destination path
    pub fn target_path(&self, value: &str) -> PathBuf {
        PathBuf::from(self.expand(value))
    }

    /// Expand a source path; relative paths resolve against the source root
    pub fn source_path(&self, value: &str) -> PathBuf {
        self.host.resolve_source(&self.expand(value))
    }
}

/// Run the action of `ctx.command` and apply its success criteria.
///
/// A `run_as_admin` command fails without running when the host is not
/// elevated.
pub fn execute(
    ctx: &ActionContext<'_>,
    handlers: &CustomHandlers,
) -> Result<ActionOutput, ActionError> {
    if ctx.command.run_as_admin && !ctx.host.is_elevated() {
        return Ok(ActionOutput::failed(
            "command requires administrator privileges",
        ));
    }

    let output = match &ctx.command.action {
        CommandAction::CopyFile(params) => files::copy_file(ctx, params)?,
        CommandAction::CopyDirectory(params) => files::copy_directory(ctx, params)?,
        CommandAction::CreateDirectory(params) => files::create_directory(ctx, params)?,
        CommandAction::CreateShortcut(params) => shortcut::create_shortcut(ctx, params)?,
        CommandAction::WriteRegistry(params) => registry::write_registry(ctx, params)?,
        CommandAction::DeleteRegistry(params) => registry::delete_registry(ctx, params)?,
        CommandAction::RunExecutable(params) => process::run_executable(ctx, params)?,
        CommandAction::RunShellCommand(params) => process::run_shell_command(ctx, params)?,
        CommandAction::ExtractArchive(params) => archive::extract_archive(ctx, params)?,
        CommandAction::SetEnvironmentVariable(params) => {
            environment::set_environment_variable(ctx, params)?
        }
        CommandAction::CreateFileAssociation(params) => {
            association::create_file_association(ctx, params)?
        }
        CommandAction::InstallService(params) => service::install_service(ctx, params)?,
        CommandAction::UninstallService(params) => service::uninstall_service(ctx, params)?,
        CommandAction::Custom(params) => custom::run_custom(ctx, handlers, params)?,
    };

    Ok(apply_success_criteria(ctx, output))
}

/// Check the author's success criteria against an action's output.
///
/// A captured exit code must equal `expected_exit_code` (0 by default).
/// `expected_registry_value` has the form `[ROOT\]key\path[@name]=value`.
pub fn apply_success_criteria(ctx: &ActionContext<'_>, mut output: ActionOutput) -> ActionOutput {
    if !output.success {
        return output;
    }

    let criteria = ctx.command.success_criteria.clone().unwrap_or_default();

    if let Some(code) = output.exit_code {
        let expected = criteria.expected_exit_code.unwrap_or(0);
        if code != expected {
            return fail(output, format!("exit code {} (expected {})", code, expected));
        }
    }

    if let Some(needle) = &criteria.expected_output_contains {
        let needle = ctx.expand(needle);
        if !output.stdout.contains(&needle) {
            return fail(output, format!("output does not contain '{}'", needle));
        }
    }

    if let Some(path) = &criteria.expected_file_exists {
        let path = ctx.target_path(path);
        if !path.exists() {
            return fail(output, format!("expected file {:?} does not exist", path));
        }
    }

    if let Some(criterion) = &criteria.expected_registry_value {
        let criterion = ctx.expand(criterion);
        if let Err(message) = check_registry_value(ctx.host, &criterion) {
            return fail(output, message);
        }
    }

    output.message = None;
    output
}

fn fail(mut output: ActionOutput, message: String) -> ActionOutput {
    output.success = false;
    output.message = Some(message);
    output
}

fn check_registry_value(host: &Host, criterion: &str) -> Result<(), String> {
    let Some((location, expected)) = criterion.split_once('=') else {
        return Err(format!("malformed registry criterion '{}'", criterion));
    };
    let (key_path, name) = location.split_once('@').unwrap_or((location, ""));
    let (root, key_path) = split_registry_root(key_path);

    match host.registry().get_value(root, key_path, name) {
        Some(actual) if actual.to_string() == expected => Ok(()),
        Some(actual) => Err(format!(
            "registry value {}@{} is '{}' (expected '{}')",
            key_path, name, actual, expected
        )),
        None => Err(format!("registry value {}@{} does not exist", key_path, name)),
    }
}

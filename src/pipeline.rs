//! Command execution pipeline
//!
//! Collects the commands of the global list and of the selected components,
//! orders them by phase, and runs them one at a time through the actions,
//! driving the state machine and reporting progress as it goes.
//!
//! ```text
//! NotStarted -> Initializing -> PreInstallation -> Installing -> PostInstallation -> Completed
//!                    \________________\_________________\______________\--> Failed | Cancelled
//! ```

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::Serialize;

use crate::actions::{self, ActionContext, ActionError, CustomCommandHandler, CustomHandlers};
use crate::conditions::ConditionEvaluator;
use crate::config::{Command, CustomParams, SetupDefinition};
use crate::error::{Result, SetupError};
use crate::events::{CancelToken, EventSink, InstallEvent};
use crate::host::Host;
use crate::process_guard::{ChildRegistry, ProcessGuard, SharedChildren};
use crate::resolve;
use crate::state::{CommandResult, ErrorRecord, LogEntry, SetupState};
use crate::types::{CommandTiming, LogLevel, SetupStatus};

/// Skip reason recorded for every command of a dry run
pub const DRY_RUN_REASON: &str = "Dry run mode";

/// A command scheduled for execution, with its owning component
#[derive(Debug, Clone)]
pub struct PlannedCommand {
    pub command: Command,
    /// `None` for global commands
    pub component_id: Option<String>,
}

/// Overall outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub success: bool,
    pub status: SetupStatus,
    pub results: Vec<CommandResult>,
}

/// What the pipeline does after a command
enum Step {
    Continue,
    Abort,
}

/// Runs an install for one setup definition
pub struct Installer {
    definition: Arc<SetupDefinition>,
    host: Arc<Host>,
    handlers: CustomHandlers,
    children: SharedChildren,
}

impl Installer {
    pub fn new(definition: SetupDefinition, host: Host) -> Self {
        Self {
            definition: Arc::new(definition),
            host: Arc::new(host),
            handlers: CustomHandlers::new(),
            children: ChildRegistry::shared(),
        }
    }

    /// Share the child registry with a signal handler
    pub fn with_children(mut self, children: SharedChildren) -> Self {
        self.children = children;
        self
    }

    /// Register a handler for `custom` commands
    pub fn with_handler(
        mut self,
        name: impl Into<String>,
        handler: impl CustomCommandHandler + 'static,
    ) -> Self {
        self.handlers.register(name, handler);
        self
    }

    /// Register a closure for `custom` commands
    pub fn with_handler_fn<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&CustomParams, &ActionContext<'_>) -> anyhow::Result<actions::ActionOutput>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.register_fn(name, handler);
        self
    }

    pub fn definition(&self) -> &SetupDefinition {
        &self.definition
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn children(&self) -> &SharedChildren {
        &self.children
    }

    /// Commands an install run would execute, in execution order.
    ///
    /// Global commands come first, then the commands of each selected
    /// component that is available on this machine. Uninstall commands,
    /// commands for another architecture and commands whose conditions fail
    /// are dropped. The sort is stable, so declaration order breaks ties.
    pub fn collect_commands(&self, state: &SetupState) -> Vec<PlannedCommand> {
        let arch = state.architecture();
        let evaluator = ConditionEvaluator::new(&self.definition, state, &self.host);

        let global = self
            .definition
            .global_commands
            .iter()
            .cloned()
            .map(|command| PlannedCommand {
                command,
                component_id: None,
            });

        let selected = resolve::available_components(&self.definition, state, &self.host)
            .into_iter()
            .filter(|component| state.is_selected(&component.id))
            .flat_map(|component| {
                let owner = component.id;
                component
                    .commands
                    .into_iter()
                    .map(move |command| PlannedCommand {
                        command,
                        component_id: Some(owner.clone()),
                    })
            });

        let mut planned: Vec<PlannedCommand> = global
            .chain(selected)
            .filter(|planned| {
                let command = &planned.command;
                if command.timing == CommandTiming::Uninstall {
                    return false;
                }
                if !command.target_architecture.matches(arch) {
                    tracing::debug!("Command '{}' targets {}, skipping", command.id, command.target_architecture);
                    return false;
                }
                if !evaluator.evaluate(&command.conditions) {
                    tracing::debug!("Command '{}' filtered out by its conditions", command.id);
                    return false;
                }
                true
            })
            .collect();

        planned.sort_by_key(|planned| (planned.command.timing, planned.command.order));
        planned
    }

    /// Run the install to a terminal status.
    ///
    /// Always returns a report; a failed run leaves its complete log, errors
    /// and results in `state`.
    pub fn execute(
        &self,
        state: &mut SetupState,
        sink: &dyn EventSink,
        cancel: &CancelToken,
    ) -> InstallReport {
        let guard = ProcessGuard::new(Arc::clone(&self.children));

        if let Err(err) = self.run(state, sink, cancel) {
            let message = format!("Unexpected error: {}", err);
            self.log(state, sink, LogEntry::new(LogLevel::Critical, &message));
            state.record_error(ErrorRecord::new(err.kind(), message, true));
            if !state.status().is_terminal() && state.fail().is_ok() {
                sink.emit(InstallEvent::StatusChanged(SetupStatus::Failed));
            }
        }

        if guard.child_count() > 0 {
            tracing::warn!("{} child processes still running at the end of the run", guard.child_count());
        }
        drop(guard);

        let report = InstallReport {
            success: state.status() == SetupStatus::Completed,
            status: state.status(),
            results: state.results().to_vec(),
        };
        sink.emit(InstallEvent::Finished {
            success: report.success,
            status: report.status,
            results: report.results.clone(),
        });
        report
    }

    /// Run on a dedicated worker thread; the state is handed back when the
    /// run is over
    pub fn spawn<S>(
        self,
        mut state: SetupState,
        sink: S,
        cancel: CancelToken,
    ) -> io::Result<JoinHandle<(SetupState, InstallReport)>>
    where
        S: EventSink + 'static,
    {
        thread::Builder::new()
            .name("setup-pipeline".to_string())
            .spawn(move || {
                let report = self.execute(&mut state, &sink, &cancel);
                (state, report)
            })
    }

    fn run(&self, state: &mut SetupState, sink: &dyn EventSink, cancel: &CancelToken) -> Result<()> {
        self.enter(state, sink, SetupStatus::Initializing)?;
        let app = &self.definition.application;
        let mode = if state.dry_run() { " (dry run)" } else { "" };
        self.log(
            state,
            sink,
            LogEntry::new(
                LogLevel::Info,
                format!("Installing {} {} to {}{}", app.name, app.version, state.install_path(), mode),
            ),
        );

        let planned = self.collect_commands(state);
        let total = planned.len();
        self.log(
            state,
            sink,
            LogEntry::new(LogLevel::Debug, format!("{} commands scheduled", total)),
        );

        let mut completed = 0usize;
        for &phase in CommandTiming::install_phases() {
            if cancel.is_cancelled() {
                return self.cancelled(state, sink);
            }
            if let Some(status) = phase.status() {
                self.enter(state, sink, status)?;
            }

            for planned in planned.iter().filter(|p| p.command.timing == phase) {
                if cancel.is_cancelled() {
                    return self.cancelled(state, sink);
                }

                let operation = format!("{}: {}", phase.label(), planned.command.display_name());
                state.set_progress(state.progress(), &operation);

                let (step, detail) = self.run_command(state, sink, planned);
                if let Step::Abort = step {
                    state.fail()?;
                    sink.emit(InstallEvent::StatusChanged(SetupStatus::Failed));
                    return Ok(());
                }

                completed += 1;
                let percentage = u8::try_from(completed * 100 / total).unwrap_or(100);
                state.set_progress(percentage, &operation);
                sink.emit(InstallEvent::Progress {
                    operation,
                    percentage,
                    detail,
                });
            }
        }

        self.enter(state, sink, SetupStatus::Completed)?;
        state.set_progress(100, SetupStatus::Completed.description());
        sink.emit(InstallEvent::Progress {
            operation: SetupStatus::Completed.description().to_string(),
            percentage: 100,
            detail: String::new(),
        });
        self.log(
            state,
            sink,
            LogEntry::new(LogLevel::Info, format!("{} installed successfully", app.name)),
        );
        Ok(())
    }

    /// Execute one command and record its result
    fn run_command(
        &self,
        state: &mut SetupState,
        sink: &dyn EventSink,
        planned: &PlannedCommand,
    ) -> (Step, String) {
        let command = &planned.command;
        let component_id = planned.component_id.as_deref();
        let mut result = CommandResult::begin(&command.id, component_id, command.kind());

        if state.dry_run() {
            self.log(
                state,
                sink,
                LogEntry::new(LogLevel::Info, format!("Would run {} '{}'", command.kind(), command.id))
                    .with_command(&command.id, component_id),
            );
            state.record_result(result.skipped(DRY_RUN_REASON));
            return (Step::Continue, DRY_RUN_REASON.to_string());
        }

        tracing::debug!("Running {} '{}'", command.kind(), command.id);
        let outcome = {
            let ctx = ActionContext {
                definition: &self.definition,
                state,
                host: &self.host,
                children: &self.children,
                command,
                component_id,
            };
            panic::catch_unwind(AssertUnwindSafe(|| actions::execute(&ctx, &self.handlers)))
        };

        let failure = match outcome {
            Ok(Ok(output)) => {
                result.exit_code = output.exit_code;
                result.output = output.stdout;
                result.error_output = output.stderr;
                if output.success {
                    None
                } else {
                    Some(output.message.unwrap_or_else(|| "command reported failure".to_string()))
                }
            }
            Ok(Err(ActionError::Unsupported(reason))) => {
                let error = SetupError::unsupported(&command.id, &reason);
                result.exception = Some(reason.clone());
                state.record_result(result.finish(false));
                state.record_error(
                    ErrorRecord::new(error.kind(), error.to_string(), true).with_command(&command.id),
                );
                self.log(
                    state,
                    sink,
                    LogEntry::new(LogLevel::Critical, error.to_string())
                        .with_command(&command.id, component_id)
                        .with_detail(reason),
                );
                return (Step::Abort, String::new());
            }
            Ok(Err(ActionError::Failed(err))) => Some(format!("{:#}", err)),
            Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
        };

        let Some(message) = failure else {
            state.record_result(result.finish(true));
            self.log(
                state,
                sink,
                LogEntry::new(LogLevel::Info, format!("Command '{}' completed", command.id))
                    .with_command(&command.id, component_id),
            );
            return (Step::Continue, "succeeded".to_string());
        };

        result.exception = Some(message.clone());
        state.record_result(result.finish(false));
        let error = SetupError::command(&command.id, &message);
        state.record_error(
            ErrorRecord::new(error.kind(), error.to_string(), command.required)
                .with_command(&command.id)
                .with_detail(&message),
        );

        if command.required {
            self.log(
                state,
                sink,
                LogEntry::new(LogLevel::Error, format!("Required command '{}' failed", command.id))
                    .with_command(&command.id, component_id)
                    .with_detail(message),
            );
            (Step::Abort, String::new())
        } else {
            self.log(
                state,
                sink,
                LogEntry::new(LogLevel::Warning, format!("Optional command '{}' failed, continuing", command.id))
                    .with_command(&command.id, component_id)
                    .with_detail(&message),
            );
            (Step::Continue, format!("failed: {}", message))
        }
    }

    fn enter(&self, state: &mut SetupState, sink: &dyn EventSink, status: SetupStatus) -> Result<()> {
        state.transition_to(status)?;
        state.set_progress(state.progress(), status.description());
        sink.emit(InstallEvent::StatusChanged(status));
        Ok(())
    }

    fn cancelled(&self, state: &mut SetupState, sink: &dyn EventSink) -> Result<()> {
        state.cancel()?;
        sink.emit(InstallEvent::StatusChanged(SetupStatus::Cancelled));
        self.log(state, sink, LogEntry::new(LogLevel::Warning, "Installation cancelled"));
        Ok(())
    }

    fn log(&self, state: &mut SetupState, sink: &dyn EventSink, entry: LogEntry) {
        state.push_log(entry.clone());
        sink.emit(InstallEvent::Log(entry));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Setup Engine Library
//!
//! A declarative installation engine. A JSON setup document describes the
//! product (components, commands, conditions, pages); the engine resolves it
//! for the running machine and executes the selected commands in three
//! phases, reporting progress over an event channel.
//!
//! ```no_run
//! use setup_engine::{CancelToken, Host, Installer, NullSink, SetupDefinition, SetupState};
//!
//! let definition = SetupDefinition::load_from_file("setup.json")?;
//! let host = Host::detect(".".into(), &setup_engine::host::default_registry_path())?;
//!
//! let mut state = SetupState::new();
//! state.set_install_path("/opt/demo");
//! setup_engine::selection::apply_selection(&definition, &mut state, &host, ["core"]);
//! setup_engine::selection::validate_for_install(&definition, &state, &host)?;
//!
//! let report = Installer::new(definition, host).execute(&mut state, &NullSink, &CancelToken::new());
//! assert!(report.success);
//! # Ok::<(), setup_engine::SetupError>(())
//! ```

pub mod actions;
pub mod cli;
pub mod conditions;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod pipeline;
pub mod process_guard;
pub mod registry;
pub mod resolve;
pub mod selection;
pub mod state;
pub mod types;
pub mod variables;

// Re-export main types for convenience
pub use actions::{ActionContext, ActionError, ActionOutput, CustomCommandHandler, CustomHandlers};
pub use conditions::ConditionEvaluator;
pub use config::{Command, CommandAction, Component, Condition, ConditionKind, SetupDefinition};
pub use error::{Result, SetupError};
pub use events::{CancelToken, CollectingSink, EventSink, InstallEvent, NullSink};
pub use host::{Host, KnownFolders};
pub use pipeline::{InstallReport, Installer, PlannedCommand};
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use registry::{FileRegistry, Registry, RegistryValue};
pub use state::{CommandResult, LogEntry, SetupState, StatusTransitionError};
pub use types::{Architecture, CommandKind, CommandTiming, LogLevel, SetupStatus};
pub use variables::VariableExpander;

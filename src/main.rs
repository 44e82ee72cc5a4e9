//! setup - command-line front end for the installation engine

use anyhow::{Context, anyhow};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use setup_engine::cli::{Cli, Commands};
use setup_engine::config::SetupDefinition;
use setup_engine::events::{CancelToken, InstallEvent};
use setup_engine::host::{self, Host};
use setup_engine::pipeline::Installer;
use setup_engine::process_guard::{self, ChildRegistry};
use setup_engine::resolve;
use setup_engine::selection;
use setup_engine::state::SetupState;
use setup_engine::types::SetupStatus;

/// Initialize tracing; `RUST_LOG` overrides the default level
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);
    debug!("CLI arguments parsed: {:?}", cli);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("✗ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let definition = load_definition(cli.config.as_deref())?;
    let source_root = match definition.base_dir.clone() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => std::env::current_dir().context("Failed to determine the current directory")?,
    };
    let registry_path = cli.registry.clone().unwrap_or_else(host::default_registry_path);
    let host = Host::detect(source_root, &registry_path)?;
    debug!("Host: {:?}, registry {:?}", host, registry_path);

    let mut state = SetupState::new();
    state.set_dry_run(cli.dry_run);

    match cli.command {
        Commands::Validate => {
            definition.license_text()?;
            println!(
                "✓ Setup document is valid: {} {} ({} components, {} global commands, {} pages)",
                definition.application.name,
                definition.application.version,
                definition.components.len(),
                definition.global_commands.len(),
                definition.pages.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Components => {
            for component in resolve::available_components(&definition, &state, &host) {
                let flag = if component.required {
                    "required"
                } else if component.default_selected {
                    "default"
                } else {
                    "optional"
                };
                println!(
                    "{:<20} {:<9} {:>12} bytes  {}",
                    component.id, flag, component.size_bytes, component.name
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Pages => {
            for page in resolve::enabled_pages(&definition, &state, &host) {
                println!("{:>4}  {:<12} {:<20} {}", page.order, page.page_type, page.id, page.title);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Plan { select } => {
            choose_components(&definition, &mut state, &host, select);
            let path = selection::default_install_path(&definition, &state, &host);
            state.set_install_path(path);

            let installer = Installer::new(definition, host);
            for planned in installer.collect_commands(&state) {
                let command = &planned.command;
                println!(
                    "{:<13} {:>4}  {:<24} {:<26} {}",
                    command.timing,
                    command.order,
                    command.id,
                    command.kind(),
                    planned.component_id.as_deref().unwrap_or("(global)")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Install {
            install_path,
            select,
            accept_license,
            report,
        } => {
            choose_components(&definition, &mut state, &host, select);
            let path = match install_path {
                Some(path) => path.to_string_lossy().into_owned(),
                None => selection::default_install_path(&definition, &state, &host),
            };
            state.set_install_path(path);
            state.set_license_accepted(accept_license);

            for warning in selection::validate_for_install(&definition, &state, &host)? {
                println!("! {}", warning);
            }
            install(definition, host, state, report.as_deref())
        }
    }
}

fn load_definition(config: Option<&Path>) -> anyhow::Result<SetupDefinition> {
    let definition = match config {
        Some(path) => SetupDefinition::load_from_file(path)?,
        None => {
            let cwd = std::env::current_dir().context("Failed to determine the current directory")?;
            SetupDefinition::discover(cwd)?
        }
    };
    Ok(definition)
}

fn choose_components(
    definition: &SetupDefinition,
    state: &mut SetupState,
    host: &Host,
    select: Option<Vec<String>>,
) {
    match select {
        Some(ids) => selection::apply_selection(definition, state, host, ids),
        None => {
            let defaults = selection::default_selection(definition, state, host);
            state.set_selected_components(defaults);
        }
    }
}

fn install(
    definition: SetupDefinition,
    host: Host,
    state: SetupState,
    report_path: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    let cancel = CancelToken::new();
    let children = ChildRegistry::shared();

    // Without handlers Ctrl+C still kills us, just without the clean cancel
    if let Err(e) = process_guard::init_signal_handlers(cancel.clone(), children.clone()) {
        warn!("Failed to initialize signal handlers: {}", e);
    }

    info!(
        "Installing {} component(s) to {}",
        state.selected_components().len(),
        state.install_path()
    );

    let installer = Installer::new(definition, host).with_children(children);
    let (tx, rx) = mpsc::channel();
    let handle = installer
        .spawn(state, tx, cancel)
        .context("Failed to start the installer thread")?;

    for event in rx {
        match event {
            InstallEvent::Progress {
                operation,
                percentage,
                ..
            } => println!("[{:>3}%] {}", percentage, operation),
            InstallEvent::StatusChanged(status) => debug!("Status: {}", status),
            InstallEvent::Finished { success, status, .. } => {
                debug!("Finished: success={} status={}", success, status)
            }
            // Already mirrored to tracing by the state
            InstallEvent::Log(_) => {}
        }
    }

    let (state, report) = handle
        .join()
        .map_err(|_| anyhow!("Installer thread panicked"))?;

    if let Some(path) = report_path {
        state.write_report(PathBuf::from(path))?;
    }

    let failed = report.results.iter().filter(|r| !r.success).count();
    match report.status {
        SetupStatus::Completed => {
            println!(
                "\n✓ Installation completed ({} commands, {} optional failures)",
                report.results.len(),
                failed
            );
            Ok(ExitCode::SUCCESS)
        }
        SetupStatus::Cancelled => {
            println!("\n✗ Installation cancelled");
            Ok(ExitCode::from(130))
        }
        status => {
            eprintln!("\n✗ {} ({} failed commands)", status.description(), failed);
            for result in report.results.iter().filter(|r| !r.success) {
                eprintln!(
                    "  {}: {}",
                    result.command_id,
                    result.exception.as_deref().unwrap_or("failed")
                );
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

//! External process execution
//!
//! Waited processes run as leaders of their own process group and are
//! tracked in the child registry until they exit, so a cancelled or crashed
//! setup never leaves them running. Processes started with
//! `wait_for_exit = false` are detached: the command succeeds as soon as
//! the spawn does, the child is not tracked, and a background thread reaps
//! it when it exits.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::{ActionContext, ActionOutput};
use crate::config::{RunExecutableParams, RunShellCommandParams};
use crate::process_guard::{CommandProcessGroup, TrackedChild};

/// Shell used for run-shell-command
pub const SHELL: &str = "/bin/sh";

pub fn run_executable(
    ctx: &ActionContext<'_>,
    params: &RunExecutableParams,
) -> Result<ActionOutput> {
    let executable = resolve_program(ctx, &ctx.expand(&params.executable));
    let arguments: Vec<String> = params.arguments.iter().map(|a| ctx.expand(a)).collect();
    let working_directory = params
        .working_directory
        .as_deref()
        .map(|dir| ctx.target_path(dir));

    let mut command = Command::new(&executable);
    command.args(&arguments);
    run(ctx, command, working_directory.as_deref(), params.wait_for_exit)
        .with_context(|| format!("Failed to run {:?}", executable))
}

pub fn run_shell_command(
    ctx: &ActionContext<'_>,
    params: &RunShellCommandParams,
) -> Result<ActionOutput> {
    let script = ctx.expand(&params.command);
    let working_directory = params
        .working_directory
        .as_deref()
        .map(|dir| ctx.target_path(dir));

    let mut command = Command::new(SHELL);
    command.arg("-c").arg(&script);
    run(ctx, command, working_directory.as_deref(), params.wait_for_exit)
        .with_context(|| format!("Failed to run shell command '{}'", script))
}

/// Bare program names go through `PATH`; relative paths resolve against
/// the source root
fn resolve_program(ctx: &ActionContext<'_>, program: &str) -> PathBuf {
    if program.contains('/') {
        ctx.host.resolve_source(program)
    } else {
        PathBuf::from(program)
    }
}

fn run(
    ctx: &ActionContext<'_>,
    mut command: Command,
    working_directory: Option<&Path>,
    wait_for_exit: bool,
) -> Result<ActionOutput> {
    command.envs(ctx.host.process_environment());
    if let Some(dir) = working_directory.filter(|d| !d.as_os_str().is_empty()) {
        command.current_dir(dir);
    }
    tracing::info!("Running {:?}", command);

    if !wait_for_exit {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn process")?;
        let pid = child.id();
        tracing::debug!("Started detached process {}", pid);

        let reaper = std::thread::Builder::new()
            .name(format!("reap-{}", pid))
            .spawn(move || match child.wait() {
                Ok(status) => tracing::debug!("Detached process {} exited: {}", pid, status),
                Err(e) => tracing::debug!("Failed waiting for detached process {}: {}", pid, e),
            });
        if let Err(e) = reaper {
            tracing::warn!("Could not start reaper for process {}: {}", pid, e);
        }
        return Ok(ActionOutput::ok());
    }

    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .in_new_process_group()
        .spawn()
        .context("Failed to spawn process")?;

    let tracked = TrackedChild::new(ctx.children, child.id());
    let output = child
        .wait_with_output()
        .context("Failed waiting for process")?;
    drop(tracked);

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    match output.status.code() {
        Some(code) => {
            tracing::debug!("Process exited with code {}", code);
            Ok(ActionOutput {
                success: true,
                exit_code: Some(code),
                stdout,
                stderr,
                message: None,
            })
        }
        None => Ok(ActionOutput {
            success: false,
            exit_code: None,
            stdout,
            stderr,
            message: Some("process terminated by a signal".to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::Fixture;
    use crate::config::CommandAction;
    use crate::process_guard::lock_children;

    fn shell(script: &str, wait: bool) -> crate::config::Command {
        crate::config::Command::new(
            "sh",
            CommandAction::RunShellCommand(RunShellCommandParams {
                command: script.to_string(),
                working_directory: None,
                wait_for_exit: wait,
            }),
        )
    }

    fn run_shell(fixture: &Fixture, command: &crate::config::Command) -> Result<ActionOutput> {
        let CommandAction::RunShellCommand(params) = &command.action else {
            unreachable!()
        };
        run_shell_command(&fixture.context(command), params)
    }

    #[test]
    fn test_shell_command_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(dir.path());

        let output = run_shell(&fixture, &shell("echo {AppName}; echo oops >&2; exit 2", true)).unwrap();
        assert!(output.success);
        assert_eq!(output.exit_code, Some(2));
        assert_eq!(output.stdout.trim(), "Demo");
        assert_eq!(output.stderr.trim(), "oops");
        assert_eq!(lock_children(&fixture.children).count(), 0);
    }

    #[test]
    fn test_process_environment_overlay_is_inherited() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(dir.path());
        fixture.host.set_process_env("DEMO_OVERLAY", "visible");

        let output = run_shell(&fixture, &shell("printf %s \"$DEMO_OVERLAY\"", true)).unwrap();
        assert_eq!(output.stdout, "visible");
    }

    #[test]
    fn test_detached_process_succeeds_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(dir.path());

        let output = run_shell(&fixture, &shell("exit 9", false)).unwrap();
        assert!(output.success);
        assert_eq!(output.exit_code, None);
    }

    #[test]
    fn test_detached_process_is_reaped() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(dir.path());
        let pid_file = dir.path().join("pid");
        let script = format!("printf $$ > '{}'", pid_file.display());

        run_shell(&fixture, &shell(&script, false)).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        let pid = loop {
            if let Ok(pid) = std::fs::read_to_string(&pid_file) {
                if !pid.is_empty() {
                    break pid;
                }
            }
            assert!(std::time::Instant::now() < deadline, "detached process never ran");
            std::thread::sleep(std::time::Duration::from_millis(20));
        };

        // A reaped child disappears from /proc; a zombie would stay
        let proc_entry = PathBuf::from(format!("/proc/{}", pid.trim()));
        while proc_entry.exists() {
            assert!(std::time::Instant::now() < deadline, "detached process was not reaped");
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
    }

    #[test]
    fn test_run_executable_with_arguments_and_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(dir.path());
        let command = crate::config::Command::new(
            "pwd",
            CommandAction::RunExecutable(RunExecutableParams {
                executable: SHELL.to_string(),
                arguments: vec!["-c".to_string(), "pwd".to_string()],
                working_directory: Some(dir.path().to_string_lossy().into_owned()),
                wait_for_exit: true,
            }),
        );
        let CommandAction::RunExecutable(params) = &command.action else {
            unreachable!()
        };

        let output = run_executable(&fixture.context(&command), params).unwrap();
        assert_eq!(output.exit_code, Some(0));
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            Path::new(output.stdout.trim()).canonicalize().unwrap(),
            expected
        );
    }

    #[test]
    fn test_missing_executable_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(dir.path());
        let command = crate::config::Command::new(
            "missing",
            CommandAction::RunExecutable(RunExecutableParams {
                executable: "bin/does-not-exist".to_string(),
                arguments: Vec::new(),
                working_directory: None,
                wait_for_exit: true,
            }),
        );
        let CommandAction::RunExecutable(params) = &command.action else {
            unreachable!()
        };

        assert!(run_executable(&fixture.context(&command), params).is_err());
    }
}

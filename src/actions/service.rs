//! System services, installed as systemd units

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{ActionContext, ActionOutput};
use crate::config::{InstallServiceParams, UninstallServiceParams};

const SYSTEMCTL: &str = "systemctl";

pub fn install_service(
    ctx: &ActionContext<'_>,
    params: &InstallServiceParams,
) -> Result<ActionOutput> {
    let name = service_name(&ctx.expand(&params.name))?;
    let unit_path = unit_path(&ctx.target_path(&params.unit_directory), &name);

    let mut exec = vec![quote_arg(&ctx.expand(&params.executable))];
    exec.extend(params.arguments.iter().map(|a| quote_arg(&ctx.expand(a))));
    let description = match ctx.expand(&params.description) {
        d if d.is_empty() => name.clone(),
        d => d,
    };

    let unit = format!(
        "[Unit]\nDescription={}\n\n[Service]\nType=simple\nExecStart={}\nRestart=on-failure\n\n[Install]\nWantedBy=multi-user.target\n",
        description,
        exec.join(" ")
    );

    if let Some(parent) = unit_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    fs::write(&unit_path, unit).with_context(|| format!("Failed to write {:?}", unit_path))?;
    tracing::info!("Wrote service unit {:?}", unit_path);

    if params.enable {
        systemctl(&["daemon-reload"])?;
        systemctl(&["enable", &name])?;
    }

    Ok(ActionOutput::ok_with(unit_path.to_string_lossy()))
}

/// Removing a service that is not installed succeeds
pub fn uninstall_service(
    ctx: &ActionContext<'_>,
    params: &UninstallServiceParams,
) -> Result<ActionOutput> {
    let name = service_name(&ctx.expand(&params.name))?;
    let unit_path = unit_path(&ctx.target_path(&params.unit_directory), &name);

    if !unit_path.exists() {
        tracing::debug!("Service unit {:?} already absent", unit_path);
        return Ok(ActionOutput::ok());
    }

    if params.disable {
        systemctl(&["disable", "--now", &name])?;
    }

    fs::remove_file(&unit_path).with_context(|| format!("Failed to remove {:?}", unit_path))?;
    tracing::info!("Removed service unit {:?}", unit_path);
    Ok(ActionOutput::ok())
}

fn service_name(name: &str) -> Result<String> {
    let name = name.trim().trim_end_matches(".service");
    if name.is_empty() || name.contains('/') || name.chars().any(char::is_whitespace) {
        bail!("Invalid service name '{}'", name);
    }
    Ok(name.to_string())
}

fn unit_path(directory: &Path, name: &str) -> PathBuf {
    directory.join(format!("{}.service", name))
}

fn quote_arg(arg: &str) -> String {
    if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\\') {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

fn systemctl(args: &[&str]) -> Result<()> {
    let output = Command::new(SYSTEMCTL)
        .args(args)
        .output()
        .with_context(|| format!("Failed to run {} {}", SYSTEMCTL, args.join(" ")))?;

    if !output.status.success() {
        bail!(
            "{} {} failed: {}",
            SYSTEMCTL,
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::Fixture;
    use crate::config::{Command as SetupCommand, CommandAction};

    fn install(unit_directory: &str) -> SetupCommand {
        SetupCommand::new(
            "svc",
            CommandAction::InstallService(InstallServiceParams {
                name: "{AppName}-agent".to_string(),
                executable: "{InstallPath}/agent".to_string(),
                arguments: vec!["--config".to_string(), "my file.conf".to_string()],
                description: String::new(),
                unit_directory: unit_directory.to_string(),
                enable: false,
            }),
        )
    }

    #[test]
    fn test_install_writes_unit() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(dir.path());
        let units = dir.path().join("units");
        let command = install(&units.to_string_lossy());
        let CommandAction::InstallService(params) = &command.action else {
            unreachable!()
        };

        install_service(&fixture.context(&command), params).unwrap();

        let unit = fs::read_to_string(units.join("Demo-agent.service")).unwrap();
        assert!(unit.contains("Description=Demo-agent"));
        assert!(unit.contains(&format!(
            "ExecStart={}/agent --config \"my file.conf\"",
            fixture.state.install_path()
        )));
        assert!(unit.contains("WantedBy=multi-user.target"));
    }

    #[test]
    fn test_uninstall_removes_unit_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(dir.path());
        let units = dir.path().join("units");
        fs::create_dir_all(&units).unwrap();
        fs::write(units.join("demo.service"), "[Unit]\n").unwrap();

        let command = SetupCommand::new(
            "unsvc",
            CommandAction::UninstallService(UninstallServiceParams {
                name: "demo".to_string(),
                unit_directory: units.to_string_lossy().into_owned(),
                disable: false,
            }),
        );
        let CommandAction::UninstallService(params) = &command.action else {
            unreachable!()
        };

        uninstall_service(&fixture.context(&command), params).unwrap();
        assert!(!units.join("demo.service").exists());
        uninstall_service(&fixture.context(&command), params).unwrap();
    }

    #[test]
    fn test_service_name_validation() {
        assert_eq!(service_name("demo.service").unwrap(), "demo");
        assert!(service_name("").is_err());
        assert!(service_name("a/b").is_err());
        assert!(service_name("a b").is_err());
    }
}

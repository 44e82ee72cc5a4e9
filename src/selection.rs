//! Component selection and pre-install validation
//!
//! The pipeline trusts the state it is given. Everything that must hold
//! before a run starts (required components selected, a usable install
//! path, an accepted license, enough disk space) is established here.

use std::collections::BTreeSet;
use std::path::Path;

use crate::config::{Component, SetupDefinition};
use crate::error::{Result, SetupError};
use crate::host::Host;
use crate::resolve;
use crate::state::SetupState;
use crate::variables::VariableExpander;

/// Required and default-selected components available on this machine
pub fn default_selection(
    definition: &SetupDefinition,
    state: &SetupState,
    host: &Host,
) -> BTreeSet<String> {
    resolve::available_components(definition, state, host)
        .into_iter()
        .filter(|component| component.required || component.default_selected)
        .map(|component| component.id)
        .collect()
}

/// Replace the selection with `requested` plus every available required
/// component
pub fn apply_selection<I, S>(
    definition: &SetupDefinition,
    state: &mut SetupState,
    host: &Host,
    requested: I,
) where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut selected: BTreeSet<String> = requested.into_iter().map(Into::into).collect();
    for component in resolve::available_components(definition, state, host) {
        if component.required && selected.insert(component.id.clone()) {
            tracing::debug!("Adding required component '{}'", component.id);
        }
    }
    state.set_selected_components(selected);
}

/// Expanded default install path for the detected architecture, falling back
/// to `{ProgramFiles}/<AppName>`
pub fn default_install_path(definition: &SetupDefinition, state: &SetupState, host: &Host) -> String {
    let settings = resolve::effective_settings(definition, state.architecture());
    let expander = VariableExpander::new(definition, state, host);

    let template = settings.default_install_path.trim();
    if !template.is_empty() {
        return expander.expand(template);
    }

    host.folders()
        .program_files
        .join(&definition.application.name)
        .to_string_lossy()
        .into_owned()
}

/// Check that `state` is ready for an install run.
///
/// Returns warnings for problems that do not block the run (unselected
/// dependencies, selected conflicts, unknown free space).
pub fn validate_for_install(
    definition: &SetupDefinition,
    state: &SetupState,
    host: &Host,
) -> Result<Vec<String>> {
    let mut warnings = Vec::new();
    let available = resolve::available_components(definition, state, host);
    let selected = state.selected_components();

    if selected.is_empty() {
        return Err(SetupError::validation("No components selected"));
    }

    for id in selected {
        if !available.iter().any(|component| &component.id == id) {
            return Err(SetupError::validation(format!(
                "Component '{}' does not exist or is not available on this machine",
                id
            )));
        }
    }

    for component in available.iter().filter(|c| c.required) {
        if !selected.contains(&component.id) {
            return Err(SetupError::validation(format!(
                "Required component '{}' is not selected",
                component.id
            )));
        }
    }

    let install_path = state.install_path().trim();
    if install_path.is_empty() {
        return Err(SetupError::validation("Installation path is empty"));
    }
    if !Path::new(install_path).is_absolute() {
        return Err(SetupError::validation(format!(
            "Installation path '{}' is not absolute",
            install_path
        )));
    }

    let settings = resolve::effective_settings(definition, state.architecture());
    if settings.require_administrator && !host.is_elevated() {
        return Err(SetupError::validation(
            "Administrator privileges are required to run this setup",
        ));
    }

    if !settings.allow_custom_install_path {
        let default_path = default_install_path(definition, state, host);
        if normalize(install_path) != normalize(&default_path) {
            return Err(SetupError::validation(format!(
                "A custom installation path is not allowed (expected '{}')",
                default_path
            )));
        }
    }

    if let Some(license) = &definition.license {
        if license.required && !state.license_accepted() {
            return Err(SetupError::validation("The license agreement has not been accepted"));
        }
    }

    let chosen: Vec<&Component> = available
        .iter()
        .filter(|component| selected.contains(&component.id))
        .collect();

    let selected_size: u64 = chosen.iter().map(|c| c.size_bytes).sum();
    let needed = settings.minimum_disk_space.max(selected_size);
    match host.available_space(Path::new(install_path)) {
        Ok(free) if free < needed => {
            return Err(SetupError::validation(format!(
                "Not enough disk space: {} bytes required, {} bytes available",
                needed, free
            )));
        }
        Ok(_) => {}
        Err(e) => warnings.push(format!("Could not determine free disk space: {}", e)),
    }

    for component in &chosen {
        for dependency in &component.dependencies {
            if !selected.contains(dependency) {
                warnings.push(format!(
                    "Component '{}' depends on '{}', which is not selected",
                    component.id, dependency
                ));
            }
        }
        for conflict in &component.conflicts {
            if selected.contains(conflict) {
                warnings.push(format!(
                    "Component '{}' conflicts with selected component '{}'",
                    component.id, conflict
                ));
            }
        }
    }

    for warning in &warnings {
        tracing::warn!("{}", warning);
    }
    Ok(warnings)
}

fn normalize(path: &str) -> &str {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Architecture;

    fn definition() -> SetupDefinition {
        let mut definition = SetupDefinition::default();
        definition.application.name = "Demo".to_string();
        definition.global_settings.minimum_disk_space = 0;
        definition.components = vec![
            Component {
                id: "core".to_string(),
                required: true,
                ..Default::default()
            },
            Component {
                id: "docs".to_string(),
                default_selected: true,
                ..Default::default()
            },
            Component {
                id: "extras".to_string(),
                ..Default::default()
            },
        ];
        definition
    }

    #[test]
    fn test_default_selection_includes_required_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let host = Host::sandboxed(dir.path());
        let state = SetupState::with_architecture(Architecture::X64);

        let selection = default_selection(&definition(), &state, &host);
        assert_eq!(
            selection.into_iter().collect::<Vec<_>>(),
            vec!["core".to_string(), "docs".to_string()]
        );
    }

    #[test]
    fn test_apply_selection_adds_required() {
        let dir = tempfile::tempdir().unwrap();
        let host = Host::sandboxed(dir.path());
        let mut state = SetupState::with_architecture(Architecture::X64);

        apply_selection(&definition(), &mut state, &host, ["extras"]);
        assert!(state.is_selected("core"));
        assert!(state.is_selected("extras"));
        assert!(!state.is_selected("docs"));
    }

    #[test]
    fn test_default_install_path() {
        let dir = tempfile::tempdir().unwrap();
        let host = Host::sandboxed(dir.path());
        let state = SetupState::with_architecture(Architecture::X64);
        let mut definition = definition();

        assert_eq!(
            default_install_path(&definition, &state, &host),
            host.folders().program_files.join("Demo").to_string_lossy()
        );

        definition.global_settings.default_install_path = "/srv/{AppName}".to_string();
        assert_eq!(default_install_path(&definition, &state, &host), "/srv/Demo");
    }

    #[test]
    fn test_normalize_trailing_slash() {
        assert_eq!(normalize("/opt/demo/"), "/opt/demo");
        assert_eq!(normalize("/"), "/");
    }
}

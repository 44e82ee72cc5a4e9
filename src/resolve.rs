//! Architecture resolution
//!
//! Produces the effective configuration for the detected architecture:
//! settings with per-architecture overrides applied, and the component
//! catalog with incompatible components dropped and component overrides
//! merged in.

use crate::conditions::ConditionEvaluator;
use crate::config::{Component, GlobalSettings, PageDefinition, SetupDefinition};
use crate::host::Host;
use crate::state::SetupState;
use crate::types::Architecture;

/// Global settings with the overrides for `arch` applied field by field
pub fn effective_settings(definition: &SetupDefinition, arch: Architecture) -> GlobalSettings {
    let base = &definition.global_settings;
    let Some(overrides) = definition.architecture_settings.get(&arch) else {
        return base.clone();
    };

    GlobalSettings {
        default_install_path: overrides
            .default_install_path
            .clone()
            .unwrap_or_else(|| base.default_install_path.clone()),
        allow_custom_install_path: overrides
            .allow_custom_install_path
            .unwrap_or(base.allow_custom_install_path),
        create_uninstaller: overrides.create_uninstaller.unwrap_or(base.create_uninstaller),
        require_administrator: overrides
            .require_administrator
            .unwrap_or(base.require_administrator),
        minimum_disk_space: overrides.minimum_disk_space.unwrap_or(base.minimum_disk_space),
        uninstaller_name: overrides
            .uninstaller_name
            .clone()
            .unwrap_or_else(|| base.uninstaller_name.clone()),
        add_to_control_panel: overrides
            .add_to_control_panel
            .unwrap_or(base.add_to_control_panel),
        create_start_menu_entries: overrides
            .create_start_menu_entries
            .unwrap_or(base.create_start_menu_entries),
        create_desktop_shortcut: overrides
            .create_desktop_shortcut
            .unwrap_or(base.create_desktop_shortcut),
    }
}

/// Apply the override for `arch` to one component
pub fn apply_override(component: &Component, arch: Architecture) -> Component {
    let mut effective = component.clone();
    let Some(overrides) = component.architecture_overrides.get(&arch) else {
        return effective;
    };

    if let Some(name) = &overrides.name {
        effective.name = name.clone();
    }
    if let Some(description) = &overrides.description {
        effective.description = description.clone();
    }
    if let Some(default_selected) = overrides.default_selected {
        effective.default_selected = default_selected;
    }
    if let Some(size_bytes) = overrides.size_bytes {
        effective.size_bytes = size_bytes;
    }

    match (&overrides.replacement_commands, &overrides.additional_commands) {
        (Some(replacement), _) => effective.commands = replacement.clone(),
        (None, Some(additional)) => effective.commands.extend(additional.iter().cloned()),
        (None, None) => {}
    }

    effective
}

/// Components compatible with `arch`, with overrides applied, in document order
pub fn effective_components(definition: &SetupDefinition, arch: Architecture) -> Vec<Component> {
    definition
        .components
        .iter()
        .filter(|component| component.target_architecture.matches(arch))
        .map(|component| apply_override(component, arch))
        .collect()
}

/// Effective components whose own conditions pass right now
pub fn available_components(
    definition: &SetupDefinition,
    state: &SetupState,
    host: &Host,
) -> Vec<Component> {
    let evaluator = ConditionEvaluator::new(definition, state, host);
    effective_components(definition, state.architecture())
        .into_iter()
        .filter(|component| {
            let offered = evaluator.evaluate(&component.conditions);
            if !offered {
                tracing::debug!("Component '{}' hidden by its conditions", component.id);
            }
            offered
        })
        .collect()
}

/// Enabled pages whose show-conditions pass, ordered by `order`
pub fn enabled_pages(
    definition: &SetupDefinition,
    state: &SetupState,
    host: &Host,
) -> Vec<PageDefinition> {
    let evaluator = ConditionEvaluator::new(definition, state, host);
    let mut pages: Vec<PageDefinition> = definition
        .pages
        .iter()
        .filter(|page| page.enabled && evaluator.evaluate(&page.show_conditions))
        .cloned()
        .collect();
    pages.sort_by_key(|page| page.order);
    pages
}

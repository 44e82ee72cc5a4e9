//! `{Name}` placeholder expansion
//!
//! The input is scanned once. Each `{Name}` token resolves to a built-in,
//! else an author variable from the setup document, else a runtime variable
//! from the state. Substituted text is never scanned again, so a value that
//! itself contains `{...}` comes out verbatim. Built-ins are resolved on
//! every call, so a changed install path is picked up by the next command.
//! Placeholders nobody defines are left in place.

use crate::config::SetupDefinition;
use crate::host::Host;
use crate::state::SetupState;

/// Expands placeholders against a definition, a state and a host
#[derive(Debug, Clone, Copy)]
pub struct VariableExpander<'a> {
    definition: &'a SetupDefinition,
    state: &'a SetupState,
    host: &'a Host,
}

impl<'a> VariableExpander<'a> {
    pub fn new(definition: &'a SetupDefinition, state: &'a SetupState, host: &'a Host) -> Self {
        Self {
            definition,
            state,
            host,
        }
    }

    /// Current value of a built-in placeholder
    pub fn builtin(&self, name: &str) -> Option<String> {
        let app = &self.definition.application;
        let folders = self.host.folders();
        let value = match name {
            "InstallPath" => self.state.install_path().to_string(),
            "AppName" => app.name.clone(),
            "AppVersion" => app.version.clone(),
            "AppDescription" => app.description.clone(),
            "AppPublisher" => app.publisher.clone(),
            "Desktop" => folders.desktop.to_string_lossy().into_owned(),
            "StartMenu" => folders.start_menu.to_string_lossy().into_owned(),
            "ProgramFiles" => folders.program_files.to_string_lossy().into_owned(),
            "SystemRoot" => folders.system_root.to_string_lossy().into_owned(),
            "TempPath" => folders.temp.to_string_lossy().into_owned(),
            _ => return None,
        };
        Some(value)
    }

    /// Value of `name`: built-in, then author variable, then runtime variable
    pub fn lookup(&self, name: &str) -> Option<String> {
        self.builtin(name)
            .or_else(|| self.definition.variables.get(name).cloned())
            .or_else(|| self.state.variables().get(name).cloned())
    }

    pub fn expand(&self, input: &str) -> String {
        if !input.contains('{') {
            return input.to_string();
        }

        let mut result = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(open) = rest.find('{') {
            result.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            match after.find(['{', '}']) {
                Some(close) if after[close..].starts_with('}') => {
                    let name = &after[..close];
                    match self.lookup(name) {
                        Some(value) => result.push_str(&value),
                        None => {
                            result.push('{');
                            result.push_str(name);
                            result.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                // Another '{' first: this one is literal
                Some(_) => {
                    result.push('{');
                    rest = after;
                }
                None => {
                    result.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }

        result.push_str(rest);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Architecture;

    fn fixture(base: &std::path::Path) -> (SetupDefinition, SetupState, Host) {
        let mut definition = SetupDefinition::default();
        definition.application.name = "Demo".to_string();
        definition.application.version = "1.2.3".to_string();
        definition
            .variables
            .insert("Channel".to_string(), "stable".to_string());

        let mut state = SetupState::with_architecture(Architecture::X64);
        state.set_install_path("/opt/demo");
        state.set_variable("Build", "42");

        (definition, state, Host::sandboxed(base))
    }

    #[test]
    fn test_expands_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let (definition, state, host) = fixture(dir.path());
        let expander = VariableExpander::new(&definition, &state, &host);

        assert_eq!(
            expander.expand("{InstallPath}/bin/{AppName}-{AppVersion}"),
            "/opt/demo/bin/Demo-1.2.3"
        );
        assert_eq!(
            expander.expand("{Desktop}"),
            dir.path().join("Desktop").to_string_lossy()
        );
    }

    #[test]
    fn test_expands_author_then_runtime_variables() {
        let dir = tempfile::tempdir().unwrap();
        let (definition, state, host) = fixture(dir.path());
        let expander = VariableExpander::new(&definition, &state, &host);

        assert_eq!(expander.expand("{Channel}-{Build}"), "stable-42");
    }

    #[test]
    fn test_unresolved_placeholder_is_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let (definition, state, host) = fixture(dir.path());
        let expander = VariableExpander::new(&definition, &state, &host);

        assert_eq!(expander.expand("{Nope}/x"), "{Nope}/x");
        assert_eq!(expander.expand(""), "");
    }

    #[test]
    fn test_install_path_is_read_at_call_time() {
        let dir = tempfile::tempdir().unwrap();
        let (definition, mut state, host) = fixture(dir.path());

        let before = VariableExpander::new(&definition, &state, &host).expand("{InstallPath}");
        state.set_install_path("/srv/demo");
        let after = VariableExpander::new(&definition, &state, &host).expand("{InstallPath}");

        assert_eq!(before, "/opt/demo");
        assert_eq!(after, "/srv/demo");
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let dir = tempfile::tempdir().unwrap();
        let (mut definition, mut state, host) = fixture(dir.path());
        definition
            .variables
            .insert("Tag".to_string(), "build-{Build}".to_string());
        state.set_install_path("/opt/{AppName}");
        let expander = VariableExpander::new(&definition, &state, &host);

        assert_eq!(expander.expand("{Tag}"), "build-{Build}");
        assert_eq!(expander.expand("{InstallPath}"), "/opt/{AppName}");
        assert_eq!(expander.expand("{Tag}/{Build}"), "build-{Build}/42");
    }

    #[test]
    fn test_builtin_takes_precedence_over_variables() {
        let dir = tempfile::tempdir().unwrap();
        let (mut definition, mut state, host) = fixture(dir.path());
        definition
            .variables
            .insert("AppName".to_string(), "Shadow".to_string());
        state.set_variable("Channel", "nightly");
        let expander = VariableExpander::new(&definition, &state, &host);

        assert_eq!(expander.expand("{AppName}"), "Demo");
        assert_eq!(expander.expand("{Channel}"), "stable");
    }

    #[test]
    fn test_stray_braces_are_literal() {
        let dir = tempfile::tempdir().unwrap();
        let (definition, state, host) = fixture(dir.path());
        let expander = VariableExpander::new(&definition, &state, &host);

        assert_eq!(expander.expand("{{AppName}"), "{Demo");
        assert_eq!(expander.expand("a{b"), "a{b");
        assert_eq!(expander.expand("}{AppName}}"), "}Demo}");
    }
}

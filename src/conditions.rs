//! Condition evaluation
//!
//! A condition list is an AND with short-circuit; `negate` flips a single
//! condition before it joins the AND. Results are never cached, since a
//! command earlier in the run may change what a later condition sees.

use crate::config::{Condition, ConditionKind, SetupDefinition};
use crate::host::Host;
use crate::state::SetupState;
use crate::types::RegistryRoot;
use crate::variables::VariableExpander;
use std::path::Path;

/// Evaluates conditions against the live machine and the current state
#[derive(Debug, Clone, Copy)]
pub struct ConditionEvaluator<'a> {
    state: &'a SetupState,
    host: &'a Host,
    expander: VariableExpander<'a>,
}

impl<'a> ConditionEvaluator<'a> {
    pub fn new(definition: &'a SetupDefinition, state: &'a SetupState, host: &'a Host) -> Self {
        Self {
            state,
            host,
            expander: VariableExpander::new(definition, state, host),
        }
    }

    /// True when every condition passes (an empty list passes)
    pub fn evaluate(&self, conditions: &[Condition]) -> bool {
        conditions.iter().all(|condition| self.evaluate_one(condition))
    }

    pub fn evaluate_one(&self, condition: &Condition) -> bool {
        let result = self.check(condition);
        if condition.negate { !result } else { result }
    }

    fn check(&self, condition: &Condition) -> bool {
        match &condition.kind {
            ConditionKind::FileExists => {
                Path::new(&self.expander.expand(&condition.target)).is_file()
            }
            ConditionKind::DirectoryExists => {
                Path::new(&self.expander.expand(&condition.target)).is_dir()
            }
            ConditionKind::RegistryKeyExists => {
                let target = self.expander.expand(&condition.target);
                let (root, key_path) = split_registry_root(&target);
                self.host.registry().key_exists(root, key_path)
            }
            ConditionKind::EnvironmentVariable => {
                let value = self.host.env_var(&condition.target);
                if condition.expected_value.is_empty() {
                    value.is_some_and(|v| !v.is_empty())
                } else {
                    value.is_some_and(|v| v.eq_ignore_ascii_case(&condition.expected_value))
                }
            }
            ConditionKind::Architecture => self
                .state
                .architecture()
                .to_string()
                .eq_ignore_ascii_case(&condition.expected_value),
            ConditionKind::DryRun => self
                .state
                .dry_run()
                .to_string()
                .eq_ignore_ascii_case(&condition.expected_value),
            ConditionKind::Unknown(tag) => {
                tracing::debug!("Unknown condition type '{}', treating as satisfied", tag);
                true
            }
        }
    }
}

/// Split an optional `HKLM\`, `HKCU\` or `HKCR\` prefix off a key path.
/// Paths without a prefix live under the local-machine root.
pub fn split_registry_root(path: &str) -> (RegistryRoot, &str) {
    let prefixes: [(&str, RegistryRoot); 6] = [
        ("HKEY_LOCAL_MACHINE", RegistryRoot::LocalMachine),
        ("HKLM", RegistryRoot::LocalMachine),
        ("HKEY_CURRENT_USER", RegistryRoot::CurrentUser),
        ("HKCU", RegistryRoot::CurrentUser),
        ("HKEY_CLASSES_ROOT", RegistryRoot::ClassesRoot),
        ("HKCR", RegistryRoot::ClassesRoot),
    ];

    for (prefix, root) in prefixes {
        let Some(head) = path.get(..prefix.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(prefix) {
            continue;
        }
        let rest = &path[prefix.len()..];
        if rest.is_empty() {
            return (root, rest);
        }
        if let Some(stripped) = rest.strip_prefix(['\\', '/']) {
            return (root, stripped);
        }
    }
    (RegistryRoot::LocalMachine, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryValue;
    use crate::types::Architecture;

    fn fixture(base: &Path) -> (SetupDefinition, SetupState, Host) {
        let mut definition = SetupDefinition::default();
        definition.application.name = "Demo".to_string();
        let state = SetupState::with_architecture(Architecture::X64);
        (definition, state, Host::sandboxed(base))
    }

    #[test]
    fn test_empty_list_passes() {
        let dir = tempfile::tempdir().unwrap();
        let (definition, state, host) = fixture(dir.path());
        let evaluator = ConditionEvaluator::new(&definition, &state, &host);
        assert!(evaluator.evaluate(&[]));
    }

    #[test]
    fn test_file_and_directory_exists() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("marker.txt");
        std::fs::write(&file, "x").unwrap();

        let (definition, state, host) = fixture(dir.path());
        let evaluator = ConditionEvaluator::new(&definition, &state, &host);

        let file_target = file.to_string_lossy().into_owned();
        let dir_target = dir.path().to_string_lossy().into_owned();

        assert!(evaluator.evaluate_one(&Condition::new(ConditionKind::FileExists, file_target.clone(), "")));
        assert!(!evaluator.evaluate_one(&Condition::new(ConditionKind::DirectoryExists, file_target, "")));
        assert!(evaluator.evaluate_one(&Condition::new(ConditionKind::DirectoryExists, dir_target, "")));
    }

    #[test]
    fn test_target_is_expanded() {
        let dir = tempfile::tempdir().unwrap();
        let (definition, mut state, host) = fixture(dir.path());
        state.set_install_path(dir.path().to_string_lossy());

        let evaluator = ConditionEvaluator::new(&definition, &state, &host);
        assert!(evaluator.evaluate_one(&Condition::new(
            ConditionKind::DirectoryExists,
            "{InstallPath}",
            ""
        )));
    }

    #[test]
    fn test_registry_key_exists() {
        let dir = tempfile::tempdir().unwrap();
        let (definition, state, host) = fixture(dir.path());
        host.registry()
            .set_value(
                RegistryRoot::LocalMachine,
                r"Software\Demo",
                "",
                RegistryValue::String(String::new()),
            )
            .unwrap();

        let evaluator = ConditionEvaluator::new(&definition, &state, &host);
        assert!(evaluator.evaluate_one(&Condition::new(
            ConditionKind::RegistryKeyExists,
            r"Software\Demo",
            ""
        )));
        assert!(evaluator.evaluate_one(&Condition::new(
            ConditionKind::RegistryKeyExists,
            r"HKLM\Software\Demo",
            ""
        )));
        assert!(!evaluator.evaluate_one(&Condition::new(
            ConditionKind::RegistryKeyExists,
            r"HKCU\Software\Demo",
            ""
        )));
    }

    #[test]
    fn test_environment_variable() {
        let dir = tempfile::tempdir().unwrap();
        let (definition, state, host) = fixture(dir.path());
        host.set_process_env("SETUP_ENGINE_COND_TEST", "Yes");

        let evaluator = ConditionEvaluator::new(&definition, &state, &host);
        assert!(evaluator.evaluate_one(&Condition::new(
            ConditionKind::EnvironmentVariable,
            "SETUP_ENGINE_COND_TEST",
            ""
        )));
        assert!(evaluator.evaluate_one(&Condition::new(
            ConditionKind::EnvironmentVariable,
            "SETUP_ENGINE_COND_TEST",
            "yes"
        )));
        assert!(!evaluator.evaluate_one(&Condition::new(
            ConditionKind::EnvironmentVariable,
            "SETUP_ENGINE_COND_TEST_MISSING",
            ""
        )));
    }

    #[test]
    fn test_architecture_and_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let (definition, mut state, host) = fixture(dir.path());
        state.set_dry_run(true);

        let evaluator = ConditionEvaluator::new(&definition, &state, &host);
        assert!(evaluator.evaluate_one(&Condition::new(ConditionKind::Architecture, "", "X64")));
        assert!(!evaluator.evaluate_one(&Condition::new(ConditionKind::Architecture, "", "arm64")));
        assert!(evaluator.evaluate_one(&Condition::new(ConditionKind::DryRun, "", "TRUE")));
        assert!(!evaluator.evaluate_one(&Condition::new(ConditionKind::DryRun, "", "false")));
    }

    #[test]
    fn test_negate_and_short_circuit() {
        let dir = tempfile::tempdir().unwrap();
        let (definition, state, host) = fixture(dir.path());
        let evaluator = ConditionEvaluator::new(&definition, &state, &host);

        let is_x64 = Condition::new(ConditionKind::Architecture, "", "x64");
        let missing = Condition::new(ConditionKind::FileExists, "/definitely/not/here", "");

        assert!(!evaluator.evaluate_one(&is_x64.clone().negated()));
        assert!(evaluator.evaluate(&[is_x64.clone(), missing.clone().negated()]));
        assert!(!evaluator.evaluate(&[missing, is_x64]));
    }

    #[test]
    fn test_unknown_condition_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let (definition, state, host) = fixture(dir.path());
        let evaluator = ConditionEvaluator::new(&definition, &state, &host);

        let unknown = Condition::new(ConditionKind::Unknown("OsVersion".to_string()), "", "");
        assert!(evaluator.evaluate_one(&unknown));
        assert!(!evaluator.evaluate_one(&unknown.negated()));
    }

    #[test]
    fn test_split_registry_root() {
        assert_eq!(
            split_registry_root(r"HKCU\Environment"),
            (RegistryRoot::CurrentUser, "Environment")
        );
        assert_eq!(
            split_registry_root(r"hkey_classes_root\.txt"),
            (RegistryRoot::ClassesRoot, ".txt")
        );
        assert_eq!(
            split_registry_root(r"HKLMSoftware"),
            (RegistryRoot::LocalMachine, "HKLMSoftware")
        );
        assert_eq!(
            split_registry_root(r"Software\Demo"),
            (RegistryRoot::LocalMachine, r"Software\Demo")
        );
    }
}

//! Setup document loading tests
//!
//! Covers a complete document with every command type, architecture
//! resolution of the loaded model, and the fatal configuration errors.

use std::fs;

use setup_engine::config::{CommandAction, ConditionKind};
use setup_engine::error::SetupError;
use setup_engine::resolve;
use setup_engine::types::{
    Architecture, CommandKind, CommandTiming, EnvironmentTarget, PageType, RegistryRoot,
    RegistryValueKind,
};
use setup_engine::{Host, SetupDefinition, SetupState};

const FULL_DOCUMENT: &str = r#"{
  "application": {
    "name": "Demo",
    "version": "3.2.1",
    "publisher": "Demo Corp",
    "description": "Demo application"
  },
  "global_settings": {
    "default_install_path": "{ProgramFiles}/Demo",
    "allow_custom_install_path": true,
    "minimum_disk_space": 1024
  },
  "architecture_settings": {
    "arm64": { "default_install_path": "/opt/demo-arm" }
  },
  "license": { "text_file_path": "LICENSE.txt" },
  "variables": { "DataDir": "{InstallPath}/data" },
  "components": [
    {
      "id": "core",
      "name": "Core",
      "required": true,
      "size_bytes": 2048,
      "commands": [
        { "id": "copy", "type": "copy_file",
          "parameters": { "source": "payload/app", "destination": "{InstallPath}/app" } },
        { "id": "tree", "type": "copy_directory",
          "parameters": { "source": "payload/share", "destination": "{InstallPath}/share", "recursive": false } },
        { "id": "mkdir", "type": "create_directory", "timing": "pre_install",
          "parameters": { "path": "{DataDir}" } },
        { "id": "link", "type": "create_shortcut", "timing": "post_install",
          "parameters": { "target_path": "{InstallPath}/app", "shortcut_path": "{Desktop}/Demo" } },
        { "id": "reg", "type": "write_registry",
          "parameters": { "root": "current_user", "key_path": "Software\\Demo", "value_name": "Flags",
                          "value": "0x10", "value_type": "dword" } },
        { "id": "unreg", "type": "delete_registry", "timing": "uninstall",
          "parameters": { "key_path": "Software\\Demo" } },
        { "id": "exe", "type": "run_executable", "required": false,
          "parameters": { "executable": "{InstallPath}/app", "arguments": ["--init"], "wait_for_exit": false } },
        { "id": "sh", "type": "run_shell_command",
          "parameters": { "command": "true" },
          "success_criteria": { "expected_exit_code": 0 } },
        { "id": "unpack", "type": "extract_archive",
          "parameters": { "archive_path": "payload/data.tar.gz", "destination": "{DataDir}" } },
        { "id": "env", "type": "set_environment_variable",
          "parameters": { "name": "DEMO_HOME", "value": "{InstallPath}", "target": "user" } },
        { "id": "assoc", "type": "create_file_association",
          "parameters": { "extension": ".demo", "prog_id": "Demo.File", "description": "Demo",
                          "executable": "{InstallPath}/app" } },
        { "id": "svc", "type": "install_service",
          "parameters": { "name": "demo", "executable": "{InstallPath}/app", "enable": false } },
        { "id": "unsvc", "type": "uninstall_service", "timing": "uninstall",
          "parameters": { "name": "demo" } },
        { "id": "hook", "type": "custom",
          "parameters": { "handler": "telemetry", "parameters": { "opt_in": false } } }
      ],
      "architecture_overrides": {
        "arm64": {
          "size_bytes": 4096,
          "additional_commands": [
            { "id": "arm-extra", "type": "create_directory", "parameters": { "path": "{InstallPath}/arm" } }
          ]
        }
      }
    },
    {
      "id": "docs",
      "name": "Documentation",
      "default_selected": true,
      "dependencies": ["core"],
      "conditions": [ { "type": "DirectoryExists", "target": "{TempPath}", "negate": false } ]
    },
    {
      "id": "x86-tools",
      "name": "Legacy tools",
      "target_architecture": "x86"
    }
  ],
  "pages": [
    { "id": "done", "title": "Finished", "page_type": "completion", "order": 9 },
    { "id": "welcome", "title": "Welcome", "page_type": "welcome", "order": 0 },
    { "id": "license", "title": "License", "page_type": "license", "order": 1,
      "show_conditions": [ { "type": "future_condition", "target": "x" } ] }
  ]
}"#;

fn write_document(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("setup.json");
    fs::write(&path, FULL_DOCUMENT).unwrap();
    fs::write(dir.join("LICENSE.txt"), "Use at your own risk.\n").unwrap();
    path
}

#[test]
fn test_full_document_loads_every_command_type() {
    let dir = tempfile::tempdir().unwrap();
    let definition = SetupDefinition::load_from_file(write_document(dir.path())).unwrap();

    let core = definition.component("core").unwrap();
    let kinds: Vec<CommandKind> = core.commands.iter().map(|c| c.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            CommandKind::CopyFile,
            CommandKind::CopyDirectory,
            CommandKind::CreateDirectory,
            CommandKind::CreateShortcut,
            CommandKind::WriteRegistry,
            CommandKind::DeleteRegistry,
            CommandKind::RunExecutable,
            CommandKind::RunShellCommand,
            CommandKind::ExtractArchive,
            CommandKind::SetEnvironmentVariable,
            CommandKind::CreateFileAssociation,
            CommandKind::InstallService,
            CommandKind::UninstallService,
            CommandKind::Custom,
        ]
    );

    assert_eq!(core.commands[2].timing, CommandTiming::PreInstall);
    assert!(!core.commands[6].required);
    assert!(core.commands[0].required);

    match &core.commands[4].action {
        CommandAction::WriteRegistry(params) => {
            assert_eq!(params.root, RegistryRoot::CurrentUser);
            assert_eq!(params.value_type, RegistryValueKind::Dword);
        }
        other => panic!("unexpected action {:?}", other),
    }
    match &core.commands[9].action {
        CommandAction::SetEnvironmentVariable(params) => {
            assert_eq!(params.target, EnvironmentTarget::User)
        }
        other => panic!("unexpected action {:?}", other),
    }
    match &core.commands[11].action {
        CommandAction::InstallService(params) => {
            assert_eq!(params.unit_directory, "/etc/systemd/system");
            assert!(!params.enable);
        }
        other => panic!("unexpected action {:?}", other),
    }

    let docs = definition.component("docs").unwrap();
    assert_eq!(docs.conditions[0].kind, ConditionKind::DirectoryExists);
    assert_eq!(definition.base_dir.as_deref(), Some(dir.path()));
}

#[test]
fn test_license_text_is_read_relative_to_document() {
    let dir = tempfile::tempdir().unwrap();
    let definition = SetupDefinition::load_from_file(write_document(dir.path())).unwrap();

    let license = definition.license.as_ref().unwrap();
    assert!(license.required);
    assert_eq!(license.title, "License Agreement");
    assert_eq!(
        definition.license_text().unwrap().as_deref(),
        Some("Use at your own risk.\n")
    );
}

#[test]
fn test_architecture_resolution_of_loaded_document() {
    let dir = tempfile::tempdir().unwrap();
    let definition = SetupDefinition::load_from_file(write_document(dir.path())).unwrap();

    let x64 = resolve::effective_components(&definition, Architecture::X64);
    assert_eq!(
        x64.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
        vec!["core", "docs"]
    );
    assert_eq!(x64[0].commands.len(), 14);
    assert_eq!(x64[0].size_bytes, 2048);

    let arm = resolve::effective_components(&definition, Architecture::Arm64);
    assert_eq!(arm[0].size_bytes, 4096);
    assert_eq!(arm[0].commands.last().unwrap().id, "arm-extra");

    let x86 = resolve::effective_components(&definition, Architecture::X86);
    assert!(x86.iter().any(|c| c.id == "x86-tools"));

    assert_eq!(
        resolve::effective_settings(&definition, Architecture::Arm64).default_install_path,
        "/opt/demo-arm"
    );
    let x64_settings = resolve::effective_settings(&definition, Architecture::X64);
    assert_eq!(x64_settings.default_install_path, "{ProgramFiles}/Demo");
    assert_eq!(x64_settings.minimum_disk_space, 1024);
}

#[test]
fn test_pages_sorted_and_unknown_conditions_pass() {
    let dir = tempfile::tempdir().unwrap();
    let definition = SetupDefinition::load_from_file(write_document(dir.path())).unwrap();
    let host = Host::sandboxed(dir.path());
    let state = SetupState::with_architecture(Architecture::X64);

    let pages = resolve::enabled_pages(&definition, &state, &host);
    let ids: Vec<&str> = pages.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["welcome", "license", "done"]);
    assert_eq!(pages[2].page_type, PageType::Completion);
}

#[test]
fn test_discover_prefers_root_document() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("config")).unwrap();
    fs::write(
        dir.path().join("config/setup.json"),
        r#"{ "application": { "name": "Nested" } }"#,
    )
    .unwrap();

    let nested = SetupDefinition::discover(dir.path()).unwrap();
    assert_eq!(nested.application.name, "Nested");

    fs::write(
        dir.path().join("setup.json"),
        r#"{ "application": { "name": "Root" } }"#,
    )
    .unwrap();
    let root = SetupDefinition::discover(dir.path()).unwrap();
    assert_eq!(root.application.name, "Root");
}

#[test]
fn test_missing_document_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SetupDefinition::discover(dir.path()).unwrap_err();
    assert!(matches!(err, SetupError::Config(_)));
}

#[test]
fn test_malformed_documents_are_config_errors() {
    let cases = [
        "{ not json",
        r#"{ "application": { "name": "" } }"#,
        r#"{ "application": { "name": "Demo" },
             "global_commands": [ { "id": "x", "type": "format_disk", "parameters": {} } ] }"#,
        r#"{ "application": { "name": "Demo" },
             "global_commands": [ { "id": "x", "type": "copy_file", "parameters": { "source": "a" } } ] }"#,
        r#"{ "application": { "name": "Demo" },
             "components": [ { "id": "a" }, { "id": "a" } ] }"#,
    ];

    for case in cases {
        let err = SetupDefinition::from_json_str(case).unwrap_err();
        assert!(matches!(err, SetupError::Config(_)), "{}: {:?}", case, err);
    }
}

#[test]
fn test_save_and_reload_preserves_commands() {
    let dir = tempfile::tempdir().unwrap();
    let definition = SetupDefinition::load_from_file(write_document(dir.path())).unwrap();

    let copy = dir.path().join("copy.json");
    definition.save_to_file(&copy).unwrap();
    let reloaded = SetupDefinition::load_from_file(&copy).unwrap();

    let original = &definition.component("core").unwrap().commands;
    let again = &reloaded.component("core").unwrap().commands;
    assert_eq!(original.len(), again.len());
    for (a, b) in original.iter().zip(again) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.action, b.action);
        assert_eq!(a.timing, b.timing);
    }
}

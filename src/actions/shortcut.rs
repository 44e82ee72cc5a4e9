//! Shortcuts as freedesktop `.desktop` launchers

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use super::{ActionContext, ActionOutput};
use crate::config::CreateShortcutParams;

pub fn create_shortcut(
    ctx: &ActionContext<'_>,
    params: &CreateShortcutParams,
) -> Result<ActionOutput> {
    let shortcut_path = launcher_path(&ctx.target_path(&params.shortcut_path));
    let entry = DesktopEntry {
        name: shortcut_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| ctx.definition.application.name.clone()),
        target: ctx.expand(&params.target_path),
        arguments: ctx.expand(&params.arguments),
        comment: ctx.expand(&params.description),
        working_directory: ctx.expand(&params.working_directory),
        icon: ctx.expand(&params.icon_path),
    };
    tracing::debug!("Creating shortcut {:?} -> {}", shortcut_path, entry.target);

    if let Some(parent) = shortcut_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    fs::write(&shortcut_path, entry.render())
        .with_context(|| format!("Failed to write shortcut {:?}", shortcut_path))?;
    fs::set_permissions(&shortcut_path, fs::Permissions::from_mode(0o755))?;

    Ok(ActionOutput::ok_with(shortcut_path.to_string_lossy()))
}

/// Launchers need the `.desktop` extension to be picked up by menus
fn launcher_path(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext == "desktop" => path.to_path_buf(),
        Some(ext) if ext == "lnk" => path.with_extension("desktop"),
        _ => {
            let mut name = path.as_os_str().to_os_string();
            name.push(".desktop");
            PathBuf::from(name)
        }
    }
}

struct DesktopEntry {
    name: String,
    target: String,
    arguments: String,
    comment: String,
    working_directory: String,
    icon: String,
}

impl DesktopEntry {
    fn render(&self) -> String {
        let mut exec = quote_exec(&self.target);
        if !self.arguments.is_empty() {
            exec.push(' ');
            exec.push_str(&self.arguments);
        }

        let mut out = String::from("[Desktop Entry]\nType=Application\nVersion=1.0\n");
        out.push_str(&format!("Name={}\n", self.name));
        out.push_str(&format!("Exec={}\n", exec));
        if !self.comment.is_empty() {
            out.push_str(&format!("Comment={}\n", self.comment));
        }
        if !self.working_directory.is_empty() {
            out.push_str(&format!("Path={}\n", self.working_directory));
        }
        if !self.icon.is_empty() {
            out.push_str(&format!("Icon={}\n", self.icon));
        }
        out.push_str("Terminal=false\n");
        out
    }
}

fn quote_exec(target: &str) -> String {
    if target.contains(char::is_whitespace) {
        format!("\"{}\"", target.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        target.to_string()
    }
}

//! File-type associations, registered under the classes root:
//!
//! ```text
//! <extension>                       (default) = <prog_id>
//! <prog_id>                         (default) = <description>
//! <prog_id>\shell\open\command      (default) = "<executable>" "%1"
//! ```

use anyhow::{Context, Result, bail};

use super::{ActionContext, ActionOutput};
use crate::config::CreateFileAssociationParams;
use crate::registry::RegistryValue;
use crate::types::RegistryRoot;

pub fn create_file_association(
    ctx: &ActionContext<'_>,
    params: &CreateFileAssociationParams,
) -> Result<ActionOutput> {
    let extension = normalize_extension(&ctx.expand(&params.extension));
    let prog_id = ctx.expand(&params.prog_id);
    let description = ctx.expand(&params.description);
    let executable = ctx.expand(&params.executable);

    if extension.len() < 2 {
        bail!("Invalid file extension '{}'", params.extension);
    }
    if prog_id.is_empty() {
        bail!("File association for '{}' has an empty prog_id", extension);
    }
    tracing::debug!("Associating {} with {} ({})", extension, prog_id, executable);

    let registry = ctx.host.registry();
    let root = RegistryRoot::ClassesRoot;

    registry
        .set_value(root, &prog_id, "", RegistryValue::String(description))
        .with_context(|| format!("Failed to register {}", prog_id))?;
    registry.set_value(
        root,
        &format!(r"{}\shell\open\command", prog_id),
        "",
        RegistryValue::String(format!("\"{}\" \"%1\"", executable)),
    )?;
    registry
        .set_value(root, &extension, "", RegistryValue::String(prog_id))
        .with_context(|| format!("Failed to associate {}", extension))?;

    Ok(ActionOutput::ok())
}

fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim();
    if trimmed.starts_with('.') {
        trimmed.to_string()
    } else {
        format!(".{}", trimmed)
    }
}

//! Registry writes and deletes

use anyhow::{Context, Result};

use super::{ActionContext, ActionOutput};
use crate::config::{DeleteRegistryParams, WriteRegistryParams};
use crate::registry::RegistryValue;

pub fn write_registry(
    ctx: &ActionContext<'_>,
    params: &WriteRegistryParams,
) -> Result<ActionOutput> {
    let key_path = ctx.expand(&params.key_path);
    let value_name = ctx.expand(&params.value_name);
    let value = RegistryValue::parse(params.value_type, &ctx.expand(&params.value))?;
    tracing::debug!(
        "Writing registry value {}\\{}\\{} = {}",
        params.root,
        key_path,
        value_name,
        value
    );

    ctx.host
        .registry()
        .set_value(params.root, &key_path, &value_name, value)
        .with_context(|| format!("Failed to write registry key {}\\{}", params.root, key_path))?;
    Ok(ActionOutput::ok())
}

/// Deleting something that is already gone succeeds
pub fn delete_registry(
    ctx: &ActionContext<'_>,
    params: &DeleteRegistryParams,
) -> Result<ActionOutput> {
    let key_path = ctx.expand(&params.key_path);
    let registry = ctx.host.registry();

    let removed = match params.value_name.as_deref().map(|name| ctx.expand(name)) {
        Some(name) if !name.is_empty() => {
            tracing::debug!("Deleting registry value {}\\{}\\{}", params.root, key_path, name);
            registry.delete_value(params.root, &key_path, &name)?
        }
        _ => {
            tracing::debug!("Deleting registry key {}\\{}", params.root, key_path);
            registry.delete_key(params.root, &key_path)?
        }
    };

    if !removed {
        tracing::debug!("Registry entry {}\\{} was already absent", params.root, key_path);
    }
    Ok(ActionOutput::ok())
}

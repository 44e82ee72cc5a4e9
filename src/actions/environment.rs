//! Environment variables
//!
//! Process-scope variables go into the host overlay, which every process
//! spawned later in the run inherits. User and machine variables persist in
//! the registry under the conventional `Environment` keys.

use anyhow::{Result, bail};

use super::{ActionContext, ActionOutput};
use crate::config::SetEnvironmentVariableParams;
use crate::registry::RegistryValue;
use crate::types::{EnvironmentTarget, RegistryRoot};

pub const USER_ENVIRONMENT_KEY: &str = "Environment";
pub const MACHINE_ENVIRONMENT_KEY: &str =
    r"SYSTEM\CurrentControlSet\Control\Session Manager\Environment";

pub fn set_environment_variable(
    ctx: &ActionContext<'_>,
    params: &SetEnvironmentVariableParams,
) -> Result<ActionOutput> {
    let name = ctx.expand(&params.name);
    let value = ctx.expand(&params.value);

    if name.is_empty() || name.contains('=') || name.contains('\0') {
        bail!("Invalid environment variable name '{}'", name);
    }
    tracing::debug!("Setting {} environment variable {}={}", params.target, name, value);

    match params.target {
        EnvironmentTarget::Process => ctx.host.set_process_env(&name, &value),
        EnvironmentTarget::User => ctx.host.registry().set_value(
            RegistryRoot::CurrentUser,
            USER_ENVIRONMENT_KEY,
            &name,
            RegistryValue::String(value),
        )?,
        EnvironmentTarget::Machine => ctx.host.registry().set_value(
            RegistryRoot::LocalMachine,
            MACHINE_ENVIRONMENT_KEY,
            &name,
            RegistryValue::String(value),
        )?,
    }

    Ok(ActionOutput::ok())
}

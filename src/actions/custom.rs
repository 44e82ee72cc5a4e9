//! Extension commands
//!
//! A `custom` command names a handler; embedders register handlers by name
//! before running the installer. A command whose handler is not registered
//! cannot run at all and is reported as unsupported.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{ActionContext, ActionError, ActionOutput};
use crate::config::CustomParams;

/// Handler for `custom` commands
pub trait CustomCommandHandler: Send + Sync {
    fn execute(
        &self,
        params: &CustomParams,
        ctx: &ActionContext<'_>,
    ) -> anyhow::Result<ActionOutput>;
}

impl<F> CustomCommandHandler for F
where
    F: Fn(&CustomParams, &ActionContext<'_>) -> anyhow::Result<ActionOutput> + Send + Sync,
{
    fn execute(
        &self,
        params: &CustomParams,
        ctx: &ActionContext<'_>,
    ) -> anyhow::Result<ActionOutput> {
        self(params, ctx)
    }
}

/// Registered custom handlers, keyed by name
#[derive(Clone, Default)]
pub struct CustomHandlers {
    handlers: BTreeMap<String, Arc<dyn CustomCommandHandler>>,
}

impl CustomHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one with the same name
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl CustomCommandHandler + 'static,
    ) {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    /// Register a closure as a handler
    pub fn register_fn<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&CustomParams, &ActionContext<'_>) -> anyhow::Result<ActionOutput>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn CustomCommandHandler>> {
        self.handlers.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl fmt::Debug for CustomHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}

pub fn run_custom(
    ctx: &ActionContext<'_>,
    handlers: &CustomHandlers,
    params: &CustomParams,
) -> Result<ActionOutput, ActionError> {
    let Some(handler) = handlers.get(&params.handler) else {
        return Err(ActionError::Unsupported(format!(
            "no handler registered for custom command '{}'",
            params.handler
        )));
    };

    tracing::debug!("Running custom handler '{}'", params.handler);
    Ok(handler.execute(params, ctx)?)
}

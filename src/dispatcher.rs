//! Single entry point from a raw input line to a command result. The REPL,
//! one-shot `-c` mode and tests all go through `Dispatcher::execute_line`.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::ShellError;
use crate::parser::parse;
use crate::registry::validation::validate;
use crate::registry::{CommandContext, CommandOutput, CommandRegistry};
use crate::state::Session;

#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn shared_registry(&self) -> Arc<CommandRegistry> {
        Arc::clone(&self.registry)
    }

    /// Parse, resolve, validate and run one line. `None` for a blank line.
    /// Every failure comes back as a `ShellError`; the session stays usable.
    pub fn execute_line(
        &self,
        session: &Session,
        line: &str,
    ) -> Option<Result<CommandOutput, ShellError>> {
        let inv = match parse(line) {
            Ok(Some(inv)) => inv,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };
        session.record_history(line);

        let descriptor = match self.registry.resolve(&inv.command) {
            Ok(d) => d,
            Err(e) => return Some(Err(e)),
        };
        if let Err(e) = validate(descriptor, &inv) {
            debug!(command = descriptor.name, error = %e, "rejected by validation");
            return Some(Err(e));
        }

        let ctx = CommandContext {
            session,
            registry: &self.registry,
        };
        let started = Instant::now();
        let result = (descriptor.handler)(&ctx, &inv)
            .map_err(|cause| ShellError::from_handler(descriptor.name, cause));
        info!(
            command = descriptor.name,
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "command finished"
        );
        Some(result)
    }
}

use crate::entity::EntityCategory;
use crate::error::HandlerError;
use crate::parser::ParsedInvocation;
use crate::registry::catalog::help_text;
use crate::registry::{CommandContext, CommandOutput, Flow};

pub fn help(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    Ok(CommandOutput::new(help_text(ctx.registry, inv.arg(0))))
}

pub fn exit(_ctx: &CommandContext<'_>, _inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    Ok(CommandOutput::new("").with_flow(Flow::Exit))
}

/// Console mode is run by the REPL, which owns the terminal.
pub fn console(ctx: &CommandContext<'_>, _inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    if ctx.session.console_active() {
        return Err(HandlerError::failed("Console mode is already active"));
    }
    Ok(CommandOutput::new("").with_flow(Flow::EnterConsole))
}

pub fn refresh(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    match inv.arg(0) {
        None => {
            let cleared = ctx.session.with_cache(|cache| cache.clear());
            Ok(CommandOutput::new(format!(
                "Cleared cached names ({cleared} categories)"
            )))
        }
        Some(slug) => {
            let category = EntityCategory::from_slug(slug).ok_or_else(|| {
                let known: Vec<&str> = EntityCategory::all().iter().map(|c| c.slug()).collect();
                HandlerError::invalid(
                    "CATEGORY",
                    slug,
                    format!("expected one of {}", known.join(", ")),
                )
            })?;
            ctx.session.invalidate(category);
            Ok(CommandOutput::new(format!(
                "Cleared cached {} names",
                category.slug()
            )))
        }
    }
}

pub fn history(ctx: &CommandContext<'_>, _inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let entries = ctx.session.history();
    if entries.is_empty() {
        return Ok(CommandOutput::new("No history"));
    }
    let width = entries.len().to_string().len();
    let lines: Vec<String> = entries
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:>width$}  {line}", i + 1))
        .collect();
    Ok(CommandOutput::data(lines.join("\n"), &entries))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::*;
    use crate::api::mock::MockApi;
    use crate::api::PrinterApi;
    use crate::parser::parse;
    use crate::registry::CommandRegistry;
    use crate::state::{test_session, Session};

    fn run(session: &Session, line: &str) -> Result<CommandOutput, HandlerError> {
        let registry = CommandRegistry::with_builtins().unwrap();
        let inv = parse(line).unwrap().unwrap();
        let descriptor = registry.resolve(&inv.command).unwrap();
        let ctx = CommandContext {
            session,
            registry: &registry,
        };
        (descriptor.handler)(&ctx, &inv)
    }

    #[test]
    fn exit_quit_and_console_set_flow() {
        let session = test_session(Arc::new(MockApi::new()), PathBuf::from("/tmp"));
        assert_eq!(run(&session, "exit").unwrap().flow, Flow::Exit);
        assert_eq!(run(&session, "quit").unwrap().flow, Flow::Exit);
        assert_eq!(run(&session, "console").unwrap().flow, Flow::EnterConsole);
        assert_eq!(run(&session, "help").unwrap().flow, Flow::Continue);

        let _guard = session.try_begin_console().unwrap();
        assert!(run(&session, "console").is_err());
    }

    #[test]
    fn refresh_one_category_or_all() {
        let api = Arc::new(MockApi::with_objects(&["fan_generic BedFans"]));
        let session = test_session(Arc::clone(&api) as Arc<dyn PrinterApi>, PathBuf::from("/tmp"));
        session.entity_names(EntityCategory::Fan);
        session.entity_names(EntityCategory::Pin);
        assert_eq!(api.list_objects_calls.load(Ordering::SeqCst), 2);

        run(&session, "refresh fans").unwrap();
        session.entity_names(EntityCategory::Fan);
        session.entity_names(EntityCategory::Pin);
        assert_eq!(api.list_objects_calls.load(Ordering::SeqCst), 3);

        let out = run(&session, "refresh").unwrap();
        assert_eq!(out.message, "Cleared cached names (2 categories)");

        assert!(matches!(
            run(&session, "refresh toasters"),
            Err(HandlerError::Invalid { ref param, .. }) if param == "CATEGORY"
        ));
    }

    #[test]
    fn history_is_numbered() {
        let session = test_session(Arc::new(MockApi::new()), PathBuf::from("/tmp"));
        assert_eq!(run(&session, "history").unwrap().message, "No history");
        session.record_history("get_fan");
        session.record_history("home X");
        assert_eq!(run(&session, "history").unwrap().message, "1  get_fan\n2  home X");
    }
}

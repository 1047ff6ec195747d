//! rustyline glue: completion through `complete`, plus a usage hint after a
//! bare command name.

use std::sync::Arc;

use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

use super::complete;
use crate::registry::CommandRegistry;
use crate::state::Session;

pub struct ShellHelper {
    session: Arc<Session>,
    registry: Arc<CommandRegistry>,
}

impl ShellHelper {
    pub fn new(session: Arc<Session>, registry: Arc<CommandRegistry>) -> Self {
        Self { session, registry }
    }

    /// Remainder of the usage line once `line` is exactly `<command> `.
    fn usage_hint(&self, line: &str, pos: usize) -> Option<String> {
        if pos != line.len() || !line.ends_with(' ') {
            return None;
        }
        let name = line.trim_end();
        if name.contains(char::is_whitespace) {
            return None;
        }
        let usage = self.registry.get(name)?.usage;
        let rest = usage.strip_prefix(name)?.trim_start();
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let completion = complete(line, pos, &self.session, &self.registry);
        let pairs = completion
            .candidates
            .into_iter()
            .map(|candidate| Pair {
                display: candidate.clone(),
                replacement: candidate,
            })
            .collect();
        Ok((completion.start, pairs))
    }
}

impl Hinter for ShellHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        self.usage_hint(line, pos)
    }
}

impl Highlighter for ShellHelper {}

impl Validator for ShellHelper {}

impl Helper for ShellHelper {}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::api::mock::MockApi;
    use crate::state::test_session;

    fn helper() -> ShellHelper {
        ShellHelper::new(
            Arc::new(test_session(Arc::new(MockApi::new()), PathBuf::from("/tmp"))),
            Arc::new(CommandRegistry::with_builtins().unwrap()),
        )
    }

    #[test]
    fn hints_usage_after_command() {
        let h = helper();
        assert_eq!(
            h.usage_hint("set_fan ", 8).as_deref(),
            Some("<name> SPEED=<0.0-1.0>")
        );
        assert_eq!(h.usage_hint("set_fan", 7), None);
        assert_eq!(h.usage_hint("set_fan fan ", 12), None);
        assert_eq!(h.usage_hint("pwd ", 4), None);
        assert_eq!(h.usage_hint("nope ", 5), None);
    }
}

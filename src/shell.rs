//! Interactive REPL and one-shot execution. The line editor sits behind a
//! trait so the loop can be driven by scripted input in tests.

use std::io::{self, Write};
use std::sync::Arc;

use rustyline::config::{CompletionType, Config};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use serde_json::json;
use tracing::{debug, info};

use crate::completion::ShellHelper;
use crate::console::viewer::{ConsoleSummary, TerminalInput};
use crate::console::ConsoleViewer;
use crate::dispatcher::Dispatcher;
use crate::error::ShellError;
use crate::registry::{CommandOutput, Flow};
use crate::state::Session;

pub const PROMPT: &str = "klipper> ";
pub const BANNER: &str =
    "Klipper console. Type 'help' for commands, Tab to complete, 'exit' to quit.";
const GOODBYE: &str = "Goodbye!";

// ── Line editor seam ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    Line(String),
    /// Ctrl+C at the prompt.
    Interrupted,
    /// Ctrl+D.
    Eof,
}

pub trait LineEditor {
    fn read_line(&mut self, prompt: &str) -> Result<ReadResult, ShellError>;
    fn add_history(&mut self, line: &str);
}

pub struct RustylineEditor {
    editor: Editor<ShellHelper, DefaultHistory>,
}

impl RustylineEditor {
    pub fn new(helper: ShellHelper) -> Result<Self, ShellError> {
        let config = Config::builder()
            .completion_type(CompletionType::List)
            .auto_add_history(false)
            .build();
        let mut editor = Editor::with_config(config).map_err(ShellError::terminal)?;
        editor.set_helper(Some(helper));
        Ok(Self { editor })
    }
}

impl LineEditor for RustylineEditor {
    fn read_line(&mut self, prompt: &str) -> Result<ReadResult, ShellError> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(ReadResult::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(ReadResult::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadResult::Eof),
            Err(e) => Err(ShellError::terminal(e)),
        }
    }

    fn add_history(&mut self, line: &str) {
        if let Err(e) = self.editor.add_history_entry(line) {
            debug!(error = %e, "failed to record editor history");
        }
    }
}

// ── Rendering ───────────────────────────────────────────────────────

/// Text for one result, or `None` when there is nothing to show.
pub fn render_result(result: &Result<CommandOutput, ShellError>, json: bool) -> Option<String> {
    match (result, json) {
        (Ok(out), false) => (!out.message.is_empty()).then(|| out.message.clone()),
        (Ok(out), true) => {
            if out.message.is_empty() && out.data.is_none() {
                return None;
            }
            Some(pretty(&json!({ "message": out.message, "data": out.data })))
        }
        (Err(e), false) => Some(format!("Error: {e}")),
        (Err(e), true) => Some(pretty(&json!({ "error": e.to_string(), "detail": e }))),
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn write_line<W: Write>(out: &mut W, text: &str) -> Result<(), ShellError> {
    writeln!(out, "{text}").map_err(ShellError::terminal)
}

// ── Console mode ────────────────────────────────────────────────────

pub type ConsoleRunner = Box<dyn FnMut(&Session) -> Result<ConsoleSummary, ShellError>>;

/// Console mode on the real terminal: raw-mode input, coloured output.
pub fn run_terminal_console(session: &Session) -> Result<ConsoleSummary, ShellError> {
    let input = TerminalInput::new()?;
    let stdout = io::stdout();
    ConsoleViewer::new(session, input, stdout.lock())
        .with_color(true)
        .run()
}

// ── REPL ────────────────────────────────────────────────────────────

pub struct Repl<E: LineEditor> {
    editor: E,
    session: Arc<Session>,
    dispatcher: Dispatcher,
    json: bool,
    console: ConsoleRunner,
}

impl<E: LineEditor> Repl<E> {
    pub fn new(editor: E, session: Arc<Session>, dispatcher: Dispatcher) -> Self {
        Self {
            editor,
            session,
            dispatcher,
            json: false,
            console: Box::new(run_terminal_console),
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_console_runner(mut self, runner: ConsoleRunner) -> Self {
        self.console = runner;
        self
    }

    /// Read-execute-print until `exit`/`quit` or Ctrl+D. Command failures
    /// are printed and the loop continues; only terminal I/O errors end it.
    pub fn run<W: Write>(&mut self, out: &mut W) -> Result<(), ShellError> {
        write_line(out, BANNER)?;
        loop {
            let line = match self.editor.read_line(PROMPT)? {
                ReadResult::Line(line) => line,
                ReadResult::Interrupted => continue,
                ReadResult::Eof => break,
            };
            if line.trim().is_empty() {
                continue;
            }
            self.editor.add_history(&line);
            if self.step(&line, out)? == Flow::Exit {
                break;
            }
        }
        write_line(out, GOODBYE)?;
        info!(commands = self.session.history().len(), "session ended");
        Ok(())
    }

    fn step<W: Write>(&mut self, line: &str, out: &mut W) -> Result<Flow, ShellError> {
        let Some(result) = self.dispatcher.execute_line(&self.session, line) else {
            return Ok(Flow::Continue);
        };
        if let Some(text) = render_result(&result, self.json) {
            write_line(out, &text)?;
        }
        let flow = result.map_or(Flow::Continue, |o| o.flow);
        if flow == Flow::EnterConsole {
            out.flush().map_err(ShellError::terminal)?;
            if let Err(e) = (self.console)(self.session.as_ref()) {
                write_line(out, &format!("Error: {e}"))?;
            }
        }
        Ok(flow)
    }
}

/// Execute a single line non-interactively. Returns whether it succeeded.
pub fn run_once<W: Write>(
    dispatcher: &Dispatcher,
    session: &Session,
    line: &str,
    json: bool,
    out: &mut W,
) -> Result<bool, ShellError> {
    let Some(result) = dispatcher.execute_line(session, line) else {
        return Ok(true);
    };
    if let Some(text) = render_result(&result, json) {
        write_line(out, &text)?;
    }
    match result {
        Ok(output) if output.flow == Flow::EnterConsole => {
            run_terminal_console(session)?;
            Ok(true)
        }
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

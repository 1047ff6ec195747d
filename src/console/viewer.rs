//! Foreground half of console mode: renders buffered events, forwards typed
//! lines as G-code, and keeps polling input so Ctrl+C is always responsive.

use std::io::Write;
use std::time::{Duration, Instant};

use crossterm::cursor::{MoveTo, MoveToColumn, RestorePosition, SavePosition};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::{Color, Print, Stylize};
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::queue;
use tracing::{debug, info};

use super::consumer::ConsoleConsumer;
use super::status::StatusLine;
use super::{ConsoleEvent, ConsumerState};
use crate::error::ShellError;
use crate::model::EventKind;
use crate::render;
use crate::state::Session;

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long leaving console mode waits for the worker before detaching it.
const CLOSE_WAIT: Duration = Duration::from_millis(250);
const PROMPT: &str = "> ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Line(String),
    /// Ctrl+C or Ctrl+D.
    Interrupt,
}

/// Keyboard seam for the viewer.
pub trait InputSource {
    /// Wait up to `timeout` for a complete line or an interrupt.
    fn poll(&mut self, timeout: Duration) -> Result<Option<InputEvent>, ShellError>;

    /// Characters typed so far on the current line.
    fn pending(&self) -> &str {
        ""
    }
}

// ── Terminal input ──────────────────────────────────────────────────

struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            debug!(error = %e, "failed to leave raw mode");
        }
    }
}

/// Raw-mode line reader over crossterm events. Raw mode is left on drop.
pub struct TerminalInput {
    line: String,
    _raw: RawModeGuard,
}

impl TerminalInput {
    pub fn new() -> Result<Self, ShellError> {
        terminal::enable_raw_mode().map_err(ShellError::terminal)?;
        Ok(Self {
            line: String::new(),
            _raw: RawModeGuard,
        })
    }
}

impl InputSource for TerminalInput {
    fn poll(&mut self, timeout: Duration) -> Result<Option<InputEvent>, ShellError> {
        if !event::poll(timeout).map_err(ShellError::terminal)? {
            return Ok(None);
        }
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = event::read().map_err(ShellError::terminal)?
        else {
            return Ok(None);
        };
        Ok(match code {
            KeyCode::Char('c' | 'd') if modifiers.contains(KeyModifiers::CONTROL) => {
                Some(InputEvent::Interrupt)
            }
            KeyCode::Enter => Some(InputEvent::Line(std::mem::take(&mut self.line))),
            KeyCode::Backspace => {
                self.line.pop();
                None
            }
            KeyCode::Char(c) => {
                self.line.push(c);
                None
            }
            _ => None,
        })
    }

    fn pending(&self) -> &str {
        &self.line
    }
}

// ── Viewer ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleSummary {
    pub rendered: usize,
    pub forwarded: usize,
}

pub struct ConsoleViewer<'a, I, W> {
    session: &'a Session,
    input: I,
    out: W,
    color: bool,
    status: Option<StatusLine>,
    /// Prompt text currently on screen, if any.
    drawn: Option<String>,
}

impl<'a, I: InputSource, W: Write> ConsoleViewer<'a, I, W> {
    pub fn new(session: &'a Session, input: I, out: W) -> Self {
        let settings = session.settings();
        let status = settings
            .split_screen
            .then(|| StatusLine::new(settings.status_interval()));
        Self {
            session,
            input,
            out,
            color: false,
            status,
            drawn: None,
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Run console mode until interrupt, upstream close or failure. Only one
    /// viewer may run per session.
    pub fn run(&mut self) -> Result<ConsoleSummary, ShellError> {
        let _guard = self.session.try_begin_console()?;
        let settings = self.session.settings();
        let mut consumer = ConsoleConsumer::start(
            self.session.shared_api(),
            settings.console_history,
            settings.console_capacity,
        );
        info!("entered console mode");
        self.line("Console mode: type G-code and press Enter. Ctrl+C or Ctrl+D to exit.")?;

        let mut summary = ConsoleSummary::default();
        let outcome = self.pump(&consumer, &mut summary);

        let (final_state, straggler) = consumer.close_within(CLOSE_WAIT);
        if let Some(handle) = straggler {
            self.session.park_worker(handle);
        }
        summary.rendered += self.render_events(&consumer.drain())?;
        self.clear_prompt()?;
        info!(state = final_state.label(), rendered = summary.rendered, "left console mode");

        outcome.map(|()| summary)
    }

    fn pump(&mut self, consumer: &ConsoleConsumer, summary: &mut ConsoleSummary) -> Result<(), ShellError> {
        loop {
            summary.rendered += self.render_events(&consumer.drain())?;
            match consumer.state() {
                ConsumerState::Failed(cause) => return Err(ShellError::ConsumerFailed { cause }),
                ConsumerState::Closed => {
                    self.line("Console stream closed by printer")?;
                    return Ok(());
                }
                _ => {}
            }
            self.refresh_status()?;
            self.draw_prompt()?;

            match self.input.poll(POLL_INTERVAL)? {
                Some(InputEvent::Line(line)) => {
                    self.clear_prompt()?;
                    if self.forward(consumer, &line) {
                        summary.forwarded += 1;
                    }
                }
                Some(InputEvent::Interrupt) => return Ok(()),
                None => {}
            }
        }
    }

    /// Echo a typed line and send it as G-code. Returns whether anything was sent.
    fn forward(&self, consumer: &ConsoleConsumer, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }
        consumer.echo(EventKind::Command, format!("> {line}"));
        match self.session.api().run_gcode(line) {
            Ok(response) => {
                let response = response.trim();
                if !response.is_empty() && response != "ok" {
                    consumer.echo(EventKind::Response, response);
                }
            }
            Err(e) => consumer.echo(EventKind::Error, format!("Error: {e}")),
        }
        true
    }

    fn styled(&self, event: &ConsoleEvent) -> String {
        let line = render::console_line(event);
        if !self.color {
            return line;
        }
        let color = match event.kind {
            EventKind::Command => Color::Cyan,
            EventKind::Error => Color::Red,
            EventKind::Warning => Color::Yellow,
            EventKind::Response => return line,
        };
        line.with(color).to_string()
    }

    fn render_events(&mut self, events: &[ConsoleEvent]) -> Result<usize, ShellError> {
        if events.is_empty() {
            return Ok(0);
        }
        self.clear_prompt()?;
        for event in events {
            let text = self.styled(event);
            write!(self.out, "{text}\r\n").map_err(ShellError::terminal)?;
        }
        self.out.flush().map_err(ShellError::terminal)?;
        Ok(events.len())
    }

    fn line(&mut self, text: &str) -> Result<(), ShellError> {
        self.clear_prompt()?;
        write!(self.out, "{text}\r\n").map_err(ShellError::terminal)?;
        self.out.flush().map_err(ShellError::terminal)
    }

    fn draw_prompt(&mut self) -> Result<(), ShellError> {
        let pending = self.input.pending();
        if self.drawn.as_deref() == Some(pending) {
            return Ok(());
        }
        let pending = pending.to_string();
        queue!(
            self.out,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(PROMPT),
            Print(&pending)
        )
        .map_err(ShellError::terminal)?;
        self.out.flush().map_err(ShellError::terminal)?;
        self.drawn = Some(pending);
        Ok(())
    }

    fn clear_prompt(&mut self) -> Result<(), ShellError> {
        if self.drawn.take().is_some() {
            queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))
                .map_err(ShellError::terminal)?;
        }
        Ok(())
    }

    fn refresh_status(&mut self) -> Result<(), ShellError> {
        let Some(status) = self.status.as_mut() else {
            return Ok(());
        };
        let Some(text) = status.refresh(self.session.lookup_api(), Instant::now()) else {
            return Ok(());
        };
        queue!(
            self.out,
            SavePosition,
            MoveTo(0, 0),
            Clear(ClearType::CurrentLine),
            Print(text.reverse()),
            RestorePosition
        )
        .map_err(ShellError::terminal)?;
        self.out.flush().map_err(ShellError::terminal)
    }
}

// ── Scripted input (tests) ──────────────────────────────────────────

/// Replays a fixed list of polls. `None` entries are idle polls; once the
/// script runs out, it reports an interrupt.
#[cfg(test)]
pub struct ScriptedInput {
    steps: std::collections::VecDeque<Option<InputEvent>>,
}

#[cfg(test)]
impl ScriptedInput {
    pub fn new(steps: Vec<Option<InputEvent>>) -> Self {
        Self {
            steps: steps.into(),
        }
    }
}

#[cfg(test)]
impl InputSource for ScriptedInput {
    fn poll(&mut self, timeout: Duration) -> Result<Option<InputEvent>, ShellError> {
        match self.steps.pop_front() {
            Some(Some(event)) => Ok(Some(event)),
            Some(None) => {
                std::thread::sleep(timeout.min(Duration::from_millis(20)));
                Ok(None)
            }
            None => Ok(Some(InputEvent::Interrupt)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::api::mock::{message, FeedStep, MockApi};
    use crate::api::PrinterApi;
    use crate::error::ApiError;
    use crate::state::test_session;

    fn line(s: &str) -> Option<InputEvent> {
        Some(InputEvent::Line(s.into()))
    }

    fn run_with(api: MockApi, steps: Vec<Option<InputEvent>>) -> (Result<ConsoleSummary, ShellError>, String, Arc<MockApi>) {
        let api = Arc::new(api);
        let session = test_session(Arc::clone(&api) as Arc<dyn PrinterApi>, PathBuf::from("/tmp"));
        let mut out = Vec::new();
        let result = ConsoleViewer::new(&session, ScriptedInput::new(steps), &mut out).run();
        assert!(!session.console_active());
        (result, String::from_utf8(out).unwrap(), api)
    }

    #[test]
    fn forwards_lines_and_renders_history() {
        let mut api = MockApi::new();
        api.history = vec![message("// Klipper state: Ready", Some(0.0))];
        api.gcode_responses = HashMap::from([("M115".to_string(), "FIRMWARE_NAME:Klipper".to_string())]);

        let (result, out, api) = run_with(api, vec![None, line("M115"), line("G28"), line("   "), None]);
        let summary = result.unwrap();
        assert_eq!(summary.forwarded, 2);
        assert_eq!(api.gcode_sent(), vec!["M115", "G28"]);
        assert!(out.contains("// Klipper state: Ready"));
        assert!(out.contains("> M115"));
        assert!(out.contains("FIRMWARE_NAME:Klipper"));
        assert!(out.contains("> G28"));
        // A bare "ok" is not echoed.
        assert!(!out.contains("] ok"));
    }

    #[test]
    fn gcode_failure_becomes_error_event() {
        let (result, out, _) = run_with(MockApi::new(), vec![line("FAIL now"), None]);
        assert!(result.is_ok());
        assert!(out.contains("> FAIL now"));
        assert!(out.contains("Error: Moonraker error (400): mock failure now"));
    }

    #[test]
    fn consumer_failure_surfaces_once_after_draining() {
        let api = MockApi::new();
        *api.feed.lock() = vec![
            FeedStep::Message(message("partial", None)),
            FeedStep::Fail(ApiError::protocol("unexpected close")),
        ];
        let steps = (0..50).map(|_| None).collect();
        let (result, out, _) = run_with(api, steps);
        assert!(matches!(
            result,
            Err(ShellError::ConsumerFailed {
                cause: ApiError::Protocol { .. }
            })
        ));
        assert!(out.contains("partial"));
    }

    #[test]
    fn interrupt_returns_promptly() {
        let start = Instant::now();
        let (result, _, api) = run_with(MockApi::new(), vec![Some(InputEvent::Interrupt)]);
        assert!(result.is_ok());
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(api.gcode_sent().is_empty());
    }

    #[test]
    fn interrupt_while_history_stalls_detaches_the_worker() {
        let mut api = MockApi::new();
        api.history_delay = Some(Duration::from_secs(2));
        let session = test_session(Arc::new(api), PathBuf::from("/tmp"));
        let mut out = Vec::new();

        let start = Instant::now();
        let result = ConsoleViewer::new(&session, ScriptedInput::new(vec![None]), &mut out).run();
        assert!(result.is_ok());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!session.console_active());
        assert_eq!(session.parked_workers(), 1);

        assert_eq!(session.join_workers(Duration::from_secs(5)), 0);
    }

    #[test]
    fn busy_session_rejects_second_viewer() {
        let session = test_session(Arc::new(MockApi::new()), PathBuf::from("/tmp"));
        let _held = session.try_begin_console().unwrap();
        let mut out = Vec::new();
        let result = ConsoleViewer::new(&session, ScriptedInput::new(vec![]), &mut out).run();
        assert_eq!(result.err(), Some(ShellError::ConsoleBusy));
    }

    #[test]
    fn responses_are_not_styled() {
        let session = test_session(Arc::new(MockApi::new()), PathBuf::from("/tmp"));
        let mut out = Vec::new();
        let viewer = ConsoleViewer::new(&session, ScriptedInput::new(vec![]), &mut out).with_color(true);
        let event = ConsoleEvent {
            timestamp: 0.0,
            seq: 0,
            kind: EventKind::Error,
            text: "!! boom".into(),
        };
        assert!(viewer.styled(&event).contains("!! boom"));
        let plain = ConsoleEvent {
            kind: EventKind::Response,
            ..event
        };
        assert_eq!(viewer.styled(&plain), render::console_line(&plain));
    }
}

//! Background worker that seeds the buffer from console history, then
//! streams the live feed until cancelled, disconnected or failed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{ConsoleEvent, ConsumerState, RingBuffer};
use crate::api::{ConsoleFeed, PrinterApi};
use crate::error::ApiError;
use crate::model::{ConsoleMessage, EventKind};
use crate::util::now_secs;

const CLOSE_POLL: Duration = Duration::from_millis(10);

struct Shared {
    buffer: RingBuffer<ConsoleEvent>,
    seq: AtomicU64,
    state: Mutex<ConsumerState>,
    cancel: AtomicBool,
}

impl Shared {
    fn set_state(&self, next: ConsumerState) {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return;
        }
        debug!(from = state.label(), to = next.label(), "console consumer state");
        *state = next;
        drop(state);
        self.buffer.wake();
    }

    fn append(&self, timestamp: Option<f64>, kind: EventKind, text: String) {
        let event = ConsoleEvent {
            timestamp: timestamp.unwrap_or_else(now_secs),
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            kind,
            text,
        };
        if self.buffer.push(event) {
            debug!("console buffer full, oldest event evicted");
        }
    }

    fn append_message(&self, msg: ConsoleMessage) {
        self.append(msg.time, msg.kind, msg.message);
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// One console session's producer. Dropping it cancels and joins the worker.
pub struct ConsoleConsumer {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl ConsoleConsumer {
    /// Spawn the worker. `history` messages are requested before the live
    /// subscription opens; the buffer holds at most `capacity` events.
    pub fn start(api: Arc<dyn PrinterApi>, history: usize, capacity: usize) -> Self {
        let shared = Arc::new(Shared {
            buffer: RingBuffer::new(capacity),
            seq: AtomicU64::new(0),
            state: Mutex::new(ConsumerState::Idle),
            cancel: AtomicBool::new(false),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("console-consumer".into())
            .spawn(move || run(&worker_shared, api.as_ref(), history));

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                shared.set_state(ConsumerState::Failed(ApiError::Io {
                    message: format!("cannot spawn console worker: {e}"),
                }));
                None
            }
        };
        Self { shared, worker }
    }

    pub fn state(&self) -> ConsumerState {
        self.shared.state.lock().clone()
    }

    /// Append a foreground event (typed command, its response or error).
    pub fn echo(&self, kind: EventKind, text: impl Into<String>) {
        self.shared.append(None, kind, text.into());
    }

    pub fn drain(&self) -> Vec<ConsoleEvent> {
        self.shared.buffer.drain()
    }

    /// Drain, waiting up to `timeout` when nothing is buffered.
    pub fn wait_events(&self, timeout: Duration) -> Vec<ConsoleEvent> {
        self.shared.buffer.wait_drain(timeout)
    }

    pub fn buffered(&self) -> usize {
        self.shared.buffer.len()
    }

    /// Ask the worker to stop. It moves to `Draining` at its next poll.
    pub fn cancel(&self) {
        if !self.shared.cancel.swap(true, Ordering::SeqCst) {
            debug!("console consumer cancellation requested");
        }
        self.shared.buffer.wake();
    }

    /// Cancel and wait for the worker to exit. Buffered events stay
    /// available to `drain`. Returns the final state.
    pub fn close(&mut self) -> ConsumerState {
        self.cancel();
        if let Some(handle) = self.worker.take() {
            self.join(handle);
        }
        self.state()
    }

    /// Cancel and wait at most `timeout` for the worker. A worker still
    /// blocked in a request is handed back so the caller can reap it later;
    /// the state then reads `Draining`.
    pub fn close_within(&mut self, timeout: Duration) -> (ConsumerState, Option<JoinHandle<()>>) {
        self.cancel();
        let Some(handle) = self.worker.take() else {
            return (self.state(), None);
        };
        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                self.shared.set_state(ConsumerState::Draining);
                debug!("console worker still blocked, detaching");
                return (self.state(), Some(handle));
            }
            thread::sleep(CLOSE_POLL);
        }
        self.join(handle);
        (self.state(), None)
    }

    fn join(&self, handle: JoinHandle<()>) {
        if handle.join().is_err() {
            self.shared.set_state(ConsumerState::Failed(ApiError::protocol(
                "console worker panicked",
            )));
        }
    }
}

impl Drop for ConsoleConsumer {
    fn drop(&mut self) {
        self.close();
    }
}

fn run(shared: &Shared, api: &dyn PrinterApi, history: usize) {
    shared.set_state(ConsumerState::Connecting);

    match api.console_history(history) {
        Ok(messages) => {
            debug!(count = messages.len(), "console history loaded");
            for msg in messages {
                shared.append_message(msg);
            }
        }
        Err(e) => {
            warn!(error = %e, "console history unavailable");
            shared.append(
                None,
                EventKind::Warning,
                format!("Warning: Could not load history: {e}"),
            );
        }
    }

    if shared.cancelled() {
        shared.set_state(ConsumerState::Draining);
        shared.set_state(ConsumerState::Closed);
        return;
    }

    let mut feed = match api.subscribe_console() {
        Ok(feed) => feed,
        Err(e) => {
            warn!(error = %e, "console subscription failed");
            shared.set_state(ConsumerState::Failed(e));
            return;
        }
    };
    shared.set_state(ConsumerState::Streaming);
    info!("console streaming");

    match stream(shared, feed.as_mut()) {
        Ok(()) => {
            shared.set_state(ConsumerState::Draining);
            feed.close();
            shared.set_state(ConsumerState::Closed);
            info!("console consumer closed");
        }
        Err(e) => {
            feed.close();
            warn!(error = %e, "console stream failed");
            shared.set_state(ConsumerState::Failed(e));
        }
    }
}

/// Pump the feed until cancellation or a clean disconnect (`Ok`) or an
/// unrecoverable error (`Err`).
fn stream(shared: &Shared, feed: &mut dyn ConsoleFeed) -> Result<(), ApiError> {
    while !shared.cancelled() {
        match feed.next_event() {
            Ok(Some(msg)) => shared.append_message(msg),
            Ok(None) => {}
            Err(ApiError::Disconnected) => {
                info!("console feed disconnected");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::api::mock::{message, FeedStep, MockApi};

    fn wait_for(consumer: &ConsoleConsumer, pred: impl Fn(&ConsumerState) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !pred(&consumer.state()) {
            assert!(Instant::now() < deadline, "timed out in {:?}", consumer.state());
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn texts(events: &[ConsoleEvent]) -> Vec<&str> {
        events.iter().map(|e| e.text.as_str()).collect()
    }

    #[test]
    fn history_then_live_in_order() {
        let mut api = MockApi::new();
        api.history = vec![message("G28", Some(10.0)), message("ok", Some(10.0))];
        *api.feed.lock() = vec![
            FeedStep::Message(message("// live", Some(10.0))),
            FeedStep::Message(message("!! oops", Some(11.0))),
        ];
        let mut consumer = ConsoleConsumer::start(Arc::new(api), 100, 1000);
        wait_for(&consumer, |_| consumer.buffered() == 4);
        assert_eq!(consumer.close(), ConsumerState::Closed);

        let events = consumer.drain();
        assert_eq!(texts(&events), vec!["G28", "ok", "// live", "!! oops"]);
        assert!(events.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(events[3].kind, EventKind::Error);
    }

    #[test]
    fn cancel_while_streaming_closes_without_losing_events() {
        let api = Arc::new(MockApi::new());
        *api.feed.lock() = vec![
            FeedStep::Message(message("one", None)),
            FeedStep::Message(message("two", None)),
        ];
        let mut consumer = ConsoleConsumer::start(Arc::clone(&api) as Arc<dyn PrinterApi>, 0, 10);
        wait_for(&consumer, |s| *s == ConsumerState::Streaming);
        wait_for(&consumer, |_| consumer.buffered() == 2);

        let start = Instant::now();
        consumer.cancel();
        assert_eq!(consumer.close(), ConsumerState::Closed);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(api.feed_closed.load(Ordering::SeqCst));
        assert_eq!(texts(&consumer.drain()), vec!["one", "two"]);
    }

    #[test]
    fn close_within_hands_back_a_blocked_worker() {
        let mut api = MockApi::new();
        api.history_delay = Some(Duration::from_millis(500));
        let mut consumer = ConsoleConsumer::start(Arc::new(api), 10, 10);
        wait_for(&consumer, |s| *s == ConsumerState::Connecting);

        let start = Instant::now();
        let (state, handle) = consumer.close_within(Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_millis(400));
        assert_eq!(state, ConsumerState::Draining);
        let handle = handle.unwrap();
        handle.join().unwrap();
        assert_eq!(consumer.state(), ConsumerState::Closed);
    }

    #[test]
    fn close_within_joins_a_prompt_worker() {
        let mut consumer = ConsoleConsumer::start(Arc::new(MockApi::new()), 0, 10);
        wait_for(&consumer, |s| *s == ConsumerState::Streaming);
        let (state, handle) = consumer.close_within(Duration::from_secs(2));
        assert_eq!(state, ConsumerState::Closed);
        assert!(handle.is_none());
    }

    #[test]
    fn disconnect_drains_to_closed() {
        let api = MockApi::new();
        *api.feed.lock() = vec![
            FeedStep::Message(message("last words", None)),
            FeedStep::Fail(ApiError::Disconnected),
        ];
        let consumer = ConsoleConsumer::start(Arc::new(api), 0, 10);
        wait_for(&consumer, ConsumerState::is_terminal);
        assert_eq!(consumer.state(), ConsumerState::Closed);
        assert_eq!(texts(&consumer.drain()), vec!["last words"]);
    }

    #[test]
    fn auth_failure_is_terminal_and_keeps_partial_output() {
        let api = MockApi::new();
        *api.feed.lock() = vec![
            FeedStep::Message(message("before", None)),
            FeedStep::Fail(ApiError::Auth {
                message: "token expired".into(),
            }),
        ];
        let mut consumer = ConsoleConsumer::start(Arc::new(api), 0, 10);
        wait_for(&consumer, ConsumerState::is_terminal);
        assert!(matches!(consumer.state(), ConsumerState::Failed(ApiError::Auth { .. })));
        assert!(matches!(consumer.close(), ConsumerState::Failed(_)));
        assert_eq!(texts(&consumer.drain()), vec!["before"]);
    }

    #[test]
    fn subscribe_failure_fails_consumer() {
        let api = MockApi {
            fail_subscribe: Some(ApiError::Connection {
                message: "refused".into(),
            }),
            ..MockApi::default()
        };
        let consumer = ConsoleConsumer::start(Arc::new(api), 10, 10);
        wait_for(&consumer, ConsumerState::is_terminal);
        assert!(matches!(consumer.state(), ConsumerState::Failed(ApiError::Connection { .. })));
    }

    #[test]
    fn history_failure_degrades_to_warning() {
        let api = MockApi {
            fail_history: Some(ApiError::Timeout {
                message: "slow".into(),
            }),
            ..MockApi::default()
        };
        let mut consumer = ConsoleConsumer::start(Arc::new(api), 10, 10);
        wait_for(&consumer, |s| *s == ConsumerState::Streaming);
        consumer.close();
        let events = consumer.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Warning);
    }

    #[test]
    fn echo_shares_the_sequence() {
        let mut consumer = ConsoleConsumer::start(Arc::new(MockApi::new()), 0, 10);
        consumer.echo(EventKind::Command, "> M115");
        consumer.echo(EventKind::Response, "FIRMWARE_NAME:Klipper");
        consumer.close();
        let events = consumer.drain();
        assert_eq!(texts(&events), vec!["> M115", "FIRMWARE_NAME:Klipper"]);
        assert!(events[0].seq < events[1].seq);
    }

    #[test]
    fn bounded_buffer_evicts_oldest_history() {
        let mut api = MockApi::new();
        api.history = (0..8).map(|i| message(&format!("h{i}"), Some(f64::from(i)))).collect();
        let mut consumer = ConsoleConsumer::start(Arc::new(api), 100, 3);
        wait_for(&consumer, |s| *s == ConsumerState::Streaming);
        consumer.close();
        assert_eq!(texts(&consumer.drain()), vec!["h5", "h6", "h7"]);
    }
}

//! Scriptable in-memory `PrinterApi` for tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::{ConsoleFeed, PrinterApi};
use crate::error::ApiError;
use crate::model::{ConsoleMessage, Directory, EventKind, GcodeFile};

/// One scripted step of a mock console feed.
#[derive(Debug, Clone)]
pub enum FeedStep {
    Message(ConsoleMessage),
    Idle,
    Fail(ApiError),
}

pub fn message(text: &str, time: Option<f64>) -> ConsoleMessage {
    ConsoleMessage {
        message: text.to_string(),
        time,
        kind: EventKind::classify(text),
    }
}

#[derive(Default)]
pub struct MockApi {
    pub objects: Vec<String>,
    pub status: Map<String, Value>,
    pub printer_info: Value,
    pub help: BTreeMap<String, String>,
    pub history: Vec<ConsoleMessage>,
    pub files: Vec<GcodeFile>,
    pub dirs: Vec<Directory>,
    pub endstops: BTreeMap<String, String>,
    pub gcode_responses: HashMap<String, String>,
    pub feed: Mutex<Vec<FeedStep>>,
    pub fail_lookups: AtomicBool,
    pub fail_history: Option<ApiError>,
    /// Blocks `console_history` this long, like a request to a stalled host.
    pub history_delay: Option<Duration>,
    pub fail_subscribe: Option<ApiError>,

    pub list_objects_calls: AtomicUsize,
    pub gcode_help_calls: AtomicUsize,
    pub list_files_calls: AtomicUsize,
    pub gcode_log: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<String>>,
    pub feed_closed: Arc<AtomicBool>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects(objects: &[&str]) -> Self {
        Self {
            objects: objects.iter().map(|s| (*s).to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn set_status(&mut self, object: &str, status: Value) {
        self.status.insert(object.to_string(), status);
    }

    pub fn gcode_sent(&self) -> Vec<String> {
        self.gcode_log.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn lookup_failure(&self) -> Result<(), ApiError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            Err(ApiError::Timeout {
                message: "mock lookup timeout".into(),
            })
        } else {
            Ok(())
        }
    }
}

impl PrinterApi for MockApi {
    fn server_info(&self) -> Result<Value, ApiError> {
        Ok(serde_json::json!({ "klippy_state": "ready" }))
    }

    fn printer_info(&self) -> Result<Value, ApiError> {
        Ok(self.printer_info.clone())
    }

    fn list_objects(&self) -> Result<Vec<String>, ApiError> {
        self.list_objects_calls.fetch_add(1, Ordering::SeqCst);
        self.lookup_failure()?;
        Ok(self.objects.clone())
    }

    fn query_objects(&self, objects: &[&str]) -> Result<Map<String, Value>, ApiError> {
        Ok(objects
            .iter()
            .filter_map(|o| self.status.get(*o).map(|s| ((*o).to_string(), s.clone())))
            .collect())
    }

    fn run_gcode(&self, script: &str) -> Result<String, ApiError> {
        self.gcode_log.lock().push(script.to_string());
        if let Some(rest) = script.strip_prefix("FAIL") {
            return Err(ApiError::Remote {
                status: Some(400),
                message: format!("mock failure{rest}"),
            });
        }
        Ok(self
            .gcode_responses
            .get(script)
            .cloned()
            .unwrap_or_else(|| "ok".to_string()))
    }

    fn gcode_help(&self) -> Result<BTreeMap<String, String>, ApiError> {
        self.gcode_help_calls.fetch_add(1, Ordering::SeqCst);
        self.lookup_failure()?;
        Ok(self.help.clone())
    }

    fn console_history(&self, count: usize) -> Result<Vec<ConsoleMessage>, ApiError> {
        if let Some(delay) = self.history_delay {
            std::thread::sleep(delay);
        }
        if let Some(e) = &self.fail_history {
            return Err(e.clone());
        }
        let skip = self.history.len().saturating_sub(count);
        Ok(self.history.iter().skip(skip).cloned().collect())
    }

    fn endstops(&self) -> Result<BTreeMap<String, String>, ApiError> {
        Ok(self.endstops.clone())
    }

    fn list_files(&self, _root: &str) -> Result<Vec<GcodeFile>, ApiError> {
        self.list_files_calls.fetch_add(1, Ordering::SeqCst);
        self.lookup_failure()?;
        Ok(self.files.clone())
    }

    fn file_metadata(&self, filename: &str) -> Result<GcodeFile, ApiError> {
        self.files
            .iter()
            .find(|f| f.filename == filename)
            .cloned()
            .ok_or_else(|| ApiError::Remote {
                status: Some(404),
                message: format!("File not found: {filename}"),
            })
    }

    fn delete_file(&self, filename: &str) -> Result<(), ApiError> {
        self.record(format!("delete {filename}"));
        Ok(())
    }

    fn move_file(&self, source: &str, dest: &str) -> Result<(), ApiError> {
        self.record(format!("move {source} {dest}"));
        Ok(())
    }

    fn copy_file(&self, source: &str, dest: &str) -> Result<(), ApiError> {
        self.record(format!("copy {source} {dest}"));
        Ok(())
    }

    fn start_print(&self, filename: &str) -> Result<(), ApiError> {
        self.record(format!("print {filename}"));
        Ok(())
    }

    fn create_directory(&self, path: &str) -> Result<String, ApiError> {
        self.record(format!("mkdir {path}"));
        Ok(path.to_string())
    }

    fn list_directory(&self, path: &str) -> Result<Vec<Directory>, ApiError> {
        self.record(format!("list_dir {path}"));
        Ok(self.dirs.clone())
    }

    fn upload_file(&self, local: &Path, remote_dir: &str) -> Result<String, ApiError> {
        self.record(format!("upload {} {remote_dir}", local.display()));
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!("{remote_dir}/{name}"))
    }

    fn download_file(&self, remote: &str, local: &Path) -> Result<u64, ApiError> {
        self.record(format!("download {remote} {}", local.display()));
        Ok(0)
    }

    fn emergency_stop(&self) -> Result<(), ApiError> {
        self.record("emergency_stop".into());
        Ok(())
    }

    fn restart(&self) -> Result<(), ApiError> {
        self.record("restart".into());
        Ok(())
    }

    fn firmware_restart(&self) -> Result<(), ApiError> {
        self.record("firmware_restart".into());
        Ok(())
    }

    fn subscribe_console(&self) -> Result<Box<dyn ConsoleFeed>, ApiError> {
        if let Some(e) = &self.fail_subscribe {
            return Err(e.clone());
        }
        let steps: VecDeque<FeedStep> = std::mem::take(&mut *self.feed.lock()).into();
        self.feed_closed.store(false, Ordering::SeqCst);
        Ok(Box::new(MockFeed {
            steps,
            closed: Arc::clone(&self.feed_closed),
        }))
    }
}

/// Plays its steps in order, then idles until closed.
struct MockFeed {
    steps: VecDeque<FeedStep>,
    closed: Arc<AtomicBool>,
}

impl ConsoleFeed for MockFeed {
    fn next_event(&mut self) -> Result<Option<ConsoleMessage>, ApiError> {
        match self.steps.pop_front() {
            Some(FeedStep::Message(m)) => Ok(Some(m)),
            Some(FeedStep::Fail(e)) => Err(e),
            Some(FeedStep::Idle) | None => {
                std::thread::sleep(Duration::from_millis(5));
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

//! Printer collaborator seam. Handlers, completion and the console consumer
//! only ever see `dyn PrinterApi`; `MoonrakerClient` is the production
//! implementation and `mock::MockApi` the test double.

pub mod moonraker;
pub mod websocket;

#[cfg(test)]
pub mod mock;

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::model::{ConsoleMessage, Directory, GcodeFile};

pub use moonraker::MoonrakerClient;

/// Request/response surface of the printer host.
pub trait PrinterApi: Send + Sync {
    fn server_info(&self) -> Result<Value, ApiError>;
    fn printer_info(&self) -> Result<Value, ApiError>;
    fn list_objects(&self) -> Result<Vec<String>, ApiError>;
    /// Query full status of the named objects. Returns the `status` map keyed
    /// by object name.
    fn query_objects(&self, objects: &[&str]) -> Result<Map<String, Value>, ApiError>;
    /// Run a G-code script and return its textual response.
    fn run_gcode(&self, script: &str) -> Result<String, ApiError>;
    /// Command name → help text, sorted by name.
    fn gcode_help(&self) -> Result<BTreeMap<String, String>, ApiError>;
    /// The most recent `count` console messages, oldest first.
    fn console_history(&self, count: usize) -> Result<Vec<ConsoleMessage>, ApiError>;
    fn endstops(&self) -> Result<BTreeMap<String, String>, ApiError>;
    fn list_files(&self, root: &str) -> Result<Vec<GcodeFile>, ApiError>;
    fn file_metadata(&self, filename: &str) -> Result<GcodeFile, ApiError>;
    fn delete_file(&self, filename: &str) -> Result<(), ApiError>;
    fn move_file(&self, source: &str, dest: &str) -> Result<(), ApiError>;
    fn copy_file(&self, source: &str, dest: &str) -> Result<(), ApiError>;
    fn start_print(&self, filename: &str) -> Result<(), ApiError>;
    /// Create a remote directory; returns the path the host reports.
    fn create_directory(&self, path: &str) -> Result<String, ApiError>;
    fn list_directory(&self, path: &str) -> Result<Vec<Directory>, ApiError>;
    /// Upload a local file into a remote directory; returns the remote path.
    fn upload_file(&self, local: &Path, remote_dir: &str) -> Result<String, ApiError>;
    /// Download a remote file; returns the number of bytes written.
    fn download_file(&self, remote: &str, local: &Path) -> Result<u64, ApiError>;
    fn emergency_stop(&self) -> Result<(), ApiError>;
    fn restart(&self) -> Result<(), ApiError>;
    fn firmware_restart(&self) -> Result<(), ApiError>;
    /// Open a live console subscription.
    fn subscribe_console(&self) -> Result<Box<dyn ConsoleFeed>, ApiError>;
}

/// A live console subscription, read from the consumer's worker thread.
pub trait ConsoleFeed: Send {
    /// Next console message. `Ok(None)` means the read timed out with nothing
    /// to report; callers use it to check for cancellation.
    fn next_event(&mut self) -> Result<Option<ConsoleMessage>, ApiError>;
    /// Release the subscription. Idempotent.
    fn close(&mut self);
}

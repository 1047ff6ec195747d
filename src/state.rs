use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::api::PrinterApi;
use crate::completion::cache::NameCache;
use crate::entity::EntityCategory;
use crate::error::ShellError;
use crate::settings::ShellSettings;

pub const MAX_HISTORY: usize = 100;

// ── Session ─────────────────────────────────────────────────────────

/// Process-wide shell state, created at startup and shared by the REPL,
/// handlers, completion and console mode.
pub struct Session {
    api: Arc<dyn PrinterApi>,
    /// Same host, short timeout. Used for completion lookups and the status line.
    lookup_api: Arc<dyn PrinterApi>,
    settings: ShellSettings,
    cache: Mutex<NameCache>,
    history: Mutex<Vec<String>>,
    cwd: Mutex<PathBuf>,
    console_active: AtomicBool,
    /// Console workers detached while still blocked in a request.
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    pub fn new(
        api: Arc<dyn PrinterApi>,
        lookup_api: Arc<dyn PrinterApi>,
        settings: ShellSettings,
        cwd: PathBuf,
    ) -> Self {
        Self {
            api,
            lookup_api,
            settings,
            cache: Mutex::new(NameCache::new()),
            history: Mutex::new(Vec::new()),
            cwd: Mutex::new(cwd),
            console_active: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn api(&self) -> &dyn PrinterApi {
        self.api.as_ref()
    }

    pub fn shared_api(&self) -> Arc<dyn PrinterApi> {
        Arc::clone(&self.api)
    }

    pub fn lookup_api(&self) -> &dyn PrinterApi {
        self.lookup_api.as_ref()
    }

    pub fn settings(&self) -> &ShellSettings {
        &self.settings
    }

    /// Access to the name cache. Locks the mutex for the duration of `f`.
    pub fn with_cache<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut NameCache) -> R,
    {
        let mut guard = self.cache.lock();
        f(&mut guard)
    }

    /// Cached names for `category`, populated through the lookup client.
    pub fn entity_names(&self, category: EntityCategory) -> Vec<String> {
        let api = Arc::clone(&self.lookup_api);
        self.with_cache(|cache| cache.names(category, api.as_ref()))
    }

    pub fn invalidate(&self, category: EntityCategory) -> bool {
        self.with_cache(|cache| cache.invalidate(category))
    }

    // ── History ─────────────────────────────────────────────────

    /// Append a line, skipping a repeat of the previous one and dropping the
    /// oldest beyond `MAX_HISTORY`.
    pub fn record_history(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let mut history = self.history.lock();
        if history.last().is_some_and(|last| last == line) {
            return;
        }
        history.push(line.to_string());
        if history.len() > MAX_HISTORY {
            let excess = history.len() - MAX_HISTORY;
            history.drain(..excess);
        }
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().clone()
    }

    // ── Local working directory ─────────────────────────────────

    pub fn cwd(&self) -> PathBuf {
        self.cwd.lock().clone()
    }

    pub fn set_cwd(&self, dir: PathBuf) {
        debug!(cwd = %dir.display(), "local directory changed");
        *self.cwd.lock() = dir;
    }

    /// Resolve a user-supplied local path against the session cwd.
    pub fn resolve_local(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.cwd.lock().join(p)
        }
    }

    // ── Console mode ────────────────────────────────────────────

    /// Mark console mode active. Fails with `ConsoleBusy` while another
    /// guard is alive; dropping the guard releases the slot.
    pub fn try_begin_console(&self) -> Result<ConsoleGuard<'_>, ShellError> {
        self.console_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ShellError::ConsoleBusy)?;
        Ok(ConsoleGuard {
            flag: &self.console_active,
        })
    }

    pub fn console_active(&self) -> bool {
        self.console_active.load(Ordering::Acquire)
    }

    /// Keep a worker that outlived its console session. Finished ones are
    /// reaped on the way in.
    pub fn park_worker(&self, handle: JoinHandle<()>) {
        let mut workers = self.workers.lock();
        reap_finished(&mut workers);
        workers.push(handle);
    }

    pub fn parked_workers(&self) -> usize {
        let mut workers = self.workers.lock();
        reap_finished(&mut workers);
        workers.len()
    }

    /// Wait up to `timeout` for parked workers at shutdown. Returns how many
    /// were still running when it gave up.
    pub fn join_workers(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut workers = self.workers.lock();
        loop {
            reap_finished(&mut workers);
            if workers.is_empty() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        if !workers.is_empty() {
            debug!(count = workers.len(), "abandoning blocked console workers");
        }
        workers.len()
    }
}

fn reap_finished(workers: &mut Vec<JoinHandle<()>>) {
    let (done, running): (Vec<_>, Vec<_>) = workers.drain(..).partition(JoinHandle::is_finished);
    *workers = running;
    for handle in done {
        if handle.join().is_err() {
            debug!("console worker panicked");
        }
    }
}

pub struct ConsoleGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ConsoleGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
pub(crate) fn test_session(api: Arc<dyn PrinterApi>, cwd: PathBuf) -> Session {
    Session::new(Arc::clone(&api), api, ShellSettings::default(), cwd)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::api::mock::MockApi;

    fn session() -> Session {
        test_session(Arc::new(MockApi::new()), PathBuf::from("/tmp"))
    }

    #[test]
    fn history_collapses_consecutive_duplicates() {
        let s = session();
        s.record_history("get_fan");
        s.record_history("get_fan");
        s.record_history("  ");
        s.record_history("get_sensor");
        s.record_history("get_fan");
        assert_eq!(s.history(), vec!["get_fan", "get_sensor", "get_fan"]);
    }

    #[test]
    fn history_is_bounded() {
        let s = session();
        for i in 0..(MAX_HISTORY + 5) {
            s.record_history(&format!("cmd {i}"));
        }
        let history = s.history();
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history.first().map(String::as_str), Some("cmd 5"));
    }

    #[test]
    fn console_guard_is_exclusive() {
        let s = session();
        let guard = s.try_begin_console().unwrap();
        assert!(s.console_active());
        assert_eq!(s.try_begin_console().err(), Some(ShellError::ConsoleBusy));
        drop(guard);
        assert!(!s.console_active());
        assert!(s.try_begin_console().is_ok());
    }

    #[test]
    fn local_paths_resolve_against_cwd() {
        let s = session();
        assert_eq!(s.resolve_local("a.gcode"), PathBuf::from("/tmp/a.gcode"));
        assert_eq!(s.resolve_local("/etc/x"), PathBuf::from("/etc/x"));
    }
}

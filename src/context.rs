//! Session context
//!
//! Mutable state owned by one orchestration session: start time, the session
//! log, the checkpoint list and a free-form metadata map. Component hooks
//! receive a shared reference to it.

use crate::config::Config;
use crate::data::Value;
use crate::rollback::RollbackManager;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime};

/// One buffered session log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: log::Level,
    pub elapsed: Duration,
    pub message: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:>7.3}s {}] {}",
            self.elapsed.as_secs_f64(),
            self.level,
            self.message
        )
    }
}

/// Session log.
///
/// Every line goes to the `log` facade and into an in-memory buffer used for
/// the final report. Writes are serialized by a mutex so lines from
/// concurrent threads never interleave. Clones share the same buffer.
#[derive(Debug, Clone)]
pub struct SessionLog {
    started: Instant,
    lines: Arc<Mutex<Vec<LogLine>>>,
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLog {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            lines: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn record(&self, level: log::Level, message: impl Into<String>) {
        let message = message.into();
        log::log!(target: "setupflow::session", level, "{}", message);
        let line = LogLine {
            level,
            elapsed: self.started.elapsed(),
            message,
        };
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.record(log::Level::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(log::Level::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.record(log::Level::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.record(log::Level::Error, message);
    }

    /// Snapshot of all lines so far.
    pub fn lines(&self) -> Vec<LogLine> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages logged at warn level or above.
    pub fn warnings(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.level <= log::Level::Warn)
            .map(|l| l.message)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mutable state of one installation session.
#[derive(Debug)]
pub struct Context {
    app_name: String,
    started_at: SystemTime,
    started: Instant,
    log: SessionLog,
    install_dir: PathBuf,
    dry_run: bool,
    checkpoints: RollbackManager,
    metadata: BTreeMap<String, Value>,
}

impl Context {
    pub fn new(config: &Config) -> Self {
        Self {
            app_name: config.app_name.clone(),
            started_at: SystemTime::now(),
            started: Instant::now(),
            log: SessionLog::new(),
            install_dir: config.install_dir.clone(),
            dry_run: config.dry_run,
            checkpoints: RollbackManager::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Follow the location chosen during the wizard.
    pub fn set_install_dir(&mut self, dir: impl Into<PathBuf>) {
        self.install_dir = dir.into();
    }

    /// Hooks must skip real side effects when this is set.
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    pub fn checkpoints(&self) -> &RollbackManager {
        &self.checkpoints
    }

    pub fn checkpoints_mut(&mut self) -> &mut RollbackManager {
        &mut self.checkpoints
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn metadata_map(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_session_log_buffers_and_filters_warnings() {
        let log = SessionLog::new();
        log.info("starting");
        log.warn("shortcut skipped");
        log.error("registration failed");

        assert_eq!(log.len(), 3);
        assert_eq!(
            log.warnings(),
            vec!["shortcut skipped".to_string(), "registration failed".to_string()]
        );
    }

    #[test]
    fn test_session_log_is_shared_across_threads() {
        let log = SessionLog::new();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let log = log.clone();
                thread::spawn(move || {
                    for j in 0..25 {
                        log.info(format!("worker {i} line {j}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let lines = log.lines();
        assert_eq!(lines.len(), 100);
        assert!(lines.iter().all(|l| l.message.starts_with("worker ")));
    }

    #[test]
    fn test_context_follows_config() {
        let config = Config::new("Acme", "1.0", "/opt/acme").with_dry_run(true);
        let mut ctx = Context::new(&config);

        assert!(ctx.dry_run());
        assert_eq!(ctx.install_dir(), Path::new("/opt/acme"));
        ctx.set_install_dir("/home/me/acme");
        assert_eq!(ctx.install_dir(), Path::new("/home/me/acme"));

        ctx.set_metadata("attempts", 2i64);
        assert_eq!(ctx.metadata("attempts"), Some(&Value::Int(2)));
    }
}

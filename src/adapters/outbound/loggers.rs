use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::domains::logger::{DomainLogger, DynLogger, LogLevel};

/// Forwards domain log lines to `tracing` under the `domain` target, tagged
/// with the robot's entity id.
pub struct TracingLogger {
    entity_id: String,
}

impl TracingLogger {
    pub fn new(entity_id: &str) -> Self {
        Self { entity_id: entity_id.to_string() }
    }
}

impl DomainLogger for TracingLogger {
    fn info(&self, msg: &str) {
        tracing::info!(target: "domain", entity = %self.entity_id, "{}", msg);
    }

    fn warn(&self, msg: &str) {
        tracing::warn!(target: "domain", entity = %self.entity_id, "{}", msg);
    }

    fn error(&self, msg: &str) {
        tracing::error!(target: "domain", entity = %self.entity_id, "{}", msg);
    }
}

pub struct NoopLogger;

impl DomainLogger for NoopLogger {
    fn info(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
}

pub fn init_noop_logger() -> DynLogger {
    Arc::new(NoopLogger)
}

/// Writes through the `log` facade, which `fast_log` drains into a file.
pub struct FileLogger {
    entity_id: String,
}

impl FileLogger {
    /// Installs `fast_log` as the global `log` backend writing to `path`.
    pub fn init(path: &str, entity_id: &str) -> Result<Self, String> {
        fast_log::init(
            fast_log::config::Config::new()
                .file(path)
                .level(log::LevelFilter::Info),
        )
        .map_err(|e| format!("Failed to initialize fast_log at {}: {}", path, e))?;
        Ok(Self { entity_id: entity_id.to_string() })
    }

    fn line(&self, msg: &str) -> String {
        format!("[{}] {}", self.entity_id, msg)
    }
}

impl DomainLogger for FileLogger {
    fn info(&self, msg: &str) {
        log::info!("{}", self.line(msg));
    }

    fn warn(&self, msg: &str) {
        log::warn!("{}", self.line(msg));
    }

    fn error(&self, msg: &str) {
        log::error!("{}", self.line(msg));
    }
}

/// Sends every line to each of its sinks in order.
pub struct FanoutLogger {
    sinks: Vec<DynLogger>,
}

impl FanoutLogger {
    pub fn new(sinks: Vec<DynLogger>) -> Self {
        Self { sinks }
    }
}

impl DomainLogger for FanoutLogger {
    fn info(&self, msg: &str) {
        self.sinks.iter().for_each(|s| s.info(msg));
    }

    fn warn(&self, msg: &str) {
        self.sinks.iter().for_each(|s| s.warn(msg));
    }

    fn error(&self, msg: &str) {
        self.sinks.iter().for_each(|s| s.error(msg));
    }
}

/// File plus tracing when the file sink can be installed, tracing alone otherwise.
pub fn init_combined_logger(path: &str, entity_id: &str) -> DynLogger {
    let console: DynLogger = Arc::new(TracingLogger::new(entity_id));
    match FileLogger::init(path, entity_id) {
        Ok(file) => Arc::new(FanoutLogger::new(vec![Arc::new(file), console])),
        Err(e) => {
            console.warn(&e);
            console
        }
    }
}

/// Moves logging off the control loop: lines are queued and forwarded to
/// `sink` from a background task. Lines are dropped while the queue is full.
pub struct BufferedLogger {
    sender: mpsc::Sender<(LogLevel, String)>,
    dropped: Arc<AtomicU64>,
}

impl BufferedLogger {
    /// Must be called inside a tokio runtime.
    pub fn spawn(sink: DynLogger, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<(LogLevel, String)>(capacity.max(1));
        tokio::spawn(async move {
            while let Some((level, msg)) = receiver.recv().await {
                sink.log(level, &msg);
            }
        });
        Self { sender, dropped: Arc::new(AtomicU64::new(0)) }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn enqueue(&self, level: LogLevel, msg: &str) {
        if self.sender.try_send((level, msg.to_string())).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl DomainLogger for BufferedLogger {
    fn info(&self, msg: &str) {
        self.enqueue(LogLevel::Info, msg);
    }

    fn warn(&self, msg: &str) {
        self.enqueue(LogLevel::Warn, msg);
    }

    fn error(&self, msg: &str) {
        self.enqueue(LogLevel::Error, msg);
    }
}

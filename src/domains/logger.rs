use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        })
    }
}

/// Operator-facing log port used by the coordinator for mode changes,
/// rejected commands, map mismatches and aborts. Never fails.
pub trait DomainLogger: Send + Sync + 'static {
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);

    fn log(&self, level: LogLevel, msg: &str) {
        match level {
            LogLevel::Info => self.info(msg),
            LogLevel::Warn => self.warn(msg),
            LogLevel::Error => self.error(msg),
        }
    }
}

pub type DynLogger = Arc<dyn DomainLogger>;

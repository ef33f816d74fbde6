//! Sink-agnostic logging contract. The core depends on `tracing` for its default
//! implementation but never requires a caller to install a subscriber; a [`NullLogger`]
//! is available for tests and for embedding contexts that don't want engine log output.

/// Severity matching the `Logging.MinimumLevel` configuration values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
}

/// A structured field attached to a log call.
pub type Field<'a> = (&'a str, &'a str);

pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, fields: &[Field<'_>]);

    fn trace(&self, message: &str, fields: &[Field<'_>]) {
        self.log(LogLevel::Trace, message, fields);
    }

    fn debug(&self, message: &str, fields: &[Field<'_>]) {
        self.log(LogLevel::Debug, message, fields);
    }

    fn info(&self, message: &str, fields: &[Field<'_>]) {
        self.log(LogLevel::Information, message, fields);
    }

    fn warn(&self, message: &str, fields: &[Field<'_>]) {
        self.log(LogLevel::Warning, message, fields);
    }

    fn error(&self, message: &str, fields: &[Field<'_>]) {
        self.log(LogLevel::Error, message, fields);
    }
}

/// Discards everything. Used by [`crate::testing::TestFoundry`] and by callers who don't
/// want engine output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: LogLevel, _message: &str, _fields: &[Field<'_>]) {}
}

/// Forwards to `tracing::event!` at the matching level with the given fields attached as
/// a single structured `fields` string (tracing's macros require field names to be
/// compile-time identifiers, so a dynamic field list is rendered rather than attached
/// per-key).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str, fields: &[Field<'_>]) {
        let rendered: String = fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");

        match level {
            LogLevel::Trace => tracing::trace!(fields = %rendered, "{}", message),
            LogLevel::Debug => tracing::debug!(fields = %rendered, "{}", message),
            LogLevel::Information => tracing::info!(fields = %rendered, "{}", message),
            LogLevel::Warning => tracing::warn!(fields = %rendered, "{}", message),
            LogLevel::Error | LogLevel::Critical => tracing::error!(fields = %rendered, "{}", message),
        }
    }
}

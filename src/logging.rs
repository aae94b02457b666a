//! Logging collaborator.
//!
//! Services report operational errors to an injected [`LogSink`]. They never
//! depend on how the sink is configured or where its output goes; logging is
//! supplementary to the returned [`crate::error::ProvKitError`].

use std::error::Error;
use std::sync::Arc;

use tracing::Level;

/// A single log event emitted by a service.
#[derive(Debug, Clone, Copy)]
pub struct LogRecord<'a> {
    pub level: Level,
    /// Originating component, e.g. `"cipher"` or `"keystore"`.
    pub component: &'static str,
    pub message: &'a str,
    pub cause: Option<&'a (dyn Error + 'static)>,
}

/// Structured logging sink injected into the services.
pub trait LogSink: Send + Sync {
    fn log(&self, record: &LogRecord<'_>);

    fn error(&self, component: &'static str, message: &str, cause: Option<&(dyn Error + 'static)>) {
        self.log(&LogRecord {
            level: Level::ERROR,
            component,
            message,
            cause,
        });
    }

    fn debug(&self, component: &'static str, message: &str) {
        self.log(&LogRecord {
            level: Level::DEBUG,
            component,
            message,
            cause: None,
        });
    }
}

/// Forwards records to `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    pub fn shared() -> Arc<dyn LogSink> {
        Arc::new(TracingSink)
    }
}

impl LogSink for TracingSink {
    fn log(&self, record: &LogRecord<'_>) {
        let component = record.component;
        let message = record.message;
        // `tracing` needs the level at compile time.
        let level = record.level;
        if level == Level::ERROR {
            match record.cause {
                Some(cause) => tracing::error!(component, cause = %cause, "{message}"),
                None => tracing::error!(component, "{message}"),
            }
        } else if level == Level::WARN {
            match record.cause {
                Some(cause) => tracing::warn!(component, cause = %cause, "{message}"),
                None => tracing::warn!(component, "{message}"),
            }
        } else if level == Level::INFO {
            tracing::info!(component, "{message}");
        } else if level == Level::DEBUG {
            tracing::debug!(component, "{message}");
        } else {
            tracing::trace!(component, "{message}");
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _record: &LogRecord<'_>) {}
}

/// Logs `err` at error level and hands it back, for use in `map_err` chains.
pub(crate) fn report(
    sink: &dyn LogSink,
    component: &'static str,
    err: crate::error::ProvKitError,
) -> crate::error::ProvKitError {
    let message = err.to_string();
    sink.error(component, &message, err.source());
    err
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Captures records for assertions.
    #[derive(Default)]
    pub struct RecordingSink {
        pub records: Mutex<Vec<(Level, &'static str, String, Option<String>)>>,
    }

    impl LogSink for RecordingSink {
        fn log(&self, record: &LogRecord<'_>) {
            self.records.lock().unwrap().push((
                record.level,
                record.component,
                record.message.to_string(),
                record.cause.map(|c| c.to_string()),
            ));
        }
    }

    impl RecordingSink {
        pub fn errors(&self) -> Vec<String> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .filter(|(level, ..)| *level == Level::ERROR)
                .map(|(_, _, message, _)| message.clone())
                .collect()
        }
    }
}

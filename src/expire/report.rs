//! Diagnostic sink handed to every expiration component.
//!
//! Components never log through a global directly; they receive a `&dyn Reporter`
//! so a run can be observed (or asserted on in tests) without touching the
//! process-wide subscriber.

use std::cell::RefCell;
use std::fmt::Arguments;
use tracing::Level;

pub trait Reporter {
    fn report(&self, level: Level, args: Arguments<'_>);

    fn debug(&self, args: Arguments<'_>) {
        self.report(Level::DEBUG, args)
    }

    fn info(&self, args: Arguments<'_>) {
        self.report(Level::INFO, args)
    }

    fn warn(&self, args: Arguments<'_>) {
        self.report(Level::WARN, args)
    }

    fn error(&self, args: Arguments<'_>) {
        self.report(Level::ERROR, args)
    }
}

/// Forwards every event to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, level: Level, args: Arguments<'_>) {
        match level {
            Level::TRACE => tracing::trace!("{}", args),
            Level::DEBUG => tracing::debug!("{}", args),
            Level::INFO => tracing::info!("{}", args),
            Level::WARN => tracing::warn!("{}", args),
            _ => tracing::error!("{}", args),
        }
    }
}

/// Keeps events in memory, in order.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: RefCell<Vec<(Level, String)>>,
}

impl MemoryReporter {
    pub fn events(&self) -> Vec<(Level, String)> {
        self.events.borrow().clone()
    }

    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, msg)| msg.clone())
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, level: Level, args: Arguments<'_>) {
        self.events.borrow_mut().push((level, args.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_reporter_keeps_order_and_level() {
        let reporter = MemoryReporter::default();
        reporter.debug(format_args!("first {}", 1));
        reporter.warn(format_args!("second"));
        reporter.debug(format_args!("third"));

        assert_eq!(
            reporter.events(),
            vec![
                (Level::DEBUG, "first 1".to_string()),
                (Level::WARN, "second".to_string()),
                (Level::DEBUG, "third".to_string()),
            ]
        );
        assert_eq!(reporter.messages_at(Level::WARN), vec!["second".to_string()]);
    }

    #[test]
    fn test_tracing_reporter_accepts_every_level() {
        let reporter = TracingReporter;
        for level in [Level::TRACE, Level::DEBUG, Level::INFO, Level::WARN, Level::ERROR] {
            reporter.report(level, format_args!("level {}", level));
        }
    }
}

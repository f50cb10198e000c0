//! Serialised access to captured log records.
//!
//! `logtest` installs a process-wide logger, so tests that assert on log
//! output take a [`LoggerHandle`] to keep their captures apart.

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use log::Level;
use logtest::{Logger, Record};
use rstest::fixture;

/// Exclusive handle on the process-wide log capture.
pub struct LoggerHandle {
    capture: MutexGuard<'static, Logger>,
}

impl LoggerHandle {
    /// Take the capture, discarding anything logged before.
    #[must_use]
    pub fn acquire() -> Self {
        static CAPTURE: OnceLock<Mutex<Logger>> = OnceLock::new();

        let capture = CAPTURE
            .get_or_init(|| Mutex::new(Logger::start()))
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut handle = Self { capture };
        handle.clear();
        handle
    }

    /// Drop every captured record.
    pub fn clear(&mut self) { while self.capture.pop().is_some() {} }

    /// Drain the captured records in emission order.
    pub fn drain(&mut self) -> Vec<Record> { std::iter::from_fn(|| self.capture.pop()).collect() }

    /// Drain the capture and report whether a record at `level` mentions
    /// `needle`.
    pub fn saw(&mut self, level: Level, needle: &str) -> bool {
        self.drain()
            .iter()
            .any(|record| record.level() == level && record.args().contains(needle))
    }
}

/// rstest fixture yielding a fresh [`LoggerHandle`].
#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn logger() -> LoggerHandle { LoggerHandle::acquire() }

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Audit sink port and a daily-rotating file adapter.
//!
//! The port is deliberately tiny: callers hand over a level and a finished
//! message and never learn whether (or when) it reached storage.

mod daily;

pub use daily::{file_for, AuditClock, DailyFileAudit};

use std::fmt;

/// Severity recorded alongside an audit line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuditLevel {
    /// Routine state change.
    Info,
    /// Detected anomaly or corrective action.
    Warn,
    /// Failure that could not be handled in place.
    Error,
}

impl AuditLevel {
    /// Upper-case tag written into audit lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only, fire-and-forget audit log.
///
/// Implementations must not block the caller on I/O and must swallow their
/// own failures.
pub trait AuditSink: Send + Sync {
    /// Record one message.
    fn record(&self, level: AuditLevel, message: &str);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAudit;

impl AuditSink for NullAudit {
    fn record(&self, _level: AuditLevel, _message: &str) {}
}

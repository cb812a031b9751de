// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Audit sink that keeps every record in memory.

use std::sync::{Arc, Mutex};

use echo_audit::{AuditLevel, AuditSink};

/// Cloneable in-memory [`AuditSink`]. Clones share the same record list.
#[derive(Debug, Clone, Default)]
pub struct RecordingAudit {
    records: Arc<Mutex<Vec<(AuditLevel, String)>>>,
}

impl RecordingAudit {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<(AuditLevel, String)> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of records at `level`.
    pub fn count(&self, level: AuditLevel) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }

    /// Whether any record contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|(_, m)| m.contains(needle))
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Forgets every record.
    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, level: AuditLevel, message: &str) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((level, message.to_owned()));
    }
}

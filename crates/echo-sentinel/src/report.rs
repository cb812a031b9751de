// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Sentinel log fan-out: every line goes to `tracing` and, except debug
//! lines, to the audit sink at the matching level.

use std::sync::Arc;

use echo_audit::{AuditLevel, AuditSink, NullAudit};
use tracing::{debug, error, info, warn};

/// Logging handle shared by the diagnoser, repair engine and gate.
#[derive(Clone)]
pub struct Reporter {
    audit: Arc<dyn AuditSink>,
    debug: bool,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter").field("debug", &self.debug).finish_non_exhaustive()
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(Arc::new(NullAudit), false)
    }
}

impl Reporter {
    /// Reporter writing to `audit`; `debug` enables debug lines.
    pub fn new(audit: Arc<dyn AuditSink>, debug: bool) -> Self {
        Self { audit, debug }
    }

    /// Toggles debug lines.
    pub fn set_debug(&mut self, on: bool) {
        self.debug = on;
    }

    /// Whether debug lines are emitted.
    pub fn debug_enabled(&self) -> bool {
        self.debug
    }

    /// Informational line.
    pub fn info(&self, message: &str) {
        info!(target: "echo_sentinel", "{message}");
        self.audit.record(AuditLevel::Info, message);
    }

    /// Finding or recoverable problem.
    pub fn warn(&self, message: &str) {
        warn!(target: "echo_sentinel", "{message}");
        self.audit.record(AuditLevel::Warn, message);
    }

    /// Failure that left something undone.
    pub fn error(&self, message: &str) {
        error!(target: "echo_sentinel", "{message}");
        self.audit.record(AuditLevel::Error, message);
    }

    /// Debug line; dropped unless debug mode is on. Never audited.
    pub fn debug(&self, message: &str) {
        if self.debug {
            debug!(target: "echo_sentinel", "{message}");
        }
    }
}

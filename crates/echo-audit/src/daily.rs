// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! One file per calendar day under a log directory.
//!
//! Each record is formatted on the caller's thread (so the timestamp reflects
//! when the event happened) and appended by a background worker. The file
//! choice is re-evaluated under the writer lock before every append, which is
//! what rolls the log over at midnight: the first write of a new day opens
//! the new file.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use echo_workers::WorkerPool;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::warn;

use crate::{AuditLevel, AuditSink};

/// Source of the current wall-clock time for audit lines.
pub type AuditClock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

struct Writer {
    dir: PathBuf,
    current: Option<PathBuf>,
}

impl Writer {
    fn select_file(&mut self, date: &str) -> PathBuf {
        let target = self.dir.join(format!("{date}.log"));
        if self.current.as_ref() != Some(&target) {
            self.current = Some(target.clone());
        }
        target
    }

    fn append(&mut self, date: &str, line: &str) {
        let path = self.select_file(date);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(err) = result {
            warn!(?err, path = %path.display(), "failed to append audit line");
        }
    }
}

/// Daily-rotating audit file sink (`<dir>/YYYY-MM-DD.log`).
pub struct DailyFileAudit {
    writer: Arc<Mutex<Writer>>,
    pool: WorkerPool,
    clock: AuditClock,
}

impl DailyFileAudit {
    /// Opens (creating if needed) `dir` with local wall-clock timestamps.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        Self::with_clock(dir, Arc::new(local_now))
    }

    /// Like [`new`](Self::new) with an explicit clock.
    pub fn with_clock(dir: impl Into<PathBuf>, clock: AuditClock) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            writer: Arc::new(Mutex::new(Writer { dir, current: None })),
            pool: WorkerPool::new("audit", 2),
            clock,
        })
    }

    /// Directory holding the daily files.
    pub fn dir(&self) -> PathBuf {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dir
            .clone()
    }

    /// File the most recent write went to, if any write has happened yet.
    pub fn current_file(&self) -> Option<PathBuf> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
    }

    /// Waits for every queued line to be written and stops the workers.
    pub fn shutdown(self) {
        self.pool.shutdown();
    }
}

impl AuditSink for DailyFileAudit {
    fn record(&self, level: AuditLevel, message: &str) {
        let now = (self.clock)();
        let (date, line) = format_record(now, level, message);
        let writer = Arc::clone(&self.writer);
        let queued = self.pool.submit(move || {
            writer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .append(&date, &line);
        });
        if !queued {
            warn!("audit pool unavailable; dropped line");
        }
    }
}

/// Formats `(file date, line)` for one record.
fn format_record(now: OffsetDateTime, level: AuditLevel, message: &str) -> (String, String) {
    let date_fmt = format_description!("[year]-[month]-[day]");
    let time_fmt = format_description!("[hour]:[minute]:[second]");
    let date = now
        .format(date_fmt)
        .unwrap_or_else(|_| "unknown-date".to_owned());
    let clock = now
        .format(time_fmt)
        .unwrap_or_else(|_| "??:??:??".to_owned());
    (date, format!("[{clock}] [{level}] {message}"))
}

fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Path of the file a record stamped `now` lands in.
pub fn file_for(dir: &Path, now: OffsetDateTime) -> PathBuf {
    let (date, _) = format_record(now, AuditLevel::Info, "");
    dir.join(format!("{date}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn record_line_matches_expected_layout() {
        let (date, line) = format_record(
            datetime!(2024-03-09 07:05:03 UTC),
            AuditLevel::Warn,
            "repair complete",
        );
        assert_eq!(date, "2024-03-09");
        assert_eq!(line, "[07:05:03] [WARN] repair complete");
    }

    #[test]
    fn file_for_uses_calendar_date() {
        let path = file_for(Path::new("/logs"), datetime!(2023-10-27 23:59:59 UTC));
        assert_eq!(path, Path::new("/logs/2023-10-27.log"));
    }
}

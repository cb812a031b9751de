// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tiered repair of a diagnosed entity.
//!
//! In-place normalization always runs for whatever was found; relocation
//! only runs when policy allows it. Every step is attempted even if an
//! earlier one failed. A failed step (or a panic escaping one) marks the
//! outcome as unrepaired, and the caller decides whether to disconnect.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::cache::SafeStateCache;
use crate::config::SentinelConfig;
use crate::diagnosis::{panic_message, Diagnosis, IssueType};
use crate::host::{AttributeKind, Entity, HostFault};
use crate::messages::Messages;
use crate::report::Reporter;

/// What triggered the repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairContext {
    /// Periodic scan or join check.
    Auto,
    /// Admin-requested check.
    Manual,
    /// Safety evaluation in front of a gated action.
    Gated,
}

impl RepairContext {
    /// Label used in the repair log line.
    pub fn label(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::Gated => "action",
        }
    }
}

/// Result of [`repair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairOutcome {
    /// Whether a gated action may proceed.
    pub allowed: bool,
    /// Whether the entity was relocated.
    pub teleported: bool,
    /// A remediation step failed; the entity may still be corrupt.
    pub unrepaired: bool,
    /// The user already received a repair report.
    pub reported: bool,
}

impl RepairOutcome {
    /// Outcome of repairing an entity with nothing wrong: allowed, untouched,
    /// nothing reported.
    pub const CLEAN: Self = Self {
        allowed: true,
        teleported: false,
        unrepaired: false,
        reported: false,
    };
}

#[derive(Default)]
struct Applied {
    teleported: bool,
    failures: usize,
}

/// Repairs `entity` according to `diagnosis`.
///
/// A diagnosis without issues is a no-op. The caller owns the follow-up for
/// an unrepaired outcome (see `repair.kick-if-unrepairable`).
pub fn repair<E: Entity>(
    entity: &mut E,
    diagnosis: &Diagnosis,
    context: RepairContext,
    config: &SentinelConfig,
    cache: &SafeStateCache,
    reporter: &Reporter,
) -> RepairOutcome {
    if !diagnosis.has_issues() {
        return RepairOutcome::CLEAN;
    }
    let name = entity.name().to_owned();
    reporter.warn(&format!("repairing entity state: entity={name}"));

    let policy = &config.repair;
    let allowed = !(diagnosis.is_severe() && policy.block_command_on_severe);

    let applied = catch_unwind(AssertUnwindSafe(|| {
        apply(entity, diagnosis, config, cache, reporter)
    }));
    let applied = match applied {
        Ok(applied) if applied.failures == 0 => applied,
        Ok(applied) => {
            reporter.error(&format!(
                "repair incomplete: entity={name} failed_steps={}",
                applied.failures
            ));
            return unrepaired(applied.teleported);
        }
        Err(payload) => {
            reporter.error(&format!(
                "repair aborted: entity={name} reason={}",
                panic_message(payload.as_ref())
            ));
            return unrepaired(false);
        }
    };

    let messages = &config.messages;
    for line in report_lines(messages, diagnosis, applied.teleported, context, allowed) {
        entity.send_message(&line);
    }
    reporter.warn(&format!(
        "repair complete: entity={name} issues={} action={} trigger={} outcome={}",
        issue_labels(messages, diagnosis),
        if applied.teleported { "relocated" } else { "repaired in place" },
        context.label(),
        if allowed { "allowed" } else { "blocked" },
    ));

    RepairOutcome {
        allowed,
        teleported: applied.teleported,
        unrepaired: false,
        reported: true,
    }
}

fn unrepaired(teleported: bool) -> RepairOutcome {
    RepairOutcome {
        allowed: false,
        teleported,
        unrepaired: true,
        reported: false,
    }
}

fn apply<E: Entity>(
    entity: &mut E,
    diagnosis: &Diagnosis,
    config: &SentinelConfig,
    cache: &SafeStateCache,
    reporter: &Reporter,
) -> Applied {
    let mut applied = Applied::default();
    let mut step = |label: &str, name: &str, result: Result<(), HostFault>| {
        if let Err(fault) = result {
            reporter.error(&format!("repair step failed: entity={name} step={label} {fault}"));
            applied.failures += 1;
        }
    };
    let name = entity.name().to_owned();

    if diagnosis.contains(IssueType::Health) || diagnosis.contains(IssueType::Attributes) {
        step("vitals", &name, contained(|| entity.restore_vitals()));
    }
    if diagnosis.contains(IssueType::Attributes) {
        reset_attributes(entity, reporter);
    }
    if diagnosis.contains(IssueType::Effects) {
        step("effects", &name, contained(|| entity.clear_effects()));
    }

    let policy = &config.repair;
    if policy.safe_teleport && (!policy.teleport_on_severe_only || diagnosis.is_severe()) {
        let cached = if policy.prefer_last_safe_location {
            cache.get(entity.id())
        } else {
            None
        };
        let target = match cached {
            Some(target) => Ok(target),
            None => contained(|| entity.spawn_position()),
        };
        let moved = target.and_then(|target| contained(|| entity.teleport(&target)));
        let ok = moved.is_ok();
        step("relocate", &name, moved);
        applied.teleported = ok;
    }
    applied
}

/// Runs one host call, turning a panic into a [`HostFault`].
fn contained<T>(op: impl FnOnce() -> Result<T, HostFault>) -> Result<T, HostFault> {
    catch_unwind(AssertUnwindSafe(op)).unwrap_or_else(|payload| {
        Err(HostFault::new(format!(
            "host panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

/// Clears every modifier and restores default bases. Individual failures
/// are ignored so one corrupt modifier cannot block the rest.
fn reset_attributes<E: Entity>(entity: &mut E, reporter: &Reporter) {
    let name = entity.name().to_owned();
    for kind in AttributeKind::ALL {
        let reading = match contained(|| entity.attribute(kind)) {
            Ok(Some(reading)) => Some(reading),
            Ok(None) => continue,
            Err(_) => None,
        };
        match contained(|| entity.modifiers(kind)) {
            Ok(modifiers) if !modifiers.is_empty() => {
                let mut failed = 0usize;
                for modifier in &modifiers {
                    if contained(|| entity.remove_modifier(kind, modifier)).is_err() {
                        failed += 1;
                    }
                }
                reporter.warn(&format!(
                    "cleared modifiers: entity={name} attribute={} count={} failed={failed}",
                    kind.name(),
                    modifiers.len()
                ));
            }
            Ok(_) => {}
            Err(_) => reporter.warn(&format!(
                "modifier collection corrupt, forcing rebuild: entity={name} attribute={}",
                kind.name()
            )),
        }
        if let Some(default) = reading.map(|r| r.default).filter(|d| d.is_finite()) {
            if let Err(fault) = contained(|| entity.set_base_value(kind, default)) {
                reporter.warn(&format!(
                    "base reset failed: entity={name} attribute={} {fault}",
                    kind.name()
                ));
            }
        }
    }
}

pub(crate) fn issue_labels(messages: &Messages, diagnosis: &Diagnosis) -> String {
    let mut items: Vec<String> = diagnosis
        .issues()
        .map(|issue| messages.label(issue))
        .filter(|label| !label.is_empty())
        .collect();
    if items.is_empty() {
        items.push(messages.label(IssueType::General));
    }
    items.join(", ")
}

/// The user-facing repair report, one message per line.
pub fn report_lines(
    messages: &Messages,
    diagnosis: &Diagnosis,
    teleported: bool,
    context: RepairContext,
    allowed: bool,
) -> Vec<String> {
    let mut lines = vec![
        messages.prefixed("diagnose-header"),
        messages.fill("diagnose-items", "{items}", &issue_labels(messages, diagnosis)),
        messages.text(if teleported {
            "diagnose-action-teleport"
        } else {
            "diagnose-action-place"
        }),
    ];
    if context == RepairContext::Gated {
        lines.push(messages.text(if allowed {
            "diagnose-continue"
        } else {
            "diagnose-action-blocked"
        }));
    }
    let advice: Vec<&str> = diagnosis
        .issues()
        .map(|issue| messages.advice(issue))
        .filter(|a| !a.is_empty())
        .collect();
    if !advice.is_empty() {
        lines.push(messages.fill("diagnose-advice", "{advice}", &advice.join("; ")));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gated_report_states_the_outcome() {
        let m = Messages::default();
        let d = Diagnosis::from_issues([IssueType::Location], true);
        let lines = report_lines(&m, &d, true, RepairContext::Gated, false);
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with(&m.prefix));
        assert_eq!(lines[1], "Detected: invalid location");
        assert_eq!(lines[2], m.text("diagnose-action-teleport"));
        assert_eq!(lines[3], m.text("diagnose-action-blocked"));
    }

    #[test]
    fn auto_report_omits_continue_line() {
        let m = Messages::default();
        let d = Diagnosis::from_issues([IssueType::Health, IssueType::Effects], false);
        let lines = report_lines(&m, &d, false, RepairContext::Auto, true);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "Detected: abnormal health, broken effects");
        assert_eq!(lines[2], m.text("diagnose-action-place"));
        assert!(lines[3].contains("; "));
    }

    #[test]
    fn empty_labels_fall_back_to_general() {
        let mut m = Messages::default();
        for label in m.issue_labels.values_mut() {
            if *label != "general fault" {
                label.clear();
            }
        }
        let d = Diagnosis::from_issues([IssueType::Health], false);
        assert_eq!(issue_labels(&m, &d), "general fault");
    }
}

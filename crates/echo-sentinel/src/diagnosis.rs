// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Entity diagnosis.
//!
//! [`diagnose`] inspects one entity and classifies what it finds into a
//! [`Diagnosis`]. It never fails: a host fault or a panic while reading
//! entity state is folded into the result as a severe `General` issue.
//!
//! Checks run in a fixed order (location, health, attributes, effects,
//! inventory, vehicle). A dead entity stops the diagnosis right after the
//! location check so that death is never mistaken for corrupt health.

use std::collections::BTreeSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;

use crate::cache::{SafePosition, SafeStateCache};
use crate::config::{SentinelConfig, Thresholds};
use crate::host::{AttributeKind, Entity, HostFault, VehicleState};
use crate::report::Reporter;

/// Category of a detected problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    /// Position is non-finite or outside the world bounds.
    Location,
    /// Health is non-finite or outside the configured window.
    Health,
    /// An attribute, its base, or one of its modifiers is invalid.
    Attributes,
    /// A timed effect has an impossible duration or amplifier.
    Effects,
    /// The inventory handle is missing.
    Inventory,
    /// Anything else, including faults raised during inspection.
    General,
}

impl IssueType {
    /// Every category in report order.
    pub const ALL: [Self; 6] = [
        Self::Location,
        Self::Health,
        Self::Attributes,
        Self::Effects,
        Self::Inventory,
        Self::General,
    ];

    /// Key used by the message catalog.
    pub fn key(self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Health => "health",
            Self::Attributes => "attributes",
            Self::Effects => "effects",
            Self::Inventory => "inventory",
            Self::General => "general",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Result of inspecting one entity. Immutable once returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnosis {
    issues: BTreeSet<IssueType>,
    severe: bool,
}

impl Diagnosis {
    /// Builds a diagnosis directly. Useful for driving repairs by hand.
    pub fn from_issues(issues: impl IntoIterator<Item = IssueType>, severe: bool) -> Self {
        Self {
            issues: issues.into_iter().collect(),
            severe,
        }
    }

    /// True when at least one issue was found.
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Whether `issue` was found.
    pub fn contains(&self, issue: IssueType) -> bool {
        self.issues.contains(&issue)
    }

    /// Whether the position itself is unsafe.
    pub fn is_severe(&self) -> bool {
        self.severe
    }

    /// Found issues in category order.
    pub fn issues(&self) -> impl Iterator<Item = IssueType> + '_ {
        self.issues.iter().copied()
    }

    fn add(&mut self, issue: IssueType) {
        self.issues.insert(issue);
    }

    fn add_severe(&mut self, issue: IssueType) {
        self.issues.insert(issue);
        // monotonic within one diagnosis
        self.severe = true;
    }
}

/// Inspects `entity` against `config`, committing its position to `cache`
/// when the location check passes.
pub fn diagnose<E: Entity>(
    entity: &E,
    config: &SentinelConfig,
    cache: &mut SafeStateCache,
    reporter: &Reporter,
) -> Diagnosis {
    let mut diagnosis = Diagnosis::default();
    let name = entity.name().to_owned();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        run_checks(entity, config, cache, reporter, &mut diagnosis)
    }));
    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(fault)) => Some(fault.to_string()),
        Err(payload) => Some(panic_message(payload.as_ref())),
    };
    if let Some(reason) = failure {
        reporter.error(&format!("diagnosis failed: entity={name} reason={reason}"));
        diagnosis.add_severe(IssueType::General);
    }
    diagnosis
}

fn run_checks<E: Entity>(
    entity: &E,
    config: &SentinelConfig,
    cache: &mut SafeStateCache,
    reporter: &Reporter,
    diagnosis: &mut Diagnosis,
) -> Result<(), HostFault> {
    let checks = config.monitoring.checks;
    let limits = &config.repair.thresholds;
    let name = entity.name();

    if checks.location {
        let pos = entity.position()?;
        let finding = if !pos.is_finite() {
            Some(format!(
                "non-finite position: entity={name} world={} x={} y={} z={}",
                pos.world, pos.x, pos.y, pos.z
            ))
        } else if pos.x.abs() > limits.coordinate_max || pos.z.abs() > limits.coordinate_max {
            Some(format!(
                "position beyond world border: entity={name} world={} x={} z={} max={}",
                pos.world, pos.x, pos.z, limits.coordinate_max
            ))
        } else if pos.y < limits.y_min || pos.y > limits.y_max {
            Some(format!(
                "height out of range: entity={name} world={} y={} range=[{},{}]",
                pos.world, pos.y, limits.y_min, limits.y_max
            ))
        } else {
            None
        };
        match finding {
            Some(message) => {
                reporter.warn(&message);
                diagnosis.add_severe(IssueType::Location);
            }
            None => cache.commit(entity.id(), SafePosition::validated(pos)),
        }
    }

    if entity.is_dead() {
        return Ok(());
    }
    let health = entity.health()?;
    if health <= 0.0 {
        return Ok(());
    }
    if !within(health, limits.health_min, limits.health_max) {
        reporter.warn(&format!(
            "abnormal health: entity={name} health={health} range=[{},{}]",
            limits.health_min, limits.health_max
        ));
        diagnosis.add(IssueType::Health);
    }

    if checks.attributes {
        for kind in AttributeKind::ALL {
            if attribute_findings(entity, kind, limits, reporter) {
                diagnosis.add(IssueType::Attributes);
            }
        }
    }

    if checks.effects {
        for effect in entity.effects()? {
            if effect.duration < 0 || !(-1..=255).contains(&effect.amplifier) {
                reporter.warn(&format!(
                    "abnormal effect: entity={name} effect={} amplifier={} duration={}",
                    effect.kind, effect.amplifier, effect.duration
                ));
                diagnosis.add(IssueType::Effects);
            }
        }
    }

    if checks.inventory {
        let present = entity.has_inventory().unwrap_or(false);
        if !present {
            reporter.warn(&format!("inventory missing: entity={name}"));
            diagnosis.add(IssueType::Inventory);
        }
    }

    if checks.vehicle {
        let broken = match entity.vehicle()? {
            VehicleState::NotRiding | VehicleState::Riding { valid: true, .. } => None,
            VehicleState::Riding { kind, valid: false } => Some(kind),
            VehicleState::Missing => Some("none".to_owned()),
        };
        if let Some(kind) = broken {
            reporter.warn(&format!("abnormal vehicle state: entity={name} vehicle={kind}"));
            diagnosis.add_severe(IssueType::General);
        }
    }

    Ok(())
}

/// Inspects one attribute. Returns true if anything about it is invalid.
///
/// A panic raised by the host while reading this attribute counts as a
/// corrupt attribute, not a general fault; later attributes are still read.
fn attribute_findings<E: Entity>(
    entity: &E,
    kind: AttributeKind,
    limits: &Thresholds,
    reporter: &Reporter,
) -> bool {
    catch_unwind(AssertUnwindSafe(|| inspect_attribute(entity, kind, limits, reporter)))
        .unwrap_or_else(|payload| {
            reporter.warn(&format!(
                "attribute inspection crashed: entity={} attribute={} reason={}",
                entity.name(),
                kind.name(),
                panic_message(payload.as_ref())
            ));
            true
        })
}

fn inspect_attribute<E: Entity>(
    entity: &E,
    kind: AttributeKind,
    limits: &Thresholds,
    reporter: &Reporter,
) -> bool {
    let name = entity.name();
    let attr = kind.name();
    let reading = match entity.attribute(kind) {
        Ok(Some(reading)) => reading,
        Ok(None) => return false,
        Err(fault) => {
            reporter.warn(&format!("attribute unreadable: entity={name} attribute={attr} {fault}"));
            return true;
        }
    };

    let mut bad = false;
    if !reading.value.is_finite() || !reading.base.is_finite() {
        reporter.warn(&format!(
            "non-finite attribute: entity={name} attribute={attr} value={} base={}",
            reading.value, reading.base
        ));
        bad = true;
    }

    match entity.modifiers(kind) {
        Ok(modifiers) => {
            for modifier in modifiers.iter().filter(|m| !m.amount.is_finite()) {
                reporter.warn(&format!(
                    "non-finite modifier: entity={name} attribute={attr} key={} amount={}",
                    modifier.key, modifier.amount
                ));
                bad = true;
            }
        }
        Err(fault) => {
            reporter.warn(&format!(
                "modifier collection corrupt: entity={name} attribute={attr} {fault}"
            ));
            bad = true;
        }
    }

    let bounds = match kind {
        AttributeKind::MovementSpeed => Some((limits.speed_min, limits.speed_max)),
        AttributeKind::MaxHealth => Some((limits.health_min, limits.health_max)),
        AttributeKind::AttackDamage => Some((limits.damage_min, limits.damage_max)),
        _ => None,
    };
    if let Some((min, max)) = bounds {
        if reading.value < min || reading.value > max {
            reporter.warn(&format!(
                "attribute out of range: entity={name} attribute={attr} value={} range=[{min},{max}] base={}",
                reading.value, reading.base
            ));
            bad = true;
        }
    }
    bad
}

fn within(value: f64, min: f64, max: f64) -> bool {
    value.is_finite() && value >= min && value <= max
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_sticky_across_later_findings() {
        let mut d = Diagnosis::default();
        d.add_severe(IssueType::Location);
        d.add(IssueType::Health);
        assert!(d.is_severe());
        assert_eq!(
            d.issues().collect::<Vec<_>>(),
            vec![IssueType::Location, IssueType::Health]
        );
    }

    #[test]
    fn duplicates_collapse() {
        let d = Diagnosis::from_issues([IssueType::Effects, IssueType::Effects], false);
        assert_eq!(d.issues().count(), 1);
        assert!(d.has_issues());
        assert!(!Diagnosis::default().has_issues());
    }

    #[test]
    fn within_rejects_nan_and_edges_are_inclusive() {
        assert!(within(0.5, 0.5, 1024.0));
        assert!(within(1024.0, 0.5, 1024.0));
        assert!(!within(f64::NAN, 0.5, 1024.0));
        assert!(!within(0.4, 0.5, 1024.0));
    }

    #[test]
    fn panic_message_reads_both_payload_kinds() {
        let a: Box<dyn std::any::Any + Send> = Box::new("static");
        let b: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(a.as_ref()), "static");
        assert_eq!(panic_message(b.as_ref()), "owned");
    }
}

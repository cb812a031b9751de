// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Property tests for diagnosis and repair invariants.
#![allow(clippy::unwrap_used)]

use echo_dry_tests::{FakeEntity, RecordingAudit};
use echo_sentinel::{
    diagnose, repair, AttributeKind, Diagnosis, EntityId, IssueType, RepairContext,
    RepairOutcome, Reporter, SafeStateCache, SentinelConfig, VehicleState,
};
use proptest::prelude::*;
use std::sync::Arc;

fn non_finite() -> impl Strategy<Value = f64> {
    prop_oneof![Just(f64::NAN), Just(f64::INFINITY), Just(f64::NEG_INFINITY)]
}

fn any_health() -> impl Strategy<Value = f64> {
    prop_oneof![
        Just(f64::NAN),
        Just(f64::INFINITY),
        -1.0e6f64..1.0e6,
    ]
}

fn toggled(location: bool, others: [bool; 4]) -> SentinelConfig {
    let mut config = SentinelConfig::default();
    let checks = &mut config.monitoring.checks;
    checks.location = location;
    checks.attributes = others[0];
    checks.effects = others[1];
    checks.inventory = others[2];
    checks.vehicle = others[3];
    config
}

fn run(entity: &FakeEntity, config: &SentinelConfig) -> Diagnosis {
    let mut cache = SafeStateCache::new();
    diagnose(entity, config, &mut cache, &Reporter::default())
}

proptest! {
    #[test]
    fn non_finite_coordinate_is_always_severe_location(
        bad in non_finite(),
        axis in 0usize..3,
        x in -1000.0f64..1000.0,
        y in 0.0f64..200.0,
        z in -1000.0f64..1000.0,
        others in any::<[bool; 4]>(),
        health in any_health(),
        speed in any_health(),
        no_inventory in any::<bool>(),
    ) {
        let mut coords = [x, y, z];
        coords[axis] = bad;
        let mut entity = FakeEntity::new(EntityId(1), "p")
            .at(coords[0], coords[1], coords[2])
            .with_health(health)
            .with_attribute_value(AttributeKind::MovementSpeed, speed)
            .riding(VehicleState::Missing);
        if no_inventory {
            entity = entity.without_inventory();
        }
        let diagnosis = run(&entity, &toggled(true, others));
        prop_assert!(diagnosis.contains(IssueType::Location));
        prop_assert!(diagnosis.is_severe());
    }

    #[test]
    fn deathly_health_never_reports_health(
        health in -1.0e6f64..=0.0,
        max_health in any_health(),
        damage in any_health(),
    ) {
        let entity = FakeEntity::new(EntityId(2), "p")
            .with_health(health)
            .with_attribute_value(AttributeKind::MaxHealth, max_health)
            .with_attribute_value(AttributeKind::AttackDamage, damage)
            .with_effect("poison", -5, 900);
        let diagnosis = run(&entity, &SentinelConfig::default());
        prop_assert!(!diagnosis.contains(IssueType::Health));
        prop_assert!(!diagnosis.has_issues());
    }

    #[test]
    fn dead_entities_never_report_health(health in any_health()) {
        let entity = FakeEntity::new(EntityId(3), "p").with_health(health).dead();
        let diagnosis = run(&entity, &SentinelConfig::default());
        prop_assert!(!diagnosis.contains(IssueType::Health));
    }

    #[test]
    fn clean_repair_is_a_no_op(
        x in -1000.0f64..1000.0,
        y in -60.0f64..300.0,
        z in -1000.0f64..1000.0,
        health in 0.5f64..1024.0,
        context in prop_oneof![
            Just(RepairContext::Auto),
            Just(RepairContext::Manual),
            Just(RepairContext::Gated),
        ],
    ) {
        let config = SentinelConfig::default();
        let audit = RecordingAudit::new();
        let reporter = Reporter::new(Arc::new(audit.clone()), true);
        let mut cache = SafeStateCache::new();
        let mut entity = FakeEntity::new(EntityId(4), "p").at(x, y, z).with_health(health);

        let diagnosis = diagnose(&entity, &config, &mut cache, &reporter);
        prop_assert!(!diagnosis.has_issues());
        let outcome = repair(&mut entity, &diagnosis, context, &config, &cache, &reporter);

        prop_assert_eq!(outcome, RepairOutcome::CLEAN);
        prop_assert_eq!(entity.mutations(), 0);
        prop_assert!(entity.teleports().is_empty());
        prop_assert!(entity.messages().is_empty());
        prop_assert!(audit.is_empty());
    }

    #[test]
    fn severe_only_relocation_skips_non_severe(health in prop_oneof![
        Just(f64::NAN),
        1025.0f64..1.0e9,
        0.01f64..0.49,
    ]) {
        let mut config = SentinelConfig::default();
        config.repair.safe_teleport = true;
        config.repair.teleport_on_severe_only = true;
        let reporter = Reporter::default();
        let mut cache = SafeStateCache::new();
        let mut entity = FakeEntity::new(EntityId(5), "p").with_health(health);

        let diagnosis = diagnose(&entity, &config, &mut cache, &reporter);
        prop_assert_eq!(diagnosis.issues().collect::<Vec<_>>(), vec![IssueType::Health]);
        prop_assert!(!diagnosis.is_severe());

        let outcome = repair(&mut entity, &diagnosis, RepairContext::Auto, &config, &cache, &reporter);
        prop_assert!(outcome.allowed);
        prop_assert!(!outcome.teleported);
        prop_assert!(entity.teleports().is_empty());
    }
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! End-to-end scenarios: corrupt health, out-of-world height, cooldown and
//! reentrancy through the action gate.
#![allow(clippy::unwrap_used, clippy::float_cmp, clippy::panic)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use echo_audit::AuditLevel;
use echo_dry_tests::{FakeEntity, FakeHost, RecordingAudit};
use echo_sentinel::{
    diagnose, repair, ActionVerdict, DeferredState, EntityId, IssueType, PassReason,
    RepairContext, Reporter, SafeStateCache, Sentinel, SentinelConfig, SuppressReason,
};

const ALICE: EntityId = EntityId(7);

fn sentinel_with(config: SentinelConfig) -> (Sentinel, RecordingAudit) {
    let audit = RecordingAudit::new();
    (Sentinel::new(config, Arc::new(audit.clone())), audit)
}

#[test]
fn nan_health_is_healed_in_place_and_action_allowed() {
    let mut config = SentinelConfig::default();
    config.repair.auto_repair = true;
    config.repair.block_command_on_severe = true;
    let reporter = Reporter::default();
    let mut cache = SafeStateCache::new();
    let mut entity = FakeEntity::new(ALICE, "alice")
        .with_health(f64::NAN)
        .with_side_state(0, 120, 30.0);

    let diagnosis = diagnose(&entity, &config, &mut cache, &reporter);
    assert_eq!(diagnosis.issues().collect::<Vec<_>>(), vec![IssueType::Health]);
    assert!(!diagnosis.is_severe());

    let outcome = repair(&mut entity, &diagnosis, RepairContext::Auto, &config, &cache, &reporter);
    assert!(outcome.allowed);
    assert!(!outcome.teleported);
    assert!(entity.teleports().is_empty());
    assert_eq!(entity.current_health(), 20.0);
    assert_eq!(entity.side_state(), (20, 0, 0.0));

    // Same corruption, this time discovered by the gate.
    let (mut sentinel, _) = sentinel_with(config);
    let mut host = FakeHost::new();
    host.join(FakeEntity::new(ALICE, "alice").with_health(f64::NAN));
    let verdict = sentinel.on_action(&mut host, ALICE, "/spawn", Instant::now());
    assert_eq!(verdict, ActionVerdict::Deferred { due_tick: 2 });
    assert_eq!(host.get(ALICE).unwrap().current_health(), 20.0);
}

#[test]
fn fall_below_world_relocates_to_spawn() {
    let mut config = SentinelConfig::default();
    config.repair.teleport_on_severe_only = true;
    assert_eq!(config.repair.thresholds.y_min, -64.0);
    let reporter = Reporter::default();
    let mut cache = SafeStateCache::new();
    let mut entity = FakeEntity::new(ALICE, "alice")
        .at(10.0, -500.0, 10.0)
        .spawn_at(0.5, 70.0, 0.5);

    let diagnosis = diagnose(&entity, &config, &mut cache, &reporter);
    assert_eq!(diagnosis.issues().collect::<Vec<_>>(), vec![IssueType::Location]);
    assert!(diagnosis.is_severe());
    assert!(cache.get(ALICE).is_none());

    let outcome = repair(&mut entity, &diagnosis, RepairContext::Auto, &config, &cache, &reporter);
    assert!(outcome.teleported);
    let landed = entity.current_position();
    assert_eq!((landed.x, landed.y, landed.z), (0.5, 70.0, 0.5));
}

#[test]
fn fall_below_world_prefers_cached_position() {
    let config = SentinelConfig::default();
    let reporter = Reporter::default();
    let mut cache = SafeStateCache::new();
    let mut entity = FakeEntity::new(ALICE, "alice").at(100.0, 80.0, -20.0);
    assert!(!diagnose(&entity, &config, &mut cache, &reporter).has_issues());

    entity = entity.at(100.0, -500.0, -20.0);
    let diagnosis = diagnose(&entity, &config, &mut cache, &reporter);
    repair(&mut entity, &diagnosis, RepairContext::Auto, &config, &cache, &reporter);
    let landed = entity.current_position();
    assert_eq!((landed.x, landed.y, landed.z), (100.0, 80.0, -20.0));
}

#[test]
fn second_attempt_inside_cooldown_skips_evaluation() {
    let mut config = SentinelConfig::default();
    config.command_protection.cooldown = 1000;
    let (mut sentinel, audit) = sentinel_with(config);
    let mut host = FakeHost::new();
    host.join(FakeEntity::new(ALICE, "alice"));
    let t0 = Instant::now();

    let first = sentinel.on_action(&mut host, ALICE, "/home", t0);
    assert!(matches!(first, ActionVerdict::Deferred { .. }));
    let evaluated_at = sentinel.gate().last_evaluated(ALICE);

    // Corrupt the entity: a second evaluation would repair it.
    *host.get_mut(ALICE).unwrap() = FakeEntity::new(ALICE, "alice").with_health(f64::NAN);
    let records = audit.records().len();

    let second = sentinel.on_action(
        &mut host,
        ALICE,
        "/home",
        t0 + Duration::from_millis(500),
    );
    assert_eq!(second, ActionVerdict::Suppressed(SuppressReason::Cooldown));
    assert!(second.suppresses_original());
    assert!(host.get(ALICE).unwrap().current_health().is_nan());
    assert!(host.get(ALICE).unwrap().messages().is_empty());
    assert_eq!(audit.records().len(), records);
    assert_eq!(sentinel.gate().last_evaluated(ALICE), evaluated_at);

    // Outside the window the attempt is evaluated again.
    let third = sentinel.on_action(
        &mut host,
        ALICE,
        "/home",
        t0 + Duration::from_millis(1000),
    );
    assert!(matches!(third, ActionVerdict::Deferred { .. }));
    assert_eq!(host.get(ALICE).unwrap().current_health(), 20.0);
}

#[test]
fn deferred_tail_is_never_regated() {
    let (mut sentinel, _) = sentinel_with(SentinelConfig::default());
    let mut host = FakeHost::new().with_guard(sentinel.guard());
    host.join(FakeEntity::new(ALICE, "alice"));
    let t0 = Instant::now();

    let verdict = sentinel.on_action(&mut host, ALICE, "/warp shop", t0);
    let ActionVerdict::Deferred { due_tick } = verdict else {
        panic!("expected deferral, got {verdict:?}");
    };
    assert_eq!(due_tick, 2);

    assert!(sentinel.tick(&mut host).deferred.is_empty());
    let report = sentinel.tick(&mut host);
    assert_eq!(report.deferred, vec![(ALICE, DeferredState::Done)]);
    assert_eq!(host.executed(), &[(ALICE, "warp shop".to_owned())]);
    assert_eq!(host.guarded_during_execute(), &[true]);
    assert!(sentinel.guard().is_empty());

    // While the token is held, the same protected action passes straight through,
    // even inside the cooldown window.
    let token = sentinel.guard().acquire(ALICE).unwrap();
    let verdict = sentinel.on_action(&mut host, ALICE, "/warp shop", t0);
    assert_eq!(verdict, ActionVerdict::PassThrough(PassReason::Reentrant));
    drop(token);
    let verdict = sentinel.on_action(&mut host, ALICE, "/warp shop", t0);
    assert_eq!(verdict, ActionVerdict::Suppressed(SuppressReason::Cooldown));
}

#[test]
fn severe_diagnosis_blocks_the_action() {
    let (mut sentinel, audit) = sentinel_with(SentinelConfig::default());
    let mut host = FakeHost::new();
    host.join(FakeEntity::new(ALICE, "alice").at(0.0, f64::NAN, 0.0));

    let verdict = sentinel.on_action(&mut host, ALICE, "/tp bob", Instant::now());
    assert_eq!(verdict, ActionVerdict::Suppressed(SuppressReason::Unsafe));
    assert_eq!(sentinel.pending_tasks(), 0);

    let alice = host.get(ALICE).unwrap();
    assert_eq!(alice.teleports().len(), 1);
    let messages = alice.messages();
    assert!(messages.iter().any(|m| m.contains("blocked")), "{messages:?}");
    assert!(audit.count(AuditLevel::Warn) >= 2);
}

#[test]
fn unprotected_bypass_and_disabled_pass_through() {
    let mut config = SentinelConfig::default();
    config.command_protection.protected_commands = vec!["/Spawn".into(), " ".into()];
    let (mut sentinel, _) = sentinel_with(config);
    let mut host = FakeHost::new();
    host.join(FakeEntity::new(ALICE, "alice").with_health(f64::NAN));
    host.join(FakeEntity::new(EntityId(8), "bob").with_capability("sentinel.bypass.protection"));
    let now = Instant::now();

    assert_eq!(
        sentinel.on_action(&mut host, ALICE, "/home", now),
        ActionVerdict::PassThrough(PassReason::Unprotected)
    );
    assert_eq!(
        sentinel.on_action(&mut host, EntityId(8), "/SPAWN", now),
        ActionVerdict::PassThrough(PassReason::Bypass)
    );
    sentinel.set_gate_enabled(false);
    assert_eq!(
        sentinel.on_action(&mut host, ALICE, "/spawn", now),
        ActionVerdict::PassThrough(PassReason::Disabled)
    );
    // Nothing was diagnosed.
    assert!(host.get(ALICE).unwrap().current_health().is_nan());
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The sentinel: scan scheduling, gate decisions and deferred execution.
//!
//! The host owns the authoritative loop and calls [`Sentinel::tick`] once per
//! simulation tick. Every mutation the sentinel makes (repairs, relocation,
//! disconnects, deferred actions) happens inside `tick` or [`Sentinel::on_action`],
//! both of which run on the caller's thread and never let a fault escape.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use echo_audit::AuditSink;
use echo_sched::{TaskId, Tick, TickScheduler};
use tracing::instrument;

use crate::cache::SafeStateCache;
use crate::config::SentinelConfig;
use crate::diagnosis::{diagnose, panic_message, Diagnosis};
use crate::gate::{ActionGate, DeferredAction, DeferredState, GuardSet, PassReason, Screening};
use crate::host::{Entity, EntityId, Host, StatusEffect};
use crate::repair::{issue_labels, repair, RepairContext, RepairOutcome};
use crate::report::Reporter;
use crate::scan::{ScanCursor, SCAN_INITIAL_DELAY};

/// Work queued on the sentinel's tick scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentinelTask {
    /// One scan batch.
    Scan,
    /// Post-join check.
    JoinCheck(EntityId),
    /// An allowed gated action.
    Deferred(DeferredAction),
    /// Last-resort disconnect after a failed repair.
    Disconnect(EntityId),
}

/// Why a gated action was suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Inside the cooldown window; no evaluation ran.
    Cooldown,
    /// The safety evaluation denied it.
    Unsafe,
    /// The entity was not connected.
    Offline,
}

/// What the host should do with an intercepted action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionVerdict {
    /// Execute it now.
    PassThrough(PassReason),
    /// Drop it.
    Suppressed(SuppressReason),
    /// Drop it now; the sentinel will run it on `due_tick`.
    Deferred {
        /// Tick on which the action runs.
        due_tick: Tick,
    },
}

impl ActionVerdict {
    /// True when the host must not execute the original action.
    pub fn suppresses_original(self) -> bool {
        !matches!(self, Self::PassThrough(_))
    }
}

/// Result of checking one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    /// What the diagnoser found.
    pub diagnosis: Diagnosis,
    /// The repair result, when a repair ran.
    pub repair: Option<RepairOutcome>,
}

/// Summary of one [`Sentinel::tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The tick that was processed.
    pub tick: Tick,
    /// Entities diagnosed by scans and join checks.
    pub scanned: usize,
    /// Repairs that ran.
    pub repaired: usize,
    /// Terminal states of deferred actions handled this tick.
    pub deferred: Vec<(EntityId, DeferredState)>,
    /// Entities disconnected this tick.
    pub disconnected: Vec<EntityId>,
    /// Tasks whose handler panicked.
    pub faults: usize,
}

/// Self-healing monitor for one host.
#[derive(Debug)]
pub struct Sentinel {
    config: SentinelConfig,
    reporter: Reporter,
    cache: SafeStateCache,
    cursor: ScanCursor,
    gate: ActionGate,
    scheduler: TickScheduler<SentinelTask>,
    monitor: Option<TaskId>,
}

impl Sentinel {
    /// A sentinel with `config`, auditing to `audit`. Monitoring is not started.
    pub fn new(config: SentinelConfig, audit: Arc<dyn AuditSink>) -> Self {
        let reporter = Reporter::new(audit, config.debug_mode);
        let gate = ActionGate::new(&config.command_protection);
        Self {
            config,
            reporter,
            cache: SafeStateCache::new(),
            cursor: ScanCursor::new(),
            gate,
            scheduler: TickScheduler::new(),
            monitor: None,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    /// Swaps in a new configuration. A running scan timer restarts with the
    /// new interval; the gate picks up the new protected set and timings.
    pub fn apply_config(&mut self, config: SentinelConfig) {
        self.reporter.set_debug(config.debug_mode);
        self.gate.reconfigure(&config.command_protection);
        self.config = config;
        if self.is_monitoring() {
            self.start_monitoring();
        }
        self.reporter.debug(&format!(
            "configuration applied: enabled={} gate={} monitor={}",
            self.config.enabled,
            self.gate_running(),
            self.is_monitoring()
        ));
    }

    /// Flips action gating on or off without touching anything else.
    pub fn set_gate_enabled(&mut self, on: bool) {
        self.config.command_protection.enabled = on;
    }

    /// (Re)starts the periodic scan: first batch after
    /// [`SCAN_INITIAL_DELAY`] ticks, then every `check-interval`.
    pub fn start_monitoring(&mut self) {
        self.stop_monitoring();
        let period = self.config.monitoring.check_interval.max(1);
        self.monitor = Some(self.scheduler.schedule_repeating(
            SCAN_INITIAL_DELAY,
            period,
            SentinelTask::Scan,
        ));
        self.cursor.reset();
        self.reporter
            .info(&format!("monitor started: check_interval={period}"));
    }

    /// Arms the scan timer if the configuration wants it and it is not
    /// already running. Returns whether it is running afterwards.
    pub fn start_if_configured(&mut self) -> bool {
        if self.config.enabled && self.config.monitoring.enabled && !self.is_monitoring() {
            self.start_monitoring();
        }
        self.is_monitoring()
    }

    /// Cancels the scan timer. In-flight deferred actions are unaffected.
    pub fn stop_monitoring(&mut self) {
        if let Some(id) = self.monitor.take() {
            self.scheduler.cancel(id);
            self.reporter.info("monitor stopped");
        }
    }

    /// Whether the scan timer is armed.
    pub fn is_monitoring(&self) -> bool {
        self.monitor
            .is_some_and(|id| self.scheduler.is_scheduled(id))
    }

    /// Whether intercepted actions are being gated.
    pub fn gate_running(&self) -> bool {
        self.config.enabled && self.config.command_protection.enabled
    }

    /// Shared reentrancy guard. Hosts clone this to see which entities are
    /// running a deferred action.
    pub fn guard(&self) -> GuardSet {
        self.gate.guard().clone()
    }

    /// The action gate.
    pub fn gate(&self) -> &ActionGate {
        &self.gate
    }

    /// Last-known-good positions.
    pub fn cache(&self) -> &SafeStateCache {
        &self.cache
    }

    /// The last processed tick.
    pub fn current_tick(&self) -> Tick {
        self.scheduler.now()
    }

    /// Tasks waiting on the scheduler.
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.pending()
    }

    /// Logging handle.
    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Queues a check for a newly joined entity on the next tick.
    pub fn on_join(&mut self, id: EntityId) {
        self.scheduler.schedule(1, SentinelTask::JoinCheck(id));
    }

    /// Purges every per-entity record for a departed entity.
    pub fn on_leave(&mut self, id: EntityId) {
        self.cache.remove(id);
        self.gate.forget(id);
    }

    /// Decides what happens to an intercepted action line.
    ///
    /// Throttled attempts are dropped without running a diagnosis. Allowed
    /// attempts are always deferred, never executed in place.
    pub fn on_action<H: Host>(
        &mut self,
        host: &mut H,
        id: EntityId,
        line: &str,
        now: Instant,
    ) -> ActionVerdict {
        if !self.gate_running() {
            return ActionVerdict::PassThrough(PassReason::Disabled);
        }
        let screening = self.gate.screen(id, line, now, |capability| {
            host.entity(id)
                .is_some_and(|entity| entity.has_capability(capability))
        });
        match screening {
            Screening::Pass(reason) => ActionVerdict::PassThrough(reason),
            Screening::Throttled => {
                self.reporter
                    .debug(&format!("action throttled: entity={id} action={line}"));
                ActionVerdict::Suppressed(SuppressReason::Cooldown)
            }
            Screening::Evaluate => self.evaluate(host, id, line),
        }
    }

    fn evaluate<H: Host>(&mut self, host: &mut H, id: EntityId, line: &str) -> ActionVerdict {
        self.reporter
            .debug(&format!("evaluating protected action: entity={id} action={line}"));
        let Some(entity) = host.entity(id) else {
            return ActionVerdict::Suppressed(SuppressReason::Offline);
        };

        let config = &self.config;
        let cache = &mut self.cache;
        let reporter = &self.reporter;
        let evaluation = catch_unwind(AssertUnwindSafe(|| {
            let diagnosis = diagnose(&*entity, config, cache, reporter);
            repair(entity, &diagnosis, RepairContext::Gated, config, cache, reporter)
        }));
        let messages = &self.config.messages;
        let outcome = match evaluation {
            Ok(outcome) => outcome,
            Err(payload) => {
                self.reporter.warn(&format!(
                    "safety evaluation faulted: entity={id} reason={}",
                    panic_message(payload.as_ref())
                ));
                entity.send_message(&messages.prefixed("command-blocked"));
                return ActionVerdict::Suppressed(SuppressReason::Unsafe);
            }
        };

        if !outcome.allowed {
            if !outcome.reported {
                entity.send_message(&messages.prefixed("command-blocked"));
            }
            if outcome.unrepaired {
                self.schedule_disconnect(id);
            }
            return ActionVerdict::Suppressed(SuppressReason::Unsafe);
        }

        entity.send_message(&messages.prefixed("command-processing"));
        if let Err(fault) = entity.add_effect(StatusEffect::protective_resistance()) {
            self.reporter
                .debug(&format!("protective effect not applied: entity={id} {fault}"));
        }
        let delay = self.gate.delay_ticks().max(1);
        self.scheduler
            .schedule(delay, SentinelTask::Deferred(DeferredAction::new(id, line)));
        ActionVerdict::Deferred {
            due_tick: self.scheduler.now() + delay,
        }
    }

    /// Runs everything due on the next tick, in scheduling order.
    #[instrument(skip_all, fields(tick = self.scheduler.now() + 1))]
    pub fn tick<H: Host>(&mut self, host: &mut H) -> TickReport {
        let due = self.scheduler.advance();
        let mut report = TickReport {
            tick: self.scheduler.now(),
            ..TickReport::default()
        };
        for (_, task) in due {
            let ran = catch_unwind(AssertUnwindSafe(|| {
                self.run_task(host, task, &mut report);
            }));
            if let Err(payload) = ran {
                report.faults += 1;
                self.reporter.error(&format!(
                    "scheduled task faulted: reason={}",
                    panic_message(payload.as_ref())
                ));
            }
        }
        report
    }

    fn run_task<H: Host>(&mut self, host: &mut H, task: SentinelTask, report: &mut TickReport) {
        match task {
            SentinelTask::Scan => {
                if !self.config.enabled || !self.config.monitoring.enabled {
                    return;
                }
                for id in self.cursor.next_batch(|| host.online()) {
                    tally(self.check_entity(host, id, false), report);
                }
            }
            SentinelTask::JoinCheck(id) => {
                if self.config.enabled {
                    tally(self.check_entity(host, id, false), report);
                }
            }
            SentinelTask::Deferred(action) => {
                let entity = action.entity();
                let state = self.run_deferred(host, action);
                report.deferred.push((entity, state));
            }
            SentinelTask::Disconnect(id) => {
                if let Some(name) = host.entity(id).map(|e| e.name().to_owned()) {
                    self.reporter
                        .warn(&format!("repair failed, disconnecting: entity={name}"));
                    host.disconnect(id, &self.config.messages.prefixed("kick-message"));
                    self.on_leave(id);
                    report.disconnected.push(id);
                }
            }
        }
    }

    /// Diagnoses one entity and repairs it if policy allows. `None` when the
    /// entity is not connected.
    ///
    /// A clean manual check tells the entity so. An automatic check with
    /// `auto-repair` off only logs what it found.
    pub fn check_entity<H: Host>(
        &mut self,
        host: &mut H,
        id: EntityId,
        manual: bool,
    ) -> Option<CheckOutcome> {
        let entity = host.entity(id)?;
        let diagnosis = diagnose(&*entity, &self.config, &mut self.cache, &self.reporter);
        let messages = &self.config.messages;

        if !diagnosis.has_issues() {
            if manual {
                entity.send_message(&messages.prefixed("diagnose-manual-ok"));
            }
            return Some(CheckOutcome {
                diagnosis,
                repair: None,
            });
        }

        let items = issue_labels(messages, &diagnosis);
        if manual {
            self.reporter.warn(&format!(
                "manual check found issues: entity={} items={items}",
                entity.name()
            ));
        } else if !self.config.repair.auto_repair {
            self.reporter.warn(&format!(
                "issues detected but auto-repair is off: entity={} items={items}",
                entity.name()
            ));
            return Some(CheckOutcome {
                diagnosis,
                repair: None,
            });
        }

        let context = if manual {
            RepairContext::Manual
        } else {
            RepairContext::Auto
        };
        let outcome = repair(
            entity,
            &diagnosis,
            context,
            &self.config,
            &self.cache,
            &self.reporter,
        );
        if outcome.unrepaired {
            self.schedule_disconnect(id);
        }
        Some(CheckOutcome {
            diagnosis,
            repair: Some(outcome),
        })
    }

    /// Manual check of the whole population at once.
    pub fn check_all<H: Host>(&mut self, host: &mut H) -> Vec<(EntityId, CheckOutcome)> {
        host.online()
            .into_iter()
            .filter_map(|id| self.check_entity(host, id, true).map(|o| (id, o)))
            .collect()
    }

    fn schedule_disconnect(&mut self, id: EntityId) {
        if self.config.repair.kick_if_unrepairable {
            self.scheduler.schedule(1, SentinelTask::Disconnect(id));
        }
    }

    fn run_deferred<H: Host>(&mut self, host: &mut H, mut action: DeferredAction) -> DeferredState {
        let id = action.entity();
        if host.entity(id).is_none() {
            action.transition(DeferredState::Dropped);
            self.reporter
                .debug(&format!("deferred action dropped, entity left: entity={id}"));
            return action.state();
        }
        let Some(token) = self.gate.guard().acquire(id) else {
            action.transition(DeferredState::Dropped);
            self.reporter
                .warn(&format!("deferred action dropped, already executing: entity={id}"));
            return action.state();
        };

        action.transition(DeferredState::Executing);
        let executed = catch_unwind(AssertUnwindSafe(|| {
            host.execute_action(id, action.command())
        }));
        drop(token);

        let fault = match executed {
            Ok(Ok(())) => None,
            Ok(Err(fault)) => Some(fault.to_string()),
            Err(payload) => Some(panic_message(payload.as_ref())),
        };
        let Some(reason) = fault else {
            action.transition(DeferredState::Done);
            self.reporter.debug(&format!(
                "deferred action complete: entity={id} action={}",
                action.line()
            ));
            return action.state();
        };

        action.transition(DeferredState::Faulted);
        self.reporter.error(&format!(
            "deferred action failed: entity={id} action={} reason={reason}",
            action.line()
        ));
        if let Some(entity) = host.entity(id) {
            entity.send_message(&self.config.messages.prefixed("command-error"));
            if self.config.repair.safe_teleport {
                let moved = entity
                    .spawn_position()
                    .and_then(|spawn| entity.teleport(&spawn));
                if let Err(fault) = moved {
                    self.reporter
                        .error(&format!("safety relocation failed: entity={id} {fault}"));
                }
            }
        }
        action.state()
    }
}

fn tally(outcome: Option<CheckOutcome>, report: &mut TickReport) {
    if let Some(outcome) = outcome {
        report.scanned += 1;
        if outcome.repair.is_some() {
            report.repaired += 1;
        }
    }
}

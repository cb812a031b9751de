// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Action gate: screening, cooldown throttling and the reentrancy guard.
//!
//! The gate decides which action attempts need a safety evaluation. The
//! evaluation itself (diagnose then repair) and the deferred execution are
//! driven by [`Sentinel`](crate::Sentinel); this module only owns the
//! per-entity state they need.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::config::CommandProtectionConfig;
use crate::host::EntityId;

/// Name of an action line: its first whitespace-separated token, lowercased.
pub fn action_name(line: &str) -> String {
    line.split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Entities currently inside a deferred execution window.
///
/// Cloning shares the same set, so the host's action path can check
/// membership while the sentinel is executing on its behalf.
#[derive(Debug, Clone, Default)]
pub struct GuardSet(Rc<RefCell<HashSet<EntityId>>>);

impl GuardSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is inside an execution window.
    pub fn contains(&self, id: EntityId) -> bool {
        self.0.borrow().contains(&id)
    }

    /// Enters the window for `id`. `None` if it is already inside one.
    pub fn acquire(&self, id: EntityId) -> Option<ExecutionToken> {
        self.0.borrow_mut().insert(id).then(|| ExecutionToken {
            guard: self.clone(),
            id,
        })
    }

    /// Forces `id` out of the set. Used when the entity disconnects.
    pub fn evict(&self, id: EntityId) -> bool {
        self.0.borrow_mut().remove(&id)
    }

    /// Number of entities inside a window.
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// True when no window is open.
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// Membership in a [`GuardSet`]; released on drop, including during unwind.
#[derive(Debug)]
#[must_use = "the guard is released as soon as the token is dropped"]
pub struct ExecutionToken {
    guard: GuardSet,
    id: EntityId,
}

impl ExecutionToken {
    /// The guarded entity.
    pub fn entity(&self) -> EntityId {
        self.id
    }
}

impl Drop for ExecutionToken {
    fn drop(&mut self) {
        self.guard.evict(self.id);
    }
}

/// Why an action went through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    /// The entity is inside its own deferred execution.
    Reentrant,
    /// The action is not protected.
    Unprotected,
    /// The entity holds the bypass capability.
    Bypass,
    /// Gating is switched off.
    Disabled,
}

/// First-stage verdict of [`ActionGate::screen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screening {
    /// Let the action run now.
    Pass(PassReason),
    /// Suppress silently; the cooldown has not elapsed.
    Throttled,
    /// Run a safety evaluation. The cooldown clock has been reset.
    Evaluate,
}

/// Per-entity gate state.
#[derive(Debug)]
pub struct ActionGate {
    protected: BTreeSet<String>,
    cooldown: Duration,
    delay_ticks: u64,
    bypass_capability: String,
    last_evaluated: HashMap<EntityId, Instant>,
    guard: GuardSet,
}

impl ActionGate {
    /// Gate configured from `config`.
    pub fn new(config: &CommandProtectionConfig) -> Self {
        let mut gate = Self {
            protected: BTreeSet::new(),
            cooldown: Duration::ZERO,
            delay_ticks: 0,
            bypass_capability: String::new(),
            last_evaluated: HashMap::new(),
            guard: GuardSet::new(),
        };
        gate.reconfigure(config);
        gate
    }

    /// Applies new settings. Cooldown records and the guard set survive.
    pub fn reconfigure(&mut self, config: &CommandProtectionConfig) {
        self.protected = config.normalized();
        self.cooldown = config.cooldown();
        self.delay_ticks = config.delay_ticks;
        self.bypass_capability.clone_from(&config.bypass_capability);
    }

    /// Canonical protected names.
    pub fn protected(&self) -> &BTreeSet<String> {
        &self.protected
    }

    /// Whether `name` (already lowercased) is protected.
    pub fn is_protected(&self, name: &str) -> bool {
        self.protected.contains(name)
    }

    /// Current cooldown window.
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Ticks between allow and execution.
    pub fn delay_ticks(&self) -> u64 {
        self.delay_ticks
    }

    /// Capability that skips the gate.
    pub fn bypass_capability(&self) -> &str {
        &self.bypass_capability
    }

    /// Shared guard set handle.
    pub fn guard(&self) -> &GuardSet {
        &self.guard
    }

    /// Runs the reentrancy, membership, bypass and cooldown stages in order.
    ///
    /// `has_capability` is only consulted for protected actions.
    pub fn screen(
        &mut self,
        id: EntityId,
        line: &str,
        now: Instant,
        has_capability: impl FnOnce(&str) -> bool,
    ) -> Screening {
        if self.guard.contains(id) {
            return Screening::Pass(PassReason::Reentrant);
        }
        if !self.is_protected(&action_name(line)) {
            return Screening::Pass(PassReason::Unprotected);
        }
        if has_capability(&self.bypass_capability) {
            return Screening::Pass(PassReason::Bypass);
        }
        if let Some(last) = self.last_evaluated.get(&id) {
            if now.saturating_duration_since(*last) < self.cooldown {
                return Screening::Throttled;
            }
        }
        let stamp = self
            .last_evaluated
            .get(&id)
            .map_or(now, |last| now.max(*last));
        self.last_evaluated.insert(id, stamp);
        Screening::Evaluate
    }

    /// Last evaluation time for `id`.
    pub fn last_evaluated(&self, id: EntityId) -> Option<Instant> {
        self.last_evaluated.get(&id).copied()
    }

    /// Drops all state for a departed entity.
    pub fn forget(&mut self, id: EntityId) {
        self.last_evaluated.remove(&id);
        self.guard.evict(id);
    }
}

/// Lifecycle of a deferred action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredState {
    /// Waiting for its tick.
    Pending,
    /// Running under the guard.
    Executing,
    /// Ran without fault.
    Done,
    /// The host reported a fault or panicked.
    Faulted,
    /// The entity left before the action ran.
    Dropped,
}

/// An allowed action waiting to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredAction {
    entity: EntityId,
    line: String,
    state: DeferredState,
}

impl DeferredAction {
    /// New pending action for `entity`.
    pub fn new(entity: EntityId, line: impl Into<String>) -> Self {
        Self {
            entity,
            line: line.into(),
            state: DeferredState::Pending,
        }
    }

    /// Acting entity.
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Original action line.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// The line handed to the host: leading `/` stripped.
    pub fn command(&self) -> &str {
        self.line.strip_prefix('/').unwrap_or(&self.line)
    }

    /// Current state.
    pub fn state(&self) -> DeferredState {
        self.state
    }

    /// Moves to `next` if that is a legal transition. Returns whether it moved.
    pub fn transition(&mut self, next: DeferredState) -> bool {
        use DeferredState::{Done, Dropped, Executing, Faulted, Pending};
        let legal = matches!(
            (self.state, next),
            (Pending, Executing | Dropped) | (Executing, Done | Faulted)
        );
        if legal {
            self.state = next;
        }
        legal
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn gate(cooldown_ms: u64) -> ActionGate {
        ActionGate::new(&CommandProtectionConfig {
            protected_commands: vec!["tp".into(), "/Spawn".into()],
            cooldown: cooldown_ms,
            ..CommandProtectionConfig::default()
        })
    }

    #[test]
    fn action_name_takes_first_token() {
        assert_eq!(action_name("/TP alice 0 64 0"), "/tp");
        assert_eq!(action_name("   "), "");
    }

    #[test]
    fn token_releases_on_drop_and_blocks_double_acquire() {
        let guard = GuardSet::new();
        let id = EntityId(3);
        {
            let token = guard.acquire(id);
            assert!(token.is_some());
            assert!(guard.contains(id));
            assert!(guard.acquire(id).is_none());
        }
        assert!(!guard.contains(id));
    }

    #[test]
    fn token_releases_during_unwind() {
        let guard = GuardSet::new();
        let inner = guard.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _token = inner.acquire(EntityId(1));
            panic!("host blew up");
        }));
        assert!(result.is_err());
        assert!(guard.is_empty());
    }

    #[test]
    fn screening_order() {
        let mut g = gate(1000);
        let id = EntityId(1);
        let now = Instant::now();

        assert_eq!(
            g.screen(id, "/say hi", now, |_| true),
            Screening::Pass(PassReason::Unprotected)
        );
        assert_eq!(
            g.screen(id, "/spawn", now, |cap| cap == "sentinel.bypass.protection"),
            Screening::Pass(PassReason::Bypass)
        );
        assert_eq!(g.screen(id, "/tp 0 0 0", now, |_| false), Screening::Evaluate);
        assert_eq!(
            g.screen(id, "/tp 0 0 0", now + Duration::from_millis(500), |_| false),
            Screening::Throttled
        );
        assert_eq!(
            g.screen(id, "/tp 0 0 0", now + Duration::from_millis(1000), |_| false),
            Screening::Evaluate
        );

        let _token = g.guard().acquire(id);
        assert_eq!(
            g.screen(id, "/tp", now, |_| false),
            Screening::Pass(PassReason::Reentrant)
        );
    }

    #[test]
    fn throttled_attempt_does_not_extend_window() {
        let mut g = gate(1000);
        let id = EntityId(9);
        let t0 = Instant::now();
        assert_eq!(g.screen(id, "/tp", t0, |_| false), Screening::Evaluate);
        assert_eq!(
            g.screen(id, "/tp", t0 + Duration::from_millis(900), |_| false),
            Screening::Throttled
        );
        assert_eq!(g.last_evaluated(id), Some(t0));
    }

    #[test]
    fn forget_clears_cooldown_and_guard() {
        let mut g = gate(1000);
        let id = EntityId(2);
        let now = Instant::now();
        assert_eq!(g.screen(id, "/tp", now, |_| false), Screening::Evaluate);
        let token = g.guard().acquire(id);
        g.forget(id);
        assert!(g.last_evaluated(id).is_none());
        assert!(!g.guard().contains(id));
        drop(token);
        assert_eq!(g.screen(id, "/tp", now, |_| false), Screening::Evaluate);
    }

    #[test]
    fn deferred_transitions() {
        let mut a = DeferredAction::new(EntityId(1), "/home base");
        assert_eq!(a.command(), "home base");
        assert!(!a.transition(DeferredState::Done));
        assert!(a.transition(DeferredState::Executing));
        assert!(!a.transition(DeferredState::Dropped));
        assert!(a.transition(DeferredState::Faulted));
        assert_eq!(a.state(), DeferredState::Faulted);
        assert!(!a.transition(DeferredState::Executing));
    }
}

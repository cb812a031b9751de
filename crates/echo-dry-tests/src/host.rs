// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory [`Host`] that records every action and disconnect.

use std::collections::BTreeMap;

use echo_sentinel::{EntityId, GuardSet, Host, HostFault};

use crate::entity::FakeEntity;

/// How [`FakeHost::execute_action`] behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecuteMode {
    /// Every action succeeds.
    #[default]
    Succeed,
    /// Every action returns a `HostFault`.
    Fail,
    /// Every action panics.
    Panic,
}

/// Population keyed by id; traversal order is ascending id.
#[derive(Debug, Default)]
pub struct FakeHost {
    entities: BTreeMap<EntityId, FakeEntity>,
    executed: Vec<(EntityId, String)>,
    disconnected: Vec<(EntityId, String)>,
    mode: ExecuteMode,
    guard: Option<GuardSet>,
    guarded_during_execute: Vec<bool>,
}

impl FakeHost {
    /// Empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects an entity, replacing any with the same id.
    pub fn join(&mut self, entity: FakeEntity) -> EntityId {
        use echo_sentinel::Entity as _;
        let id = entity.id();
        self.entities.insert(id, entity);
        id
    }

    /// Disconnects an entity without recording it as a forced disconnect.
    pub fn leave(&mut self, id: EntityId) -> Option<FakeEntity> {
        self.entities.remove(&id)
    }

    /// Borrows a connected entity.
    pub fn get(&self, id: EntityId) -> Option<&FakeEntity> {
        self.entities.get(&id)
    }

    /// Mutably borrows a connected entity.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut FakeEntity> {
        self.entities.get_mut(&id)
    }

    /// Observes `guard` during each execution.
    pub fn with_guard(mut self, guard: GuardSet) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Changes how actions execute.
    pub fn set_execute_mode(&mut self, mode: ExecuteMode) {
        self.mode = mode;
    }

    /// Actions handed to the execution path, in order.
    pub fn executed(&self) -> &[(EntityId, String)] {
        &self.executed
    }

    /// Forced disconnects with their reason text.
    pub fn disconnected(&self) -> &[(EntityId, String)] {
        &self.disconnected
    }

    /// For each execution, whether the observed guard held the entity.
    pub fn guarded_during_execute(&self) -> &[bool] {
        &self.guarded_during_execute
    }

    /// Number of connected entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Host for FakeHost {
    type Entity = FakeEntity;

    fn online(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    fn entity(&mut self, id: EntityId) -> Option<&mut FakeEntity> {
        self.entities.get_mut(&id)
    }

    #[allow(clippy::panic)]
    fn execute_action(&mut self, id: EntityId, action: &str) -> Result<(), HostFault> {
        if let Some(guard) = &self.guard {
            self.guarded_during_execute.push(guard.contains(id));
        }
        self.executed.push((id, action.to_owned()));
        match self.mode {
            ExecuteMode::Succeed => Ok(()),
            ExecuteMode::Fail => Err(HostFault::new(format!("action `{action}` failed"))),
            ExecuteMode::Panic => panic!("action `{action}` crashed"),
        }
    }

    fn disconnect(&mut self, id: EntityId, reason: &str) {
        if self.entities.remove(&id).is_some() {
            self.disconnected.push((id, reason.to_owned()));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn traversal_is_ascending_and_disconnect_removes() {
        let mut host = FakeHost::new();
        host.join(FakeEntity::new(EntityId(3), "c"));
        host.join(FakeEntity::new(EntityId(1), "a"));
        assert_eq!(host.online(), vec![EntityId(1), EntityId(3)]);

        host.disconnect(EntityId(3), "bye");
        assert_eq!(host.online(), vec![EntityId(1)]);
        assert_eq!(host.disconnected(), &[(EntityId(3), "bye".to_owned())]);
        // Unknown ids are not recorded.
        host.disconnect(EntityId(9), "bye");
        assert_eq!(host.disconnected().len(), 1);
    }

    #[test]
    fn execute_modes() {
        let mut host = FakeHost::new();
        assert!(host.execute_action(EntityId(1), "spawn").is_ok());
        host.set_execute_mode(ExecuteMode::Fail);
        assert!(host.execute_action(EntityId(1), "spawn").is_err());
        assert_eq!(host.executed().len(), 2);
    }

    #[test]
    fn guard_observation() {
        let guard = GuardSet::new();
        let mut host = FakeHost::new().with_guard(guard.clone());
        let token = guard.acquire(EntityId(1)).unwrap();
        host.execute_action(EntityId(1), "home").unwrap();
        drop(token);
        host.execute_action(EntityId(1), "home").unwrap();
        assert_eq!(host.guarded_during_execute(), &[true, false]);
    }
}

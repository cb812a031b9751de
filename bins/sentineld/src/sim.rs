// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! A toy population that drifts into corrupt states on a fixed rhythm, so
//! the sentinel has something to find.

use std::collections::BTreeMap;

use echo_sentinel::{
    AttributeKind, AttributeReading, Entity, EntityId, Host, HostFault, Modifier, Position,
    StatusEffect, VehicleState,
};
use tracing::{debug, info};

const WORLD: &str = "overworld";
const ADMIN_CAPABILITY: &str = "sentinel.admin";

#[derive(Debug, Clone)]
struct Attribute {
    base: f64,
    default: f64,
    modifiers: Vec<Modifier>,
}

impl Attribute {
    fn new(default: f64) -> Self {
        Self {
            base: default,
            default,
            modifiers: Vec::new(),
        }
    }
}

/// Kinds of damage [`SimHost::corrupt`] cycles through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    /// Health becomes NaN.
    NanHealth,
    /// Falls far below the world floor.
    BelowWorld,
    /// Runaway movement-speed modifier.
    SpeedModifier,
    /// Negative-duration effect.
    BrokenEffect,
    /// Vehicle reference vanishes.
    LostVehicle,
    /// Inventory handle vanishes.
    LostInventory,
}

impl Corruption {
    const CYCLE: [Self; 6] = [
        Self::NanHealth,
        Self::BelowWorld,
        Self::SpeedModifier,
        Self::BrokenEffect,
        Self::LostVehicle,
        Self::LostInventory,
    ];

    /// The `n`th corruption in the rotation.
    pub fn nth(n: u64) -> Self {
        let len = Self::CYCLE.len() as u64;
        usize::try_from(n % len)
            .ok()
            .and_then(|i| Self::CYCLE.get(i).copied())
            .unwrap_or(Self::NanHealth)
    }
}

/// Simulated entity.
#[derive(Debug, Clone)]
pub struct SimEntity {
    id: EntityId,
    name: String,
    position: Position,
    spawn: Position,
    health: f64,
    attributes: BTreeMap<AttributeKind, Attribute>,
    effects: Vec<StatusEffect>,
    inventory: bool,
    vehicle: VehicleState,
    admin: bool,
}

impl SimEntity {
    fn new(id: EntityId, admin: bool) -> Self {
        let offset = f64::from(u32::try_from(id.0 % 1000).unwrap_or(0));
        let attributes = [
            (AttributeKind::MaxHealth, 20.0),
            (AttributeKind::MovementSpeed, 0.1),
            (AttributeKind::AttackDamage, 1.0),
            (AttributeKind::AttackSpeed, 4.0),
            (AttributeKind::Armor, 0.0),
            (AttributeKind::Luck, 0.0),
        ]
        .into_iter()
        .map(|(kind, default)| (kind, Attribute::new(default)))
        .collect();
        Self {
            id,
            name: format!("sim-{}", id.0),
            position: Position::new(WORLD, offset * 16.0, 72.0, -offset * 16.0),
            spawn: Position::new(WORLD, 0.5, 70.0, 0.5),
            health: 20.0,
            attributes,
            effects: Vec::new(),
            inventory: true,
            vehicle: VehicleState::NotRiding,
            admin,
        }
    }

    fn corrupt(&mut self, kind: Corruption) {
        match kind {
            Corruption::NanHealth => self.health = f64::NAN,
            Corruption::BelowWorld => self.position.y = -500.0,
            Corruption::SpeedModifier => {
                if let Some(speed) = self.attributes.get_mut(&AttributeKind::MovementSpeed) {
                    speed.modifiers.push(Modifier {
                        key: "runaway".into(),
                        amount: 40.0,
                    });
                }
            }
            Corruption::BrokenEffect => self.effects.push(StatusEffect {
                kind: "slowness".into(),
                duration: -1,
                amplifier: 300,
                ambient: false,
                particles: true,
            }),
            Corruption::LostVehicle => self.vehicle = VehicleState::Missing,
            Corruption::LostInventory => self.inventory = false,
        }
    }
}

impl Entity for SimEntity {
    fn id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> Result<Position, HostFault> {
        Ok(self.position.clone())
    }

    fn spawn_position(&self) -> Result<Position, HostFault> {
        Ok(self.spawn.clone())
    }

    fn teleport(&mut self, to: &Position) -> Result<(), HostFault> {
        debug!(entity = %self.name, to = %to, "teleport");
        self.position = to.clone();
        self.vehicle = VehicleState::NotRiding;
        Ok(())
    }

    fn is_dead(&self) -> bool {
        false
    }

    fn health(&self) -> Result<f64, HostFault> {
        Ok(self.health)
    }

    fn restore_vitals(&mut self) -> Result<(), HostFault> {
        self.health = 20.0;
        Ok(())
    }

    fn attribute(&self, kind: AttributeKind) -> Result<Option<AttributeReading>, HostFault> {
        Ok(self.attributes.get(&kind).map(|a| AttributeReading {
            value: a.base + a.modifiers.iter().map(|m| m.amount).sum::<f64>(),
            base: a.base,
            default: a.default,
        }))
    }

    fn modifiers(&self, kind: AttributeKind) -> Result<Vec<Modifier>, HostFault> {
        Ok(self
            .attributes
            .get(&kind)
            .map(|a| a.modifiers.clone())
            .unwrap_or_default())
    }

    fn remove_modifier(&mut self, kind: AttributeKind, modifier: &Modifier) -> Result<(), HostFault> {
        if let Some(attr) = self.attributes.get_mut(&kind) {
            attr.modifiers.retain(|m| m.key != modifier.key);
        }
        Ok(())
    }

    fn set_base_value(&mut self, kind: AttributeKind, value: f64) -> Result<(), HostFault> {
        if let Some(attr) = self.attributes.get_mut(&kind) {
            attr.base = value;
        }
        Ok(())
    }

    fn effects(&self) -> Result<Vec<StatusEffect>, HostFault> {
        Ok(self.effects.clone())
    }

    fn add_effect(&mut self, effect: StatusEffect) -> Result<(), HostFault> {
        self.effects.push(effect);
        Ok(())
    }

    fn clear_effects(&mut self) -> Result<(), HostFault> {
        self.effects.clear();
        Ok(())
    }

    fn has_inventory(&self) -> Result<bool, HostFault> {
        Ok(self.inventory)
    }

    fn vehicle(&self) -> Result<VehicleState, HostFault> {
        Ok(self.vehicle.clone())
    }

    fn has_capability(&self, capability: &str) -> bool {
        self.admin && capability == ADMIN_CAPABILITY
    }

    fn send_message(&mut self, text: &str) {
        info!(target: "sentineld::chat", entity = %self.name, "{text}");
    }
}

/// Simulated host. Entity `#0` is an operator holding the admin capability.
#[derive(Debug, Default)]
pub struct SimHost {
    entities: BTreeMap<EntityId, SimEntity>,
    next_id: u64,
}

impl SimHost {
    /// Connects a fresh entity and returns its id.
    pub fn spawn_entity(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.entities.insert(id, SimEntity::new(id, id.0 == 0));
        id
    }

    /// Disconnects the oldest non-operator entity.
    pub fn retire_oldest(&mut self) -> Option<EntityId> {
        let id = self.entities.keys().copied().find(|id| id.0 != 0)?;
        self.entities.remove(&id);
        Some(id)
    }

    /// Applies `kind` to the `n`th connected entity (wrapping).
    pub fn corrupt(&mut self, n: u64, kind: Corruption) -> Option<EntityId> {
        let len = u64::try_from(self.entities.len()).ok().filter(|&l| l > 0)?;
        let index = usize::try_from(n % len).ok()?;
        let entity = self.entities.values_mut().nth(index)?;
        entity.corrupt(kind);
        Some(entity.id)
    }

    /// The `n`th connected entity (wrapping).
    pub fn pick(&self, n: u64) -> Option<EntityId> {
        let len = u64::try_from(self.entities.len()).ok().filter(|&l| l > 0)?;
        let index = usize::try_from(n % len).ok()?;
        self.entities.keys().nth(index).copied()
    }
}

impl Host for SimHost {
    type Entity = SimEntity;

    fn online(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    fn entity(&mut self, id: EntityId) -> Option<&mut SimEntity> {
        self.entities.get_mut(&id)
    }

    fn execute_action(&mut self, id: EntityId, action: &str) -> Result<(), HostFault> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or_else(|| HostFault::new("entity left before the action ran"))?;
        info!(entity = %entity.name, action, "action executed");
        if action.split_whitespace().next() == Some("spawn") {
            let spawn = entity.spawn.clone();
            entity.teleport(&spawn)?;
        }
        Ok(())
    }

    fn disconnect(&mut self, id: EntityId, reason: &str) {
        if let Some(entity) = self.entities.remove(&id) {
            info!(entity = %entity.name, reason, "disconnected");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn operator_survives_churn() {
        let mut host = SimHost::default();
        for _ in 0..3 {
            host.spawn_entity();
        }
        assert_eq!(host.retire_oldest(), Some(EntityId(1)));
        assert_eq!(host.online(), vec![EntityId(0), EntityId(2)]);
        assert!(host.entity(EntityId(0)).unwrap().has_capability(ADMIN_CAPABILITY));
    }

    #[test]
    fn corruption_rotation_wraps() {
        assert_eq!(Corruption::nth(0), Corruption::NanHealth);
        assert_eq!(Corruption::nth(7), Corruption::BelowWorld);
        let mut host = SimHost::default();
        host.spawn_entity();
        let id = host.corrupt(5, Corruption::LostInventory).unwrap();
        assert!(!host.entity(id).unwrap().has_inventory().unwrap());
    }
}

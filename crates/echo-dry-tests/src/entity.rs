// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scriptable entity with per-accessor fault injection.
//!
//! A fresh [`FakeEntity`] is healthy: valid position, full health, player-like
//! attributes, an inventory, no vehicle. Builder methods corrupt exactly the
//! pieces a test cares about; [`FakeEntity::failing`] and
//! [`FakeEntity::panicking`] make a single accessor return a `HostFault` or
//! panic.
//!
//! # Example
//!
//! ```
//! use echo_dry_tests::{FakeEntity, Fault};
//! use echo_sentinel::{AttributeKind, Entity, EntityId};
//!
//! let entity = FakeEntity::new(EntityId(1), "alice")
//!     .with_health(f64::NAN)
//!     .failing(Fault::Modifiers(AttributeKind::Armor));
//! assert!(entity.health().unwrap().is_nan());
//! assert!(entity.modifiers(AttributeKind::Armor).is_err());
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use echo_sentinel::{
    AttributeKind, AttributeReading, Entity, EntityId, HostFault, Modifier, Position,
    StatusEffect, VehicleState,
};

/// Accessor that can be made to misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// [`Entity::position`].
    Position,
    /// [`Entity::spawn_position`].
    Spawn,
    /// [`Entity::teleport`].
    Teleport,
    /// [`Entity::health`].
    Health,
    /// [`Entity::restore_vitals`].
    RestoreVitals,
    /// [`Entity::attribute`] for one attribute.
    Attribute(AttributeKind),
    /// [`Entity::modifiers`] for one attribute.
    Modifiers(AttributeKind),
    /// [`Entity::remove_modifier`] for one attribute.
    RemoveModifier(AttributeKind),
    /// [`Entity::effects`].
    Effects,
    /// [`Entity::add_effect`].
    AddEffect,
    /// [`Entity::clear_effects`].
    ClearEffects,
    /// [`Entity::has_inventory`].
    Inventory,
    /// [`Entity::vehicle`].
    Vehicle,
}

/// How an injected fault behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    /// Return `Err(HostFault)`.
    Error,
    /// Panic inside the accessor.
    Panic,
}

/// One attribute's state.
#[derive(Debug, Clone, PartialEq)]
pub struct FakeAttribute {
    /// Base value.
    pub base: f64,
    /// Defined default base.
    pub default: f64,
    /// Attached modifiers.
    pub modifiers: Vec<Modifier>,
    /// Forced effective value; `None` means base plus modifiers.
    pub value_override: Option<f64>,
}

impl FakeAttribute {
    fn new(default: f64) -> Self {
        Self {
            base: default,
            default,
            modifiers: Vec::new(),
            value_override: None,
        }
    }

    /// Effective value.
    pub fn value(&self) -> f64 {
        self.value_override
            .unwrap_or_else(|| self.base + self.modifiers.iter().map(|m| m.amount).sum::<f64>())
    }
}

fn player_attributes() -> BTreeMap<AttributeKind, FakeAttribute> {
    [
        (AttributeKind::MaxHealth, 20.0),
        (AttributeKind::MovementSpeed, 0.1),
        (AttributeKind::AttackDamage, 1.0),
        (AttributeKind::AttackSpeed, 4.0),
        (AttributeKind::Armor, 0.0),
        (AttributeKind::ArmorToughness, 0.0),
        (AttributeKind::KnockbackResistance, 0.0),
        (AttributeKind::Luck, 0.0),
    ]
    .into_iter()
    .map(|(kind, default)| (kind, FakeAttribute::new(default)))
    .collect()
}

/// In-memory [`Entity`].
#[derive(Debug, Clone)]
pub struct FakeEntity {
    id: EntityId,
    name: String,
    position: Position,
    spawn: Position,
    dead: bool,
    health: f64,
    food: i32,
    fire_ticks: i32,
    fall_distance: f32,
    attributes: BTreeMap<AttributeKind, FakeAttribute>,
    effects: Vec<StatusEffect>,
    inventory: bool,
    vehicle: VehicleState,
    capabilities: HashSet<String>,
    faults: HashMap<Fault, FaultMode>,
    messages: Vec<String>,
    teleports: Vec<Position>,
    mutations: usize,
}

impl FakeEntity {
    /// Healthy entity standing at `world (0, 64, 0)`.
    pub fn new(id: EntityId, name: &str) -> Self {
        Self {
            id,
            name: name.to_owned(),
            position: Position::new("world", 0.0, 64.0, 0.0),
            spawn: Position::new("world", 0.5, 70.0, 0.5),
            dead: false,
            health: 20.0,
            food: 20,
            fire_ticks: 0,
            fall_distance: 0.0,
            attributes: player_attributes(),
            effects: Vec::new(),
            inventory: true,
            vehicle: VehicleState::NotRiding,
            capabilities: HashSet::new(),
            faults: HashMap::new(),
            messages: Vec::new(),
            teleports: Vec::new(),
            mutations: 0,
        }
    }

    /// Places the entity.
    pub fn at(mut self, x: f64, y: f64, z: f64) -> Self {
        self.position = Position::new(self.position.world.clone(), x, y, z);
        self
    }

    /// Sets the spawn position used as fallback relocation target.
    pub fn spawn_at(mut self, x: f64, y: f64, z: f64) -> Self {
        self.spawn = Position::new(self.spawn.world.clone(), x, y, z);
        self
    }

    /// Sets health.
    pub fn with_health(mut self, health: f64) -> Self {
        self.health = health;
        self
    }

    /// Marks the entity dead.
    pub fn dead(mut self) -> Self {
        self.dead = true;
        self
    }

    /// Sets hunger, fire and fall-distance side state.
    pub fn with_side_state(mut self, food: i32, fire_ticks: i32, fall_distance: f32) -> Self {
        self.food = food;
        self.fire_ticks = fire_ticks;
        self.fall_distance = fall_distance;
        self
    }

    /// Forces an attribute's effective value.
    pub fn with_attribute_value(mut self, kind: AttributeKind, value: f64) -> Self {
        self.attribute_mut(kind).value_override = Some(value);
        self
    }

    /// Sets an attribute's base value.
    pub fn with_base(mut self, kind: AttributeKind, base: f64) -> Self {
        self.attribute_mut(kind).base = base;
        self
    }

    /// Sets an attribute's defined default.
    pub fn with_default(mut self, kind: AttributeKind, default: f64) -> Self {
        self.attribute_mut(kind).default = default;
        self
    }

    /// Attaches a modifier.
    pub fn with_modifier(mut self, kind: AttributeKind, key: &str, amount: f64) -> Self {
        self.attribute_mut(kind).modifiers.push(Modifier {
            key: key.to_owned(),
            amount,
        });
        self
    }

    /// Removes an attribute entirely, so the host reports it unsupported.
    pub fn without_attribute(mut self, kind: AttributeKind) -> Self {
        self.attributes.remove(&kind);
        self
    }

    /// Adds an active effect.
    pub fn with_effect(mut self, kind: &str, duration: i32, amplifier: i32) -> Self {
        self.effects.push(StatusEffect {
            kind: kind.to_owned(),
            duration,
            amplifier,
            ambient: false,
            particles: true,
        });
        self
    }

    /// Drops the inventory handle.
    pub fn without_inventory(mut self) -> Self {
        self.inventory = false;
        self
    }

    /// Sets the vehicle attachment.
    pub fn riding(mut self, vehicle: VehicleState) -> Self {
        self.vehicle = vehicle;
        self
    }

    /// Grants a capability.
    pub fn with_capability(mut self, capability: &str) -> Self {
        self.capabilities.insert(capability.to_owned());
        self
    }

    /// Makes `fault` return an error.
    pub fn failing(mut self, fault: Fault) -> Self {
        self.faults.insert(fault, FaultMode::Error);
        self
    }

    /// Makes `fault` panic.
    pub fn panicking(mut self, fault: Fault) -> Self {
        self.faults.insert(fault, FaultMode::Panic);
        self
    }

    /// Removes an injected fault.
    pub fn heal_fault(&mut self, fault: Fault) {
        self.faults.remove(&fault);
    }

    /// Current position (bypasses fault injection).
    pub fn current_position(&self) -> &Position {
        &self.position
    }

    /// Current health (bypasses fault injection).
    pub fn current_health(&self) -> f64 {
        self.health
    }

    /// Hunger, fire ticks and fall distance.
    pub fn side_state(&self) -> (i32, i32, f32) {
        (self.food, self.fire_ticks, self.fall_distance)
    }

    /// One attribute's state.
    pub fn attribute_state(&self, kind: AttributeKind) -> Option<&FakeAttribute> {
        self.attributes.get(&kind)
    }

    /// Active effects (bypasses fault injection).
    pub fn active_effects(&self) -> &[StatusEffect] {
        &self.effects
    }

    /// Messages delivered so far.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Drains delivered messages.
    pub fn take_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }

    /// Every teleport target, in order.
    pub fn teleports(&self) -> &[Position] {
        &self.teleports
    }

    /// Count of successful state mutations (teleports, vitals, attributes,
    /// effects). Messages are not counted.
    pub fn mutations(&self) -> usize {
        self.mutations
    }

    fn attribute_mut(&mut self, kind: AttributeKind) -> &mut FakeAttribute {
        self.attributes
            .entry(kind)
            .or_insert_with(|| FakeAttribute::new(0.0))
    }

    #[allow(clippy::panic)]
    fn probe(&self, fault: Fault) -> Result<(), HostFault> {
        match self.faults.get(&fault) {
            None => Ok(()),
            Some(FaultMode::Error) => Err(HostFault::new(format!("{fault:?} unavailable"))),
            Some(FaultMode::Panic) => panic!("{fault:?} accessor crashed"),
        }
    }
}

impl Entity for FakeEntity {
    fn id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> Result<Position, HostFault> {
        self.probe(Fault::Position)?;
        Ok(self.position.clone())
    }

    fn spawn_position(&self) -> Result<Position, HostFault> {
        self.probe(Fault::Spawn)?;
        Ok(self.spawn.clone())
    }

    fn teleport(&mut self, to: &Position) -> Result<(), HostFault> {
        self.probe(Fault::Teleport)?;
        self.position = to.clone();
        self.teleports.push(to.clone());
        self.mutations += 1;
        Ok(())
    }

    fn is_dead(&self) -> bool {
        self.dead
    }

    fn health(&self) -> Result<f64, HostFault> {
        self.probe(Fault::Health)?;
        Ok(self.health)
    }

    fn restore_vitals(&mut self) -> Result<(), HostFault> {
        self.probe(Fault::RestoreVitals)?;
        self.health = 20.0;
        self.food = 20;
        self.fire_ticks = 0;
        self.fall_distance = 0.0;
        self.mutations += 1;
        Ok(())
    }

    fn attribute(&self, kind: AttributeKind) -> Result<Option<AttributeReading>, HostFault> {
        self.probe(Fault::Attribute(kind))?;
        Ok(self.attributes.get(&kind).map(|a| AttributeReading {
            value: a.value(),
            base: a.base,
            default: a.default,
        }))
    }

    fn modifiers(&self, kind: AttributeKind) -> Result<Vec<Modifier>, HostFault> {
        self.probe(Fault::Modifiers(kind))?;
        Ok(self
            .attributes
            .get(&kind)
            .map(|a| a.modifiers.clone())
            .unwrap_or_default())
    }

    fn remove_modifier(&mut self, kind: AttributeKind, modifier: &Modifier) -> Result<(), HostFault> {
        self.probe(Fault::RemoveModifier(kind))?;
        if let Some(attr) = self.attributes.get_mut(&kind) {
            attr.modifiers.retain(|m| m != modifier);
            attr.value_override = None;
            self.mutations += 1;
        }
        Ok(())
    }

    fn set_base_value(&mut self, kind: AttributeKind, value: f64) -> Result<(), HostFault> {
        if let Some(attr) = self.attributes.get_mut(&kind) {
            attr.base = value;
            attr.value_override = None;
            self.mutations += 1;
        }
        Ok(())
    }

    fn effects(&self) -> Result<Vec<StatusEffect>, HostFault> {
        self.probe(Fault::Effects)?;
        Ok(self.effects.clone())
    }

    fn add_effect(&mut self, effect: StatusEffect) -> Result<(), HostFault> {
        self.probe(Fault::AddEffect)?;
        self.effects.push(effect);
        self.mutations += 1;
        Ok(())
    }

    fn clear_effects(&mut self) -> Result<(), HostFault> {
        self.probe(Fault::ClearEffects)?;
        self.effects.clear();
        self.mutations += 1;
        Ok(())
    }

    fn has_inventory(&self) -> Result<bool, HostFault> {
        self.probe(Fault::Inventory)?;
        Ok(self.inventory)
    }

    fn vehicle(&self) -> Result<VehicleState, HostFault> {
        self.probe(Fault::Vehicle)?;
        Ok(self.vehicle.clone())
    }

    fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    fn send_message(&mut self, text: &str) {
        self.messages.push(text.to_owned());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entity_is_healthy() {
        let e = FakeEntity::new(EntityId(1), "a");
        assert!(e.position().unwrap().is_finite());
        assert_eq!(e.health().unwrap(), 20.0);
        assert!(e.has_inventory().unwrap());
        assert_eq!(e.vehicle().unwrap(), VehicleState::NotRiding);
        assert!(e.attribute(AttributeKind::FlyingSpeed).unwrap().is_none());
        assert_eq!(e.mutations(), 0);
    }

    #[test]
    fn modifiers_feed_effective_value() {
        let e = FakeEntity::new(EntityId(1), "a").with_modifier(
            AttributeKind::MovementSpeed,
            "sprint",
            0.03,
        );
        let r = e.attribute(AttributeKind::MovementSpeed).unwrap().unwrap();
        assert!((r.value - 0.13).abs() < 1e-9);
        assert!((r.base - 0.1).abs() < 1e-9);
    }

    #[test]
    fn injected_error_and_panic() {
        let e = FakeEntity::new(EntityId(1), "a")
            .failing(Fault::Inventory)
            .panicking(Fault::Vehicle);
        assert!(e.has_inventory().is_err());
        let caught = std::panic::catch_unwind(|| e.vehicle());
        assert!(caught.is_err());
    }

    #[test]
    fn restore_vitals_resets_side_state() {
        let mut e = FakeEntity::new(EntityId(1), "a")
            .with_health(3.0)
            .with_side_state(2, 80, 12.5);
        e.restore_vitals().unwrap();
        assert_eq!(e.current_health(), 20.0);
        assert_eq!(e.side_state(), (20, 0, 0.0));
    }
}

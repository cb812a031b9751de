// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Host ports: how the sentinel sees and touches entities it does not own.
//!
//! Every accessor that reaches into host state returns `Result<_, HostFault>`.
//! A fault is not a bug in the sentinel; it is the host telling us that some
//! piece of entity state could not be read or written, which for a live,
//! possibly-corrupt entity is itself diagnostic evidence.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identity of a connected entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// World/region-qualified coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// World or region identifier.
    pub world: String,
    /// East/west coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
    /// North/south coordinate.
    pub z: f64,
}

impl Position {
    /// Convenience constructor.
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// True when all three coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {}, {})", self.world, self.x, self.y, self.z)
    }
}

/// Attributes the sentinel knows how to inspect and reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttributeKind {
    /// Maximum health pool.
    MaxHealth,
    /// Ground movement speed.
    MovementSpeed,
    /// Melee attack damage.
    AttackDamage,
    /// Melee attack speed.
    AttackSpeed,
    /// Armor points.
    Armor,
    /// Armor toughness.
    ArmorToughness,
    /// Knockback resistance.
    KnockbackResistance,
    /// Loot luck.
    Luck,
    /// Flying speed.
    FlyingSpeed,
    /// Mob follow range.
    FollowRange,
}

impl AttributeKind {
    /// Every known attribute, in inspection order.
    pub const ALL: [Self; 10] = [
        Self::MaxHealth,
        Self::MovementSpeed,
        Self::AttackDamage,
        Self::AttackSpeed,
        Self::Armor,
        Self::ArmorToughness,
        Self::KnockbackResistance,
        Self::Luck,
        Self::FlyingSpeed,
        Self::FollowRange,
    ];

    /// Snake-case name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::MaxHealth => "max_health",
            Self::MovementSpeed => "movement_speed",
            Self::AttackDamage => "attack_damage",
            Self::AttackSpeed => "attack_speed",
            Self::Armor => "armor",
            Self::ArmorToughness => "armor_toughness",
            Self::KnockbackResistance => "knockback_resistance",
            Self::Luck => "luck",
            Self::FlyingSpeed => "flying_speed",
            Self::FollowRange => "follow_range",
        }
    }
}

/// Point-in-time read of one attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeReading {
    /// Effective value (base plus modifiers).
    pub value: f64,
    /// Base value before modifiers.
    pub base: f64,
    /// The attribute's defined default base value.
    pub default: f64,
}

/// One dynamic modifier attached to an attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    /// Host-assigned modifier key.
    pub key: String,
    /// Magnitude contributed to the attribute.
    pub amount: f64,
}

/// Timed status effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    /// Effect type name.
    pub kind: String,
    /// Remaining duration in ticks.
    pub duration: i32,
    /// Amplifier level (0 = level I).
    pub amplifier: i32,
    /// Ambient effects are rendered less prominently.
    pub ambient: bool,
    /// Whether particles are shown.
    pub particles: bool,
}

impl StatusEffect {
    /// The short, strong damage-resistance buff granted before a gated action runs.
    pub fn protective_resistance() -> Self {
        Self {
            kind: "resistance".into(),
            duration: 60,
            amplifier: 255,
            ambient: true,
            particles: false,
        }
    }
}

/// Vehicle attachment as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VehicleState {
    /// Not riding anything.
    NotRiding,
    /// Riding a vehicle that the host can resolve.
    Riding {
        /// Vehicle type name.
        kind: String,
        /// Whether the vehicle is still a live, valid entity.
        valid: bool,
    },
    /// Flagged as riding, but the vehicle reference is gone.
    Missing,
}

/// A host accessor could not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("host fault: {0}")]
pub struct HostFault(pub String);

impl HostFault {
    /// Builds a fault from any displayable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Capability interface over one live entity.
///
/// The sentinel never stores an `Entity`; it borrows one for the duration of
/// a diagnosis or repair, always on the host's authoritative thread.
pub trait Entity {
    /// Stable identity.
    fn id(&self) -> EntityId;
    /// Display name used in logs.
    fn name(&self) -> &str;

    /// Current position.
    fn position(&self) -> Result<Position, HostFault>;
    /// The position used when no safe position is cached.
    fn spawn_position(&self) -> Result<Position, HostFault>;
    /// Moves the entity.
    fn teleport(&mut self, to: &Position) -> Result<(), HostFault>;

    /// True when the host already considers the entity dead.
    fn is_dead(&self) -> bool;
    /// Current health.
    fn health(&self) -> Result<f64, HostFault>;
    /// Resets health to full and clears hunger, fire and fall-distance state.
    fn restore_vitals(&mut self) -> Result<(), HostFault>;

    /// Reads an attribute. `Ok(None)` means the host does not support it.
    fn attribute(&self, kind: AttributeKind) -> Result<Option<AttributeReading>, HostFault>;
    /// Enumerates the attribute's modifiers.
    fn modifiers(&self, kind: AttributeKind) -> Result<Vec<Modifier>, HostFault>;
    /// Removes one modifier.
    fn remove_modifier(&mut self, kind: AttributeKind, modifier: &Modifier)
        -> Result<(), HostFault>;
    /// Overwrites the attribute's base value.
    fn set_base_value(&mut self, kind: AttributeKind, value: f64) -> Result<(), HostFault>;

    /// Active timed effects.
    fn effects(&self) -> Result<Vec<StatusEffect>, HostFault>;
    /// Applies an effect.
    fn add_effect(&mut self, effect: StatusEffect) -> Result<(), HostFault>;
    /// Removes every active effect.
    fn clear_effects(&mut self) -> Result<(), HostFault>;

    /// Whether the inventory handle is present. `Ok(false)` means missing.
    fn has_inventory(&self) -> Result<bool, HostFault>;
    /// Vehicle attachment.
    fn vehicle(&self) -> Result<VehicleState, HostFault>;

    /// Whether the entity holds a named capability (permission).
    fn has_capability(&self, capability: &str) -> bool;
    /// Delivers a user-facing message.
    fn send_message(&mut self, text: &str);
}

/// The simulation host: owner of the live population and the action path.
pub trait Host {
    /// Concrete entity type.
    type Entity: Entity;

    /// Snapshot of the currently connected entities, in the host's traversal order.
    fn online(&self) -> Vec<EntityId>;
    /// Borrows a connected entity. `None` once it has disconnected.
    fn entity(&mut self, id: EntityId) -> Option<&mut Self::Entity>;
    /// Runs an action through the host's normal execution path.
    fn execute_action(&mut self, id: EntityId, action: &str) -> Result<(), HostFault>;
    /// Forcibly disconnects an entity.
    fn disconnect(&mut self, id: EntityId, reason: &str);
}

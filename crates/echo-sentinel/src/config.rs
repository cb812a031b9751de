// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Typed sentinel configuration.
//!
//! Field names serialize in kebab-case so the YAML document reads
//! `command-protection.delay-ticks`, `repair.thresholds.y-min`, and so on.
//! Every section has defaults; a partial document deserializes cleanly.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::messages::Messages;

/// Current configuration document version.
pub const CONFIG_VERSION: u64 = 1;
/// Store key the configuration document lives under.
pub const CONFIG_KEY: &str = "config";
/// Name of the version field inside the document.
pub const VERSION_FIELD: &str = "config-version";

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SentinelConfig {
    /// Document version (see [`CONFIG_VERSION`]).
    pub config_version: u64,
    /// Global kill switch for scanning and gating.
    pub enabled: bool,
    /// Emit debug-level sentinel logs.
    pub debug_mode: bool,
    /// Capability required to run admin commands.
    pub admin_capability: String,
    /// Periodic scanning.
    pub monitoring: MonitoringConfig,
    /// Action gating.
    pub command_protection: CommandProtectionConfig,
    /// Repair policy and thresholds.
    pub repair: RepairConfig,
    /// User-facing message catalog.
    pub messages: Messages,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            enabled: true,
            debug_mode: false,
            admin_capability: "sentinel.admin".into(),
            monitoring: MonitoringConfig::default(),
            command_protection: CommandProtectionConfig::default(),
            repair: RepairConfig::default(),
            messages: Messages::default(),
        }
    }
}

/// Periodic scan settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MonitoringConfig {
    /// When false, scan invocations do nothing (the timer keeps running).
    pub enabled: bool,
    /// Ticks between scan invocations.
    pub check_interval: u64,
    /// Per-check toggles. Health is always checked.
    pub checks: CheckToggles,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: 100,
            checks: CheckToggles::default(),
        }
    }
}

/// Which optional diagnosis checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CheckToggles {
    /// Coordinate validity and bounds.
    pub location: bool,
    /// Attribute and modifier integrity.
    pub attributes: bool,
    /// Timed effect sanity.
    pub effects: bool,
    /// Inventory handle presence.
    pub inventory: bool,
    /// Vehicle attachment cross-check.
    pub vehicle: bool,
}

impl Default for CheckToggles {
    fn default() -> Self {
        Self {
            location: true,
            attributes: true,
            effects: true,
            inventory: true,
            vehicle: true,
        }
    }
}

impl CheckToggles {
    /// Names of the checks that will run, health first.
    pub fn active(&self) -> Vec<&'static str> {
        let mut names = vec!["health"];
        for (on, name) in [
            (self.location, "location"),
            (self.attributes, "attributes"),
            (self.effects, "effects"),
            (self.inventory, "inventory"),
            (self.vehicle, "vehicle"),
        ] {
            if on {
                names.push(name);
            }
        }
        names
    }
}

/// Action gating settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CommandProtectionConfig {
    /// Whether the gate intercepts anything.
    pub enabled: bool,
    /// Protected action names (normalized on use).
    pub protected_commands: Vec<String>,
    /// Minimum milliseconds between gated evaluations per entity.
    pub cooldown: u64,
    /// Ticks between an allow decision and the deferred execution.
    pub delay_ticks: u64,
    /// Capability that skips the gate entirely.
    pub bypass_capability: String,
}

impl Default for CommandProtectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            protected_commands: ["/tp", "/spawn", "/home", "/warp", "/back", "/rtp"]
                .into_iter()
                .map(String::from)
                .collect(),
            cooldown: 1000,
            delay_ticks: 2,
            bypass_capability: "sentinel.bypass.protection".into(),
        }
    }
}

impl CommandProtectionConfig {
    /// Cooldown as a [`Duration`].
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown)
    }

    /// The protected set in canonical form (see [`normalize_action`]).
    pub fn normalized(&self) -> BTreeSet<String> {
        self.protected_commands
            .iter()
            .map(|c| normalize_action(c))
            .filter(|c| c.len() > 1)
            .collect()
    }
}

/// Canonical action name: trimmed, lowercase, exactly one leading `/`.
pub fn normalize_action(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_prefix('/') {
        Some(_) => lower,
        None => format!("/{lower}"),
    }
}

/// Repair policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RepairConfig {
    /// Let scans mutate entities. When false, scans only log.
    pub auto_repair: bool,
    /// Allow relocation at all.
    pub safe_teleport: bool,
    /// Relocate only for severe diagnoses.
    pub teleport_on_severe_only: bool,
    /// Prefer the cached last-safe position over spawn.
    pub prefer_last_safe_location: bool,
    /// Deny gated actions when the diagnosis is severe.
    pub block_command_on_severe: bool,
    /// Disconnect entities whose repair failed.
    pub kick_if_unrepairable: bool,
    /// Numeric bounds.
    pub thresholds: Thresholds,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            auto_repair: true,
            safe_teleport: true,
            teleport_on_severe_only: true,
            prefer_last_safe_location: true,
            block_command_on_severe: true,
            kick_if_unrepairable: true,
            thresholds: Thresholds::default(),
        }
    }
}

/// Numeric validity bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Thresholds {
    /// Lowest valid Y.
    pub y_min: f64,
    /// Highest valid Y.
    pub y_max: f64,
    /// Largest valid |X| and |Z|.
    pub coordinate_max: f64,
    /// Lowest valid health (also the max-health attribute floor).
    pub health_min: f64,
    /// Highest valid health (also the max-health attribute ceiling).
    pub health_max: f64,
    /// Movement speed floor.
    pub speed_min: f64,
    /// Movement speed ceiling.
    pub speed_max: f64,
    /// Attack damage floor.
    pub damage_min: f64,
    /// Attack damage ceiling.
    pub damage_max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            y_min: -64.0,
            y_max: 320.0,
            coordinate_max: 30_000_000.0,
            health_min: 0.5,
            health_max: 1024.0,
            speed_min: 0.0,
            speed_max: 1.0,
            damage_min: 0.0,
            damage_max: 2048.0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_marker_and_lowercases() {
        assert_eq!(normalize_action("TP"), "/tp");
        assert_eq!(normalize_action("/Home"), "/home");
        assert_eq!(normalize_action("  warp "), "/warp");
    }

    #[test]
    fn normalized_set_drops_blank_entries() {
        let cfg = CommandProtectionConfig {
            protected_commands: vec!["Spawn".into(), "/spawn".into(), "  ".into()],
            ..CommandProtectionConfig::default()
        };
        let set: Vec<_> = cfg.normalized().into_iter().collect();
        assert_eq!(set, vec!["/spawn".to_owned()]);
    }

    #[test]
    fn active_checks_always_lead_with_health() {
        let toggles = CheckToggles {
            attributes: false,
            vehicle: false,
            ..CheckToggles::default()
        };
        assert_eq!(
            toggles.active(),
            vec!["health", "location", "effects", "inventory"]
        );
    }
}

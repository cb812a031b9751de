// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Administrative commands: reload, status, full check, gate toggle and
//! single-entity repair.

use echo_app_core::config::{ConfigError, ConfigService, ConfigStore, Migrated};
use serde::Serialize;
use thiserror::Error;

use crate::config::{SentinelConfig, Thresholds, CONFIG_KEY, CONFIG_VERSION, VERSION_FIELD};
use crate::host::{Entity, EntityId, Host};
use crate::messages::Messages;
use crate::sentinel::{CheckOutcome, Sentinel};

/// A parsed admin command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Migrate, re-read and apply the configuration.
    Reload,
    /// Report live status.
    Status,
    /// Check every connected entity now.
    Check,
    /// Flip action gating and persist the change.
    Safety,
    /// Check one entity; `None` targets the issuer.
    Repair(Option<String>),
    /// Usage listing.
    Help,
}

impl AdminCommand {
    /// Sub-command names, in help order.
    pub const NAMES: [&'static str; 5] = ["reload", "status", "check", "safety", "repair"];

    /// Parses an argument line. Empty or unknown input yields [`Self::Help`].
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Self::Help;
        };
        match head.to_lowercase().as_str() {
            "reload" => Self::Reload,
            "status" => Self::Status,
            "check" => Self::Check,
            "safety" => Self::Safety,
            "repair" => Self::Repair(words.next().map(str::to_owned)),
            _ => Self::Help,
        }
    }

    /// Sub-commands starting with `prefix` (case-insensitive).
    pub fn complete(prefix: &str) -> Vec<&'static str> {
        let prefix = prefix.to_lowercase();
        Self::NAMES
            .into_iter()
            .filter(|name| name.starts_with(&prefix))
            .collect()
    }
}

/// Who issued a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Issuer {
    /// Operator console; always authorized.
    Console,
    /// A connected entity; needs the admin capability.
    Entity(EntityId),
}

/// Admin command failures.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Issuer lacks the admin capability.
    #[error("permission denied")]
    NoPermission,
    /// The command needs an entity issuer or target.
    #[error("only an entity can run this without a target")]
    OnlyEntity,
    /// Target is not connected or not a valid id.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
    /// The sentinel is globally disabled.
    #[error("monitor is not enabled")]
    MonitorNotEnabled,
    /// Configuration could not be loaded or saved.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AdminError {
    /// Message catalog key shown to the issuer.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::NoPermission => "no-permission",
            Self::OnlyEntity => "only-player",
            Self::UnknownEntity(_) => "unknown-entity",
            Self::MonitorNotEnabled => "monitor-not-enabled",
            Self::Config(_) => "command-error",
        }
    }
}

/// Gate section of [`StatusReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GateStatus {
    /// Configured on.
    pub enabled: bool,
    /// Actually gating (configured on and globally enabled).
    pub running: bool,
    /// Cooldown window in milliseconds.
    pub cooldown_ms: u64,
    /// Ticks between allow and execution.
    pub delay_ticks: u64,
    /// Canonical protected names.
    pub protected: Vec<String>,
    /// Entities currently inside a deferred execution.
    pub executing: usize,
}

/// Repair policy section of [`StatusReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RepairPolicy {
    /// Scans may mutate.
    pub auto_repair: bool,
    /// Relocation allowed.
    pub safe_teleport: bool,
    /// Relocate on severe diagnoses only.
    pub teleport_on_severe_only: bool,
    /// Prefer the cached position.
    pub prefer_last_safe_location: bool,
    /// Severe diagnoses block gated actions.
    pub block_command_on_severe: bool,
    /// Disconnect on failed repair.
    pub kick_if_unrepairable: bool,
}

/// Monitor section of [`StatusReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MonitorStatus {
    /// Configured on.
    pub enabled: bool,
    /// Scan timer armed.
    pub running: bool,
    /// Ticks between scans.
    pub check_interval: u64,
    /// Active checks.
    pub checks: Vec<&'static str>,
    /// Numeric bounds.
    pub thresholds: Thresholds,
    /// Repair switches.
    pub repair: RepairPolicy,
    /// Entities with a cached safe position.
    pub cached_positions: usize,
}

/// Structured live status.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StatusReport {
    /// Crate version.
    pub version: &'static str,
    /// Configuration document version.
    pub config_version: u64,
    /// Global switch.
    pub enabled: bool,
    /// Debug logging.
    pub debug: bool,
    /// Current tick.
    pub tick: u64,
    /// Action gate.
    pub gate: GateStatus,
    /// Scanner.
    pub monitor: MonitorStatus,
}

impl StatusReport {
    /// Snapshot of `sentinel`.
    pub fn of(sentinel: &Sentinel) -> Self {
        let cfg = sentinel.config();
        let gate = sentinel.gate();
        let repair = &cfg.repair;
        Self {
            version: env!("CARGO_PKG_VERSION"),
            config_version: cfg.config_version,
            enabled: cfg.enabled,
            debug: cfg.debug_mode,
            tick: sentinel.current_tick(),
            gate: GateStatus {
                enabled: cfg.command_protection.enabled,
                running: sentinel.gate_running(),
                cooldown_ms: cfg.command_protection.cooldown,
                delay_ticks: gate.delay_ticks(),
                protected: gate.protected().iter().cloned().collect(),
                executing: gate.guard().len(),
            },
            monitor: MonitorStatus {
                enabled: cfg.monitoring.enabled,
                running: sentinel.is_monitoring(),
                check_interval: cfg.monitoring.check_interval,
                checks: cfg.monitoring.checks.active(),
                thresholds: repair.thresholds,
                repair: RepairPolicy {
                    auto_repair: repair.auto_repair,
                    safe_teleport: repair.safe_teleport,
                    teleport_on_severe_only: repair.teleport_on_severe_only,
                    prefer_last_safe_location: repair.prefer_last_safe_location,
                    block_command_on_severe: repair.block_command_on_severe,
                    kick_if_unrepairable: repair.kick_if_unrepairable,
                },
                cached_positions: sentinel.cache().len(),
            },
        }
    }

    /// Human-readable rendering.
    pub fn lines(&self) -> Vec<String> {
        let on = |b: bool| if b { "on" } else { "off" };
        let state = |enabled: bool, running: bool| match (enabled, running) {
            (false, _) => "stopped (disabled in config)",
            (true, true) => "running",
            (true, false) => "not running",
        };
        let mut out = vec![
            format!("=== sentinel {} ===", self.version),
            format!("enabled: {} | debug: {}", on(self.enabled), on(self.debug)),
            format!("action gate: {}", state(self.gate.enabled, self.gate.running)),
        ];
        if self.gate.running {
            out.push(format!("  cooldown: {}ms", self.gate.cooldown_ms));
            out.push(format!("  delay: {} ticks", self.gate.delay_ticks));
            out.push(format!(
                "  protected ({}): {}",
                self.gate.protected.len(),
                self.gate.protected.join(", ")
            ));
        }
        let m = &self.monitor;
        out.push(format!("monitor: {}", state(m.enabled, m.running)));
        if m.running {
            let t = &m.thresholds;
            let r = &m.repair;
            out.push(format!("  interval: {} ticks", m.check_interval));
            out.push(format!("  checks: {}", m.checks.join(", ")));
            out.push(format!("  y: [{}, {}]", t.y_min, t.y_max));
            out.push(format!("  health: [{}, {}]", t.health_min, t.health_max));
            out.push(format!("  speed: [{}, {}]", t.speed_min, t.speed_max));
            out.push(format!("  damage: [{}, {}]", t.damage_min, t.damage_max));
            out.push(format!(
                "  repair: auto={} teleport={} severe-only={} prefer-safe={} block-severe={} kick={}",
                on(r.auto_repair),
                on(r.safe_teleport),
                on(r.teleport_on_severe_only),
                on(r.prefer_last_safe_location),
                on(r.block_command_on_severe),
                on(r.kick_if_unrepairable),
            ));
        }
        out
    }
}

/// Successful admin command result.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminReply {
    /// Usage listing.
    Help,
    /// Configuration reloaded; status after the reload.
    Reloaded(Box<StatusReport>),
    /// Live status.
    Status(Box<StatusReport>),
    /// Full check finished.
    Checked {
        /// Entities diagnosed.
        checked: usize,
        /// Entities repaired.
        repaired: usize,
    },
    /// Gate toggled.
    Safety {
        /// New state.
        enabled: bool,
    },
    /// Single-entity check finished.
    Repaired(EntityId, CheckOutcome),
}

impl AdminReply {
    /// Lines shown to the issuer.
    pub fn lines(&self, messages: &Messages) -> Vec<String> {
        match self {
            Self::Help => AdminCommand::NAMES
                .iter()
                .map(|name| format!("sentinel {name}"))
                .collect(),
            Self::Reloaded(status) => {
                let mut out = vec![messages.prefixed("reload-success")];
                out.extend(status.lines());
                out
            }
            Self::Status(status) => status.lines(),
            Self::Checked { checked, repaired } => vec![
                messages.prefixed("manual-check-start"),
                messages.prefixed("manual-check-finish"),
                format!("checked {checked}, repaired {repaired}"),
            ],
            Self::Safety { enabled } => vec![format!(
                "{}{}",
                messages.prefix,
                messages.fill("safety-toggle", "{state}", if *enabled { "on" } else { "off" })
            )],
            Self::Repaired(id, outcome) => vec![format!(
                "{id}: {}",
                if outcome.diagnosis.has_issues() {
                    "issues found"
                } else {
                    "clean"
                }
            )],
        }
    }
}

/// Admin command executor bound to a configuration store.
pub struct Admin<S> {
    config: ConfigService<S>,
}

impl<S: ConfigStore> Admin<S> {
    /// Executor persisting through `store`.
    pub fn new(store: S) -> Self {
        Self {
            config: ConfigService::new(store),
        }
    }

    /// The config service.
    pub fn config_service(&self) -> &ConfigService<S> {
        &self.config
    }

    /// Loads the configuration, creating or upgrading the stored document.
    pub fn load_config(&self) -> Result<Migrated<SentinelConfig>, ConfigError> {
        self.config.load_or_migrate(
            CONFIG_KEY,
            &SentinelConfig::default(),
            VERSION_FIELD,
            CONFIG_VERSION,
        )
    }

    /// Runs `command` on behalf of `issuer`.
    pub fn execute<H: Host>(
        &self,
        sentinel: &mut Sentinel,
        host: &mut H,
        issuer: Issuer,
        command: AdminCommand,
    ) -> Result<AdminReply, AdminError> {
        if let Issuer::Entity(id) = issuer {
            let capability = sentinel.config().admin_capability.clone();
            let allowed = host
                .entity(id)
                .is_some_and(|entity| entity.has_capability(&capability));
            if !allowed {
                return Err(AdminError::NoPermission);
            }
        }

        match command {
            AdminCommand::Help => Ok(AdminReply::Help),
            AdminCommand::Reload => {
                let loaded = self.load_config()?;
                sentinel.apply_config(loaded.value);
                sentinel.start_if_configured();
                sentinel
                    .reporter()
                    .info(&format!("configuration reloaded: from_version={}", loaded.from_version));
                Ok(AdminReply::Reloaded(Box::new(StatusReport::of(sentinel))))
            }
            AdminCommand::Status => Ok(AdminReply::Status(Box::new(StatusReport::of(sentinel)))),
            AdminCommand::Check => {
                if !sentinel.config().enabled {
                    return Err(AdminError::MonitorNotEnabled);
                }
                let results = sentinel.check_all(host);
                Ok(AdminReply::Checked {
                    checked: results.len(),
                    repaired: results.iter().filter(|(_, o)| o.repair.is_some()).count(),
                })
            }
            AdminCommand::Safety => {
                let enabled = !sentinel.config().command_protection.enabled;
                sentinel.set_gate_enabled(enabled);
                self.config.save(CONFIG_KEY, sentinel.config())?;
                sentinel
                    .reporter()
                    .info(&format!("action protection toggled: enabled={enabled}"));
                Ok(AdminReply::Safety { enabled })
            }
            AdminCommand::Repair(target) => {
                if !sentinel.config().enabled {
                    return Err(AdminError::MonitorNotEnabled);
                }
                let id = match (target, issuer) {
                    (Some(raw), _) => parse_entity(&raw).ok_or(AdminError::UnknownEntity(raw))?,
                    (None, Issuer::Entity(id)) => id,
                    (None, Issuer::Console) => return Err(AdminError::OnlyEntity),
                };
                let outcome = sentinel
                    .check_entity(host, id, true)
                    .ok_or_else(|| AdminError::UnknownEntity(id.to_string()))?;
                Ok(AdminReply::Repaired(id, outcome))
            }
        }
    }
}

/// Accepts `12` or `#12`.
fn parse_entity(raw: &str) -> Option<EntityId> {
    raw.trim_start_matches('#').parse().ok().map(EntityId)
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Echo Sentinel
//!
//! A self-healing monitor for live entity state in a running simulation
//! host. It samples the connected population a few entities at a time,
//! diagnoses out-of-range or corrupt state, repairs what it finds, and puts
//! a diagnose-then-allow gate in front of risky actions.
//!
//! The host drives everything: it implements [`Host`] and [`Entity`], calls
//! [`Sentinel::tick`] once per simulation tick, forwards join/leave events,
//! and asks [`Sentinel::on_action`] what to do with each intercepted action.

pub mod admin;
pub mod cache;
pub mod config;
pub mod diagnosis;
pub mod gate;
pub mod host;
pub mod messages;
pub mod repair;
pub mod report;
pub mod scan;
pub mod sentinel;

pub use admin::{Admin, AdminCommand, AdminError, AdminReply, Issuer, StatusReport};
pub use cache::{SafePosition, SafeStateCache};
pub use config::{normalize_action, SentinelConfig};
pub use diagnosis::{diagnose, Diagnosis, IssueType};
pub use gate::{
    action_name, ActionGate, DeferredAction, DeferredState, ExecutionToken, GuardSet, PassReason,
    Screening,
};
pub use host::{
    AttributeKind, AttributeReading, Entity, EntityId, Host, HostFault, Modifier, Position,
    StatusEffect, VehicleState,
};
pub use messages::Messages;
pub use repair::{repair, RepairContext, RepairOutcome};
pub use report::Reporter;
pub use scan::{ScanCursor, SCAN_BATCH, SCAN_INITIAL_DELAY};
pub use sentinel::{
    ActionVerdict, CheckOutcome, Sentinel, SentinelTask, SuppressReason, TickReport,
};

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for Echo crates.
//!
//! # Modules
//!
//! - [`audit`] - Audit sink that keeps every record in memory
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`entity`] - Scriptable entity with per-accessor fault injection
//! - [`host`] - Host fake that records executed actions and disconnects

pub mod audit;
pub mod config;
pub mod entity;
pub mod host;

pub use audit::RecordingAudit;
pub use config::InMemoryConfigStore;
pub use entity::{Fault, FaultMode, FakeAttribute, FakeEntity};
pub use host::{ExecuteMode, FakeHost};

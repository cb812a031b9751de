// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared application services for Echo tools.
//! Keeps runtime adapters thin and storage-agnostic.

pub mod config;

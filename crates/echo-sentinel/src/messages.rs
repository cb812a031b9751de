// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! User-facing message catalog.
//!
//! The catalog lives under `messages` in the configuration document. Plain
//! keys sit at the top level of that section; issue labels and advice are
//! nested maps keyed by [`IssueType::key`]. A partial document is merged
//! over the built-in defaults when deserialized, so any key it leaves out
//! keeps its default text.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::diagnosis::IssueType;

/// Message catalog with English defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "CatalogOverrides")]
pub struct Messages {
    /// Prepended by [`Messages::prefixed`].
    pub prefix: String,
    /// Short label per issue category.
    pub issue_labels: BTreeMap<String, String>,
    /// Remediation hint per issue category.
    pub issue_advice: BTreeMap<String, String>,
    /// Every other message, by key.
    #[serde(flatten)]
    pub text: BTreeMap<String, String>,
}

const DEFAULT_TEXT: &[(&str, &str)] = &[
    ("diagnose-header", "Abnormal state detected and corrected."),
    ("diagnose-items", "Detected: {items}"),
    ("diagnose-action-teleport", "You were moved to a safe location."),
    ("diagnose-action-place", "Your state was repaired in place."),
    ("diagnose-continue", "Your action will continue."),
    ("diagnose-action-blocked", "Your action was blocked for safety."),
    ("diagnose-advice", "Advice: {advice}"),
    ("diagnose-manual-ok", "No problems found."),
    ("command-blocked", "That action was blocked by the safety check."),
    ("command-processing", "Safety check passed, running your action..."),
    ("command-error", "Your action failed to run safely."),
    ("kick-message", "Disconnected: your state could not be repaired."),
    ("no-permission", "You do not have permission to do that."),
    ("only-player", "Only an entity can do that."),
    ("reload-success", "Configuration reloaded."),
    ("manual-check-start", "Checking every connected entity..."),
    ("manual-check-finish", "Check complete."),
    ("monitor-not-enabled", "The monitor is not running."),
    ("safety-toggle", "Action protection is now {state}."),
    ("unknown-entity", "No such entity is connected."),
];

const DEFAULT_LABELS: &[(IssueType, &str)] = &[
    (IssueType::Location, "invalid location"),
    (IssueType::Health, "abnormal health"),
    (IssueType::Attributes, "corrupt attributes"),
    (IssueType::Effects, "broken effects"),
    (IssueType::Inventory, "missing inventory"),
    (IssueType::General, "general fault"),
];

const DEFAULT_ADVICE: &[(IssueType, &str)] = &[
    (IssueType::Location, "avoid the area you were just in"),
    (IssueType::Health, "avoid the last source of damage or healing"),
    (IssueType::Attributes, "remove recently equipped gear"),
    (IssueType::Effects, "avoid the last consumable you used"),
    (IssueType::Inventory, "reconnect if items look wrong"),
    (IssueType::General, "reconnect and report this if it repeats"),
];

fn issue_map(entries: &[(IssueType, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(issue, text)| (issue.key().to_owned(), (*text).to_owned()))
        .collect()
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            prefix: "[Sentinel] ".into(),
            issue_labels: issue_map(DEFAULT_LABELS),
            issue_advice: issue_map(DEFAULT_ADVICE),
            text: DEFAULT_TEXT
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        }
    }
}

/// Whatever a stored catalog sets; merged over [`Messages::default`].
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct CatalogOverrides {
    prefix: Option<String>,
    issue_labels: BTreeMap<String, String>,
    issue_advice: BTreeMap<String, String>,
    #[serde(flatten)]
    text: BTreeMap<String, String>,
}

impl From<CatalogOverrides> for Messages {
    fn from(overrides: CatalogOverrides) -> Self {
        let mut messages = Self::default();
        if let Some(prefix) = overrides.prefix {
            messages.prefix = prefix;
        }
        messages.issue_labels.extend(overrides.issue_labels);
        messages.issue_advice.extend(overrides.issue_advice);
        messages.text.extend(overrides.text);
        messages
    }
}

impl Messages {
    /// Message text for `key`, or a visible placeholder when it is missing.
    pub fn text(&self, key: &str) -> String {
        self.text
            .get(key)
            .cloned()
            .unwrap_or_else(|| format!("Message not found: {key}"))
    }

    /// [`text`](Self::text) with the catalog prefix.
    pub fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.prefix, self.text(key))
    }

    /// [`text`](Self::text) with one placeholder substituted.
    pub fn fill(&self, key: &str, placeholder: &str, value: &str) -> String {
        self.text(key).replace(placeholder, value)
    }

    /// Label for an issue category. Missing labels fall back to the key.
    pub fn label(&self, issue: IssueType) -> String {
        self.issue_labels
            .get(issue.key())
            .cloned()
            .unwrap_or_else(|| issue.key().to_owned())
    }

    /// Advice for an issue category; empty when none is configured.
    pub fn advice(&self, issue: IssueType) -> &str {
        self.issue_advice
            .get(issue.key())
            .map_or("", String::as_str)
    }
}

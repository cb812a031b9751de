// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config service and storage port for Echo tools.
//!
//! Documents are YAML. [`ConfigService::load_or_migrate`] upgrades stored
//! documents in place: keys that exist in the defaults but not in the stored
//! document are filled in (recursively), keys the user set are never touched,
//! and the version key is raised to the current version. The upgraded
//! document is written back only when something changed.

use serde::{de::DeserializeOwned, Serialize};
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::info;

/// Storage port for raw config blobs (keyed by logical name).
pub trait ConfigStore {
    /// Load a raw config blob. Returns `NotFound` when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persist a raw config blob.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Error type for config operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not present in store.
    #[error("not found")]
    NotFound,
    /// I/O error while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// YAML encode/decode failure.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// Catch-all error variant.
    #[error("other: {0}")]
    Other(String),
}

/// Outcome of [`ConfigService::load_or_migrate`].
#[derive(Debug, Clone)]
pub struct Migrated<T> {
    /// The effective (possibly upgraded) value.
    pub value: T,
    /// Version recorded in the stored document before migration (0 if absent).
    pub from_version: u64,
    /// Whether the stored document was created or rewritten.
    pub written: bool,
}

/// Thin service that encodes config values and delegates storage to a `ConfigStore`.
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Create a new service using the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Borrow the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consume the service and return the inner store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> ConfigService<S>
where
    S: ConfigStore,
{
    /// Load and decode a config value for `key`. Returns `Ok(None)` if missing.
    pub fn load<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: DeserializeOwned,
    {
        match self.load_value(key)? {
            Some(value) => Ok(Some(serde_yaml::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Encode and persist a config value for `key`.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), ConfigError>
    where
        T: Serialize,
    {
        let data = serde_yaml::to_string(value)?;
        self.store.save_raw(key, data.as_bytes())
    }

    /// Load `key`, filling gaps from `defaults` and stamping `version_key`
    /// with `current_version`. A missing document is created from `defaults`.
    pub fn load_or_migrate<T>(
        &self,
        key: &str,
        defaults: &T,
        version_key: &str,
        current_version: u64,
    ) -> Result<Migrated<T>, ConfigError>
    where
        T: Serialize + DeserializeOwned,
    {
        let default_doc = serde_yaml::to_value(defaults)?;
        let Some(mut doc) = self.load_value(key)? else {
            let mut fresh = default_doc;
            set_version(&mut fresh, version_key, current_version);
            self.store
                .save_raw(key, serde_yaml::to_string(&fresh)?.as_bytes())?;
            info!(key, version = current_version, "created default config");
            return Ok(Migrated {
                value: serde_yaml::from_value(fresh)?,
                from_version: 0,
                written: true,
            });
        };

        let from_version = doc
            .get(version_key)
            .and_then(Value::as_u64)
            .unwrap_or_default();
        let latest = default_doc
            .get(version_key)
            .and_then(Value::as_u64)
            .unwrap_or(current_version)
            .max(current_version);

        let mut changed = merge_missing(&mut doc, &default_doc);
        if from_version < latest {
            set_version(&mut doc, version_key, latest);
            changed = true;
        }
        if changed {
            self.store
                .save_raw(key, serde_yaml::to_string(&doc)?.as_bytes())?;
            info!(key, from_version, to_version = latest, "config upgraded");
        }
        Ok(Migrated {
            value: serde_yaml::from_value(doc)?,
            from_version,
            written: changed,
        })
    }

    fn load_value(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        match self.store.load_raw(key) {
            Ok(bytes) => {
                if bytes.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                match serde_yaml::from_slice::<Value>(&bytes)? {
                    Value::Null => Ok(None),
                    value => Ok(Some(value)),
                }
            }
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Copies every key present in `defaults` but absent from `target`, descending
/// into nested mappings. Returns whether anything was added.
pub fn merge_missing(target: &mut Value, defaults: &Value) -> bool {
    let (Value::Mapping(target), Value::Mapping(defaults)) = (target, defaults) else {
        return false;
    };
    let mut changed = false;
    for (key, default) in defaults {
        match target.get_mut(key) {
            Some(existing) => changed |= merge_missing(existing, default),
            None => {
                target.insert(key.clone(), default.clone());
                changed = true;
            }
        }
    }
    changed
}

fn set_version(doc: &mut Value, version_key: &str, version: u64) {
    if !doc.is_mapping() {
        *doc = Value::Mapping(Mapping::new());
    }
    if let Value::Mapping(map) = doc {
        map.insert(Value::from(version_key), Value::from(version));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapStore(RefCell<HashMap<String, Vec<u8>>>);

    impl ConfigStore for MapStore {
        fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
            self.0.borrow().get(key).cloned().ok_or(ConfigError::NotFound)
        }
        fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
            self.0.borrow_mut().insert(key.to_owned(), data.to_vec());
            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    struct Doc {
        config_version: u64,
        enabled: bool,
        nested: Nested,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    struct Nested {
        check_interval: u64,
        label: String,
    }

    fn defaults() -> Doc {
        Doc {
            config_version: 2,
            enabled: true,
            nested: Nested {
                check_interval: 100,
                label: "default".into(),
            },
        }
    }

    #[test]
    fn missing_document_is_created_from_defaults() {
        let svc = ConfigService::new(MapStore::default());
        let out = svc
            .load_or_migrate("config", &defaults(), "config-version", 2)
            .unwrap();
        assert!(out.written);
        assert_eq!(out.from_version, 0);
        assert_eq!(out.value, defaults());
        assert_eq!(svc.load::<Doc>("config").unwrap(), Some(defaults()));
    }

    #[test]
    fn missing_nested_keys_are_filled_and_user_values_kept() {
        let svc = ConfigService::new(MapStore::default());
        svc.store()
            .save_raw(
                "config",
                b"config-version: 1\nenabled: false\nnested:\n  label: mine\n",
            )
            .unwrap();

        let out = svc
            .load_or_migrate("config", &defaults(), "config-version", 2)
            .unwrap();
        assert!(out.written);
        assert_eq!(out.from_version, 1);
        assert_eq!(out.value.config_version, 2);
        assert!(!out.value.enabled);
        assert_eq!(out.value.nested.label, "mine");
        assert_eq!(out.value.nested.check_interval, 100);
    }

    #[test]
    fn up_to_date_document_is_not_rewritten() {
        let svc = ConfigService::new(MapStore::default());
        svc.save("config", &defaults()).unwrap();
        let out = svc
            .load_or_migrate("config", &defaults(), "config-version", 2)
            .unwrap();
        assert!(!out.written);
        assert_eq!(out.from_version, 2);
    }

    #[test]
    fn blank_document_counts_as_missing() {
        let svc = ConfigService::new(MapStore::default());
        svc.store().save_raw("config", b"  \n").unwrap();
        assert_eq!(svc.load::<Doc>("config").unwrap(), None);
    }

    #[test]
    fn malformed_yaml_is_reported() {
        let svc = ConfigService::new(MapStore::default());
        svc.store().save_raw("config", b"enabled: [unclosed").unwrap();
        assert!(matches!(
            svc.load_or_migrate("config", &defaults(), "config-version", 2),
            Err(ConfigError::Yaml(_))
        ));
    }
}

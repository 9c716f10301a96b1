//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use pickledb::{PickleDb, PickleDbDumpPolicy, SerializationMethod};
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::Error;

static GLOBAL: OnceLock<Arc<FactsCache>> = OnceLock::new();

/// Process-wide store of cached facts.
///
/// Entries are grouped by zone (usually a hostname) and identified by a key
/// within the zone (usually the name of the cached lookup). Each zone is
/// backed by its own `pickledb` store, dumped to `<dir>/<zone>.json` when the
/// cache is persistent.
///
/// Every operation takes the store lock only for its own duration. Two
/// threads missing on the same entry at once will both compute and write it.
pub struct FactsCache {
    enabled: bool,
    location: Option<PathBuf>,
    zones: Mutex<HashMap<String, PickleDb>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub enabled: bool,
    pub persistent: bool,
    pub dir: String,
}

// ===== impl FactsCache =====

impl FactsCache {
    /// Creates a fact cache from the given configuration.
    pub fn new(config: &Config) -> FactsCache {
        FactsCache {
            enabled: config.enabled,
            location: config.persistent.then(|| PathBuf::from(&config.dir)),
            zones: Default::default(),
        }
    }

    /// Creates a fact cache that lives only as long as the process.
    pub fn in_memory() -> FactsCache {
        FactsCache {
            enabled: true,
            location: None,
            zones: Default::default(),
        }
    }

    /// Installs the process-wide fact cache.
    ///
    /// Returns `false` if a global cache was already installed, either by a
    /// previous call or by a call to [`FactsCache::global`].
    pub fn init_global(config: &Config) -> bool {
        GLOBAL.set(Arc::new(FactsCache::new(config))).is_ok()
    }

    /// Returns the process-wide fact cache, creating one with the default
    /// configuration if none was installed.
    pub fn global() -> Arc<FactsCache> {
        GLOBAL
            .get_or_init(|| Arc::new(FactsCache::new(&Config::default())))
            .clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the directory where zones are dumped, if persistent.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Reads a cached entry.
    ///
    /// Returns `None` when the entry doesn't exist or can't be decoded as
    /// `V`. A stored `null` read as `Option<_>` yields `Some(None)`.
    pub fn read<V>(&self, zone: &str, key: &str) -> Option<V>
    where
        V: DeserializeOwned,
    {
        match self.with_zone(zone, |db| db.get::<V>(key)) {
            Ok(Some(value)) => {
                debug!(%zone, %key, "read cached facts");
                Some(value)
            }
            Ok(None) => {
                debug!(%zone, %key, "no cached facts");
                None
            }
            Err(error) => {
                error.log();
                None
            }
        }
    }

    /// Writes (or replaces) a cached entry.
    pub fn write<V>(&self, zone: &str, key: &str, value: &V) -> Result<(), Error>
    where
        V: Serialize,
    {
        self.with_zone(zone, |db| db.set(key, value))?
            .map_err(|error| Error::StoreError(zone.to_owned(), error))?;
        debug!(%zone, %key, "cached facts");
        Ok(())
    }

    /// Removes cached entries.
    ///
    /// With both a zone and a key, removes that single entry. With only a
    /// zone, removes the whole zone. Without a zone, removes everything.
    pub fn cleanup(
        &self,
        zone: Option<&str>,
        key: Option<&str>,
    ) -> Result<(), Error> {
        match (zone, key) {
            (Some(zone), Some(key)) => {
                info!(%zone, %key, "removing cached facts");
                self.with_zone(zone, |db| db.rem(key))?
                    .map_err(|error| Error::StoreError(zone.to_owned(), error))?;
            }
            (Some(zone), None) => {
                info!(%zone, "removing cached zone");
                self.zones.lock().unwrap().remove(zone);
                if let Some(location) = &self.location {
                    let path = zone_path(location, zone);
                    if path.exists() {
                        std::fs::remove_file(&path)
                            .map_err(|error| Error::CacheDirError(path, error))?;
                    }
                }
            }
            (None, _) => {
                info!("removing all cached facts");
                self.zones.lock().unwrap().clear();
                if let Some(location) = &self.location
                    && location.exists()
                {
                    std::fs::remove_dir_all(location).map_err(|error| {
                        Error::CacheDirError(location.clone(), error)
                    })?;
                }
            }
        }

        Ok(())
    }

    // Runs the provided closure with the store of the given zone, loading or
    // creating it first if needed.
    fn with_zone<F, R>(&self, zone: &str, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut PickleDb) -> R,
    {
        let mut zones = self.zones.lock().unwrap();
        let db = match zones.entry(zone.to_owned()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.open_zone(zone)?),
        };
        Ok(f(db))
    }

    // Loads the store of a zone from disk, or initializes a new one if it
    // doesn't exist or can't be loaded.
    fn open_zone(&self, zone: &str) -> Result<PickleDb, Error> {
        let Some(location) = &self.location else {
            return Ok(PickleDb::new(
                zone_file_name(zone),
                PickleDbDumpPolicy::NeverDump,
                SerializationMethod::Json,
            ));
        };

        std::fs::create_dir_all(location)
            .map_err(|error| Error::CacheDirError(location.clone(), error))?;

        let path = zone_path(location, zone);
        if path.exists() {
            match PickleDb::load(
                &path,
                PickleDbDumpPolicy::AutoDump,
                SerializationMethod::Json,
            ) {
                Ok(db) => return Ok(db),
                Err(error) => {
                    warn!(
                        path = %path.display(), %error,
                        "failed to load cache file, starting over"
                    );
                }
            }
        }
        Ok(PickleDb::new(
            path,
            PickleDbDumpPolicy::AutoDump,
            SerializationMethod::Json,
        ))
    }
}

impl std::fmt::Debug for FactsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactsCache")
            .field("enabled", &self.enabled)
            .field("location", &self.location)
            .finish()
    }
}

// ===== impl Config =====

impl Default for Config {
    fn default() -> Config {
        Config {
            enabled: true,
            persistent: true,
            dir: "./_cache".to_owned(),
        }
    }
}

// ===== helper functions =====

// Percent-escapes path separators and the escape character itself, so
// distinct zones never share a file and the file stays inside the cache
// directory.
fn zone_file_name(zone: &str) -> String {
    let mut name = String::with_capacity(zone.len() + 5);
    for c in zone.chars() {
        match c {
            '%' | '/' | '\\' | '\0' => name.push_str(&format!("%{:02X}", c as u32)),
            _ => name.push(c),
        }
    }
    name.push_str(".json");
    name
}

fn zone_path(location: &Path, zone: &str) -> PathBuf {
    location.join(zone_file_name(zone))
}

// ===== unit tests =====

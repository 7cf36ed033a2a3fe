//! Reference cache: a local snapshot of destination lookup data.
//!
//! The snapshot maps every [`EntityKind`] to `{key -> destination id}` records,
//! where keys are normalized names and e-mails. It is built from the
//! destination API once, written to disk, and reused by later runs until the
//! file is deleted or an explicit rebuild is requested. Staleness is never
//! detected automatically.
//!
//! During a run the resolver may [`insert`](ReferenceSnapshot::insert) entities
//! it created; those additions live in memory only.

use crate::api::DestinationApi;
use crate::error::{FerryError, Result};
use crate::model::{EntityKind, ReferenceEntity};
use crate::util::normalize_key;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Snapshot file format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// One `{matchKey -> destinationId}` association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub key: String,
    pub id: String,
}

/// Destination lookup data for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSnapshot {
    pub version: u32,
    pub built_at: DateTime<Utc>,
    pub entries: BTreeMap<EntityKind, Vec<ReferenceRecord>>,
    #[serde(skip)]
    index: HashMap<(EntityKind, String), String>,
}

impl Default for ReferenceSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            built_at: Utc::now(),
            entries: BTreeMap::new(),
            index: HashMap::new(),
        }
    }
}

impl PartialEq for ReferenceSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.entries == other.entries
    }
}

impl ReferenceSnapshot {
    /// Build a snapshot from listed entities, keyed by name and e-mail.
    #[must_use]
    pub fn from_entities(listed: &[(EntityKind, Vec<ReferenceEntity>)]) -> Self {
        let mut snapshot = Self::default();
        for (kind, entities) in listed {
            snapshot.entries.entry(*kind).or_default();
            for entity in entities {
                snapshot.add_entity(*kind, entity);
            }
        }
        snapshot
    }

    /// Load a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a valid snapshot,
    /// or was written by an unsupported version.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut snapshot: Self = serde_json::from_str(&contents).map_err(|e| {
            FerryError::config(format!(
                "Reference snapshot {} is unreadable ({e}). Delete it or run `tferry cache build`.",
                path.display()
            ))
        })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(FerryError::config(format!(
                "Reference snapshot {} has version {}, expected {SNAPSHOT_VERSION}. Run `tferry cache build`.",
                path.display(),
                snapshot.version
            )));
        }

        snapshot.rebuild_index();
        Ok(snapshot)
    }

    /// Persist the snapshot atomically (temp file -> rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path.parent().ok_or_else(|| {
            FerryError::config(format!("Invalid snapshot path: {}", path.display()))
        })?;
        fs::create_dir_all(parent)?;

        let temp_path = path.with_extension("json.tmp");
        let temp_file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(temp_file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| FerryError::Io(e.into_error()))?
            .sync_all()?;

        fs::rename(&temp_path, path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = fs::set_permissions(path, perms);
        }

        Ok(())
    }

    /// Look up a destination id by match key.
    #[must_use]
    pub fn lookup(&self, kind: EntityKind, key: &str) -> Option<&str> {
        let key = normalize_key(key);
        if key.is_empty() {
            return None;
        }
        self.index.get(&(kind, key)).map(String::as_str)
    }

    /// Add an association in memory. The first id recorded for a key wins.
    pub fn insert(&mut self, kind: EntityKind, key: &str, id: &str) {
        let key = normalize_key(key);
        if key.is_empty() {
            return;
        }
        if self.index.contains_key(&(kind, key.clone())) {
            return;
        }
        self.index.insert((kind, key.clone()), id.to_string());
        self.entries.entry(kind).or_default().push(ReferenceRecord {
            key,
            id: id.to_string(),
        });
    }

    /// Add every key of an entity (name and e-mail).
    pub fn add_entity(&mut self, kind: EntityKind, entity: &ReferenceEntity) {
        self.insert(kind, &entity.name, &entity.id);
        if let Some(email) = &entity.email {
            self.insert(kind, email, &entity.id);
        }
    }

    /// Record counts per kind.
    #[must_use]
    pub fn counts(&self) -> BTreeMap<EntityKind, usize> {
        EntityKind::ALL
            .iter()
            .map(|kind| (*kind, self.entries.get(kind).map_or(0, Vec::len)))
            .collect()
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (kind, records) in &self.entries {
            for record in records {
                self.index
                    .entry((*kind, normalize_key(&record.key)))
                    .or_insert_with(|| record.id.clone());
            }
        }
    }
}

/// Query every reference kind from the destination.
///
/// Nothing is persisted here; a failure on any kind aborts the whole build.
///
/// # Errors
///
/// Returns `CacheBuild` (or `Auth`) if any listing fails.
pub fn build_snapshot(destination: &dyn DestinationApi) -> Result<ReferenceSnapshot> {
    let mut listed = Vec::with_capacity(EntityKind::ALL.len());
    for kind in EntityKind::ALL {
        let entities = destination
            .list_reference_entities(kind)
            .map_err(|source| FerryError::cache_build(kind, source))?;
        debug!(%kind, count = entities.len(), "Fetched reference entities");
        listed.push((kind, entities));
    }
    Ok(ReferenceSnapshot::from_entities(&listed))
}

/// Return the persisted snapshot, building and saving it when absent.
///
/// With `force_rebuild` the existing file is ignored and overwritten.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be loaded, built or saved.
pub fn ensure_cache(
    path: &Path,
    destination: &dyn DestinationApi,
    force_rebuild: bool,
) -> Result<ReferenceSnapshot> {
    if !force_rebuild && path.exists() {
        let snapshot = ReferenceSnapshot::load(path)?;
        info!(path = %path.display(), built_at = %snapshot.built_at, "Loaded reference snapshot");
        return Ok(snapshot);
    }

    info!(path = %path.display(), "Building reference snapshot from destination");
    let snapshot = build_snapshot(destination)?;
    snapshot.save(path)?;
    info!(path = %path.display(), "Reference snapshot saved");
    Ok(snapshot)
}

/// Delete the snapshot so the next run rebuilds it. Returns whether a file was removed.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be removed.
pub fn clear_cache(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove reference snapshot");
            Err(FerryError::Io(e))
        }
    }
}

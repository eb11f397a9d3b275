//! In-memory [`ContentStore`] seeded with the bundled pack and optional JSON files.

use std::{fs, path::Path, sync::Arc};

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::dao::{
    content_store::{ContentStore, PackSummary},
    models::LocationPackEntity,
    storage::{ContentError, ContentResult},
};

const BUILTIN_CLASSIC: &str = include_str!("../../../content/classic.json");
/// File skipped when scanning a content directory.
const SCHEMA_FILE: &str = "schema.json";

/// Packs loaded once at startup and shared read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct MemoryContentStore {
    packs: IndexMap<String, Arc<LocationPackEntity>>,
}

impl MemoryContentStore {
    /// Store holding only the bundled "classic" pack.
    pub fn with_builtin() -> ContentResult<Self> {
        let mut store = Self::default();
        let pack = parse_pack(BUILTIN_CLASSIC, "classic", "builtin:classic")?;
        store.insert(pack)?;
        Ok(store)
    }

    /// Register a pack, replacing any pack with the same id. Locations without roles
    /// are dropped; a pack left with no location is rejected.
    pub fn insert(&mut self, mut pack: LocationPackEntity) -> ContentResult<()> {
        let before = pack.locations.len();
        pack.locations.retain(|location| !location.roles.is_empty());
        if pack.locations.len() < before {
            warn!(
                pack = %pack.id,
                dropped = before - pack.locations.len(),
                "ignoring locations without roles"
            );
        }
        if pack.locations.is_empty() {
            return Err(ContentError::Empty(pack.id));
        }
        info!(
            pack = %pack.id,
            locations = pack.locations.len(),
            "registered location pack"
        );
        self.packs.insert(pack.id.clone(), Arc::new(pack));
        Ok(())
    }

    /// Load every `*.json` pack in `dir`. Unreadable or invalid files are logged and
    /// skipped; only a failure to list the directory is an error. Returns how many packs
    /// were registered.
    pub fn load_dir(&mut self, dir: &Path) -> ContentResult<usize> {
        let entries = fs::read_dir(dir).map_err(|source| ContentError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut loaded = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if path.file_name().and_then(|name| name.to_str()) == Some(SCHEMA_FILE) {
                continue;
            }
            match load_file(&path).and_then(|pack| self.insert(pack)) {
                Ok(()) => loaded += 1,
                Err(err) => warn!(path = %path.display(), error = %err, "skipping location pack"),
            }
        }
        Ok(loaded)
    }
}

impl ContentStore for MemoryContentStore {
    fn find_pack(&self, id: &str) -> Option<Arc<LocationPackEntity>> {
        self.packs.get(id).cloned()
    }

    fn list_packs(&self) -> Vec<PackSummary> {
        self.packs
            .values()
            .map(|pack| PackSummary {
                id: pack.id.clone(),
                name: pack.name.clone(),
                location_count: pack.locations.len(),
            })
            .collect()
    }
}

fn load_file(path: &Path) -> ContentResult<LocationPackEntity> {
    let contents = fs::read_to_string(path).map_err(|source| ContentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    parse_pack(&contents, stem, &path.display().to_string())
}

fn parse_pack(contents: &str, default_id: &str, origin: &str) -> ContentResult<LocationPackEntity> {
    let mut pack: LocationPackEntity =
        serde_json::from_str(contents).map_err(|source| ContentError::Parse {
            origin: origin.to_owned(),
            source,
        })?;
    if pack.id.trim().is_empty() {
        pack.id = default_id.to_owned();
    }
    Ok(pack)
}

pub mod memory;

use std::sync::Arc;

use crate::dao::models::LocationPackEntity;

/// Brief listing entry for a registered pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSummary {
    /// Pack identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Number of locations in the pack.
    pub location_count: usize,
}

/// Read access to the location packs the game can be configured with.
pub trait ContentStore: Send + Sync {
    /// Look a pack up by id.
    fn find_pack(&self, id: &str) -> Option<Arc<LocationPackEntity>>;
    /// List every registered pack.
    fn list_packs(&self) -> Vec<PackSummary>;

    /// Whether a pack with this id is registered.
    fn has_pack(&self, id: &str) -> bool {
        self.find_pack(id).is_some()
    }
}

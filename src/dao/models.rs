use serde::{Deserialize, Serialize};

/// A themed set of locations the game draws from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocationPackEntity {
    /// Stable identifier; defaults to the file stem when loaded from disk.
    #[serde(default)]
    pub id: String,
    /// Human readable pack name.
    pub name: String,
    /// Optional blurb shown in the lobby.
    #[serde(default)]
    pub description: Option<String>,
    /// Locations in the pack.
    pub locations: Vec<LocationEntity>,
}

impl LocationPackEntity {
    /// Find a location by id or display name.
    pub fn location(&self, key: &str) -> Option<&LocationEntity> {
        self.locations
            .iter()
            .find(|location| location.id == key || location.name == key)
    }
}

/// A place where every non-impostor participant is during a round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocationEntity {
    /// Stable identifier inside the pack.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Short scene-setting line shown to the crew.
    #[serde(default)]
    pub flavor: Option<String>,
    /// Roles that can be dealt at this location.
    #[serde(default)]
    pub roles: Vec<RoleEntity>,
}

/// A role someone can hold at a location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleEntity {
    /// Role name.
    pub name: String,
    /// Acting hint for the holder.
    #[serde(default)]
    pub hint: String,
}

//! Secret role dealing and the per-participant briefing filter.
//!
//! [`briefing_for`] is the only place round secrets are turned into something that
//! can be serialised; everything else sees the impostor and location only through
//! the reveal, after voting has closed.

use indexmap::IndexMap;
use rand::{CryptoRng, seq::IndexedRandom};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    dao::models::{LocationEntity, LocationPackEntity, RoleEntity},
    dto::view::{CrewBriefing, ImpostorBriefing, RoleBriefing},
    error::GameError,
    state::game::{MIN_PLAYERS, RoundState},
};

/// Why roles could not be dealt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignError {
    /// Too few connected participants.
    #[error("need at least {MIN_PLAYERS} connected participants, have {0}")]
    NotEnoughParticipants(usize),
    /// The pack has no location.
    #[error("location pack {0} has no locations")]
    NoLocations(String),
    /// The drawn location has no role.
    #[error("location {0} has no roles")]
    NoRoles(String),
}

impl From<AssignError> for GameError {
    fn from(err: AssignError) -> Self {
        match err {
            AssignError::NotEnoughParticipants(_) => GameError::NotEnoughPlayers,
            AssignError::NoLocations(_) | AssignError::NoRoles(_) => {
                GameError::RoleAssignmentFailed
            }
        }
    }
}

/// Secrets dealt for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// The impostor.
    pub impostor: String,
    /// Location shared by everyone else.
    pub location: LocationEntity,
    /// Every location name in the pack, offered to the impostor.
    pub candidate_locations: Vec<String>,
    /// Role of each non-impostor.
    pub roles: IndexMap<String, RoleEntity>,
}

/// Pick a location, an impostor and a role for everyone else. Every draw is uniform
/// and comes from `rng`, which must be a cryptographically secure generator. Roles
/// repeat when participants outnumber the location's roles.
pub fn assign<R: CryptoRng + ?Sized>(
    participants: &[String],
    pack: &LocationPackEntity,
    rng: &mut R,
) -> Result<Assignment, AssignError> {
    if participants.len() < MIN_PLAYERS {
        return Err(AssignError::NotEnoughParticipants(participants.len()));
    }

    let location = pack
        .locations
        .choose(rng)
        .ok_or_else(|| AssignError::NoLocations(pack.id.clone()))?;
    if location.roles.is_empty() {
        return Err(AssignError::NoRoles(location.name.clone()));
    }

    let impostor = participants
        .choose(rng)
        .ok_or(AssignError::NotEnoughParticipants(0))?
        .clone();

    let mut roles = IndexMap::new();
    for name in participants.iter().filter(|name| **name != impostor) {
        let role = location
            .roles
            .choose(rng)
            .ok_or_else(|| AssignError::NoRoles(location.name.clone()))?;
        roles.insert(name.clone(), role.clone());
    }

    info!(
        pack = %pack.id,
        participants = participants.len(),
        roles = roles.len(),
        "roles dealt"
    );

    Ok(Assignment {
        impostor,
        location: location.clone(),
        candidate_locations: pack
            .locations
            .iter()
            .map(|location| location.name.clone())
            .collect(),
        roles,
    })
}

/// Private briefing for `name`, or `None` when they hold no seat in the round.
pub fn briefing_for(round: &RoundState, name: &str) -> Option<RoleBriefing> {
    if round.impostor == name {
        return Some(RoleBriefing::Impostor(ImpostorBriefing::new(
            round.candidate_locations.clone(),
        )));
    }

    let Some(role) = round.roles.get(name) else {
        debug!(participant = %name, "no role dealt this round");
        return None;
    };
    let other_roles = round
        .location
        .roles
        .iter()
        .filter(|candidate| candidate.name != role.name)
        .map(|candidate| candidate.name.clone())
        .collect();

    Some(RoleBriefing::Crew(CrewBriefing::new(
        round.location.name.clone(),
        round.location.flavor.clone(),
        role.name.clone(),
        role.hint.clone(),
        other_roles,
    )))
}

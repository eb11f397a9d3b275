//! Ballot collection and conviction over the round in progress.

use indexmap::IndexMap;

use crate::{
    error::GameError,
    state::game::{Ballot, Confidence, LocationGuess, Participant, RoundState},
};

/// Record `voter`'s accusation. The impostor loses the right to guess the location
/// once they vote.
pub fn cast_vote(
    round: &mut RoundState,
    roster: &IndexMap<String, Participant>,
    voter: &str,
    target: &str,
    confidence: i64,
) -> Result<(), GameError> {
    if round.ballots.contains_key(voter) {
        return Err(GameError::AlreadyVoted);
    }
    if voter == round.impostor && round.guess.is_some() {
        return Err(GameError::AlreadyActed);
    }
    if target == voter || !roster.contains_key(target) {
        return Err(GameError::InvalidTarget);
    }
    let confidence = Confidence::try_from(confidence)?;

    round.ballots.insert(
        voter.to_owned(),
        Ballot::Vote {
            target: target.to_owned(),
            confidence,
        },
    );
    Ok(())
}

/// Record the impostor's location guess. Returns whether it was right.
pub fn guess_location(
    round: &mut RoundState,
    guesser: &str,
    location: &str,
) -> Result<bool, GameError> {
    if guesser != round.impostor {
        return Err(GameError::NotImpostor);
    }
    if round.guess.is_some() || round.ballots.contains_key(guesser) {
        return Err(GameError::AlreadyActed);
    }
    let location = location.trim();
    let Some(named) = round
        .candidate_locations
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(location))
    else {
        return Err(GameError::InvalidLocation);
    };

    let correct = *named == round.location.name;
    round.guess = Some(LocationGuess {
        location: named.clone(),
        correct,
    });
    Ok(correct)
}

/// Whether every connected participant has a ballot in.
pub fn all_submitted(round: &RoundState, roster: &IndexMap<String, Participant>) -> bool {
    roster
        .values()
        .filter(|participant| participant.connected)
        .all(|participant| round.ballots.contains_key(&participant.name))
}

/// Number of connected participants with a ballot in, and how many are expected.
pub fn progress(round: &RoundState, roster: &IndexMap<String, Participant>) -> (usize, usize) {
    let connected = roster.values().filter(|participant| participant.connected);
    let (mut submitted, mut expected) = (0, 0);
    for participant in connected {
        expected += 1;
        if round.ballots.contains_key(&participant.name) {
            submitted += 1;
        }
    }
    (submitted, expected)
}

/// Give every connected participant without a ballot an explicit abstention.
pub fn record_abstentions(round: &mut RoundState, roster: &IndexMap<String, Participant>) {
    for participant in roster.values().filter(|participant| participant.connected) {
        round
            .ballots
            .entry(participant.name.clone())
            .or_insert(Ballot::Abstain);
    }
}

/// Count votes per accused participant, in first-vote order.
pub fn tally(ballots: &IndexMap<String, Ballot>) -> IndexMap<String, u32> {
    let mut counts = IndexMap::new();
    for ballot in ballots.values() {
        if let Ballot::Vote { target, .. } = ballot {
            *counts.entry(target.clone()).or_insert(0) += 1;
        }
    }
    counts
}

/// The participant holding the strictly highest count, or `None` on a tie or
/// without votes.
pub fn convict(tally: &IndexMap<String, u32>) -> Option<String> {
    let top = tally.values().copied().max()?;
    let mut leaders = tally.iter().filter(|(_, count)| **count == top);
    let (leader, _) = leaders.next()?;
    if leaders.next().is_some() {
        return None;
    }
    Some(leader.clone())
}

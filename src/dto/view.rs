//! Per-recipient snapshot of the session pushed after every change.
//!
//! A [`StateView`] is built fresh for each recipient. Everything in it is public
//! except [`StateView::role`], [`StateView::me`] and the ballot details in
//! [`VotingView`], which only ever describe the recipient.

use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::phase::{PauseReason, VisiblePhase};

/// Full snapshot sent as the payload of a `state` message.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StateView {
    /// Current phase.
    pub phase: VisiblePhase,
    /// State machine version; grows with every transition.
    pub version: usize,
    /// Pause details while paused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<PauseView>,
    /// Round counter.
    pub round: RoundProgress,
    /// Current settings.
    pub settings: SettingsView,
    /// Roster in join order.
    pub players: Vec<PlayerView>,
    /// Countdown of the running phase timer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer: Option<TimerView>,
    /// The recipient's own seat.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub me: Option<SelfView>,
    /// Lobby details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lobby: Option<LobbyView>,
    /// The recipient's private briefing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleBriefing>,
    /// Current questioning pair.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<TurnView>,
    /// Voting progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voting: Option<VotingView>,
    /// Round result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reveal: Option<RevealView>,
    /// Ranked scores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standings: Option<Vec<StandingView>>,
    /// End-of-game summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<GameSummaryView>,
}

/// Pause details.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PauseView {
    /// Phase restored on resume.
    pub resume_to: VisiblePhase,
    /// Why the game is paused.
    pub reason: PauseReason,
}

/// Round counter.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoundProgress {
    /// Round in progress or last played; 0 before the first.
    pub current: u32,
    /// Configured number of rounds.
    pub total: u32,
}

/// Host-editable settings.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    /// Questioning length in minutes.
    pub round_duration_minutes: u32,
    /// Rounds per game.
    pub num_rounds: u32,
    /// Selected location pack.
    pub location_pack: String,
}

/// Public roster entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    /// Display name.
    pub name: String,
    /// Whether this participant hosts.
    pub is_host: bool,
    /// Logical connectivity.
    pub connected: bool,
    /// Cumulative score.
    pub score: i32,
    /// Whether a ballot is in; only during voting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_voted: Option<bool>,
}

/// Countdown of the running phase timer.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    /// Timer name.
    pub name: String,
    /// Whole seconds left, rounded up.
    pub remaining_secs: u64,
    /// Full length in seconds.
    pub total_secs: u64,
    /// Whether the countdown is frozen by a pause.
    pub frozen: bool,
}

/// The recipient's own seat.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelfView {
    /// Display name.
    pub name: String,
    /// Whether the recipient hosts.
    pub is_host: bool,
    /// Cumulative score.
    pub score: i32,
}

/// Lobby details.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LobbyView {
    /// Connected participants needed to start.
    pub min_players: usize,
    /// Roster capacity.
    pub max_players: usize,
    /// Currently connected participants.
    pub connected_count: usize,
    /// Whether the host could start right now.
    pub can_start: bool,
    /// Packs the host can choose from.
    pub packs: Vec<PackView>,
}

/// Selectable location pack.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PackView {
    /// Pack id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Number of locations.
    pub location_count: usize,
}

/// Private briefing: exactly one of the two shapes, never a mix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(untagged)]
pub enum RoleBriefing {
    /// Briefing for the impostor.
    Impostor(ImpostorBriefing),
    /// Briefing for everyone else.
    Crew(CrewBriefing),
}

/// What the impostor is told.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImpostorBriefing {
    is_impostor: bool,
    /// Every location in the pack.
    pub candidate_locations: Vec<String>,
}

impl ImpostorBriefing {
    /// Briefing listing `candidate_locations`.
    pub fn new(candidate_locations: Vec<String>) -> Self {
        Self {
            is_impostor: true,
            candidate_locations,
        }
    }
}

/// What a non-impostor is told.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CrewBriefing {
    is_impostor: bool,
    /// Shared location.
    pub location: String,
    /// Scene-setting line for the location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
    /// The recipient's role.
    pub role: String,
    /// Acting hint for the role.
    pub hint: String,
    /// Other roles at the location, excluding the recipient's.
    pub other_roles: Vec<String>,
}

impl CrewBriefing {
    /// Briefing for a participant holding `role` at `location`.
    pub fn new(
        location: String,
        flavor: Option<String>,
        role: String,
        hint: String,
        other_roles: Vec<String>,
    ) -> Self {
        Self {
            is_impostor: false,
            location,
            flavor,
            role,
            hint,
            other_roles,
        }
    }
}

/// Current questioning pair.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TurnView {
    /// Participant asking.
    pub questioner: String,
    /// Participant answering.
    pub answerer: String,
}

/// Voting progress.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VotingView {
    /// Ballots received.
    pub submitted: usize,
    /// Connected participants expected to vote.
    pub expected: usize,
    /// Participant who called the vote, if it was called early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub called_by: Option<String>,
    /// The recipient's own ballot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_ballot: Option<BallotView>,
    /// Present for the impostor only: whether the location guess is still open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_guess_location: Option<bool>,
}

/// A ballot as shown back to its author or in the reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BallotView {
    /// Accused participant; absent for an abstention.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Wager; absent for an abstention.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
    /// Whether this is an abstention.
    pub abstained: bool,
}

/// A ballot in the reveal, with its author.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteView {
    /// Voter.
    pub voter: String,
    /// The ballot.
    #[serde(flatten)]
    pub ballot: BallotView,
}

/// Votes received by one participant.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TallyView {
    /// Accused participant.
    pub target: String,
    /// Number of votes.
    pub votes: u32,
}

/// The impostor's guess.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GuessView {
    /// Guessed location.
    pub location: String,
    /// Whether it was right.
    pub correct: bool,
}

/// One participant's points for the round.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreLineView {
    /// Participant.
    pub name: String,
    /// Points from the vote or guess.
    pub points: i32,
    /// Bonus on top.
    pub bonus: i32,
    /// Points plus bonus.
    pub total: i32,
    /// Classification of the points.
    pub reason: String,
}

/// Round result, public from the reveal onwards.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevealView {
    /// The impostor.
    pub impostor: String,
    /// The location.
    pub location: String,
    /// Convicted participant; absent on a tie or without votes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convicted: Option<String>,
    /// Whether the impostor was convicted.
    pub impostor_caught: bool,
    /// Every ballot.
    pub votes: Vec<VoteView>,
    /// Vote counts.
    pub tally: Vec<TallyView>,
    /// Location guess, when the round ended on one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guess: Option<GuessView>,
    /// Points awarded.
    pub scores: Vec<ScoreLineView>,
}

/// Ranked score entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StandingView {
    /// 1-based rank; tied scores share a rank.
    pub rank: usize,
    /// Participant.
    pub name: String,
    /// Cumulative score.
    pub score: i32,
}

/// Finished round in the summary.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoundRecordView {
    /// Round number.
    pub number: u32,
    /// Impostor of the round.
    pub impostor: String,
    /// Location.
    pub location: String,
    /// Convicted participant, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convicted: Option<String>,
    /// Whether the impostor was caught.
    pub impostor_caught: bool,
    /// Result of the impostor's guess, when they tried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_guessed: Option<bool>,
}

/// Aggregate numbers for the summary.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameStatsView {
    /// Rounds that reached the reveal.
    pub rounds_played: usize,
    /// Rounds where the impostor was convicted.
    pub impostors_caught: usize,
    /// Rounds the impostor won by naming the location.
    pub locations_guessed: usize,
}

/// End-of-game summary.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameSummaryView {
    /// Participants sharing the top score.
    pub winners: Vec<String>,
    /// Whether more than one participant shares the top score.
    pub is_tie: bool,
    /// Round history.
    pub rounds: Vec<RoundRecordView>,
    /// Aggregate numbers.
    pub stats: GameStatsView,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impostor_briefing_has_only_its_own_fields() {
        let briefing = RoleBriefing::Impostor(ImpostorBriefing::new(vec![
            "Beach".into(),
            "Bank".into(),
        ]));
        let json = serde_json::to_value(&briefing).unwrap();
        let object = json.as_object().unwrap();
        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["candidateLocations", "isImpostor"]);
        assert_eq!(object["isImpostor"], true);
    }

    #[test]
    fn crew_briefing_has_only_its_own_fields() {
        let briefing = RoleBriefing::Crew(CrewBriefing::new(
            "Beach".into(),
            None,
            "Surfer".into(),
            "Waves.".into(),
            vec!["Lifeguard".into()],
        ));
        let json = serde_json::to_value(&briefing).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object["isImpostor"], false);
        assert!(!object.contains_key("candidateLocations"));
        assert!(!object.contains_key("flavor"));
        assert_eq!(object["otherRoles"][0], "Lifeguard");
    }

    #[test]
    fn abstentions_flatten_into_vote_entries() {
        let vote = VoteView {
            voter: "Ann".into(),
            ballot: BallotView {
                target: None,
                confidence: None,
                abstained: true,
            },
        };
        let json = serde_json::to_value(&vote).unwrap();
        assert_eq!(json, serde_json::json!({"voter": "Ann", "abstained": true}));
    }
}

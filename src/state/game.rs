use std::{
    collections::{HashMap, HashSet},
    ops::RangeInclusive,
    time::Duration,
};

use indexmap::IndexMap;
use rand::{CryptoRng, seq::SliceRandom};
use tokio::time::Instant;

use crate::{
    dao::models::{LocationEntity, RoleEntity},
    error::GameError,
};

/// Connected participants needed to deal a round.
pub const MIN_PLAYERS: usize = 4;
/// Roster capacity.
pub const MAX_PLAYERS: usize = 10;
/// Accepted round lengths, in minutes.
pub const ROUND_DURATION_RANGE: RangeInclusive<u32> = 1..=30;
/// Accepted number of rounds per game.
pub const ROUNDS_RANGE: RangeInclusive<u32> = 1..=20;
/// Pack a fresh session plays with.
pub const DEFAULT_LOCATION_PACK: &str = "classic";
/// Random bytes behind a session token.
const TOKEN_BYTES: usize = 32;

/// Host-editable game settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSettings {
    /// Length of the questioning phase.
    pub round_duration_minutes: u32,
    /// Rounds played before the final results.
    pub num_rounds: u32,
    /// Location pack the rounds are dealt from.
    pub location_pack: String,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            round_duration_minutes: 7,
            num_rounds: 5,
            location_pack: DEFAULT_LOCATION_PACK.to_owned(),
        }
    }
}

impl GameSettings {
    /// Questioning phase length.
    pub fn round_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.round_duration_minutes) * 60)
    }
}

/// How strongly a participant backs their vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Confidence {
    /// Wager of 1.
    Low,
    /// Wager of 2.
    Medium,
    /// Wager of 3.
    AllIn,
}

impl Confidence {
    /// Numeric level, 1 to 3.
    pub fn level(self) -> u8 {
        match self {
            Confidence::Low => 1,
            Confidence::Medium => 2,
            Confidence::AllIn => 3,
        }
    }
}

impl TryFrom<i64> for Confidence {
    type Error = GameError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Confidence::Low),
            2 => Ok(Confidence::Medium),
            3 => Ok(Confidence::AllIn),
            _ => Err(GameError::InvalidConfidence),
        }
    }
}

/// Someone holding a seat in the session.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Unique display name.
    pub name: String,
    /// Current reconnection token.
    pub token: String,
    /// Whether this participant runs the game.
    pub is_host: bool,
    /// Logical connectivity; stays true through the disconnect grace period.
    pub connected: bool,
    /// When the participant was marked disconnected.
    pub disconnected_at: Option<Instant>,
    /// Last heartbeat or (re)connection.
    pub last_heartbeat: Instant,
    /// Cumulative score; may go negative.
    pub score: i32,
}

impl Participant {
    /// Time since the participant was marked disconnected.
    pub fn disconnected_for(&self, now: Instant) -> Option<Duration> {
        self.disconnected_at
            .map(|since| now.saturating_duration_since(since))
    }

    fn mark_connected(&mut self, now: Instant) {
        self.connected = true;
        self.disconnected_at = None;
        self.last_heartbeat = now;
    }
}

/// A submitted ballot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ballot {
    /// Accusation with a wager.
    Vote {
        /// Accused participant.
        target: String,
        /// Wager.
        confidence: Confidence,
    },
    /// No vote was cast before the window closed.
    Abstain,
}

/// The impostor's location guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationGuess {
    /// Name of the guessed location.
    pub location: String,
    /// Whether it matches the round's location.
    pub correct: bool,
}

/// Questioning order for a round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOrder {
    order: Vec<String>,
    index: usize,
}

/// Who asks and who answers right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Turn<'a> {
    /// Participant asking.
    pub questioner: &'a str,
    /// Participant answering.
    pub answerer: &'a str,
}

impl TurnOrder {
    /// Shuffle `names` into a questioning order.
    pub fn shuffled<R: CryptoRng + ?Sized>(mut names: Vec<String>, rng: &mut R) -> Self {
        names.shuffle(rng);
        Self {
            order: names,
            index: 0,
        }
    }

    /// Current pair; needs at least two participants.
    pub fn current(&self) -> Option<Turn<'_>> {
        if self.order.len() < 2 {
            return None;
        }
        let questioner = &self.order[self.index % self.order.len()];
        let answerer = &self.order[(self.index + 1) % self.order.len()];
        Some(Turn {
            questioner,
            answerer,
        })
    }

    /// Pass the question on: the answerer asks next.
    pub fn advance(&mut self) {
        if !self.order.is_empty() {
            self.index = (self.index + 1) % self.order.len();
        }
    }

    /// Participants in order.
    pub fn order(&self) -> &[String] {
        &self.order
    }
}

/// Everything dealt and submitted for the round in progress.
#[derive(Debug, Clone)]
pub struct RoundState {
    /// 1-based round number.
    pub number: u32,
    /// Participant who does not know the location.
    pub impostor: String,
    /// Location shared by everyone else.
    pub location: LocationEntity,
    /// Location names offered to the impostor.
    pub candidate_locations: Vec<String>,
    /// Role dealt to each non-impostor participant.
    pub roles: IndexMap<String, RoleEntity>,
    /// Ballots keyed by voter.
    pub ballots: IndexMap<String, Ballot>,
    /// Impostor's guess, if made.
    pub guess: Option<LocationGuess>,
    /// Participant who called the vote early.
    pub vote_caller: Option<String>,
    /// Questioning order.
    pub turns: TurnOrder,
    /// Result, once voting closed.
    pub outcome: Option<RoundOutcome>,
}

/// Why a participant scored what they did in a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreReason {
    /// Voted for the impostor.
    CorrectVote,
    /// Voted for an innocent participant.
    IncorrectVote,
    /// Did not vote in time.
    Abstained,
    /// Impostor named the location.
    LocationGuessed,
    /// Impostor named the wrong location.
    LocationMissed,
    /// Round ended on a location guess; nothing at stake for this participant.
    Unscored,
}

/// One participant's points for a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreLine {
    /// Points from the vote or guess.
    pub points: i32,
    /// Extra points on top, such as the impostor's framing bonus.
    pub bonus: i32,
    /// Classification of `points`.
    pub reason: ScoreReason,
}

impl ScoreLine {
    /// Points plus bonus.
    pub fn total(&self) -> i32 {
        self.points + self.bonus
    }
}

/// Resolved result of a round; computed once when voting closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Participant with the unique highest vote count, if any.
    pub convicted: Option<String>,
    /// Vote counts per accused participant.
    pub tally: IndexMap<String, u32>,
    /// Whether the convicted participant is the impostor.
    pub impostor_caught: bool,
    /// Impostor's guess, when the round ended on one.
    pub guess: Option<LocationGuess>,
    /// Score change per participant.
    pub lines: IndexMap<String, ScoreLine>,
}

/// Compact summary of a finished round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRecord {
    /// 1-based round number.
    pub number: u32,
    /// Impostor of the round.
    pub impostor: String,
    /// Location name.
    pub location: String,
    /// Convicted participant, if any.
    pub convicted: Option<String>,
    /// Whether the impostor was caught.
    pub impostor_caught: bool,
    /// Whether the impostor guessed the location, when they tried.
    pub location_guessed: Option<bool>,
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Canonical (trimmed) name.
    pub name: String,
    /// Freshly issued token.
    pub token: String,
    /// Whether the participant hosts the game.
    pub is_host: bool,
    /// Whether an existing record under the same name was taken over.
    pub replaced: bool,
}

/// Roster, settings and round data for the single game session.
#[derive(Debug)]
pub struct Session {
    /// Current settings.
    pub settings: GameSettings,
    /// Participants in join order.
    pub participants: IndexMap<String, Participant>,
    tokens: HashMap<String, String>,
    issued_tokens: HashSet<String>,
    /// Number of the round in progress or last played; 0 before the first round.
    pub current_round: u32,
    /// Round in progress or last played.
    pub round: Option<RoundState>,
    /// Finished rounds.
    pub history: Vec<RoundRecord>,
}

impl Session {
    /// Empty session.
    pub fn new(settings: GameSettings) -> Self {
        Self {
            settings,
            participants: IndexMap::new(),
            tokens: HashMap::new(),
            issued_tokens: HashSet::new(),
            current_round: 0,
            round: None,
            history: Vec::new(),
        }
    }

    /// Look a participant up by name.
    pub fn participant(&self, name: &str) -> Option<&Participant> {
        self.participants.get(name)
    }

    /// Names of logically connected participants, in join order.
    pub fn connected_names(&self) -> Vec<String> {
        self.participants
            .values()
            .filter(|participant| participant.connected)
            .map(|participant| participant.name.clone())
            .collect()
    }

    /// Number of logically connected participants.
    pub fn connected_count(&self) -> usize {
        self.participants
            .values()
            .filter(|participant| participant.connected)
            .count()
    }

    /// Whether `name` hosts the game.
    pub fn is_host(&self, name: &str) -> bool {
        self.participants
            .get(name)
            .is_some_and(|participant| participant.is_host)
    }

    /// Seat `name` (already validated), or take over the existing seat under that name.
    /// Taking over issues a new token, invalidating the old one, and keeps host status
    /// and score.
    pub fn admit<R: CryptoRng + ?Sized>(
        &mut self,
        name: &str,
        now: Instant,
        rng: &mut R,
    ) -> Result<Admission, GameError> {
        let replaced = self.participants.contains_key(name);
        if !replaced && self.participants.len() >= MAX_PLAYERS {
            return Err(GameError::GameFull);
        }

        let token = self.issue_token(rng);
        self.tokens.insert(token.clone(), name.to_owned());

        if let Some(participant) = self.participants.get_mut(name) {
            self.tokens.remove(&participant.token);
            participant.token = token.clone();
            participant.mark_connected(now);
            return Ok(Admission {
                name: name.to_owned(),
                token,
                is_host: participant.is_host,
                replaced: true,
            });
        }

        let is_host = !self.participants.values().any(|participant| participant.is_host);
        self.participants.insert(
            name.to_owned(),
            Participant {
                name: name.to_owned(),
                token: token.clone(),
                is_host,
                connected: true,
                disconnected_at: None,
                last_heartbeat: now,
                score: 0,
            },
        );
        Ok(Admission {
            name: name.to_owned(),
            token,
            is_host,
            replaced: false,
        })
    }

    /// Participant name a token currently maps to.
    pub fn name_for_token(&self, token: &str) -> Option<&str> {
        self.tokens.get(token).map(String::as_str)
    }

    /// Reclaim a seat by token. Fails when the token is unknown or the participant has
    /// been disconnected longer than `window`.
    pub fn restore(
        &mut self,
        token: &str,
        now: Instant,
        window: Duration,
    ) -> Result<String, GameError> {
        let name = self
            .tokens
            .get(token)
            .cloned()
            .ok_or(GameError::InvalidToken)?;
        let participant = self
            .participants
            .get_mut(&name)
            .ok_or(GameError::InvalidToken)?;

        if !participant.connected
            && participant
                .disconnected_for(now)
                .is_some_and(|elapsed| elapsed > window)
        {
            return Err(GameError::SessionExpired);
        }

        participant.mark_connected(now);
        Ok(name)
    }

    /// Record a heartbeat. Returns whether the participant was disconnected before.
    pub fn touch(&mut self, name: &str, now: Instant) -> bool {
        match self.participants.get_mut(name) {
            Some(participant) => {
                let was_disconnected = !participant.connected;
                participant.mark_connected(now);
                was_disconnected
            }
            None => false,
        }
    }

    /// Flip a participant to disconnected. Returns whether anything changed.
    pub fn mark_disconnected(&mut self, name: &str, now: Instant) -> bool {
        match self.participants.get_mut(name) {
            Some(participant) if participant.connected => {
                participant.connected = false;
                participant.disconnected_at = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Drop a participant who has been gone at least `threshold`; their token stops
    /// working.
    pub fn remove(
        &mut self,
        name: &str,
        now: Instant,
        threshold: Duration,
    ) -> Result<Participant, GameError> {
        let participant = self
            .participants
            .get(name)
            .ok_or(GameError::PlayerNotFound)?;
        let gone_long_enough = !participant.connected
            && participant
                .disconnected_for(now)
                .is_some_and(|elapsed| elapsed >= threshold);
        if !gone_long_enough {
            return Err(GameError::CannotRemoveConnected);
        }

        let removed = self
            .participants
            .shift_remove(name)
            .ok_or(GameError::PlayerNotFound)?;
        self.tokens.remove(&removed.token);
        Ok(removed)
    }

    /// Fold a round outcome into the cumulative scores. Only the first call for a
    /// round has any effect; returns whether it applied.
    pub fn apply_outcome(&mut self, outcome: RoundOutcome) -> bool {
        let Some(round) = self.round.as_mut() else {
            return false;
        };
        if round.outcome.is_some() {
            return false;
        }
        for (name, line) in &outcome.lines {
            if let Some(participant) = self.participants.get_mut(name) {
                participant.score += line.total();
            }
        }
        round.outcome = Some(outcome);
        true
    }

    /// Append the finished round to the history, once.
    pub fn record_history(&mut self) {
        let Some(round) = self.round.as_ref() else {
            return;
        };
        let Some(outcome) = round.outcome.as_ref() else {
            return;
        };
        if self
            .history
            .last()
            .is_some_and(|record| record.number == round.number)
        {
            return;
        }
        self.history.push(RoundRecord {
            number: round.number,
            impostor: round.impostor.clone(),
            location: round.location.name.clone(),
            convicted: outcome.convicted.clone(),
            impostor_caught: outcome.impostor_caught,
            location_guessed: outcome.guess.as_ref().map(|guess| guess.correct),
        });
    }

    /// Clear rounds and scores for another game with the same roster and tokens.
    pub fn reset_for_new_session(&mut self) {
        for participant in self.participants.values_mut() {
            participant.score = 0;
        }
        self.current_round = 0;
        self.round = None;
        self.history.clear();
    }

    /// Participants ranked by score, ties kept in join order.
    pub fn standings(&self) -> Vec<&Participant> {
        let mut ranked: Vec<&Participant> = self.participants.values().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }

    fn issue_token<R: CryptoRng + ?Sized>(&mut self, rng: &mut R) -> String {
        loop {
            let mut bytes = [0u8; TOKEN_BYTES];
            rng.fill_bytes(&mut bytes);
            let token: String = bytes.iter().map(|byte| format!("{byte:02x}")).collect();
            if self.issued_tokens.insert(token.clone()) {
                return token;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn session_with(names: &[&str], now: Instant) -> Session {
        let mut session = Session::new(GameSettings::default());
        let mut rng = rng();
        for name in names {
            session.admit(name, now, &mut rng).unwrap();
        }
        session
    }

    #[test]
    fn first_joiner_hosts() {
        let now = Instant::now();
        let mut session = Session::new(GameSettings::default());
        let mut rng = rng();
        let ann = session.admit("Ann", now, &mut rng).unwrap();
        let bob = session.admit("Bob", now, &mut rng).unwrap();

        assert!(ann.is_host);
        assert!(!bob.is_host);
        assert!(session.is_host("Ann"));
        assert_eq!(ann.token.len(), 64);
        assert!(ann.token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(ann.token, bob.token);
    }

    #[test]
    fn roster_is_capped() {
        let now = Instant::now();
        let names: Vec<String> = (0..MAX_PLAYERS).map(|i| format!("P{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut session = session_with(&refs, now);

        assert_eq!(
            session.admit("Late", now, &mut rng()).unwrap_err(),
            GameError::GameFull
        );
        // Taking over an existing seat is still allowed at capacity.
        assert!(session.admit("P3", now, &mut rng()).unwrap().replaced);
    }

    #[test]
    fn takeover_invalidates_the_previous_token() {
        let now = Instant::now();
        let mut session = Session::new(GameSettings::default());
        let mut rng = rng();
        let first = session.admit("Ann", now, &mut rng).unwrap();
        session.participants.get_mut("Ann").unwrap().score = 4;

        let second = session.admit("Ann", now, &mut rng).unwrap();
        assert!(second.replaced);
        assert!(second.is_host);
        assert_ne!(first.token, second.token);
        assert!(session.name_for_token(&first.token).is_none());
        assert_eq!(session.name_for_token(&second.token), Some("Ann"));
        assert_eq!(session.participant("Ann").unwrap().score, 4);
        assert_eq!(session.participants.len(), 1);
    }

    #[test]
    fn restore_respects_the_reconnect_window() {
        let start = Instant::now();
        let window = Duration::from_secs(300);
        let mut session = Session::new(GameSettings::default());
        let token = session.admit("Ann", start, &mut rng()).unwrap().token;

        assert_eq!(
            session.restore("nope", start, window).unwrap_err(),
            GameError::InvalidToken
        );

        session.mark_disconnected("Ann", start);
        let later = start + Duration::from_secs(301);
        assert_eq!(
            session.restore(&token, later, window).unwrap_err(),
            GameError::SessionExpired
        );

        let in_time = start + Duration::from_secs(299);
        assert_eq!(session.restore(&token, in_time, window).unwrap(), "Ann");
        let ann = session.participant("Ann").unwrap();
        assert!(ann.connected);
        assert!(ann.disconnected_at.is_none());
    }

    #[test]
    fn removal_requires_a_long_disconnection() {
        let start = Instant::now();
        let threshold = Duration::from_secs(60);
        let mut session = session_with(&["Ann", "Bob"], start);

        assert_eq!(
            session.remove("Bob", start, threshold).unwrap_err(),
            GameError::CannotRemoveConnected
        );
        session.mark_disconnected("Bob", start);
        assert_eq!(
            session
                .remove("Bob", start + Duration::from_secs(45), threshold)
                .unwrap_err(),
            GameError::CannotRemoveConnected
        );
        assert_eq!(
            session.remove("Zed", start, threshold).unwrap_err(),
            GameError::PlayerNotFound
        );

        let token = session.participant("Bob").unwrap().token.clone();
        let removed = session
            .remove("Bob", start + Duration::from_secs(60), threshold)
            .unwrap();
        assert_eq!(removed.name, "Bob");
        assert!(session.name_for_token(&token).is_none());
        assert_eq!(session.participants.len(), 1);
    }

    #[test]
    fn heartbeat_reconnects() {
        let now = Instant::now();
        let mut session = session_with(&["Ann"], now);
        assert!(!session.touch("Ann", now));
        assert!(session.mark_disconnected("Ann", now));
        assert!(!session.mark_disconnected("Ann", now));
        assert!(session.touch("Ann", now));
        assert_eq!(session.connected_count(), 1);
    }

    #[test]
    fn outcome_is_folded_once() {
        let now = Instant::now();
        let mut session = session_with(&["Ann", "Bob"], now);
        session.round = Some(RoundState {
            number: 1,
            impostor: "Bob".into(),
            location: LocationEntity {
                id: "beach".into(),
                name: "Beach".into(),
                flavor: None,
                roles: vec![],
            },
            candidate_locations: vec!["Beach".into()],
            roles: IndexMap::new(),
            ballots: IndexMap::new(),
            guess: None,
            vote_caller: None,
            turns: TurnOrder::default(),
            outcome: None,
        });
        let mut lines = IndexMap::new();
        lines.insert(
            "Ann".to_owned(),
            ScoreLine {
                points: -3,
                bonus: 0,
                reason: ScoreReason::IncorrectVote,
            },
        );
        lines.insert(
            "Bob".to_owned(),
            ScoreLine {
                points: -3,
                bonus: 10,
                reason: ScoreReason::IncorrectVote,
            },
        );
        let outcome = RoundOutcome {
            convicted: Some("Ann".into()),
            tally: IndexMap::new(),
            impostor_caught: false,
            guess: None,
            lines,
        };

        assert!(session.apply_outcome(outcome.clone()));
        assert!(!session.apply_outcome(outcome));
        assert_eq!(session.participant("Ann").unwrap().score, -3);
        assert_eq!(session.participant("Bob").unwrap().score, 7);

        session.record_history();
        session.record_history();
        assert_eq!(session.history.len(), 1);
        assert_eq!(session.standings()[0].name, "Bob");

        session.reset_for_new_session();
        assert!(session.round.is_none());
        assert!(session.history.is_empty());
        assert_eq!(session.participant("Bob").unwrap().score, 0);
        assert_eq!(session.participants.len(), 2);
    }

    #[test]
    fn turn_order_rotates() {
        let mut turns = TurnOrder::shuffled(
            vec!["Ann".into(), "Bob".into(), "Cid".into()],
            &mut rng(),
        );
        let first = turns.current().unwrap();
        let (q, a) = (first.questioner.to_owned(), first.answerer.to_owned());
        turns.advance();
        assert_eq!(turns.current().unwrap().questioner, a);
        turns.advance();
        turns.advance();
        assert_eq!(turns.current().unwrap().questioner, q);

        let lonely = TurnOrder::shuffled(vec!["Ann".into()], &mut rng());
        assert!(lonely.current().is_none());
    }

    #[test]
    fn confidence_levels() {
        assert_eq!(Confidence::try_from(3).unwrap(), Confidence::AllIn);
        assert_eq!(
            Confidence::try_from(0).unwrap_err(),
            GameError::InvalidConfidence
        );
        assert_eq!(Confidence::Medium.level(), 2);
    }
}

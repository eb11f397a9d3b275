//! Per-recipient state views and their delivery to participants and the shared
//! display.
//!
//! Every view is built from scratch for its recipient. Role briefings and ballot
//! details are only ever filled in for the viewer they describe; the display view
//! has no viewer and therefore never carries either.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{trace, warn};

use crate::{
    dto::{
        sse::ServerEvent,
        view::{
            BallotView, GameStatsView, GameSummaryView, GuessView, LobbyView, PackView,
            PauseView, PlayerView, RevealView, RoundProgress, RoundRecordView, ScoreLineView,
            SelfView, SettingsView, StandingView, StateView, TallyView, TimerView, TurnView,
            VoteView, VotingView,
        },
        ws::ServerMessage,
    },
    services::{
        coordinator::{Coordinator, TimerKind},
        role_service, voting_service,
    },
    state::{
        Outbound,
        game::{Ballot, MAX_PLAYERS, MIN_PLAYERS, Participant, RoundState, ScoreReason},
        state_machine::GamePhase,
    },
};

/// SSE event name of display state pushes.
pub const DISPLAY_STATE_EVENT: &str = "state";

impl Coordinator {
    /// Push a fresh view to every seated, connected participant and to the display.
    pub(crate) fn broadcast(&self, now: Instant) {
        let mut delivered = 0usize;
        for name in self.connections.bound_names() {
            let Some(participant) = self.session.participant(&name) else {
                continue;
            };
            if !participant.connected {
                continue;
            }
            let message = ServerMessage::State(Box::new(self.view_for(Some(&name), now)));
            match message.to_json() {
                Ok(payload) => {
                    if self.connections.send_to(&name, Outbound::Text(payload)) {
                        delivered += 1;
                    }
                }
                Err(err) => warn!(player = %name, error = %err, "failed to serialise state"),
            }
        }
        trace!(delivered, "state broadcast");
        self.publish_display(now);
    }

    /// Push the public view to the display streams.
    pub(crate) fn publish_display(&self, now: Instant) {
        if self.display.subscriber_count() == 0 {
            return;
        }
        match ServerEvent::json(DISPLAY_STATE_EVENT.to_owned(), &self.view_for(None, now)) {
            Ok(event) => self.display.broadcast(event),
            Err(err) => warn!(error = %err, "failed to serialise display state"),
        }
    }

    /// View of the session as `viewer` may see it; `None` builds the public view.
    pub fn view_for(&self, viewer: Option<&str>, now: Instant) -> StateView {
        let snapshot = self.machine.snapshot();
        let phase = snapshot.effective_phase();
        let viewer = viewer.and_then(|name| self.session.participant(name));
        let round = self.session.round.as_ref();
        let settings = &self.session.settings;

        StateView {
            phase: snapshot.phase.into(),
            version: snapshot.version,
            paused: snapshot.paused.map(|paused| PauseView {
                resume_to: paused.resume_to.into(),
                reason: paused.kind.into(),
            }),
            round: RoundProgress {
                current: self.session.current_round,
                total: settings.num_rounds,
            },
            settings: SettingsView {
                round_duration_minutes: settings.round_duration_minutes,
                num_rounds: settings.num_rounds,
                location_pack: settings.location_pack.clone(),
            },
            players: self.player_views(phase, round),
            timer: self.timer_view(now),
            me: viewer.map(|participant| SelfView {
                name: participant.name.clone(),
                is_host: participant.is_host,
                score: participant.score,
            }),
            lobby: (phase == GamePhase::Lobby).then(|| self.lobby_view()),
            role: match (phase, round, viewer) {
                (GamePhase::Roles | GamePhase::Questioning | GamePhase::Vote, Some(round), Some(viewer)) => {
                    role_service::briefing_for(round, &viewer.name)
                }
                _ => None,
            },
            turn: round
                .filter(|_| phase == GamePhase::Questioning)
                .and_then(|round| round.turns.current())
                .map(|turn| TurnView {
                    questioner: turn.questioner.to_owned(),
                    answerer: turn.answerer.to_owned(),
                }),
            voting: round
                .filter(|_| phase == GamePhase::Vote)
                .map(|round| self.voting_view(round, viewer)),
            reveal: round
                .filter(|_| matches!(phase, GamePhase::Reveal | GamePhase::Scoring | GamePhase::End))
                .and_then(reveal_view),
            standings: matches!(phase, GamePhase::Scoring | GamePhase::End)
                .then(|| rank(self.session.standings())),
            summary: (phase == GamePhase::End).then(|| self.summary_view()),
        }
    }

    fn player_views(&self, phase: GamePhase, round: Option<&RoundState>) -> Vec<PlayerView> {
        self.session
            .participants
            .values()
            .map(|participant| PlayerView {
                name: participant.name.clone(),
                is_host: participant.is_host,
                connected: participant.connected,
                score: participant.score,
                has_voted: (phase == GamePhase::Vote).then(|| {
                    round.is_some_and(|round| round.ballots.contains_key(&participant.name))
                }),
            })
            .collect()
    }

    /// Countdown of the running phase timer, or of the frozen one while paused.
    fn timer_view(&self, now: Instant) -> Option<TimerView> {
        if self.machine.paused().is_some() {
            return self.suspended.first().map(|suspended| TimerView {
                name: suspended.name.clone(),
                remaining_secs: whole_seconds(suspended.remaining),
                total_secs: suspended.total.as_secs(),
                frozen: true,
            });
        }
        TimerKind::PHASE_TIMERS.iter().find_map(|timer| {
            let name = timer.name();
            let remaining = self.timers.remaining(&name, now)?;
            let total = self.timers.total(&name)?;
            Some(TimerView {
                name,
                remaining_secs: whole_seconds(remaining),
                total_secs: total.as_secs(),
                frozen: false,
            })
        })
    }

    fn lobby_view(&self) -> LobbyView {
        let connected_count = self.session.connected_count();
        LobbyView {
            min_players: MIN_PLAYERS,
            max_players: MAX_PLAYERS,
            connected_count,
            can_start: self.machine.phase() == GamePhase::Lobby
                && connected_count >= MIN_PLAYERS,
            packs: self
                .content
                .list_packs()
                .into_iter()
                .map(|pack| PackView {
                    id: pack.id,
                    name: pack.name,
                    location_count: pack.location_count,
                })
                .collect(),
        }
    }

    fn voting_view(&self, round: &RoundState, viewer: Option<&Participant>) -> VotingView {
        let (submitted, expected) = voting_service::progress(round, &self.session.participants);
        VotingView {
            submitted,
            expected,
            called_by: round.vote_caller.clone(),
            my_ballot: viewer
                .and_then(|viewer| round.ballots.get(&viewer.name))
                .map(ballot_view),
            can_guess_location: viewer
                .filter(|viewer| viewer.name == round.impostor)
                .map(|viewer| round.guess.is_none() && !round.ballots.contains_key(&viewer.name)),
        }
    }

    fn summary_view(&self) -> GameSummaryView {
        let top = self
            .session
            .participants
            .values()
            .map(|participant| participant.score)
            .max();
        let winners: Vec<String> = self
            .session
            .participants
            .values()
            .filter(|participant| Some(participant.score) == top)
            .map(|participant| participant.name.clone())
            .collect();
        let history = &self.session.history;

        GameSummaryView {
            is_tie: winners.len() > 1,
            winners,
            rounds: history
                .iter()
                .map(|record| RoundRecordView {
                    number: record.number,
                    impostor: record.impostor.clone(),
                    location: record.location.clone(),
                    convicted: record.convicted.clone(),
                    impostor_caught: record.impostor_caught,
                    location_guessed: record.location_guessed,
                })
                .collect(),
            stats: GameStatsView {
                rounds_played: history.len(),
                impostors_caught: history.iter().filter(|record| record.impostor_caught).count(),
                locations_guessed: history
                    .iter()
                    .filter(|record| record.location_guessed == Some(true))
                    .count(),
            },
        }
    }
}

fn reveal_view(round: &RoundState) -> Option<RevealView> {
    let outcome = round.outcome.as_ref()?;
    Some(RevealView {
        impostor: round.impostor.clone(),
        location: round.location.name.clone(),
        convicted: outcome.convicted.clone(),
        impostor_caught: outcome.impostor_caught,
        votes: round
            .ballots
            .iter()
            .map(|(voter, ballot)| VoteView {
                voter: voter.clone(),
                ballot: ballot_view(ballot),
            })
            .collect(),
        tally: outcome
            .tally
            .iter()
            .map(|(target, votes)| TallyView {
                target: target.clone(),
                votes: *votes,
            })
            .collect(),
        guess: outcome.guess.as_ref().map(|guess| GuessView {
            location: guess.location.clone(),
            correct: guess.correct,
        }),
        scores: outcome
            .lines
            .iter()
            .map(|(name, line)| ScoreLineView {
                name: name.clone(),
                points: line.points,
                bonus: line.bonus,
                total: line.total(),
                reason: reason_label(line.reason).to_owned(),
            })
            .collect(),
    })
}

fn ballot_view(ballot: &Ballot) -> BallotView {
    match ballot {
        Ballot::Vote { target, confidence } => BallotView {
            target: Some(target.clone()),
            confidence: Some(confidence.level()),
            abstained: false,
        },
        Ballot::Abstain => BallotView {
            target: None,
            confidence: None,
            abstained: true,
        },
    }
}

fn reason_label(reason: ScoreReason) -> &'static str {
    match reason {
        ScoreReason::CorrectVote => "correctVote",
        ScoreReason::IncorrectVote => "incorrectVote",
        ScoreReason::Abstained => "abstained",
        ScoreReason::LocationGuessed => "locationGuessed",
        ScoreReason::LocationMissed => "locationMissed",
        ScoreReason::Unscored => "unscored",
    }
}

/// Competition ranking: equal scores share a rank and the next rank skips ahead.
fn rank(standings: Vec<&Participant>) -> Vec<StandingView> {
    let mut ranked = Vec::with_capacity(standings.len());
    let mut current = (0, None);
    for (index, participant) in standings.into_iter().enumerate() {
        if current.1 != Some(participant.score) {
            current = (index + 1, Some(participant.score));
        }
        ranked.push(StandingView {
            rank: current.0,
            name: participant.name.clone(),
            score: participant.score,
        });
    }
    ranked
}

fn whole_seconds(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

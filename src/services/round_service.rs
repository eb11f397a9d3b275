//! Round lifecycle: dealing, the phase timers, voting, scoring and the host
//! commands that steer them.

use tokio::time::Instant;
use tracing::{info, warn};

use crate::{
    dto::{validation::SettingsPatch, ws::ConfigField},
    error::GameError,
    services::{
        coordinator::{Coordinator, TimerKind},
        role_service, scoring_service, voting_service,
    },
    state::{
        game::{MIN_PLAYERS, RoundState, TurnOrder},
        state_machine::{FinishReason, GameEvent, GamePhase},
    },
};

impl Coordinator {
    /// Host start from the lobby. Roles are dealt before the phase changes, so a
    /// failed deal leaves the lobby untouched.
    pub(crate) fn start_game(&mut self) -> Result<(), GameError> {
        self.require_phase(GamePhase::Lobby)?;
        if self.session.connected_count() < MIN_PLAYERS {
            return Err(GameError::NotEnoughPlayers);
        }
        self.deal_round()?;
        self.machine.apply(GameEvent::StartGame)?;
        self.start_timer(TimerKind::RoleDisplay, self.timings.role_display);
        info!(
            players = self.session.connected_count(),
            rounds = self.session.settings.num_rounds,
            "game started"
        );
        Ok(())
    }

    /// Role briefing over; questioning starts with a fresh turn order.
    pub(crate) fn roles_shown(&mut self) -> Result<bool, GameError> {
        self.machine.apply(GameEvent::RolesShown)?;
        let names = self.session.connected_names();
        if let Some(round) = self.session.round.as_mut() {
            round.turns = TurnOrder::shuffled(names, &mut self.rng);
        }
        self.start_timer(TimerKind::Round, self.session.settings.round_duration());
        Ok(true)
    }

    /// Questioning time ran out.
    pub(crate) fn round_expired(&mut self) -> Result<bool, GameError> {
        self.call_vote(None)?;
        Ok(true)
    }

    /// End questioning and open the voting window. `caller` is `None` when the
    /// round timer ran out.
    pub(crate) fn call_vote(&mut self, caller: Option<String>) -> Result<(), GameError> {
        self.machine.apply(GameEvent::CallVote)?;
        self.timers.cancel(&TimerKind::Round.name());
        info!(called_by = ?caller, "voting opened");
        if let Some(round) = self.session.round.as_mut() {
            round.vote_caller = caller;
        }
        self.start_timer(TimerKind::Vote, self.timings.vote);
        Ok(())
    }

    /// Record a vote; closes voting once every connected participant is in.
    pub(crate) fn vote(
        &mut self,
        voter: &str,
        target: &str,
        confidence: i64,
    ) -> Result<(), GameError> {
        self.require_phase(GamePhase::Vote)?;
        let round = self.session.round.as_mut().ok_or(GameError::InvalidPhase)?;
        voting_service::cast_vote(round, &self.session.participants, voter, target, confidence)?;
        info!(player = %voter, "vote recorded");
        self.close_voting_if_complete()
    }

    /// Record the impostor's location guess; it ends voting at once.
    pub(crate) fn spy_guess(&mut self, guesser: &str, location: &str) -> Result<(), GameError> {
        self.require_phase(GamePhase::Vote)?;
        let round = self.session.round.as_mut().ok_or(GameError::InvalidPhase)?;
        voting_service::guess_location(round, guesser, location)?;
        info!("location guess recorded");
        self.close_voting()
    }

    /// Voting window over: everyone silent abstains.
    pub(crate) fn vote_expired(&mut self) -> Result<bool, GameError> {
        self.require_phase(GamePhase::Vote)?;
        if let Some(round) = self.session.round.as_mut() {
            voting_service::record_abstentions(round, &self.session.participants);
        }
        self.close_voting()?;
        Ok(true)
    }

    /// Close voting early when nothing is left to wait for.
    pub(crate) fn close_voting_if_complete(&mut self) -> Result<(), GameError> {
        let complete = self
            .session
            .round
            .as_ref()
            .is_some_and(|round| voting_service::all_submitted(round, &self.session.participants));
        if complete {
            self.close_voting()?;
        }
        Ok(())
    }

    /// Resolve the round, fold the scores in once and start the reveal pause.
    pub(crate) fn close_voting(&mut self) -> Result<(), GameError> {
        self.machine.apply(GameEvent::VotingClosed)?;
        self.timers.cancel(&TimerKind::Vote.name());

        let roster: Vec<String> = self.session.participants.keys().cloned().collect();
        let outcome = self
            .session
            .round
            .as_ref()
            .map(|round| scoring_service::resolve(round, &roster));
        if let Some(outcome) = outcome {
            info!(
                round = self.session.current_round,
                convicted = outcome.convicted.is_some(),
                caught = outcome.impostor_caught,
                guessed = outcome.guess.is_some(),
                "voting closed"
            );
            self.session.apply_outcome(outcome);
        }
        self.start_timer(TimerKind::Reveal, self.timings.reveal);
        Ok(())
    }

    /// Reveal pause over; show the scoreboard.
    pub(crate) fn reveal_finished(&mut self) -> Result<bool, GameError> {
        self.machine.apply(GameEvent::RevealFinished)?;
        self.session.record_history();
        self.start_timer(TimerKind::Scoring, self.timings.scoring);
        Ok(true)
    }

    /// Scoreboard over: deal the next round, or finish when the rounds are played or
    /// too few participants remain.
    pub(crate) fn scoring_finished(&mut self, now: Instant) -> Result<bool, GameError> {
        self.require_phase(GamePhase::Scoring)?;
        if self.session.current_round >= self.session.settings.num_rounds {
            self.finish(FinishReason::RoundsCompleted, now)?;
            return Ok(true);
        }
        match self.deal_round() {
            Ok(()) => {
                self.machine.apply(GameEvent::NextRound)?;
                self.start_timer(TimerKind::RoleDisplay, self.timings.role_display);
            }
            Err(err) => {
                warn!(error = %err, "cannot deal the next round; ending the game");
                self.finish(FinishReason::NotEnoughPlayers, now)?;
            }
        }
        Ok(true)
    }

    /// Host ends the game from any live phase.
    pub(crate) fn end_game(&mut self, now: Instant) -> Result<(), GameError> {
        self.finish(FinishReason::ManualStop, now)
    }

    /// Back to the lobby from the final results, keeping roster and tokens.
    pub(crate) fn new_session(&mut self) -> Result<(), GameError> {
        self.machine.apply(GameEvent::NewSession)?;
        self.session.reset_for_new_session();
        info!("new session started");
        Ok(())
    }

    /// Change one setting from the lobby.
    pub(crate) fn configure(
        &mut self,
        field: ConfigField,
        value: &serde_json::Value,
    ) -> Result<(), GameError> {
        if self.machine.phase() != GamePhase::Lobby {
            return Err(GameError::ConfigLocked);
        }
        let patch = SettingsPatch::from_field(field, value)?;
        if let Some(pack) = patch.location_pack.as_deref() {
            if !self.content.has_pack(pack) {
                return Err(GameError::InvalidPack);
            }
        }

        let settings = &mut self.session.settings;
        if let Some(minutes) = patch.round_duration_minutes {
            settings.round_duration_minutes = minutes;
        }
        if let Some(rounds) = patch.num_rounds {
            settings.num_rounds = rounds;
        }
        if let Some(pack) = patch.location_pack {
            settings.location_pack = pack;
        }
        info!(field = ?field, "settings updated");
        Ok(())
    }

    /// Hand the question to the next participant.
    pub(crate) fn advance_turn(&mut self) -> Result<(), GameError> {
        self.require_phase(GamePhase::Questioning)?;
        if let Some(round) = self.session.round.as_mut() {
            round.turns.advance();
        }
        Ok(())
    }

    /// Enter the final results. A manual stop tears down every timer, grace periods
    /// included; their participants are marked disconnected straight away.
    fn finish(&mut self, reason: FinishReason, now: Instant) -> Result<(), GameError> {
        self.machine.apply(GameEvent::Finish(reason))?;
        self.suspended.clear();
        if reason == FinishReason::ManualStop {
            for timer in self.timers.cancel_all() {
                if let TimerKind::DisconnectGrace(name) = timer {
                    self.session.mark_disconnected(&name, now);
                }
            }
        } else {
            for timer in &TimerKind::PHASE_TIMERS {
                self.timers.cancel(&timer.name());
            }
        }
        info!(reason = ?reason, rounds = self.session.history.len(), "game over");
        Ok(())
    }

    /// Deal a round to the connected participants. Nothing changes on failure.
    fn deal_round(&mut self) -> Result<(), GameError> {
        let Some(pack) = self.content.find_pack(&self.session.settings.location_pack) else {
            warn!(pack = %self.session.settings.location_pack, "selected location pack is missing");
            return Err(GameError::RoleAssignmentFailed);
        };
        let participants = self.session.connected_names();
        let assignment = role_service::assign(&participants, &pack, &mut self.rng)
            .inspect_err(|err| warn!(error = %err, "role assignment failed"))?;

        let number = self.session.current_round + 1;
        self.session.current_round = number;
        self.session.round = Some(RoundState {
            number,
            impostor: assignment.impostor,
            location: assignment.location,
            candidate_locations: assignment.candidate_locations,
            roles: assignment.roles,
            ballots: Default::default(),
            guess: None,
            vote_caller: None,
            turns: TurnOrder::default(),
            outcome: None,
        });
        Ok(())
    }

    fn start_timer(&mut self, timer: TimerKind, duration: std::time::Duration) {
        self.timers.start(timer.name(), duration, timer);
    }
}

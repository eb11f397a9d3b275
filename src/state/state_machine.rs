use std::fmt;

use thiserror::Error;

/// Phases a session moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GamePhase {
    /// Participants gather and the host configures the game.
    Lobby,
    /// Roles are dealt and shown privately.
    Roles,
    /// Timed questioning round.
    Questioning,
    /// Timed voting window.
    Vote,
    /// Short pause while the round result is revealed.
    Reveal,
    /// Scoreboard between rounds.
    Scoring,
    /// Final results; only a new session leaves this phase.
    End,
    /// Gameplay suspended, either by the host or because the host dropped.
    Paused,
}

impl GamePhase {
    /// Wire name of the phase.
    pub fn as_str(self) -> &'static str {
        match self {
            GamePhase::Lobby => "LOBBY",
            GamePhase::Roles => "ROLES",
            GamePhase::Questioning => "QUESTIONING",
            GamePhase::Vote => "VOTE",
            GamePhase::Reveal => "REVEAL",
            GamePhase::Scoring => "SCORING",
            GamePhase::End => "END",
            GamePhase::Paused => "PAUSED",
        }
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents why the game entered a paused state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseKind {
    /// The host paused gameplay.
    Manual,
    /// The host's grace period ran out.
    HostDisconnected,
}

/// What asked for a paused game to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeTrigger {
    /// Explicit host command; lifts any pause.
    HostCommand,
    /// The host came back; only lifts a pause caused by their absence.
    HostReturned,
}

/// Indicates why gameplay transitioned to the final results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Every configured round was played.
    RoundsCompleted,
    /// Too few connected participants to deal another round.
    NotEnoughPlayers,
    /// The host ended the game early.
    ManualStop,
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    /// Host starts the first round from the lobby.
    StartGame,
    /// Role display time elapsed.
    RolesShown,
    /// Questioning ended, by timer or by a participant calling the vote.
    CallVote,
    /// Every ballot is in, the timer expired, or the impostor guessed.
    VotingClosed,
    /// Reveal pause elapsed.
    RevealFinished,
    /// Scoreboard elapsed and another round follows.
    NextRound,
    /// Move to the final results.
    Finish(FinishReason),
    /// Suspend gameplay.
    Pause(PauseKind),
    /// Continue after a pause.
    Resume(ResumeTrigger),
    /// Start over from the final results, keeping the roster.
    NewSession,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: GamePhase,
    /// The event that cannot be applied from this phase.
    pub event: GameEvent,
}

/// Where a paused game returns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PausedState {
    /// Phase restored on resume.
    pub resume_to: GamePhase,
    /// Why the game was paused.
    pub kind: PauseKind,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase of the state machine.
    pub phase: GamePhase,
    /// Version number of the state machine (increments on each transition).
    pub version: usize,
    /// Pause bookkeeping while in [`GamePhase::Paused`].
    pub paused: Option<PausedState>,
}

impl Snapshot {
    /// Phase gameplay is logically in, looking through a pause.
    pub fn effective_phase(&self) -> GamePhase {
        self.paused.map_or(self.phase, |paused| paused.resume_to)
    }
}

/// Transition table for a session.
#[derive(Debug, Clone)]
pub struct GameStateMachine {
    phase: GamePhase,
    version: usize,
    paused: Option<PausedState>,
}

impl Default for GameStateMachine {
    fn default() -> Self {
        Self {
            phase: GamePhase::Lobby,
            version: 0,
            paused: None,
        }
    }
}

impl GameStateMachine {
    /// Create a new state machine initialised in the lobby.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Pause bookkeeping, if paused.
    pub fn paused(&self) -> Option<PausedState> {
        self.paused
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
            paused: self.paused,
        }
    }

    /// Whether `event` would be accepted from the current phase.
    pub fn can_apply(&self, event: GameEvent) -> bool {
        self.compute_transition(event).is_ok()
    }

    /// Validate and apply an event. Returns the new phase; a rejected event leaves
    /// the machine untouched.
    pub fn apply(&mut self, event: GameEvent) -> Result<GamePhase, InvalidTransition> {
        let next = self.compute_transition(event)?;

        self.paused = match event {
            GameEvent::Pause(kind) => Some(PausedState {
                resume_to: self.phase,
                kind,
            }),
            _ => None,
        };
        self.phase = next;
        self.version += 1;

        Ok(next)
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: GameEvent) -> Result<GamePhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (GamePhase::Lobby, GameEvent::StartGame) => GamePhase::Roles,
            (GamePhase::Roles, GameEvent::RolesShown) => GamePhase::Questioning,
            (GamePhase::Questioning, GameEvent::CallVote) => GamePhase::Vote,
            (GamePhase::Vote, GameEvent::VotingClosed) => GamePhase::Reveal,
            (GamePhase::Reveal, GameEvent::RevealFinished) => GamePhase::Scoring,
            (GamePhase::Scoring, GameEvent::NextRound) => GamePhase::Roles,
            (
                GamePhase::Scoring,
                GameEvent::Finish(FinishReason::RoundsCompleted | FinishReason::NotEnoughPlayers),
            ) => GamePhase::End,
            (from, GameEvent::Finish(FinishReason::ManualStop)) if from != GamePhase::End => {
                GamePhase::End
            }
            (from, GameEvent::Pause(_)) if !matches!(from, GamePhase::End | GamePhase::Paused) => {
                GamePhase::Paused
            }
            (GamePhase::Paused, GameEvent::Resume(trigger)) => match (self.paused, trigger) {
                (Some(paused), ResumeTrigger::HostCommand) => paused.resume_to,
                (Some(paused), ResumeTrigger::HostReturned)
                    if paused.kind == PauseKind::HostDisconnected =>
                {
                    paused.resume_to
                }
                _ => {
                    return Err(InvalidTransition {
                        from: self.phase,
                        event,
                    });
                }
            },
            (GamePhase::End, GameEvent::NewSession) => GamePhase::Lobby,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

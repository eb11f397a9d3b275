//! The game coordinator: one task owning the session, the state machine and the
//! timers. Participant messages and timer expiries are processed strictly one at a
//! time, so every phase guard observes the effects of everything before it.
//!
//! Behaviour is split across `impl Coordinator` blocks:
//! [`session_service`](super::session_service) for seats and connectivity,
//! [`round_service`](super::round_service) for the round lifecycle and host commands,
//! [`broadcast_service`](super::broadcast_service) for the per-recipient views.

use std::{fmt, sync::Arc};

use rand::rngs::StdRng;
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    config::{AppConfig, Timings},
    dao::content_store::ContentStore,
    dto::ws::{AdminCommand, ClientMessage, ServerMessage},
    error::{GameError, ServiceError},
    state::{
        ConnectionId, ConnectionRegistry, Outbound, SseHub,
        game::Session,
        state_machine::{GameEvent, GamePhase, GameStateMachine, PauseKind, ResumeTrigger, Snapshot},
        timers::{Fired, Suspended, TimerRegistry},
    },
};

/// Prefix of the per-participant disconnect grace timers.
pub const GRACE_TIMER_PREFIX: &str = "disconnect_grace:";

/// What a timer does when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerKind {
    /// Role briefing is over; questioning starts.
    RoleDisplay,
    /// Questioning time ran out.
    Round,
    /// Voting window closed.
    Vote,
    /// Reveal pause is over.
    Reveal,
    /// Scoreboard is over.
    Scoring,
    /// A dropped participant did not come back in time.
    DisconnectGrace(String),
}

impl TimerKind {
    /// Phase timers, in the order they run during a round.
    pub const PHASE_TIMERS: [TimerKind; 5] = [
        TimerKind::RoleDisplay,
        TimerKind::Round,
        TimerKind::Vote,
        TimerKind::Reveal,
        TimerKind::Scoring,
    ];

    /// Registry name of the timer.
    pub fn name(&self) -> String {
        match self {
            TimerKind::RoleDisplay => "role_display".to_owned(),
            TimerKind::Round => "round".to_owned(),
            TimerKind::Vote => "vote".to_owned(),
            TimerKind::Reveal => "reveal".to_owned(),
            TimerKind::Scoring => "scoring".to_owned(),
            TimerKind::DisconnectGrace(name) => format!("{GRACE_TIMER_PREFIX}{name}"),
        }
    }

    /// Grace timer for `name`.
    pub fn grace(name: &str) -> Self {
        TimerKind::DisconnectGrace(name.to_owned())
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Inputs to the coordinator task.
#[derive(Debug)]
pub enum Command {
    /// A parsed message from a participant connection.
    Message {
        /// Sending connection.
        connection: ConnectionId,
        /// The message.
        message: ClientMessage,
    },
    /// A participant connection went away.
    Disconnected {
        /// Closed connection.
        connection: ConnectionId,
    },
    /// Periodic countdown refresh.
    Tick,
    /// A display subscribed and needs the current public view.
    DisplayConnected,
}

/// Cloneable sender side of the coordinator's command queue.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl CoordinatorHandle {
    /// Queue a command.
    pub fn send(&self, command: Command) -> Result<(), ServiceError> {
        self.tx
            .send(command)
            .map_err(|_| ServiceError::CoordinatorUnavailable)
    }

    /// Whether the coordinator task is still accepting commands.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Owner of the single game session.
pub struct Coordinator {
    pub(crate) timings: Timings,
    pub(crate) session: Session,
    pub(crate) machine: GameStateMachine,
    pub(crate) timers: TimerRegistry<TimerKind>,
    pub(crate) suspended: Vec<Suspended<TimerKind>>,
    pub(crate) content: Arc<dyn ContentStore>,
    pub(crate) connections: Arc<ConnectionRegistry>,
    pub(crate) display: Arc<SseHub>,
    pub(crate) rng: StdRng,
}

impl Coordinator {
    /// Build a coordinator in the lobby. The returned receiver carries timer
    /// expiries, which must be fed back through [`Coordinator::handle_fired`].
    /// `rng` must be seeded from a secure source outside of tests.
    pub fn new(
        config: &AppConfig,
        content: Arc<dyn ContentStore>,
        connections: Arc<ConnectionRegistry>,
        display: Arc<SseHub>,
        rng: StdRng,
    ) -> (Self, mpsc::UnboundedReceiver<Fired<TimerKind>>) {
        let (timers, fired) = TimerRegistry::new();
        let coordinator = Self {
            timings: config.timings,
            session: Session::new(config.defaults.clone()),
            machine: GameStateMachine::new(),
            timers,
            suspended: Vec::new(),
            content,
            connections,
            display,
            rng,
        };
        (coordinator, fired)
    }

    /// Move the coordinator onto its own task.
    pub fn spawn(
        self,
        fired: mpsc::UnboundedReceiver<Fired<TimerKind>>,
    ) -> (CoordinatorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx, fired));
        (CoordinatorHandle { tx }, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut fired: mpsc::UnboundedReceiver<Fired<TimerKind>>,
    ) {
        info!("game coordinator started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_at(command, Instant::now()),
                    None => break,
                },
                Some(notice) = fired.recv() => self.handle_fired(notice, Instant::now()),
            }
        }
        self.timers.cancel_all();
        info!("game coordinator stopped");
    }

    /// Current phase.
    pub fn phase(&self) -> GamePhase {
        self.machine.phase()
    }

    /// Current state machine snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.machine.snapshot()
    }

    /// The session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Whether a timer named `name` is pending.
    pub fn timer_active(&self, name: &str) -> bool {
        self.timers.is_active(name)
    }

    /// Process one command as of `now`.
    pub fn handle_at(&mut self, command: Command, now: Instant) {
        match command {
            Command::Message {
                connection,
                message,
            } => {
                let kind = message.kind();
                match self.dispatch(connection, message, now) {
                    Ok(true) => self.broadcast(now),
                    Ok(false) => {}
                    Err(err) => {
                        warn!(
                            connection = %connection,
                            message = kind,
                            code = err.code(),
                            "request rejected"
                        );
                        self.reply(connection, &ServerMessage::from(&err));
                    }
                }
            }
            Command::Disconnected { connection } => {
                if self.connection_closed(connection) {
                    self.broadcast(now);
                }
            }
            Command::Tick => {
                if matches!(
                    self.machine.phase(),
                    GamePhase::Questioning | GamePhase::Vote
                ) {
                    self.broadcast(now);
                }
            }
            Command::DisplayConnected => self.publish_display(now),
        }
    }

    /// Process a timer expiry as of `now`. Notices from canceled or replaced timers
    /// are dropped.
    pub fn handle_fired(&mut self, notice: Fired<TimerKind>, now: Instant) {
        if !self.timers.claim(&notice) {
            debug!(timer = %notice.name, id = notice.id, "stale timer notice ignored");
            return;
        }
        debug!(timer = %notice.name, "timer fired");

        let result = match notice.payload {
            TimerKind::RoleDisplay => self.roles_shown(),
            TimerKind::Round => self.round_expired(),
            TimerKind::Vote => self.vote_expired(),
            TimerKind::Reveal => self.reveal_finished(),
            TimerKind::Scoring => self.scoring_finished(now),
            TimerKind::DisconnectGrace(name) => self.grace_expired(&name, now),
        };
        match result {
            Ok(true) => self.broadcast(now),
            Ok(false) => {}
            Err(err) => warn!(timer = %notice.name, error = %err, "timer expiry rejected"),
        }
    }

    /// Route a message to its handler. `Ok(true)` means the session changed and a
    /// broadcast is due.
    fn dispatch(
        &mut self,
        connection: ConnectionId,
        message: ClientMessage,
        now: Instant,
    ) -> Result<bool, GameError> {
        match message {
            ClientMessage::Join { name } => self.join(connection, &name, now).map(|()| true),
            ClientMessage::Reconnect { token } => {
                self.reconnect(connection, &token, now).map(|()| true)
            }
            ClientMessage::Heartbeat => self.heartbeat(connection, now),
            ClientMessage::Vote { target, confidence } => {
                let voter = self.seated(connection)?;
                self.vote(&voter, &target, confidence).map(|()| true)
            }
            ClientMessage::SpyGuess { location } => {
                let guesser = self.seated(connection)?;
                self.spy_guess(&guesser, &location).map(|()| true)
            }
            ClientMessage::CallVote => {
                let caller = self.seated(connection)?;
                self.call_vote(Some(caller)).map(|()| true)
            }
            ClientMessage::Admin(command) => {
                let host = self.seated(connection)?;
                if !self.session.is_host(&host) {
                    return Err(GameError::NotHost);
                }
                self.admin(&host, command, now).map(|()| true)
            }
            ClientMessage::Unknown => Err(GameError::InvalidMessage),
        }
    }

    fn admin(&mut self, host: &str, command: AdminCommand, now: Instant) -> Result<(), GameError> {
        info!(host = %host, command = ?command, "admin command");
        match command {
            AdminCommand::StartGame => self.start_game(),
            AdminCommand::RemovePlayer { name } => self.remove_player(&name, now),
            AdminCommand::Configure { field, value } => self.configure(field, &value),
            AdminCommand::Pause => self.pause(PauseKind::Manual, now),
            AdminCommand::Resume => self.resume(ResumeTrigger::HostCommand),
            AdminCommand::EndGame => self.end_game(now),
            AdminCommand::AdvanceTurn => self.advance_turn(),
            AdminCommand::NewSession => self.new_session(),
            AdminCommand::Unknown => Err(GameError::InvalidMessage),
        }
    }

    /// Participant bound to `connection`.
    pub(crate) fn seated(&self, connection: ConnectionId) -> Result<String, GameError> {
        self.connections
            .participant_of(connection)
            .filter(|name| self.session.participant(name).is_some())
            .ok_or(GameError::NotInGame)
    }

    /// Fail unless the machine is in `expected`.
    pub(crate) fn require_phase(&self, expected: GamePhase) -> Result<(), GameError> {
        match self.machine.phase() {
            phase if phase == expected => Ok(()),
            GamePhase::End => Err(GameError::GameEnded),
            _ => Err(GameError::InvalidPhase),
        }
    }

    /// Suspend gameplay, freezing the running phase timer.
    pub(crate) fn pause(&mut self, kind: PauseKind, now: Instant) -> Result<(), GameError> {
        self.machine.apply(GameEvent::Pause(kind))?;
        for timer in &TimerKind::PHASE_TIMERS {
            if let Some(suspended) = self.timers.suspend(&timer.name(), now) {
                self.suspended.push(suspended);
            }
        }
        info!(reason = ?kind, "game paused");
        Ok(())
    }

    /// Lift a pause and put frozen timers back on the clock.
    pub(crate) fn resume(&mut self, trigger: ResumeTrigger) -> Result<(), GameError> {
        let phase = self.machine.apply(GameEvent::Resume(trigger))?;
        for suspended in std::mem::take(&mut self.suspended) {
            self.timers.resume(suspended);
        }
        info!(phase = ?phase, trigger = ?trigger, "game resumed");
        if phase == GamePhase::Vote {
            self.close_voting_if_complete()?;
        }
        Ok(())
    }

    /// Queue a message for one connection.
    pub(crate) fn reply(&self, connection: ConnectionId, message: &ServerMessage) {
        match message.to_json() {
            Ok(payload) => {
                self.connections.send(connection, Outbound::Text(payload));
            }
            Err(err) => warn!(error = %err, "failed to serialise reply"),
        }
    }
}

//! Seats, tokens and connectivity: joining, reclaiming a seat, heartbeats, dropped
//! connections and their grace period, and host removal of absent participants.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    dto::{
        validation::DisplayName,
        ws::{ServerMessage, SessionGrant},
    },
    error::GameError,
    services::coordinator::{Coordinator, GRACE_TIMER_PREFIX, TimerKind},
    state::{
        CLOSE_SESSION_REPLACED, ConnectionId,
        state_machine::{GameEvent, GamePhase, PauseKind, ResumeTrigger},
    },
};

impl Coordinator {
    /// Seat a participant from the lobby. A name already on the roster is taken
    /// over: the old token stops working and the old connection is closed.
    pub(crate) fn join(
        &mut self,
        connection: ConnectionId,
        raw_name: &str,
        now: Instant,
    ) -> Result<(), GameError> {
        if self.connections.participant_of(connection).is_some() {
            return Err(GameError::AlreadyJoined);
        }
        if self.machine.snapshot().effective_phase() != GamePhase::Lobby {
            return Err(GameError::GameAlreadyStarted);
        }
        let name = DisplayName::parse(raw_name)?;

        let admission = self.session.admit(&name, now, &mut self.rng)?;
        self.timers.cancel(&TimerKind::grace(&name).name());
        self.take_seat(&name, connection);

        info!(
            player = %admission.name,
            host = admission.is_host,
            replaced = admission.replaced,
            "player joined"
        );
        self.reply(
            connection,
            &ServerMessage::Joined(SessionGrant {
                name: admission.name,
                token: admission.token,
                is_host: admission.is_host,
            }),
        );
        if admission.is_host {
            self.host_returned();
        }
        Ok(())
    }

    /// Reclaim a seat by token, in any phase.
    pub(crate) fn reconnect(
        &mut self,
        connection: ConnectionId,
        token: &str,
        now: Instant,
    ) -> Result<(), GameError> {
        if self.connections.participant_of(connection).is_some() {
            return Err(GameError::AlreadyJoined);
        }
        let name = self
            .session
            .restore(token, now, self.timings.reconnect_window)?;
        self.timers.cancel(&TimerKind::grace(&name).name());
        self.take_seat(&name, connection);

        let participant = self
            .session
            .participant(&name)
            .ok_or(GameError::InvalidToken)?;
        let grant = SessionGrant {
            name: participant.name.clone(),
            token: participant.token.clone(),
            is_host: participant.is_host,
        };
        info!(player = %name, "player reconnected");
        self.reply(connection, &ServerMessage::Restored(grant));
        if self.session.is_host(&name) {
            self.host_returned();
        }
        Ok(())
    }

    /// Record a heartbeat. Unbound connections are ignored. Returns whether the
    /// participant's visible connectivity changed.
    pub(crate) fn heartbeat(
        &mut self,
        connection: ConnectionId,
        now: Instant,
    ) -> Result<bool, GameError> {
        let Some(name) = self.connections.participant_of(connection) else {
            debug!(connection = %connection, "heartbeat from unseated connection");
            return Ok(false);
        };
        self.timers.cancel(&TimerKind::grace(&name).name());
        let came_back = self.session.touch(&name, now);
        if came_back && self.session.is_host(&name) {
            self.host_returned();
        }
        Ok(came_back)
    }

    /// A socket closed. Its participant keeps their seat and stays connected until
    /// the grace timer runs out.
    pub(crate) fn connection_closed(&mut self, connection: ConnectionId) -> bool {
        let Some(name) = self.connections.unregister(connection) else {
            debug!(connection = %connection, "unseated connection closed");
            return false;
        };
        if self.session.participant(&name).is_none() {
            return false;
        }
        info!(
            player = %name,
            grace = ?self.timings.disconnect_grace,
            "connection lost; grace period started"
        );
        let timer = TimerKind::grace(&name);
        self.timers
            .start(timer.name(), self.timings.disconnect_grace, timer);
        false
    }

    /// Grace period over: the participant is now disconnected. Losing the host
    /// pauses the game.
    pub(crate) fn grace_expired(&mut self, name: &str, now: Instant) -> Result<bool, GameError> {
        if self.connections.connection_of(name).is_some() {
            return Ok(false);
        }
        if !self.session.mark_disconnected(name, now) {
            return Ok(false);
        }
        info!(player = %name, "player marked disconnected");

        if self.session.is_host(name)
            && self
                .machine
                .can_apply(GameEvent::Pause(PauseKind::HostDisconnected))
        {
            self.pause(PauseKind::HostDisconnected, now)?;
        }
        if self.machine.phase() == GamePhase::Vote {
            self.close_voting_if_complete()?;
        }
        Ok(true)
    }

    /// Host removal of a participant gone long enough, from the lobby only.
    pub(crate) fn remove_player(&mut self, name: &str, now: Instant) -> Result<(), GameError> {
        self.require_phase(GamePhase::Lobby)?;
        let removed = self
            .session
            .remove(name, now, self.timings.removal_threshold)?;

        let scoped = format!("{GRACE_TIMER_PREFIX}{}", removed.name);
        self.timers.cancel_matching(|timer| timer == scoped);
        if let Some(stale) = self.connections.unbind(&removed.name) {
            debug!(connection = %stale, "dropping binding of removed player");
        }
        info!(player = %removed.name, "player removed");
        Ok(())
    }

    /// Bind `name` to `connection`, closing whichever connection held it before.
    fn take_seat(&mut self, name: &str, connection: ConnectionId) {
        if let Some(previous) = self.connections.bind(name, connection) {
            info!(player = %name, "seat taken over by a new connection");
            self.connections
                .close(previous, CLOSE_SESSION_REPLACED, "session replaced");
        }
    }

    /// Lift a pause caused by the host's absence.
    fn host_returned(&mut self) {
        let paused_for_host = self
            .machine
            .paused()
            .is_some_and(|paused| paused.kind == PauseKind::HostDisconnected);
        if !paused_for_host {
            return;
        }
        if let Err(err) = self.resume(ResumeTrigger::HostReturned) {
            warn!(error = %err, "failed to resume after host returned");
        }
    }
}

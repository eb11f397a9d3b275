/// Live participant connections and their outbound queues.
pub mod connections;
/// Domain records of the session: participants, rounds and outcomes.
pub mod game;
mod sse;
/// Phase state machine and pause bookkeeping.
pub mod state_machine;
/// Named one-shot timers feeding the coordinator.
pub mod timers;

use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::{
    config::AppConfig,
    dao::content_store::ContentStore,
    services::coordinator::{Command, Coordinator, CoordinatorHandle},
};

pub use self::connections::{
    CLOSE_CONNECTION_LIMIT, CLOSE_SESSION_REPLACED, ConnectionId, ConnectionRegistry, Outbound,
};
pub use self::sse::SseHub;
pub use self::state_machine::{GameEvent, GamePhase, InvalidTransition, Snapshot};

/// Application state shared across handlers.
pub type SharedState = Arc<AppState>;

/// Buffered display events per subscriber.
const DISPLAY_CAPACITY: usize = 32;

/// Shared handles the HTTP layer needs: connections, the display hub and the
/// coordinator's command queue. The game itself lives on the coordinator task.
pub struct AppState {
    config: Arc<AppConfig>,
    connections: Arc<ConnectionRegistry>,
    display: Arc<SseHub>,
    coordinator: CoordinatorHandle,
}

impl AppState {
    /// Spawn the coordinator and its countdown ticker, returning the shared state.
    /// Must be called from within a Tokio runtime.
    pub fn start(config: AppConfig, content: Arc<dyn ContentStore>) -> SharedState {
        let config = Arc::new(config);
        let connections = Arc::new(ConnectionRegistry::new(config.max_connections));
        let display = Arc::new(SseHub::new(DISPLAY_CAPACITY));
        let packs = content.list_packs().len();

        let (coordinator, fired) = Coordinator::new(
            &config,
            content,
            connections.clone(),
            display.clone(),
            StdRng::from_os_rng(),
        );
        let (handle, _task) = coordinator.spawn(fired);
        spawn_ticker(handle.clone(), config.timings.state_tick);
        info!(
            max_connections = config.max_connections,
            packs,
            "application state ready"
        );

        Arc::new(Self {
            config,
            connections,
            display,
            coordinator: handle,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Live participant connections.
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Hub feeding the display streams.
    pub fn display(&self) -> &SseHub {
        &self.display
    }

    /// Command queue of the game coordinator.
    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }
}

/// Send a countdown tick every `period` until the coordinator goes away.
fn spawn_ticker(handle: CoordinatorHandle, period: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticks = interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            if handle.send(Command::Tick).is_err() {
                debug!("coordinator gone; ticker stopping");
                break;
            }
        }
    });
}

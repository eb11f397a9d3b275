//! Drives the coordinator through whole games with mpsc-backed connections and
//! checks what each participant was sent.

use std::{sync::Arc, time::Duration};

use rand::{SeedableRng, rngs::StdRng};
use serde_json::{Value, json};
use spyster_back::{
    config::AppConfig,
    dao::content_store::{ContentStore, memory::MemoryContentStore},
    dto::ws::ClientMessage,
    services::coordinator::{Command, Coordinator, TimerKind},
    state::{
        CLOSE_SESSION_REPLACED, ConnectionId, ConnectionRegistry, GamePhase, Outbound, SseHub,
        timers::Fired,
    },
};
use tokio::{
    sync::mpsc,
    time::{Instant, advance},
};

struct Client {
    id: ConnectionId,
    rx: mpsc::Receiver<Outbound>,
}

impl Client {
    fn frames(&mut self) -> Vec<Outbound> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn messages(&mut self) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter_map(|frame| match frame {
                Outbound::Text(text) => Some(serde_json::from_str(&text).unwrap()),
                Outbound::Close { .. } => None,
            })
            .collect()
    }

    fn last_state(&mut self) -> Value {
        self.messages()
            .into_iter()
            .rev()
            .find(|message| message["type"] == "state")
            .expect("a state message")
    }

    fn last_error(&mut self) -> String {
        self.messages()
            .into_iter()
            .rev()
            .find(|message| message["type"] == "error")
            .map(|message| message["code"].as_str().unwrap().to_owned())
            .expect("an error message")
    }
}

struct Table {
    coordinator: Coordinator,
    fired: mpsc::UnboundedReceiver<Fired<TimerKind>>,
    connections: Arc<ConnectionRegistry>,
}

impl Table {
    fn new() -> Self {
        let connections = Arc::new(ConnectionRegistry::new(32));
        let content: Arc<dyn ContentStore> =
            Arc::new(MemoryContentStore::with_builtin().unwrap());
        let (coordinator, fired) = Coordinator::new(
            &AppConfig::default(),
            content,
            connections.clone(),
            Arc::new(SseHub::new(8)),
            StdRng::seed_from_u64(2024),
        );
        Self {
            coordinator,
            fired,
            connections,
        }
    }

    fn connect(&self) -> Client {
        let (tx, rx) = mpsc::channel(256);
        let id = self.connections.register(tx).unwrap();
        Client { id, rx }
    }

    fn send(&mut self, client: &Client, message: Value) {
        let message = ClientMessage::parse(&message.to_string()).unwrap();
        self.coordinator.handle_at(
            Command::Message {
                connection: client.id,
                message,
            },
            Instant::now(),
        );
    }

    fn admin(&mut self, host: &Client, mut command: Value) {
        command["type"] = json!("admin");
        self.send(host, command);
    }

    fn join(&mut self, name: &str) -> Client {
        let client = self.connect();
        self.send(&client, json!({"type": "join", "name": name}));
        client
    }

    fn drop_connection(&mut self, client: &Client) {
        self.coordinator.handle_at(
            Command::Disconnected {
                connection: client.id,
            },
            Instant::now(),
        );
    }

    /// Let the paused clock run to the next timer and process it.
    async fn fire_next(&mut self) -> String {
        let notice = self.fired.recv().await.unwrap();
        let name = notice.name.clone();
        self.coordinator.handle_fired(notice, Instant::now());
        name
    }

    fn phase(&self) -> GamePhase {
        self.coordinator.phase()
    }

    fn impostor(&self) -> String {
        self.coordinator
            .session()
            .round
            .as_ref()
            .map(|round| round.impostor.clone())
            .unwrap()
    }

    fn location(&self) -> String {
        self.coordinator
            .session()
            .round
            .as_ref()
            .map(|round| round.location.name.clone())
            .unwrap()
    }

    fn score(&self, name: &str) -> i32 {
        self.coordinator.session().participant(name).unwrap().score
    }
}

const NAMES: [&str; 4] = ["Ann", "Bob", "Cat", "Dan"];

fn seat_four(table: &mut Table) -> Vec<Client> {
    NAMES.iter().map(|name| table.join(name)).collect()
}

/// Table in the questioning phase of round one.
async fn questioning(table: &mut Table) -> Vec<Client> {
    let clients = seat_four(table);
    table.admin(&clients[0], json!({"action": "startGame"}));
    assert_eq!(table.phase(), GamePhase::Roles);
    assert_eq!(table.fire_next().await, "role_display");
    assert_eq!(table.phase(), GamePhase::Questioning);
    clients
}

fn index_of(name: &str) -> usize {
    NAMES.iter().position(|candidate| *candidate == name).unwrap()
}

#[tokio::test(start_paused = true)]
async fn a_full_single_round_game() {
    let mut table = Table::new();
    let mut clients = seat_four(&mut table);
    let joined = clients[0].messages();
    assert_eq!(joined[0]["type"], "joined");
    assert_eq!(joined[0]["isHost"], true);

    table.admin(&clients[1], json!({"action": "startGame"}));
    assert_eq!(clients[1].last_error(), "NOT_HOST");

    table.admin(
        &clients[0],
        json!({"action": "configure", "field": "numRounds", "value": 1}),
    );
    assert_eq!(clients[0].last_state()["settings"]["numRounds"], 1);

    table.admin(&clients[0], json!({"action": "startGame"}));
    assert_eq!(table.phase(), GamePhase::Roles);
    assert!(table.coordinator.timer_active("role_display"));

    let mut late = table.connect();
    table.send(&late, json!({"type": "join", "name": "Eve"}));
    assert_eq!(late.last_error(), "GAME_ALREADY_STARTED");

    table.admin(
        &clients[0],
        json!({"action": "configure", "field": "numRounds", "value": 3}),
    );
    assert_eq!(clients[0].last_error(), "CONFIG_GAME_STARTED");

    assert_eq!(table.fire_next().await, "role_display");
    assert_eq!(table.phase(), GamePhase::Questioning);
    let state = clients[2].last_state();
    assert_eq!(state["phase"], "QUESTIONING");
    assert!(state["turn"]["questioner"].is_string());
    assert_eq!(state["timer"]["name"], "round");

    table.send(&clients[1], json!({"type": "vote", "target": "Ann", "confidence": 1}));
    assert_eq!(clients[1].last_error(), "INVALID_PHASE");

    table.send(&clients[1], json!({"type": "callVote"}));
    assert_eq!(table.phase(), GamePhase::Vote);
    assert!(!table.coordinator.timer_active("round"));
    let state = clients[3].last_state();
    assert_eq!(state["voting"]["calledBy"], "Bob");
    assert_eq!(state["voting"]["expected"], 4);

    let impostor = table.impostor();
    let crew: Vec<&str> = NAMES.iter().copied().filter(|name| *name != impostor).collect();
    for name in &crew {
        let voter = &clients[index_of(name)];
        let vote = json!({"type": "vote", "target": impostor, "confidence": 2});
        table.send(voter, vote);
    }
    let impostor_client = index_of(&impostor);
    let state = clients[impostor_client].last_state();
    assert_eq!(state["voting"]["submitted"], 3);
    assert_eq!(state["voting"]["canGuessLocation"], true);

    table.send(
        &clients[impostor_client],
        json!({"type": "vote", "target": crew[0], "confidence": 3}),
    );
    assert_eq!(table.phase(), GamePhase::Reveal);

    let state = clients[index_of(crew[1])].last_state();
    assert_eq!(state["reveal"]["impostor"], impostor.as_str());
    assert_eq!(state["reveal"]["impostorCaught"], true);
    assert_eq!(state["reveal"]["convicted"], impostor.as_str());
    assert!(state.get("role").is_none());
    for name in &crew {
        assert_eq!(table.score(name), 4);
    }
    assert_eq!(table.score(&impostor), -3);

    assert_eq!(table.fire_next().await, "reveal");
    assert_eq!(table.phase(), GamePhase::Scoring);
    let standings = clients[0].last_state()["standings"].clone();
    let ranks: Vec<u64> = standings
        .as_array()
        .unwrap()
        .iter()
        .map(|standing| standing["rank"].as_u64().unwrap())
        .collect();
    assert_eq!(ranks, vec![1, 1, 1, 4]);

    assert_eq!(table.fire_next().await, "scoring");
    assert_eq!(table.phase(), GamePhase::End);
    let summary = clients[0].last_state()["summary"].clone();
    assert_eq!(summary["isTie"], true);
    assert_eq!(summary["winners"].as_array().unwrap().len(), 3);
    assert_eq!(summary["stats"]["roundsPlayed"], 1);
    assert_eq!(summary["stats"]["impostorsCaught"], 1);

    table.send(&clients[2], json!({"type": "callVote"}));
    assert_eq!(clients[2].last_error(), "GAME_ENDED");

    table.admin(&clients[0], json!({"action": "newSession"}));
    assert_eq!(table.phase(), GamePhase::Lobby);
    assert!(NAMES.iter().all(|name| table.score(name) == 0));
    let state = clients[1].last_state();
    assert_eq!(state["round"]["current"], 0);
    assert_eq!(state["players"].as_array().unwrap().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn a_right_location_guess_ends_the_vote_for_the_impostor() {
    let mut table = Table::new();
    let mut clients = questioning(&mut table).await;
    table.send(&clients[0], json!({"type": "callVote"}));

    let impostor = index_of(&table.impostor());
    let crew_member = (impostor + 1) % NAMES.len();
    table.send(&clients[crew_member], json!({"type": "spyGuess", "location": "Beach"}));
    assert_eq!(clients[crew_member].last_error(), "NOT_IMPOSTOR");

    let location = table.location().to_lowercase();
    table.send(&clients[impostor], json!({"type": "spyGuess", "location": location}));
    assert_eq!(table.phase(), GamePhase::Reveal);
    assert!(!table.coordinator.timer_active("vote"));

    let state = clients[crew_member].last_state();
    assert_eq!(state["reveal"]["guess"]["correct"], true);
    assert_eq!(state["reveal"]["impostorCaught"], false);
    assert_eq!(table.score(NAMES[impostor]), 10);
    assert_eq!(table.score(NAMES[crew_member]), 0);
}

#[tokio::test(start_paused = true)]
async fn silent_voters_abstain_when_the_window_closes() {
    let mut table = Table::new();
    let mut clients = questioning(&mut table).await;
    assert_eq!(table.fire_next().await, "round");
    assert_eq!(table.phase(), GamePhase::Vote);
    assert!(clients[0].last_state()["voting"].get("calledBy").is_none());

    let impostor = table.impostor();
    let voter = (index_of(&impostor) + 1) % NAMES.len();
    table.send(
        &clients[voter],
        json!({"type": "vote", "target": impostor, "confidence": 3}),
    );
    table.send(
        &clients[voter],
        json!({"type": "vote", "target": impostor, "confidence": 3}),
    );
    assert_eq!(clients[voter].last_error(), "ALREADY_VOTED");

    assert_eq!(table.fire_next().await, "vote");
    assert_eq!(table.phase(), GamePhase::Reveal);
    let votes = clients[voter].last_state()["reveal"]["votes"].clone();
    let abstained = votes
        .as_array()
        .unwrap()
        .iter()
        .filter(|vote| vote["abstained"] == true)
        .count();
    assert_eq!(abstained, 3);
    assert_eq!(table.score(NAMES[voter]), 6);
}

#[tokio::test(start_paused = true)]
async fn losing_the_host_pauses_until_they_return() {
    let mut table = Table::new();
    let mut clients = questioning(&mut table).await;
    let token = table
        .coordinator
        .session()
        .participant("Ann")
        .unwrap()
        .token
        .clone();

    let host = clients.remove(0);
    table.drop_connection(&host);
    assert!(table.coordinator.timer_active("disconnect_grace:Ann"));
    assert_eq!(table.phase(), GamePhase::Questioning);

    assert_eq!(table.fire_next().await, "disconnect_grace:Ann");
    assert_eq!(table.phase(), GamePhase::Paused);
    assert!(!table.coordinator.timer_active("round"));
    let state = clients[0].last_state();
    assert_eq!(state["paused"]["reason"], "hostDisconnected");
    assert_eq!(state["paused"]["resumeTo"], "QUESTIONING");
    assert_eq!(state["timer"]["frozen"], true);
    assert_eq!(state["timer"]["remainingSecs"], 390);

    let mut host = table.connect();
    table.send(&host, json!({"type": "reconnect", "token": token}));
    let messages = host.messages();
    assert_eq!(messages[0]["type"], "restored");
    assert_eq!(messages[0]["isHost"], true);
    assert_eq!(table.phase(), GamePhase::Questioning);
    assert!(table.coordinator.timer_active("round"));
}

#[tokio::test(start_paused = true)]
async fn a_quick_reconnect_keeps_the_seat_connected() {
    let mut table = Table::new();
    let mut clients = seat_four(&mut table);
    let token = clients[1].messages()[0]["token"].as_str().unwrap().to_owned();

    table.drop_connection(&clients[1]);
    advance(Duration::from_secs(10)).await;
    let bob = table.connect();
    table.send(&bob, json!({"type": "reconnect", "token": token}));

    assert!(!table.coordinator.timer_active("disconnect_grace:Bob"));
    let state = clients[0].last_state();
    let bob_view = &state["players"][1];
    assert_eq!(bob_view["name"], "Bob");
    assert_eq!(bob_view["connected"], true);
}

#[tokio::test(start_paused = true)]
async fn only_long_gone_players_can_be_removed() {
    let mut table = Table::new();
    let mut clients = seat_four(&mut table);
    let token = clients[1].messages()[0]["token"].as_str().unwrap().to_owned();

    table.drop_connection(&clients[1]);
    assert_eq!(table.fire_next().await, "disconnect_grace:Bob");
    assert!(!table.coordinator.session().participant("Bob").unwrap().connected);

    let remove = json!({"action": "removePlayer", "playerName": "Bob"});
    table.admin(&clients[0], remove.clone());
    assert_eq!(clients[0].last_error(), "CANNOT_REMOVE_CONNECTED");

    advance(Duration::from_secs(45)).await;
    table.admin(&clients[0], remove.clone());
    assert_eq!(clients[0].last_error(), "CANNOT_REMOVE_CONNECTED");

    advance(Duration::from_secs(16)).await;
    table.admin(&clients[0], remove);
    assert!(table.coordinator.session().participant("Bob").is_none());
    assert_eq!(clients[0].last_state()["players"].as_array().unwrap().len(), 3);

    let mut bob = table.connect();
    table.send(&bob, json!({"type": "reconnect", "token": token}));
    assert_eq!(bob.last_error(), "INVALID_TOKEN");
}

#[tokio::test(start_paused = true)]
async fn reconnecting_after_the_window_fails() {
    let mut table = Table::new();
    let mut clients = seat_four(&mut table);
    let token = clients[2].messages()[0]["token"].as_str().unwrap().to_owned();

    table.drop_connection(&clients[2]);
    assert_eq!(table.fire_next().await, "disconnect_grace:Cat");
    advance(Duration::from_secs(301)).await;

    let mut cat = table.connect();
    table.send(&cat, json!({"type": "reconnect", "token": token}));
    assert_eq!(cat.last_error(), "SESSION_EXPIRED");
}

#[tokio::test(start_paused = true)]
async fn joining_under_a_taken_name_replaces_the_old_connection() {
    let mut table = Table::new();
    let mut first = table.join("Ann");
    let first_token = first.messages()[0]["token"].as_str().unwrap().to_owned();

    let mut second = table.join("Ann");
    let grant = second.messages()[0].clone();
    assert_eq!(grant["type"], "joined");
    assert_eq!(grant["isHost"], true);
    assert_ne!(grant["token"], first_token.as_str());

    let closed = first.frames().into_iter().any(|frame| {
        matches!(frame, Outbound::Close { code, .. } if code == CLOSE_SESSION_REPLACED)
    });
    assert!(closed);
    assert_eq!(table.coordinator.session().participants.len(), 1);

    let mut stale = table.connect();
    table.send(&stale, json!({"type": "reconnect", "token": first_token}));
    assert_eq!(stale.last_error(), "INVALID_TOKEN");
}

#[tokio::test(start_paused = true)]
async fn starting_needs_four_connected_players() {
    let mut table = Table::new();
    let mut host = table.join("Ann");
    table.join("Bob");
    table.join("Cat");

    table.admin(&host, json!({"action": "startGame"}));
    assert_eq!(host.last_error(), "NOT_ENOUGH_PLAYERS");
    assert_eq!(table.phase(), GamePhase::Lobby);

    let mut stranger = table.connect();
    table.send(&stranger, json!({"type": "callVote"}));
    assert_eq!(stranger.last_error(), "NOT_IN_GAME");
}

#[tokio::test(start_paused = true)]
async fn a_manual_stop_ends_mid_round() {
    let mut table = Table::new();
    let mut clients = questioning(&mut table).await;
    table.admin(&clients[0], json!({"action": "endGame"}));
    assert_eq!(table.phase(), GamePhase::End);
    assert!(!table.coordinator.timer_active("round"));

    let state = clients[1].last_state();
    assert_eq!(state["phase"], "END");
    assert!(state.get("reveal").is_none());
    assert!(state.get("role").is_none());
    assert_eq!(state["summary"]["stats"]["roundsPlayed"], 0);
}

#[tokio::test(start_paused = true)]
async fn scores_carry_into_the_second_round() {
    let mut table = Table::new();
    let mut clients = seat_four(&mut table);
    table.admin(
        &clients[0],
        json!({"action": "configure", "field": "numRounds", "value": 2}),
    );
    table.admin(&clients[0], json!({"action": "startGame"}));
    assert_eq!(table.fire_next().await, "role_display");

    table.send(&clients[2], json!({"type": "callVote"}));
    assert_eq!(table.phase(), GamePhase::Vote);
    table.send(&clients[3], json!({"type": "callVote"}));
    assert_eq!(clients[3].last_error(), "INVALID_PHASE");
    assert_eq!(clients[0].last_state()["voting"]["calledBy"], "Cat");

    let impostor = table.impostor();
    let crew: Vec<&str> = NAMES.iter().copied().filter(|name| *name != impostor).collect();
    for name in &crew {
        let vote = json!({"type": "vote", "target": impostor, "confidence": 1});
        table.send(&clients[index_of(name)], vote);
    }
    table.send(
        &clients[index_of(&impostor)],
        json!({"type": "vote", "target": crew[0], "confidence": 1}),
    );
    assert_eq!(table.phase(), GamePhase::Reveal);

    assert_eq!(table.fire_next().await, "reveal");
    assert_eq!(table.fire_next().await, "scoring");
    assert_eq!(table.phase(), GamePhase::Roles);
    let state = clients[1].last_state();
    assert_eq!(state["round"]["current"], 2);
    assert!(state.get("reveal").is_none());
    assert!(state["role"].is_object());
    for name in &crew {
        assert_eq!(table.score(name), 2);
    }
    assert_eq!(table.score(&impostor), -1);

    assert_eq!(table.fire_next().await, "role_display");
    assert_eq!(table.fire_next().await, "round");
    assert_eq!(table.fire_next().await, "vote");
    assert_eq!(table.phase(), GamePhase::Reveal);
    assert!(clients[0].last_state()["reveal"]["convicted"].is_null());

    assert_eq!(table.fire_next().await, "reveal");
    assert_eq!(table.fire_next().await, "scoring");
    assert_eq!(table.phase(), GamePhase::End);
    for name in &crew {
        assert_eq!(table.score(name), 2);
    }
    assert_eq!(table.score(&impostor), -1);
    let summary = clients[0].last_state()["summary"].clone();
    assert_eq!(summary["stats"]["roundsPlayed"], 2);
    assert_eq!(summary["rounds"].as_array().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn a_mid_round_reconnect_keeps_role_score_and_ballot() {
    let mut table = Table::new();
    let mut clients = questioning(&mut table).await;
    table.send(&clients[0], json!({"type": "callVote"}));

    let impostor = table.impostor();
    let seat = (1..NAMES.len())
        .find(|index| NAMES[*index] != impostor)
        .unwrap();
    let name = NAMES[seat];
    table.send(
        &clients[seat],
        json!({"type": "vote", "target": impostor, "confidence": 2}),
    );
    let before = clients[seat].last_state();
    assert_eq!(before["voting"]["myBallot"]["confidence"], 2);
    let token = table
        .coordinator
        .session()
        .participant(name)
        .unwrap()
        .token
        .clone();

    table.drop_connection(&clients[seat]);
    assert_eq!(table.fire_next().await, format!("disconnect_grace:{name}"));
    assert!(!table.coordinator.session().participant(name).unwrap().connected);
    assert_eq!(table.phase(), GamePhase::Vote);

    advance(Duration::from_secs(10)).await;
    let mut back = table.connect();
    table.send(&back, json!({"type": "reconnect", "token": token}));
    let after = back.last_state();
    assert_eq!(after["me"]["name"], name);
    assert_eq!(after["role"], before["role"]);
    assert_eq!(after["voting"]["myBallot"], before["voting"]["myBallot"]);
    assert_eq!(after["me"]["score"], before["me"]["score"]);
    assert!(table.coordinator.session().participant(name).unwrap().connected);
}

#[tokio::test(start_paused = true)]
async fn a_host_pause_freezes_the_round_clock() {
    let mut table = Table::new();
    let mut clients = questioning(&mut table).await;
    advance(Duration::from_secs(100)).await;

    table.admin(&clients[1], json!({"action": "pause"}));
    assert_eq!(clients[1].last_error(), "NOT_HOST");
    table.admin(&clients[0], json!({"action": "pause"}));
    assert_eq!(table.phase(), GamePhase::Paused);
    assert!(!table.coordinator.timer_active("round"));
    let state = clients[2].last_state();
    assert_eq!(state["paused"]["resumeTo"], "QUESTIONING");
    assert_eq!(state["timer"]["frozen"], true);
    assert_eq!(state["timer"]["remainingSecs"], 320);

    advance(Duration::from_secs(600)).await;
    let view = table.coordinator.view_for(Some("Cat"), Instant::now());
    let view = serde_json::to_value(view).unwrap();
    assert_eq!(view["timer"]["remainingSecs"], 320);

    table.admin(&clients[0], json!({"action": "resume"}));
    assert_eq!(table.phase(), GamePhase::Questioning);
    let state = clients[2].last_state();
    assert!(state.get("paused").is_none());
    assert_eq!(state["timer"]["frozen"], false);
    assert_eq!(state["timer"]["remainingSecs"], 320);

    let resumed_at = Instant::now();
    assert_eq!(table.fire_next().await, "round");
    assert_eq!(table.phase(), GamePhase::Vote);
    let waited = resumed_at.elapsed();
    assert!(waited >= Duration::from_secs(320) && waited < Duration::from_secs(321));
}

#[tokio::test(start_paused = true)]
async fn six_players_share_one_location_and_one_impostor() {
    const SIX: [&str; 6] = ["Ann", "Bob", "Cat", "Dan", "Eve", "Fay"];
    let mut table = Table::new();
    let mut clients: Vec<Client> = SIX.iter().map(|name| table.join(name)).collect();
    table.admin(&clients[0], json!({"action": "startGame"}));
    assert_eq!(table.phase(), GamePhase::Roles);

    let impostor = table.impostor();
    let location = table.location();
    let mut impostors = 0;
    for (name, client) in SIX.iter().zip(clients.iter_mut()) {
        let role = client.last_state()["role"].clone();
        if role["isImpostor"] == true {
            impostors += 1;
            assert_eq!(*name, impostor);
            assert!(role.get("location").is_none());
            assert!(role["candidateLocations"].as_array().unwrap().len() > 1);
        } else {
            assert_eq!(role["location"], location.as_str());
            assert!(role.get("candidateLocations").is_none());
            let own = role["role"].as_str().unwrap();
            assert!(!role["otherRoles"].as_array().unwrap().iter().any(|other| other == own));
        }
    }
    assert_eq!(impostors, 1);

    assert_eq!(table.fire_next().await, "role_display");
    table.send(&clients[5], json!({"type": "callVote"}));
    assert_eq!(clients[0].last_state()["voting"]["expected"], 6);

    table.send(
        &clients[0],
        json!({"type": "vote", "target": "Bob", "confidence": 256}),
    );
    assert_eq!(clients[0].last_error(), "INVALID_CONFIDENCE");
}

#[tokio::test(start_paused = true)]
async fn a_late_join_is_refused_before_the_name_is_checked() {
    let mut table = Table::new();
    let _clients = questioning(&mut table).await;
    let mut late = table.connect();
    table.send(&late, json!({"type": "join", "name": ""}));
    assert_eq!(late.last_error(), "GAME_ALREADY_STARTED");
}

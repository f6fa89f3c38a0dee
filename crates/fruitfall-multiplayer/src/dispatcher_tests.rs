use super::*;
use crate::store::{MemoryRoomStore, RoomRecord, StoreError};
use fruitfall_net::{ConnectionId, GameOverReason, ModeKind, PlayerId, RoomId, RoomStatus};
use fruitfall_physics::BoardSnapshot;
use tokio::sync::mpsc;

struct Client {
    session: ConnectionSession,
    rx: mpsc::Receiver<ServerMessage>,
}

impl Client {
    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn kinds(&mut self) -> Vec<&'static str> {
        self.drain().iter().map(ServerMessage::kind).collect()
    }
}

fn dispatcher() -> Dispatcher {
    Dispatcher::new(
        Arc::new(RoomRegistry::new()),
        Arc::new(LobbyBroadcaster::new()),
        Arc::new(MemoryRoomStore::new()),
        DispatchConfig::default(),
    )
}

fn connect(dispatcher: &Dispatcher, conn: u64, who: &str) -> Client {
    let (session, rx) =
        ConnectionSession::new(ConnectionId(conn), PlayerId::from(who), who.to_uppercase(), 64);
    dispatcher.on_open(&session);
    let mut client = Client { session, rx };
    assert_eq!(client.kinds(), vec!["rooms_list"]);
    client
}

fn create(dispatcher: &Dispatcher, client: &mut Client, name: &str) -> RoomId {
    dispatcher.handle(
        &client.session,
        ClientMessage::CreateRoom {
            name: name.into(),
            password: None,
            game_mode: None,
        },
    );
    client
        .drain()
        .into_iter()
        .find_map(|msg| match msg {
            ServerMessage::RoomJoined { room } => Some(room.id),
            _ => None,
        })
        .expect("room_joined")
}

fn join(dispatcher: &Dispatcher, client: &Client, room_id: &RoomId) {
    dispatcher.handle(
        &client.session,
        ClientMessage::JoinRoom {
            room_id: room_id.clone(),
            password: None,
        },
    );
}

/// alice and bob in one started room, inboxes drained.
fn started(dispatcher: &Dispatcher) -> (Client, Client, RoomId) {
    let mut alice = connect(dispatcher, 1, "alice");
    let mut bob = connect(dispatcher, 2, "bob");
    let room_id = create(dispatcher, &mut alice, "den");
    join(dispatcher, &bob, &room_id);
    dispatcher.handle(&alice.session, ClientMessage::ToggleReady);
    dispatcher.handle(&bob.session, ClientMessage::ToggleReady);
    alice.drain();
    bob.drain();
    (alice, bob, room_id)
}

fn state_update(score: u64, seq: u64, forced: bool) -> ClientMessage {
    ClientMessage::GameStateUpdate {
        score,
        moves: seq as u32,
        game_state: BoardSnapshot {
            score,
            ..Default::default()
        },
        seq,
        forced,
    }
}

fn error_code(msgs: &[ServerMessage]) -> Option<ErrorCode> {
    msgs.iter().find_map(|msg| match msg {
        ServerMessage::Error { code, .. } => Some(*code),
        _ => None,
    })
}

#[test]
fn test_list_rooms_replies_to_sender() {
    let dispatcher = dispatcher();
    let mut alice = connect(&dispatcher, 1, "alice");
    let mut bob = connect(&dispatcher, 2, "bob");
    dispatcher.handle(&alice.session, ClientMessage::ListRooms);
    assert_eq!(alice.kinds(), vec!["rooms_list"]);
    assert!(bob.drain().is_empty());
}

#[test]
fn test_create_room_joins_creator_and_updates_lobby() {
    let dispatcher = dispatcher();
    let mut alice = connect(&dispatcher, 1, "alice");
    let mut bob = connect(&dispatcher, 2, "bob");

    dispatcher.handle(
        &alice.session,
        ClientMessage::CreateRoom {
            name: "  den ".into(),
            password: Some("pw".into()),
            game_mode: Some(GameMode {
                kind: ModeKind::Time,
                limit: 90,
            }),
        },
    );

    let msgs = alice.drain();
    let ServerMessage::RoomJoined { room } = &msgs[0] else {
        panic!("expected room_joined first, got {msgs:?}");
    };
    assert_eq!(room.name, "den");
    assert!(room.has_password);
    assert_eq!(room.game_mode.kind, ModeKind::Time);
    assert_eq!(room.player_count, 1);
    assert_eq!(msgs[1].kind(), "rooms_list", "actor also gets the lobby push");

    let ServerMessage::RoomsList { rooms } = &bob.drain()[0] else {
        panic!("bob should see the lobby push");
    };
    assert_eq!(rooms.len(), 1);
}

#[test]
fn test_create_room_validation() {
    let dispatcher = dispatcher();
    let mut alice = connect(&dispatcher, 1, "alice");
    dispatcher.handle(
        &alice.session,
        ClientMessage::CreateRoom {
            name: "   ".into(),
            password: None,
            game_mode: None,
        },
    );
    assert_eq!(error_code(&alice.drain()), Some(ErrorCode::InvalidMessage));

    dispatcher.handle(
        &alice.session,
        ClientMessage::CreateRoom {
            name: "den".into(),
            password: None,
            game_mode: Some(GameMode {
                kind: ModeKind::Moves,
                limit: 0,
            }),
        },
    );
    assert_eq!(error_code(&alice.drain()), Some(ErrorCode::InvalidMessage));
    assert!(dispatcher.registry().is_empty());
}

struct BrokenStore;

impl RoomStore for BrokenStore {
    fn create(&self, _: &str, _: bool, _: GameMode) -> Result<RoomRecord, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
}

#[test]
fn test_store_failure_is_reported() {
    let dispatcher = Dispatcher::new(
        Arc::new(RoomRegistry::new()),
        Arc::new(LobbyBroadcaster::new()),
        Arc::new(BrokenStore),
        DispatchConfig::default(),
    );
    let mut alice = connect(&dispatcher, 1, "alice");
    dispatcher.handle(
        &alice.session,
        ClientMessage::CreateRoom {
            name: "den".into(),
            password: None,
            game_mode: None,
        },
    );
    assert_eq!(error_code(&alice.drain()), Some(ErrorCode::Storage));
    assert!(dispatcher.registry().is_empty());
}

#[test]
fn test_join_notifies_other_member() {
    let dispatcher = dispatcher();
    let mut alice = connect(&dispatcher, 1, "alice");
    let mut bob = connect(&dispatcher, 2, "bob");
    let room_id = create(&dispatcher, &mut alice, "den");
    bob.drain();

    join(&dispatcher, &bob, &room_id);
    assert_eq!(bob.kinds(), vec!["room_joined", "rooms_list"]);
    assert_eq!(alice.kinds(), vec!["room_update", "rooms_list"]);
}

#[test]
fn test_join_errors_change_nothing() {
    let dispatcher = dispatcher();
    let mut alice = connect(&dispatcher, 1, "alice");
    let mut bob = connect(&dispatcher, 2, "bob");
    let mut carol = connect(&dispatcher, 3, "carol");

    join(&dispatcher, &alice, &RoomId::from("missing"));
    assert_eq!(error_code(&alice.drain()), Some(ErrorCode::RoomNotFound));

    let room_id = create(&dispatcher, &mut alice, "den");
    join(&dispatcher, &bob, &room_id);
    bob.drain();
    carol.drain();
    alice.drain();

    join(&dispatcher, &carol, &room_id);
    let msgs = carol.drain();
    assert_eq!(msgs.len(), 1, "error goes to the sender only: {msgs:?}");
    assert_eq!(error_code(&msgs), Some(ErrorCode::RoomFull));
    assert!(alice.drain().is_empty());
    assert!(bob.drain().is_empty());
}

#[test]
fn test_wrong_password() {
    let dispatcher = dispatcher();
    let alice = connect(&dispatcher, 1, "alice");
    let mut bob = connect(&dispatcher, 2, "bob");
    dispatcher.handle(
        &alice.session,
        ClientMessage::CreateRoom {
            name: "vault".into(),
            password: Some("pw".into()),
            game_mode: None,
        },
    );
    let room_id = dispatcher.registry().room_of(&PlayerId::from("alice")).unwrap();
    bob.drain();

    dispatcher.handle(
        &bob.session,
        ClientMessage::JoinRoom {
            room_id,
            password: Some("guess".into()),
        },
    );
    assert_eq!(error_code(&bob.drain()), Some(ErrorCode::SecretMismatch));
}

#[test]
fn test_ready_handshake_starts_game_once() {
    let dispatcher = dispatcher();
    let mut alice = connect(&dispatcher, 1, "alice");
    let mut bob = connect(&dispatcher, 2, "bob");
    let room_id = create(&dispatcher, &mut alice, "den");
    join(&dispatcher, &bob, &room_id);
    alice.drain();
    bob.drain();

    dispatcher.handle(&alice.session, ClientMessage::ToggleReady);
    assert_eq!(alice.kinds(), vec!["room_update"]);
    assert_eq!(bob.kinds(), vec!["room_update"]);

    dispatcher.handle(&bob.session, ClientMessage::ToggleReady);
    for client in [&mut alice, &mut bob] {
        let msgs = client.drain();
        let starts: Vec<_> = msgs
            .iter()
            .filter_map(|msg| match msg {
                ServerMessage::GameStart { game_mode, room } => Some((*game_mode, room.status)),
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec![(GameMode::default(), RoomStatus::Playing)]);
    }

    dispatcher.handle(&bob.session, ClientMessage::ToggleReady);
    assert!(alice.drain().is_empty(), "no room_update once playing");
    assert_eq!(error_code(&bob.drain()), Some(ErrorCode::NotWaiting));
}

#[test]
fn test_toggle_ready_outside_room() {
    let dispatcher = dispatcher();
    let mut alice = connect(&dispatcher, 1, "alice");
    dispatcher.handle(&alice.session, ClientMessage::ToggleReady);
    assert_eq!(error_code(&alice.drain()), Some(ErrorCode::NotInRoom));
}

#[test]
fn test_state_updates_are_throttled() {
    let dispatcher = dispatcher();
    let (alice, mut bob, _) = started(&dispatcher);

    dispatcher.handle(&alice.session, state_update(10, 1, false));
    dispatcher.handle(&alice.session, state_update(20, 2, false));
    dispatcher.handle(&alice.session, state_update(30, 3, true));

    let seqs: Vec<u64> = bob
        .drain()
        .into_iter()
        .filter_map(|msg| match msg {
            ServerMessage::OpponentGameState {
                seq,
                player_id,
                player_name,
                ..
            } => {
                assert_eq!(player_id, PlayerId::from("alice"));
                assert_eq!(player_name, "ALICE");
                Some(seq)
            }
            _ => None,
        })
        .collect();
    assert_eq!(seqs, vec![1, 3], "second update falls inside the window");
}

#[test]
fn test_relays_skip_sender() {
    let dispatcher = dispatcher();
    let (mut alice, mut bob, _) = started(&dispatcher);

    dispatcher.handle(
        &alice.session,
        ClientMessage::FruitDrop {
            x: 123.0,
            fruit_type: 2,
            timestamp: 99,
            seq: 4,
        },
    );
    dispatcher.handle(
        &alice.session,
        ClientMessage::FruitDrop {
            x: 50.0,
            fruit_type: 1,
            timestamp: 100,
            seq: 5,
        },
    );

    assert!(alice.drain().is_empty());
    let drops: Vec<_> = bob
        .drain()
        .into_iter()
        .filter_map(|msg| match msg {
            ServerMessage::OpponentFruitDrop { x, fruit_type, seq, .. } => {
                Some((x, fruit_type, seq))
            }
            _ => None,
        })
        .collect();
    assert_eq!(drops, vec![(123.0, 2, 4), (50.0, 1, 5)], "drops are never throttled");
}

#[test]
fn test_game_over_from_both_players_ends_room() {
    let dispatcher = dispatcher();
    let (mut alice, mut bob, room_id) = started(&dispatcher);

    dispatcher.handle(
        &alice.session,
        ClientMessage::GameOver {
            score: 40,
            reason: GameOverReason::Overflow,
        },
    );
    assert_eq!(bob.kinds(), vec!["room_update"]);
    alice.drain();

    dispatcher.handle(
        &bob.session,
        ClientMessage::GameOver {
            score: 75,
            reason: GameOverReason::LimitReached,
        },
    );
    for client in [&mut alice, &mut bob] {
        let msgs = client.drain();
        let end = msgs
            .iter()
            .find_map(|msg| match msg {
                ServerMessage::GameEnd { winner, room, .. } => Some((winner.clone(), room.status)),
                _ => None,
            })
            .expect("game_end");
        assert_eq!(end, (Some(PlayerId::from("bob")), RoomStatus::Finished));
    }
    assert_eq!(
        dispatcher.registry().room_view(&room_id).unwrap().status,
        RoomStatus::Finished
    );
}

#[test]
fn test_malformed_frame_gets_error() {
    let dispatcher = dispatcher();
    let mut alice = connect(&dispatcher, 1, "alice");
    dispatcher.handle_frame(&alice.session, br#"{"type":"launch_rockets"}"#);
    dispatcher.handle_frame(&alice.session, b"not json");
    let msgs = alice.drain();
    assert_eq!(msgs.len(), 2);
    assert!(msgs.iter().all(|m| matches!(
        m,
        ServerMessage::Error {
            code: ErrorCode::InvalidMessage,
            ..
        }
    )));
}

#[test]
fn test_second_hello_is_refused() {
    let dispatcher = dispatcher();
    let mut alice = connect(&dispatcher, 1, "alice");
    dispatcher.handle(&alice.session, ClientMessage::Hello { token: "t".into() });
    assert_eq!(error_code(&alice.drain()), Some(ErrorCode::InvalidMessage));
}

#[test]
fn test_close_in_waiting_room_removes_player() {
    let dispatcher = dispatcher();
    let mut alice = connect(&dispatcher, 1, "alice");
    let mut bob = connect(&dispatcher, 2, "bob");
    let room_id = create(&dispatcher, &mut alice, "den");
    join(&dispatcher, &bob, &room_id);
    alice.drain();

    dispatcher.on_close(&bob.session);
    let msgs = alice.drain();
    let ServerMessage::RoomUpdate { room } = &msgs[0] else {
        panic!("expected room_update, got {msgs:?}");
    };
    assert_eq!(room.player_count, 1);
    assert_eq!(msgs[1].kind(), "rooms_list");
    assert_eq!(dispatcher.lobby().len(), 1);
    assert!(bob.drain().iter().all(|m| m.kind() != "room_update"));
}

#[test]
fn test_close_mid_game_detaches_and_rejoin_resumes() {
    let dispatcher = dispatcher();
    let (mut alice, bob, room_id) = started(&dispatcher);

    dispatcher.on_close(&bob.session);
    let msgs = alice.drain();
    let ServerMessage::RoomUpdate { room } = &msgs[0] else {
        panic!("expected room_update, got {msgs:?}");
    };
    assert_eq!(room.player_count, 2);
    assert!(!room.players.iter().find(|p| p.id.0 == "bob").unwrap().connected);

    dispatcher.handle(
        &alice.session,
        ClientMessage::FruitDrop {
            x: 1.0,
            fruit_type: 0,
            timestamp: 1,
            seq: 1,
        },
    );
    assert!(error_code(&alice.drain()).is_none(), "relay to a detached peer is skipped");

    let mut bob2 = connect(&dispatcher, 9, "bob");
    join(&dispatcher, &bob2, &room_id);
    let msgs = bob2.drain();
    let ServerMessage::RoomJoined { room } = &msgs[0] else {
        panic!("expected room_joined, got {msgs:?}");
    };
    assert_eq!(room.status, RoomStatus::Playing);
    assert!(room.players.iter().all(|p| p.connected));
}

#[test]
fn test_stale_close_does_not_disturb_new_connection() {
    let dispatcher = dispatcher();
    let (_alice, bob, room_id) = started(&dispatcher);

    let bob2 = connect(&dispatcher, 9, "bob");
    join(&dispatcher, &bob2, &room_id);
    dispatcher.on_close(&bob.session);

    let view = dispatcher.registry().room_view(&room_id).unwrap();
    assert!(view.players.iter().all(|p| p.connected));
    assert_eq!(
        dispatcher
            .lobby()
            .session_for(&PlayerId::from("bob"))
            .unwrap()
            .id(),
        ConnectionId(9)
    );
}

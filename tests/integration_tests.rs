//! Integration tests for the query client and handshake state machine.
//!
//! These tests stand up a mock GoldSrc server on a real UDP socket and
//! validate the full request/response cycles against crafted wire fixtures.

use client::handshake::{Session, SessionConfig};
use client::query::QueryClient;
use client::session::SessionEvent;
use shared::{packets, ConnectionState, PlayerSource};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

const MOCK_CHALLENGE_TOKEN: [u8; 4] = [0xAA, 0xBB, 0xCC, 0xDD];
const MOCK_HANDSHAKE_CHALLENGE: i64 = 123456;

#[derive(Clone, Copy, Default)]
struct MockBehavior {
    /// Ignore the current-style 0x55 challenge request; only honor 0x57.
    legacy_challenge_only: bool,
    /// Answer the player query with the legacy 0x44 type byte.
    legacy_player_type: bool,
    /// Answer A2S_INFO with bytes that are not a connectionless packet.
    garbage_info: bool,
    /// Answer the connect command with an S2C rejection instead of traffic.
    reject_connect: bool,
    /// Send the handshake challenge response twice.
    double_challenge: bool,
    /// After `new`, send a netchannel payload carrying chat-like text.
    chat_after_new: bool,
}

struct MockServer {
    addr: SocketAddr,
    /// Every datagram the mock received, in order.
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Text of every connect command seen.
    connects: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    fn received_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    fn connect_commands(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }
}

fn info_response() -> Vec<u8> {
    let mut r = vec![0xFF, 0xFF, 0xFF, 0xFF, 0x49, 48];
    r.extend_from_slice(b"Test Server\0de_dust2\0cstrike\0Counter-Strike\0");
    r.extend_from_slice(&10u16.to_le_bytes());
    r.extend_from_slice(&[5, 16, 0]); // players, max, bots
    r.extend_from_slice(&[b'd', b'l', 0, 1]);
    r.extend_from_slice(b"1.1.2.7\0");
    r.push(0x20); // EDF: keywords only
    r.extend_from_slice(b"secure,fastdl\0");
    r
}

fn player_response(msg_type: u8) -> Vec<u8> {
    let mut r = vec![0xFF, 0xFF, 0xFF, 0xFF, msg_type, 2];
    r.push(0);
    r.extend_from_slice(b"alpha\0");
    r.extend_from_slice(&17i32.to_le_bytes());
    r.extend_from_slice(&120.5f32.to_le_bytes());
    r.push(1);
    r.extend_from_slice(b"bravo\0");
    r.extend_from_slice(&(-3i32).to_le_bytes());
    r.extend_from_slice(&9.25f32.to_le_bytes());
    r
}

/// A netchannel-looking packet: anything not starting with 0xFFFFFFFF.
fn netchannel_packet(body: &[u8]) -> Vec<u8> {
    let mut r = vec![0x10, 0x00, 0x00, 0x00, 0x0F, 0x00, 0x00, 0x00];
    r.extend_from_slice(body);
    r
}

async fn spawn_mock_server(behavior: MockBehavior) -> MockServer {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let connects = Arc::new(Mutex::new(Vec::new()));

    let received_log = Arc::clone(&received);
    let connect_log = Arc::clone(&connects);

    tokio::spawn(async move {
        let mut buf = [0u8; 2048];

        loop {
            let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                break;
            };
            let data = buf[..len].to_vec();
            received_log.lock().unwrap().push(data.clone());

            if data.len() < 5 || data[..4] != [0xFF, 0xFF, 0xFF, 0xFF] {
                continue;
            }
            let msg = &data[4..];

            match msg[0] {
                b'T' => {
                    if behavior.garbage_info {
                        socket.send_to(b"not a valid response", peer).await.unwrap();
                    } else {
                        socket.send_to(&info_response(), peer).await.unwrap();
                    }
                }
                0x55 if msg.len() == 5 && msg[1..] == [0xFF, 0xFF, 0xFF, 0xFF] => {
                    // current-style challenge request
                    if !behavior.legacy_challenge_only {
                        let mut r = vec![0xFF, 0xFF, 0xFF, 0xFF, 0x41];
                        r.extend_from_slice(&MOCK_CHALLENGE_TOKEN);
                        socket.send_to(&r, peer).await.unwrap();
                    }
                }
                0x57 => {
                    let mut r = vec![0xFF, 0xFF, 0xFF, 0xFF, 0x41];
                    r.extend_from_slice(&MOCK_CHALLENGE_TOKEN);
                    socket.send_to(&r, peer).await.unwrap();
                }
                0x55 if msg.len() == 5 && msg[1..] == MOCK_CHALLENGE_TOKEN => {
                    let msg_type = if behavior.legacy_player_type { 0x44 } else { 0x55 };
                    socket.send_to(&player_response(msg_type), peer).await.unwrap();
                }
                _ => {
                    let text = String::from_utf8_lossy(msg).to_string();

                    if text.starts_with("getchallenge") {
                        let payload =
                            format!("A00000000 {} 3", MOCK_HANDSHAKE_CHALLENGE);
                        let mut r = vec![0xFF, 0xFF, 0xFF, 0xFF];
                        r.extend_from_slice(payload.as_bytes());
                        socket.send_to(&r, peer).await.unwrap();
                        if behavior.double_challenge {
                            socket.send_to(&r, peer).await.unwrap();
                        }
                    } else if text.starts_with("connect ") {
                        connect_log.lock().unwrap().push(text);
                        if behavior.reject_connect {
                            let mut r = vec![0xFF, 0xFF, 0xFF, 0xFF, b'B'];
                            r.extend_from_slice(b"You are banned");
                            socket.send_to(&r, peer).await.unwrap();
                        } else {
                            socket
                                .send_to(&netchannel_packet(b"\x00\x00svc payload"), peer)
                                .await
                                .unwrap();
                        }
                    } else if text.starts_with("new") && behavior.chat_after_new {
                        socket
                            .send_to(&netchannel_packet(b"gamer : hello from the server"), peer)
                            .await
                            .unwrap();
                    }
                }
            }
        }
    });

    MockServer {
        addr,
        received,
        connects,
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("event channel closed")
}

async fn wait_for_state(
    rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    wanted: ConnectionState,
) {
    loop {
        if let SessionEvent::StateChanged(state) = next_event(rx).await {
            if state == wanted {
                return;
            }
        }
    }
}

/// QUERY CLIENT TESTS
mod query_tests {
    use super::*;

    #[tokio::test]
    async fn query_full_end_to_end() {
        let mock = spawn_mock_server(MockBehavior::default()).await;
        let query = QueryClient::new(Duration::from_millis(300));

        let info = query
            .query_full("127.0.0.1", mock.addr.port())
            .await
            .expect("server should be available");

        assert_eq!(info.server_name, "Test Server");
        assert_eq!(info.map_name, "de_dust2");
        assert_eq!(info.player_count, Some(5));
        assert_eq!(info.max_players, Some(16));
        assert_eq!(info.free_slots(), Some(11));
        assert_eq!(info.tags, "secure,fastdl");

        assert_eq!(info.players.len(), 2);
        assert_eq!(info.players[0].name, "alpha");
        assert_eq!(info.players[1].name, "bravo");
        assert_eq!(info.players[0].source, PlayerSource::QueryProtocol);
    }

    #[tokio::test]
    async fn legacy_challenge_variant_still_yields_players() {
        // Server ignores the 0x55 challenge request, only honors 0x57, and
        // answers the final query with the legacy 0x44 type byte.
        let mock = spawn_mock_server(MockBehavior {
            legacy_challenge_only: true,
            legacy_player_type: true,
            ..Default::default()
        })
        .await;
        let query = QueryClient::new(Duration::from_millis(200));

        let players = query.query_players("127.0.0.1", mock.addr.port()).await;

        assert_eq!(players.len(), 2);
        assert_eq!(players[0].name, "alpha");
        assert_eq!(players[0].score, 17);
        assert_eq!(players[1].score, -3);
    }

    #[tokio::test]
    async fn malformed_info_response_degrades_to_unavailable() {
        let mock = spawn_mock_server(MockBehavior {
            garbage_info: true,
            ..Default::default()
        })
        .await;
        let query = QueryClient::new(Duration::from_millis(200));

        assert!(query.query_info("127.0.0.1", mock.addr.port()).await.is_none());
    }
}

/// HANDSHAKE STATE MACHINE TESTS
mod handshake_tests {
    use super::*;

    fn config_for(mock: &MockServer) -> SessionConfig {
        SessionConfig {
            host: "127.0.0.1".to_string(),
            port: mock.addr.port(),
            nickname: "Player".to_string(),
        }
    }

    #[tokio::test]
    async fn handshake_walks_to_connected_with_exactly_one_connect() {
        // The challenge response arrives twice; the duplicate must not
        // trigger a second connect command.
        let mock = spawn_mock_server(MockBehavior {
            double_challenge: true,
            chat_after_new: true,
            ..Default::default()
        })
        .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Session::connect(config_for(&mock), tx).await.unwrap();

        wait_for_state(&mut rx, ConnectionState::ChallengeRequested).await;
        wait_for_state(&mut rx, ConnectionState::Connecting).await;
        wait_for_state(&mut rx, ConnectionState::Connected).await;

        // The connect command embeds the challenge from the payload.
        let connects = mock.connect_commands();
        assert_eq!(connects.len(), 1);
        let (protocol, challenge, _auth, user) =
            packets::parse_connect_command(&connects[0]).expect("connect command must tokenize");
        assert_eq!(protocol, 48);
        assert_eq!(challenge, MOCK_HANDSHAKE_CHALLENGE);
        assert!(user.contains(&("name".to_string(), "Player".to_string())));

        // Chat heuristic surfaces the crafted netchannel payload.
        let chat = loop {
            match next_event(&mut rx).await {
                SessionEvent::Chat { text } => break text,
                _ => continue,
            }
        };
        assert!(chat.contains("hello from the server"));

        session.close().await;
        assert_eq!(session.state().await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn rejection_packet_closes_the_session() {
        let mock = spawn_mock_server(MockBehavior {
            reject_connect: true,
            ..Default::default()
        })
        .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Session::connect(config_for(&mock), tx).await.unwrap();

        let reason = loop {
            match next_event(&mut rx).await {
                SessionEvent::Rejected { reason } => break reason,
                _ => continue,
            }
        };
        assert!(reason.contains("banned"));

        wait_for_state(&mut rx, ConnectionState::Closed).await;
        assert_eq!(session.state().await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn close_cancels_background_tasks_and_stops_all_traffic() {
        let mock = spawn_mock_server(MockBehavior::default()).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Session::connect(config_for(&mock), tx).await.unwrap();
        wait_for_state(&mut rx, ConnectionState::Connected).await;

        // Close right after connecting: the scheduled post-join commands
        // (first one due at +1.0s) must never go out. The short settle sleep
        // lets the in-flight `new` datagram land before the snapshot.
        session.close().await;
        sleep(Duration::from_millis(100)).await;
        let packets_at_close = mock.received_count();

        sleep(Duration::from_millis(1300)).await;
        assert_eq!(mock.received_count(), packets_at_close);
    }

    #[tokio::test]
    async fn close_mid_handshake_is_safe() {
        // A server that never answers: the session stays in
        // ChallengeRequested until explicitly closed.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Session::connect(
            SessionConfig {
                host: "127.0.0.1".to_string(),
                port,
                nickname: "Player".to_string(),
            },
            tx,
        )
        .await
        .unwrap();

        wait_for_state(&mut rx, ConnectionState::ChallengeRequested).await;
        session.close().await;
        wait_for_state(&mut rx, ConnectionState::Closed).await;
        assert_eq!(session.state().await, ConnectionState::Closed);
    }
}

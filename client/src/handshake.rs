//! Connection handshake state machine for a single GoldSrc session.
//!
//! Drives the connectionless exchange a client performs before it counts as
//! joined: `getchallenge` -> `S2C_CHALLENGE` -> `connect` -> scripted
//! post-join commands. No sequenced netchannel is reconstructed; the first
//! inbound packet without the connectionless marker is taken as evidence the
//! server accepted the connect. That signal is deliberately weak, but an
//! explicit rejection packet is honored as a hard failure.
//!
//! One session owns one UDP endpoint exclusively. All inbound handling runs
//! on a single read loop, so state transitions never race.

use crate::chat;
use crate::error::SessionError;
use crate::session::SessionEvent;
use log::{debug, error, info, warn};
use rand::Rng;
use shared::{
    packets, ConnectionState, CONNECTIONLESS_HEADER, PROTOCOL_VERSION, S2C_CHALLENGE, S2C_REJECT,
    S2C_STUFFTEXT,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

/// Lightweight connectionless probe cadence while connected; keeps NAT
/// mappings and the server-side timeout tracking alive.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Fire-and-forget commands sent after `new`, each delay relative to the
/// previous command (+1.0s, +1.5s, +2.0s from the join). Team and class
/// selection, then a movement flag. None of these are acknowledged.
const POST_JOIN_COMMANDS: [(Duration, &str); 3] = [
    (Duration::from_millis(1000), "jointeam 1"),
    (Duration::from_millis(500), "joinclass 1"),
    (Duration::from_millis(500), "+left"),
];

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub nickname: String,
}

/// One logical session: an exclusive UDP endpoint plus the background tasks
/// driving it. Destroyed via [`Session::close`], which is safe in any state.
pub struct Session {
    socket: Arc<UdpSocket>,
    state: Arc<RwLock<ConnectionState>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Session {
    /// Binds an ephemeral endpoint, emits the `getchallenge` request and
    /// spawns the read loop and keepalive ticker.
    pub async fn connect(
        config: SessionConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self, SessionError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket
            .connect((config.host.as_str(), config.port))
            .await?;
        let socket = Arc::new(socket);
        let state = Arc::new(RwLock::new(ConnectionState::Idle));
        let tasks: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

        info!(
            "Connecting to {}:{} as {}",
            config.host, config.port, config.nickname
        );

        set_state(&state, &events, ConnectionState::ChallengeRequested).await;
        send_command(&socket, &state, "getchallenge steam\n").await;

        let driver = Driver {
            socket: Arc::clone(&socket),
            state: Arc::clone(&state),
            events: events.clone(),
            tasks: Arc::clone(&tasks),
            nickname: config.nickname,
        };

        let read_loop = tokio::spawn(driver.read_loop());
        let keepalive = tokio::spawn(keepalive_loop(Arc::clone(&socket), Arc::clone(&state)));
        {
            let mut tasks = tasks.lock().await;
            tasks.push(read_loop);
            tasks.push(keepalive);
        }

        Ok(Session {
            socket,
            state,
            events,
            tasks,
        })
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }

    /// Transitions to `Closed` from any state, including mid-handshake, and
    /// cancels every background task. No packet is emitted afterwards.
    pub async fn close(&self) {
        {
            let mut state = self.state.write().await;
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Closed;
        }
        let _ = self
            .events
            .send(SessionEvent::StateChanged(ConnectionState::Closed));

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        info!("Session closed");
    }
}

/// Owned by the read loop; the only place transitions are decided.
struct Driver {
    socket: Arc<UdpSocket>,
    state: Arc<RwLock<ConnectionState>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    nickname: String,
}

impl Driver {
    async fn read_loop(mut self) {
        let mut buffer = [0u8; 2048];

        loop {
            match self.socket.recv(&mut buffer).await {
                Ok(len) => self.handle_packet(&buffer[..len]).await,
                Err(e) => {
                    error!("Session read error: {}", e);
                    sleep(Duration::from_millis(100)).await;
                }
            }

            if *self.state.read().await == ConnectionState::Closed {
                break;
            }
        }
    }

    async fn handle_packet(&mut self, data: &[u8]) {
        if data.len() < 5 {
            return;
        }

        if data[..4] == CONNECTIONLESS_HEADER {
            self.handle_connectionless(&data[4..]).await;
        } else {
            self.handle_netchannel(data).await;
        }
    }

    async fn handle_connectionless(&mut self, payload: &[u8]) {
        let msg_type = payload[0];
        let content = &payload[1..];

        match msg_type {
            S2C_CHALLENGE => {
                if *self.state.read().await != ConnectionState::ChallengeRequested {
                    debug!("Ignoring challenge outside ChallengeRequested");
                    return;
                }
                match packets::parse_handshake_challenge(content) {
                    Some(challenge) => {
                        info!("Got connect challenge: {}", challenge);
                        self.send_connect(challenge).await;
                        set_state(&self.state, &self.events, ConnectionState::Connecting).await;
                    }
                    None => warn!("Challenge payload did not parse, staying put"),
                }
            }
            S2C_REJECT => {
                let reason = String::from_utf8_lossy(content).trim().to_string();
                warn!("Connection rejected: {}", reason);
                let _ = self.events.send(SessionEvent::Rejected { reason });
                set_state(&self.state, &self.events, ConnectionState::Closed).await;
            }
            S2C_STUFFTEXT => {
                debug!("Stufftext: {}", String::from_utf8_lossy(content).trim());
            }
            other => {
                debug!("Unhandled connectionless type {:#04x}", other);
            }
        }
    }

    /// Sequenced traffic. Treated as an opaque byte stream: the first such
    /// packet flips us to `Connected`, everything after feeds the heuristic
    /// chat extractor.
    async fn handle_netchannel(&mut self, data: &[u8]) {
        if *self.state.read().await == ConnectionState::Connecting {
            info!("Netchannel traffic received, treating session as connected");
            set_state(&self.state, &self.events, ConnectionState::Connected).await;
            self.send_new().await;
        }

        if *self.state.read().await == ConnectionState::Connected {
            if let Some(text) = chat::extract_chat_text(data) {
                let _ = self.events.send(SessionEvent::Chat { text });
            }
        }
    }

    async fn send_connect(&self, challenge: i64) {
        let cdkey = random_cdkey();
        let cmd = packets::connect_command(PROTOCOL_VERSION, challenge, &self.nickname, &cdkey);
        send_command(&self.socket, &self.state, &cmd).await;
    }

    /// Declares readiness to enter the game world, then schedules the
    /// scripted follow-ups on their fixed delays.
    async fn send_new(&self) {
        send_command(&self.socket, &self.state, "new").await;

        let socket = Arc::clone(&self.socket);
        let state = Arc::clone(&self.state);
        let scheduler = tokio::spawn(async move {
            for (delay, cmd) in POST_JOIN_COMMANDS {
                sleep(delay).await;
                send_command(&socket, &state, cmd).await;
            }
        });
        self.tasks.lock().await.push(scheduler);
    }
}

async fn keepalive_loop(socket: Arc<UdpSocket>, state: Arc<RwLock<ConnectionState>>) {
    let mut ticker = interval(KEEPALIVE_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match *state.read().await {
            ConnectionState::Closed => break,
            ConnectionState::Connected => {
                if let Err(e) = socket.send(&packets::command("time")).await {
                    warn!("Keepalive send failed: {}", e);
                }
            }
            _ => {}
        }
    }
}

async fn set_state(
    state: &RwLock<ConnectionState>,
    events: &mpsc::UnboundedSender<SessionEvent>,
    next: ConnectionState,
) {
    *state.write().await = next;
    let _ = events.send(SessionEvent::StateChanged(next));
}

/// A send failure never crashes the session; it is logged and the normal
/// keepalive/schedule cadence decides whether anything is sent again.
async fn send_command(socket: &UdpSocket, state: &RwLock<ConnectionState>, cmd: &str) {
    if *state.read().await == ConnectionState::Closed {
        return;
    }
    if let Err(e) = socket.send(&packets::command(cmd)).await {
        warn!("Failed to send '{}': {}", cmd.trim_end(), e);
    }
}

fn random_cdkey() -> String {
    let mut rng = rand::thread_rng();
    format!("{:016x}{:016x}", rng.gen::<u64>(), rng.gen::<u64>())
}

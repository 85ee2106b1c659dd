use clap::Parser;
use client::handshake::SessionConfig;
use client::query::QueryClient;
use client::session::{SessionEvent, SessionStore};
use log::{info, warn};
use shared::ConnectionState;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to query (host:port)
    #[arg(short = 's', long, default_value = "127.0.0.1:27015")]
    server: String,

    /// Nickname used when joining
    #[arg(short = 'n', long, default_value = "Player")]
    nickname: String,

    /// Query timeout in seconds
    #[arg(short = 't', long, default_value = "3")]
    timeout: u64,

    /// Poll interval in seconds while joined
    #[arg(long, default_value = "5")]
    poll_interval: u64,

    /// Join the server (handshake + poller) instead of a one-shot query
    #[arg(short = 'j', long)]
    join: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let (host, port) = parse_address(&args.server)?;
    let timeout = Duration::from_secs(args.timeout);

    if !args.join {
        let query = QueryClient::new(timeout);
        match query.query_full(&host, port).await {
            Some(info) => print_server_info(&info),
            None => warn!("{}:{} is unavailable", host, port),
        }
        return Ok(());
    }

    let mut store = SessionStore::new(timeout);
    let config = SessionConfig {
        host,
        port,
        nickname: args.nickname,
    };
    let mut events = store
        .create("cli", config, Duration::from_secs(args.poll_interval))
        .await?;

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => {
                        if report_event(event) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, closing session");
                break;
            }
        }
    }

    store.close("cli").await;
    Ok(())
}

fn parse_address(address: &str) -> Result<(String, u16), Box<dyn std::error::Error>> {
    match address.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), port.parse()?)),
        None => Ok((address.to_string(), 27015)),
    }
}

fn print_server_info(info: &shared::ServerInfo) {
    info!(
        "{} | map {} | players {}/{} (bots {}) | free slots {}",
        info.server_name,
        info.map_name,
        display_count(info.player_count),
        display_count(info.max_players),
        display_count(info.bot_count),
        display_count(info.free_slots()),
    );
    for player in &info.players {
        info!(
            "  #{:<3} {:<28} score {:>5} | {:>7.1}s | {:?}",
            player.slot_index, player.name, player.score, player.duration_seconds, player.source
        );
    }
}

fn display_count(count: Option<u8>) -> String {
    count.map_or_else(|| "?".to_string(), |c| c.to_string())
}

/// Returns true when the session reached a terminal condition.
fn report_event(event: SessionEvent) -> bool {
    match event {
        SessionEvent::StateChanged(state) => {
            info!("Session state: {:?}", state);
            state == ConnectionState::Closed
        }
        SessionEvent::Rejected { reason } => {
            warn!("Server rejected the connection: {}", reason);
            true
        }
        SessionEvent::Chat { text } => {
            info!("[game] {}", text);
            false
        }
        SessionEvent::ServerUpdate(info) => {
            print_server_info(&info);
            false
        }
        SessionEvent::PlayerList(players) => {
            info!("Player list: {} entries", players.len());
            false
        }
    }
}

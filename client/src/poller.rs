//! Periodic background re-query for a live session.

use crate::query::QueryClient;
use crate::session::SessionEvent;
use log::debug;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Spawns the poll loop for one session. Each tick runs a full query cycle
/// against the session's endpoint; on success the fresh `ServerInfo` and the
/// normalized player list are published, on failure nothing is published and
/// the loop simply waits for the next tick. Transient unavailability is not
/// an error.
///
/// The task ends on its own when the event receiver is dropped and is
/// aborted when the owning session is removed from the store.
pub fn start_polling(
    query: QueryClient,
    host: String,
    port: u16,
    poll_interval: Duration,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            match query.query_full(&host, port).await {
                Some(info) => {
                    let players = info.players.clone();
                    if events.send(SessionEvent::ServerUpdate(info)).is_err() {
                        break;
                    }
                    if events.send(SessionEvent::PlayerList(players)).is_err() {
                        break;
                    }
                }
                None => debug!("Poll tick: {}:{} unavailable", host, port),
            }
        }
    })
}

//! Session registry: explicit ownership of each handshake session and its
//! poller, replacing any ambient global state. Creation hands back the
//! session's event receiver; teardown closes the session and cancels the
//! poller.

use crate::error::SessionError;
use crate::handshake::{Session, SessionConfig};
use crate::poller;
use crate::query::QueryClient;
use log::info;
use shared::{ConnectionState, PlayerRecord, ServerInfo};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Everything a session publishes on its output channel. External bridges
/// (web transport, exporters) consume these; the core does not interpret
/// them further.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    Chat { text: String },
    Rejected { reason: String },
    ServerUpdate(ServerInfo),
    PlayerList(Vec<PlayerRecord>),
}

/// A registered session and the poller re-querying its endpoint.
pub struct SessionHandle {
    pub session: Session,
    poller: JoinHandle<()>,
}

/// Maps external session identifiers to their owned handles.
pub struct SessionStore {
    sessions: HashMap<String, SessionHandle>,
    query_timeout: Duration,
}

impl SessionStore {
    pub fn new(query_timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            query_timeout,
        }
    }

    /// Starts the handshake and the poller for a new session id and returns
    /// the channel both publish into. Duplicate ids are rejected.
    pub async fn create(
        &mut self,
        id: &str,
        config: SessionConfig,
        poll_interval: Duration,
    ) -> Result<mpsc::UnboundedReceiver<SessionEvent>, SessionError> {
        if self.sessions.contains_key(id) {
            return Err(SessionError::DuplicateSession(id.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::connect(config.clone(), tx.clone()).await?;
        let poller = poller::start_polling(
            QueryClient::new(self.query_timeout),
            config.host.clone(),
            config.port,
            poll_interval,
            tx,
        );

        info!(
            "Session {} registered for {}:{}",
            id, config.host, config.port
        );
        self.sessions
            .insert(id.to_string(), SessionHandle { session, poller });
        Ok(rx)
    }

    /// Closes a session and cancels its poller. Returns false when the id
    /// was already gone.
    pub async fn close(&mut self, id: &str) -> bool {
        match self.sessions.remove(id) {
            Some(handle) => {
                handle.session.close().await;
                handle.poller.abort();
                info!("Session {} removed", id);
                true
            }
            None => false,
        }
    }

    pub async fn close_all(&mut self) {
        let ids: Vec<String> = self.sessions.keys().cloned().collect();
        for id in ids {
            self.close(&id).await;
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

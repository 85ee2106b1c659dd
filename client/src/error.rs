//! Error taxonomy for queries and sessions.
//!
//! Query-level failures are transient by design: the query client absorbs
//! them into degraded results (`None` info, empty player lists) and only
//! logs the cause. Sessions end only on an explicit server rejection or a
//! local socket failure.

use shared::codec::CodecError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    Malformed(#[from] CodecError),
    #[error("challenge negotiation failed on both variants")]
    ChallengeUnobtainable,
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),
    #[error("http fallback failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection rejected by server: {0}")]
    Rejected(String),
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),
    #[error("session id already registered: {0}")]
    DuplicateSession(String),
}

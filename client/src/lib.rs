//! # GoldSrc Query & Handshake Client Library
//!
//! This library queries GoldSrc-engine game servers (Half-Life /
//! Counter-Strike 1.6) over UDP and drives the connectionless handshake a
//! client performs before it can be considered joined.
//!
//! ## Architecture Overview
//!
//! The core splits into stateless query cycles and a stateful per-session
//! handshake, with a codec shared between them (in the `shared` crate):
//!
//! ### Query Client
//! Stateless-per-call request/response cycles for `A2S_INFO` and
//! `A2S_PLAYER`, including the two-variant challenge negotiation and a
//! best-effort fallback chain (aggregator API, embedded web admin scrape)
//! for player lists when the query protocol yields nothing. Every failure
//! is converted into a degraded-but-valid result: an unavailable server,
//! a partial record, an empty list. Nothing raises past this boundary.
//!
//! ### Handshake State Machine
//! One `Session` per logical connection, owning its UDP endpoint
//! exclusively. It walks `Idle -> ChallengeRequested -> Connecting ->
//! Connected`, with `Closed` reachable from anywhere. Post-handshake game
//! traffic is NOT decoded: no sequencing, fragmentation or delta
//! compression is reconstructed. "Connected" is inferred from the first
//! inbound packet that lacks the connectionless marker, and inbound bytes
//! are only scanned heuristically for chat-like text.
//!
//! ### Session Poller
//! A background task per live session that periodically re-runs the full
//! query cycle against the same endpoint and republishes the results on the
//! session's event channel.
//!
//! ## Module Organization
//!
//! - `query` — A2S query cycles and the fallback chain
//! - `handshake` — the per-session connection state machine
//! - `chat` — best-effort text extraction from opaque netchannel bytes
//! - `poller` — the periodic re-query task
//! - `session` — session registry and the event type it publishes
//! - `error` — query/session error taxonomy
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::handshake::SessionConfig;
//! use client::session::{SessionEvent, SessionStore};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut store = SessionStore::new(Duration::from_secs(3));
//!     let config = SessionConfig {
//!         host: "127.0.0.1".to_string(),
//!         port: 27015,
//!         nickname: "Player".to_string(),
//!     };
//!
//!     let mut events = store.create("web-1", config, Duration::from_secs(5)).await?;
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             SessionEvent::ServerUpdate(info) => println!("{:?}", info),
//!             SessionEvent::Chat { text } => println!("chat: {}", text),
//!             _ => {}
//!         }
//!     }
//!
//!     store.close("web-1").await;
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod error;
pub mod handshake;
pub mod poller;
pub mod query;
pub mod session;

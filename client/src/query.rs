//! Stateless-per-call query cycles against a GoldSrc server.
//!
//! Every operation binds a fresh ephemeral socket, is bounded by the
//! configured timeout, and converts failures into degraded results instead
//! of raising: a server that cannot be queried shows as unavailable, a
//! player list that cannot be obtained shows as empty. Callers own the
//! retry cadence; the only built-in retry is the documented two-variant
//! challenge negotiation.

use crate::error::QueryError;
use log::debug;
use serde::Deserialize;
use shared::packets;
use shared::{Challenge, PlayerRecord, PlayerSource, ServerInfo};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Response buffer size; A2S responses fit comfortably within one datagram.
const RECV_BUFFER_SIZE: usize = 4096;

#[derive(Clone)]
pub struct QueryClient {
    timeout: Duration,
    http: reqwest::Client,
}

impl QueryClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            http: reqwest::Client::new(),
        }
    }

    /// Queries A2S_INFO. Timeout or a malformed header yields `None`; a
    /// response truncated after the name strings still yields a partial
    /// record with unknown counts.
    pub async fn query_info(&self, host: &str, port: u16) -> Option<ServerInfo> {
        match self.try_query_info(host, port).await {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("A2S_INFO {}:{} unavailable: {}", host, port, e);
                None
            }
        }
    }

    async fn try_query_info(&self, host: &str, port: u16) -> Result<ServerInfo, QueryError> {
        let socket = self.bind_to(host, port).await?;
        let response = self.request_response(&socket, &packets::info_request()).await?;
        Ok(packets::decode_info(&response, host, port)?)
    }

    /// Queries A2S_PLAYER via challenge negotiation. No challenge or a
    /// timed-out final exchange degrades to an empty list, never an error.
    pub async fn query_players(&self, host: &str, port: u16) -> Vec<PlayerRecord> {
        match self.try_query_players(host, port).await {
            Ok(players) => players,
            Err(e) => {
                debug!("A2S_PLAYER {}:{} failed: {}", host, port, e);
                Vec::new()
            }
        }
    }

    async fn try_query_players(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Vec<PlayerRecord>, QueryError> {
        // The challenge is only honored for the next request from the same
        // socket, so the negotiation and the final query share one.
        let socket = self.bind_to(host, port).await?;
        let challenge = self.negotiate_challenge(&socket).await?;
        let response = self
            .request_response(&socket, &packets::player_request(challenge))
            .await?;
        Ok(packets::decode_players(&response)?)
    }

    /// Tries the current challenge variant (0x55 with trailer), then the
    /// legacy one (bare 0x57). Different server builds only honor one.
    async fn negotiate_challenge(&self, socket: &UdpSocket) -> Result<Challenge, QueryError> {
        let variants = [
            packets::player_challenge_request(),
            packets::player_challenge_request_legacy(),
        ];

        for request in &variants {
            match self.request_response(socket, request).await {
                Ok(response) => {
                    if let Some(token) = packets::parse_challenge_token(&response) {
                        return Ok(token);
                    }
                    debug!("challenge variant answered with a non-challenge packet");
                }
                Err(e) => debug!("challenge variant got no answer: {}", e),
            }
        }

        Err(QueryError::ChallengeUnobtainable)
    }

    /// Best-effort enrichment when the query protocol yields nothing:
    /// a third-party aggregator API, then the server's embedded web admin
    /// page. Lower-trust by design; records carry their `source` tag so
    /// consumers can discount them.
    pub async fn query_players_fallback(&self, host: &str, port: u16) -> Vec<PlayerRecord> {
        match self.query_players_api(host, port).await {
            Ok(players) if !players.is_empty() => return players,
            Ok(_) => {}
            Err(e) => debug!("aggregator API fallback failed: {}", e),
        }

        match self.query_players_web(host, port).await {
            Ok(players) if !players.is_empty() => return players,
            Ok(_) => {}
            Err(e) => debug!("web scrape fallback failed: {}", e),
        }

        Vec::new()
    }

    /// Full cycle: INFO, then players with the fallback chain. A missing
    /// player list downgrades the record; only a failed INFO query makes the
    /// whole server unavailable.
    pub async fn query_full(&self, host: &str, port: u16) -> Option<ServerInfo> {
        let mut info = self.query_info(host, port).await?;

        let mut players = self.query_players(host, port).await;
        if players.is_empty() {
            players = self.query_players_fallback(host, port).await;
        }
        info.players = players;

        Some(info)
    }

    async fn bind_to(&self, host: &str, port: u16) -> Result<UdpSocket, QueryError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect((host, port)).await?;
        Ok(socket)
    }

    async fn request_response(
        &self,
        socket: &UdpSocket,
        request: &[u8],
    ) -> Result<Vec<u8>, QueryError> {
        socket.send(request).await?;

        let mut buffer = [0u8; RECV_BUFFER_SIZE];
        match timeout(self.timeout, socket.recv(&mut buffer)).await {
            Ok(Ok(len)) => Ok(buffer[..len].to_vec()),
            Ok(Err(e)) => Err(QueryError::Socket(e)),
            Err(_) => Err(QueryError::Timeout(self.timeout)),
        }
    }

    async fn query_players_api(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Vec<PlayerRecord>, QueryError> {
        let url = format!("https://api.gametracker.com/api/v2/servers/{host}:{port}/players");
        let response = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .header(reqwest::header::USER_AGENT, "Mozilla/5.0")
            .send()
            .await?;
        let data: AggregatorResponse = response.json().await?;

        Ok(data
            .players
            .into_iter()
            .enumerate()
            .map(|(i, p)| PlayerRecord {
                slot_index: i as u8,
                name: p.name.unwrap_or_else(|| "Unknown".to_string()),
                score: p.score.unwrap_or(0),
                duration_seconds: p.time.unwrap_or(0.0),
                source: PlayerSource::ThirdPartyApi,
            })
            .collect())
    }

    async fn query_players_web(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Vec<PlayerRecord>, QueryError> {
        let candidates = [
            format!("http://{host}:{port}/api/players"),
            format!("http://{host}:27005/api/players"),
            format!("http://{host}:8080/players"),
            format!("http://{host}/admin/players.html"),
        ];

        for url in &candidates {
            let response = match self
                .http
                .get(url)
                .timeout(Duration::from_secs(2))
                .send()
                .await
            {
                Ok(response) => response,
                Err(_) => continue,
            };
            let body = match response.text().await {
                Ok(body) => body,
                Err(_) => continue,
            };

            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
                let players = json_players(&value);
                if !players.is_empty() {
                    return Ok(players);
                }
            }

            let players = html_table_players(&body);
            if !players.is_empty() {
                return Ok(players);
            }
        }

        Ok(Vec::new())
    }
}

#[derive(Deserialize)]
struct AggregatorResponse {
    #[serde(default)]
    players: Vec<AggregatorPlayer>,
}

#[derive(Deserialize)]
struct AggregatorPlayer {
    name: Option<String>,
    score: Option<i32>,
    time: Option<f32>,
}

/// Accepts either a bare JSON array of players or `{"players": [...]}`.
fn json_players(value: &serde_json::Value) -> Vec<PlayerRecord> {
    let entries = match value {
        serde_json::Value::Array(entries) => entries.as_slice(),
        serde_json::Value::Object(map) => match map.get("players") {
            Some(serde_json::Value::Array(entries)) => entries.as_slice(),
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    entries
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            let name = entry.get("name")?.as_str()?.to_string();
            Some(PlayerRecord {
                slot_index: i as u8,
                name,
                score: entry.get("score").and_then(|v| v.as_i64()).unwrap_or(0) as i32,
                duration_seconds: entry.get("time").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32,
                source: PlayerSource::WebScrape,
            })
        })
        .collect()
}

/// Naive extraction of a `<tr>/<td>` player table from an embedded admin
/// page. Good enough for the handful of known page layouts; anything it
/// cannot read simply yields no players.
fn html_table_players(html: &str) -> Vec<PlayerRecord> {
    let mut players = Vec::new();

    for row in html.split("<tr").skip(1) {
        let row = match row.split("</tr>").next() {
            Some(row) => row,
            None => continue,
        };

        let mut cells = Vec::new();
        for cell in row.split("<td").skip(1) {
            let Some(start) = cell.find('>') else { continue };
            let Some(end) = cell.find("</td>") else { continue };
            if start + 1 <= end {
                cells.push(cell[start + 1..end].trim().to_string());
            }
        }

        if cells.len() >= 2 {
            let name = cells[0].clone();
            if name.is_empty() || name == "Name" {
                continue; // header row
            }
            players.push(PlayerRecord {
                slot_index: players.len() as u8,
                name,
                score: cells[1].parse().unwrap_or(0),
                duration_seconds: 0.0,
                source: PlayerSource::WebScrape,
            });
        }
    }

    players
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_players_accepts_bare_array() {
        let value: serde_json::Value =
            serde_json::from_str(r#"[{"name":"alpha","score":7,"time":12.5}]"#).unwrap();
        let players = json_players(&value);
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].name, "alpha");
        assert_eq!(players[0].score, 7);
        assert_eq!(players[0].source, PlayerSource::WebScrape);
    }

    #[test]
    fn json_players_accepts_wrapped_object() {
        let value: serde_json::Value =
            serde_json::from_str(r#"{"players":[{"name":"bravo"},{"name":"charlie","score":2}]}"#)
                .unwrap();
        let players = json_players(&value);
        assert_eq!(players.len(), 2);
        assert_eq!(players[1].name, "charlie");
        assert_eq!(players[1].score, 2);
    }

    #[test]
    fn json_players_ignores_unusable_shapes() {
        let value: serde_json::Value = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert!(json_players(&value).is_empty());
    }

    #[test]
    fn html_table_extraction_skips_header_row() {
        let html = "<table>\
            <tr><td>Name</td><td>Score</td></tr>\
            <tr><td>alpha</td><td>12</td><td>0:42</td></tr>\
            <tr><td>bravo</td><td>not-a-number</td></tr>\
            </table>";
        let players = html_table_players(html);
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].name, "alpha");
        assert_eq!(players[0].score, 12);
        assert_eq!(players[1].name, "bravo");
        assert_eq!(players[1].score, 0);
        assert_eq!(players[1].source, PlayerSource::WebScrape);
    }

    #[tokio::test]
    async fn query_info_times_out_to_unavailable() {
        // A bound socket that never answers.
        let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();

        let client = QueryClient::new(Duration::from_millis(100));
        assert!(client.query_info("127.0.0.1", port).await.is_none());
    }
}

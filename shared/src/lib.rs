use serde::{Deserialize, Serialize};

pub mod codec;
pub mod packets;

/// Every connectionless GoldSrc packet starts with this marker.
pub const CONNECTIONLESS_HEADER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

/// GoldSrc network protocol version sent in the connect command.
pub const PROTOCOL_VERSION: u8 = 48;
/// Steam app id for Counter-Strike 1.6.
pub const APP_ID_CS16: u16 = 10;

// Message type bytes (the byte following the connectionless marker).
pub const A2S_INFO_TYPE: u8 = b'T';
pub const S2C_INFO: u8 = 0x49; // 'I'
pub const A2S_PLAYER: u8 = 0x55;
pub const A2S_CHALLENGE_LEGACY: u8 = 0x57;
pub const S2C_CHALLENGE: u8 = 0x41; // 'A'
pub const S2C_PLAYER_LEGACY: u8 = 0x44; // 'D'
pub const S2C_REJECT: u8 = b'B';
pub const S2C_STUFFTEXT: u8 = b'9';

// Extra Data Flags bits gating optional A2S_INFO trailing fields.
pub const EDF_PORT: u8 = 0x80;
pub const EDF_STEAM_ID: u8 = 0x10;
pub const EDF_SOURCE_TV: u8 = 0x40;
pub const EDF_KEYWORDS: u8 = 0x20;
pub const EDF_GAME_ID: u8 = 0x01;

/// Opaque 4-byte anti-spoofing token issued by the server. Valid only for
/// the immediate next query from the same socket.
pub type Challenge = [u8; 4];

/// Where a player record was obtained from. A2S is authoritative; the
/// aggregator API and web scrape are lower-trust enrichment.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PlayerSource {
    QueryProtocol,
    ThirdPartyApi,
    WebScrape,
}

/// One entry of a player-list response.
///
/// `slot_index` is unique within a single response only; a player may sit at
/// a different index next poll. Names are not guaranteed unique either.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerRecord {
    pub slot_index: u8,
    pub name: String,
    pub score: i32,
    pub duration_seconds: f32,
    pub source: PlayerSource,
}

/// Decoded A2S_INFO response. Constructed fresh on every successful decode;
/// count fields are `None` when the response was truncated before them.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServerInfo {
    pub host: String,
    pub port: u16,
    pub protocol_version: u8,
    pub server_name: String,
    pub map_name: String,
    pub game_directory: String,
    pub game_name: String,
    pub app_id: Option<u16>,
    pub player_count: Option<u8>,
    pub max_players: Option<u8>,
    pub bot_count: Option<u8>,
    pub server_type: Option<char>,
    pub environment: Option<char>,
    pub is_passworded: bool,
    pub is_secure: bool,
    pub version_string: String,
    pub tags: String,
    pub players: Vec<PlayerRecord>,
}

impl ServerInfo {
    /// Free slots, clamped at zero. The protocol does not guarantee
    /// `player_count <= max_players`, so the subtraction saturates.
    pub fn free_slots(&self) -> Option<u8> {
        match (self.max_players, self.player_count) {
            (Some(max), Some(count)) => Some(max.saturating_sub(count)),
            _ => None,
        }
    }
}

/// Handshake lifecycle of a session. Owned exclusively by one session;
/// `Closed` is terminal and reachable from every state.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    ChallengeRequested,
    Connecting,
    Connected,
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_with_counts(player_count: Option<u8>, max_players: Option<u8>) -> ServerInfo {
        ServerInfo {
            host: "127.0.0.1".to_string(),
            port: 27015,
            protocol_version: PROTOCOL_VERSION,
            server_name: "Test Server".to_string(),
            map_name: "de_dust2".to_string(),
            game_directory: "cstrike".to_string(),
            game_name: "Counter-Strike".to_string(),
            app_id: Some(APP_ID_CS16),
            player_count,
            max_players,
            bot_count: Some(0),
            server_type: Some('d'),
            environment: Some('l'),
            is_passworded: false,
            is_secure: true,
            version_string: "1.1.2.7".to_string(),
            tags: String::new(),
            players: Vec::new(),
        }
    }

    #[test]
    fn free_slots_basic() {
        let info = info_with_counts(Some(5), Some(16));
        assert_eq!(info.free_slots(), Some(11));
    }

    #[test]
    fn free_slots_saturates_when_overfull() {
        // Some servers report more players than slots; never underflow.
        let info = info_with_counts(Some(20), Some(16));
        assert_eq!(info.free_slots(), Some(0));
    }

    #[test]
    fn free_slots_unknown_on_partial_record() {
        let info = info_with_counts(None, None);
        assert_eq!(info.free_slots(), None);
    }
}

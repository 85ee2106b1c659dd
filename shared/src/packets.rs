//! Connectionless packet builders and response decoders.
//!
//! The byte layouts here must match the GoldSrc wire format exactly: a
//! 4-byte `0xFFFFFFFF` marker, one message type byte, then a fixed layout
//! per message. Decoders tolerate truncation wherever the live protocol is
//! known to truncate (extended INFO fields, mid-list player entries).

use crate::codec::{self, CodecError};
use crate::{
    Challenge, PlayerRecord, PlayerSource, ServerInfo, A2S_CHALLENGE_LEGACY, A2S_INFO_TYPE,
    A2S_PLAYER, CONNECTIONLESS_HEADER, EDF_GAME_ID, EDF_KEYWORDS, EDF_PORT, EDF_SOURCE_TV,
    EDF_STEAM_ID, S2C_CHALLENGE, S2C_INFO, S2C_PLAYER_LEGACY,
};

/// The fixed 25-byte A2S_INFO probe.
pub fn info_request() -> Vec<u8> {
    let mut packet = CONNECTIONLESS_HEADER.to_vec();
    packet.push(A2S_INFO_TYPE);
    packet.extend_from_slice(b"Source Engine Query\0");
    packet
}

/// Current-style challenge request: type 0x55 with a 0xFFFFFFFF trailer.
pub fn player_challenge_request() -> Vec<u8> {
    let mut packet = CONNECTIONLESS_HEADER.to_vec();
    packet.push(A2S_PLAYER);
    packet.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
    packet
}

/// Legacy challenge request: bare type 0x57. Some older server builds only
/// honor this variant.
pub fn player_challenge_request_legacy() -> Vec<u8> {
    let mut packet = CONNECTIONLESS_HEADER.to_vec();
    packet.push(A2S_CHALLENGE_LEGACY);
    packet
}

/// A2S_PLAYER query carrying the challenge token from the previous exchange.
pub fn player_request(challenge: Challenge) -> Vec<u8> {
    let mut packet = CONNECTIONLESS_HEADER.to_vec();
    packet.push(A2S_PLAYER);
    packet.extend_from_slice(&challenge);
    packet
}

/// Arbitrary connectionless ASCII command (`getchallenge steam`, `new`,
/// `jointeam 1`, the keepalive probe, ...).
pub fn command(text: &str) -> Vec<u8> {
    let mut packet = CONNECTIONLESS_HEADER.to_vec();
    packet.extend_from_slice(text.as_bytes());
    packet
}

fn auth_info_block(cdkey: &str) -> String {
    format!("\\prot\\3\\unique\\-1\\raw\\steam\\cdkey\\{cdkey}")
}

fn user_info_block(nickname: &str) -> String {
    format!(
        "\\name\\{nickname}\\model\\gordon\\topcolor\\30\\bottomcolor\\6\
         \\rate\\25000\\cl_updaterate\\101\\cl_lw\\1\\cl_lc\\1\\cl_dlmax\\512\
         \\_vgui_menus\\1\\_ah\\1\\_cl_autowepswitch\\1\\can_voice_record\\1"
    )
}

/// Formats the connect command string. The server parses the quoted blocks
/// with a fixed `\key\value` tokenizer; malformed blocks are rejected
/// silently, so the syntax is reproduced verbatim.
pub fn connect_command(protocol: u8, challenge: i64, nickname: &str, cdkey: &str) -> String {
    format!(
        "connect {protocol} {challenge} \"{}\" \"{}\"",
        auth_info_block(cdkey),
        user_info_block(nickname)
    )
}

/// Tokenizes a backslash-delimited `\key\value` block.
pub fn parse_key_values(block: &str) -> Vec<(String, String)> {
    let block = block.strip_prefix('\\').unwrap_or(block);
    let mut fields = block.split('\\');
    let mut pairs = Vec::new();
    while let (Some(key), Some(value)) = (fields.next(), fields.next()) {
        pairs.push((key.to_string(), value.to_string()));
    }
    pairs
}

/// Inverse of [`connect_command`]: recovers protocol, challenge and the two
/// key/value blocks.
#[allow(clippy::type_complexity)]
pub fn parse_connect_command(
    cmd: &str,
) -> Option<(u8, i64, Vec<(String, String)>, Vec<(String, String)>)> {
    let rest = cmd.strip_prefix("connect ")?;
    let (head, blocks) = rest.split_once('"')?;
    let mut head_fields = head.split_whitespace();
    let protocol = head_fields.next()?.parse().ok()?;
    let challenge = head_fields.next()?.parse().ok()?;

    let mut quoted = blocks.split('"');
    let auth = quoted.next()?;
    quoted.next()?; // separator between the quoted blocks
    let user = quoted.next()?;

    Some((
        protocol,
        challenge,
        parse_key_values(auth),
        parse_key_values(user),
    ))
}

/// Decodes an A2S_INFO response.
///
/// Header or type mismatch is an error. A response that ends after the four
/// name strings still yields a partial record with unknown counts: the
/// protocol sometimes truncates the extended fields and the name and map are
/// still useful.
pub fn decode_info(buf: &[u8], host: &str, port: u16) -> Result<ServerInfo, CodecError> {
    if buf.len() < 4 || buf[..4] != CONNECTIONLESS_HEADER {
        return Err(CodecError::InvalidHeader);
    }
    let (msg_type, pos) = codec::read_u8(buf, 4)?;
    if msg_type != S2C_INFO {
        return Err(CodecError::UnexpectedType { got: msg_type });
    }

    let (protocol_version, pos) = codec::read_u8(buf, pos)?;
    let (server_name, pos) = codec::read_cstring(buf, pos);
    let (map_name, pos) = codec::read_cstring(buf, pos);
    let (game_directory, pos) = codec::read_cstring(buf, pos);
    let (game_name, pos) = codec::read_cstring(buf, pos);

    let mut info = ServerInfo {
        host: host.to_string(),
        port,
        protocol_version,
        server_name,
        map_name,
        game_directory,
        game_name,
        app_id: None,
        player_count: None,
        max_players: None,
        bot_count: None,
        server_type: None,
        environment: None,
        is_passworded: false,
        is_secure: false,
        version_string: String::new(),
        tags: String::new(),
        players: Vec::new(),
    };

    // Everything past the name strings degrades gracefully on truncation.
    let _ = decode_info_tail(buf, pos, &mut info);
    Ok(info)
}

fn decode_info_tail(buf: &[u8], pos: usize, info: &mut ServerInfo) -> Result<(), CodecError> {
    let (app_id, pos) = codec::read_u16_le(buf, pos)?;
    info.app_id = Some(app_id);
    let (players, pos) = codec::read_u8(buf, pos)?;
    info.player_count = Some(players);
    let (max_players, pos) = codec::read_u8(buf, pos)?;
    info.max_players = Some(max_players);
    let (bots, pos) = codec::read_u8(buf, pos)?;
    info.bot_count = Some(bots);

    let (server_type, pos) = codec::read_u8(buf, pos)?;
    info.server_type = Some(server_type as char);
    let (environment, pos) = codec::read_u8(buf, pos)?;
    info.environment = Some(environment as char);
    let (visibility, pos) = codec::read_u8(buf, pos)?;
    info.is_passworded = visibility != 0;
    let (vac, pos) = codec::read_u8(buf, pos)?;
    info.is_secure = vac != 0;

    let (version, pos) = codec::read_cstring(buf, pos);
    info.version_string = version;

    let (edf, mut pos) = codec::read_u8(buf, pos)?;

    // Optional fields appear in this exact wire order; reordering them
    // misaligns everything that follows.
    if edf & EDF_PORT != 0 {
        pos = codec::read_u16_le(buf, pos)?.1;
    }
    if edf & EDF_STEAM_ID != 0 {
        pos = skip(buf, pos, 8)?;
    }
    if edf & EDF_SOURCE_TV != 0 {
        pos = codec::read_u16_le(buf, pos)?.1;
        pos = codec::read_cstring(buf, pos).1;
    }
    if edf & EDF_KEYWORDS != 0 {
        let (keywords, next) = codec::read_cstring(buf, pos);
        info.tags = keywords;
        pos = next;
    }
    if edf & EDF_GAME_ID != 0 {
        skip(buf, pos, 8)?;
    }

    Ok(())
}

fn skip(buf: &[u8], pos: usize, count: usize) -> Result<usize, CodecError> {
    let remaining = buf.len().saturating_sub(pos);
    if remaining < count {
        return Err(CodecError::Truncated {
            offset: pos,
            needed: count,
            remaining,
        });
    }
    Ok(pos + count)
}

/// Decodes an A2S_PLAYER response (type 0x55, or 0x44 from legacy builds;
/// both carry the same payload). A list truncated mid-entry yields the
/// players decoded so far.
pub fn decode_players(buf: &[u8]) -> Result<Vec<PlayerRecord>, CodecError> {
    if buf.len() < 4 || buf[..4] != CONNECTIONLESS_HEADER {
        return Err(CodecError::InvalidHeader);
    }
    let (msg_type, pos) = codec::read_u8(buf, 4)?;
    if msg_type != A2S_PLAYER && msg_type != S2C_PLAYER_LEGACY {
        return Err(CodecError::UnexpectedType { got: msg_type });
    }

    let (count, mut pos) = codec::read_u8(buf, pos)?;
    let mut players = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let Ok((slot_index, next)) = codec::read_u8(buf, pos) else {
            break;
        };
        let (name, next) = codec::read_cstring(buf, next);
        let Ok((score, next)) = codec::read_i32_le(buf, next) else {
            break;
        };
        let Ok((duration_seconds, next)) = codec::read_f32_le(buf, next) else {
            break;
        };
        pos = next;

        players.push(PlayerRecord {
            slot_index,
            name,
            score,
            duration_seconds,
            source: PlayerSource::QueryProtocol,
        });
    }

    Ok(players)
}

/// Extracts the 4-byte token from an S2C_CHALLENGE (0x41) response.
pub fn parse_challenge_token(buf: &[u8]) -> Option<Challenge> {
    if buf.len() >= 9 && buf[..4] == CONNECTIONLESS_HEADER && buf[4] == S2C_CHALLENGE {
        Some([buf[5], buf[6], buf[7], buf[8]])
    } else {
        None
    }
}

/// Parses the numeric challenge out of a handshake S2C_CHALLENGE payload.
/// The content after the type byte reads `"00000000 <challenge> ..."`; the
/// second whitespace-separated token is the value embedded into `connect`.
pub fn parse_handshake_challenge(content: &[u8]) -> Option<i64> {
    let text = String::from_utf8_lossy(content);
    let mut fields = text.split_whitespace();
    fields.next()?;
    fields.next()?.parse().ok()
}

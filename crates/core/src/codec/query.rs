//! Source Query wire codec (A2S_INFO, A2S_PLAYER, A2S_RULES).
//!
//! Every datagram opens with a 4-byte outer header:
//!
//! ```text
//! FF FF FF FF  (-1)  single packet: one response header byte + payload
//! FE FF FF FF  (-2)  split packet:  see codec::split
//! ```
//!
//! Inside a single packet, the response kind is the first byte:
//!
//! | Header | Kind      |
//! |--------|-----------|
//! | `0x49` | INFO      |
//! | `0x44` | PLAYERS   |
//! | `0x45` | RULES     |
//! | `0x41` | CHALLENGE |
//!
//! Multi-byte integers are little-endian; strings are NUL-terminated and
//! decoded as UTF-8 with invalid sequences replaced.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::CodecError;

use super::Response;

/// Outer header of a single-packet datagram.
pub const HEADER_SINGLE: i32 = -1;
/// Outer header of a split-packet datagram.
pub const HEADER_SPLIT: i32 = -2;

/// Response header bytes.
pub const RESPONSE_INFO: u8 = 0x49;
pub const RESPONSE_PLAYERS: u8 = 0x44;
pub const RESPONSE_RULES: u8 = 0x45;
pub const RESPONSE_CHALLENGE: u8 = 0x41;

const REQUEST_INFO: u8 = 0x54;
const REQUEST_PLAYERS: u8 = 0x55;
const REQUEST_RULES: u8 = 0x56;

const INFO_REQUEST_BODY: &[u8] = b"Source Engine Query\0";

/// Placeholder challenge sent before the server has issued a token.
pub const INITIAL_CHALLENGE: u32 = 0xFFFF_FFFF;

/// A classified inbound datagram: payload past the outer header.
#[derive(Debug, PartialEq, Eq)]
pub enum Datagram<'a> {
    /// Single packet; the slice starts at the response header byte.
    Single(&'a [u8]),
    /// Split packet; the slice starts at the split header.
    Split(&'a [u8]),
}

/// Classify a raw datagram by its outer framing header.
pub fn classify(bytes: &[u8]) -> Result<Datagram<'_>, CodecError> {
    if bytes.len() < 4 {
        return Err(CodecError::ShortRead);
    }
    let header = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    match header {
        HEADER_SINGLE => Ok(Datagram::Single(&bytes[4..])),
        HEADER_SPLIT => Ok(Datagram::Split(&bytes[4..])),
        _ => Err(CodecError::Framing),
    }
}

/// Encode an A2S_INFO request: `FF FF FF FF 54 "Source Engine Query\0"`.
pub fn encode_info() -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 1 + INFO_REQUEST_BODY.len());
    out.extend_from_slice(&HEADER_SINGLE.to_le_bytes());
    out.push(REQUEST_INFO);
    out.extend_from_slice(INFO_REQUEST_BODY);
    out
}

/// Encode an A2S_PLAYER request with the given challenge token.
pub fn encode_players(challenge: u32) -> Vec<u8> {
    encode_challenged(REQUEST_PLAYERS, challenge)
}

/// Encode an A2S_RULES request with the given challenge token.
pub fn encode_rules(challenge: u32) -> Vec<u8> {
    encode_challenged(REQUEST_RULES, challenge)
}

fn encode_challenged(request: u8, challenge: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    out.extend_from_slice(&HEADER_SINGLE.to_le_bytes());
    out.push(request);
    // Infallible: Vec<u8> writes cannot error.
    let _ = out.write_u32::<LittleEndian>(challenge);
    out
}

/// Decode a single-packet payload (the bytes after the `-1` outer header)
/// into a tagged response.
pub fn decode_response(payload: &[u8]) -> Result<Response, CodecError> {
    let mut r = Reader::new(payload);
    let header = r.u8()?;
    match header {
        // The token travels most-significant byte first, unlike every other
        // integer in the protocol.
        RESPONSE_CHALLENGE => Ok(Response::Challenge(r.u32_be()?)),
        RESPONSE_INFO => decode_info(&mut r).map(Response::Info),
        RESPONSE_PLAYERS => decode_players(&mut r).map(Response::Players),
        RESPONSE_RULES => decode_rules(&mut r).map(Response::Rules),
        other => Err(CodecError::UnknownHeader(other)),
    }
}

/// A2S_INFO response body.
///
/// The trailing fields are gated by the Extra Data Flag byte and absent on
/// older servers.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    /// Protocol version.
    pub protocol: u8,
    /// Server name.
    pub name: String,
    /// Game folder (e.g. `cs`, `csgo`, `tf`).
    pub folder: String,
    /// Current map.
    pub map: String,
    /// Full game name.
    pub game: String,
    /// Steam application id.
    pub app_id: u16,
    pub players: u8,
    pub max_players: u8,
    pub bots: u8,
    /// `d` dedicated, `l` listen, `p` SourceTV relay.
    pub server_type: u8,
    /// `l` Linux, `w` Windows, `m`/`o` macOS.
    pub environment: u8,
    pub password_protected: bool,
    pub vac_secured: bool,
    /// Game version string.
    pub version: String,
    /// Game port (EDF `0x80`).
    pub port: Option<u16>,
    /// Server SteamID (EDF `0x10`).
    pub steam_id: Option<u64>,
    /// SourceTV port and name (EDF `0x40`).
    pub spectator_port: Option<u16>,
    pub spectator_name: Option<String>,
    /// Comma-separated tags (EDF `0x20`).
    pub keywords: Option<String>,
    /// 64-bit game id (EDF `0x01`).
    pub game_id: Option<u64>,
}

fn decode_info(r: &mut Reader<'_>) -> Result<ServerInfo, CodecError> {
    let protocol = r.u8()?;
    let name = r.cstring()?;
    let folder = r.cstring()?;
    let map = r.cstring()?;
    let game = r.cstring()?;
    let app_id = r.u16()?;
    let players = r.u8()?;
    let max_players = r.u8()?;
    let bots = r.u8()?;
    let server_type = r.u8()?;
    let environment = r.u8()?;
    let password_protected = r.u8()? != 0;
    let vac_secured = r.u8()? != 0;
    let version = r.cstring()?;

    let mut info = ServerInfo {
        protocol,
        name,
        folder,
        map,
        game,
        app_id,
        players,
        max_players,
        bots,
        server_type,
        environment,
        password_protected,
        vac_secured,
        version,
        port: None,
        steam_id: None,
        spectator_port: None,
        spectator_name: None,
        keywords: None,
        game_id: None,
    };

    if r.remaining() == 0 {
        return Ok(info);
    }

    let edf = r.u8()?;
    if edf & 0x80 != 0 {
        info.port = Some(r.u16()?);
    }
    if edf & 0x10 != 0 {
        info.steam_id = Some(r.u64()?);
    }
    if edf & 0x40 != 0 {
        info.spectator_port = Some(r.u16()?);
        info.spectator_name = Some(r.cstring()?);
    }
    if edf & 0x20 != 0 {
        info.keywords = Some(r.cstring()?);
    }
    if edf & 0x01 != 0 {
        info.game_id = Some(r.u64()?);
    }

    Ok(info)
}

/// One entry of an A2S_PLAYER response.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInfo {
    /// Chunk index as sent by the server (not a stable player id).
    pub index: u8,
    pub name: String,
    pub score: i32,
    /// Connection time in seconds.
    pub duration: f32,
}

fn decode_players(r: &mut Reader<'_>) -> Result<Vec<PlayerInfo>, CodecError> {
    let count = r.u8()?;
    let mut players = Vec::with_capacity(count as usize);
    for _ in 0..count {
        players.push(PlayerInfo {
            index: r.u8()?,
            name: r.cstring()?,
            score: r.i32()?,
            duration: r.f32()?,
        });
    }
    Ok(players)
}

fn decode_rules(
    r: &mut Reader<'_>,
) -> Result<std::collections::HashMap<String, String>, CodecError> {
    let count = r.u16()?;
    let mut rules = std::collections::HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let key = r.cstring()?;
        let value = r.cstring()?;
        rules.insert(key, value);
    }
    Ok(rules)
}

/// Little-endian cursor over a response payload. Any read past the end is
/// a [`CodecError::ShortRead`].
struct Reader<'a> {
    cur: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            cur: Cursor::new(bytes),
        }
    }

    fn remaining(&self) -> usize {
        self.cur.get_ref().len() - self.cur.position() as usize
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        self.cur.read_u8().map_err(|_| CodecError::ShortRead)
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        self.cur
            .read_u16::<LittleEndian>()
            .map_err(|_| CodecError::ShortRead)
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        self.cur
            .read_i32::<LittleEndian>()
            .map_err(|_| CodecError::ShortRead)
    }

    fn u32_be(&mut self) -> Result<u32, CodecError> {
        self.cur
            .read_u32::<byteorder::BigEndian>()
            .map_err(|_| CodecError::ShortRead)
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        self.cur
            .read_u64::<LittleEndian>()
            .map_err(|_| CodecError::ShortRead)
    }

    fn f32(&mut self) -> Result<f32, CodecError> {
        self.cur
            .read_f32::<LittleEndian>()
            .map_err(|_| CodecError::ShortRead)
    }

    /// Read a NUL-terminated string, decoding lossily as UTF-8.
    fn cstring(&mut self) -> Result<String, CodecError> {
        let buf = *self.cur.get_ref();
        let start = self.cur.position() as usize;
        let nul = buf[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(CodecError::ShortRead)?;
        let s = String::from_utf8_lossy(&buf[start..start + nul]).into_owned();
        self.cur.set_position((start + nul + 1) as u64);
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn info_request_bytes() {
        let expected = b"\xFF\xFF\xFF\xFF\x54Source Engine Query\0";
        assert_eq!(encode_info(), expected);
    }

    #[test]
    fn players_request_initial_challenge() {
        assert_eq!(
            encode_players(INITIAL_CHALLENGE),
            hex!("FF FF FF FF 55 FF FF FF FF")
        );
    }

    #[test]
    fn players_request_token_little_endian() {
        // Token 0xDEADBEEF goes on the wire as EF BE AD DE.
        assert_eq!(
            encode_players(0xDEAD_BEEF),
            hex!("FF FF FF FF 55 EF BE AD DE")
        );
    }

    #[test]
    fn rules_request_bytes() {
        assert_eq!(
            encode_rules(INITIAL_CHALLENGE),
            hex!("FF FF FF FF 56 FF FF FF FF")
        );
    }

    #[test]
    fn classify_single_and_split() {
        assert_eq!(
            classify(&hex!("FF FF FF FF 49")).unwrap(),
            Datagram::Single(&[0x49])
        );
        assert_eq!(
            classify(&hex!("FE FF FF FF 01")).unwrap(),
            Datagram::Split(&[0x01])
        );
    }

    #[test]
    fn classify_rejects_unknown_outer_header() {
        assert!(matches!(
            classify(&hex!("00 00 00 00 49")),
            Err(CodecError::Framing)
        ));
    }

    #[test]
    fn classify_rejects_truncated_datagram() {
        assert!(matches!(
            classify(&hex!("FF FF")),
            Err(CodecError::ShortRead)
        ));
    }

    fn sample_info_payload() -> Vec<u8> {
        let mut p = vec![RESPONSE_INFO, 0x11];
        p.extend_from_slice(b"Test\0");
        p.extend_from_slice(b"cs\0");
        p.extend_from_slice(b"de_dust2\0");
        p.extend_from_slice(b"csgo\0");
        p.extend_from_slice(&730u16.to_le_bytes()); // app id
        p.extend_from_slice(&[12, 24, 2]); // players, max, bots
        p.extend_from_slice(b"dl"); // dedicated, linux
        p.extend_from_slice(&[0, 1]); // no password, VAC on
        p.extend_from_slice(b"1.38.7.9\0");
        p
    }

    #[test]
    fn decode_info_response() {
        let resp = decode_response(&sample_info_payload()).unwrap();
        let Response::Info(info) = resp else {
            panic!("expected info, got {resp:?}");
        };
        assert_eq!(info.protocol, 0x11);
        assert_eq!(info.name, "Test");
        assert_eq!(info.folder, "cs");
        assert_eq!(info.map, "de_dust2");
        assert_eq!(info.game, "csgo");
        assert_eq!(info.app_id, 730);
        assert_eq!(info.players, 12);
        assert_eq!(info.max_players, 24);
        assert_eq!(info.bots, 2);
        assert!(info.vac_secured);
        assert!(!info.password_protected);
        assert_eq!(info.port, None);
    }

    #[test]
    fn decode_info_with_edf_tail() {
        let mut p = sample_info_payload();
        p.push(0x80 | 0x20); // port + keywords
        p.extend_from_slice(&27015u16.to_le_bytes());
        p.extend_from_slice(b"secure,competitive\0");
        let Response::Info(info) = decode_response(&p).unwrap() else {
            panic!("expected info");
        };
        assert_eq!(info.port, Some(27015));
        assert_eq!(info.keywords.as_deref(), Some("secure,competitive"));
        assert_eq!(info.steam_id, None);
    }

    #[test]
    fn decode_players_response() {
        let mut p = vec![RESPONSE_PLAYERS, 0x02];
        p.push(0x00);
        p.extend_from_slice(b"Alice\0");
        p.extend_from_slice(&5i32.to_le_bytes());
        p.extend_from_slice(&4.0f32.to_le_bytes());
        p.push(0x01);
        p.extend_from_slice(b"Bob\0");
        p.extend_from_slice(&(-1i32).to_le_bytes());
        p.extend_from_slice(&120.5f32.to_le_bytes());

        let Response::Players(players) = decode_response(&p).unwrap() else {
            panic!("expected players");
        };
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].name, "Alice");
        assert_eq!(players[0].score, 5);
        assert_eq!(players[0].duration, 4.0);
        assert_eq!(players[1].name, "Bob");
        assert_eq!(players[1].score, -1);
    }

    #[test]
    fn decode_rules_response() {
        let mut p = vec![RESPONSE_RULES];
        p.extend_from_slice(&2u16.to_le_bytes());
        p.extend_from_slice(b"mp_friendlyfire\0");
        p.extend_from_slice(b"1\0");
        p.extend_from_slice(b"sv_gravity\0");
        p.extend_from_slice(b"800\0");

        let Response::Rules(rules) = decode_response(&p).unwrap() else {
            panic!("expected rules");
        };
        assert_eq!(rules.len(), 2);
        assert_eq!(rules["mp_friendlyfire"], "1");
        assert_eq!(rules["sv_gravity"], "800");
    }

    #[test]
    fn decode_challenge_response() {
        let resp = decode_response(&hex!("41 DE AD BE EF")).unwrap();
        assert_eq!(resp, Response::Challenge(0xDEAD_BEEF));
    }

    #[test]
    fn challenge_token_round_trip() {
        // Token DE AD BE EF from the server goes back out as EF BE AD DE.
        let Response::Challenge(token) = decode_response(&hex!("41 DE AD BE EF")).unwrap() else {
            panic!("expected challenge");
        };
        assert_eq!(
            encode_players(token),
            hex!("FF FF FF FF 55 EF BE AD DE")
        );
    }

    #[test]
    fn decode_unknown_header() {
        assert!(matches!(
            decode_response(&hex!("5A 00")),
            Err(CodecError::UnknownHeader(0x5A))
        ));
    }

    #[test]
    fn decode_truncated_players() {
        // Count says 1 but the record is cut off mid-name.
        assert!(matches!(
            decode_response(&hex!("44 01 00 41 6C")),
            Err(CodecError::ShortRead)
        ));
    }

    #[test]
    fn lossy_string_decoding() {
        let mut p = sample_info_payload();
        p[2] = 0xFF; // corrupt one byte of "Test"
        let Response::Info(info) = decode_response(&p).unwrap() else {
            panic!("expected info");
        };
        assert_eq!(info.name, "\u{FFFD}est");
    }
}

//! SmartSDR TCP line encoding and decoding.
//!
//! The SmartSDR text protocol uses newline-terminated ASCII lines over TCP
//! port 4992. Commands flow from client to radio; replies, status
//! broadcasts, messages and the handshake flow from radio to client.
//!
//! # Line formats
//!
//! ```text
//! Command:   C<seq>|<command_text>\n
//! Reply:     R<seq>|<hex_response_code>|<payload>\n
//! Status:    S<hex_handle>|<selector> <key>=<value> ...\n
//! Message:   M<hex_code>|<text>\n
//! Version:   V<major>.<minor>.<patch>.<build>\n
//! Handle:    H<hex_handle>\n
//! ```
//!
//! Everything here is pure parsing. The body of a status line is handed to
//! [`crate::status`] untouched, since it needs quote-aware tokenizing.

use bytes::{BufMut, Bytes, BytesMut};
use flexmirror_core::{EntityKey, EntityKind, Error, Result};

// ---------------------------------------------------------------------------
// Frequency conversion helpers
// ---------------------------------------------------------------------------

/// Convert frequency in Hz to MHz for SmartSDR commands.
pub fn hz_to_mhz(hz: u64) -> f64 {
    hz as f64 / 1_000_000.0
}

/// Convert frequency in MHz (as sent by the radio) to Hz.
pub fn mhz_to_hz(mhz: f64) -> u64 {
    (mhz * 1_000_000.0).round() as u64
}

// ---------------------------------------------------------------------------
// Command encoding
// ---------------------------------------------------------------------------

/// Encode a command with its sequence number.
///
/// Format: `C<seq>|<command>\n`
pub fn encode_command(seq: u32, command: &str) -> Bytes {
    let seq = seq.to_string();
    let mut buf = BytesMut::with_capacity(command.len() + seq.len() + 3);
    buf.put_u8(b'C');
    buf.put_slice(seq.as_bytes());
    buf.put_u8(b'|');
    buf.put_slice(command.as_bytes());
    buf.put_u8(b'\n');
    buf.freeze()
}

// ---------------------------------------------------------------------------
// Command builders
//
// Each builder returns the command text WITHOUT the `C<seq>|` prefix. The
// prefix is added by the request tracker when it assigns a sequence number.
// ---------------------------------------------------------------------------

/// Example output: `"client program flexmirror"`
pub fn cmd_client_program(name: &str) -> String {
    format!("client program {}", name)
}

/// Tell the radio which local UDP port receives stream packets.
///
/// Example output: `"client udpport 4991"`
pub fn cmd_client_udpport(port: u16) -> String {
    format!("client udpport {}", port)
}

/// Example output: `"sub slice all"`
pub fn cmd_subscribe(object: &str) -> String {
    format!("sub {}", object)
}

/// Example output: `"slice create freq=14.250000 mode=USB"`
pub fn cmd_slice_create(freq_hz: u64, mode: &str) -> String {
    format!("slice create freq={:.6} mode={}", hz_to_mhz(freq_hz), mode)
}

/// Example output: `"display pan create x=1024 y=700"`
pub fn cmd_panadapter_create(x_pixels: u32, y_pixels: u32) -> String {
    format!("display pan create x={} y={}", x_pixels, y_pixels)
}

/// Example output: `"memory create"`
pub fn cmd_memory_create() -> String {
    "memory create".to_string()
}

/// Example output: `"tnf create freq=14.100000"`
pub fn cmd_tnf_create(freq_hz: u64) -> String {
    format!("tnf create freq={:.6}", hz_to_mhz(freq_hz))
}

/// Example output: `"xvtr create"`
pub fn cmd_xvtr_create() -> String {
    "xvtr create".to_string()
}

/// Create a DAX receive audio stream on a DAX channel (1-8).
///
/// Example output: `"stream create dax=1"`
pub fn cmd_stream_create_dax(dax_channel: u8) -> String {
    format!("stream create dax={}", dax_channel)
}

/// Example output: `"stream create daxmic"`
pub fn cmd_stream_create_daxmic() -> String {
    "stream create daxmic".to_string()
}

/// Example output: `"stream create daxtx"`
pub fn cmd_stream_create_daxtx() -> String {
    "stream create daxtx".to_string()
}

/// Create a DAX IQ stream on a DAX IQ channel (1-4).
///
/// Example output: `"stream create daxiq=2"`
pub fn cmd_stream_create_daxiq(daxiq_channel: u8) -> String {
    format!("stream create daxiq={}", daxiq_channel)
}

/// Build the removal command for an entity.
///
/// Equalizers are fixed objects on the radio and cannot be removed.
///
/// Example output: `"slice remove 0"`, `"stream remove 0x20000001"`
pub fn cmd_remove(key: EntityKey) -> Result<String> {
    let cmd = match key.kind {
        EntityKind::Slice => format!("slice remove {}", key.id),
        EntityKind::Panadapter => format!("display pan remove 0x{:08X}", key.id),
        EntityKind::Waterfall => {
            return Err(Error::Unsupported(
                "waterfalls are removed with their panadapter".into(),
            ));
        }
        EntityKind::Memory => format!("memory remove {}", key.id),
        EntityKind::Tnf => format!("tnf remove {}", key.id),
        EntityKind::Xvtr => format!("xvtr remove {}", key.id),
        EntityKind::AudioStream
        | EntityKind::MicAudioStream
        | EntityKind::IqStream
        | EntityKind::TxAudioStream => format!("stream remove 0x{:08X}", key.id),
        EntityKind::Equalizer => {
            return Err(Error::Unsupported("equalizer removal".into()));
        }
    };
    Ok(cmd)
}

// ---------------------------------------------------------------------------
// Reply / status / message types
// ---------------------------------------------------------------------------

/// A reply to a previously sent command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartSdrReply {
    /// Sequence number of the command this answers.
    pub sequence: u32,
    /// `0` on success, otherwise a SmartSDR error code.
    pub code: u32,
    /// Reply payload (may be empty). For creation commands this is the new id.
    pub payload: String,
}

/// An unsolicited status broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartSdrStatus {
    /// The client handle this status was sent to.
    pub handle: u32,
    /// Everything after the `|`: selector plus key/value tokens.
    pub payload: String,
}

/// A decoded handshake version line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartSdrVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
}

/// Lines received on the SmartSDR command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmartSdrMessage {
    /// Handshake version line: `V1.4.0.0`
    Version(SmartSdrVersion),
    /// Handshake client handle: `H12345678`
    Handle(u32),
    /// Reply to a command: `R<seq>|<code>|<payload>`
    Reply(SmartSdrReply),
    /// Status broadcast: `S<handle>|<payload>`
    Status(SmartSdrStatus),
    /// Radio message: `M<code>|<text>`
    Message { code: u32, text: String },
    /// An unrecognised line.
    Unknown(String),
}

// ---------------------------------------------------------------------------
// Line parsing
// ---------------------------------------------------------------------------

/// Parse a single line received from the command channel.
///
/// The line should NOT include the trailing `\n`. Leading and trailing
/// whitespace is stripped.
pub fn parse_message(line: &str) -> Result<SmartSdrMessage> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::Protocol("empty line".into()));
    }

    match line.as_bytes()[0] {
        b'V' => parse_version(line),
        b'H' => parse_handle(line),
        b'R' => parse_reply(line),
        b'S' => parse_status(line),
        b'M' => parse_msg(line),
        _ => Ok(SmartSdrMessage::Unknown(line.to_string())),
    }
}

/// Parse a version line: `V<major>.<minor>.<patch>.<build>`
fn parse_version(line: &str) -> Result<SmartSdrMessage> {
    let parts: Vec<&str> = line[1..].split('.').collect();
    if parts.len() != 4 {
        return Err(Error::Protocol(format!("invalid version format: {line}")));
    }

    let parse_u32 = |s: &str| -> Result<u32> {
        s.parse::<u32>()
            .map_err(|_| Error::Protocol(format!("invalid version number: {s}")))
    };

    Ok(SmartSdrMessage::Version(SmartSdrVersion {
        major: parse_u32(parts[0])?,
        minor: parse_u32(parts[1])?,
        patch: parse_u32(parts[2])?,
        build: parse_u32(parts[3])?,
    }))
}

/// Parse a handle line: `H<hex>`
fn parse_handle(line: &str) -> Result<SmartSdrMessage> {
    let body = &line[1..];
    let handle = u32::from_str_radix(body, 16)
        .map_err(|_| Error::Protocol(format!("invalid hex handle: {body}")))?;
    Ok(SmartSdrMessage::Handle(handle))
}

/// Parse a reply line: `R<seq>|<hex_code>|<payload>`
fn parse_reply(line: &str) -> Result<SmartSdrMessage> {
    let parts: Vec<&str> = line[1..].splitn(3, '|').collect();
    if parts.len() < 2 {
        return Err(Error::Protocol(format!(
            "malformed reply (need at least seq|code): {line}"
        )));
    }

    let sequence = parts[0]
        .parse::<u32>()
        .map_err(|_| Error::Protocol(format!("invalid reply sequence number: {}", parts[0])))?;

    let code = u32::from_str_radix(parts[1], 16)
        .map_err(|_| Error::Protocol(format!("invalid reply code: {}", parts[1])))?;

    let payload = parts.get(2).map(|s| s.to_string()).unwrap_or_default();

    Ok(SmartSdrMessage::Reply(SmartSdrReply {
        sequence,
        code,
        payload,
    }))
}

/// Parse a status line: `S<hex_handle>|<payload>`
fn parse_status(line: &str) -> Result<SmartSdrMessage> {
    let body = &line[1..];
    let (handle_str, payload) = body
        .split_once('|')
        .ok_or_else(|| Error::Protocol(format!("malformed status (no pipe): {line}")))?;

    let handle = u32::from_str_radix(handle_str, 16)
        .map_err(|_| Error::Protocol(format!("invalid status handle: {handle_str}")))?;

    Ok(SmartSdrMessage::Status(SmartSdrStatus {
        handle,
        payload: payload.to_string(),
    }))
}

/// Parse a message line: `M<hex_code>|<text>`
fn parse_msg(line: &str) -> Result<SmartSdrMessage> {
    let body = &line[1..];
    let (code_str, text) = body
        .split_once('|')
        .ok_or_else(|| Error::Protocol(format!("malformed message (no pipe): {line}")))?;

    let code = u32::from_str_radix(code_str, 16)
        .map_err(|_| Error::Protocol(format!("invalid message code: {code_str}")))?;

    Ok(SmartSdrMessage::Message {
        code,
        text: text.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Status line tokenizing.
//!
//! A status payload is a selector followed by `key=value` tokens:
//!
//! ```text
//! slice 0 RF_frequency=14.250000 mode=USB in_use=1
//! memory 3 name="Net Control" owner="K1ABC"
//! display pan 0x40000000 removed
//! ```
//!
//! Free-text values may contain spaces and `=` when quoted. Before the
//! payload is split on whitespace, quoted spaces and quoted `=` are swapped
//! for two private control bytes and the quote characters are dropped; free
//! text fields reverse the swap with [`unescape`] before storing.
//!
//! Keys are lowercased so entity vocabularies match case-insensitively.

use flexmirror_core::{EntityKey, EntityKind};

/// Stand-in for a space inside quotes.
pub const QUOTED_SPACE: char = '\u{7F}';

/// Stand-in for an `=` inside quotes.
pub const QUOTED_EQUALS: char = '\u{1F}';

/// Hide quoted spaces and `=` from the tokenizer and strip the quotes.
pub fn escape_quoted(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ' ' if in_quotes => out.push(QUOTED_SPACE),
            '=' if in_quotes => out.push(QUOTED_EQUALS),
            _ => out.push(c),
        }
    }

    out
}

/// Restore the characters hidden by [`escape_quoted`].
pub fn unescape(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            QUOTED_SPACE => ' ',
            QUOTED_EQUALS => '=',
            other => other,
        })
        .collect()
}

/// What a status line is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// One of the mirrored entity kinds, with its identifier.
    Entity(EntityKey),
    /// Any other object (`radio`, `interlock`, `meter`, ...), verbatim.
    Other(String),
}

/// One tokenized status payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub selector: Selector,
    /// `(lowercased key, escaped value)` in line order.
    pub pairs: Vec<(String, String)>,
    /// The line carried the bare `removed` marker.
    pub removed: bool,
}

impl StatusLine {
    /// The value of `key`, if present. Keys are compared lowercased.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Tokenize a status payload (the text after `S<handle>|`).
///
/// Returns `None` for an empty payload. Tokens that are not a single
/// `key=value` pair are logged and skipped; the rest of the line is still
/// parsed.
pub fn parse_status_line(payload: &str) -> Option<StatusLine> {
    let escaped = escape_quoted(payload);
    let mut words: Vec<&str> = Vec::new();
    let mut pairs = Vec::new();
    let mut removed = false;

    for token in escaped.split_whitespace() {
        if token.eq_ignore_ascii_case("removed") {
            removed = true;
            continue;
        }

        let equals = token.matches('=').count();
        if equals == 0 && pairs.is_empty() {
            words.push(token);
            continue;
        }

        match token.split_once('=') {
            Some((key, value)) if equals == 1 && !key.is_empty() => {
                pairs.push((key.to_ascii_lowercase(), value.to_string()));
            }
            _ => {
                tracing::trace!(token = %unescape(token), payload = %payload, "Skipping malformed status token");
            }
        }
    }

    if words.is_empty() && pairs.is_empty() && !removed {
        return None;
    }

    Some(StatusLine {
        selector: parse_selector(&words),
        pairs,
        removed,
    })
}

/// Map the leading words of a status payload to a registry key.
fn parse_selector(words: &[&str]) -> Selector {
    let entity = match words {
        ["slice", id] => parse_id(id, false).map(|id| (EntityKind::Slice, id)),
        ["display", "pan", id] => parse_id(id, true).map(|id| (EntityKind::Panadapter, id)),
        ["display", "waterfall", id] => parse_id(id, true).map(|id| (EntityKind::Waterfall, id)),
        ["memory", id] => parse_id(id, false).map(|id| (EntityKind::Memory, id)),
        ["eq", "rxsc"] => Some((EntityKind::Equalizer, EQ_RX)),
        ["eq", "txsc"] => Some((EntityKind::Equalizer, EQ_TX)),
        ["tnf", id] => parse_id(id, false).map(|id| (EntityKind::Tnf, id)),
        ["xvtr", id] => parse_id(id, false).map(|id| (EntityKind::Xvtr, id)),
        ["audio_stream", id] => parse_id(id, true).map(|id| (EntityKind::AudioStream, id)),
        ["mic_audio_stream", id] => parse_id(id, true).map(|id| (EntityKind::MicAudioStream, id)),
        ["tx_audio_stream", id] => parse_id(id, true).map(|id| (EntityKind::TxAudioStream, id)),
        ["daxiq", id] => parse_id(id, true).map(|id| (EntityKind::IqStream, id)),
        _ => None,
    };

    match entity {
        Some((kind, id)) => Selector::Entity(EntityKey::new(kind, id)),
        None => Selector::Other(words.join(" ")),
    }
}

/// Registry id of the receive equalizer.
pub const EQ_RX: u32 = 0;

/// Registry id of the transmit equalizer.
pub const EQ_TX: u32 = 1;

/// Parse an identifier. A `0x` prefix always means hex; otherwise the
/// kind's usual radix applies.
pub fn parse_id(text: &str, hex_by_default: bool) -> Option<u32> {
    let text = text.trim();
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        return u32::from_str_radix(hex, 16).ok();
    }
    if hex_by_default {
        u32::from_str_radix(text, 16).ok()
    } else {
        text.parse().ok()
    }
}

//! Identifier and lifecycle types shared across flexmirror.
//!
//! These types name the device concepts that the engine mirrors, without
//! carrying any of their field state. Field state lives in the engine crate.

use std::fmt;

/// The kind of device object an entity mirrors.
///
/// Identifiers are unique only within a kind: slice `0` and memory `0` are
/// different entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    /// An independent receiver.
    Slice,
    /// A spectrum display.
    Panadapter,
    /// A waterfall display, always the child of a panadapter.
    Waterfall,
    /// A stored memory channel.
    Memory,
    /// The RX or TX audio equalizer.
    Equalizer,
    /// A tracking notch filter.
    Tnf,
    /// A transverter definition.
    Xvtr,
    /// A DAX receive audio stream.
    AudioStream,
    /// A DAX microphone audio stream.
    MicAudioStream,
    /// A DAX IQ stream.
    IqStream,
    /// A DAX transmit audio stream.
    TxAudioStream,
}

impl EntityKind {
    /// Every kind, in declaration order.
    pub const ALL: [EntityKind; 11] = [
        EntityKind::Slice,
        EntityKind::Panadapter,
        EntityKind::Waterfall,
        EntityKind::Memory,
        EntityKind::Equalizer,
        EntityKind::Tnf,
        EntityKind::Xvtr,
        EntityKind::AudioStream,
        EntityKind::MicAudioStream,
        EntityKind::IqStream,
        EntityKind::TxAudioStream,
    ];

    /// Short lowercase name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Slice => "slice",
            EntityKind::Panadapter => "panadapter",
            EntityKind::Waterfall => "waterfall",
            EntityKind::Memory => "memory",
            EntityKind::Equalizer => "equalizer",
            EntityKind::Tnf => "tnf",
            EntityKind::Xvtr => "xvtr",
            EntityKind::AudioStream => "audio_stream",
            EntityKind::MicAudioStream => "mic_audio_stream",
            EntityKind::IqStream => "iq_stream",
            EntityKind::TxAudioStream => "tx_audio_stream",
        }
    }

    /// Whether the radio assigns this kind a hex stream id rather than a
    /// small decimal index.
    pub fn uses_hex_id(&self) -> bool {
        self.stream_shape().is_some()
    }

    /// The packet shape carried by this kind's data stream, if it has one.
    pub fn stream_shape(&self) -> Option<StreamShape> {
        match self {
            EntityKind::Panadapter | EntityKind::Waterfall => Some(StreamShape::Tiled),
            EntityKind::AudioStream
            | EntityKind::MicAudioStream
            | EntityKind::IqStream
            | EntityKind::TxAudioStream => Some(StreamShape::SampleBlock),
            _ => None,
        }
    }

    /// Whether this kind is a DAX stream with a per-client owner.
    ///
    /// Display kinds carry data too, but every client that can see them
    /// receives their packets.
    pub fn has_owner(&self) -> bool {
        self.stream_shape() == Some(StreamShape::SampleBlock)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a kind's real-time packets assemble into deliverable units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamShape {
    /// Each packet is a self-contained block of samples.
    SampleBlock,
    /// Packets are tiles of a larger frame, addressed by frame id and offset.
    Tiled,
}

/// Registry key: the entity kind plus the identifier the radio assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: u32,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: u32) -> Self {
        EntityKey { kind, id }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.uses_hex_id() {
            write!(f, "{} 0x{:08X}", self.kind, self.id)
        } else {
            write!(f, "{} {}", self.kind, self.id)
        }
    }
}

/// Lifecycle of a mirrored entity.
///
/// The ordering of the variants is the order of the lifecycle. A live
/// entity only ever moves forward through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AckState {
    /// Held by the caller; no command has been sent yet.
    Local,
    /// A creation command is in flight.
    Pending,
    /// The radio assigned an identifier and the entity is registered.
    Identified,
    /// Enough state has been observed for the entity to be usable.
    Acked,
    /// Evicted from the registry.
    Removed,
}

impl AckState {
    /// Move to `next` if it is later in the lifecycle.
    ///
    /// Returns `true` only when the state actually changed, so callers can
    /// use the return value to fire one-shot notifications.
    pub fn advance(&mut self, next: AckState) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}

impl fmt::Display for AckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AckState::Local => "local",
            AckState::Pending => "pending",
            AckState::Identified => "identified",
            AckState::Acked => "acked",
            AckState::Removed => "removed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_state_advances_forward_only() {
        let mut state = AckState::Identified;
        assert!(state.advance(AckState::Acked));
        assert_eq!(state, AckState::Acked);

        assert!(!state.advance(AckState::Acked));
        assert!(!state.advance(AckState::Pending));
        assert_eq!(state, AckState::Acked);

        assert!(state.advance(AckState::Removed));
        assert!(!state.advance(AckState::Identified));
        assert_eq!(state, AckState::Removed);
    }

    #[test]
    fn stream_shapes_by_kind() {
        assert_eq!(EntityKind::Panadapter.stream_shape(), Some(StreamShape::Tiled));
        assert_eq!(EntityKind::Waterfall.stream_shape(), Some(StreamShape::Tiled));
        assert_eq!(
            EntityKind::IqStream.stream_shape(),
            Some(StreamShape::SampleBlock)
        );
        assert_eq!(EntityKind::Slice.stream_shape(), None);
        assert_eq!(EntityKind::Equalizer.stream_shape(), None);
    }

    #[test]
    fn only_dax_streams_have_owners() {
        let owned: Vec<EntityKind> = EntityKind::ALL
            .iter()
            .copied()
            .filter(EntityKind::has_owner)
            .collect();
        assert_eq!(
            owned,
            vec![
                EntityKind::AudioStream,
                EntityKind::MicAudioStream,
                EntityKind::IqStream,
                EntityKind::TxAudioStream,
            ]
        );
    }

    #[test]
    fn key_display_uses_kind_id_format() {
        assert_eq!(EntityKey::new(EntityKind::Slice, 3).to_string(), "slice 3");
        assert_eq!(
            EntityKey::new(EntityKind::AudioStream, 0x1A2B).to_string(),
            "audio_stream 0x00001A2B"
        );
    }
}

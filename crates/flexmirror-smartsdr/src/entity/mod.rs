//! Mirrored device objects.
//!
//! An [`Entity`] is the client-side copy of one addressable object on the
//! radio. Its kind-specific state lives in [`EntityFields`]; each kind has
//! its own vocabulary of status keys in a submodule.
//!
//! Applying a status line yields the canonical names of the fields whose
//! value changed, which is what the mirror publishes alongside a snapshot.

use std::str::FromStr;

use flexmirror_core::{AckState, EntityKey, EntityKind};

use crate::codec::mhz_to_hz;

pub mod display;
pub mod equalizer;
pub mod memory;
pub mod slice;
pub mod stream;
pub mod tnf;
pub mod xvtr;

pub use display::{PanadapterFields, WaterfallFields};
pub use equalizer::EqualizerFields;
pub use memory::MemoryFields;
pub use slice::SliceFields;
pub use stream::{
    AudioStreamFields, IqStreamFields, MicAudioStreamFields, StreamEndpoint, TxAudioStreamFields,
};
pub use tnf::TnfFields;
pub use xvtr::XvtrFields;

/// Outcome of applying one `key=value` pair to a kind's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The named field took a new value.
    Changed(&'static str),
    /// The key is known and the value matched what was already stored.
    Unchanged,
    /// The key is known to the protocol but carries no modeled state.
    Unmodeled,
    /// The key is not part of this kind's vocabulary.
    Unknown,
}

/// Result of applying one pair; `Err` carries a reason for a bad value.
pub type ApplyResult = Result<Applied, String>;

/// Kind-specific field state.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityFields {
    Slice(SliceFields),
    Panadapter(PanadapterFields),
    Waterfall(WaterfallFields),
    Memory(MemoryFields),
    Equalizer(EqualizerFields),
    Tnf(TnfFields),
    Xvtr(XvtrFields),
    AudioStream(AudioStreamFields),
    MicAudioStream(MicAudioStreamFields),
    IqStream(IqStreamFields),
    TxAudioStream(TxAudioStreamFields),
}

impl EntityFields {
    /// Default (never observed) fields for `kind`.
    pub fn new(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Slice => EntityFields::Slice(SliceFields::default()),
            EntityKind::Panadapter => EntityFields::Panadapter(PanadapterFields::default()),
            EntityKind::Waterfall => EntityFields::Waterfall(WaterfallFields::default()),
            EntityKind::Memory => EntityFields::Memory(MemoryFields::default()),
            EntityKind::Equalizer => EntityFields::Equalizer(EqualizerFields::default()),
            EntityKind::Tnf => EntityFields::Tnf(TnfFields::default()),
            EntityKind::Xvtr => EntityFields::Xvtr(XvtrFields::default()),
            EntityKind::AudioStream => EntityFields::AudioStream(AudioStreamFields::default()),
            EntityKind::MicAudioStream => {
                EntityFields::MicAudioStream(MicAudioStreamFields::default())
            }
            EntityKind::IqStream => EntityFields::IqStream(IqStreamFields::default()),
            EntityKind::TxAudioStream => {
                EntityFields::TxAudioStream(TxAudioStreamFields::default())
            }
        }
    }

    fn apply(&mut self, key: &str, value: &str) -> ApplyResult {
        match self {
            EntityFields::Slice(f) => f.apply(key, value),
            EntityFields::Panadapter(f) => f.apply(key, value),
            EntityFields::Waterfall(f) => f.apply(key, value),
            EntityFields::Memory(f) => f.apply(key, value),
            EntityFields::Equalizer(f) => f.apply(key, value),
            EntityFields::Tnf(f) => f.apply(key, value),
            EntityFields::Xvtr(f) => f.apply(key, value),
            EntityFields::AudioStream(f) => f.apply(key, value),
            EntityFields::MicAudioStream(f) => f.apply(key, value),
            EntityFields::IqStream(f) => f.apply(key, value),
            EntityFields::TxAudioStream(f) => f.apply(key, value),
        }
    }
}

/// The client-side mirror of one radio object.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    key: EntityKey,
    ack: AckState,
    owned: bool,
    status_seen: bool,
    fields: EntityFields,
}

impl Entity {
    pub fn new(key: EntityKey, ack: AckState, owned: bool) -> Self {
        Self {
            key,
            ack,
            owned,
            status_seen: false,
            fields: EntityFields::new(key.kind),
        }
    }

    pub fn key(&self) -> EntityKey {
        self.key
    }

    pub fn kind(&self) -> EntityKind {
        self.key.kind
    }

    pub fn id(&self) -> u32 {
        self.key.id
    }

    pub fn ack_state(&self) -> AckState {
        self.ack
    }

    pub fn is_acked(&self) -> bool {
        self.ack == AckState::Acked
    }

    /// Whether this client created the entity.
    ///
    /// Entities first seen through a broadcast (another client's streams,
    /// for example) are mirrored but not owned.
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    pub fn fields(&self) -> &EntityFields {
        &self.fields
    }

    /// Whether the kind's own required fields have been observed.
    ///
    /// Dependencies on other entities are checked by the ack resolver.
    pub fn own_fields_ready(&self) -> bool {
        match &self.fields {
            EntityFields::Slice(f) => f.in_use,
            EntityFields::Panadapter(f) => f.waterfall.is_some(),
            EntityFields::Waterfall(f) => f.panadapter.is_some(),
            EntityFields::Memory(_) | EntityFields::Equalizer(_) | EntityFields::Xvtr(_) => {
                self.status_seen
            }
            EntityFields::Tnf(f) => f.is_complete(),
            EntityFields::AudioStream(f) => f.endpoint.ip.is_some(),
            EntityFields::MicAudioStream(f) => f.endpoint.ip.is_some(),
            EntityFields::IqStream(f) => f.endpoint.ip.is_some(),
            EntityFields::TxAudioStream(f) => f.endpoint.ip.is_some(),
        }
    }

    pub(crate) fn set_ack(&mut self, next: AckState) -> bool {
        self.ack.advance(next)
    }

    pub(crate) fn set_owned(&mut self) {
        self.owned = true;
    }

    /// Apply every pair of one status line and return the names of the
    /// fields that changed, in line order.
    pub(crate) fn apply_status(&mut self, pairs: &[(String, String)]) -> Vec<&'static str> {
        self.status_seen = true;
        let mut changed = Vec::new();

        for (key, value) in pairs {
            match self.fields.apply(key, value) {
                Ok(Applied::Changed(name)) => {
                    if !changed.contains(&name) {
                        changed.push(name);
                    }
                }
                Ok(Applied::Unchanged) | Ok(Applied::Unmodeled) => {}
                Ok(Applied::Unknown) => {
                    tracing::trace!(entity = %self.key, key = %key, value = %value, "Unknown status key");
                }
                Err(reason) => {
                    tracing::debug!(entity = %self.key, key = %key, value = %value, reason = %reason, "Invalid status value");
                }
            }
        }

        changed
    }
}

// ---------------------------------------------------------------------------
// Value helpers shared by the per-kind vocabularies
// ---------------------------------------------------------------------------

/// Store `value` in `slot`, reporting whether it changed.
pub(crate) fn set<T: PartialEq>(slot: &mut T, value: T, name: &'static str) -> Applied {
    if *slot == value {
        Applied::Unchanged
    } else {
        *slot = value;
        Applied::Changed(name)
    }
}

pub(crate) fn parse<T: FromStr>(value: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("cannot parse {:?} as {}", value, std::any::type_name::<T>()))
}

/// `0` is false, any other integer is true.
pub(crate) fn parse_flag(value: &str) -> Result<bool, String> {
    parse::<u8>(value).map(|v| v != 0)
}

/// A frequency sent in MHz, stored in Hz.
pub(crate) fn parse_mhz(value: &str) -> Result<u64, String> {
    let mhz: f64 = parse(value)?;
    if mhz < 0.0 || !mhz.is_finite() {
        return Err(format!("negative or non-finite frequency {:?}", value));
    }
    Ok(mhz_to_hz(mhz))
}

/// A signed offset sent in MHz, stored in Hz.
pub(crate) fn parse_mhz_offset(value: &str) -> Result<i64, String> {
    let mhz: f64 = parse(value)?;
    if !mhz.is_finite() {
        return Err(format!("non-finite offset {:?}", value));
    }
    Ok((mhz * 1_000_000.0).round() as i64)
}

/// A reference to a hex-identified object (`0x40000000`). `0` means none.
pub(crate) fn parse_hex_ref(value: &str) -> Result<u32, String> {
    crate::status::parse_id(value, true).ok_or_else(|| format!("invalid hex id {:?}", value))
}

/// A comma-separated list.
pub(crate) fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

//! Notifications published by the mirror.
//!
//! Entity and throughput events go out on one broadcast channel and
//! reassembled stream data on another, so a slow frame consumer cannot
//! push lifecycle events out of a subscriber's queue.

use flexmirror_core::{EntityKey, EntityKind};

use crate::entity::Entity;

/// A state-synchronization event.
///
/// Events are delivered on a best-effort basis through a bounded broadcast
/// channel; slow consumers may miss events under heavy load.
#[derive(Debug, Clone)]
pub enum MirrorEvent {
    /// The handshake completed and the client handle is known.
    Connected {
        /// Client handle assigned by the radio.
        handle: u32,
    },

    /// The command channel closed.
    Disconnected,

    /// An entity reached the Acked state. Fires once per entity.
    EntityAdded(Entity),

    /// A status line changed one or more fields of a registered entity.
    EntityUpdated {
        /// The entity after the update.
        entity: Entity,
        /// Canonical names of the fields whose value changed.
        changed: Vec<&'static str>,
    },

    /// An entity was evicted from the registry.
    EntityRemoved(EntityKey),

    /// Bytes received on an owned stream over the last sample period,
    /// scaled to one second.
    ThroughputUpdated {
        stream_id: u32,
        bytes_per_sec: u64,
    },

    /// A free-text message from the radio (`M` line).
    RadioMessage {
        code: u32,
        text: String,
    },
}

/// Reassembled stream data.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    /// One packet's worth of float samples.
    Samples(Vec<f32>),
    /// One complete spectrum or waterfall frame.
    Bins(Vec<u16>),
}

/// A unit of stream data ready for subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub stream_id: u32,
    pub kind: EntityKind,
    pub data: FrameData,
}

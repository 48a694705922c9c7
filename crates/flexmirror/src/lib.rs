//! # flexmirror -- a client-side mirror of a FlexRadio
//!
//! `flexmirror` connects to a FlexRadio over the SmartSDR protocol and keeps
//! a live copy of the radio's objects: slices, panadapters and waterfalls,
//! memories, equalizers, notch filters, transverters and DAX streams. Stream
//! packets are checked for loss and reassembled into whole frames.
//!
//! ## Quick Start
//!
//! ```no_run
//! use flexmirror::{EntityRequest, MirrorBuilder, MirrorEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = MirrorBuilder::new().host("192.168.1.100").build().await?;
//!     let mut events = client.subscribe();
//!
//!     client.create(&EntityRequest::audio_stream(1)).await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let MirrorEvent::ThroughputUpdated { stream_id, bytes_per_sec } = event {
//!             println!("0x{stream_id:08X}: {bytes_per_sec} B/s");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                     | Purpose                                        |
//! |---------------------------|------------------------------------------------|
//! | `flexmirror-core`         | Error type, entity kinds, keys and ack states  |
//! | `flexmirror-transport`    | TCP connect and UDP bind with bounded retry    |
//! | `flexmirror-smartsdr`     | Line codec, entity mirror, stream reassembly   |
//! | **`flexmirror`**          | This facade crate -- re-exports everything     |
//!
//! ## Lifecycle
//!
//! Every mirrored object moves forward through [`AckState`]: Local,
//! Pending, Identified, Acked, Removed. [`MirrorEvent::EntityAdded`] fires
//! exactly once, when an entity becomes Acked; every status line that
//! touches an entity also yields [`MirrorEvent::EntityUpdated`] with the
//! names of the fields that changed.

pub use flexmirror_core::*;

pub use flexmirror_smartsdr::{
    ClientOptions, Entity, EntityFields, EntityRequest, Frame, FrameData, MirrorBuilder,
    MirrorClient, MirrorEvent, MirrorTransports, RadioMirror, RequestState, StreamStats,
};

/// The SmartSDR engine: codec, entity vocabularies, registry and streams.
pub mod smartsdr {
    pub use flexmirror_smartsdr::*;
}

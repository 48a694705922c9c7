//! SmartSDR state mirror and stream reassembly engine.
//!
//! This crate keeps a client-side copy of the objects a FlexRadio exposes
//! over the SmartSDR protocol (slices, panadapters, waterfalls, memories,
//! equalizers, notch filters, transverters and DAX streams) and turns the
//! radio's VITA-49 packets into complete frames. It provides:
//!
//! - **Line codec** ([`codec`]) -- `C`/`R`/`S`/`M`/`V`/`H` line parsing and
//!   command builders.
//! - **Status parsing** ([`status`]) -- quote-aware tokenizing of status
//!   payloads and selector mapping.
//! - **Request tracking** ([`tracker`]) -- sequence numbers and one-shot
//!   reply continuations.
//! - **Entities** ([`entity`], [`registry`], [`ack`], [`request`]) -- per-kind
//!   field vocabularies, the registry, cross-entity ack rules and the
//!   creation request lifecycle.
//! - **Streams** ([`vita49`], [`reassembly`], [`sampler`]) -- packet decoding,
//!   loss detection, frame reassembly and throughput sampling.
//! - **Mirror** ([`mirror`]) -- the synchronous dispatch core tying it all
//!   together.
//! - **Client** ([`client`], [`builder`]) -- the async TCP/UDP client and
//!   its builder.
//!
//! # Architecture
//!
//! [`RadioMirror`] is fully synchronous: it never awaits and never blocks
//! on I/O. [`MirrorClient`] owns the sockets and feeds the mirror from
//! three background tasks (TCP writer, TCP reader, UDP reader). Results
//! are published on two broadcast channels: [`MirrorEvent`]s for entity
//! lifecycle and throughput, and [`Frame`]s for stream data.
//!
//! # Example
//!
//! ```no_run
//! use flexmirror_smartsdr::{EntityRequest, MirrorBuilder, MirrorEvent};
//!
//! # async fn example() -> flexmirror_core::Result<()> {
//! let client = MirrorBuilder::new().host("192.168.1.100").build().await?;
//! let mut events = client.subscribe();
//!
//! let pan = client.create(&EntityRequest::panadapter(1024, 700)).await?;
//! println!("created {pan}");
//!
//! while let Ok(event) = events.recv().await {
//!     if let MirrorEvent::EntityAdded(entity) = event {
//!         println!("acked {}", entity.key());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod ack;
pub mod builder;
pub mod client;
pub mod codec;
pub mod entity;
pub mod events;
pub mod mirror;
pub mod reassembly;
pub mod registry;
pub mod request;
pub mod sampler;
pub mod status;
pub mod tracker;
pub mod vita49;

pub use builder::{MirrorBuilder, MirrorTransports};
pub use client::{ClientOptions, MirrorClient};
pub use entity::{Entity, EntityFields};
pub use events::{Frame, FrameData, MirrorEvent};
pub use mirror::RadioMirror;
pub use reassembly::StreamStats;
pub use request::{EntityRequest, RequestState};

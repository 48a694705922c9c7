//! The synchronous dispatch core.
//!
//! [`RadioMirror`] owns the request tracker, the entity registry, the
//! attached stream reassemblers and the rate samplers. The async client
//! feeds it lines from the command channel and packets from the stream
//! socket; everything it does in response is synchronous and returns
//! without waiting, so the receive loops are never stalled.
//!
//! Locking discipline: the registry and the stream table each sit behind
//! their own `std::sync::Mutex`. When both are needed the registry is
//! taken first. Neither is held while events are published.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bytes::Bytes;
use flexmirror_core::{EntityKey, EntityKind, Result};
use tokio::sync::{broadcast, mpsc};

use crate::ack::AckDependencyResolver;
use crate::codec::{self, SmartSdrMessage};
use crate::entity::{Entity, EntityFields};
use crate::events::{Frame, MirrorEvent};
use crate::reassembly::{StreamReassembler, StreamStats};
use crate::registry::EntityRegistry;
use crate::request::{EntityRequest, PendingRequest, RequestState};
use crate::sampler::SamplerScheduler;
use crate::status::{self, Selector};
use crate::tracker::{ReplyContinuation, SequencedRequestTracker};
use crate::vita49::{self, StreamPacket};

/// Default broadcast channel capacity for events and frames.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default throughput sampling period.
pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_secs(1);

struct MirrorInner {
    tracker: SequencedRequestTracker,
    registry: Mutex<EntityRegistry>,
    streams: Mutex<HashMap<u32, Arc<StreamReassembler>>>,
    sampler: SamplerScheduler,
    events: broadcast::Sender<MirrorEvent>,
    frames: broadcast::Sender<Frame>,
    connected: AtomicBool,
    handle: AtomicU32,
}

/// Client-side mirror of a radio's entities and streams.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RadioMirror {
    inner: Arc<MirrorInner>,
}

/// Work collected under the registry lock and carried out after it is
/// released.
#[derive(Default)]
struct Effects {
    events: Vec<MirrorEvent>,
    attach: Vec<Entity>,
    frame_widths: Vec<(u32, u32)>,
}

impl RadioMirror {
    /// Create a mirror whose encoded commands are written to `sink`.
    pub fn new(
        sink: mpsc::UnboundedSender<Bytes>,
        sample_period: Duration,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        let (frames, _) = broadcast::channel(event_capacity);
        let sampler = SamplerScheduler::new(sample_period, events.clone());
        Self {
            inner: Arc::new(MirrorInner {
                tracker: SequencedRequestTracker::new(sink),
                registry: Mutex::new(EntityRegistry::new()),
                streams: Mutex::new(HashMap::new()),
                sampler,
                events,
                frames,
                connected: AtomicBool::new(true),
                handle: AtomicU32::new(0),
            }),
        }
    }

    // -----------------------------------------------------------------
    // Inbound command channel
    // -----------------------------------------------------------------

    /// Dispatch one line from the command channel (without the newline).
    pub fn handle_line(&self, line: &str) {
        let message = match codec::parse_message(line) {
            Ok(message) => message,
            Err(e) => {
                if !line.trim().is_empty() {
                    tracing::debug!(error = %e, line = %line, "Malformed line dropped");
                }
                return;
            }
        };

        match message {
            SmartSdrMessage::Version(v) => {
                tracing::debug!(
                    version = format!("{}.{}.{}.{}", v.major, v.minor, v.patch, v.build),
                    "Radio protocol version"
                );
            }
            SmartSdrMessage::Handle(handle) => {
                self.inner.handle.store(handle, Ordering::Relaxed);
                self.inner.connected.store(true, Ordering::Relaxed);
                self.publish(MirrorEvent::Connected { handle });
            }
            SmartSdrMessage::Reply(reply) => {
                self.on_reply(reply.sequence, reply.code, &reply.payload);
            }
            SmartSdrMessage::Status(status) => self.on_status(&status.payload),
            SmartSdrMessage::Message { code, text } => {
                tracing::info!(code = format!("0x{:08X}", code), text = %text, "Radio message");
                self.publish(MirrorEvent::RadioMessage { code, text });
            }
            SmartSdrMessage::Unknown(line) => {
                tracing::trace!(line = %line, "Unrecognised line");
            }
        }
    }

    /// Deliver a command reply to its parked continuation.
    pub fn on_reply(&self, seq: u32, code: u32, payload: &str) -> bool {
        self.inner.tracker.on_reply_arrived(seq, code, payload)
    }

    /// Apply one status payload (the text after `S<handle>|`).
    pub fn on_status(&self, payload: &str) {
        let Some(line) = status::parse_status_line(payload) else {
            return;
        };
        let key = match line.selector {
            Selector::Entity(key) => key,
            Selector::Other(object) => {
                tracing::trace!(object = %object, "Status for unmirrored object ignored");
                return;
            }
        };

        if line.removed {
            self.evict(key);
            return;
        }

        let mut effects = Effects::default();
        {
            let mut registry = self.lock_registry();

            if key.kind == EntityKind::Slice && line.get("in_use") == Some("0") {
                let was_in_use = match registry.get(&key).map(Entity::fields) {
                    Some(EntityFields::Slice(f)) => Some(f.in_use),
                    _ => None,
                };
                match was_in_use {
                    Some(true) => {
                        drop(registry);
                        self.evict(key);
                        return;
                    }
                    Some(false) => {}
                    None => {
                        tracing::trace!(entity = %key, "Unused slice not mirrored");
                        return;
                    }
                }
            }

            let (entity, created) = registry.lookup_or_create(key);
            let changed = entity.apply_status(&line.pairs);

            if key.kind == EntityKind::Panadapter && changed.contains(&"x_pixels") {
                if let EntityFields::Panadapter(f) = entity.fields() {
                    effects.frame_widths.push((key.id, f.x_pixels));
                }
            }
            effects.events.push(MirrorEvent::EntityUpdated {
                entity: entity.clone(),
                changed,
            });

            let acked = AckDependencyResolver::resolve(&mut registry, key, created);
            Self::collect_acked(&registry, &acked, &mut effects);
        }
        self.apply_effects(effects);
    }

    // -----------------------------------------------------------------
    // Outbound commands
    // -----------------------------------------------------------------

    /// Send a command without waiting for its reply.
    pub fn send(&self, command: &str) -> Result<u32> {
        self.inner.tracker.send(command)
    }

    /// Send a command and run `continuation` when its reply arrives.
    pub fn send_with_reply(&self, command: &str, continuation: ReplyContinuation) -> Result<u32> {
        self.inner.tracker.send_with_reply(command, continuation)
    }

    /// Send the creation command for `request`.
    ///
    /// Fails with [`flexmirror_core::Error::AlreadyRequested`] while the request is in
    /// flight or after it was identified.
    pub fn request(&self, request: &EntityRequest) -> Result<u32> {
        request.try_begin()?;

        let weak: Weak<MirrorInner> = Arc::downgrade(&self.inner);
        let pending = PendingRequest(request.clone());
        let kind = request.kind();
        let continuation: ReplyContinuation = Box::new(move |code, payload| {
            let request = &pending.0;
            match weak.upgrade() {
                Some(inner) => RadioMirror { inner }.complete_request(request, kind, code, payload),
                None => request.set(RequestState::Abandoned),
            }
        });

        match self.inner.tracker.send_with_reply(request.command(), continuation) {
            Ok(seq) => {
                tracing::debug!(seq, kind = %kind, command = %request.command(), "Creation requested");
                Ok(seq)
            }
            Err(e) => {
                request.reset();
                Err(e)
            }
        }
    }

    fn complete_request(&self, request: &EntityRequest, kind: EntityKind, code: u32, payload: &str) {
        if code != 0 {
            tracing::debug!(
                kind = %kind,
                code = format!("0x{:08X}", code),
                payload = %payload,
                "Creation rejected"
            );
            request.set(RequestState::Rejected {
                code,
                message: payload.to_string(),
            });
            return;
        }

        let Some(id) = status::parse_id(payload, kind.uses_hex_id()) else {
            tracing::warn!(kind = %kind, payload = %payload, "Creation reply carried no usable id");
            request.set(RequestState::Rejected {
                code,
                message: format!("invalid id {:?}", payload),
            });
            return;
        };

        let key = EntityKey::new(kind, id);
        let mut effects = Effects::default();
        {
            let mut registry = self.lock_registry();
            let created = registry.identify(key);
            let acked = AckDependencyResolver::resolve(&mut registry, key, created);
            Self::collect_acked(&registry, &acked, &mut effects);

            // Adopting an entity that was already acked as someone else's
            // may make its stream ours.
            if !created && acked.is_empty() {
                if let Some(entity) = registry.get(&key) {
                    if entity.is_acked() && Self::should_attach(entity) {
                        effects.attach.push(entity.clone());
                    }
                }
            }
        }
        request.set(RequestState::Identified(key));
        self.apply_effects(effects);
    }

    /// Remove an entity: send the removal command if connected, then evict.
    pub fn remove(&self, key: EntityKey) -> Result<()> {
        let command = codec::cmd_remove(key)?;
        if self.is_connected() {
            if let Err(e) = self.inner.tracker.send(&command) {
                tracing::debug!(entity = %key, error = %e, "Removal command not sent");
            }
        }
        self.evict(key);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Streams
    // -----------------------------------------------------------------

    /// Decode a datagram from the stream socket and route it.
    pub fn on_datagram(&self, data: &[u8]) {
        match vita49::decode(data) {
            Ok(packet) => self.on_packet(packet),
            Err(e) => tracing::trace!(error = %e, len = data.len(), "Undecodable stream packet"),
        }
    }

    /// Route a decoded packet to its stream's reassembler.
    pub fn on_packet(&self, packet: StreamPacket) {
        let stream_id = packet.stream_id;
        let Some(reassembler) = self.lock_streams().get(&stream_id).cloned() else {
            tracing::trace!(
                stream_id = format!("0x{:08X}", stream_id),
                "Packet for unattached stream dropped"
            );
            return;
        };

        if let Some(data) = reassembler.on_packet(packet) {
            let _ = self.inner.frames.send(Frame {
                stream_id,
                kind: reassembler.key().kind,
                data,
            });
        }
    }

    /// Health counters for an attached stream.
    pub fn stream_stats(&self, stream_id: u32) -> Option<StreamStats> {
        self.lock_streams().get(&stream_id).map(|r| r.stats())
    }

    /// Stream ids with an attached reassembler.
    pub fn attached_streams(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.lock_streams().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    // -----------------------------------------------------------------
    // Queries and subscriptions
    // -----------------------------------------------------------------

    pub fn subscribe(&self) -> broadcast::Receiver<MirrorEvent> {
        self.inner.events.subscribe()
    }

    pub fn subscribe_frames(&self) -> broadcast::Receiver<Frame> {
        self.inner.frames.subscribe()
    }

    /// Snapshot of one entity.
    pub fn entity(&self, key: EntityKey) -> Option<Entity> {
        self.lock_registry().get(&key).cloned()
    }

    /// Snapshot of every registered entity, ordered by key.
    pub fn entities(&self) -> Vec<Entity> {
        let mut all: Vec<Entity> = self.lock_registry().iter().cloned().collect();
        all.sort_by_key(Entity::key);
        all
    }

    /// Client handle from the handshake, `0` before it arrives.
    pub fn client_handle(&self) -> u32 {
        self.inner.handle.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }

    pub fn pending_replies(&self) -> usize {
        self.inner.tracker.pending_count()
    }

    pub fn is_sampling(&self, stream_id: u32) -> bool {
        self.inner.sampler.is_running(stream_id)
    }

    // -----------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------

    /// The command channel went away: stop samplers, drop parked
    /// continuations and publish [`MirrorEvent::Disconnected`]. Returns
    /// `false` if the mirror was already disconnected.
    pub fn connection_lost(&self) -> bool {
        if !self.inner.connected.swap(false, Ordering::Relaxed) {
            return false;
        }
        self.inner.sampler.stop_all();
        let abandoned = self.inner.tracker.abandon_all();
        tracing::info!(abandoned, "Radio connection closed");
        self.publish(MirrorEvent::Disconnected);
        true
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn collect_acked(registry: &EntityRegistry, acked: &[EntityKey], effects: &mut Effects) {
        for key in acked {
            if let Some(entity) = registry.get(key) {
                if Self::should_attach(entity) {
                    effects.attach.push(entity.clone());
                }
                effects.events.push(MirrorEvent::EntityAdded(entity.clone()));
            }
        }
    }

    /// Display streams go to every client; DAX streams only to their owner.
    fn should_attach(entity: &Entity) -> bool {
        let kind = entity.kind();
        kind.stream_shape().is_some() && (!kind.has_owner() || entity.is_owned())
    }

    fn apply_effects(&self, effects: Effects) {
        for entity in &effects.attach {
            self.attach(entity);
        }
        if !effects.frame_widths.is_empty() {
            let streams = self.lock_streams();
            for (id, width) in effects.frame_widths {
                if let Some(r) = streams.get(&id) {
                    r.set_frame_width(width);
                }
            }
        }
        for event in effects.events {
            self.publish(event);
        }
    }

    /// Holds the registry lock throughout, so an entity evicted after its
    /// effects were collected is never attached.
    fn attach(&self, entity: &Entity) {
        let key = entity.key();
        let registry = self.lock_registry();
        if !registry.contains(&key) {
            tracing::trace!(entity = %key, "Evicted before attach; stream not attached");
            return;
        }
        let mut streams = self.lock_streams();
        if streams.contains_key(&key.id) {
            return;
        }
        let Some(reassembler) = StreamReassembler::new(key) else {
            return;
        };
        if let EntityFields::Panadapter(f) = entity.fields() {
            reassembler.set_frame_width(f.x_pixels);
        }
        let counter = reassembler.byte_counter();
        streams.insert(key.id, Arc::new(reassembler));
        drop(streams);

        tracing::debug!(entity = %key, "Stream attached");
        if key.kind.has_owner() {
            self.inner.sampler.start(key.id, counter);
        }
        drop(registry);
    }

    fn evict(&self, key: EntityKey) {
        {
            let mut registry = self.lock_registry();
            if registry.remove(&key).is_none() {
                tracing::trace!(entity = %key, "Removal for unknown entity ignored");
                return;
            }
            if key.kind.stream_shape().is_some() && self.lock_streams().remove(&key.id).is_some() {
                tracing::debug!(entity = %key, "Stream detached");
            }
            self.inner.sampler.stop(key.id);
        }
        self.publish(MirrorEvent::EntityRemoved(key));
    }

    fn publish(&self, event: MirrorEvent) {
        // No subscribers is not an error.
        let _ = self.inner.events.send(event);
    }

    fn lock_registry(&self) -> MutexGuard<'_, EntityRegistry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_streams(&self) -> MutexGuard<'_, HashMap<u32, Arc<StreamReassembler>>> {
        self.inner
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RadioMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioMirror")
            .field("connected", &self.is_connected())
            .field("handle", &format_args!("0x{:08X}", self.client_handle()))
            .field("tracker", &self.inner.tracker)
            .finish()
    }
}

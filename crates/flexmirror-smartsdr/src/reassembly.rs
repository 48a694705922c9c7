//! Per-stream loss detection and frame reassembly.
//!
//! Every stream packet carries a 4-bit counter. A packet is in order when
//! its counter is one more (mod 16) than the previous packet's; anything
//! else is counted as out of order. Counting is the only recourse: packets
//! are never buffered or requested again.
//!
//! Sample-block streams (DAX audio, mic, IQ, TX) deliver every packet's
//! samples as they arrive. Tiled streams (spectrum, waterfall) copy tiles
//! into a frame buffer and deliver only complete frames. A tile from a
//! different frame before the current one completes puts the stream into
//! recovery, which lasts until a tile starting at bin 0 arrives.

use std::sync::{Arc, Mutex, PoisonError};

use flexmirror_core::{EntityKey, StreamShape};

use crate::events::FrameData;
use crate::sampler::ByteCounter;
use crate::vita49::{PacketBody, StreamPacket, TilePayload};

/// Health counters for one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub total_packets: u64,
    pub out_of_order: u64,
    pub frames_completed: u64,
    /// Times the stream gave up on an incomplete frame and entered recovery.
    pub frames_abandoned: u64,
    /// Tiles that overflowed the frame buffer.
    pub buffer_resets: u64,
    pub recovering: bool,
}

#[derive(Debug, Default)]
struct StreamState {
    last_count: Option<u8>,
    /// `None` until the first tile that starts a frame.
    current_frame: Option<u32>,
    bins_in_frame: usize,
    frame_width: usize,
    buffer: Vec<u16>,
    stats: StreamStats,
}

impl StreamState {
    fn check_counter(&mut self, count: u8, stream_id: u32) {
        self.stats.total_packets += 1;
        let in_order = match self.last_count {
            None => true,
            Some(last) => count == (last + 1) % 16,
        };
        if !in_order {
            self.stats.out_of_order += 1;
            tracing::trace!(
                stream_id = format!("0x{:08X}", stream_id),
                expected = self.last_count.map(|l| (l + 1) % 16),
                got = count,
                "Out-of-order packet"
            );
        }
        self.last_count = Some(count);
    }

    fn resize(&mut self, width: usize) {
        self.frame_width = width;
        self.buffer = vec![0; width];
        self.bins_in_frame = 0;
    }

    fn add_tile(&mut self, tile: TilePayload, stream_id: u32) -> Option<Vec<u16>> {
        if let Some(declared) = tile.frame_width {
            if declared as usize != self.frame_width {
                self.resize(declared as usize);
            }
        }
        if self.frame_width == 0 {
            tracing::trace!(
                stream_id = format!("0x{:08X}", stream_id),
                "Tile dropped: frame width unknown"
            );
            return None;
        }

        if tile.start_bin == 0 {
            if self.stats.recovering {
                let skipped = self
                    .current_frame
                    .map_or(0, |current| tile.frame_id.wrapping_sub(current));
                tracing::debug!(
                    stream_id = format!("0x{:08X}", stream_id),
                    frame = tile.frame_id,
                    frames_skipped = skipped,
                    "Recovered at frame"
                );
                self.stats.recovering = false;
            }
            self.bins_in_frame = 0;
            self.current_frame = Some(tile.frame_id);
        }

        match self.current_frame {
            Some(current) if current == tile.frame_id => {}
            Some(current) => {
                if !self.stats.recovering {
                    self.stats.recovering = true;
                    self.stats.frames_abandoned += 1;
                    tracing::debug!(
                        stream_id = format!("0x{:08X}", stream_id),
                        current,
                        got = tile.frame_id,
                        "Frame incomplete; waiting for next frame"
                    );
                }
                return None;
            }
            // Joined mid-frame; wait for a frame start.
            None => return None,
        }

        let start = tile.start_bin as usize;
        let end = start + tile.bins.len();
        if end > self.buffer.len() {
            self.resize(self.frame_width);
            self.stats.buffer_resets += 1;
            tracing::debug!(
                stream_id = format!("0x{:08X}", stream_id),
                start,
                len = tile.bins.len(),
                width = self.frame_width,
                "Tile overflows frame buffer; frame discarded"
            );
            return None;
        }

        self.buffer[start..end].copy_from_slice(&tile.bins);
        self.bins_in_frame += tile.bins.len();

        if self.bins_in_frame == self.frame_width {
            self.bins_in_frame = 0;
            self.stats.frames_completed += 1;
            let width = self.frame_width;
            return Some(std::mem::replace(&mut self.buffer, vec![0; width]));
        }
        None
    }
}

/// Reassembly state for one stream id.
#[derive(Debug)]
pub struct StreamReassembler {
    key: EntityKey,
    shape: StreamShape,
    state: Mutex<StreamState>,
    bytes: Arc<ByteCounter>,
}

impl StreamReassembler {
    /// Create a reassembler for a streaming entity.
    ///
    /// Returns `None` for kinds that carry no stream data.
    pub fn new(key: EntityKey) -> Option<Self> {
        let shape = key.kind.stream_shape()?;
        Some(Self {
            key,
            shape,
            state: Mutex::new(StreamState::default()),
            bytes: Arc::new(ByteCounter::new()),
        })
    }

    pub fn key(&self) -> EntityKey {
        self.key
    }

    pub fn stream_id(&self) -> u32 {
        self.key.id
    }

    pub fn shape(&self) -> StreamShape {
        self.shape
    }

    /// The counter the rate sampler reads.
    pub fn byte_counter(&self) -> Arc<ByteCounter> {
        Arc::clone(&self.bytes)
    }

    /// Set the expected frame width for tiled streams whose packets do not
    /// declare one (spectrum frames are `x_pixels` wide).
    pub fn set_frame_width(&self, width: u32) {
        let mut state = self.lock_state();
        if state.frame_width != width as usize {
            state.resize(width as usize);
        }
    }

    pub fn frame_width(&self) -> u32 {
        self.lock_state().frame_width as u32
    }

    /// Process one packet. Returns the data to deliver, if any.
    pub fn on_packet(&self, packet: StreamPacket) -> Option<FrameData> {
        self.bytes.add(packet.wire_len);

        let stream_id = self.key.id;
        let mut state = self.lock_state();
        state.check_counter(packet.packet_count, stream_id);

        match (self.shape, packet.body) {
            (StreamShape::SampleBlock, PacketBody::Samples(samples)) => {
                Some(FrameData::Samples(samples))
            }
            (StreamShape::Tiled, PacketBody::Tile(tile)) => {
                state.add_tile(tile, stream_id).map(FrameData::Bins)
            }
            (_, PacketBody::Skipped) => None,
            (shape, body) => {
                tracing::trace!(
                    stream_id = format!("0x{:08X}", stream_id),
                    ?shape,
                    body = body_name(&body),
                    "Packet body does not match stream shape"
                );
                None
            }
        }
    }

    pub fn stats(&self) -> StreamStats {
        self.lock_state().stats
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn body_name(body: &PacketBody) -> &'static str {
    match body {
        PacketBody::Samples(_) => "samples",
        PacketBody::Tile(_) => "tile",
        PacketBody::Skipped => "skipped",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vita49::PacketClass;
    use flexmirror_core::EntityKind;

    fn audio() -> StreamReassembler {
        StreamReassembler::new(EntityKey::new(EntityKind::AudioStream, 0x1A2B)).unwrap()
    }

    fn pan(width: u32) -> StreamReassembler {
        let r = StreamReassembler::new(EntityKey::new(EntityKind::Panadapter, 0x4000_0000)).unwrap();
        r.set_frame_width(width);
        r
    }

    fn samples(count: u8, data: Vec<f32>) -> StreamPacket {
        StreamPacket {
            stream_id: 0x1A2B,
            packet_count: count,
            class: PacketClass::DaxAudio,
            wire_len: 28 + data.len() * 4,
            body: PacketBody::Samples(data),
        }
    }

    fn tile(count: u8, frame: u32, start: u32, len: usize) -> StreamPacket {
        StreamPacket {
            stream_id: 0x4000_0000,
            packet_count: count,
            class: PacketClass::Fft,
            wire_len: 44 + len * 2,
            body: PacketBody::Tile(TilePayload {
                frame_id: frame,
                start_bin: start,
                frame_width: None,
                bins: vec![frame as u16; len],
                auto_black_level: None,
            }),
        }
    }

    #[test]
    fn counter_rules() {
        let r = audio();
        for (count, expected_ooo) in [(3, 0), (4, 0), (6, 1), (7, 1), (7, 2), (0, 3)] {
            r.on_packet(samples(count, vec![0.0]));
            assert_eq!(r.stats().out_of_order, expected_ooo, "after counter {count}");
        }
        assert_eq!(r.stats().total_packets, 6);
    }

    #[test]
    fn counter_wraps_modulo_16() {
        let r = audio();
        for count in (0..16).chain(0..4) {
            r.on_packet(samples(count, vec![]));
        }
        assert_eq!(r.stats().out_of_order, 0);
        assert_eq!(r.stats().total_packets, 20);
    }

    #[test]
    fn every_sample_packet_is_delivered() {
        let r = audio();
        assert_eq!(
            r.on_packet(samples(0, vec![0.5])),
            Some(FrameData::Samples(vec![0.5]))
        );
        // Out of order, still delivered.
        assert_eq!(
            r.on_packet(samples(9, vec![0.25])),
            Some(FrameData::Samples(vec![0.25]))
        );
    }

    #[test]
    fn bytes_accumulate_for_sampler() {
        let r = audio();
        r.on_packet(samples(0, vec![0.0; 10]));
        r.on_packet(samples(1, vec![0.0; 10]));
        assert_eq!(r.byte_counter().take(), 2 * (28 + 40));
    }

    #[test]
    fn two_tiles_complete_one_frame() {
        let r = pan(200);
        assert_eq!(r.on_packet(tile(0, 5, 0, 100)), None);
        match r.on_packet(tile(1, 5, 100, 100)) {
            Some(FrameData::Bins(bins)) => assert_eq!(bins.len(), 200),
            other => panic!("expected a frame, got {:?}", other),
        }
        assert_eq!(r.stats().frames_completed, 1);
    }

    #[test]
    fn frame_mismatch_enters_recovery_and_drops() {
        let r = pan(200);
        r.on_packet(tile(0, 5, 0, 100));
        r.on_packet(tile(1, 5, 100, 100));

        assert_eq!(r.on_packet(tile(2, 7, 50, 100)), None);
        let stats = r.stats();
        assert!(stats.recovering);
        assert_eq!(stats.frames_abandoned, 1);
        assert_eq!(stats.frames_completed, 1);
    }

    #[test]
    fn no_partial_frame_is_emitted_and_recovery_ends_at_frame_start() {
        let r = pan(200);
        assert_eq!(r.on_packet(tile(0, 1, 0, 100)), None);
        // Frame 2 continues before frame 1 completed.
        assert_eq!(r.on_packet(tile(1, 2, 100, 100)), None);
        assert!(r.stats().recovering);
        // Still recovering: more stray tiles are dropped without recounting.
        assert_eq!(r.on_packet(tile(2, 2, 150, 50)), None);
        assert_eq!(r.stats().frames_abandoned, 1);

        assert_eq!(r.on_packet(tile(3, 3, 0, 100)), None);
        assert!(!r.stats().recovering);
        assert!(matches!(
            r.on_packet(tile(4, 3, 100, 100)),
            Some(FrameData::Bins(_))
        ));
    }

    #[test]
    fn joining_mid_frame_waits_for_frame_start() {
        let r = pan(100);
        assert_eq!(r.on_packet(tile(0, 9, 50, 50)), None);
        assert_eq!(r.stats().frames_abandoned, 0);
        assert!(matches!(
            r.on_packet(tile(1, 10, 0, 100)),
            Some(FrameData::Bins(_))
        ));
    }

    #[test]
    fn overflowing_tile_resets_buffer() {
        let r = pan(100);
        r.on_packet(tile(0, 1, 0, 50));
        assert_eq!(r.on_packet(tile(1, 1, 80, 50)), None);
        let stats = r.stats();
        assert_eq!(stats.buffer_resets, 1);
        assert_eq!(stats.frames_completed, 0);

        // The in-progress frame was discarded: the remaining half no longer
        // completes it.
        assert_eq!(r.on_packet(tile(2, 1, 50, 50)), None);
    }

    #[test]
    fn declared_width_overrides() {
        let r = StreamReassembler::new(EntityKey::new(EntityKind::Waterfall, 0x4200_0000)).unwrap();
        let mut packet = tile(0, 77, 0, 4);
        if let PacketBody::Tile(t) = &mut packet.body {
            t.frame_width = Some(4);
        }
        assert_eq!(
            r.on_packet(packet),
            Some(FrameData::Bins(vec![77, 77, 77, 77]))
        );
        assert_eq!(r.frame_width(), 4);
    }

    #[test]
    fn unknown_width_drops_tiles() {
        let r = StreamReassembler::new(EntityKey::new(EntityKind::Panadapter, 1)).unwrap();
        assert_eq!(r.on_packet(tile(0, 1, 0, 10)), None);
        assert_eq!(r.stats().total_packets, 1);
    }

    #[test]
    fn non_stream_kinds_have_no_reassembler() {
        assert!(StreamReassembler::new(EntityKey::new(EntityKind::Slice, 0)).is_none());
        assert!(StreamReassembler::new(EntityKey::new(EntityKind::Memory, 0)).is_none());
    }
}

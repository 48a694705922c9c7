//! VITA-49.0 stream packet decoder and DAX TX encoder.
//!
//! FlexRadio streams real-time data as VITA-49.0 packets over UDP. This
//! module is pure: it turns a datagram into a typed [`StreamPacket`]
//! record and builds outbound transmit-audio packets. Routing and
//! reassembly happen elsewhere.
//!
//! Header word layout (big-endian):
//!
//! ```text
//!  31..28  packet type        27  class id present    26  trailer present
//!  23..22  TSI                21..20  TSF             19..16  packet count
//!  15..0   packet size in 32-bit words, header included
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use flexmirror_core::{Error, Result};

/// VITA-49 header size in bytes (header, stream id, class id, timestamps).
pub const HEADER_SIZE: usize = 28;

/// FlexRadio OUI carried in the class id.
pub const FLEXRADIO_OUI: u32 = 0x001C2D;

/// Largest number of samples placed in one DAX TX packet.
pub const TX_SAMPLES_PER_PACKET: usize = 256;

/// Information class code used on outbound DAX TX audio.
const TX_INFO_CLASS: u16 = 0x543C;

/// IF data with stream id, class id present, TSI "other", TSF sample count.
const TX_HEADER_FLAGS: u32 = (0x1 << 28) | (1 << 27) | (0x3 << 22) | (0x1 << 20);

// ---------------------------------------------------------------------------
// Packet classes
// ---------------------------------------------------------------------------

/// Stream type identified by the packet class code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketClass {
    /// Meter data -- class code 0x8002.
    Meter,
    /// Panadapter FFT bins -- class code 0x8003.
    Fft,
    /// Waterfall tile -- class code 0x8004.
    Waterfall,
    /// DAX demodulated audio, float32 -- class code 0x03E3.
    DaxAudio,
    /// DAX IQ at the given sample rate -- class codes 0x02E3 to 0x02E6.
    DaxIq { rate: u32 },
    /// Any other class code.
    Other(u16),
}

impl PacketClass {
    pub fn from_code(code: u16) -> Self {
        match code {
            0x8002 => PacketClass::Meter,
            0x8003 => PacketClass::Fft,
            0x8004 => PacketClass::Waterfall,
            0x03E3 => PacketClass::DaxAudio,
            0x02E3 => PacketClass::DaxIq { rate: 24_000 },
            0x02E4 => PacketClass::DaxIq { rate: 48_000 },
            0x02E5 => PacketClass::DaxIq { rate: 96_000 },
            0x02E6 => PacketClass::DaxIq { rate: 192_000 },
            other => PacketClass::Other(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Parsed VITA-49 header fields the engine consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vita49Header {
    pub packet_type: u8,
    pub class_id_present: bool,
    pub trailer_present: bool,
    /// 4-bit rolling packet counter.
    pub packet_count: u8,
    /// Declared packet size in 32-bit words, header included.
    pub packet_size_words: u16,
    pub stream_id: u32,
    pub class_oui: u32,
    pub info_class_code: u16,
    pub packet_class_code: u16,
}

/// One tile of a spectrum or waterfall frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePayload {
    /// Frame the tile belongs to (FFT frame index, waterfall timecode).
    pub frame_id: u32,
    /// Offset of the first bin within the frame.
    pub start_bin: u32,
    /// Frame width declared by the packet itself, if the format carries one.
    pub frame_width: Option<u32>,
    pub bins: Vec<u16>,
    /// Waterfall auto-black level.
    pub auto_black_level: Option<u32>,
}

/// Decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketBody {
    /// A block of float samples (DAX audio, IQ).
    Samples(Vec<f32>),
    /// One tile of a frame (FFT, waterfall).
    Tile(TilePayload),
    /// A class the engine does not reassemble (meters and others).
    Skipped,
}

/// A decoded stream packet record.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamPacket {
    pub stream_id: u32,
    /// 4-bit packet counter, `0..=15`.
    pub packet_count: u8,
    pub class: PacketClass,
    /// Size of the datagram on the wire, for throughput accounting.
    pub wire_len: usize,
    pub body: PacketBody,
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Parse the 28-byte header and return it with the payload slice.
///
/// The declared packet size must not exceed the buffer; bytes beyond the
/// declared size are ignored.
pub fn parse_header(data: &[u8]) -> Result<(Vita49Header, &[u8])> {
    if data.len() < HEADER_SIZE {
        return Err(Error::Protocol(format!(
            "VITA-49 packet too short: {} bytes, minimum is {}",
            data.len(),
            HEADER_SIZE
        )));
    }

    let header_word = be_u32(data, 0);
    let packet_size_words = (header_word & 0xFFFF) as u16;
    let packet_size_bytes = packet_size_words as usize * 4;
    if packet_size_bytes > data.len() || packet_size_bytes < HEADER_SIZE {
        return Err(Error::Protocol(format!(
            "VITA-49 packet_size ({} words = {} bytes) does not fit buffer length ({} bytes)",
            packet_size_words,
            packet_size_bytes,
            data.len()
        )));
    }

    let class_oui = be_u32(data, 8) & 0x00FF_FFFF;
    if class_oui != FLEXRADIO_OUI {
        tracing::trace!(
            oui = format!("0x{:06X}", class_oui),
            "VITA-49 packet OUI does not match FlexRadio"
        );
    }
    let class_lower = be_u32(data, 12);

    let header = Vita49Header {
        packet_type: (header_word >> 28) as u8,
        class_id_present: (header_word >> 27) & 1 == 1,
        trailer_present: (header_word >> 26) & 1 == 1,
        packet_count: ((header_word >> 16) & 0x0F) as u8,
        packet_size_words,
        stream_id: be_u32(data, 4),
        class_oui,
        info_class_code: (class_lower >> 16) as u16,
        packet_class_code: (class_lower & 0xFFFF) as u16,
    };

    // A trailer word, when present, is not part of the payload.
    let mut end = packet_size_bytes;
    if header.trailer_present && end >= HEADER_SIZE + 4 {
        end -= 4;
    }

    Ok((header, &data[HEADER_SIZE..end]))
}

/// Decode a datagram into a stream packet record.
pub fn decode(data: &[u8]) -> Result<StreamPacket> {
    let (header, payload) = parse_header(data)?;
    let class = PacketClass::from_code(header.packet_class_code);

    let body = match class {
        PacketClass::DaxAudio | PacketClass::DaxIq { .. } => {
            PacketBody::Samples(parse_samples(payload)?)
        }
        PacketClass::Fft => PacketBody::Tile(parse_fft(payload)?),
        PacketClass::Waterfall => PacketBody::Tile(parse_waterfall_tile(payload)?),
        PacketClass::Meter | PacketClass::Other(_) => PacketBody::Skipped,
    };

    Ok(StreamPacket {
        stream_id: header.stream_id,
        packet_count: header.packet_count,
        class,
        wire_len: data.len(),
        body,
    })
}

/// Float32 samples, little-endian within the big-endian framing.
fn parse_samples(payload: &[u8]) -> Result<Vec<f32>> {
    if payload.len() % 4 != 0 {
        return Err(Error::Protocol(format!(
            "sample payload length {} is not divisible by 4",
            payload.len()
        )));
    }
    Ok(payload
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// FFT tile: start bin, bin count, bin size, frame index, then u16 bins.
fn parse_fft(payload: &[u8]) -> Result<TilePayload> {
    const PREAMBLE: usize = 16;
    if payload.len() < PREAMBLE {
        return Err(Error::Protocol(format!(
            "FFT payload too short: {} bytes",
            payload.len()
        )));
    }

    let start_bin = be_u32(payload, 0);
    let num_bins = be_u32(payload, 4) as usize;
    let bin_size = be_u32(payload, 8);
    let frame_id = be_u32(payload, 12);

    if bin_size != 2 {
        return Err(Error::Protocol(format!("unsupported FFT bin size {bin_size}")));
    }

    Ok(TilePayload {
        frame_id,
        start_bin,
        frame_width: None,
        bins: parse_bins(&payload[PREAMBLE..], num_bins)?,
        auto_black_level: None,
    })
}

/// Waterfall tile: low frequency and bin bandwidth (i64), line duration
/// (u32), width and height (u16), timecode and auto black (u32), total bins
/// in the frame and first bin index (u16), then `width * height` u16 bins.
fn parse_waterfall_tile(payload: &[u8]) -> Result<TilePayload> {
    const PREAMBLE: usize = 36;
    if payload.len() < PREAMBLE {
        return Err(Error::Protocol(format!(
            "waterfall payload too short: {} bytes",
            payload.len()
        )));
    }

    let width = be_u16(payload, 20) as usize;
    let height = be_u16(payload, 22) as usize;
    let timecode = be_u32(payload, 24);
    let auto_black = be_u32(payload, 28);
    let total_bins = be_u16(payload, 32);
    let first_bin = be_u16(payload, 34);

    Ok(TilePayload {
        frame_id: timecode,
        start_bin: first_bin as u32,
        frame_width: Some(total_bins as u32),
        bins: parse_bins(&payload[PREAMBLE..], width * height)?,
        auto_black_level: Some(auto_black),
    })
}

fn parse_bins(data: &[u8], count: usize) -> Result<Vec<u16>> {
    if data.len() < count * 2 {
        return Err(Error::Protocol(format!(
            "tile declares {} bins but carries {} bytes",
            count,
            data.len()
        )));
    }
    Ok(data[..count * 2]
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect())
}

fn be_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn be_u16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

// ---------------------------------------------------------------------------
// DAX TX encoding
// ---------------------------------------------------------------------------

/// Build one DAX TX audio packet.
///
/// At most [`TX_SAMPLES_PER_PACKET`] samples fit in one packet.
pub fn encode_tx_audio(stream_id: u32, packet_count: u8, samples: &[f32]) -> Result<Bytes> {
    if samples.len() > TX_SAMPLES_PER_PACKET {
        return Err(Error::InvalidParameter(format!(
            "{} samples exceed the {} sample packet limit",
            samples.len(),
            TX_SAMPLES_PER_PACKET
        )));
    }

    let size_words = (samples.len() + HEADER_SIZE / 4) as u32;
    let header_word = TX_HEADER_FLAGS | ((packet_count as u32 & 0x0F) << 16) | size_words;

    let mut buf = BytesMut::with_capacity(size_words as usize * 4);
    buf.put_u32(header_word);
    buf.put_u32(stream_id);
    buf.put_u32(FLEXRADIO_OUI);
    buf.put_u16(TX_INFO_CLASS);
    buf.put_u16(0x03E3);
    buf.put_u32(0);
    buf.put_u64(0);
    for sample in samples {
        buf.put_f32_le(*sample);
    }
    Ok(buf.freeze())
}

/// Splits transmit audio into packets and advances the packet counter.
#[derive(Debug, Clone)]
pub struct TxAudioPacketizer {
    stream_id: u32,
    packet_count: u8,
}

impl TxAudioPacketizer {
    pub fn new(stream_id: u32) -> Self {
        Self {
            stream_id,
            packet_count: 0,
        }
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// Encode `samples` as consecutive packets of up to 256 samples.
    pub fn packetize(&mut self, samples: &[f32]) -> Vec<Bytes> {
        samples
            .chunks(TX_SAMPLES_PER_PACKET)
            .filter_map(|chunk| {
                let packet = encode_tx_audio(self.stream_id, self.packet_count, chunk).ok()?;
                self.packet_count = (self.packet_count + 1) % 16;
                Some(packet)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a datagram with the given class, stream id, counter and payload.
    pub(crate) fn build_packet(class: u16, stream_id: u32, count: u8, payload: &[u8]) -> Vec<u8> {
        let total = HEADER_SIZE + payload.len();
        assert!(total % 4 == 0, "total packet must be word-aligned");

        let mut hw: u32 = 0x3 << 28;
        hw |= 1 << 27;
        hw |= (count as u32 & 0x0F) << 16;
        hw |= (total / 4) as u32;

        let mut pkt = Vec::with_capacity(total);
        pkt.extend_from_slice(&hw.to_be_bytes());
        pkt.extend_from_slice(&stream_id.to_be_bytes());
        pkt.extend_from_slice(&FLEXRADIO_OUI.to_be_bytes());
        pkt.extend_from_slice(&((0x534C_u32 << 16) | class as u32).to_be_bytes());
        pkt.extend_from_slice(&[0u8; 12]);
        pkt.extend_from_slice(payload);
        pkt
    }

    pub(crate) fn fft_payload(start: u32, frame: u32, bins: &[u16]) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&start.to_be_bytes());
        p.extend_from_slice(&(bins.len() as u32).to_be_bytes());
        p.extend_from_slice(&2u32.to_be_bytes());
        p.extend_from_slice(&frame.to_be_bytes());
        for b in bins {
            p.extend_from_slice(&b.to_be_bytes());
        }
        if p.len() % 4 != 0 {
            p.extend_from_slice(&[0, 0]);
        }
        p
    }

    fn waterfall_payload(timecode: u32, total: u16, first: u16, bins: &[u16]) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&14_000_000i64.to_be_bytes());
        p.extend_from_slice(&100i64.to_be_bytes());
        p.extend_from_slice(&80u32.to_be_bytes());
        p.extend_from_slice(&(bins.len() as u16).to_be_bytes());
        p.extend_from_slice(&1u16.to_be_bytes());
        p.extend_from_slice(&timecode.to_be_bytes());
        p.extend_from_slice(&1234u32.to_be_bytes());
        p.extend_from_slice(&total.to_be_bytes());
        p.extend_from_slice(&first.to_be_bytes());
        for b in bins {
            p.extend_from_slice(&b.to_be_bytes());
        }
        if p.len() % 4 != 0 {
            p.extend_from_slice(&[0, 0]);
        }
        p
    }

    #[test]
    fn class_codes() {
        assert_eq!(PacketClass::from_code(0x8003), PacketClass::Fft);
        assert_eq!(PacketClass::from_code(0x8004), PacketClass::Waterfall);
        assert_eq!(PacketClass::from_code(0x03E3), PacketClass::DaxAudio);
        assert_eq!(
            PacketClass::from_code(0x02E5),
            PacketClass::DaxIq { rate: 96_000 }
        );
        assert_eq!(PacketClass::from_code(0x1234), PacketClass::Other(0x1234));
    }

    #[test]
    fn header_fields() {
        let pkt = build_packet(0x8002, 0xAABB_CCDD, 9, &[0u8; 8]);
        let (header, payload) = parse_header(&pkt).unwrap();
        assert_eq!(header.packet_type, 0x3);
        assert!(header.class_id_present);
        assert!(!header.trailer_present);
        assert_eq!(header.packet_count, 9);
        assert_eq!(header.packet_size_words, 9);
        assert_eq!(header.stream_id, 0xAABB_CCDD);
        assert_eq!(header.class_oui, FLEXRADIO_OUI);
        assert_eq!(header.info_class_code, 0x534C);
        assert_eq!(header.packet_class_code, 0x8002);
        assert_eq!(payload.len(), 8);
    }

    #[test]
    fn decode_dax_audio() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0.5f32.to_le_bytes());
        payload.extend_from_slice(&(-0.25f32).to_le_bytes());
        let pkt = build_packet(0x03E3, 0x1A2B, 3, &payload);

        let decoded = decode(&pkt).unwrap();
        assert_eq!(decoded.stream_id, 0x1A2B);
        assert_eq!(decoded.packet_count, 3);
        assert_eq!(decoded.class, PacketClass::DaxAudio);
        assert_eq!(decoded.wire_len, pkt.len());
        assert_eq!(decoded.body, PacketBody::Samples(vec![0.5, -0.25]));
    }

    #[test]
    fn decode_fft_tile() {
        let pkt = build_packet(0x8003, 0x4000_0000, 0, &fft_payload(100, 5, &[1, 2, 3, 4]));
        let decoded = decode(&pkt).unwrap();
        match decoded.body {
            PacketBody::Tile(tile) => {
                assert_eq!(tile.frame_id, 5);
                assert_eq!(tile.start_bin, 100);
                assert_eq!(tile.frame_width, None);
                assert_eq!(tile.bins, vec![1, 2, 3, 4]);
            }
            other => panic!("expected tile, got {:?}", other),
        }
    }

    #[test]
    fn decode_waterfall_tile() {
        let pkt = build_packet(
            0x8004,
            0x4200_0000,
            1,
            &waterfall_payload(77, 200, 100, &[9, 8, 7, 6]),
        );
        let decoded = decode(&pkt).unwrap();
        match decoded.body {
            PacketBody::Tile(tile) => {
                assert_eq!(tile.frame_id, 77);
                assert_eq!(tile.start_bin, 100);
                assert_eq!(tile.frame_width, Some(200));
                assert_eq!(tile.bins, vec![9, 8, 7, 6]);
                assert_eq!(tile.auto_black_level, Some(1234));
            }
            other => panic!("expected tile, got {:?}", other),
        }
    }

    #[test]
    fn meter_packets_are_skipped() {
        let pkt = build_packet(0x8002, 0x0700_0000, 0, &[0u8; 4]);
        assert_eq!(decode(&pkt).unwrap().body, PacketBody::Skipped);
    }

    #[test]
    fn reject_short_and_oversized() {
        assert!(decode(&[0u8; 27]).unwrap_err().to_string().contains("too short"));

        let mut pkt = build_packet(0x03E3, 1, 0, &[]);
        pkt[2..4].copy_from_slice(&100u16.to_be_bytes());
        assert!(decode(&pkt).unwrap_err().to_string().contains("does not fit"));
    }

    #[test]
    fn reject_truncated_bins() {
        let mut payload = fft_payload(0, 1, &[1, 2]);
        payload[4..8].copy_from_slice(&50u32.to_be_bytes());
        let pkt = build_packet(0x8003, 1, 0, &payload);
        assert!(decode(&pkt).is_err());
    }

    #[test]
    fn tx_audio_packet_layout() {
        let pkt = encode_tx_audio(0x8400_0000, 5, &[0.25, -0.5]).unwrap();
        assert_eq!(pkt.len(), HEADER_SIZE + 8);

        let hw = u32::from_be_bytes([pkt[0], pkt[1], pkt[2], pkt[3]]);
        assert_eq!(hw & 0xFFFF, 9);
        assert_eq!((hw >> 16) & 0x0F, 5);
        assert_eq!(hw >> 28, 0x1);

        let (header, payload) = parse_header(&pkt).unwrap();
        assert_eq!(header.stream_id, 0x8400_0000);
        assert_eq!(header.info_class_code, 0x543C);
        assert_eq!(header.packet_class_code, 0x03E3);
        assert_eq!(parse_samples(payload).unwrap(), vec![0.25, -0.5]);
    }

    #[test]
    fn tx_audio_rejects_oversized_block() {
        let samples = vec![0.0f32; TX_SAMPLES_PER_PACKET + 1];
        assert!(matches!(
            encode_tx_audio(1, 0, &samples),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn packetizer_chunks_and_wraps_counter() {
        let mut packetizer = TxAudioPacketizer::new(0x8400_0000);
        let packets = packetizer.packetize(&vec![0.1f32; 600]);
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[2].len(), HEADER_SIZE + 88 * 4);

        let counts: Vec<u8> = packets
            .iter()
            .map(|p| parse_header(p).unwrap().0.packet_count)
            .collect();
        assert_eq!(counts, vec![0, 1, 2]);

        for _ in 0..13 {
            packetizer.packetize(&[0.0]);
        }
        let next = packetizer.packetize(&[0.0]);
        assert_eq!(parse_header(&next[0]).unwrap().0.packet_count, 0);
    }
}

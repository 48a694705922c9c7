//! DAX stream status vocabularies.
//!
//! All four stream kinds report the UDP endpoint the radio sends to (or
//! expects packets from) with `ip=` and `port=`. The radio only reports an
//! endpoint once the stream is live, so the address doubles as the
//! readiness signal.

use std::net::IpAddr;

use super::{ApplyResult, Applied, parse, parse_flag, set};

/// Where the radio streams a DAX channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamEndpoint {
    pub ip: Option<IpAddr>,
    pub port: u16,
}

impl StreamEndpoint {
    fn apply(&mut self, key: &str, value: &str) -> ApplyResult {
        let applied = match key {
            "ip" => {
                let ip: IpAddr = parse(value)?;
                set(&mut self.ip, Some(ip), "ip")
            }
            "port" => set(&mut self.port, parse(value)?, "port"),
            _ => Applied::Unknown,
        };
        Ok(applied)
    }
}

/// Receive audio from a DAX channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioStreamFields {
    pub dax_channel: u8,
    /// Index of the slice feeding the channel, if any.
    pub slice: Option<u32>,
    pub endpoint: StreamEndpoint,
}

impl AudioStreamFields {
    pub(crate) fn apply(&mut self, key: &str, value: &str) -> ApplyResult {
        let applied = match key {
            "dax" => set(&mut self.dax_channel, parse(value)?, "dax_channel"),
            "slice" => {
                // The radio reports -1 when no slice is attached.
                let index: i64 = parse(value)?;
                set(&mut self.slice, u32::try_from(index).ok(), "slice")
            }
            _ => return self.endpoint.apply(key, value),
        };
        Ok(applied)
    }
}

/// Microphone audio sent from the radio to this client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MicAudioStreamFields {
    pub endpoint: StreamEndpoint,
}

impl MicAudioStreamFields {
    pub(crate) fn apply(&mut self, key: &str, value: &str) -> ApplyResult {
        self.endpoint.apply(key, value)
    }
}

/// Transmit audio sent from this client to the radio.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxAudioStreamFields {
    pub endpoint: StreamEndpoint,
    /// The radio is taking transmit audio from this stream.
    pub dax_tx: bool,
}

impl TxAudioStreamFields {
    pub(crate) fn apply(&mut self, key: &str, value: &str) -> ApplyResult {
        match key {
            "dax_tx" => Ok(set(&mut self.dax_tx, parse_flag(value)?, "dax_tx")),
            _ => self.endpoint.apply(key, value),
        }
    }
}

/// Raw I/Q samples from a DAX IQ channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IqStreamFields {
    pub daxiq_channel: u8,
    pub endpoint: StreamEndpoint,
    /// Sample rate in Hz.
    pub rate: u32,
    pub streaming: bool,
    pub capacity: u32,
    pub available: u32,
}

impl IqStreamFields {
    pub(crate) fn apply(&mut self, key: &str, value: &str) -> ApplyResult {
        let applied = match key {
            "daxiq" => set(&mut self.daxiq_channel, parse(value)?, "daxiq_channel"),
            "rate" => set(&mut self.rate, parse(value)?, "rate"),
            "streaming" => set(&mut self.streaming, parse_flag(value)?, "streaming"),
            "capacity" => set(&mut self.capacity, parse(value)?, "capacity"),
            "available" => set(&mut self.available, parse(value)?, "available"),
            "pan" | "daxiq_rate" => Applied::Unmodeled,
            _ => return self.endpoint.apply(key, value),
        };
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn audio_stream_fields() {
        let mut audio = AudioStreamFields::default();
        assert_eq!(audio.apply("dax", "1"), Ok(Applied::Changed("dax_channel")));
        assert_eq!(audio.apply("slice", "0"), Ok(Applied::Changed("slice")));
        assert_eq!(audio.slice, Some(0));
        assert_eq!(audio.apply("ip", "10.0.0.2"), Ok(Applied::Changed("ip")));
        assert_eq!(audio.apply("port", "4991"), Ok(Applied::Changed("port")));
        assert_eq!(
            audio.endpoint,
            StreamEndpoint {
                ip: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))),
                port: 4991,
            }
        );
    }

    #[test]
    fn detached_slice_is_none() {
        let mut audio = AudioStreamFields::default();
        audio.apply("slice", "2").unwrap();
        audio.apply("slice", "-1").unwrap();
        assert_eq!(audio.slice, None);
    }

    #[test]
    fn bad_ip_is_rejected() {
        let mut mic = MicAudioStreamFields::default();
        assert!(mic.apply("ip", "not.an.ip").is_err());
        assert_eq!(mic.endpoint.ip, None);
        assert_eq!(mic.apply("owner", "x"), Ok(Applied::Unknown));
    }

    #[test]
    fn tx_and_iq_fields() {
        let mut tx = TxAudioStreamFields::default();
        assert_eq!(tx.apply("dax_tx", "1"), Ok(Applied::Changed("dax_tx")));

        let mut iq = IqStreamFields::default();
        iq.apply("daxiq", "2").unwrap();
        iq.apply("rate", "96000").unwrap();
        iq.apply("streaming", "1").unwrap();
        assert_eq!(iq.daxiq_channel, 2);
        assert_eq!(iq.rate, 96_000);
        assert!(iq.streaming);
    }
}

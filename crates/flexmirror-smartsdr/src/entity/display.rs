//! Panadapter and waterfall status vocabularies.
//!
//! A panadapter and its waterfall reference each other by stream id: the
//! panadapter's `waterfall=` key names its child and the waterfall's
//! `panadapter=` key names its parent. Both references gate acking (see
//! [`crate::ack`]).

use super::{ApplyResult, Applied, parse, parse_flag, parse_hex_ref, parse_list, parse_mhz, set};

/// Observed state of one panadapter (spectrum display).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanadapterFields {
    pub center_hz: u64,
    pub bandwidth_hz: u64,
    pub min_bandwidth_hz: u64,
    pub max_bandwidth_hz: u64,
    pub min_dbm: f64,
    pub max_dbm: f64,
    /// Width of one spectrum frame in bins.
    pub x_pixels: u32,
    pub y_pixels: u32,
    pub fps: u32,
    pub average: u32,
    pub weighted_average: bool,
    pub band: String,
    pub rx_ant: String,
    pub ant_list: Vec<String>,
    pub rf_gain: i32,
    pub preamp: String,
    pub daxiq: u8,
    pub wide: bool,
    pub loopa: bool,
    pub loopb: bool,
    pub wnb: bool,
    pub wnb_level: u32,
    pub xvtr: String,
    /// Child waterfall stream id; `Some(0)` means the radio reported none.
    pub waterfall: Option<u32>,
}

impl PanadapterFields {
    pub(crate) fn apply(&mut self, key: &str, value: &str) -> ApplyResult {
        let applied = match key {
            "center" => set(&mut self.center_hz, parse_mhz(value)?, "center_hz"),
            "bandwidth" => set(&mut self.bandwidth_hz, parse_mhz(value)?, "bandwidth_hz"),
            "min_bw" => set(&mut self.min_bandwidth_hz, parse_mhz(value)?, "min_bandwidth_hz"),
            "max_bw" => set(&mut self.max_bandwidth_hz, parse_mhz(value)?, "max_bandwidth_hz"),
            "min_dbm" => set(&mut self.min_dbm, parse(value)?, "min_dbm"),
            "max_dbm" => set(&mut self.max_dbm, parse(value)?, "max_dbm"),
            "x_pixels" => set(&mut self.x_pixels, parse(value)?, "x_pixels"),
            "y_pixels" => set(&mut self.y_pixels, parse(value)?, "y_pixels"),
            "fps" => set(&mut self.fps, parse(value)?, "fps"),
            "average" => set(&mut self.average, parse(value)?, "average"),
            "weighted_average" => {
                set(&mut self.weighted_average, parse_flag(value)?, "weighted_average")
            }
            "band" => set(&mut self.band, value.to_string(), "band"),
            "rxant" => set(&mut self.rx_ant, value.to_string(), "rx_ant"),
            "ant_list" => set(&mut self.ant_list, parse_list(value), "ant_list"),
            "rfgain" => set(&mut self.rf_gain, parse(value)?, "rf_gain"),
            "pre" => set(&mut self.preamp, value.to_string(), "preamp"),
            "daxiq" => set(&mut self.daxiq, parse(value)?, "daxiq"),
            "wide" => set(&mut self.wide, parse_flag(value)?, "wide"),
            "loopa" => set(&mut self.loopa, parse_flag(value)?, "loopa"),
            "loopb" => set(&mut self.loopb, parse_flag(value)?, "loopb"),
            "wnb" => set(&mut self.wnb, parse_flag(value)?, "wnb"),
            "wnb_level" => set(&mut self.wnb_level, parse(value)?, "wnb_level"),
            "xvtr" => set(&mut self.xvtr, value.to_string(), "xvtr"),
            "waterfall" => set(&mut self.waterfall, Some(parse_hex_ref(value)?), "waterfall"),
            "stream_id" | "wnb_updating" | "daxiq_rate" | "capacity" | "available" => {
                Applied::Unmodeled
            }
            _ => Applied::Unknown,
        };
        Ok(applied)
    }
}

/// Observed state of one waterfall display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaterfallFields {
    /// Parent panadapter stream id, once reported.
    pub panadapter: Option<u32>,
    pub center_hz: u64,
    pub bandwidth_hz: u64,
    pub x_pixels: u32,
    pub line_duration: u32,
    pub color_gain: u32,
    pub black_level: u32,
    pub auto_black: bool,
    pub gradient_index: u32,
}

impl WaterfallFields {
    pub(crate) fn apply(&mut self, key: &str, value: &str) -> ApplyResult {
        let applied = match key {
            "panadapter" => set(&mut self.panadapter, Some(parse_hex_ref(value)?), "panadapter"),
            "center" => set(&mut self.center_hz, parse_mhz(value)?, "center_hz"),
            "bandwidth" => set(&mut self.bandwidth_hz, parse_mhz(value)?, "bandwidth_hz"),
            "x_pixels" => set(&mut self.x_pixels, parse(value)?, "x_pixels"),
            "line_duration" => set(&mut self.line_duration, parse(value)?, "line_duration"),
            "color_gain" => set(&mut self.color_gain, parse(value)?, "color_gain"),
            "black_level" => set(&mut self.black_level, parse(value)?, "black_level"),
            "auto_black" => set(&mut self.auto_black, parse_flag(value)?, "auto_black"),
            "gradient_index" => set(&mut self.gradient_index, parse(value)?, "gradient_index"),
            "stream_id" | "y_pixels" | "min_dbm" | "max_dbm" | "fps" | "average" | "rfgain"
            | "rxant" | "wide" | "loopa" | "loopb" | "band" | "daxiq" | "daxiq_rate"
            | "capacity" | "available" | "xvtr" | "weighted_average" => Applied::Unmodeled,
            _ => Applied::Unknown,
        };
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panadapter_geometry() {
        let mut pan = PanadapterFields::default();
        pan.apply("center", "14.100000").unwrap();
        pan.apply("bandwidth", "0.200000").unwrap();
        pan.apply("x_pixels", "1024").unwrap();
        assert_eq!(pan.center_hz, 14_100_000);
        assert_eq!(pan.bandwidth_hz, 200_000);
        assert_eq!(pan.x_pixels, 1024);
    }

    #[test]
    fn panadapter_waterfall_reference() {
        let mut pan = PanadapterFields::default();
        assert_eq!(pan.waterfall, None);
        assert_eq!(
            pan.apply("waterfall", "0x42000000"),
            Ok(Applied::Changed("waterfall"))
        );
        assert_eq!(pan.waterfall, Some(0x4200_0000));

        let mut lone = PanadapterFields::default();
        lone.apply("waterfall", "0x00000000").unwrap();
        assert_eq!(lone.waterfall, Some(0));
    }

    #[test]
    fn waterfall_parent_reference() {
        let mut wf = WaterfallFields::default();
        wf.apply("panadapter", "40000000").unwrap();
        assert_eq!(wf.panadapter, Some(0x4000_0000));
        assert_eq!(wf.apply("auto_black", "1"), Ok(Applied::Changed("auto_black")));
        assert_eq!(wf.apply("capacity", "16"), Ok(Applied::Unmodeled));
    }

    #[test]
    fn bad_dbm_is_rejected() {
        let mut pan = PanadapterFields::default();
        assert!(pan.apply("min_dbm", "loud").is_err());
    }
}

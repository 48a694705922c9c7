//! Slice (receiver) status vocabulary.

use super::{ApplyResult, Applied, parse, parse_flag, parse_hex_ref, parse_list, parse_mhz, set};

/// Observed state of one slice receiver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceFields {
    /// Tuned frequency in Hz (`RF_frequency`, sent in MHz).
    pub frequency_hz: u64,
    /// Demodulation mode string (e.g. `"USB"`, `"CW"`, `"DIGU"`).
    pub mode: String,
    pub mode_list: Vec<String>,
    pub filter_lo: i32,
    pub filter_hi: i32,
    /// The radio reports the slice as allocated.
    pub in_use: bool,
    pub active: bool,
    /// This slice is the transmit slice.
    pub tx: bool,
    /// Stream id of the panadapter this slice lives on; `0` means none.
    pub pan: u32,
    /// DAX channel the slice audio feeds; `0` means none.
    pub dax: u8,
    pub audio_gain: u32,
    pub audio_pan: u32,
    pub audio_mute: bool,
    pub rx_ant: String,
    pub tx_ant: String,
    pub ant_list: Vec<String>,
    pub agc_mode: String,
    pub agc_threshold: u32,
    pub agc_off_level: u32,
    pub rit_on: bool,
    pub rit_freq: i32,
    pub xit_on: bool,
    pub xit_freq: i32,
    pub lock: bool,
    pub step: u32,
    pub nb: bool,
    pub nb_level: u32,
    pub nr: bool,
    pub nr_level: u32,
    pub anf: bool,
    pub anf_level: u32,
    pub apf: bool,
    pub apf_level: u32,
    pub wnb: bool,
    pub wnb_level: u32,
    pub squelch: bool,
    pub squelch_level: u32,
    pub wide: bool,
    pub loopa: bool,
    pub loopb: bool,
    pub qsk: bool,
}

impl SliceFields {
    pub(crate) fn apply(&mut self, key: &str, value: &str) -> ApplyResult {
        let applied = match key {
            "rf_frequency" => set(&mut self.frequency_hz, parse_mhz(value)?, "frequency_hz"),
            "mode" => set(&mut self.mode, value.to_string(), "mode"),
            "mode_list" => set(&mut self.mode_list, parse_list(value), "mode_list"),
            "filter_lo" => set(&mut self.filter_lo, parse(value)?, "filter_lo"),
            "filter_hi" => set(&mut self.filter_hi, parse(value)?, "filter_hi"),
            "in_use" => set(&mut self.in_use, parse_flag(value)?, "in_use"),
            "active" => set(&mut self.active, parse_flag(value)?, "active"),
            "tx" => set(&mut self.tx, parse_flag(value)?, "tx"),
            "pan" => set(&mut self.pan, parse_hex_ref(value)?, "pan"),
            "dax" => set(&mut self.dax, parse(value)?, "dax"),
            "audio_gain" => set(&mut self.audio_gain, parse(value)?, "audio_gain"),
            "audio_pan" => set(&mut self.audio_pan, parse(value)?, "audio_pan"),
            "audio_mute" => set(&mut self.audio_mute, parse_flag(value)?, "audio_mute"),
            "rxant" => set(&mut self.rx_ant, value.to_string(), "rx_ant"),
            "txant" => set(&mut self.tx_ant, value.to_string(), "tx_ant"),
            "ant_list" => set(&mut self.ant_list, parse_list(value), "ant_list"),
            "agc_mode" => set(&mut self.agc_mode, value.to_string(), "agc_mode"),
            "agc_threshold" => set(&mut self.agc_threshold, parse(value)?, "agc_threshold"),
            "agc_off_level" => set(&mut self.agc_off_level, parse(value)?, "agc_off_level"),
            "rit_on" => set(&mut self.rit_on, parse_flag(value)?, "rit_on"),
            "rit_freq" => set(&mut self.rit_freq, parse(value)?, "rit_freq"),
            "xit_on" => set(&mut self.xit_on, parse_flag(value)?, "xit_on"),
            "xit_freq" => set(&mut self.xit_freq, parse(value)?, "xit_freq"),
            "lock" => set(&mut self.lock, parse_flag(value)?, "lock"),
            "step" => set(&mut self.step, parse(value)?, "step"),
            "nb" => set(&mut self.nb, parse_flag(value)?, "nb"),
            "nb_level" => set(&mut self.nb_level, parse(value)?, "nb_level"),
            "nr" => set(&mut self.nr, parse_flag(value)?, "nr"),
            "nr_level" => set(&mut self.nr_level, parse(value)?, "nr_level"),
            "anf" => set(&mut self.anf, parse_flag(value)?, "anf"),
            "anf_level" => set(&mut self.anf_level, parse(value)?, "anf_level"),
            "apf" => set(&mut self.apf, parse_flag(value)?, "apf"),
            "apf_level" => set(&mut self.apf_level, parse(value)?, "apf_level"),
            "wnb" => set(&mut self.wnb, parse_flag(value)?, "wnb"),
            "wnb_level" => set(&mut self.wnb_level, parse(value)?, "wnb_level"),
            "squelch" => set(&mut self.squelch, parse_flag(value)?, "squelch"),
            "squelch_level" => set(&mut self.squelch_level, parse(value)?, "squelch_level"),
            "wide" => set(&mut self.wide, parse_flag(value)?, "wide"),
            "loopa" => set(&mut self.loopa, parse_flag(value)?, "loopa"),
            "loopb" => set(&mut self.loopb, parse_flag(value)?, "loopb"),
            "qsk" => set(&mut self.qsk, parse_flag(value)?, "qsk"),
            "owner" | "diversity" | "diversity_child" | "diversity_index" | "diversity_parent"
            | "rfgain" | "rtty_mark" | "rtty_shift" | "digl_offset" | "digu_offset"
            | "fm_repeater_offset_freq" | "fm_tone_burst" | "fm_tone_mode" | "fm_tone_value"
            | "fm_deviation" | "dfm_pre_de_emphasis" | "repeater_offset_dir"
            | "tx_offset_freq" | "step_list" | "record" | "play" | "record_time"
            | "dax_clients" => Applied::Unmodeled,
            _ => Applied::Unknown,
        };
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuning_fields() {
        let mut slice = SliceFields::default();
        assert_eq!(
            slice.apply("rf_frequency", "14.250000"),
            Ok(Applied::Changed("frequency_hz"))
        );
        assert_eq!(slice.frequency_hz, 14_250_000);
        assert_eq!(slice.apply("mode", "CW"), Ok(Applied::Changed("mode")));
        assert_eq!(slice.apply("mode", "CW"), Ok(Applied::Unchanged));
        assert_eq!(slice.apply("filter_lo", "-2900"), Ok(Applied::Changed("filter_lo")));
        assert_eq!(slice.filter_lo, -2900);
    }

    #[test]
    fn pan_reference_is_hex() {
        let mut slice = SliceFields::default();
        slice.apply("pan", "0x40000000").unwrap();
        assert_eq!(slice.pan, 0x4000_0000);
        slice.apply("pan", "0x0").unwrap();
        assert_eq!(slice.pan, 0);
    }

    #[test]
    fn lists_split_on_commas() {
        let mut slice = SliceFields::default();
        slice.apply("mode_list", "LSB,USB,CW").unwrap();
        assert_eq!(slice.mode_list, vec!["LSB", "USB", "CW"]);
    }

    #[test]
    fn known_but_unmodeled_and_unknown_keys() {
        let mut slice = SliceFields::default();
        assert_eq!(slice.apply("dax_clients", "2"), Ok(Applied::Unmodeled));
        assert_eq!(slice.apply("brand_new_key", "2"), Ok(Applied::Unknown));
    }

    #[test]
    fn invalid_value_is_an_error() {
        let mut slice = SliceFields::default();
        assert!(slice.apply("in_use", "maybe").is_err());
        assert!(!slice.in_use);
    }
}

//! Transverter status vocabulary.

use super::{ApplyResult, Applied, parse, parse_flag, parse_mhz, parse_mhz_offset, set};
use crate::status::unescape;

/// Observed state of one transverter definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XvtrFields {
    pub name: String,
    pub order: u32,
    pub rf_freq_hz: u64,
    pub if_freq_hz: u64,
    pub lo_error_hz: i64,
    pub rx_gain: f64,
    pub rx_only: bool,
    pub max_power: f64,
    /// The radio accepted the current frequency plan.
    pub is_valid: bool,
}

impl XvtrFields {
    pub(crate) fn apply(&mut self, key: &str, value: &str) -> ApplyResult {
        let applied = match key {
            "name" => set(&mut self.name, unescape(value), "name"),
            "order" => set(&mut self.order, parse(value)?, "order"),
            "rf_freq" => set(&mut self.rf_freq_hz, parse_mhz(value)?, "rf_freq_hz"),
            "if_freq" => set(&mut self.if_freq_hz, parse_mhz(value)?, "if_freq_hz"),
            "lo_error" => set(&mut self.lo_error_hz, parse_mhz_offset(value)?, "lo_error_hz"),
            "rx_gain" => set(&mut self.rx_gain, parse(value)?, "rx_gain"),
            "rx_only" => set(&mut self.rx_only, parse_flag(value)?, "rx_only"),
            "max_power" => set(&mut self.max_power, parse(value)?, "max_power"),
            "is_valid" => set(&mut self.is_valid, parse_flag(value)?, "is_valid"),
            _ => Applied::Unknown,
        };
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_plan() {
        let mut xvtr = XvtrFields::default();
        xvtr.apply("rf_freq", "144.000000").unwrap();
        xvtr.apply("if_freq", "28.000000").unwrap();
        xvtr.apply("lo_error", "-0.000250").unwrap();
        assert_eq!(xvtr.rf_freq_hz, 144_000_000);
        assert_eq!(xvtr.if_freq_hz, 28_000_000);
        assert_eq!(xvtr.lo_error_hz, -250);
    }

    #[test]
    fn name_is_unescaped() {
        let mut xvtr = XvtrFields::default();
        assert_eq!(xvtr.apply("name", "2m\u{7F}DEMI"), Ok(Applied::Changed("name")));
        assert_eq!(xvtr.name, "2m DEMI");
    }

    #[test]
    fn validity_flag() {
        let mut xvtr = XvtrFields::default();
        assert_eq!(xvtr.apply("is_valid", "1"), Ok(Applied::Changed("is_valid")));
        assert_eq!(xvtr.apply("is_valid", "1"), Ok(Applied::Unchanged));
    }
}

//! Memory channel status vocabulary.

use super::{ApplyResult, Applied, parse, parse_flag, parse_mhz, parse_mhz_offset, set};
use crate::status::unescape;

/// Observed state of one stored memory channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryFields {
    pub owner: String,
    pub group: String,
    pub name: String,
    pub frequency_hz: u64,
    pub mode: String,
    pub step: u32,
    /// Repeater offset direction (`SIMPLEX`, `UP`, `DOWN`).
    pub repeater: String,
    pub repeater_offset_hz: i64,
    pub tone_mode: String,
    pub tone_value: f64,
    pub squelch: bool,
    pub squelch_level: u32,
    pub power: u32,
    pub rx_filter_low: i32,
    pub rx_filter_high: i32,
    pub rtty_mark: i32,
    pub rtty_shift: i32,
    pub digl_offset: i32,
    pub digu_offset: i32,
    pub highlight: bool,
    pub highlight_color: String,
}

impl MemoryFields {
    pub(crate) fn apply(&mut self, key: &str, value: &str) -> ApplyResult {
        let applied = match key {
            "owner" => set(&mut self.owner, unescape(value), "owner"),
            "group" => set(&mut self.group, unescape(value), "group"),
            "name" => set(&mut self.name, unescape(value), "name"),
            "freq" => set(&mut self.frequency_hz, parse_mhz(value)?, "frequency_hz"),
            "mode" => set(&mut self.mode, value.to_string(), "mode"),
            "step" => set(&mut self.step, parse(value)?, "step"),
            "repeater" => set(&mut self.repeater, value.to_string(), "repeater"),
            "repeater_offset" => set(
                &mut self.repeater_offset_hz,
                parse_mhz_offset(value)?,
                "repeater_offset_hz",
            ),
            "tone_mode" => set(&mut self.tone_mode, value.to_string(), "tone_mode"),
            "tone_value" => set(&mut self.tone_value, parse(value)?, "tone_value"),
            "squelch" => set(&mut self.squelch, parse_flag(value)?, "squelch"),
            "squelch_level" => set(&mut self.squelch_level, parse(value)?, "squelch_level"),
            "power" => set(&mut self.power, parse(value)?, "power"),
            "rx_filter_low" => set(&mut self.rx_filter_low, parse(value)?, "rx_filter_low"),
            "rx_filter_high" => set(&mut self.rx_filter_high, parse(value)?, "rx_filter_high"),
            "rtty_mark" => set(&mut self.rtty_mark, parse(value)?, "rtty_mark"),
            "rtty_shift" => set(&mut self.rtty_shift, parse(value)?, "rtty_shift"),
            "digl_offset" => set(&mut self.digl_offset, parse(value)?, "digl_offset"),
            "digu_offset" => set(&mut self.digu_offset, parse(value)?, "digu_offset"),
            "highlight" => set(&mut self.highlight, parse_flag(value)?, "highlight"),
            "highlight_color" => {
                set(&mut self.highlight_color, value.to_string(), "highlight_color")
            }
            _ => Applied::Unknown,
        };
        Ok(applied)
    }
}

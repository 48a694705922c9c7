//! Tracking notch filter status vocabulary.

use super::{ApplyResult, Applied, parse, parse_flag, parse_mhz, set};

/// Observed state of one tracking notch filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TnfFields {
    pub frequency_hz: u64,
    pub width_hz: u64,
    pub depth: u32,
    pub permanent: bool,
}

impl TnfFields {
    /// A notch is usable once frequency, width and depth are all nonzero.
    pub fn is_complete(&self) -> bool {
        self.frequency_hz != 0 && self.width_hz != 0 && self.depth != 0
    }

    pub(crate) fn apply(&mut self, key: &str, value: &str) -> ApplyResult {
        let applied = match key {
            "freq" => set(&mut self.frequency_hz, parse_mhz(value)?, "frequency_hz"),
            "width" => set(&mut self.width_hz, parse_mhz(value)?, "width_hz"),
            "depth" => set(&mut self.depth, parse(value)?, "depth"),
            "permanent" => set(&mut self.permanent, parse_flag(value)?, "permanent"),
            _ => Applied::Unknown,
        };
        Ok(applied)
    }
}

//! Equalizer status vocabulary (`eq rxsc` / `eq txsc`).

use super::{ApplyResult, Applied, parse, parse_flag, set};

/// Band centre frequencies in Hz, in the order of [`EqualizerFields::bands`].
pub const BAND_CENTERS_HZ: [u32; 9] = [32, 63, 125, 250, 500, 1000, 2000, 4000, 8000];

const BAND_KEYS: [&str; 9] = [
    "32hz", "63hz", "125hz", "250hz", "500hz", "1000hz", "2000hz", "4000hz", "8000hz",
];

/// Observed state of one nine-band equalizer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EqualizerFields {
    pub enabled: bool,
    /// Per-band level, indexed like [`BAND_CENTERS_HZ`].
    pub bands: [i32; 9],
}

impl EqualizerFields {
    /// Level of the band centred on `hz`, if it is one of the nine bands.
    pub fn band(&self, hz: u32) -> Option<i32> {
        BAND_CENTERS_HZ
            .iter()
            .position(|&c| c == hz)
            .map(|i| self.bands[i])
    }

    pub(crate) fn apply(&mut self, key: &str, value: &str) -> ApplyResult {
        if key == "mode" {
            return Ok(set(&mut self.enabled, parse_flag(value)?, "enabled"));
        }

        match BAND_KEYS.iter().position(|&k| k == key) {
            Some(i) => Ok(set(&mut self.bands[i], parse(value)?, BAND_KEYS[i])),
            None => Ok(Applied::Unknown),
        }
    }
}

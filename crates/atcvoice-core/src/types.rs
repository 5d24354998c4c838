//! Core types used throughout atcvoice.
//!
//! Frequencies are plain `u32` values in hertz everywhere in the workspace
//! (the voice server keys transceivers by integer hertz), so no newtype is
//! used for them.

use std::fmt;
use std::str::FromStr;

/// Radio hardware model emulated by the VHF band-pass filter.
///
/// Each model has a distinct audio response; the filter cascade constructed
/// for a radio depends on this selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HardwareType {
    /// Schmid ED-137B radio gateway.
    #[default]
    SchmidEd137b,
    /// Rockwell Collins 2100 VHF set.
    RockwellCollins2100,
    /// Garex 220 ground station.
    Garex220,
    /// No hardware emulation; the filter passes audio through untouched.
    NoHardware,
}

impl fmt::Display for HardwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HardwareType::SchmidEd137b => "Schmid_ED_137B",
            HardwareType::RockwellCollins2100 => "Rockwell_Collins_2100",
            HardwareType::Garex220 => "Garex_220",
            HardwareType::NoHardware => "No_Hardware",
        };
        write!(f, "{s}")
    }
}

/// Error returned when a string cannot be parsed into a [`HardwareType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseHardwareTypeError(String);

impl fmt::Display for ParseHardwareTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown hardware type: {}", self.0)
    }
}

impl std::error::Error for ParseHardwareTypeError {}

impl FromStr for HardwareType {
    type Err = ParseHardwareTypeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SCHMID_ED_137B" | "SCHMID" => Ok(HardwareType::SchmidEd137b),
            "ROCKWELL_COLLINS_2100" | "ROCKWELL" => Ok(HardwareType::RockwellCollins2100),
            "GAREX_220" | "GAREX" => Ok(HardwareType::Garex220),
            "NO_HARDWARE" | "NONE" => Ok(HardwareType::NoHardware),
            _ => Err(ParseHardwareTypeError(s.to_string())),
        }
    }
}

/// Which side of the stereo output bus a radio is mixed onto.
///
/// `Both` is the default and mixes onto the main (center) bus. `Left` and
/// `Right` pan the radio hard to one ear, a common controller setup when
/// monitoring several frequencies on one headset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackChannel {
    /// Mixed onto the main bus, heard in both ears.
    #[default]
    Both,
    /// Mixed onto the left bus only.
    Left,
    /// Mixed onto the right bus only.
    Right,
}

/// Geographic position of the client, used to mint a synthetic transceiver
/// when a radio has none assigned from the API.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClientPosition {
    /// Latitude in decimal degrees.
    pub lat_deg: f64,
    /// Longitude in decimal degrees.
    pub lon_deg: f64,
    /// Height above mean sea level in metres.
    pub height_msl_m: f64,
    /// Height above ground level in metres.
    pub height_agl_m: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_type_display_roundtrip() {
        for hw in [
            HardwareType::SchmidEd137b,
            HardwareType::RockwellCollins2100,
            HardwareType::Garex220,
            HardwareType::NoHardware,
        ] {
            let s = hw.to_string();
            assert_eq!(s.parse::<HardwareType>().unwrap(), hw);
        }
    }

    #[test]
    fn hardware_type_parse_shorthand() {
        assert_eq!(
            "schmid".parse::<HardwareType>().unwrap(),
            HardwareType::SchmidEd137b
        );
        assert_eq!(
            "none".parse::<HardwareType>().unwrap(),
            HardwareType::NoHardware
        );
    }

    #[test]
    fn hardware_type_parse_unknown() {
        assert!("Marconi".parse::<HardwareType>().is_err());
    }

    #[test]
    fn playback_channel_default_is_both() {
        assert_eq!(PlaybackChannel::default(), PlaybackChannel::Both);
    }
}

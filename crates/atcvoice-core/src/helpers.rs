//! Formatting helpers shared by consuming applications.

/// Format a frequency in hertz as a human-readable MHz string.
///
/// Returns a string like `"118.100000 MHz"` with six decimal places, the
/// standard display precision for aviation frequencies.
///
/// # Example
///
/// ```
/// use atcvoice_core::format_freq_mhz;
///
/// assert_eq!(format_freq_mhz(118_100_000), "118.100000 MHz");
/// assert_eq!(format_freq_mhz(121_500_000), "121.500000 MHz");
/// ```
pub fn format_freq_mhz(freq_hz: u32) -> String {
    let mhz = freq_hz as f64 / 1_000_000.0;
    format!("{mhz:.6} MHz")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_vhf() {
        assert_eq!(format_freq_mhz(118_100_000), "118.100000 MHz");
        assert_eq!(format_freq_mhz(199_998_000), "199.998000 MHz");
    }

    #[test]
    fn format_odd_spacing() {
        // 8.33 kHz channel spacing produces non-round values.
        assert_eq!(format_freq_mhz(118_105_000), "118.105000 MHz");
    }
}

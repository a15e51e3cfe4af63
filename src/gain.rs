/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Gain code conversion.
//! Gains are requested in permille (1000 = 1x).
//! Analog gain codes are in units of 1/32x; digital gain codes are
//! 8.8 fixed point (integer part in the high byte).

/// Analog gain code for 1x
pub const AGAIN_CODE_UNITY: u32 = 0x20;
/// Digital gain code for 1x
pub const DGAIN_CODE_UNITY: u32 = 0x100;

pub fn again_code(permille: u32) -> u32 {
    ((permille as u64 * 32 + 500) / 1000) as u32
}

pub fn again_permille(code: u32) -> u32 {
    ((code as u64 * 1000 + 16) / 32) as u32
}

pub fn dgain_code(permille: u32) -> u32 {
    let int_part = permille / 1000;
    let frac_part = (permille % 1000) * 256 / 1000;
    (int_part << 8) | frac_part
}

/// Inverse of [`dgain_code`]; the fraction rounds up so the result is
/// never more than one fraction step below the original request
pub fn dgain_permille(code: u32) -> u32 {
    let int_part = code >> 8;
    let frac_part = code & 0xFF;
    int_part * 1000 + (frac_part * 1000 + 255) / 256
}

/// Inclusive range of register codes a sensor accepts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GainLimits {
    pub min_code: u32,
    pub max_code: u32,
}

impl GainLimits {
    pub const fn new(min_code: u32, max_code: u32) -> Self {
        Self { min_code, max_code }
    }

    pub fn clamp(&self, code: u32) -> u32 {
        code.max(self.min_code).min(self.max_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unity_codes() {
        assert_eq!(again_code(1000), AGAIN_CODE_UNITY);
        assert_eq!(again_permille(AGAIN_CODE_UNITY), 1000);
        assert_eq!(dgain_code(1000), DGAIN_CODE_UNITY);
        assert_eq!(dgain_permille(DGAIN_CODE_UNITY), 1000);
        assert_eq!(again_permille(0x200), 16_000);
    }

    #[test]
    fn one_and_a_half_digital() {
        assert_eq!(dgain_code(1500), (1 << 8) | 128);
        assert_eq!(dgain_permille((1 << 8) | 128), 1500);
    }

    #[test]
    fn analog_round_trip_within_one_step() {
        for permille in 1000..=16_000u32 {
            let once = again_permille(again_code(permille));
            assert!(once.abs_diff(permille) <= 32, "{} -> {}", permille, once);
            assert_eq!(again_permille(again_code(once)), once);
        }
    }

    #[test]
    fn digital_round_trip_within_one_fraction_step() {
        for permille in 1000..=16_000u32 {
            let back = dgain_permille(dgain_code(permille));
            assert!(back <= permille, "{} -> {}", permille, back);
            assert!(permille - back < 4, "{} -> {}", permille, back);
        }
    }

    #[test]
    fn limits_clamp_both_ends() {
        let limits = GainLimits::new(0x20, 0x200);
        assert_eq!(limits.clamp(0x10), 0x20);
        assert_eq!(limits.clamp(0x80), 0x80);
        assert_eq!(limits.clamp(0x400), 0x200);
    }
}

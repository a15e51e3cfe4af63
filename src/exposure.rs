/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Exposure arithmetic: integration time codes, shifters and the
//! exposure limits implied by the current frame length.

use crate::timing::CisTimingParameters;

/// Shifter value chosen from the exposure index
pub const SHIFTER_TABLE: [u8; 17] =
    [0, 1, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 5];
/// Exposure divisor for each shifter value
pub const SHIFTER_DENOMINATORS: [u32; 6] = [1, 2, 4, 8, 16, 32];

/// How a sensor mode extends integration time beyond the register range
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShifterPolicy {
    /// The integration time registers cover every supported exposure
    None,
    /// Halve any target above `threshold_us` and set shifter 1
    Halve { threshold_us: u32 },
    /// Pick the shifter from [`SHIFTER_TABLE`] using `target / step_us`
    Table { step_us: u32 },
}

/// A line-time shifter setting
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Shift(pub u8);

impl Shift {
    pub fn denominator(self) -> u32 {
        SHIFTER_DENOMINATORS
            .get(self.0 as usize)
            .copied()
            .unwrap_or(SHIFTER_DENOMINATORS[SHIFTER_DENOMINATORS.len() - 1])
    }

    /// The integration time shifter register carries the value in both bytes
    pub fn cit_register(self) -> u16 {
        ((self.0 as u16) << 8) | self.0 as u16
    }
}

fn table_shift(target_us: u32, step_us: u32) -> Shift {
    if step_us == 0 || target_us <= step_us {
        return Shift(0);
    }
    let idx = ((target_us / step_us) as usize).min(SHIFTER_TABLE.len() - 1);
    Shift(SHIFTER_TABLE[idx])
}

/// Frame length shifter for a requested frame duration
pub fn fll_shift(policy: ShifterPolicy, duration_us: u32) -> Shift {
    match policy {
        ShifterPolicy::None => Shift(0),
        ShifterPolicy::Halve { threshold_us } => {
            Shift((duration_us > threshold_us) as u8)
        }
        ShifterPolicy::Table { step_us } => table_shift(duration_us, step_us),
    }
}

/// Integration time shifter for a requested exposure.
/// Table driven sensors never use a shifter below the frame length one.
pub fn cit_shift(policy: ShifterPolicy, exposure_us: u32, fll: Shift) -> Shift {
    match policy {
        ShifterPolicy::None => Shift(0),
        ShifterPolicy::Halve { threshold_us } => {
            Shift((exposure_us > threshold_us) as u8)
        }
        ShifterPolicy::Table { step_us } => {
            let shift = table_shift(exposure_us, step_us);
            Shift(shift.0.max(fll.0))
        }
    }
}

/// Coarse integration time rounding rule
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoarseQuantum {
    /// Coarse value is rounded down to a multiple of this
    pub step: u32,
    /// Multiplier applied to the sensor's minimum coarse integration time
    pub min_scale: u32,
}

impl CoarseQuantum {
    pub const NONE: CoarseQuantum = CoarseQuantum {
        step: 1,
        min_scale: 1,
    };
}

/// Convert an exposure to coarse integration lines, rounded and clamped
pub fn coarse_integration_time(
    exposure_us: u32,
    params: &CisTimingParameters,
    quantum: CoarseQuantum,
) -> u32 {
    let pck = exposure_us as u64 * params.pclk_khz() / 1000;
    let lines = pck
        .saturating_sub(params.min_fine_integration_time as u64)
        .checked_div(params.line_length_pck as u64)
        .unwrap_or(0);
    let lines = lines.min(u32::MAX as u64) as u32;

    let step = quantum.step.max(1);
    let coarse = lines - lines % step;
    let min_coarse = params.min_coarse_integration_time * quantum.min_scale;
    coarse
        .max(min_coarse)
        .min(params.max_coarse_integration_time())
}

/// Shortest exposure the current mode can produce
pub fn min_exposure_time_us(params: &CisTimingParameters) -> u32 {
    let pck = params.line_length_pck as u64
        * params.min_coarse_integration_time as u64
        + params.min_fine_integration_time as u64;
    (pck * 1000).checked_div(params.pclk_khz()).unwrap_or(0) as u32
}

/// Longest exposure the current frame length allows
pub fn max_exposure_time_us(params: &CisTimingParameters) -> u32 {
    let pck = params.line_length_pck as u64
        * params.max_coarse_integration_time() as u64
        + params.max_fine_integration_time as u64;
    (pck * 1000).checked_div(params.pclk_khz()).unwrap_or(0) as u32
}

/// Frame duration needed to fit `exposure_us`, never below `min_frame_us`
pub fn frame_duration_for_exposure(
    exposure_us: u32,
    params: &CisTimingParameters,
    min_frame_us: u32,
) -> u32 {
    let pclk_khz = params.pclk_khz();
    let llp = params.line_length_pck as u64;
    let lines = (pclk_khz * exposure_us as u64 / 1000)
        .saturating_sub(params.min_fine_integration_time as u64)
        .checked_div(llp)
        .unwrap_or(0);
    let fll = lines + params.max_margin_coarse_integration_time() as u64;
    let duration = (fll * llp * 1000).checked_div(pclk_khz).unwrap_or(0);
    (duration.min(u32::MAX as u64) as u32).max(min_frame_us)
}

/// Coarse integration time at or below which gains are compensated
pub const BRIGHT_SCENE_MAX_COARSE: u32 = 1024;

/// Correct gains for the exposure lost to coarse rounding.
/// Below `min_again` only the analog gain is raised to the minimum;
/// otherwise the digital gain carries the correction.
pub fn compensate_gain_for_extremely_br(
    exposure_us: u32,
    again: u32,
    dgain: u32,
    params: &CisTimingParameters,
    quantum: CoarseQuantum,
    min_again: u32,
) -> (u32, u32) {
    let coarse = coarse_integration_time(exposure_us, params, quantum);
    let integrated = params.line_length_pck as u64 * coarse as u64;
    if coarse > BRIGHT_SCENE_MAX_COARSE || integrated == 0 {
        return (again, dgain);
    }
    let wanted = (exposure_us as u64 * params.pclk_khz() / 1000)
        .saturating_sub(params.min_fine_integration_time as u64);

    let compensated = again as u64 * wanted / integrated;
    if compensated < min_again as u64 {
        (min_again, dgain)
    } else {
        let dgain = dgain as u64 * wanted / integrated;
        (again, dgain.min(u32::MAX as u64) as u32)
    }
}

/// Frame duration produced by `fll` lines
pub fn frame_duration_for_lines(fll: u32, params: &CisTimingParameters) -> u32 {
    let duration = (fll as u64 * params.line_length_pck as u64 * 1000)
        .checked_div(params.pclk_khz())
        .unwrap_or(0);
    duration.min(u32::MAX as u64) as u32
}

/// Frame length lines for a frame duration
pub fn frame_length_lines_for(
    duration_us: u32,
    params: &CisTimingParameters,
) -> u32 {
    let lines = (params.pclk_khz() * duration_us as u64)
        .checked_div(params.line_length_pck as u64 * 1000)
        .unwrap_or(0);
    lines.min(u16::MAX as u64) as u32
}

/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Samsung S5K2L4: 12MP 3-stack sensor.
//! Long exposures use a table driven line-time shifter, and low noise
//! readout constrains coarse integration time to multiples of 2, 4 or 8.

use super::{
    HOST_PAGE, HOST_PAGE_PROGRAM, INDIRECT_ADDR, INDIRECT_DATA, PAGE_SELECT,
    SRAM_PAGE_OPS, STREAM_OFF_OPS,
};
use crate::exposure::{CoarseQuantum, ShifterPolicy};
use crate::gain::GainLimits;
use crate::model::{
    CisDriver, CisLimits, CisRegisterMap, LongTermExposure, LowNoiseMode,
    SensorMode, SensorModelConfig, SmiaRegisters,
};
use crate::program::{burst, delay_ms, w16, RegisterOp, RegisterProgram};
use crate::timing::PllInfo;

pub const MAX_WIDTH: u32 = 4032;
pub const MAX_HEIGHT: u32 = 3024;

const BINNED_SHIFT_STEP_US: u32 = 80_000;
const SHIFT_STEP_US: u32 = 160_000;
const LOWNOISE_CTRL: u16 = 0x3012;
const PEDESTAL: u16 = 0x0BC0;

static REGISTERS: CisRegisterMap = CisRegisterMap {
    revision: SmiaRegisters::RevisionNumber.addr(),
    frame_count: SmiaRegisters::FrameCount.addr(),
    group_param_hold: SmiaRegisters::GroupParamHold.addr(),
    stream_on: RegisterProgram::new("stream_on", &[w16(0x0100, 0x0103)]),
    stream_off: RegisterProgram::new("stream_off", STREAM_OFF_OPS),
    coarse_integration_time: SmiaRegisters::CoarseIntegrationTime.addr(),
    long_coarse_integration_time: None,
    analog_gain: SmiaRegisters::AnalogGain.addr(),
    digital_gain: SmiaRegisters::DigitalGain.addr(),
    long_digital_gain: None,
    frame_length_lines: SmiaRegisters::FrameLengthLines.addr(),
    cit_shifter: Some(0x0702),
    fll_shifter: Some(0x0701),
    wdr_enable: RegisterProgram::EMPTY,
    wdr_disable: RegisterProgram::EMPTY,
    window_prologue: RegisterProgram::new("window", SRAM_PAGE_OPS),
};

static LIMITS: CisLimits = CisLimits {
    max_width: MAX_WIDTH,
    max_height: MAX_HEIGHT,
    min_coarse_integration_time: 0x02,
    min_fine_integration_time: 0x0100,
    max_fine_integration_time: 0x0C00,
    analog_gain: GainLimits::new(0x20, 0x200),
    digital_gain: GainLimits::new(0x100, 0x8000),
};

const RESET_TNP: &[RegisterOp] = &[
    w16(HOST_PAGE, 0x4000),
    w16(0x6010, 0x0001),
    delay_ms(3),
    w16(0x6214, 0x7971),
    w16(0x6218, 0x7150),
    w16(PAGE_SELECT, 0x2001),
    w16(INDIRECT_ADDR, 0x8C00),
    burst(INDIRECT_DATA, 0x10B5),
    burst(INDIRECT_DATA, 0x3AF0),
    burst(INDIRECT_DATA, 0x3CF9),
    burst(INDIRECT_DATA, 0x00F0),
    burst(INDIRECT_DATA, 0xABF8),
    burst(INDIRECT_DATA, 0x10BD),
    w16(0x6028, 0x4000),
    w16(0x6214, 0x7970),
];

const GLOBAL_A: &[RegisterOp] = &[
    w16(HOST_PAGE, 0x4000),
    w16(PAGE_SELECT, 0x2000),
    w16(INDIRECT_ADDR, 0xFF22),
    w16(INDIRECT_DATA, 0x0001),
    w16(INDIRECT_ADDR, 0x14C8),
    burst(INDIRECT_DATA, 0x0001),
    burst(INDIRECT_DATA, 0x0101),
    burst(INDIRECT_DATA, 0x0100),
    w16(0x0B04, 0x0101),
    w16(0x3012, 0x0101),
    w16(0xF44A, 0x0007),
];

const fn mode_ops(
    y_start: u16,
    y_end: u16,
    x_out: u16,
    y_out: u16,
    fll: u16,
    llp: u16,
    binning: u16,
) -> [RegisterOp; 14] {
    [
        w16(PAGE_SELECT, 0x2000),
        w16(0x0300, 0x0003),
        w16(0x0302, 0x0001),
        w16(0x0304, 0x0006),
        w16(0x0306, 0x0114),
        w16(0x0344, 0x0000),
        w16(0x0346, y_start),
        w16(0x0348, 0x0FBF),
        w16(0x034A, y_end),
        w16(0x034C, x_out),
        w16(0x034E, y_out),
        w16(0x0340, fll),
        w16(0x0342, llp),
        w16(0x0900, binning),
    ]
}

const MODE_4032X3024_30: [RegisterOp; 14] =
    mode_ops(0x0000, 0x0BCF, 0x0FC0, 0x0BD0, 0x0C48, 0x31B0, 0x0011);
const MODE_4032X2268_30: [RegisterOp; 14] =
    mode_ops(0x017A, 0x0A55, 0x0FC0, 0x08DC, 0x0C48, 0x31B0, 0x0011);
const MODE_2016X1512_30: [RegisterOp; 14] =
    mode_ops(0x0000, 0x0BCF, 0x07E0, 0x05E8, 0x0C48, 0x31B0, 0x0122);
const MODE_1008X756_120: [RegisterOp; 14] =
    mode_ops(0x0000, 0x0BCF, 0x03F0, 0x02F4, 0x0624, 0x18D8, 0x0144);

const fn pll(frame_length_lines: u32, line_length_pck: u32) -> PllInfo {
    PllInfo {
        ext_clk: 26_000_000,
        mipi_datarate: 1_690,
        pclk: 1_200_000_000,
        frame_length_lines,
        line_length_pck,
    }
}

static MODES: [SensorMode; 4] = [
    SensorMode {
        name: "4032x3024_30fps",
        width: 4032,
        height: 3024,
        pll: pll(3144, 12720),
        setfile: RegisterProgram::new("4032x3024_30fps", &MODE_4032X3024_30),
        max_margin_coarse_integration_time: 24,
        shifter: ShifterPolicy::Table { step_us: SHIFT_STEP_US },
        wdr: false,
        lownoise: true,
        paf_stat: true,
        load_sram: None,
    },
    SensorMode {
        name: "4032x2268_30fps",
        width: 4032,
        height: 2268,
        pll: pll(3144, 12720),
        setfile: RegisterProgram::new("4032x2268_30fps", &MODE_4032X2268_30),
        max_margin_coarse_integration_time: 24,
        shifter: ShifterPolicy::Table { step_us: SHIFT_STEP_US },
        wdr: false,
        lownoise: true,
        paf_stat: true,
        load_sram: None,
    },
    SensorMode {
        name: "2016x1512_30fps",
        width: 2016,
        height: 1512,
        pll: pll(3144, 12720),
        setfile: RegisterProgram::new("2016x1512_30fps", &MODE_2016X1512_30),
        max_margin_coarse_integration_time: 24,
        shifter: ShifterPolicy::Table { step_us: BINNED_SHIFT_STEP_US },
        wdr: false,
        lownoise: false,
        paf_stat: true,
        load_sram: None,
    },
    SensorMode {
        name: "1008x756_120fps",
        width: 1008,
        height: 756,
        pll: pll(1572, 6360),
        setfile: RegisterProgram::new("1008x756_120fps", &MODE_1008X756_120),
        max_margin_coarse_integration_time: 24,
        shifter: ShifterPolicy::Table { step_us: SHIFT_STEP_US },
        wdr: false,
        lownoise: false,
        paf_stat: false,
        load_sram: None,
    },
];

static SETFILE_A: SensorModelConfig = SensorModelConfig {
    name: "2l4_setfile_A",
    reset_tnp: RegisterProgram::new("reset_tnp", RESET_TNP),
    global: RegisterProgram::new("global_A", GLOBAL_A),
    modes: &MODES,
    retention: None,
};

const fn lownoise_ops(ctrl: u16) -> [RegisterOp; 4] {
    [
        w16(PAGE_SELECT, 0x2000),
        w16(INDIRECT_ADDR, 0xFF22),
        w16(INDIRECT_DATA, 0x0001),
        w16(LOWNOISE_CTRL, ctrl),
    ]
}

const LN_OFF: [RegisterOp; 4] = lownoise_ops(0x0101);
const LN_2: [RegisterOp; 4] = lownoise_ops(0x0201);
const LN_4: [RegisterOp; 4] = lownoise_ops(0x0401);
const LN_2_PEDESTAL: &[RegisterOp] =
    &[w16(0x0B30, 0x0200), w16(PEDESTAL, 0x0080)];
const LN_4_PEDESTAL: &[RegisterOp] =
    &[w16(0x0B30, 0x0300), w16(PEDESTAL, 0x0080)];

/// S5K2L4 driver
#[derive(Clone, Copy, Debug, Default)]
pub struct S5k2l4;

impl CisDriver for S5k2l4 {
    fn name(&self) -> &'static str {
        "2L4"
    }

    fn registers(&self) -> &'static CisRegisterMap {
        &REGISTERS
    }

    fn limits(&self) -> &'static CisLimits {
        &LIMITS
    }

    fn select_setfile(
        &self,
        revision: u8,
    ) -> Option<&'static SensorModelConfig> {
        match revision {
            // 3-stack and 3-stack SHBN
            0xA0 | 0xA1 => Some(&SETFILE_A),
            _ => None,
        }
    }

    fn lownoise_supported(&self, _revision: u8, mode: &SensorMode) -> bool {
        mode.lownoise
    }

    fn lownoise_program(
        &self,
        lownoise: LowNoiseMode,
        _mode: &SensorMode,
    ) -> RegisterProgram {
        match lownoise {
            LowNoiseMode::Off => RegisterProgram::new("lownoise_off", &LN_OFF),
            LowNoiseMode::Ln2 => RegisterProgram::new("lownoise_ln2", &LN_2),
            LowNoiseMode::Ln4 => RegisterProgram::new("lownoise_ln4", &LN_4),
            LowNoiseMode::Ln2Pedestal128 => {
                RegisterProgram::new("lownoise_ln2_pedestal", LN_2_PEDESTAL)
            }
            LowNoiseMode::Ln4Pedestal128 => {
                RegisterProgram::new("lownoise_ln4_pedestal", LN_4_PEDESTAL)
            }
        }
    }

    fn coarse_quantum(&self, lownoise: LowNoiseMode) -> CoarseQuantum {
        match lownoise {
            LowNoiseMode::Off => CoarseQuantum { step: 2, min_scale: 1 },
            LowNoiseMode::Ln2 => CoarseQuantum { step: 4, min_scale: 2 },
            LowNoiseMode::Ln4 => CoarseQuantum { step: 8, min_scale: 4 },
            _ => CoarseQuantum::NONE,
        }
    }

    fn lownoise_margin(&self, lownoise: LowNoiseMode) -> Option<u32> {
        match lownoise {
            LowNoiseMode::Off => Some(24),
            LowNoiseMode::Ln2 => Some(48),
            LowNoiseMode::Ln4 => Some(96),
            _ => None,
        }
    }

    fn long_term_exposure(&self) -> Option<LongTermExposure> {
        Some(LongTermExposure {
            base_us: 125_000,
            prologue: HOST_PAGE_PROGRAM,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cis::{Cis, CisConfig};
    use crate::retention::RetentionState;
    use crate::test::{MockBus, MockDelay};

    fn selected(mode: usize) -> Cis<MockBus, MockDelay, S5k2l4> {
        let mut bus = MockBus::new();
        bus.set_register(SmiaRegisters::RevisionNumber.addr(), 0xA0);
        let mut cis = Cis::new(bus, MockDelay::new(), S5k2l4, CisConfig::default());
        cis.init().unwrap();
        assert_eq!(cis.retention_state(), RetentionState::Unsupported);
        cis.set_global_setting().unwrap();
        cis.mode_change(mode).unwrap();
        cis
    }

    #[test]
    fn ln2_rounds_coarse_to_four() {
        let mut cis = selected(0);
        assert_eq!(cis.data().lownoise.current, LowNoiseMode::Ln2);
        assert_eq!(cis.data().timing.max_coarse_integration_time(), 3144 - 48);

        cis.set_exposure_time(20_000, 20_000).unwrap();
        // 1886 lines before rounding
        assert_eq!(cis.data().cur_short_exposure_coarse, 1884);
    }

    #[test]
    fn ln4_applied_with_frame_duration() {
        let mut cis = selected(0);
        cis.set_lownoise_mode(LowNoiseMode::Ln4).unwrap();
        cis.transport_mut().ops.clear();
        cis.set_frame_duration(33_400).unwrap();

        assert_eq!(cis.transport().writes_to(LOWNOISE_CTRL), vec![0x0401]);
        // one hold around both the low noise change and the frame length
        assert_eq!(cis.transport().writes_to(0x0104), vec![1, 0]);
        assert_eq!(cis.data().lownoise.previous, LowNoiseMode::Ln4);
        assert_eq!(cis.data().timing.frame_length_lines(), 3150);
        assert_eq!(cis.data().timing.max_coarse_integration_time(), 3150 - 96);

        cis.set_exposure_time(20_000, 20_000).unwrap();
        assert_eq!(cis.data().cur_short_exposure_coarse, 1880);
    }

    #[test]
    fn lownoise_off_still_rounds_to_two() {
        let mut cis = selected(2);
        assert_eq!(cis.data().lownoise.current, LowNoiseMode::Off);
        cis.set_exposure_time(20_001, 20_001).unwrap();
        assert_eq!(cis.data().cur_short_exposure_coarse % 2, 0);
    }

    #[test]
    fn table_shifter_tracks_frame_length() {
        let mut cis = selected(0);
        cis.set_frame_duration(500_000).unwrap();
        assert_eq!(cis.transport().writes_to(0x0701), vec![2]);
        assert_eq!(cis.data().timing.frame_length_lines(), 11_792);

        cis.set_exposure_time(700_000, 700_000).unwrap();
        assert_eq!(cis.transport().writes_to(0x0702), vec![0x0303]);

        cis.set_exposure_time(33_000, 33_000).unwrap();
        // never below the frame length shifter
        assert_eq!(cis.transport().writes_to(0x0702).last(), Some(&0x0202));
    }

    #[test]
    fn binned_mode_uses_shorter_step() {
        let mut cis = selected(2);
        cis.set_frame_duration(100_000).unwrap();
        cis.set_exposure_time(200_000, 200_000).unwrap();
        assert_eq!(cis.transport().writes_to(0x0702).last(), Some(&0x0202));
    }

    #[test]
    fn long_term_exposure_uses_both_shifters() {
        let mut cis = selected(0);
        cis.transport_mut().ops.clear();
        assert_eq!(cis.set_long_term_exposure(true, 600_000).unwrap(), 125_000);
        assert_eq!(cis.transport().writes_to(HOST_PAGE), vec![0x4000]);
        assert_eq!(cis.transport().writes_to(0x0701), vec![2]);
        assert_eq!(cis.transport().writes_to(0x0702), vec![2]);
        assert!(cis.data().long_term_mode);

        cis.transport_mut().ops.clear();
        assert_eq!(cis.set_long_term_exposure(false, 33_000).unwrap(), 33_000);
        assert_eq!(cis.transport().writes_to(0x0701), vec![0]);
    }

    #[test]
    fn bright_scene_compensation_follows_ln_rounding() {
        let cis = selected(0);
        // LN2 rounds 9 lines down to 8
        assert_eq!(
            cis.compensate_gain_for_extremely_br(100, 2_000, 1_000),
            (2_000, 1_176)
        );
    }

    #[test]
    fn lownoise_rejected_where_unsupported() {
        let mut cis = selected(3);
        assert!(cis.set_lownoise_mode(LowNoiseMode::Ln2).is_err());
        assert!(cis.set_lownoise_mode(LowNoiseMode::Off).is_ok());
    }
}

/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Samsung S5K2L3: 12MP dual pixel sensor with retention SRAM
//! and low noise readout.

use super::{
    HOST_PAGE, HOST_PAGE_PROGRAM, INDIRECT_ADDR, INDIRECT_DATA,
    PAGE_SELECT, SRAM_PAGE_OPS, STREAM_OFF_OPS,
};
use crate::exposure::ShifterPolicy;
use crate::gain::GainLimits;
use crate::model::{
    CisDriver, CisLimits, CisRegisterMap, LongTermExposure, LowNoiseMode,
    RetentionTables, SensorMode, SensorModelConfig, SmiaRegisters,
};
use crate::program::{burst, delay_ms, w16, RegisterOp, RegisterProgram};
use crate::timing::PllInfo;

pub const MAX_WIDTH: u32 = 4032;
pub const MAX_HEIGHT: u32 = 3024;

const COARSE_INTEGRATION_TIME_MAX_MARGIN: u32 = 0x10;
/// Binned modes run at half the line count, so halve earlier
const BINNED_SHIFT_THRESHOLD_US: u32 = 85_000;
const SHIFT_THRESHOLD_US: u32 = 170_000;
/// Revisions from here on carry the low noise readout fix
const LOWNOISE_MIN_REVISION: u8 = 0xA5;
/// Low noise readout control
const LOWNOISE_CTRL: u16 = 0x0B30;
const PEDESTAL: u16 = 0x0BC0;

static REGISTERS: CisRegisterMap = CisRegisterMap {
    revision: SmiaRegisters::RevisionNumber.addr(),
    frame_count: SmiaRegisters::FrameCount.addr(),
    group_param_hold: SmiaRegisters::GroupParamHold.addr(),
    stream_on: RegisterProgram::new("stream_on", &[w16(0x0100, 0x0103)]),
    stream_off: RegisterProgram::new("stream_off", STREAM_OFF_OPS),
    coarse_integration_time: SmiaRegisters::CoarseIntegrationTime.addr(),
    long_coarse_integration_time: Some(0x0226),
    analog_gain: SmiaRegisters::AnalogGain.addr(),
    digital_gain: SmiaRegisters::DigitalGain.addr(),
    long_digital_gain: Some(0x0C80),
    frame_length_lines: SmiaRegisters::FrameLengthLines.addr(),
    cit_shifter: Some(0x0702),
    fll_shifter: Some(0x0701),
    wdr_enable: RegisterProgram::new(
        "wdr_on",
        &[w16(HOST_PAGE, 0x4000), w16(0x021E, 0x0100)],
    ),
    wdr_disable: RegisterProgram::new("wdr_off", &[w16(0x021E, 0x0000)]),
    window_prologue: RegisterProgram::new("window", SRAM_PAGE_OPS),
};

static LIMITS: CisLimits = CisLimits {
    max_width: MAX_WIDTH,
    max_height: MAX_HEIGHT,
    min_coarse_integration_time: 0x02,
    min_fine_integration_time: 0x0100,
    max_fine_integration_time: 0x0100,
    analog_gain: GainLimits::new(0x20, 0x200),
    digital_gain: GainLimits::new(0x100, 0x8000),
};

const RESET_TNP: &[RegisterOp] = &[
    w16(HOST_PAGE, 0x4000),
    w16(0x6010, 0x0001),
    delay_ms(3),
    w16(0x6214, 0x7971),
    w16(0x6218, 0x7150),
    w16(PAGE_SELECT, 0x2000),
    w16(INDIRECT_ADDR, 0x3F4C),
    burst(INDIRECT_DATA, 0x0000),
    burst(INDIRECT_DATA, 0x0000),
    burst(INDIRECT_DATA, 0x0548),
    burst(INDIRECT_DATA, 0x0448),
    burst(INDIRECT_DATA, 0x0649),
    burst(INDIRECT_DATA, 0x0749),
    burst(INDIRECT_DATA, 0x0D00),
    burst(INDIRECT_DATA, 0x0B01),
    w16(0x6028, 0x4000),
    w16(0x6214, 0x7970),
];

const GLOBAL_A: &[RegisterOp] = &[
    w16(HOST_PAGE, 0x4000),
    w16(PAGE_SELECT, 0x2000),
    w16(INDIRECT_ADDR, 0x16F0),
    burst(INDIRECT_DATA, 0x2929),
    burst(INDIRECT_DATA, 0x2929),
    burst(INDIRECT_DATA, 0x0000),
    w16(INDIRECT_ADDR, 0x1710),
    w16(INDIRECT_DATA, 0x0040),
    w16(0x0B04, 0x0101),
    w16(0x3094, 0x0000),
    w16(0x3096, 0x0480),
    w16(0xF412, 0x0000),
    w16(0x0FEA, 0x1440),
];

const GLOBAL_B: &[RegisterOp] = &[
    w16(HOST_PAGE, 0x4000),
    w16(PAGE_SELECT, 0x2000),
    w16(INDIRECT_ADDR, 0x16F0),
    burst(INDIRECT_DATA, 0x2929),
    burst(INDIRECT_DATA, 0x2929),
    burst(INDIRECT_DATA, 0x0100),
    w16(INDIRECT_ADDR, 0x1710),
    w16(INDIRECT_DATA, 0x0048),
    w16(0x0B04, 0x0101),
    w16(0x3094, 0x0000),
    w16(0x3096, 0x0480),
    w16(0xF412, 0x0000),
    w16(0xF42A, 0x0100),
    w16(0x0FEA, 0x1440),
];

const GLOBAL_RETENTION: &[RegisterOp] = &[
    w16(HOST_PAGE, 0x4000),
    w16(0x6010, 0x0001),
    delay_ms(3),
    w16(0x6214, 0x7971),
    w16(0x6218, 0x7150),
    w16(PAGE_SELECT, 0x2000),
    w16(INDIRECT_ADDR, 0x10B4),
    w16(INDIRECT_DATA, 0x0100),
    w16(INDIRECT_DATA, 0x0000),
];

const RETENTION_CANCEL: &[RegisterOp] = &[
    w16(INDIRECT_ADDR, 0x10B4),
    w16(INDIRECT_DATA, 0x0000),
    w16(INDIRECT_DATA, 0x0000),
];

const MODE_4032X3024_30: &[RegisterOp] = &[
    w16(PAGE_SELECT, 0x2000),
    w16(0x0300, 0x0002),
    w16(0x0302, 0x0001),
    w16(0x0304, 0x0006),
    w16(0x0306, 0x00F0),
    w16(0x0344, 0x0000),
    w16(0x0346, 0x0000),
    w16(0x0348, 0x0FBF),
    w16(0x034A, 0x0BCF),
    w16(0x034C, 0x0FC0),
    w16(0x034E, 0x0BD0),
    w16(0x0340, 0x0CBC),
    w16(0x0342, 0x2650),
    w16(0x0900, 0x0011),
    w16(0x0B30, 0x0100),
];

const MODE_4032X3024_24: &[RegisterOp] = &[
    w16(PAGE_SELECT, 0x2000),
    w16(0x0300, 0x0002),
    w16(0x0302, 0x0001),
    w16(0x0304, 0x0006),
    w16(0x0306, 0x00F0),
    w16(0x0344, 0x0000),
    w16(0x0346, 0x0000),
    w16(0x0348, 0x0FBF),
    w16(0x034A, 0x0BCF),
    w16(0x034C, 0x0FC0),
    w16(0x034E, 0x0BD0),
    w16(0x0340, 0x0FEB),
    w16(0x0342, 0x2650),
    w16(0x0900, 0x0011),
    w16(0x0B30, 0x0100),
];

const MODE_4032X2268_30: &[RegisterOp] = &[
    w16(PAGE_SELECT, 0x2000),
    w16(0x0300, 0x0002),
    w16(0x0302, 0x0001),
    w16(0x0304, 0x0006),
    w16(0x0306, 0x00F0),
    w16(0x0344, 0x0000),
    w16(0x0346, 0x017A),
    w16(0x0348, 0x0FBF),
    w16(0x034A, 0x0A55),
    w16(0x034C, 0x0FC0),
    w16(0x034E, 0x08DC),
    w16(0x0340, 0x0CBC),
    w16(0x0342, 0x2650),
    w16(0x0900, 0x0011),
    w16(0x0B30, 0x0100),
];

const MODE_4032X2268_60: &[RegisterOp] = &[
    w16(PAGE_SELECT, 0x2000),
    w16(0x0300, 0x0002),
    w16(0x0302, 0x0001),
    w16(0x0304, 0x0006),
    w16(0x0306, 0x00F0),
    w16(0x0344, 0x0000),
    w16(0x0346, 0x017A),
    w16(0x0348, 0x0FBF),
    w16(0x034A, 0x0A55),
    w16(0x034C, 0x0FC0),
    w16(0x034E, 0x08DC),
    w16(0x0340, 0x0980),
    w16(0x0342, 0x19B0),
    w16(0x0900, 0x0011),
    w16(0x0B30, 0x0100),
];

const MODE_2016X1512_30: &[RegisterOp] = &[
    w16(PAGE_SELECT, 0x2000),
    w16(0x0300, 0x0002),
    w16(0x0302, 0x0001),
    w16(0x0304, 0x0006),
    w16(0x0306, 0x00F0),
    w16(0x0344, 0x0000),
    w16(0x0346, 0x0000),
    w16(0x0348, 0x0FBF),
    w16(0x034A, 0x0BCF),
    w16(0x034C, 0x07E0),
    w16(0x034E, 0x05E8),
    w16(0x0340, 0x0CBC),
    w16(0x0342, 0x2650),
    w16(0x0900, 0x0122),
    w16(0x0382, 0x0003),
    w16(0x0386, 0x0003),
];

const MODE_2016X1134_240: &[RegisterOp] = &[
    w16(PAGE_SELECT, 0x2000),
    w16(0x0300, 0x0002),
    w16(0x0302, 0x0001),
    w16(0x0304, 0x0006),
    w16(0x0306, 0x00F0),
    w16(0x0344, 0x0000),
    w16(0x0346, 0x017A),
    w16(0x0348, 0x0FBF),
    w16(0x034A, 0x0A55),
    w16(0x034C, 0x07E0),
    w16(0x034E, 0x046E),
    w16(0x0340, 0x0478),
    w16(0x0342, 0x0DA8),
    w16(0x0900, 0x0122),
    w16(0x0382, 0x0003),
    w16(0x0386, 0x0003),
];

/// SRAM restore for a full size mode: point the sequencer at the stored copy
const fn load_sram(slot: u16) -> [RegisterOp; 5] {
    [
        w16(HOST_PAGE, 0x4000),
        w16(PAGE_SELECT, 0x2000),
        w16(INDIRECT_ADDR, 0x10B4),
        w16(INDIRECT_DATA, 0x0100),
        w16(INDIRECT_DATA, slot),
    ]
}

const LOAD_SRAM_0: [RegisterOp; 5] = load_sram(0x0000);
const LOAD_SRAM_1: [RegisterOp; 5] = load_sram(0x0001);
const LOAD_SRAM_2: [RegisterOp; 5] = load_sram(0x0002);

/// Store a mode into an SRAM slot
const fn store_sram(slot: u16) -> [RegisterOp; 6] {
    [
        w16(HOST_PAGE, 0x4000),
        w16(PAGE_SELECT, 0x2000),
        w16(INDIRECT_ADDR, 0x10B0),
        w16(INDIRECT_DATA, slot),
        w16(INDIRECT_DATA, 0x0001),
        delay_ms(1),
    ]
}

const RETENTION_0: [RegisterOp; 6] = store_sram(0x0000);
const RETENTION_1: [RegisterOp; 6] = store_sram(0x0001);
const RETENTION_2: [RegisterOp; 6] = store_sram(0x0002);

static RETENTION: RetentionTables = RetentionTables {
    global: RegisterProgram::new("global_retention", GLOBAL_RETENTION),
    prepare: &[
        RegisterProgram::new("retention_4032x3024_30", &RETENTION_0),
        RegisterProgram::new("retention_4032x3024_24", &RETENTION_1),
        RegisterProgram::new("retention_4032x2268_30", &RETENTION_2),
    ],
    cancel: RegisterProgram::new("retention_cancel", RETENTION_CANCEL),
    crc_check: 0x100E,
    crc_pass: 0x01,
    crc_enable: 0x010E,
    crc_enable_min_revision: 0xA3,
};

const fn pll(frame_length_lines: u32, line_length_pck: u32) -> PllInfo {
    PllInfo {
        ext_clk: 26_000_000,
        mipi_datarate: 1_443,
        pclk: 960_000_000,
        frame_length_lines,
        line_length_pck,
    }
}

static MODES: [SensorMode; 6] = [
    SensorMode {
        name: "4032x3024_30fps",
        width: 4032,
        height: 3024,
        pll: pll(3260, 9808),
        setfile: RegisterProgram::new("4032x3024_30fps", MODE_4032X3024_30),
        max_margin_coarse_integration_time: COARSE_INTEGRATION_TIME_MAX_MARGIN,
        shifter: ShifterPolicy::Halve { threshold_us: SHIFT_THRESHOLD_US },
        wdr: true,
        lownoise: true,
        paf_stat: true,
        load_sram: Some(RegisterProgram::new(
            "load_sram_4032x3024_30",
            &LOAD_SRAM_0,
        )),
    },
    SensorMode {
        name: "4032x3024_24fps",
        width: 4032,
        height: 3024,
        pll: pll(4075, 9808),
        setfile: RegisterProgram::new("4032x3024_24fps", MODE_4032X3024_24),
        max_margin_coarse_integration_time: COARSE_INTEGRATION_TIME_MAX_MARGIN,
        shifter: ShifterPolicy::Halve { threshold_us: SHIFT_THRESHOLD_US },
        wdr: true,
        lownoise: true,
        paf_stat: true,
        load_sram: Some(RegisterProgram::new(
            "load_sram_4032x3024_24",
            &LOAD_SRAM_1,
        )),
    },
    SensorMode {
        name: "4032x2268_30fps",
        width: 4032,
        height: 2268,
        pll: pll(3260, 9808),
        setfile: RegisterProgram::new("4032x2268_30fps", MODE_4032X2268_30),
        max_margin_coarse_integration_time: COARSE_INTEGRATION_TIME_MAX_MARGIN,
        shifter: ShifterPolicy::Halve { threshold_us: SHIFT_THRESHOLD_US },
        wdr: true,
        lownoise: true,
        paf_stat: true,
        load_sram: Some(RegisterProgram::new(
            "load_sram_4032x2268_30",
            &LOAD_SRAM_2,
        )),
    },
    SensorMode {
        name: "4032x2268_60fps",
        width: 4032,
        height: 2268,
        pll: pll(2432, 6576),
        setfile: RegisterProgram::new("4032x2268_60fps", MODE_4032X2268_60),
        max_margin_coarse_integration_time: 0x18,
        shifter: ShifterPolicy::Halve { threshold_us: SHIFT_THRESHOLD_US },
        wdr: false,
        lownoise: false,
        paf_stat: true,
        load_sram: None,
    },
    SensorMode {
        name: "2016x1512_30fps",
        width: 2016,
        height: 1512,
        pll: pll(3260, 9808),
        setfile: RegisterProgram::new("2016x1512_30fps", MODE_2016X1512_30),
        max_margin_coarse_integration_time: COARSE_INTEGRATION_TIME_MAX_MARGIN,
        shifter: ShifterPolicy::Halve {
            threshold_us: BINNED_SHIFT_THRESHOLD_US,
        },
        wdr: false,
        lownoise: false,
        paf_stat: true,
        load_sram: None,
    },
    SensorMode {
        name: "2016x1134_240fps",
        width: 2016,
        height: 1134,
        pll: pll(1144, 3496),
        setfile: RegisterProgram::new("2016x1134_240fps", MODE_2016X1134_240),
        max_margin_coarse_integration_time: COARSE_INTEGRATION_TIME_MAX_MARGIN,
        shifter: ShifterPolicy::Halve { threshold_us: SHIFT_THRESHOLD_US },
        wdr: false,
        lownoise: false,
        paf_stat: false,
        load_sram: None,
    },
];

static SETFILE_A: SensorModelConfig = SensorModelConfig {
    name: "2l3_setfile_A",
    reset_tnp: RegisterProgram::new("reset_tnp", RESET_TNP),
    global: RegisterProgram::new("global_A", GLOBAL_A),
    modes: &MODES,
    retention: Some(&RETENTION),
};

static SETFILE_B: SensorModelConfig = SensorModelConfig {
    name: "2l3_setfile_B",
    reset_tnp: RegisterProgram::new("reset_tnp", RESET_TNP),
    global: RegisterProgram::new("global_B", GLOBAL_B),
    modes: &MODES,
    retention: Some(&RETENTION),
};

const fn lownoise_ops(ctrl: u16) -> [RegisterOp; 4] {
    [
        w16(PAGE_SELECT, 0x2000),
        w16(INDIRECT_ADDR, 0xB65B),
        w16(INDIRECT_DATA, 0x0100),
        w16(LOWNOISE_CTRL, ctrl),
    ]
}

const LN_OFF: [RegisterOp; 4] = lownoise_ops(0x0100);
const LN_2: [RegisterOp; 4] = lownoise_ops(0x0200);
const LN_4: [RegisterOp; 4] = lownoise_ops(0x0300);
const LN_2_PEDESTAL: &[RegisterOp] =
    &[w16(LOWNOISE_CTRL, 0x0200), w16(PEDESTAL, 0x0080)];
const LN_4_PEDESTAL: &[RegisterOp] =
    &[w16(LOWNOISE_CTRL, 0x0300), w16(PEDESTAL, 0x0080)];

/// S5K2L3 driver
#[derive(Clone, Copy, Debug, Default)]
pub struct S5k2l3;

impl CisDriver for S5k2l3 {
    fn name(&self) -> &'static str {
        "2L3"
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
            0xA2..=0xA4 => Some(&SETFILE_A),
            0xA5 => Some(&SETFILE_B),
            // 0xA0 and 0xA1 engineering samples were never supported
            _ => None,
        }
    }

    fn lownoise_supported(&self, revision: u8, mode: &SensorMode) -> bool {
        revision >= LOWNOISE_MIN_REVISION && mode.lownoise
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
    use crate::cis::{Cis, CisConfig, CisState};
    use crate::error::SensorError;
    use crate::retention::{GlobalPath, RetentionState};
    use crate::test::{MockBus, MockDelay};

    fn sensor(revision: u16) -> Cis<MockBus, MockDelay, S5k2l3> {
        let mut bus = MockBus::new();
        bus.set_register(SmiaRegisters::RevisionNumber.addr(), revision);
        bus.set_register(SmiaRegisters::FrameCount.addr(), 0x01);
        Cis::new(bus, MockDelay::new(), S5k2l3, CisConfig::default())
    }

    #[test]
    fn revision_selects_setfile() {
        assert_eq!(S5k2l3.select_setfile(0xA2).map(|s| s.name), Some("2l3_setfile_A"));
        assert_eq!(S5k2l3.select_setfile(0xA4).map(|s| s.name), Some("2l3_setfile_A"));
        assert_eq!(S5k2l3.select_setfile(0xA5).map(|s| s.name), Some("2l3_setfile_B"));
        assert!(S5k2l3.select_setfile(0xA1).is_none());
        assert!(S5k2l3.select_setfile(0xB0).is_none());
    }

    #[test]
    fn engineering_sample_fails_closed() {
        let mut cis = sensor(0xA0);
        assert_eq!(cis.init(), Err(SensorError::UnsupportedRevision(0xA0)));
        assert_eq!(cis.state(), CisState::Probed);
        assert_eq!(cis.mode_change(0), Err(SensorError::InvalidState(CisState::Probed)));
    }

    #[test]
    fn full_size_mode_enters_ln2_on_newer_silicon() {
        let mut cis = sensor(0xA5);
        cis.init().unwrap();
        cis.set_global_setting().unwrap();
        cis.mode_change(0).unwrap();
        assert_eq!(cis.data().lownoise.current, LowNoiseMode::Ln2);
        assert_eq!(cis.data().lownoise.pending_frames, 3);
        assert_eq!(cis.transport().writes_to(LOWNOISE_CTRL).last(), Some(&0x0200));
    }

    #[test]
    fn older_silicon_keeps_lownoise_off() {
        let mut cis = sensor(0xA3);
        cis.init().unwrap();
        cis.mode_change(0).unwrap();
        assert_eq!(cis.data().lownoise.current, LowNoiseMode::Off);
        assert_eq!(cis.data().lownoise.pending_frames, 0);
    }

    #[test]
    fn second_global_setting_uses_retention() {
        let mut cis = sensor(0xA5);
        cis.init().unwrap();
        assert_eq!(cis.set_global_setting().unwrap(), GlobalPath::Full);
        assert_eq!(cis.retention_state(), RetentionState::Activated);

        cis.transport_mut().set_register(0x100E, 0x01);
        assert_eq!(cis.set_global_setting().unwrap(), GlobalPath::Retention);

        // SRAM restore replaces the full mode program
        cis.transport_mut().ops.clear();
        cis.mode_change(0).unwrap();
        assert!(cis.transport().writes_to(0x0342).is_empty());
        assert!(cis.data().need_cancel_retention);
    }

    #[test]
    fn pedestal_mode_invalidates_retention() {
        let mut cis = sensor(0xA5);
        cis.init().unwrap();
        cis.set_global_setting().unwrap();
        cis.mode_change(0).unwrap();
        cis.set_lownoise_mode(LowNoiseMode::Ln2Pedestal128).unwrap();
        cis.set_frame_duration(33_400).unwrap();
        assert_eq!(cis.retention_state(), RetentionState::Inactive);
        assert_eq!(cis.transport().writes_to(PEDESTAL), vec![0x0080]);
    }

    #[test]
    fn long_exposure_is_halved() {
        let mut cis = sensor(0xA3);
        cis.init().unwrap();
        cis.mode_change(0).unwrap();
        cis.set_frame_duration(400_000).unwrap();
        assert_eq!(cis.data().fll_shift.0, 1);
        assert_eq!(cis.transport().writes_to(0x0701), vec![1]);

        cis.set_exposure_time(340_000, 340_000).unwrap();
        assert_eq!(cis.transport().writes_to(0x0702), vec![0x0101]);
        let coarse = (170_000u64 * 960 - 0x100) / 9808;
        assert_eq!(cis.data().cur_short_exposure_coarse as u64, coarse);
    }

    #[test]
    fn binned_mode_halves_earlier() {
        let mut cis = sensor(0xA3);
        cis.init().unwrap();
        cis.mode_change(4).unwrap();
        cis.set_frame_duration(100_000).unwrap();
        cis.set_exposure_time(90_000, 90_000).unwrap();
        assert_eq!(cis.transport().writes_to(0x0702), vec![0x0101]);
    }

    #[test]
    fn long_term_exposure_shift() {
        let mut cis = sensor(0xA3);
        cis.init().unwrap();
        cis.mode_change(0).unwrap();
        assert_eq!(cis.set_long_term_exposure(true, 1_000_000).unwrap(), 125_000);
        assert_eq!(cis.transport().writes_to(0x0701), vec![3]);
        assert_eq!(cis.transport().writes_to(0x0702), vec![3]);
        assert_eq!(cis.transport().writes_to(HOST_PAGE).last(), Some(&0x4000));

        cis.transport_mut().ops.clear();
        cis.set_exposure_time(125_000, 125_000).unwrap();
        assert!(cis.transport().writes_to(0x0702).is_empty());

        assert_eq!(cis.set_long_term_exposure(false, 33_000).unwrap(), 33_000);
        assert_eq!(cis.transport().writes_to(0x0701), vec![0]);
        assert!(!cis.data().long_term_mode);
    }

    #[test]
    fn stream_off_arms_crc_check() {
        let mut cis = sensor(0xA3);
        cis.init().unwrap();
        cis.set_global_setting().unwrap();
        cis.mode_change(3).unwrap();
        cis.stream_on().unwrap();
        cis.transport_mut().script_reads(SmiaRegisters::FrameCount.addr(), &[0x08, 0xFF]);
        cis.stream_off().unwrap();
        assert_eq!(cis.transport().writes_to(0x010E), vec![0x01]);
        assert_eq!(cis.state(), CisState::StreamingOff { mode: 3 });
    }
}

/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Samsung S5K3M5: 13MP tele sensor, always run as dual sync slave.
//! No retention, low noise or shifter support.

use super::{PAGE_SELECT, STREAM_OFF_OPS};
use crate::exposure::ShifterPolicy;
use crate::gain::GainLimits;
use crate::model::{
    CisDriver, CisLimits, CisRegisterMap, SensorMode, SensorModelConfig,
    SmiaRegisters,
};
use crate::program::{delay_ms, w16, w8, RegisterOp, RegisterProgram};
use crate::timing::PllInfo;

pub const MAX_WIDTH: u32 = 4032;
pub const MAX_HEIGHT: u32 = 3024;

/// Fast AE mode, which skips the tele crop shift
pub const FAST_AE_MODE: usize = 3;

/// Crop number used when the module only records that it is shifted
pub const FIXED_CROP_SHIFT: u8 = 5;

/// Window offsets (x, y) per calibrated crop number
pub const CROP_SHIFT: [(i16, i16); 10] = [
    (0, -16),
    (-64, -48),
    (0, -48),
    (64, -48),
    (-64, -16),
    (0, -16),
    (64, -16),
    (-64, 48),
    (0, 48),
    (64, 48),
];

static REGISTERS: CisRegisterMap = CisRegisterMap {
    revision: SmiaRegisters::RevisionNumber.addr(),
    frame_count: SmiaRegisters::FrameCount.addr(),
    group_param_hold: SmiaRegisters::GroupParamHold.addr(),
    stream_on: RegisterProgram::new("stream_on", &[w16(0x0100, 0x0100)]),
    stream_off: RegisterProgram::new("stream_off", STREAM_OFF_OPS),
    coarse_integration_time: SmiaRegisters::CoarseIntegrationTime.addr(),
    long_coarse_integration_time: Some(0x0226),
    analog_gain: SmiaRegisters::AnalogGain.addr(),
    digital_gain: SmiaRegisters::DigitalGain.addr(),
    long_digital_gain: Some(0x0230),
    frame_length_lines: SmiaRegisters::FrameLengthLines.addr(),
    cit_shifter: None,
    fll_shifter: None,
    wdr_enable: RegisterProgram::new("wdr_on", &[w8(0x021E, 0x01)]),
    wdr_disable: RegisterProgram::new("wdr_off", &[w8(0x021E, 0x00)]),
    window_prologue: RegisterProgram::EMPTY,
};

static LIMITS: CisLimits = CisLimits {
    max_width: MAX_WIDTH,
    max_height: MAX_HEIGHT,
    min_coarse_integration_time: 0x04,
    min_fine_integration_time: 0x0100,
    max_fine_integration_time: 0x0100,
    analog_gain: GainLimits::new(0x20, 0x200),
    digital_gain: GainLimits::new(0x100, 0x1000),
};

const RESET_TNP: &[RegisterOp] = &[
    w16(0x6028, 0x4000),
    w16(0x0000, 0x0006),
    w16(0x0000, 0x30D5),
    w16(0x6214, 0x7971),
    w16(0x6218, 0x7150),
    delay_ms(3),
];

const GLOBAL: &[RegisterOp] = &[
    w16(PAGE_SELECT, 0x4000),
    w16(0x0B04, 0x0101),
    w16(0x3B02, 0x0400),
    w16(0x3B0A, 0x0002),
    w16(0xF44E, 0x0011),
    w16(0xF456, 0x000A),
    w16(0x0D00, 0x0100),
    w16(0x0D02, 0x0001),
    w16(0x0114, 0x0301),
];

const fn mode_ops(
    y_start: u16,
    y_end: u16,
    x_out: u16,
    y_out: u16,
    fll: u16,
    binning: u16,
) -> [RegisterOp; 13] {
    [
        // dual sync slave
        w16(0x0A70, 0x0001),
        w16(0x0A72, 0x0100),
        w16(0x0344, 0x0008),
        w16(0x0346, y_start),
        w16(0x0348, 0x0FC7),
        w16(0x034A, y_end),
        w16(0x034C, x_out),
        w16(0x034E, y_out),
        w16(0x0340, fll),
        w16(0x0342, 0x1400),
        w16(0x0900, binning),
        w16(0x0306, 0x008C),
        w16(0x0B0E, 0x0100),
    ]
}

const MODE_4032X3024_30: [RegisterOp; 13] =
    mode_ops(0x0008, 0x0BD7, 0x0FC0, 0x0BD0, 0x0E42, 0x0011);
const MODE_4032X2268_30: [RegisterOp; 13] =
    mode_ops(0x0182, 0x0A5D, 0x0FC0, 0x08DC, 0x0E42, 0x0011);
const MODE_1920X1080_60: [RegisterOp; 13] =
    mode_ops(0x0182, 0x0A5D, 0x0780, 0x0438, 0x0720, 0x0122);
const MODE_1344X756_120: [RegisterOp; 13] =
    mode_ops(0x0182, 0x0A5D, 0x0540, 0x02F4, 0x0390, 0x0133);

const fn pll(frame_length_lines: u32) -> PllInfo {
    PllInfo {
        ext_clk: 26_000_000,
        mipi_datarate: 1_460,
        pclk: 560_000_000,
        frame_length_lines,
        line_length_pck: 5120,
    }
}

static MODES: [SensorMode; 4] = [
    SensorMode {
        name: "4032x3024_30fps",
        width: 4032,
        height: 3024,
        pll: pll(3650),
        setfile: RegisterProgram::new("4032x3024_30fps", &MODE_4032X3024_30),
        max_margin_coarse_integration_time: 0x04,
        shifter: ShifterPolicy::None,
        wdr: true,
        lownoise: false,
        paf_stat: true,
        load_sram: None,
    },
    SensorMode {
        name: "4032x2268_30fps",
        width: 4032,
        height: 2268,
        pll: pll(3650),
        setfile: RegisterProgram::new("4032x2268_30fps", &MODE_4032X2268_30),
        max_margin_coarse_integration_time: 0x04,
        shifter: ShifterPolicy::None,
        wdr: true,
        lownoise: false,
        paf_stat: true,
        load_sram: None,
    },
    SensorMode {
        name: "1920x1080_60fps",
        width: 1920,
        height: 1080,
        pll: pll(1824),
        setfile: RegisterProgram::new("1920x1080_60fps", &MODE_1920X1080_60),
        max_margin_coarse_integration_time: 0x04,
        shifter: ShifterPolicy::None,
        wdr: false,
        lownoise: false,
        paf_stat: true,
        load_sram: None,
    },
    SensorMode {
        name: "1344x756_120fps",
        width: 1344,
        height: 756,
        pll: pll(912),
        setfile: RegisterProgram::new("1344x756_120fps", &MODE_1344X756_120),
        max_margin_coarse_integration_time: 0x04,
        shifter: ShifterPolicy::None,
        wdr: false,
        lownoise: false,
        paf_stat: false,
        load_sram: None,
    },
];

static SETFILE: SensorModelConfig = SensorModelConfig {
    name: "3m5_setfile",
    reset_tnp: RegisterProgram::new("reset_tnp", RESET_TNP),
    global: RegisterProgram::new("global", GLOBAL),
    modes: &MODES,
    retention: None,
};

/// Window offset for a calibrated crop number in `mode`.
/// `None` when the window stays centered.
pub fn crop_offset(mode: usize, crop_num: u8) -> Option<(i16, i16)> {
    if mode == FAST_AE_MODE || crop_num == 0 {
        return None;
    }
    CROP_SHIFT.get(crop_num as usize).copied()
}

/// S5K3M5 driver
#[derive(Clone, Copy, Debug, Default)]
pub struct S5k3m5;

impl CisDriver for S5k3m5 {
    fn name(&self) -> &'static str {
        "3M5"
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
            0xA0..=0xA1 => Some(&SETFILE),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cis::{Cis, CisConfig};
    use crate::error::SensorError;
    use crate::retention::GlobalPath;
    use crate::test::{MockBus, MockDelay};
    use crate::transport::Width;

    fn selected(mode: usize) -> Cis<MockBus, MockDelay, S5k3m5> {
        let mut bus = MockBus::new();
        bus.set_register(SmiaRegisters::RevisionNumber.addr(), 0xA1);
        let mut cis = Cis::new(bus, MockDelay::new(), S5k3m5, CisConfig::default());
        cis.init().unwrap();
        assert_eq!(cis.set_global_setting().unwrap(), GlobalPath::Full);
        cis.mode_change(mode).unwrap();
        cis
    }

    #[test]
    fn unknown_revision_is_rejected() {
        let mut bus = MockBus::new();
        bus.set_register(SmiaRegisters::RevisionNumber.addr(), 0xB0);
        let mut cis = Cis::new(bus, MockDelay::new(), S5k3m5, CisConfig::default());
        assert!(matches!(cis.init(), Err(SensorError::UnsupportedRevision(0xB0))));
        assert!(cis.setfile().is_none());
    }

    #[test]
    fn mode_timing_follows_pll() {
        let cis = selected(2);
        let timing = &cis.data().mode_timing;
        assert_eq!(timing.max_fps, 60);
        assert_eq!(cis.data().min_frame_us_time, 1824 * 5120 / 560);
        assert_eq!(cis.data().timing.max_coarse_integration_time(), 1824 - 4);
    }

    #[test]
    fn no_shifter_writes() {
        let mut cis = selected(0);
        cis.set_frame_duration(700_000).unwrap();
        cis.set_exposure_time(600_000, 600_000).unwrap();
        // frame length saturates at the register width
        assert_eq!(cis.transport().writes_to(0x0340).last(), Some(&0xFFFF));
        assert!(cis.transport().writes_to(0x0701).is_empty());
        assert!(cis.transport().writes_to(0x0702).is_empty());
        assert_eq!(cis.data().cur_short_exposure_coarse, 0xFFFF - 4);
    }

    #[test]
    fn wdr_writes_long_registers() {
        let mut cis = selected(0);
        cis.set_wdr(true).unwrap();
        cis.transport_mut().ops.clear();

        cis.set_exposure_time(20_000, 5_000).unwrap();
        cis.set_digital_gain(2_000, 1_000).unwrap();

        let bus = cis.transport();
        assert!(bus
            .ops
            .contains(&crate::test::BusOp::Write(0x021E, Width::Byte, 0x01)));
        // (20000 * 560 - 256) / 5120
        assert_eq!(bus.writes_to(0x0226), vec![2187]);
        assert_eq!(bus.writes_to(0x0202), vec![546]);
        assert_eq!(bus.writes_to(0x0230), vec![0x200]);
        assert_eq!(bus.writes_to(0x020E), vec![0x100]);
    }

    #[test]
    fn digital_gain_clamps_to_model_max() {
        let mut cis = selected(1);
        cis.set_digital_gain(64_000, 64_000).unwrap();
        assert_eq!(cis.data().cur_short_digital_gain_code, 0x1000);
        assert_eq!(cis.get_max_digital_gain(), 16_000);
    }

    #[test]
    fn crop_offsets() {
        assert_eq!(crop_offset(0, 0), None);
        assert_eq!(crop_offset(0, 1), Some((-64, -48)));
        assert_eq!(crop_offset(1, 9), Some((64, 48)));
        assert_eq!(crop_offset(FAST_AE_MODE, 3), None);
        assert_eq!(crop_offset(0, 10), None);
    }

    #[test]
    fn shift_past_the_array_is_rejected() {
        let mut cis = selected(0);
        cis.transport_mut().set_register(0x0346, 0x0008);
        cis.transport_mut().set_register(0x034A, 0x0BD7);
        cis.transport_mut().ops.clear();
        assert!(matches!(
            cis.shift_window(0, -48),
            Err(SensorError::InvalidArgument(_))
        ));
        assert!(!cis.transport().has_writes());
    }

    #[test]
    fn shifted_window_is_written_back() {
        let mut cis = selected(0);
        cis.transport_mut().set_register(0x0344, 0x0048);
        cis.transport_mut().set_register(0x0346, 0x0040);
        cis.transport_mut().set_register(0x0348, 0x0FC7);
        cis.transport_mut().set_register(0x034A, 0x0BD7);
        let (dx, dy) = crop_offset(0, 1).unwrap();
        cis.shift_window(dx, dy).unwrap();

        let bus = cis.transport();
        assert_eq!(bus.writes_to(0x0344).last(), Some(&(0x0048 - 64)));
        assert_eq!(bus.writes_to(0x0346).last(), Some(&(0x0040 - 48)));
        assert_eq!(bus.writes_to(0x0348).last(), Some(&(0x0FC7 - 64)));
        assert_eq!(bus.writes_to(0x034A).last(), Some(&(0x0BD7 - 48)));
    }
}

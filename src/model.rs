/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Per sensor model configuration and the driver capability trait.

use crate::exposure::{CoarseQuantum, ShifterPolicy};
use crate::gain::GainLimits;
use crate::program::RegisterProgram;
use crate::timing::PllInfo;
use crate::transport::Width;

/// Standard SMIA register addresses shared by the supported sensors
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SmiaRegisters {
    ModelId = 0x0000,
    RevisionNumber = 0x0002,
    FrameCount = 0x0005,
    ModeSelect = 0x0100,
    GroupParamHold = 0x0104,
    FineIntegrationTime = 0x0200,
    CoarseIntegrationTime = 0x0202,
    AnalogGain = 0x0204,
    DigitalGain = 0x020E,
    VtPixClkDiv = 0x0300,
    VtSysClkDiv = 0x0302,
    PrePllClkDiv = 0x0304,
    PllMultiplier = 0x0306,
    OpPixClkDiv = 0x0308,
    OpSysClkDiv = 0x030A,
    SecndPrePllClkDiv = 0x030C,
    FrameLengthLines = 0x0340,
    LineLengthPck = 0x0342,
    XAddrStart = 0x0344,
    YAddrStart = 0x0346,
    XAddrEnd = 0x0348,
    YAddrEnd = 0x034A,
    XOutputSize = 0x034C,
    YOutputSize = 0x034E,
    XEvenInc = 0x0380,
    XOddInc = 0x0382,
    YEvenInc = 0x0384,
    YOddInc = 0x0386,
    ScalingMode = 0x0400,
    DownScaleM = 0x0404,
}

impl SmiaRegisters {
    pub const fn addr(self) -> u16 {
        self as u16
    }
}

/// Registers dumped by `log_status`, in order
pub const SMIA_STATUS_REGISTERS: &[(&str, SmiaRegisters, Width)] = &[
    ("model_id", SmiaRegisters::ModelId, Width::Word),
    ("rev_number", SmiaRegisters::RevisionNumber, Width::Byte),
    ("frame_count", SmiaRegisters::FrameCount, Width::Byte),
    ("mode_select", SmiaRegisters::ModeSelect, Width::Byte),
    ("vt_pix_clk_div", SmiaRegisters::VtPixClkDiv, Width::Word),
    ("vt_sys_clk_div", SmiaRegisters::VtSysClkDiv, Width::Word),
    ("pre_pll_clk_div", SmiaRegisters::PrePllClkDiv, Width::Word),
    ("pll_multiplier", SmiaRegisters::PllMultiplier, Width::Word),
    ("op_pix_clk_div", SmiaRegisters::OpPixClkDiv, Width::Word),
    ("op_sys_clk_div", SmiaRegisters::OpSysClkDiv, Width::Word),
    ("secnd_pre_pll_clk_div", SmiaRegisters::SecndPrePllClkDiv, Width::Word),
    ("frame_length_lines", SmiaRegisters::FrameLengthLines, Width::Word),
    ("line_length_pck", SmiaRegisters::LineLengthPck, Width::Word),
    (
        "coarse_integration_time",
        SmiaRegisters::CoarseIntegrationTime,
        Width::Word,
    ),
    ("analog_gain", SmiaRegisters::AnalogGain, Width::Word),
    ("digital_gain", SmiaRegisters::DigitalGain, Width::Word),
];

/// Low noise readout mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LowNoiseMode {
    #[default]
    Off,
    Ln2,
    Ln4,
    Ln2Pedestal128,
    Ln4Pedestal128,
}

impl LowNoiseMode {
    /// Pedestal modes rewrite analog settings that retention SRAM restores
    pub fn invalidates_retention(self) -> bool {
        matches!(
            self,
            LowNoiseMode::Ln2Pedestal128 | LowNoiseMode::Ln4Pedestal128
        )
    }
}

/// Sensor specific register addresses and fixed sequences
#[derive(Debug)]
pub struct CisRegisterMap {
    pub revision: u16,
    pub frame_count: u16,
    pub group_param_hold: u16,
    pub stream_on: RegisterProgram,
    pub stream_off: RegisterProgram,
    pub coarse_integration_time: u16,
    pub long_coarse_integration_time: Option<u16>,
    pub analog_gain: u16,
    pub digital_gain: u16,
    pub long_digital_gain: Option<u16>,
    pub frame_length_lines: u16,
    /// 16-bit integration time shifter, both bytes carry the shift
    pub cit_shifter: Option<u16>,
    /// 8-bit frame length shifter
    pub fll_shifter: Option<u16>,
    pub wdr_enable: RegisterProgram,
    pub wdr_disable: RegisterProgram,
    /// Written before the crop window registers
    pub window_prologue: RegisterProgram,
}

/// Fixed limits of a sensor model
#[derive(Debug)]
pub struct CisLimits {
    pub max_width: u32,
    pub max_height: u32,
    pub min_coarse_integration_time: u32,
    pub min_fine_integration_time: u32,
    pub max_fine_integration_time: u32,
    pub analog_gain: GainLimits,
    pub digital_gain: GainLimits,
}

/// One entry of a setfile table
#[derive(Debug)]
pub struct SensorMode {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub pll: PllInfo,
    pub setfile: RegisterProgram,
    pub max_margin_coarse_integration_time: u32,
    pub shifter: ShifterPolicy,
    /// Mode supports long/short dual exposure
    pub wdr: bool,
    /// Mode is eligible for low noise readout
    pub lownoise: bool,
    pub paf_stat: bool,
    /// Fast restore from retention SRAM, used instead of `setfile`
    /// once retention is active
    pub load_sram: Option<RegisterProgram>,
}

/// Retention SRAM programs and check registers
#[derive(Debug)]
pub struct RetentionTables {
    /// Short global setting applied when SRAM content is intact
    pub global: RegisterProgram,
    /// Writes every mode's restore data into SRAM
    pub prepare: &'static [RegisterProgram],
    /// Returns the sensor to normal register addressing after an SRAM load
    pub cancel: RegisterProgram,
    pub crc_check: u16,
    pub crc_pass: u8,
    /// Arms the CRC check at stream off
    pub crc_enable: u16,
    pub crc_enable_min_revision: u8,
}

/// Everything selected by the sensor revision
#[derive(Debug)]
pub struct SensorModelConfig {
    pub name: &'static str,
    pub reset_tnp: RegisterProgram,
    pub global: RegisterProgram,
    pub modes: &'static [SensorMode],
    pub retention: Option<&'static RetentionTables>,
}

/// Multi-frame long exposure support
#[derive(Clone, Copy, Debug)]
pub struct LongTermExposure {
    /// Exposure a single frame is capped at
    pub base_us: u32,
    /// Written before the shifter registers
    pub prologue: RegisterProgram,
}

/// Capabilities of one sensor model
pub trait CisDriver {
    fn name(&self) -> &'static str;

    fn registers(&self) -> &'static CisRegisterMap;

    fn limits(&self) -> &'static CisLimits;

    /// Setfile table for a revision, `None` if the revision is unknown
    fn select_setfile(
        &self,
        revision: u8,
    ) -> Option<&'static SensorModelConfig>;

    fn lownoise_supported(&self, _revision: u8, _mode: &SensorMode) -> bool {
        false
    }

    fn lownoise_program(
        &self,
        _lownoise: LowNoiseMode,
        _mode: &SensorMode,
    ) -> RegisterProgram {
        RegisterProgram::EMPTY
    }

    fn coarse_quantum(&self, _lownoise: LowNoiseMode) -> CoarseQuantum {
        CoarseQuantum::NONE
    }

    /// Coarse integration margin imposed by a low noise mode, if it
    /// overrides the mode's own margin
    fn lownoise_margin(&self, _lownoise: LowNoiseMode) -> Option<u32> {
        None
    }

    fn long_term_exposure(&self) -> Option<LongTermExposure> {
        None
    }
}

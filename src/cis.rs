/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Sensor lifecycle and per-frame exposure control.
//!
//! A [`Cis`] moves through `Probed -> Initialized -> ModeSelected ->
//! StreamingOn -> StreamingOff -> ModeSelected ...`. Every operation takes
//! `&mut self`, so a register sequence (hold, writes, release) can never
//! interleave with another one for the same sensor.

use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};

#[cfg(feature = "rttdebug")]
use panic_rtt_core::rprintln;

use crate::error::SensorError;
use crate::exposure::{self, Shift};
use crate::gain;
use crate::hold::{HoldEffect, RegisterBus};
use crate::model::{
    CisDriver, LowNoiseMode, SensorMode, SensorModelConfig, SmiaRegisters,
    SMIA_STATUS_REGISTERS,
};
use crate::retention::{GlobalPath, RetentionManager, RetentionState};
use crate::timing::{self, CisTimingParameters, ModeTiming};
use crate::transport::RegisterTransport;

/// Frame counter value while the sensor is not streaming
pub const FRAME_COUNT_STREAM_OFF: u8 = 0xFF;

/// Frames until a low noise transition shows up in the pixel data
pub const LOWNOISE_PENDING_FRAMES: u32 = 3;

/// Sensor lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CisState {
    Probed,
    Initialized,
    ModeSelected { mode: usize },
    StreamingOn { mode: usize },
    StreamingOff { mode: usize },
}

impl CisState {
    /// Index of the selected mode, if any
    pub fn mode(self) -> Option<usize> {
        match self {
            CisState::ModeSelected { mode }
            | CisState::StreamingOn { mode }
            | CisState::StreamingOff { mode } => Some(mode),
            CisState::Probed | CisState::Initialized => None,
        }
    }

    pub fn is_streaming(self) -> bool {
        matches!(self, CisState::StreamingOn { .. })
    }
}

/// Driver tuning that does not depend on the sensor model
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CisConfig {
    /// Wait between frame counter polls after stream on
    pub stream_on_wait_us: u32,
    /// Wait between frame counter polls after stream off
    pub stream_off_wait_us: u32,
    /// Frame counter polls before a stream transition times out
    pub poll_limit: u32,
    /// Sensor is frame synchronized with a second sensor
    pub dual_sync: bool,
    /// Frames longer than this stretch the poll limit
    pub long_frame_us: u32,
    /// Settle time for a companion preprocessor before stream on
    pub companion_delay_ms: u32,
    /// Stream off waits this long per pending low noise frame
    pub lownoise_settle_ms: u32,
}

impl Default for CisConfig {
    fn default() -> Self {
        Self {
            stream_on_wait_us: 500,
            stream_off_wait_us: 500,
            poll_limit: 250,
            dual_sync: false,
            long_frame_us: 300_000,
            companion_delay_ms: 0,
            lownoise_settle_ms: 100,
        }
    }
}

/// Requested and applied low noise mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LowNoiseState {
    pub previous: LowNoiseMode,
    pub current: LowNoiseMode,
    /// Frames left before the last transition is visible
    pub pending_frames: u32,
}

/// Last auto exposure request, replayed by [`Cis::recover_stream_on`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AeRequest {
    pub frame_duration_us: Option<u32>,
    /// (long, short) in microseconds
    pub exposure_us: Option<(u32, u32)>,
    /// (long, short) in permille
    pub analog_gain: Option<(u32, u32)>,
    /// (long, short) in permille
    pub digital_gain: Option<(u32, u32)>,
}

/// Everything the driver knows about the sensor's current configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CisData {
    pub revision: Option<u8>,
    pub width: u32,
    pub height: u32,
    pub timing: CisTimingParameters,
    pub mode_timing: ModeTiming,
    pub min_frame_us_time: u32,
    pub cur_frame_us_time: u32,
    pub fll_shift: Shift,
    pub cur_long_exposure_coarse: u32,
    pub cur_short_exposure_coarse: u32,
    pub cur_analog_gain_code: u32,
    pub cur_long_digital_gain_code: u32,
    pub cur_short_digital_gain_code: u32,
    /// Dual exposure requested by the pipeline
    pub wdr: bool,
    pub paf_stat_enable: bool,
    pub lownoise: LowNoiseState,
    pub long_term_mode: bool,
    /// Sensor was loaded from retention SRAM and must leave that
    /// addressing mode before the next full setfile
    pub need_cancel_retention: bool,
    pub last_ae: AeRequest,
}

/// Main driver struct
pub struct Cis<T, D, M>
where
    T: RegisterTransport,
{
    bus: RegisterBus<T>,
    delay: D,
    model: M,
    config: CisConfig,
    setfile: Option<&'static SensorModelConfig>,
    retention: RetentionManager,
    state: CisState,
    data: CisData,
}

impl<T, D, M> Cis<T, D, M>
where
    T: RegisterTransport,
    D: DelayNs,
    M: CisDriver,
{
    pub fn new(transport: T, delay: D, model: M, config: CisConfig) -> Self {
        let hold_register = model.registers().group_param_hold;
        Self {
            bus: RegisterBus::new(transport, hold_register),
            delay,
            model,
            config,
            setfile: None,
            retention: RetentionManager::new(None),
            state: CisState::Probed,
            data: CisData::default(),
        }
    }

    pub fn state(&self) -> CisState {
        self.state
    }

    pub fn data(&self) -> &CisData {
        &self.data
    }

    pub fn config(&self) -> &CisConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Setfile table selected by the revision check
    pub fn setfile(&self) -> Option<&'static SensorModelConfig> {
        self.setfile
    }

    pub fn retention_state(&self) -> RetentionState {
        self.retention.state()
    }

    pub fn transport(&self) -> &T {
        self.bus.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.bus.transport_mut()
    }

    /// Give back the bus and delay
    pub fn release(self) -> (T, D) {
        (self.bus.into_inner(), self.delay)
    }

    /// Read the revision and select the matching setfile table
    pub fn check_rev(&mut self) -> Result<u8, SensorError<T::Error>> {
        let rev = self.bus.read_u8(self.model.registers().revision)?;
        info!("{}: revision {:#04x}", self.model.name(), rev);
        self.select_revision(rev)?;
        Ok(rev)
    }

    fn select_revision(
        &mut self,
        rev: u8,
    ) -> Result<(), SensorError<T::Error>> {
        self.data.revision = Some(rev);
        let setfile = self.model.select_setfile(rev).ok_or_else(|| {
            error!(
                "{}: no setfile for revision {:#04x}",
                self.model.name(),
                rev
            );
            SensorError::UnsupportedRevision(rev)
        })?;
        info!("{}: using {}", self.model.name(), setfile.name);
        self.setfile = Some(setfile);
        self.retention = RetentionManager::new(setfile.retention);
        Ok(())
    }

    fn ensure_stopped(&self) -> Result<(), SensorError<T::Error>> {
        if self.state.is_streaming() {
            return Err(SensorError::InvalidState(self.state));
        }
        Ok(())
    }

    fn selected_setfile(
        &self,
    ) -> Result<&'static SensorModelConfig, SensorError<T::Error>> {
        self.setfile.ok_or(SensorError::InvalidState(self.state))
    }

    fn active_mode(
        &self,
    ) -> Result<&'static SensorMode, SensorError<T::Error>> {
        let mode = self
            .state
            .mode()
            .ok_or(SensorError::InvalidState(self.state))?;
        let setfile = self.selected_setfile()?;
        setfile.modes.get(mode).ok_or(SensorError::InvalidMode {
            mode,
            available: setfile.modes.len(),
        })
    }

    /// Reset driver state and check the sensor revision
    pub fn init(&mut self) -> Result<(), SensorError<T::Error>> {
        #[cfg(feature = "rttdebug")]
        rprintln!("cis init start");

        self.ensure_stopped()?;
        self.data = CisData::default();
        self.setfile = None;
        self.state = CisState::Probed;
        self.check_rev()?;
        self.state = CisState::Initialized;

        #[cfg(feature = "rttdebug")]
        rprintln!("cis init done");
        Ok(())
    }

    /// Like `init`, but use a known revision instead of reading one
    pub fn init_with_revision(
        &mut self,
        rev: u8,
    ) -> Result<(), SensorError<T::Error>> {
        self.ensure_stopped()?;
        self.data = CisData::default();
        self.setfile = None;
        self.state = CisState::Probed;
        warn!(
            "{}: revision check skipped, assuming {:#04x}",
            self.model.name(),
            rev
        );
        self.select_revision(rev)?;
        self.state = CisState::Initialized;
        Ok(())
    }

    /// Apply the sensor's global setting, through retention SRAM if it is valid
    pub fn set_global_setting(
        &mut self,
    ) -> Result<GlobalPath, SensorError<T::Error>> {
        let setfile = self.selected_setfile()?;
        self.ensure_stopped()?;

        #[cfg(feature = "rttdebug")]
        rprintln!("cis global setting start");

        let path = self
            .retention
            .apply_global(&mut self.bus, &mut self.delay, setfile)?;
        info!("{}: global setting done ({:?})", setfile.name, path);

        #[cfg(feature = "rttdebug")]
        rprintln!("cis global setting done");
        Ok(path)
    }

    /// Switch to another entry of the setfile table.
    /// A streaming sensor is stopped first. If the new program is only
    /// partially applied the previous mode stays selected.
    pub fn mode_change(
        &mut self,
        mode: usize,
    ) -> Result<(), SensorError<T::Error>> {
        let setfile = self.selected_setfile()?;
        let sensor_mode =
            setfile.modes.get(mode).ok_or(SensorError::InvalidMode {
                mode,
                available: setfile.modes.len(),
            })?;
        info!(
            "{}: mode change to {} ({})",
            self.model.name(),
            mode,
            sensor_mode.name
        );

        if let CisState::StreamingOn { mode: prev } = self.state {
            info!("stream on during mode change, forcing stream off");
            self.wait_streamon()?;
            self.stream_off()?;
            self.state = CisState::ModeSelected { mode: prev };
        } else if self.data.need_cancel_retention {
            if let Some(tables) = setfile.retention {
                tables.cancel.execute(&mut self.bus, &mut self.delay)?;
            }
            self.data.need_cancel_retention = false;
        }

        self.data.lownoise.pending_frames = 0;

        let from_sram = self.retention.is_activated();
        let program = match sensor_mode.load_sram {
            Some(load) if from_sram => load,
            _ => sensor_mode.setfile,
        };
        if let Err(failure) = program.execute(&mut self.bus, &mut self.delay) {
            error!(
                "{}: {} partially applied, {} writes failed",
                self.model.name(),
                failure.program,
                failure.failed
            );
            return Err(failure.into());
        }
        if from_sram && sensor_mode.load_sram.is_some() {
            self.data.need_cancel_retention = true;
        }

        self.apply_mode_timing(sensor_mode);
        self.data.paf_stat_enable = sensor_mode.paf_stat;
        self.state = CisState::ModeSelected { mode };

        let revision = self.data.revision.unwrap_or_default();
        if self.model.lownoise_supported(revision, sensor_mode) {
            self.data.lownoise.previous = LowNoiseMode::Ln2;
            self.data.lownoise.current = LowNoiseMode::Ln2;
            self.lownoise_change(sensor_mode)?;
        } else {
            self.data.lownoise.previous = LowNoiseMode::Off;
            self.data.lownoise.current = LowNoiseMode::Off;
        }
        Ok(())
    }

    fn apply_mode_timing(&mut self, mode: &SensorMode) {
        let limits = self.model.limits();
        self.data.width = mode.width;
        self.data.height = mode.height;
        self.data.timing = CisTimingParameters::new(
            &mode.pll,
            limits.min_coarse_integration_time,
            limits.min_fine_integration_time,
            limits.max_fine_integration_time,
            mode.max_margin_coarse_integration_time,
        );
        self.data.mode_timing = timing::calculate(&mode.pll, mode.height);
        self.data.min_frame_us_time = self.data.mode_timing.min_frame_us_time;
        self.data.cur_frame_us_time = self.data.mode_timing.min_frame_us_time;
        self.data.fll_shift = Shift(0);
        debug!(
            "{}x{} pclk {} fll {} llp {} min_frame {} us max_fps {}",
            mode.width,
            mode.height,
            mode.pll.pclk,
            mode.pll.frame_length_lines,
            mode.pll.line_length_pck,
            self.data.min_frame_us_time,
            self.data.mode_timing.max_fps
        );
    }

    /// Run `f` with group parameter hold set, clearing it afterwards
    /// unless it was already set on entry
    fn with_hold<R, F>(&mut self, f: F) -> Result<R, SensorError<T::Error>>
    where
        F: FnOnce(&mut Self) -> Result<R, SensorError<T::Error>>,
    {
        let effect = self.bus.group_param_hold(true)?;
        let res = f(self);
        if effect == HoldEffect::Applied {
            if let Err(err) = self.bus.group_param_hold(false) {
                error!("group_param_hold release failed: {:?}", err);
                if res.is_ok() {
                    return Err(err.into());
                }
            }
        }
        res
    }

    /// Program the current low noise mode
    fn lownoise_change(
        &mut self,
        mode: &SensorMode,
    ) -> Result<(), SensorError<T::Error>> {
        let frame_count_reg = self.model.registers().frame_count;
        self.with_hold(|cis| {
            let frame_count = cis.bus.read_u8(frame_count_reg)?;
            let lownoise = cis.data.lownoise;
            info!(
                "lownoise {:?} -> {:?} at frame {}",
                lownoise.previous, lownoise.current, frame_count
            );
            cis.data.lownoise.pending_frames = LOWNOISE_PENDING_FRAMES;
            cis.model
                .lownoise_program(lownoise.current, mode)
                .execute(&mut cis.bus, &mut cis.delay)?;
            if lownoise.current.invalidates_retention() {
                cis.retention.invalidate();
            }
            if let Some(margin) = cis.model.lownoise_margin(lownoise.current) {
                cis.data.timing.set_max_margin_coarse_integration_time(margin);
            }
            cis.data.lownoise.previous = lownoise.current;
            Ok(())
        })
    }

    /// Request a low noise mode; it is applied with the next frame duration
    pub fn set_lownoise_mode(
        &mut self,
        lownoise: LowNoiseMode,
    ) -> Result<(), SensorError<T::Error>> {
        let mode = self.active_mode()?;
        let revision = self.data.revision.unwrap_or_default();
        if lownoise != LowNoiseMode::Off
            && !self.model.lownoise_supported(revision, mode)
        {
            return Err(SensorError::InvalidArgument(
                "low noise not supported in this mode",
            ));
        }
        self.data.lownoise.current = lownoise;
        Ok(())
    }

    /// Request dual exposure for the current mode
    pub fn set_wdr(
        &mut self,
        enable: bool,
    ) -> Result<(), SensorError<T::Error>> {
        let mode = self.active_mode()?;
        if enable && !mode.wdr {
            return Err(SensorError::InvalidArgument("mode has no WDR support"));
        }
        self.data.wdr = enable;
        Ok(())
    }

    fn wdr_active(&self, mode: &SensorMode) -> bool {
        self.data.wdr && mode.wdr
    }

    pub fn group_param_hold(
        &mut self,
        hold: bool,
    ) -> Result<HoldEffect, SensorError<T::Error>> {
        Ok(self.bus.group_param_hold(hold)?)
    }

    /// Start streaming and wait for the first frame
    pub fn stream_on(&mut self) -> Result<(), SensorError<T::Error>> {
        let mode = match self.state {
            CisState::ModeSelected { mode }
            | CisState::StreamingOff { mode } => mode,
            other => return Err(SensorError::InvalidState(other)),
        };
        let regs = self.model.registers();

        #[cfg(feature = "rttdebug")]
        rprintln!("cis stream on start");
        info!("{}: stream on", self.model.name());

        {
            let mut held = self.bus.hold()?;
            if self.config.companion_delay_ms > 0 {
                self.delay.delay_ms(self.config.companion_delay_ms);
            }
            regs.stream_on.execute(&mut *held, &mut self.delay)?;
            held.release()?;
        }

        self.data.need_cancel_retention = false;
        self.state = CisState::StreamingOn { mode };
        self.wait_streamon()?;

        #[cfg(feature = "rttdebug")]
        rprintln!("cis stream on done");
        Ok(())
    }

    /// Reprogram the sensor from scratch after a failed stream on and
    /// replay the last auto exposure request.
    /// Retention SRAM is not trusted, so the full global setting runs.
    pub fn recover_stream_on(&mut self) -> Result<(), SensorError<T::Error>> {
        let mode = self
            .state
            .mode()
            .ok_or(SensorError::InvalidState(self.state))?;
        let ae = self.data.last_ae;
        info!("{}: recover stream on, mode {}", self.model.name(), mode);

        self.retention.invalidate();
        self.data.need_cancel_retention = false;
        self.state = CisState::ModeSelected { mode };
        self.set_global_setting()?;
        self.mode_change(mode)?;

        if let Some(duration) = ae.frame_duration_us {
            self.set_frame_duration(duration)?;
        }
        if let Some((long, short)) = ae.analog_gain {
            self.set_analog_gain(long, short)?;
        }
        if let Some((long, short)) = ae.digital_gain {
            self.set_digital_gain(long, short)?;
        }
        if let Some((long, short)) = ae.exposure_us {
            self.set_exposure_time(long, short)?;
        }
        self.stream_on()?;
        info!("{}: recover stream on done", self.model.name());
        Ok(())
    }

    /// Stop streaming and wait until the frame counter reports stream off
    pub fn stream_off(&mut self) -> Result<(), SensorError<T::Error>> {
        let mode = match self.state {
            CisState::StreamingOn { mode } => mode,
            other => return Err(SensorError::InvalidState(other)),
        };
        let regs = self.model.registers();

        self.bus.group_param_hold(false)?;

        let pending = self.data.lownoise.pending_frames;
        if pending > 0 {
            let settle_ms = self.config.lownoise_settle_ms * pending;
            info!("waiting {} ms for low noise transition", settle_ms);
            self.delay.delay_ms(settle_ms);
            self.data.lownoise.pending_frames = 0;
        }

        let tables = self.setfile.and_then(|setfile| setfile.retention);
        if let (Some(tables), Some(rev)) = (tables, self.data.revision) {
            if self.retention.state() != RetentionState::Unsupported
                && rev >= tables.crc_enable_min_revision
            {
                self.bus.write_u8(tables.crc_enable, 0x01)?;
            }
        }

        let frame_count = self.bus.read_u8(regs.frame_count)?;
        info!("{}: stream off at frame {}", self.model.name(), frame_count);
        regs.stream_off.execute(&mut self.bus, &mut self.delay)?;
        self.state = CisState::StreamingOff { mode };
        self.wait_streamoff()
    }

    fn poll_limit(&self) -> u32 {
        let mut limit = self.config.poll_limit;
        if self.config.dual_sync {
            limit = limit.saturating_mul(2);
        }
        let long_frame = self.config.long_frame_us;
        if long_frame > 0 && self.data.cur_frame_us_time > long_frame {
            let stretch = self.data.cur_frame_us_time / long_frame + 1;
            limit = limit.saturating_mul(stretch);
        }
        limit
    }

    fn poll_frame_count(
        &mut self,
        want_off: bool,
        wait_us: u32,
    ) -> Result<(), SensorError<T::Error>> {
        let addr = self.model.registers().frame_count;
        let limit = self.poll_limit();
        let mut polls = 0;
        loop {
            let frame_count = self.bus.read_u8(addr)?;
            if (frame_count == FRAME_COUNT_STREAM_OFF) == want_off {
                debug!("frame count {} after {} polls", frame_count, polls);
                return Ok(());
            }
            self.delay.delay_us(wait_us);
            polls += 1;
            if polls >= limit {
                warn!(
                    "{}: stream {} timed out after {} polls",
                    self.model.name(),
                    if want_off { "off" } else { "on" },
                    polls
                );
                return Err(SensorError::StreamTransitionTimeout { polls });
            }
        }
    }

    /// Wait until the frame counter leaves the stream off value
    pub fn wait_streamon(&mut self) -> Result<(), SensorError<T::Error>> {
        self.poll_frame_count(false, self.config.stream_on_wait_us)
    }

    /// Wait until the frame counter reads the stream off value
    pub fn wait_streamoff(&mut self) -> Result<(), SensorError<T::Error>> {
        self.poll_frame_count(true, self.config.stream_off_wait_us)
    }

    /// Program the crop window, with sub-sampling when `binning` is set
    pub fn set_size(
        &mut self,
        width: u32,
        height: u32,
        binning: bool,
    ) -> Result<(), SensorError<T::Error>> {
        self.selected_setfile()?;
        self.ensure_stopped()?;
        if width == 0 || height == 0 {
            return Err(SensorError::InvalidArgument(
                "window size must be non-zero",
            ));
        }

        let limits = self.model.limits();
        if width > limits.max_width || height > limits.max_height {
            error!("{}x{} exceeds the pixel array", width, height);
            return Err(SensorError::SizeOverflow);
        }
        let (ratio_w, ratio_h) = if binning {
            (limits.max_width / width, limits.max_height / height)
        } else {
            (1, 1)
        };
        let span_w = width * ratio_w;
        let span_h = height * ratio_h;

        let start_x = ((limits.max_width - span_w) / 2) & !1;
        let start_y = ((limits.max_height - span_h) / 2) & !1;
        let end_x = start_x + span_w - 1;
        let end_y = start_y + span_h - 1;
        if end_x & 1 == 0 || end_y & 1 == 0 {
            return Err(SensorError::InvalidArgument(
                "window end address must be odd",
            ));
        }

        let regs = self.model.registers();
        regs.window_prologue.execute(&mut self.bus, &mut self.delay)?;
        let window = [
            (SmiaRegisters::XAddrStart, start_x),
            (SmiaRegisters::YAddrStart, start_y),
            (SmiaRegisters::XAddrEnd, end_x),
            (SmiaRegisters::YAddrEnd, end_y),
            (SmiaRegisters::XOutputSize, width),
            (SmiaRegisters::YOutputSize, height),
        ];
        for (reg, value) in window {
            self.bus.write_u16(reg.addr(), value as u16)?;
        }

        if binning {
            // odd increment skips the binned neighbours
            let sampling = [
                (SmiaRegisters::XEvenInc, 1),
                (SmiaRegisters::XOddInc, ratio_w * 2 - 1),
                (SmiaRegisters::YEvenInc, 1),
                (SmiaRegisters::YOddInc, ratio_h * 2 - 1),
                (SmiaRegisters::ScalingMode, 0x0000),
                (SmiaRegisters::DownScaleM, 0x0010),
            ];
            for (reg, value) in sampling {
                self.bus.write_u16(reg.addr(), value as u16)?;
            }
        } else {
            debug!("window is crop only");
        }

        self.data.width = width;
        self.data.height = height;
        let line_ns = self.data.mode_timing.line_readout_time_ns;
        let timing = &mut self.data.mode_timing;
        timing.frame_time_us = (line_ns * height as u64 / 1000) as u32;
        timing.rolling_shutter_skew_ns = (height as u64 - 1) * line_ns;
        Ok(())
    }

    /// Move the programmed window by a calibrated offset
    pub fn shift_window(
        &mut self,
        dx: i16,
        dy: i16,
    ) -> Result<(), SensorError<T::Error>> {
        self.active_mode()?;
        let limits = self.model.limits();
        let edges = [
            (SmiaRegisters::XAddrStart, dx, limits.max_width),
            (SmiaRegisters::YAddrStart, dy, limits.max_height),
            (SmiaRegisters::XAddrEnd, dx, limits.max_width),
            (SmiaRegisters::YAddrEnd, dy, limits.max_height),
        ];
        let mut shifted = [0u16; 4];
        for (slot, (reg, offset, max)) in shifted.iter_mut().zip(edges) {
            let value = self.bus.read_u16(reg.addr())? as i32 + offset as i32;
            if value < 0 || value >= max as i32 {
                error!("{:?} shifted to {} outside the array", reg, value);
                return Err(SensorError::InvalidArgument(
                    "shifted window leaves the pixel array",
                ));
            }
            *slot = value as u16;
        }

        self.with_hold(|cis| {
            for ((reg, ..), value) in edges.iter().zip(shifted) {
                cis.bus.write_u16(reg.addr(), value)?;
            }
            Ok(())
        })?;
        info!(
            "window shifted by ({}, {}): x {}..{} y {}..{}",
            dx, dy, shifted[0], shifted[2], shifted[1], shifted[3]
        );
        Ok(())
    }

    /// Apply long and short exposure, in microseconds
    pub fn set_exposure_time(
        &mut self,
        long_us: u32,
        short_us: u32,
    ) -> Result<(), SensorError<T::Error>> {
        let mode = self.active_mode()?;
        if long_us == 0 || short_us == 0 {
            return Err(SensorError::InvalidArgument(
                "exposure must be non-zero",
            ));
        }
        let regs = self.model.registers();
        let long_term = self.data.long_term_mode;

        let cit = if long_term {
            Shift(0)
        } else {
            let target = long_us.max(short_us);
            exposure::cit_shift(mode.shifter, target, self.data.fll_shift)
        };
        let denom = cit.denominator();
        let quantum = self.model.coarse_quantum(self.data.lownoise.current);
        let timing = &self.data.timing;
        let long_coarse =
            exposure::coarse_integration_time(long_us / denom, timing, quantum);
        let short_coarse = exposure::coarse_integration_time(
            short_us / denom,
            timing,
            quantum,
        );
        let wdr = self.wdr_active(mode);
        debug!(
            "exposure long {} short {} us -> coarse {} / {} shift {} wdr {}",
            long_us, short_us, long_coarse, short_coarse, cit.0, wdr
        );

        {
            let mut held = self.bus.hold()?;
            let wdr_program = if wdr {
                regs.wdr_enable
            } else {
                regs.wdr_disable
            };
            wdr_program.execute(&mut *held, &mut self.delay)?;
            held.write_u16(regs.coarse_integration_time, short_coarse as u16)?;
            if wdr {
                if let Some(addr) = regs.long_coarse_integration_time {
                    held.write_u16(addr, long_coarse as u16)?;
                }
            }
            if !long_term {
                if let Some(addr) = regs.cit_shifter {
                    held.write_u16(addr, cit.cit_register())?;
                }
            }
            held.release()?;
        }

        self.data.cur_long_exposure_coarse = long_coarse;
        self.data.cur_short_exposure_coarse = short_coarse;
        self.data.last_ae.exposure_us = Some((long_us, short_us));
        Ok(())
    }

    pub fn get_min_exposure_time(&self) -> u32 {
        exposure::min_exposure_time_us(&self.data.timing)
    }

    pub fn get_max_exposure_time(&self) -> u32 {
        exposure::max_exposure_time_us(&self.data.timing)
    }

    /// Frame duration needed to fit `exposure_us` in the current mode
    pub fn adjust_frame_duration(&self, exposure_us: u32) -> u32 {
        exposure::frame_duration_for_exposure(
            exposure_us,
            &self.data.timing,
            self.data.min_frame_us_time,
        )
    }

    /// Set the frame duration, applying any requested low noise change in
    /// the same hold
    pub fn set_frame_duration(
        &mut self,
        duration_us: u32,
    ) -> Result<(), SensorError<T::Error>> {
        let mode = self.active_mode()?;
        let regs = self.model.registers();
        let long_term = self.data.long_term_mode;

        if self.data.lownoise.pending_frames > 0 {
            self.data.lownoise.pending_frames -= 1;
        }

        let duration = if duration_us < self.data.min_frame_us_time {
            debug!(
                "frame duration {} below min {}",
                duration_us, self.data.min_frame_us_time
            );
            self.data.min_frame_us_time
        } else {
            duration_us
        };
        let shift = if long_term {
            Shift(0)
        } else {
            exposure::fll_shift(mode.shifter, duration)
        };
        let denom = shift.denominator();
        let fll = exposure::frame_length_lines_for(
            duration / denom,
            &self.data.timing,
        );
        let programmed = if fll >= u16::MAX as u32 {
            let actual =
                exposure::frame_duration_for_lines(fll, &self.data.timing)
                    .saturating_mul(denom);
            warn!(
                "frame duration {} us saturates fll, programmed {} us",
                duration, actual
            );
            actual
        } else {
            duration
        };

        self.with_hold(|cis| {
            if cis.data.lownoise.current != cis.data.lownoise.previous {
                cis.lownoise_change(mode)?;
            }
            cis.bus.write_u16(regs.frame_length_lines, fll as u16)?;
            if !long_term {
                if let Some(addr) = regs.fll_shifter {
                    cis.bus.write_u8(addr, shift.0)?;
                }
            }
            Ok(())
        })?;

        self.data.cur_frame_us_time = programmed;
        self.data.fll_shift = shift;
        self.data.timing.set_frame_length_lines(fll);
        self.data.last_ae.frame_duration_us = Some(duration_us);
        debug!(
            "frame duration {} us fll {} shift {} max coarse {}",
            programmed,
            fll,
            shift.0,
            self.data.timing.max_coarse_integration_time()
        );
        Ok(())
    }

    /// Limit the frame rate; also raises the minimum frame duration
    pub fn set_frame_rate(
        &mut self,
        fps: u32,
    ) -> Result<(), SensorError<T::Error>> {
        self.active_mode()?;
        let max_fps = self.data.mode_timing.max_fps;
        let mut fps = fps;
        if fps > max_fps {
            warn!("requested {} fps above max {}", fps, max_fps);
            fps = max_fps;
        }
        let fps = fps.max(1);

        let duration = 1_000_000 / fps;
        self.data.min_frame_us_time =
            duration.max(self.data.mode_timing.min_frame_us_time);
        self.set_frame_duration(duration)
    }

    /// Analog gain is shared by both exposures; only `short_permille` is used
    pub fn set_analog_gain(
        &mut self,
        long_permille: u32,
        short_permille: u32,
    ) -> Result<(), SensorError<T::Error>> {
        self.active_mode()?;
        let regs = self.model.registers();
        let limits = self.model.limits().analog_gain;
        let code = gain::again_code(short_permille);
        let clamped = limits.clamp(code);
        if clamped != code {
            warn!("analog gain code {:#x} clamped to {:#x}", code, clamped);
        }
        debug!(
            "analog gain long {} short {} -> {:#x}",
            long_permille, short_permille, clamped
        );

        let mut held = self.bus.hold()?;
        held.write_u16(regs.analog_gain, clamped as u16)?;
        held.release()?;

        self.data.cur_analog_gain_code = clamped;
        self.data.last_ae.analog_gain = Some((long_permille, short_permille));
        Ok(())
    }

    /// Correct gains for the coarse rounding of a very short exposure.
    /// Returns the (analog, digital) gain in permille to apply instead.
    pub fn compensate_gain_for_extremely_br(
        &self,
        exposure_us: u32,
        again_permille: u32,
        dgain_permille: u32,
    ) -> (u32, u32) {
        let quantum = self.model.coarse_quantum(self.data.lownoise.current);
        let (again, dgain) = exposure::compensate_gain_for_extremely_br(
            exposure_us,
            again_permille,
            dgain_permille,
            &self.data.timing,
            quantum,
            self.get_min_analog_gain(),
        );
        debug!(
            "bright scene exposure {} us gain {}/{} -> {}/{}",
            exposure_us, again_permille, dgain_permille, again, dgain
        );
        (again, dgain)
    }

    /// The analog gain the sensor would actually apply for `permille`
    pub fn adjust_analog_gain(&self, permille: u32) -> u32 {
        let limits = self.model.limits().analog_gain;
        gain::again_permille(limits.clamp(gain::again_code(permille)))
    }

    pub fn get_analog_gain(&mut self) -> Result<u32, SensorError<T::Error>> {
        let code = self.bus.read_u16(self.model.registers().analog_gain)?;
        Ok(gain::again_permille(code as u32))
    }

    pub fn get_min_analog_gain(&self) -> u32 {
        gain::again_permille(self.model.limits().analog_gain.min_code)
    }

    pub fn get_max_analog_gain(&self) -> u32 {
        gain::again_permille(self.model.limits().analog_gain.max_code)
    }

    pub fn set_digital_gain(
        &mut self,
        long_permille: u32,
        short_permille: u32,
    ) -> Result<(), SensorError<T::Error>> {
        let mode = self.active_mode()?;
        let regs = self.model.registers();
        let limits = self.model.limits().digital_gain;
        let long_code = limits.clamp(gain::dgain_code(long_permille));
        let short_code = limits.clamp(gain::dgain_code(short_permille));
        let wdr = self.wdr_active(mode);
        debug!(
            "digital gain long {} short {} -> {:#x} / {:#x}",
            long_permille, short_permille, long_code, short_code
        );

        {
            let mut held = self.bus.hold()?;
            held.write_u16(regs.digital_gain, short_code as u16)?;
            if wdr {
                if let Some(addr) = regs.long_digital_gain {
                    held.write_u16(addr, long_code as u16)?;
                }
            }
            held.release()?;
        }

        self.data.cur_long_digital_gain_code = long_code;
        self.data.cur_short_digital_gain_code = short_code;
        self.data.last_ae.digital_gain = Some((long_permille, short_permille));
        Ok(())
    }

    pub fn get_digital_gain(&mut self) -> Result<u32, SensorError<T::Error>> {
        let code = self.bus.read_u16(self.model.registers().digital_gain)?;
        Ok(gain::dgain_permille(code as u32))
    }

    pub fn get_min_digital_gain(&self) -> u32 {
        gain::dgain_permille(self.model.limits().digital_gain.min_code)
    }

    pub fn get_max_digital_gain(&self) -> u32 {
        gain::dgain_permille(self.model.limits().digital_gain.max_code)
    }

    /// Enter or leave multi-frame long exposure.
    /// Returns the per-frame exposure to use from now on.
    pub fn set_long_term_exposure(
        &mut self,
        enable: bool,
        exposure_us: u32,
    ) -> Result<u32, SensorError<T::Error>> {
        let lte = self.model.long_term_exposure().ok_or(
            SensorError::InvalidArgument("long term exposure not supported"),
        )?;
        let regs = self.model.registers();

        let (shift, exposure_us) = if !enable {
            (Some(0u8), exposure_us)
        } else if exposure_us > lte.base_us {
            let ratio = (exposure_us / lte.base_us).min(u8::MAX as u32);
            (Some(ratio.ilog2() as u8), lte.base_us)
        } else {
            (None, exposure_us)
        };

        if let Some(shift) = shift {
            lte.prologue.execute(&mut self.bus, &mut self.delay)?;
            if let Some(addr) = regs.fll_shifter {
                self.bus.write_u8(addr, shift)?;
            }
            if let Some(addr) = regs.cit_shifter {
                self.bus.write_u8(addr, shift)?;
            }
        }
        self.data.long_term_mode = enable;
        info!("long term exposure enable({}) shift {:?}", enable, shift);
        Ok(exposure_us)
    }

    /// Dump the status registers through the log
    pub fn log_status(&mut self) -> Result<(), SensorError<T::Error>> {
        info!("[{}:DUMP] *******************************", self.model.name());
        for (name, reg, width) in SMIA_STATUS_REGISTERS {
            let value = self.bus.read(reg.addr(), *width)?;
            info!("[{}:DUMP] {}({:#x})", self.model.name(), name, value);
        }
        info!(
            "[{}:DUMP] state {:?} {:?}",
            self.model.name(),
            self.state,
            self.data.lownoise
        );
        Ok(())
    }
}

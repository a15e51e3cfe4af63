/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Frame timing derived from a mode's PLL settings.

/// Resolved clocking for one sensor mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PllInfo {
    /// External (MCLK) input clock, Hz
    pub ext_clk: u32,
    /// MIPI data rate per lane, Mbps
    pub mipi_datarate: u32,
    /// Video timing pixel clock, Hz
    pub pclk: u32,
    pub frame_length_lines: u32,
    pub line_length_pck: u32,
}

/// Derived timing for the active mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModeTiming {
    pub min_frame_us_time: u32,
    pub max_fps: u32,
    pub frame_rate: u32,
    pub line_readout_time_ns: u64,
    pub rolling_shutter_skew_ns: u64,
    pub frame_valid_us_time: u32,
    pub frame_time_us: u32,
}

/// Compute frame timing for a mode with `height` active lines
pub fn calculate(pll: &PllInfo, height: u32) -> ModeTiming {
    let pclk = pll.pclk as u64;
    let fll = pll.frame_length_lines as u64;
    let llp = pll.line_length_pck as u64;
    let frame_pck = fll * llp;
    if pclk == 0 || frame_pck == 0 {
        return ModeTiming::default();
    }

    let pclk_mhz = pclk / 1_000_000;
    let min_frame_us_time = frame_pck.checked_div(pclk_mhz).unwrap_or(0) as u32;

    let frame_rate = (pclk / frame_pck) as u32;
    let fps_x10 = pclk * 10 / frame_pck;
    let max_fps = if fps_x10 % 10 >= 5 {
        frame_rate + 1
    } else {
        frame_rate
    };

    let line_readout_time_ns = llp * 1_000_000_000 / pclk;
    let rows = height as u64;
    let rolling_shutter_skew_ns = rows.saturating_sub(1) * line_readout_time_ns;
    let frame_valid_us_time = (rows * llp * 1_000_000 / pclk) as u32;
    let frame_time_us = (line_readout_time_ns * rows / 1000) as u32;

    ModeTiming {
        min_frame_us_time,
        max_fps,
        frame_rate,
        line_readout_time_ns,
        rolling_shutter_skew_ns,
        frame_valid_us_time,
        frame_time_us,
    }
}

/// Integration time bounds and line timing used by exposure control.
///
/// `max_coarse_integration_time` always equals
/// `frame_length_lines - max_margin_coarse_integration_time`;
/// the fields that feed it are only changed through setters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CisTimingParameters {
    pub pixel_clock_hz: u32,
    pub line_length_pck: u32,
    pub min_coarse_integration_time: u32,
    pub min_fine_integration_time: u32,
    pub max_fine_integration_time: u32,
    frame_length_lines: u32,
    max_margin_coarse_integration_time: u32,
    max_coarse_integration_time: u32,
}

impl CisTimingParameters {
    pub fn new(
        pll: &PllInfo,
        min_coarse: u32,
        min_fine: u32,
        max_fine: u32,
        max_margin_coarse: u32,
    ) -> Self {
        let mut params = Self {
            pixel_clock_hz: pll.pclk,
            line_length_pck: pll.line_length_pck,
            min_coarse_integration_time: min_coarse,
            min_fine_integration_time: min_fine,
            max_fine_integration_time: max_fine,
            frame_length_lines: 0,
            max_margin_coarse_integration_time: max_margin_coarse,
            max_coarse_integration_time: 0,
        };
        params.set_frame_length_lines(pll.frame_length_lines);
        params
    }

    pub fn frame_length_lines(&self) -> u32 {
        self.frame_length_lines
    }

    pub fn max_margin_coarse_integration_time(&self) -> u32 {
        self.max_margin_coarse_integration_time
    }

    pub fn max_coarse_integration_time(&self) -> u32 {
        self.max_coarse_integration_time
    }

    pub fn set_frame_length_lines(&mut self, fll: u32) {
        self.frame_length_lines = fll;
        self.refresh_max_coarse();
    }

    pub fn set_max_margin_coarse_integration_time(&mut self, margin: u32) {
        self.max_margin_coarse_integration_time = margin;
        self.refresh_max_coarse();
    }

    fn refresh_max_coarse(&mut self) {
        self.max_coarse_integration_time = self
            .frame_length_lines
            .saturating_sub(self.max_margin_coarse_integration_time);
    }

    pub fn pclk_khz(&self) -> u64 {
        self.pixel_clock_hz as u64 / 1000
    }
}

/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/
#![cfg_attr(not(test), no_std)]

//! Control driver for the camera image sensors (CIS) behind an Exynos
//! FIMC-IS2 imaging subsystem: Samsung S5K2L3, S5K2L4 and S5K3M5.
//!
//! The driver is concerned only with the sensor's two-wire register
//! interface:
//! - revision check and setfile selection
//! - global setting, with retention SRAM where the sensor has it
//! - mode change, crop window and stream on/off handshakes
//! - per-frame exposure, frame duration and gain updates, applied
//!   atomically under group parameter hold
//!
//! Pixel data, MIPI CSI and the downstream ISP are out of scope.

pub mod calibration;
pub mod cis;
pub mod error;
pub mod exposure;
pub mod gain;
pub mod hold;
pub mod model;
pub mod program;
pub mod retention;
pub mod sensors;
pub mod shared;
pub mod timing;
pub mod transport;

#[cfg(test)]
mod test;

pub use crate::calibration::{CalibrationData, CalibrationError, CalibrationLayout};
pub use crate::cis::{AeRequest, Cis, CisConfig, CisData, CisState};
pub use crate::error::{SensorError, TransportError};
pub use crate::hold::HoldEffect;
pub use crate::model::{CisDriver, LowNoiseMode, SensorMode, SensorModelConfig};
pub use crate::program::{RegisterOp, RegisterProgram};
pub use crate::retention::{GlobalPath, RetentionState};
pub use crate::sensors::{S5k2l3, S5k2l4, S5k3m5};
pub use crate::shared::SharedCis;
pub use crate::timing::{CisTimingParameters, ModeTiming, PllInfo};
pub use crate::transport::{I2cTransport, RegisterTransport, Width, DEFAULT_I2C_ADDRESS};

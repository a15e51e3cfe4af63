/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Per-module calibration constants read from a pre-located EEPROM/OTP
//! buffer. Locating and loading the buffer is left to the caller.

use heapless::Vec;
use log::{debug, warn};

/// Longest module version string kept
pub const VERSION_MAX_LEN: usize = 16;

/// Crop shift flag: crop number is taken from the buffer
const CROP_FLAG_CALIBRATED: u8 = 7;
/// Crop shift flag: module is shifted by a fixed amount
const CROP_FLAG_FIXED: u8 = 4;
const CROP_NUM_MAX: u8 = 9;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("calibration buffer holds {available} bytes, {needed} needed")]
    Truncated { needed: usize, available: usize },
    #[error("version string of {0} bytes is too long")]
    VersionTooLong(usize),
}

/// Byte offsets of the fields this driver uses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CalibrationLayout {
    pub af_first_position: usize,
    pub awb_rg: usize,
    pub awb_bg: usize,
    pub version: usize,
    pub version_len: usize,
    /// Crop shift flag and crop number, for modules that carry them
    pub crop_shift: Option<CropShiftLayout>,
    /// Value of a crop shift flag that only marks the module as shifted
    pub fixed_crop_num: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropShiftLayout {
    pub flag: usize,
    pub crop_num: usize,
}

/// Parsed calibration constants
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalibrationData {
    /// Infinity position of the AF actuator, in DAC codes
    pub af_first_position: u16,
    /// White balance R/G ratio, x1024
    pub awb_rg: u16,
    /// White balance B/G ratio, x1024
    pub awb_bg: u16,
    pub version: Vec<u8, VERSION_MAX_LEN>,
    /// Crop number of the tele window shift; 0 means centered
    pub crop_shift: u8,
}

impl CalibrationData {
    pub fn parse(
        buf: &[u8],
        layout: &CalibrationLayout,
    ) -> Result<Self, CalibrationError> {
        if layout.version_len > VERSION_MAX_LEN {
            return Err(CalibrationError::VersionTooLong(layout.version_len));
        }
        let version = bytes(buf, layout.version, layout.version_len)?;
        let version = Vec::from_slice(version)
            .map_err(|_| CalibrationError::VersionTooLong(layout.version_len))?;

        let af_first_position = read_u16_le(buf, layout.af_first_position)?;
        let awb_rg = read_u16_le(buf, layout.awb_rg)?;
        let awb_bg = read_u16_le(buf, layout.awb_bg)?;

        let crop_shift = match layout.crop_shift {
            Some(crop) => {
                let flag = bytes(buf, crop.flag, 1)?[0];
                let num = bytes(buf, crop.crop_num, 1)?[0];
                resolve_crop_shift(flag, num, layout.fixed_crop_num)
            }
            None => 0,
        };

        let data = Self {
            af_first_position,
            awb_rg,
            awb_bg,
            version,
            crop_shift,
        };
        debug!(
            "calibration af {} awb rg {} bg {} crop {}",
            data.af_first_position, data.awb_rg, data.awb_bg, data.crop_shift
        );
        Ok(data)
    }

    /// Version bytes up to the first NUL
    pub fn version_bytes(&self) -> &[u8] {
        let end = self
            .version
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.version.len());
        &self.version[..end]
    }
}

fn resolve_crop_shift(flag: u8, num: u8, fixed: u8) -> u8 {
    match flag {
        CROP_FLAG_CALIBRATED if (1..=CROP_NUM_MAX).contains(&num) => num,
        CROP_FLAG_FIXED => fixed,
        _ => {
            warn!(
                "invalid crop shift flag {:#x} num {:#x}, contrast AF only",
                flag, num
            );
            0
        }
    }
}

fn bytes(
    buf: &[u8],
    offset: usize,
    len: usize,
) -> Result<&[u8], CalibrationError> {
    let needed = offset.saturating_add(len);
    buf.get(offset..needed).ok_or(CalibrationError::Truncated {
        needed,
        available: buf.len(),
    })
}

fn read_u16_le(buf: &[u8], offset: usize) -> Result<u16, CalibrationError> {
    let raw = bytes(buf, offset, 2)?;
    Ok(u16::from_le_bytes([raw[0], raw[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: CalibrationLayout = CalibrationLayout {
        af_first_position: 0x10,
        awb_rg: 0x20,
        awb_bg: 0x22,
        version: 0x00,
        version_len: 11,
        crop_shift: Some(CropShiftLayout {
            flag: 0x30,
            crop_num: 0x31,
        }),
        fixed_crop_num: 5,
    };

    fn image() -> [u8; 0x40] {
        let mut buf = [0u8; 0x40];
        buf[..11].copy_from_slice(b"A13QSGF0\0\0\0");
        buf[0x10..0x12].copy_from_slice(&0x0123u16.to_le_bytes());
        buf[0x20..0x22].copy_from_slice(&612u16.to_le_bytes());
        buf[0x22..0x24].copy_from_slice(&701u16.to_le_bytes());
        buf[0x30] = 7;
        buf[0x31] = 3;
        buf
    }

    #[test]
    fn fields_are_little_endian() {
        let cal = CalibrationData::parse(&image(), &LAYOUT).unwrap();
        assert_eq!(cal.af_first_position, 0x0123);
        assert_eq!(cal.awb_rg, 612);
        assert_eq!(cal.awb_bg, 701);
        assert_eq!(cal.version.len(), 11);
        assert_eq!(cal.version_bytes(), b"A13QSGF0");
        assert_eq!(cal.crop_shift, 3);
    }

    #[test]
    fn crop_shift_flags() {
        let mut buf = image();
        buf[0x30] = 4;
        assert_eq!(CalibrationData::parse(&buf, &LAYOUT).unwrap().crop_shift, 5);

        buf[0x30] = 7;
        buf[0x31] = 10;
        assert_eq!(CalibrationData::parse(&buf, &LAYOUT).unwrap().crop_shift, 0);

        let layout = CalibrationLayout {
            crop_shift: None,
            ..LAYOUT
        };
        assert_eq!(CalibrationData::parse(&image(), &layout).unwrap().crop_shift, 0);
    }

    #[test]
    fn short_buffer_is_reported() {
        let buf = image();
        assert_eq!(
            CalibrationData::parse(&buf[..0x21], &LAYOUT),
            Err(CalibrationError::Truncated {
                needed: 0x22,
                available: 0x21
            })
        );
    }

    #[test]
    fn oversized_version_is_rejected() {
        let layout = CalibrationLayout {
            version_len: VERSION_MAX_LEN + 1,
            ..LAYOUT
        };
        assert_eq!(
            CalibrationData::parse(&image(), &layout),
            Err(CalibrationError::VersionTooLong(VERSION_MAX_LEN + 1))
        );
    }
}

/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Retention mode.
//! Some sensors keep their mode settings in on-chip SRAM across stream off,
//! so a later global setting only needs a short program. A CRC check
//! register tells us whether the SRAM content survived.

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::error::SensorError;
use crate::model::{RetentionTables, SensorModelConfig};
use crate::transport::RegisterTransport;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetentionState {
    Unsupported,
    Inactive,
    Activated,
}

/// Which global setting path ran
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlobalPath {
    /// Full global setting replayed
    Full,
    /// SRAM intact, short retention program applied
    Retention,
    /// SRAM CRC failed, full global setting replayed
    Recovered,
}

pub struct RetentionManager {
    state: RetentionState,
}

impl RetentionManager {
    pub fn new(tables: Option<&RetentionTables>) -> Self {
        let state = match tables {
            Some(_) => RetentionState::Inactive,
            None => RetentionState::Unsupported,
        };
        Self { state }
    }

    pub fn state(&self) -> RetentionState {
        self.state
    }

    pub fn is_activated(&self) -> bool {
        self.state == RetentionState::Activated
    }

    /// SRAM content no longer matches what the sensor needs
    pub fn invalidate(&mut self) {
        if self.state == RetentionState::Activated {
            info!("retention invalidated");
            self.state = RetentionState::Inactive;
        }
    }

    /// Apply the global setting, using retention SRAM when possible
    pub fn apply_global<T, D>(
        &mut self,
        bus: &mut T,
        delay: &mut D,
        setfile: &SensorModelConfig,
    ) -> Result<GlobalPath, SensorError<T::Error>>
    where
        T: RegisterTransport,
        D: DelayNs,
    {
        let tables = match (self.state, setfile.retention) {
            (RetentionState::Unsupported, _) | (_, None) => {
                Self::internal_global(bus, delay, setfile)?;
                return Ok(GlobalPath::Full);
            }
            (_, Some(tables)) => tables,
        };

        if self.state == RetentionState::Inactive {
            Self::internal_global(bus, delay, setfile)?;
            Self::prepare(bus, delay, tables)?;
            self.state = RetentionState::Activated;
            info!("{}: retention activated", setfile.name);
            return Ok(GlobalPath::Full);
        }

        let crc = bus.read_u8(tables.crc_check)?;
        if crc == tables.crc_pass {
            info!("{}: retention crc ok", setfile.name);
            tables.global.execute(bus, delay)?;
            Ok(GlobalPath::Retention)
        } else {
            warn!(
                "{}: retention crc {:#04x}, replaying global setting",
                setfile.name, crc
            );
            self.state = RetentionState::Inactive;
            Self::internal_global(bus, delay, setfile)?;
            Self::prepare(bus, delay, tables)?;
            self.state = RetentionState::Activated;
            Ok(GlobalPath::Recovered)
        }
    }

    fn internal_global<T, D>(
        bus: &mut T,
        delay: &mut D,
        setfile: &SensorModelConfig,
    ) -> Result<(), SensorError<T::Error>>
    where
        T: RegisterTransport,
        D: DelayNs,
    {
        setfile.reset_tnp.execute(bus, delay)?;
        setfile.global.execute(bus, delay)?;
        Ok(())
    }

    fn prepare<T, D>(
        bus: &mut T,
        delay: &mut D,
        tables: &RetentionTables,
    ) -> Result<(), SensorError<T::Error>>
    where
        T: RegisterTransport,
        D: DelayNs,
    {
        for program in tables.prepare {
            program.execute(bus, delay)?;
        }
        Ok(())
    }
}

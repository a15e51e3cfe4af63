/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Register level access to the sensor.
//! Samsung CIS parts use 16-bit register addresses, sent MSB first,
//! and either 8-bit or 16-bit register values.

use core::fmt::Debug;

use embedded_hal::i2c::{ErrorKind, I2c};

use crate::error::TransportError;

/// Default 7-bit address of the sensor's control interface
pub const DEFAULT_I2C_ADDRESS: u8 = 0x2D;

/// Largest number of 16-bit words sent in a single bus transaction
pub const BURST_MAX_WORDS: usize = 128;

/// Register value width
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    Byte,
    Word,
}

impl Width {
    pub const fn bytes(self) -> usize {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
        }
    }
}

/// Moves register values to and from the sensor.
///
/// Callers must hold exclusive access for the duration of any multi-step
/// sequence, since the sensor's page select registers persist across calls.
pub trait RegisterTransport {
    type Error: Debug;

    fn read(
        &mut self,
        addr: u16,
        width: Width,
    ) -> Result<u16, TransportError<Self::Error>>;

    fn write(
        &mut self,
        addr: u16,
        width: Width,
        value: u16,
    ) -> Result<(), TransportError<Self::Error>>;

    /// Write a run of 16-bit words to one auto-incrementing data port
    fn write_burst(
        &mut self,
        addr: u16,
        values: &[u16],
    ) -> Result<(), TransportError<Self::Error>>;

    fn read_u8(
        &mut self,
        addr: u16,
    ) -> Result<u8, TransportError<Self::Error>> {
        Ok(self.read(addr, Width::Byte)? as u8)
    }

    fn read_u16(
        &mut self,
        addr: u16,
    ) -> Result<u16, TransportError<Self::Error>> {
        self.read(addr, Width::Word)
    }

    fn write_u8(
        &mut self,
        addr: u16,
        value: u8,
    ) -> Result<(), TransportError<Self::Error>> {
        self.write(addr, Width::Byte, value as u16)
    }

    fn write_u16(
        &mut self,
        addr: u16,
        value: u16,
    ) -> Result<(), TransportError<Self::Error>> {
        self.write(addr, Width::Word, value)
    }
}

/// Register transport over a blocking i2c bus
pub struct I2cTransport<I2C> {
    base_address: u8,
    i2c: I2C,
}

impl<I2C> I2cTransport<I2C>
where
    I2C: I2c,
{
    /// Create a new instance with an i2c address:
    /// May use DEFAULT_I2C_ADDRESS if in doubt.
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            base_address: address,
            i2c,
        }
    }

    pub fn default(i2c: I2C) -> Self {
        Self::new(i2c, DEFAULT_I2C_ADDRESS)
    }

    /// Give back the underlying bus
    pub fn release(self) -> I2C {
        self.i2c
    }

    pub fn simple_probe(&mut self) -> Result<(), TransportError<I2C::Error>> {
        let mut recv_buf = [0u8];
        self.i2c
            .read(self.base_address, &mut recv_buf)
            .map_err(classify)?;
        Ok(())
    }
}

impl<I2C> RegisterTransport for I2cTransport<I2C>
where
    I2C: I2c,
{
    type Error = I2C::Error;

    fn read(
        &mut self,
        addr: u16,
        width: Width,
    ) -> Result<u16, TransportError<Self::Error>> {
        let cmd_buf = addr.to_be_bytes();
        let mut recv_buf = [0u8; 2];
        self.i2c
            .write_read(
                self.base_address,
                &cmd_buf,
                &mut recv_buf[..width.bytes()],
            )
            .map_err(classify)?;

        Ok(match width {
            Width::Byte => recv_buf[0] as u16,
            Width::Word => u16::from_be_bytes(recv_buf),
        })
    }

    fn write(
        &mut self,
        addr: u16,
        width: Width,
        value: u16,
    ) -> Result<(), TransportError<Self::Error>> {
        let [addr_hi, addr_lo] = addr.to_be_bytes();
        let [val_hi, val_lo] = value.to_be_bytes();
        let res = match width {
            // 8-bit registers only take the low byte
            Width::Byte => self
                .i2c
                .write(self.base_address, &[addr_hi, addr_lo, val_lo]),
            Width::Word => self
                .i2c
                .write(self.base_address, &[addr_hi, addr_lo, val_hi, val_lo]),
        };
        res.map_err(classify)
    }

    fn write_burst(
        &mut self,
        addr: u16,
        values: &[u16],
    ) -> Result<(), TransportError<Self::Error>> {
        let mut write_buf = [0u8; 2 + 2 * BURST_MAX_WORDS];
        write_buf[..2].copy_from_slice(&addr.to_be_bytes());
        for chunk in values.chunks(BURST_MAX_WORDS) {
            for (idx, word) in chunk.iter().enumerate() {
                let pos = 2 + 2 * idx;
                write_buf[pos..pos + 2].copy_from_slice(&word.to_be_bytes());
            }
            let len = 2 + 2 * chunk.len();
            self.i2c
                .write(self.base_address, &write_buf[..len])
                .map_err(classify)?;
        }
        Ok(())
    }
}

/// Sort a bus error into the transport taxonomy
fn classify<E>(err: E) -> TransportError<E>
where
    E: embedded_hal::i2c::Error,
{
    match err.kind() {
        ErrorKind::NoAcknowledge(_) => TransportError::Nack(err),
        ErrorKind::Bus | ErrorKind::ArbitrationLoss => {
            TransportError::BusUnavailable(err)
        }
        _ => TransportError::Other(err),
    }
}

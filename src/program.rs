/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Setfiles: ordered register programs replayed against the sensor.

use embedded_hal::delay::DelayNs;
use heapless::Vec;
use log::{error, trace};

use crate::error::TransportError;
use crate::transport::{RegisterTransport, Width};

/// Largest number of burst words collected before a flush
pub const PROGRAM_BURST_WORDS: usize = 64;

/// A single step in a register program
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterOp {
    /// Write one register
    Write { addr: u16, width: Width, value: u16 },
    /// One word of a burst to a data port.
    /// Adjacent entries with the same `addr` are sent as one transaction.
    Burst { addr: u16, value: u16 },
    /// Wait before continuing
    Delay { us: u32 },
}

pub const fn w8(addr: u16, value: u8) -> RegisterOp {
    RegisterOp::Write {
        addr,
        width: Width::Byte,
        value: value as u16,
    }
}

pub const fn w16(addr: u16, value: u16) -> RegisterOp {
    RegisterOp::Write {
        addr,
        width: Width::Word,
        value,
    }
}

pub const fn burst(addr: u16, value: u16) -> RegisterOp {
    RegisterOp::Burst { addr, value }
}

pub const fn delay_us(us: u32) -> RegisterOp {
    RegisterOp::Delay { us }
}

pub const fn delay_ms(ms: u32) -> RegisterOp {
    RegisterOp::Delay { us: ms * 1000 }
}

/// Aggregate result of a program that had at least one failed entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgramFailure<E> {
    /// Name of the program that was running
    pub program: &'static str,
    /// Number of bus transactions that failed
    pub failed: usize,
    /// The first failure seen
    pub first: TransportError<E>,
}

/// A named, immutable register program
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterProgram {
    name: &'static str,
    ops: &'static [RegisterOp],
}

impl RegisterProgram {
    pub const EMPTY: RegisterProgram = RegisterProgram::new("empty", &[]);

    pub const fn new(name: &'static str, ops: &'static [RegisterOp]) -> Self {
        Self { name, ops }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ops(&self) -> &'static [RegisterOp] {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Replay the program in order.
    /// A failed transaction is logged and the remaining entries still run;
    /// the caller gets the failure count and the first error.
    pub fn execute<T, D>(
        &self,
        bus: &mut T,
        delay: &mut D,
    ) -> Result<(), ProgramFailure<T::Error>>
    where
        T: RegisterTransport + ?Sized,
        D: DelayNs,
    {
        trace!("{}: {} entries", self.name, self.ops.len());
        let mut tally = Tally::new(self.name);
        let mut run: Vec<u16, PROGRAM_BURST_WORDS> = Vec::new();
        let mut run_addr = 0u16;

        for op in self.ops {
            match *op {
                RegisterOp::Burst { addr, value } => {
                    if !run.is_empty() && (addr != run_addr || run.is_full()) {
                        tally.record(run_addr, bus.write_burst(run_addr, &run));
                        run.clear();
                    }
                    run_addr = addr;
                    // run is never full here
                    let _ = run.push(value);
                }
                RegisterOp::Write { addr, width, value } => {
                    if !run.is_empty() {
                        tally.record(run_addr, bus.write_burst(run_addr, &run));
                        run.clear();
                    }
                    tally.record(addr, bus.write(addr, width, value));
                }
                RegisterOp::Delay { us } => {
                    if !run.is_empty() {
                        tally.record(run_addr, bus.write_burst(run_addr, &run));
                        run.clear();
                    }
                    delay.delay_us(us);
                }
            }
        }
        if !run.is_empty() {
            tally.record(run_addr, bus.write_burst(run_addr, &run));
        }

        tally.finish()
    }
}

struct Tally<E> {
    program: &'static str,
    failed: usize,
    first: Option<TransportError<E>>,
}

impl<E: core::fmt::Debug> Tally<E> {
    fn new(program: &'static str) -> Self {
        Self {
            program,
            failed: 0,
            first: None,
        }
    }

    fn record(&mut self, addr: u16, res: Result<(), TransportError<E>>) {
        if let Err(err) = res {
            error!(
                "{}: write to {:#06x} failed: {:?}",
                self.program, addr, err
            );
            self.failed += 1;
            if self.first.is_none() {
                self.first = Some(err);
            }
        }
    }

    fn finish(self) -> Result<(), ProgramFailure<E>> {
        match self.first {
            None => Ok(()),
            Some(first) => Err(ProgramFailure {
                program: self.program,
                failed: self.failed,
                first,
            }),
        }
    }
}

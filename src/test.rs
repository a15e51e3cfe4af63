/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Recording register bus and delay for unit tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use embedded_hal::delay::DelayNs;

use crate::error::TransportError;
use crate::transport::{RegisterTransport, Width};

/// One recorded bus transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum BusOp {
    Read(u16, Width),
    Write(u16, Width, u16),
    Burst(u16, Vec<u16>),
}

/// Mock register bus.
/// Failed writes are not recorded; the error carries the failing address.
#[derive(Default)]
pub(crate) struct MockBus {
    pub ops: Vec<BusOp>,
    registers: BTreeMap<u16, u16>,
    scripts: BTreeMap<u16, VecDeque<u16>>,
    failing: BTreeSet<u16>,
    failing_once: BTreeSet<u16>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value returned by reads once any script for `addr` runs out
    pub fn set_register(&mut self, addr: u16, value: u16) {
        self.registers.insert(addr, value);
    }

    /// Values returned by the next reads of `addr`, in order
    pub fn script_reads(&mut self, addr: u16, values: &[u16]) {
        self.scripts
            .entry(addr)
            .or_default()
            .extend(values.iter().copied());
    }

    pub fn fail_writes_to(&mut self, addr: u16) {
        self.failing.insert(addr);
    }

    /// Fail only the next write to `addr`
    pub fn fail_next_write_to(&mut self, addr: u16) {
        self.failing_once.insert(addr);
    }

    fn write_fails(&mut self, addr: u16) -> bool {
        self.failing.contains(&addr) || self.failing_once.remove(&addr)
    }

    /// Values written to `addr`, by single writes or bursts
    pub fn writes_to(&self, addr: u16) -> Vec<u16> {
        self.ops
            .iter()
            .flat_map(|op| match op {
                BusOp::Write(a, _, v) if *a == addr => vec![*v],
                BusOp::Burst(a, vals) if *a == addr => vals.clone(),
                _ => vec![],
            })
            .collect()
    }

    /// Writes only, as (address, value) pairs
    pub fn writes(&self) -> Vec<(u16, u16)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                BusOp::Write(a, _, v) => Some((*a, *v)),
                _ => None,
            })
            .collect()
    }

    pub fn read_count(&self, addr: u16) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, BusOp::Read(a, _) if *a == addr))
            .count()
    }

    pub fn burst_words(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                BusOp::Burst(_, vals) => vals.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn has_writes(&self) -> bool {
        self.ops.iter().any(|op| !matches!(op, BusOp::Read(..)))
    }
}

impl RegisterTransport for MockBus {
    type Error = u16;

    fn read(
        &mut self,
        addr: u16,
        width: Width,
    ) -> Result<u16, TransportError<Self::Error>> {
        self.ops.push(BusOp::Read(addr, width));
        let scripted = self.scripts.get_mut(&addr).and_then(|s| s.pop_front());
        let value = scripted
            .or_else(|| self.registers.get(&addr).copied())
            .unwrap_or(0);
        Ok(match width {
            Width::Byte => value & 0xFF,
            Width::Word => value,
        })
    }

    fn write(
        &mut self,
        addr: u16,
        width: Width,
        value: u16,
    ) -> Result<(), TransportError<Self::Error>> {
        if self.write_fails(addr) {
            return Err(TransportError::Nack(addr));
        }
        self.ops.push(BusOp::Write(addr, width, value));
        Ok(())
    }

    fn write_burst(
        &mut self,
        addr: u16,
        values: &[u16],
    ) -> Result<(), TransportError<Self::Error>> {
        if self.write_fails(addr) {
            return Err(TransportError::Nack(addr));
        }
        self.ops.push(BusOp::Burst(addr, values.to_vec()));
        Ok(())
    }
}

/// Mock delay that only keeps count
#[derive(Default)]
pub(crate) struct MockDelay {
    pub calls: usize,
    pub total_us: u64,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.calls += 1;
        self.total_us += ns as u64 / 1000;
    }

    fn delay_us(&mut self, us: u32) {
        self.calls += 1;
        self.total_us += us as u64;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.calls += 1;
        self.total_us += ms as u64 * 1000;
    }
}

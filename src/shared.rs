/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! A [`Cis`] reachable from more than one execution context.
//!
//! AE updates and mode changes often run from different contexts.
//! Every call made through [`SharedCis`] holds the lock for its whole
//! duration, bounded stream polling included.

use embedded_hal::delay::DelayNs;
use spin::{Mutex, MutexGuard};

use crate::cis::Cis;
use crate::model::CisDriver;
use crate::transport::RegisterTransport;

pub struct SharedCis<T, D, M>
where
    T: RegisterTransport,
{
    inner: Mutex<Cis<T, D, M>>,
}

impl<T, D, M> SharedCis<T, D, M>
where
    T: RegisterTransport,
    D: DelayNs,
    M: CisDriver,
{
    pub fn new(cis: Cis<T, D, M>) -> Self {
        Self {
            inner: Mutex::new(cis),
        }
    }

    /// Block until the sensor is free
    pub fn lock(&self) -> MutexGuard<'_, Cis<T, D, M>> {
        self.inner.lock()
    }

    /// Run `f` with exclusive access to the sensor
    pub fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut Cis<T, D, M>) -> R,
    {
        let mut cis = self.inner.lock();
        f(&mut cis)
    }

    /// Like `with`, but give up if another context holds the sensor
    pub fn try_with<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut Cis<T, D, M>) -> R,
    {
        let mut cis = self.inner.try_lock()?;
        Some(f(&mut cis))
    }

    pub fn into_inner(self) -> Cis<T, D, M> {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cis::{CisConfig, CisState};
    use crate::model::SmiaRegisters;
    use crate::sensors::S5k3m5;
    use crate::test::{MockBus, MockDelay};

    fn shared() -> SharedCis<MockBus, MockDelay, S5k3m5> {
        let mut bus = MockBus::new();
        bus.set_register(SmiaRegisters::RevisionNumber.addr(), 0xA0);
        let cis = Cis::new(bus, MockDelay::new(), S5k3m5, CisConfig::default());
        SharedCis::new(cis)
    }

    #[test]
    fn operations_run_under_the_lock() {
        let sensor = shared();
        sensor.with(|cis| cis.init()).unwrap();
        sensor.with(|cis| cis.set_global_setting()).unwrap();
        sensor.with(|cis| cis.mode_change(1)).unwrap();
        sensor
            .with(|cis| cis.set_exposure_time(10_000, 10_000))
            .unwrap();

        let cis = sensor.into_inner();
        assert_eq!(cis.state(), CisState::ModeSelected { mode: 1 });
        assert_eq!(cis.data().cur_short_exposure_coarse, (10_000 * 560 - 0x100) / 5120);
    }

    #[test]
    fn busy_sensor_is_not_reentered() {
        let sensor = shared();
        let guard = sensor.lock();
        assert!(sensor.try_with(|cis| cis.state()).is_none());
        drop(guard);
        assert_eq!(sensor.try_with(|cis| cis.state()), Some(CisState::Probed));
    }
}

/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

use crate::cis::CisState;
use crate::program::ProgramFailure;

/// Failures reported by a
/// [`RegisterTransport`](crate::transport::RegisterTransport)
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError<E> {
    /// The sensor did not acknowledge its address or a data byte
    #[error("sensor did not acknowledge: {0:?}")]
    Nack(E),

    /// The bus is held by someone else or is electrically stuck
    #[error("bus unavailable: {0:?}")]
    BusUnavailable(E),

    /// Any other bus level failure
    #[error("bus error: {0:?}")]
    Other(E),

    /// The sensor did not respond in a timely manner
    #[error("bus transaction timed out")]
    Timeout,
}

/// Errors in this crate
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError<E> {
    /// Sensor communication error
    #[error("transport: {0}")]
    Transport(TransportError<E>),

    /// Requested mode index is not in the active setfile table
    #[error("invalid mode {mode} (available: {available})")]
    InvalidMode { mode: usize, available: usize },

    /// Frame counter never reached the expected value
    #[error("stream transition timed out after {polls} polls")]
    StreamTransitionTimeout { polls: u32 },

    /// The revision read from the sensor has no matching setfile table
    #[error("unsupported sensor revision {0:#04x}")]
    UnsupportedRevision(u8),

    /// A register program was only partially applied
    #[error("{failed_writes} register writes failed, first: {first}")]
    InconsistentHardware {
        failed_writes: usize,
        first: TransportError<E>,
    },

    /// The operation is not allowed in the current lifecycle state
    #[error("operation not allowed in state {0:?}")]
    InvalidState(CisState),

    /// A caller supplied value is out of range
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Requested window does not fit in the pixel array
    #[error("requested size exceeds the pixel array")]
    SizeOverflow,
}

impl<E> From<TransportError<E>> for SensorError<E> {
    fn from(err: TransportError<E>) -> Self {
        SensorError::Transport(err)
    }
}

impl<E> From<ProgramFailure<E>> for SensorError<E> {
    fn from(failure: ProgramFailure<E>) -> Self {
        SensorError::InconsistentHardware {
            failed_writes: failure.failed,
            first: failure.first,
        }
    }
}

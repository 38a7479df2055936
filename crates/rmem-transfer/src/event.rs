//! Observable log stream
//!
//! A run produces one start line, one line per failed acquisition or
//! abandoned stage, and one line per completed copy step:
//!
//! ```text
//! transfer-test: transfer test for reserved-memory (buffer_size=16384 test_mode=0x3)
//! transfer-test: DMA: src:80000000 -> fix:90000000 OK
//! transfer-test: DMA: fix:90000000 -> dst:80004000 OK
//! transfer-test: CPU: src:80000000 -> fix:90000000 OK
//! transfer-test: CPU: fix:90000000 -> dst:80004000 OK
//! ```
//!
//! Lines are delivered to an [`EventSink`]. [`DeviceLog`] forwards them to
//! the firmware logger (`defmt`) or to `tracing` on hosted builds.

use core::fmt;

use crate::error::ProbeError;
use crate::verify::{StageAbort, StepRecord};

/// Severity of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    /// Progress and results
    Info,
    /// Failures
    Error,
}

/// One line of the run log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Run started with these raw parameter values
    Started {
        /// Buffer length parameter
        buffer_size: u32,
        /// Test mode parameter
        mode: u32,
    },
    /// The attach failed
    Failed(ProbeError),
    /// A stage was abandoned after a transfer error
    TransferFailed(StageAbort),
    /// A copy step completed
    Step(StepRecord),
}

impl Event {
    /// Severity
    pub const fn level(&self) -> Level {
        match self {
            Self::Started { .. } | Self::Step(_) => Level::Info,
            Self::Failed(_) | Self::TransferFailed(_) => Level::Error,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { buffer_size, mode } => write!(
                f,
                "transfer test for reserved-memory (buffer_size={buffer_size} test_mode={mode:#x})"
            ),
            Self::Failed(err) => write!(f, "{err}"),
            Self::TransferFailed(abort) => write!(f, "{abort}"),
            Self::Step(record) => write!(f, "{record}"),
        }
    }
}

/// Consumer of run events
pub trait EventSink {
    /// Deliver one event
    fn emit(&mut self, event: &Event);
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: &Event) {
        (**self).emit(event);
    }
}

/// Collects events; anything past capacity `N` is dropped.
impl<const N: usize> EventSink for heapless::Vec<Event, N> {
    fn emit(&mut self, event: &Event) {
        let _ = self.push(*event);
    }
}

/// Logs events prefixed with the device name, like the host's `dev_info`/`dev_err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLog {
    /// Log prefix
    pub device: &'static str,
}

impl DeviceLog {
    /// Logger for `device`
    pub const fn new(device: &'static str) -> Self {
        Self { device }
    }
}

impl EventSink for DeviceLog {
    #[cfg(feature = "defmt")]
    fn emit(&mut self, event: &Event) {
        match event.level() {
            Level::Info => defmt::info!("{}: {}", self.device, defmt::Display2Format(event)),
            Level::Error => defmt::error!("{}: {}", self.device, defmt::Display2Format(event)),
        }
    }

    #[cfg(all(feature = "tracing", not(feature = "defmt")))]
    fn emit(&mut self, event: &Event) {
        match event.level() {
            Level::Info => tracing::info!(device = self.device, "{event}"),
            Level::Error => tracing::error!(device = self.device, "{event}"),
        }
    }

    #[cfg(not(any(feature = "defmt", feature = "tracing")))]
    fn emit(&mut self, _event: &Event) {}
}

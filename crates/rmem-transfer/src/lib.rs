//! Reserved-memory transfer self-test
//!
//! Verifies data integrity across CPU-copy and DMA-copy paths into and out
//! of a statically reserved physical memory region. The test binds to a
//! device-tree node, acquires a memcpy DMA channel and two reserved regions,
//! runs a fixed sequence of copy-and-checksum steps and releases everything
//! in reverse order.
//!
//! # Pipeline
//!
//! ```text
//! probe ──► acquire ──► verify::run ──► drop(Resources)
//!            │            │
//!            │            ├─ DMA: src → fix → dst   (ChannelGuard::copy)
//!            │            └─ CPU: src → fix → dst   (copy_from_slice)
//!            │
//!            └─ channel → domain → fixed region → src, dst → fix mapping
//! ```
//!
//! # Modules
//!
//! - [`config`] - buffer size / test mode tunables and probe options
//! - [`error`] - acquisition, transfer and probe error taxonomy
//! - [`checksum`] - CRC-32 (little-endian) over buffer contents
//! - [`buffer`] - exclusive buffer views and random fill
//! - [`acquire`] - resource guards and the ordered acquisition chain
//! - [`transfer`] - synchronous DMA memcpy on an owned channel
//! - [`verify`] - the DMA/CPU copy-and-verify matrix
//! - [`event`] - the observable log stream
//! - [`driver`] - compatible match and probe entry point
//!
//! # Features
//!
//! - `std`: `std` support in the platform crate (simulated host)
//! - `defmt`: log through `defmt` (firmware builds)
//! - `tracing`: log through `tracing` (host builds)

#![cfg_attr(not(test), no_std)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]
#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

#[macro_use]
mod log;

pub mod acquire;
pub mod buffer;
pub mod checksum;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod transfer;
pub mod verify;

pub use acquire::{acquire, Resources};
pub use buffer::{Buffer, BufferRole};
pub use checksum::crc32_le;
pub use config::{ChannelPolicy, ModuleParams, ProbeOptions, TestConfig, TestMode};
pub use driver::{Host, RmemTransferDriver, COMPATIBLE, DRIVER_NAME, OF_MATCH_TABLE};
pub use error::{probe_status, AcquireError, ConfigError, ProbeError, TransferError};
pub use event::{DeviceLog, Event, EventSink, Level};
pub use verify::{Hop, Report, Stage, StageAbort, StepRecord, Verdict};

//! Probe entry point
//!
//! The host driver model matches [`OF_MATCH_TABLE`] against device-tree
//! nodes and calls [`RmemTransferDriver::probe`] once per matching node.
//! A probe runs the whole test before returning:
//!
//! 1. log the start line
//! 2. snapshot the tunables
//! 3. acquire the channel, regions and buffers
//! 4. run the enabled stages
//! 5. release everything in reverse order
//!
//! Only configuration and acquisition failures fail the attach. Transfer
//! errors and checksum mismatches are results, reported in the log and in
//! the returned [`Report`].

use platform::{DeviceNode, DmaEngine, RandomSource, ReservedMemory};

use crate::acquire::acquire;
use crate::config::{ModuleParams, ProbeOptions, TestConfig};
use crate::error::{probe_status, ProbeError};
use crate::event::{Event, EventSink};
use crate::verify::{self, Report};

/// Device-tree compatible string the test binds to
pub const COMPATIBLE: &str = "test-rmem-transfer";

/// Compatible strings matched by the driver
pub const OF_MATCH_TABLE: &[&str] = &[COMPATIBLE];

/// Driver name registered with the host
pub const DRIVER_NAME: &str = "test-rmem-transfer";

/// Host collaborators for one probe
pub struct Host<'h, E, M, R: ?Sized> {
    /// DMA engine
    pub dma: &'h E,
    /// Reserved-memory services
    pub memory: &'h M,
    /// Buffer content generator
    pub rng: &'h mut R,
}

/// The transfer test driver
#[derive(Debug, Clone, Copy)]
pub struct RmemTransferDriver<'p> {
    params: &'p ModuleParams,
    options: ProbeOptions,
}

impl<'p> RmemTransferDriver<'p> {
    /// Driver reading its tunables from `params`
    pub const fn new(params: &'p ModuleParams, options: ProbeOptions) -> Self {
        Self { params, options }
    }

    /// Host-convention choices in effect
    pub const fn options(&self) -> ProbeOptions {
        self.options
    }

    /// Check whether the driver binds to `node`
    pub fn matches(&self, node: &DeviceNode) -> bool {
        OF_MATCH_TABLE.iter().any(|c| node.is_compatible(c))
    }

    /// Run the test on `node`.
    ///
    /// Returns the run report when the attach succeeds; a failure has
    /// already released every resource acquired before it.
    pub fn probe<E, M, R, S>(
        &self,
        node: &DeviceNode,
        host: Host<'_, E, M, R>,
        sink: &mut S,
    ) -> Result<Report, ProbeError>
    where
        E: DmaEngine,
        M: ReservedMemory,
        R: RandomSource + ?Sized,
        S: EventSink + ?Sized,
    {
        if !self.matches(node) {
            return Err(ProbeError::NotCompatible);
        }

        let (buffer_size, mode) = self.params.load();
        sink.emit(&Event::Started { buffer_size, mode });

        let result = self.run(node, host, buffer_size, mode, sink);
        if let Err(err) = &result {
            sink.emit(&Event::Failed(*err));
        }
        result
    }

    /// [`probe`](Self::probe) folded into the host's attach-result convention
    pub fn attach<E, M, R, S>(
        &self,
        node: &DeviceNode,
        host: Host<'_, E, M, R>,
        sink: &mut S,
    ) -> i32
    where
        E: DmaEngine,
        M: ReservedMemory,
        R: RandomSource + ?Sized,
        S: EventSink + ?Sized,
    {
        probe_status(&self.probe(node, host, sink), self.options.channel_policy)
    }

    fn run<E, M, R, S>(
        &self,
        node: &DeviceNode,
        host: Host<'_, E, M, R>,
        buffer_size: u32,
        mode: u32,
        sink: &mut S,
    ) -> Result<Report, ProbeError>
    where
        E: DmaEngine,
        M: ReservedMemory,
        R: RandomSource + ?Sized,
        S: EventSink + ?Sized,
    {
        let config = TestConfig::new(buffer_size, mode)?;
        let strategy = self.options.bind_strategy;
        let mut resources = acquire(host.dma, host.memory, node, &config, strategy)?;

        let (channel, buffers) = resources.split();
        let report = verify::run(channel, buffers, &config, host.rng, sink);

        drop(resources);
        Ok(report)
    }
}

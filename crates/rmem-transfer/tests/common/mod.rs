//! Shared fixture: a simulated SoC with a scratch and a fixed region.

#![allow(dead_code)]

use platform::mocks::{Fault, HostEvent, SimHost, XorShift32};
use platform::DeviceNode;
use rmem_transfer::{
    Event, Host, ModuleParams, ProbeError, ProbeOptions, Report, RmemTransferDriver,
};

pub const RESERVED_BASE: u64 = 0x8000_0000;
pub const FIXED_BASE: u64 = 0x9000_0000;

pub const NODE: DeviceNode = DeviceNode::new(
    "transfer-test",
    &["test-rmem-transfer"],
    &["rmem_reserved", "rmem_fixed"],
);

pub type EventLog = heapless::Vec<Event, 16>;

pub struct Outcome {
    pub host: SimHost,
    pub result: Result<Report, ProbeError>,
    pub events: EventLog,
}

pub struct Fixture {
    pub buffer_size: u32,
    pub test_mode: u32,
    pub fixed_size: u64,
    pub faults: Vec<Fault>,
    pub options: ProbeOptions,
    pub node: DeviceNode,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            buffer_size: 16384,
            test_mode: 3,
            fixed_size: 0x1_0000,
            faults: Vec::new(),
            options: ProbeOptions::default(),
            node: NODE,
        }
    }
}

impl Fixture {
    pub fn fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    pub fn mode(mut self, bits: u32) -> Self {
        self.test_mode = bits;
        self
    }

    pub fn host(&self) -> SimHost {
        let mut builder = SimHost::builder()
            .region("rmem_reserved", RESERVED_BASE, 0x10_0000)
            .region("rmem_fixed", FIXED_BASE, self.fixed_size);
        for fault in &self.faults {
            builder = builder.fault(*fault);
        }
        builder.build()
    }

    pub fn probe(&self) -> Outcome {
        let host = self.host();
        let params = ModuleParams::new();
        params.set_buffer_size(self.buffer_size);
        params.set_test_mode(self.test_mode);
        let driver = RmemTransferDriver::new(&params, self.options);

        let (dma, memory) = (host.dma(), host.memory());
        let mut rng = XorShift32::new(0x5eed);
        let mut events = EventLog::new();
        let result = driver.probe(
            &self.node,
            Host {
                dma: &dma,
                memory: &memory,
                rng: &mut rng,
            },
            &mut events,
        );
        Outcome {
            host,
            result,
            events,
        }
    }
}

impl Outcome {
    pub fn count(&self, pred: impl Fn(&HostEvent) -> bool) -> usize {
        self.host.count(pred)
    }

    pub fn step_lines(&self) -> Vec<String> {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Step(_)))
            .map(ToString::to_string)
            .collect()
    }
}

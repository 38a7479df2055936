//! Simulated host for testing
//!
//! This module provides a simulated implementation of every platform trait.
//! Physical memory is modelled by heap-backed regions, so DMA copies really
//! move bytes and checksums really compare contents. Failures are injected
//! with [`Fault`], and every acquire/release the test performs against the
//! host is recorded as a [`HostEvent`] for ordering checks.
//!
//! ```
//! use platform::mocks::{Fault, SimHost};
//!
//! let host = SimHost::builder()
//!     .region("rmem_reserved", 0x8000_0000, 0x10_0000)
//!     .region("rmem_fixed", 0x9000_0000, 0x8000)
//!     .fault(Fault::TransferErrors { nth: 0 })
//!     .build();
//! let (dma, memory) = (host.dma(), host.memory());
//! # let _ = (dma, memory);
//! ```

#![cfg(any(test, feature = "std"))]

mod dma;
mod memory;

pub use dma::{MockChannel, MockDescriptor, MockDma};
pub use memory::{MockBinding, MockMemory};

use std::cell::RefCell;
use std::fmt::Write as _;
use std::ptr::NonNull;
use std::rc::Rc;
use std::string::String;
use std::vec::Vec;

use crate::device::DeviceId;
use crate::dma::DmaStatus;
use crate::errno::Errno;
use crate::memory::{PhysAddr, RegionDescriptor};
use crate::random::RandomSource;

/// Device that owns every simulated DMA channel
pub const DMA_CONTROLLER: DeviceId = DeviceId(1);

/// Injected host failure
///
/// `nth` counters are zero-based and count calls over the host's lifetime:
/// memcpy faults count copy attempts (descriptor preparations), allocation
/// faults count `alloc_coherent` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// No memcpy channel is free
    NoChannel,
    /// Binding any region fails with the given errno
    BindFails(Errno),
    /// Creating a child device fails with the given errno
    ChildDeviceFails(Errno),
    /// The nth coherent allocation fails
    AllocFails {
        /// Allocation index
        nth: usize,
    },
    /// Every write-combined mapping fails
    MapFails,
    /// The nth descriptor preparation fails
    PrepareFails {
        /// Copy attempt index
        nth: usize,
    },
    /// The nth copy's submission is rejected
    SubmitFails {
        /// Copy attempt index
        nth: usize,
    },
    /// The nth copy finishes with [`DmaStatus::Error`]
    TransferErrors {
        /// Copy attempt index
        nth: usize,
    },
    /// The nth copy never finishes within the host timeout
    TransferTimesOut {
        /// Copy attempt index
        nth: usize,
    },
    /// The nth copy lands with one bit flipped in the destination
    Corrupt {
        /// Copy attempt index
        nth: usize,
        /// Byte offset into the destination
        byte: usize,
        /// Bit number within the byte
        bit: u8,
    },
}

/// Host-side record of one service call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// Channel handed out
    ChannelRequested(u32),
    /// Channel given back
    ChannelReleased(u32),
    /// Region bound as a device's coherent pool
    RegionBound {
        /// Device the region was bound to
        device: DeviceId,
        /// Region name
        region: &'static str,
    },
    /// Region binding undone
    RegionUnbound {
        /// Device the region was bound to
        device: DeviceId,
        /// Region name
        region: &'static str,
    },
    /// Child device registered
    ChildCreated(DeviceId),
    /// Child device unregistered
    ChildDestroyed(DeviceId),
    /// Coherent buffer allocated
    CoherentAllocated {
        /// Owning device
        device: DeviceId,
        /// Bus address
        phys: PhysAddr,
    },
    /// Coherent buffer freed
    CoherentFreed {
        /// Owning device
        device: DeviceId,
        /// Bus address
        phys: PhysAddr,
    },
    /// Write-combined mapping created
    Mapped(PhysAddr),
    /// Write-combined mapping removed
    Unmapped(PhysAddr),
    /// memcpy descriptor prepared
    Prepared {
        /// Channel id
        channel: u32,
        /// Destination bus address
        dst: PhysAddr,
        /// Source bus address
        src: PhysAddr,
        /// Length in bytes
        len: usize,
    },
    /// Descriptor submitted
    Submitted {
        /// Channel id
        channel: u32,
        /// Returned cookie value
        cookie: i32,
    },
    /// Wait returned
    Waited {
        /// Channel id
        channel: u32,
        /// Final status
        status: DmaStatus,
    },
    /// Channel terminated
    Terminated(u32),
    /// A descriptor was prepared while a submitted one was never terminated
    DirtyChannel(u32),
}

/// Identity of a releasable host resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// DMA channel
    Channel(u32),
    /// Region binding
    Binding(DeviceId, &'static str),
    /// Child device
    Child(DeviceId),
    /// Coherent allocation
    Coherent(PhysAddr),
    /// Write-combined mapping
    Mapping(PhysAddr),
}

/// Direction of a resource event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Resource obtained from the host
    Acquire,
    /// Resource returned to the host
    Release,
}

impl HostEvent {
    /// Resource this event acquires or releases, if any
    pub fn resource(&self) -> Option<(Resource, Edge)> {
        match *self {
            Self::ChannelRequested(id) => Some((Resource::Channel(id), Edge::Acquire)),
            Self::ChannelReleased(id) => Some((Resource::Channel(id), Edge::Release)),
            Self::RegionBound { device, region } => {
                Some((Resource::Binding(device, region), Edge::Acquire))
            }
            Self::RegionUnbound { device, region } => {
                Some((Resource::Binding(device, region), Edge::Release))
            }
            Self::ChildCreated(dev) => Some((Resource::Child(dev), Edge::Acquire)),
            Self::ChildDestroyed(dev) => Some((Resource::Child(dev), Edge::Release)),
            Self::CoherentAllocated { phys, .. } => Some((Resource::Coherent(phys), Edge::Acquire)),
            Self::CoherentFreed { phys, .. } => Some((Resource::Coherent(phys), Edge::Release)),
            Self::Mapped(phys) => Some((Resource::Mapping(phys), Edge::Acquire)),
            Self::Unmapped(phys) => Some((Resource::Mapping(phys), Edge::Release)),
            _ => None,
        }
    }
}

/// One simulated reserved region with its backing store
struct SimRegion {
    name: &'static str,
    base: PhysAddr,
    size: u64,
    backing: NonNull<u8>,
    backing_len: usize,
    /// Bump offset for coherent allocations
    next_alloc: u64,
}

impl SimRegion {
    fn new(name: &'static str, base: u64, size: u64) -> Self {
        let backing_len = usize::try_from(size).unwrap_or(0);
        let boxed: Box<[u8]> = vec![0u8; backing_len].into_boxed_slice();
        let raw = Box::into_raw(boxed).cast::<u8>();
        // Box::into_raw never returns null.
        let backing = NonNull::new(raw).unwrap_or(NonNull::dangling());
        Self {
            name,
            base: PhysAddr(base),
            size,
            backing,
            backing_len,
            next_alloc: 0,
        }
    }

    fn descriptor(&self) -> RegionDescriptor {
        RegionDescriptor {
            name: self.name,
            base: self.base,
            size: self.size,
        }
    }

    /// CPU pointer for `[phys, phys + len)` if the range lies in this region
    fn translate(&self, phys: PhysAddr, len: usize) -> Option<NonNull<u8>> {
        if !self.descriptor().contains(phys, len) {
            return None;
        }
        let offset = usize::try_from(phys.offset_from(self.base)?).ok()?;
        // SAFETY: `contains` proved offset + len <= size == backing_len,
        // so the offset stays inside the backing allocation.
        Some(unsafe { self.backing.add(offset) })
    }
}

impl Drop for SimRegion {
    fn drop(&mut self) {
        let slice = core::ptr::slice_from_raw_parts_mut(self.backing.as_ptr(), self.backing_len);
        // SAFETY: `backing` came from Box::into_raw of a boxed slice of
        // exactly `backing_len` bytes and is released only here.
        drop(unsafe { Box::from_raw(slice) });
    }
}

/// Shared state behind [`MockDma`] and [`MockMemory`]
pub(crate) struct SimState {
    regions: Vec<SimRegion>,
    free_channels: u32,
    next_channel: u32,
    next_child: u32,
    next_cookie: i32,
    bindings: Vec<(DeviceId, usize)>,
    children: Vec<DeviceId>,
    allocations: Vec<(DeviceId, PhysAddr)>,
    mappings: Vec<PhysAddr>,
    faults: Vec<Fault>,
    alloc_calls: usize,
    copy_attempts: usize,
    events: Vec<HostEvent>,
}

impl SimState {
    fn record(&mut self, event: HostEvent) {
        self.events.push(event);
    }

    fn has_fault(&self, pred: impl Fn(&Fault) -> bool) -> bool {
        self.faults.iter().any(pred)
    }

    fn region_by_name(&self, name: &str) -> Option<usize> {
        self.regions.iter().position(|r| r.name == name)
    }

    fn translate(&self, phys: PhysAddr, len: usize) -> Option<NonNull<u8>> {
        self.regions.iter().find_map(|r| r.translate(phys, len))
    }
}

/// Builder for [`SimHost`]
pub struct SimHostBuilder {
    regions: Vec<(&'static str, u64, u64)>,
    channels: u32,
    faults: Vec<Fault>,
}

impl SimHostBuilder {
    /// Register a reserved-memory node backed by `size` bytes of heap
    pub fn region(mut self, name: &'static str, base: u64, size: u64) -> Self {
        self.regions.push((name, base, size));
        self
    }

    /// Number of free memcpy channels (default 1)
    pub fn channels(mut self, count: u32) -> Self {
        self.channels = count;
        self
    }

    /// Inject a failure
    pub fn fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    /// Build the host
    pub fn build(self) -> SimHost {
        let regions = self
            .regions
            .into_iter()
            .map(|(name, base, size)| SimRegion::new(name, base, size))
            .collect();
        SimHost {
            state: Rc::new(RefCell::new(SimState {
                regions,
                free_channels: self.channels,
                next_channel: 0,
                next_child: 0,
                next_cookie: 1,
                bindings: Vec::new(),
                children: Vec::new(),
                allocations: Vec::new(),
                mappings: Vec::new(),
                faults: self.faults,
                alloc_calls: 0,
                copy_attempts: 0,
                events: Vec::new(),
            })),
        }
    }
}

/// Simulated host: DMA engine, reserved memory and physical address space
#[derive(Clone)]
pub struct SimHost {
    state: Rc<RefCell<SimState>>,
}

impl SimHost {
    /// Start building a host
    pub fn builder() -> SimHostBuilder {
        SimHostBuilder {
            regions: Vec::new(),
            channels: 1,
            faults: Vec::new(),
        }
    }

    /// DMA engine view of this host
    pub fn dma(&self) -> MockDma {
        MockDma::new(Rc::clone(&self.state))
    }

    /// Memory services view of this host
    pub fn memory(&self) -> MockMemory {
        MockMemory::new(Rc::clone(&self.state))
    }

    /// Every event recorded so far
    pub fn events(&self) -> Vec<HostEvent> {
        self.state.borrow().events.clone()
    }

    /// Number of recorded events matching `pred`
    pub fn count(&self, pred: impl Fn(&HostEvent) -> bool) -> usize {
        let state = self.state.borrow();
        state.events.iter().filter(|e| pred(e)).count()
    }

    /// Resources acquired and not yet released, oldest first
    pub fn live_resources(&self) -> Vec<Resource> {
        let state = self.state.borrow();
        let mut live = Vec::new();
        for (res, edge) in state.events.iter().filter_map(HostEvent::resource) {
            match edge {
                Edge::Acquire => live.push(res),
                Edge::Release => live.retain(|r| *r != res),
            }
        }
        live
    }

    /// Check that every release undoes the most recent live acquisition and
    /// that nothing is left live.
    ///
    /// Returns a description of the first violation.
    pub fn check_lifo(&self) -> Result<(), String> {
        let mut stack: Vec<Resource> = Vec::new();
        for (i, (res, edge)) in self
            .state
            .borrow()
            .events
            .iter()
            .filter_map(HostEvent::resource)
            .enumerate()
        {
            match edge {
                Edge::Acquire => stack.push(res),
                Edge::Release => match stack.pop() {
                    Some(top) if top == res => {}
                    Some(top) => {
                        return Err(format!(
                            "resource event {i}: released {res:?} while {top:?} was most recent"
                        ))
                    }
                    None => return Err(format!("resource event {i}: released {res:?} twice")),
                },
            }
        }
        if stack.is_empty() {
            Ok(())
        } else {
            let mut msg = String::from("leaked:");
            for res in &stack {
                let _ = write!(msg, " {res:?}");
            }
            Err(msg)
        }
    }

    /// Copy `len` bytes of simulated physical memory out
    pub fn read(&self, phys: PhysAddr, len: usize) -> Option<Vec<u8>> {
        let state = self.state.borrow();
        let ptr = state.translate(phys, len)?;
        // SAFETY: translate() checked the range lies inside a live backing
        // allocation owned by `state`.
        let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), len) };
        Some(bytes.to_vec())
    }

    /// Descriptor of a registered region
    pub fn region(&self, name: &str) -> Option<RegionDescriptor> {
        let state = self.state.borrow();
        state
            .region_by_name(name)
            .and_then(|i| state.regions.get(i))
            .map(SimRegion::descriptor)
    }
}

/// Deterministic xorshift32 generator
#[derive(Debug, Clone)]
pub struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    /// Create a generator; a zero seed is replaced by a fixed non-zero one
    pub const fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 0x2545_f491 } else { seed },
        }
    }
}

impl RandomSource for XorShift32 {
    #[allow(clippy::arithmetic_side_effects)] // constant shifts below 32 bits
    fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }
}

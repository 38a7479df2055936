//! Reserved-memory and DMA allocation abstraction
//!
//! Provides the memory services the transfer test consumes from the host:
//!
//! | Service                | Host primitive (Linux)                 | Used for            |
//! |------------------------|----------------------------------------|---------------------|
//! | bind region to device  | `of_reserved_mem_device_init_by_idx`   | coherent domain     |
//! | ephemeral child device | `device_register` of a child           | alternate domain    |
//! | look up region by name | `of_reserved_mem_lookup`               | fixed region        |
//! | coherent allocation    | `dma_alloc_coherent`                   | `src`, `dst`        |
//! | write-combined mapping | `memremap(.., MEMREMAP_WC)`            | `fix`               |
//!
//! Every allocation and mapping comes back as a [`MemoryView`], a CPU
//! pointer paired with the bus address the DMA engine must use.

use core::fmt;
use core::ptr::NonNull;

use crate::device::DeviceId;
use crate::errno::Errno;

/// Physical (bus) address as seen by the DMA engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhysAddr(pub u64);

impl PhysAddr {
    /// Raw address value
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Address `offset` bytes further on, or `None` on overflow
    pub fn checked_add(self, offset: u64) -> Option<Self> {
        self.0.checked_add(offset).map(Self)
    }

    /// Byte distance from `base` to `self`, or `None` if `self < base`
    pub fn offset_from(self, base: Self) -> Option<u64> {
        self.0.checked_sub(base.0)
    }
}

impl fmt::LowerHex for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// A reserved physical range resolved from a named device-tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegionDescriptor {
    /// Reserved-memory node name
    pub name: &'static str,
    /// First byte of the region
    pub base: PhysAddr,
    /// Region length in bytes
    pub size: u64,
}

impl RegionDescriptor {
    /// Check whether the region can hold `len` bytes
    pub fn holds(&self, len: usize) -> bool {
        u64::try_from(len).is_ok_and(|len| len <= self.size)
    }

    /// Check whether `[addr, addr + len)` lies inside the region
    pub fn contains(&self, addr: PhysAddr, len: usize) -> bool {
        let Some(offset) = addr.offset_from(self.base) else {
            return false;
        };
        u64::try_from(len)
            .ok()
            .and_then(|len| offset.checked_add(len))
            .is_some_and(|end| end <= self.size)
    }
}

/// How the coherent allocation domain over a reserved region is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BindStrategy {
    /// Bind the region directly to the device that owns the DMA channel
    #[default]
    OwnerDevice,
    /// Create an ephemeral child of the channel's device and bind the region
    /// to the child, leaving the parent's own DMA configuration untouched
    ChildDevice,
}

/// CPU-visible window onto physical memory
///
/// Produced by [`ReservedMemory::alloc_coherent`] and
/// [`ReservedMemory::memremap_wc`]. The view itself does not free anything;
/// it must be handed back to the service that produced it.
#[derive(Debug, PartialEq, Eq)]
pub struct MemoryView {
    /// CPU address of the first byte
    pub virt: NonNull<u8>,
    /// Bus address of the first byte
    pub phys: PhysAddr,
    /// Length in bytes
    pub len: usize,
}

/// Host reserved-memory services
///
/// # Safety
///
/// Implementors guarantee that every [`MemoryView`] they return is valid
/// for reads and writes of `len` bytes through `virt`, that `phys` is the
/// bus address of the same bytes, and that no other view returned by this
/// implementation aliases those bytes until the view is freed or unmapped.
/// The transfer test builds slices over views on the strength of this.
pub unsafe trait ReservedMemory {
    /// Proof that a region is bound to a device as its coherent pool
    type Binding;

    /// Bind the named reserved region to `device` as its coherent pool.
    fn bind_region(&self, device: DeviceId, region: &str) -> Result<Self::Binding, Errno>;

    /// Undo [`bind_region`](ReservedMemory::bind_region).
    fn unbind_region(&self, binding: Self::Binding);

    /// Register a child device of `parent` that inherits its DMA configuration.
    fn create_child_device(&self, parent: DeviceId, name: &str) -> Result<DeviceId, Errno>;

    /// Unregister a device created by
    /// [`create_child_device`](ReservedMemory::create_child_device).
    fn destroy_child_device(&self, device: DeviceId);

    /// Resolve a reserved-memory node by name.
    fn lookup_region(&self, region: &str) -> Option<RegionDescriptor>;

    /// Allocate `len` coherent bytes from the pool bound to `device`.
    fn alloc_coherent(&self, device: DeviceId, len: usize) -> Option<MemoryView>;

    /// Return a coherent allocation.
    fn free_coherent(&self, device: DeviceId, view: MemoryView);

    /// Map `len` bytes at `phys` write-combined into the CPU address space.
    fn memremap_wc(&self, phys: PhysAddr, len: usize) -> Option<MemoryView>;

    /// Remove a mapping created by [`memremap_wc`](ReservedMemory::memremap_wc).
    fn memunmap(&self, view: MemoryView);
}

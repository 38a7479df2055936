//! Simulated reserved-memory services

use std::cell::RefCell;
use std::rc::Rc;

use super::{Fault, HostEvent, SimState};
use crate::device::DeviceId;
use crate::errno::Errno;
use crate::memory::{MemoryView, PhysAddr, RegionDescriptor, ReservedMemory};

/// Coherent allocations are aligned to a 64-byte cache line.
const COHERENT_ALIGN_MASK: u64 = 0x3f;

/// Child device ids start here
const CHILD_DEVICE_BASE: u32 = 0x1000;

/// Proof of a region binding handed out by [`MockMemory`]
#[derive(Debug)]
pub struct MockBinding {
    device: DeviceId,
    region: &'static str,
}

/// Reserved-memory services over the simulated address space
pub struct MockMemory {
    state: Rc<RefCell<SimState>>,
}

impl MockMemory {
    pub(super) fn new(state: Rc<RefCell<SimState>>) -> Self {
        Self { state }
    }
}

// SAFETY: every view points into a region backing owned by the shared
// state, which outlives all views handed out. Coherent allocations are bump
// allocated and never overlap. Write-combined mappings only alias coherent
// buffers if a test maps a region it also bound as a pool.
unsafe impl ReservedMemory for MockMemory {
    type Binding = MockBinding;

    fn bind_region(&self, device: DeviceId, region: &str) -> Result<MockBinding, Errno> {
        let mut state = self.state.borrow_mut();
        let fault = state.faults.iter().find_map(|f| match f {
            Fault::BindFails(errno) => Some(*errno),
            _ => None,
        });
        if let Some(errno) = fault {
            return Err(errno);
        }
        let index = state.region_by_name(region).ok_or(Errno::ENODEV)?;
        if state.bindings.iter().any(|(dev, _)| *dev == device) {
            return Err(Errno::EBUSY);
        }
        let name = state.regions.get(index).ok_or(Errno::ENODEV)?.name;
        state.bindings.push((device, index));
        state.record(HostEvent::RegionBound {
            device,
            region: name,
        });
        Ok(MockBinding {
            device,
            region: name,
        })
    }

    fn unbind_region(&self, binding: MockBinding) {
        let mut state = self.state.borrow_mut();
        state.bindings.retain(|(dev, _)| *dev != binding.device);
        state.record(HostEvent::RegionUnbound {
            device: binding.device,
            region: binding.region,
        });
    }

    fn create_child_device(&self, _parent: DeviceId, _name: &str) -> Result<DeviceId, Errno> {
        let mut state = self.state.borrow_mut();
        let fault = state.faults.iter().find_map(|f| match f {
            Fault::ChildDeviceFails(errno) => Some(*errno),
            _ => None,
        });
        if let Some(errno) = fault {
            return Err(errno);
        }
        let child = DeviceId(CHILD_DEVICE_BASE.saturating_add(state.next_child));
        state.next_child = state.next_child.saturating_add(1);
        state.children.push(child);
        state.record(HostEvent::ChildCreated(child));
        Ok(child)
    }

    fn destroy_child_device(&self, device: DeviceId) {
        let mut state = self.state.borrow_mut();
        state.children.retain(|dev| *dev != device);
        state.record(HostEvent::ChildDestroyed(device));
    }

    fn lookup_region(&self, region: &str) -> Option<RegionDescriptor> {
        let state = self.state.borrow();
        let index = state.region_by_name(region)?;
        state.regions.get(index).map(super::SimRegion::descriptor)
    }

    fn alloc_coherent(&self, device: DeviceId, len: usize) -> Option<MemoryView> {
        let mut state = self.state.borrow_mut();
        let call = state.alloc_calls;
        state.alloc_calls = call.saturating_add(1);
        if state.has_fault(|f| *f == Fault::AllocFails { nth: call }) {
            return None;
        }
        let index = state
            .bindings
            .iter()
            .find(|(dev, _)| *dev == device)
            .map(|(_, index)| *index)?;

        let region = state.regions.get(index)?;
        let start = region
            .next_alloc
            .checked_add(COHERENT_ALIGN_MASK)
            .map(|v| v & !COHERENT_ALIGN_MASK)?;
        let end = start.checked_add(u64::try_from(len).ok()?)?;
        if end > region.size {
            return None;
        }
        let phys = region.base.checked_add(start)?;
        let virt = region.translate(phys, len)?;

        if let Some(region) = state.regions.get_mut(index) {
            region.next_alloc = end;
        }
        state.allocations.push((device, phys));
        state.record(HostEvent::CoherentAllocated { device, phys });
        Some(MemoryView { virt, phys, len })
    }

    fn free_coherent(&self, device: DeviceId, view: MemoryView) {
        let mut state = self.state.borrow_mut();
        state
            .allocations
            .retain(|(dev, phys)| !(*dev == device && *phys == view.phys));
        if state.allocations.is_empty() {
            for region in &mut state.regions {
                region.next_alloc = 0;
            }
        }
        state.record(HostEvent::CoherentFreed {
            device,
            phys: view.phys,
        });
    }

    fn memremap_wc(&self, phys: PhysAddr, len: usize) -> Option<MemoryView> {
        let mut state = self.state.borrow_mut();
        if state.has_fault(|f| *f == Fault::MapFails) {
            return None;
        }
        let virt = state.translate(phys, len)?;
        state.mappings.push(phys);
        state.record(HostEvent::Mapped(phys));
        Some(MemoryView { virt, phys, len })
    }

    fn memunmap(&self, view: MemoryView) {
        let mut state = self.state.borrow_mut();
        if let Some(pos) = state.mappings.iter().position(|p| *p == view.phys) {
            state.mappings.remove(pos);
        }
        state.record(HostEvent::Unmapped(view.phys));
    }
}

//! Resource acquisition
//!
//! A run needs, in this order:
//!
//! 1. a memcpy-capable DMA channel
//! 2. a coherent allocation domain over `memory-region` 0, owned by the
//!    channel's device (or an ephemeral child of it)
//! 3. the descriptor of `memory-region` 1, the fixed region under test,
//!    large enough for the buffer length
//! 4. coherent `src` and `dst` buffers from the domain
//! 5. a write-combined mapping of the fixed region, the `fix` buffer
//!
//! Every resource is held by a move-only guard that gives it back to the
//! host exactly once when dropped. [`acquire`] holds each guard in a local
//! until all steps succeed, so a failure at step k drops the guards of
//! steps 1..k-1 in reverse order. [`Resources`] declares its fields in
//! reverse acquisition order, so dropping it after a run is LIFO as well.

use core::mem::ManuallyDrop;

use platform::{
    BindStrategy, DeviceId, DeviceNode, DmaCapabilities, DmaEngine, PhysAddr, RegionDescriptor,
    ReservedMemory,
};

use crate::buffer::{Buffer, BufferRole};
use crate::config::TestConfig;
use crate::error::AcquireError;

/// `memory-region` index of the scratch region holding `src` and `dst`
pub const RESERVED_REGION_INDEX: usize = 0;

/// `memory-region` index of the fixed region under test
pub const FIXED_REGION_INDEX: usize = 1;

/// Exclusive use of one memcpy DMA channel
pub struct ChannelGuard<'e, E: DmaEngine> {
    pub(crate) engine: &'e E,
    pub(crate) chan: ManuallyDrop<E::Channel>,
}

impl<'e, E: DmaEngine> ChannelGuard<'e, E> {
    /// Request a free memcpy channel
    pub fn request(engine: &'e E) -> Result<Self, AcquireError> {
        let chan = engine
            .request_channel(DmaCapabilities::MEMCPY)
            .ok_or(AcquireError::ChannelUnavailable)?;
        Ok(Self {
            engine,
            chan: ManuallyDrop::new(chan),
        })
    }

    /// Device that owns the channel
    pub fn device(&self) -> DeviceId {
        self.engine.channel_device(&self.chan)
    }
}

impl<E: DmaEngine> Drop for ChannelGuard<'_, E> {
    fn drop(&mut self) {
        // SAFETY: drop runs once and `chan` is never touched afterwards.
        let chan = unsafe { ManuallyDrop::take(&mut self.chan) };
        self.engine.release_channel(chan);
        diag!("dma channel released");
    }
}

/// Ephemeral child device created to own a region binding
struct ChildDeviceGuard<'m, M: ReservedMemory> {
    memory: &'m M,
    device: DeviceId,
}

impl<M: ReservedMemory> Drop for ChildDeviceGuard<'_, M> {
    fn drop(&mut self) {
        self.memory.destroy_child_device(self.device);
        diag!("child device {:?} destroyed", self.device);
    }
}

/// Coherent allocation domain over a reserved region
pub struct DomainGuard<'m, M: ReservedMemory> {
    memory: &'m M,
    device: DeviceId,
    binding: ManuallyDrop<M::Binding>,
    // Dropped after the binding is undone.
    _child: Option<ChildDeviceGuard<'m, M>>,
}

impl<'m, M: ReservedMemory> DomainGuard<'m, M> {
    /// Bind `memory-region` `index` of `node` as a coherent pool.
    ///
    /// With [`BindStrategy::OwnerDevice`] the region is bound to `owner`
    /// itself. With [`BindStrategy::ChildDevice`] a child of `owner` is
    /// registered first and the region is bound to the child.
    pub fn bind(
        memory: &'m M,
        owner: DeviceId,
        node: &DeviceNode,
        index: usize,
        strategy: BindStrategy,
    ) -> Result<Self, AcquireError> {
        let region = node
            .memory_region(index)
            .ok_or(AcquireError::RegionMissing { index })?;

        let child = match strategy {
            BindStrategy::OwnerDevice => None,
            BindStrategy::ChildDevice => {
                let device = memory
                    .create_child_device(owner, node.name)
                    .map_err(|errno| AcquireError::RegionBindFailed { index, errno })?;
                Some(ChildDeviceGuard { memory, device })
            }
        };
        let device = child.as_ref().map_or(owner, |c| c.device);

        let binding = memory
            .bind_region(device, region)
            .map_err(|errno| AcquireError::RegionBindFailed { index, errno })?;
        diag!("memory-region {} bound to {:?}", region, device);

        Ok(Self {
            memory,
            device,
            binding: ManuallyDrop::new(binding),
            _child: child,
        })
    }

    /// Device coherent buffers must be allocated for
    pub fn device(&self) -> DeviceId {
        self.device
    }
}

impl<M: ReservedMemory> Drop for DomainGuard<'_, M> {
    fn drop(&mut self) {
        // SAFETY: drop runs once and `binding` is never touched afterwards.
        let binding = unsafe { ManuallyDrop::take(&mut self.binding) };
        self.memory.unbind_region(binding);
        diag!("memory-region unbound from {:?}", self.device);
    }
}

/// Coherent buffer allocated from a [`DomainGuard`]'s pool
pub struct CoherentGuard<'m, M: ReservedMemory> {
    memory: &'m M,
    device: DeviceId,
    buffer: ManuallyDrop<Buffer>,
}

impl<'m, M: ReservedMemory> CoherentGuard<'m, M> {
    /// Allocate `len` coherent bytes for `device`
    pub fn alloc(
        memory: &'m M,
        device: DeviceId,
        len: usize,
        role: BufferRole,
    ) -> Result<Self, AcquireError> {
        let view = memory
            .alloc_coherent(device, len)
            .ok_or(AcquireError::OutOfMemory { buffer: role })?;
        diag!("{} allocated at {:#x}", role.label(), view.phys.as_u64());
        Ok(Self {
            memory,
            device,
            buffer: ManuallyDrop::new(Buffer::new(view, role)),
        })
    }

    /// The buffer
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// The buffer, writable
    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }
}

impl<M: ReservedMemory> Drop for CoherentGuard<'_, M> {
    fn drop(&mut self) {
        // SAFETY: drop runs once and `buffer` is never touched afterwards.
        let buffer = unsafe { ManuallyDrop::take(&mut self.buffer) };
        let role = buffer.role();
        self.memory.free_coherent(self.device, buffer.into_view());
        diag!("{} freed", role.label());
    }
}

/// Write-combined mapping of the fixed region
pub struct MappingGuard<'m, M: ReservedMemory> {
    memory: &'m M,
    buffer: ManuallyDrop<Buffer>,
}

impl<'m, M: ReservedMemory> MappingGuard<'m, M> {
    /// Map `len` bytes at `phys` write-combined
    pub fn map(memory: &'m M, phys: PhysAddr, len: usize) -> Result<Self, AcquireError> {
        let view = memory
            .memremap_wc(phys, len)
            .ok_or(AcquireError::MapFailed)?;
        diag!("fix mapped at {:#x}", view.phys.as_u64());
        Ok(Self {
            memory,
            buffer: ManuallyDrop::new(Buffer::new(view, BufferRole::Fix)),
        })
    }

    /// The buffer
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// The buffer, writable
    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }
}

impl<M: ReservedMemory> Drop for MappingGuard<'_, M> {
    fn drop(&mut self) {
        // SAFETY: drop runs once and `buffer` is never touched afterwards.
        let buffer = unsafe { ManuallyDrop::take(&mut self.buffer) };
        self.memory.memunmap(buffer.into_view());
        diag!("fix unmapped");
    }
}

/// Resolve the fixed region and check it can hold `len` bytes.
pub fn resolve_fixed_region<M: ReservedMemory>(
    memory: &M,
    node: &DeviceNode,
    len: usize,
) -> Result<RegionDescriptor, AcquireError> {
    let index = FIXED_REGION_INDEX;
    let name = node
        .memory_region(index)
        .ok_or(AcquireError::RegionMissing { index })?;
    let region = memory
        .lookup_region(name)
        .ok_or(AcquireError::RegionLookupFailed { index })?;
    if !region.holds(len) {
        return Err(AcquireError::RegionTooSmall {
            index,
            size: region.size,
            required: len,
        });
    }
    Ok(region)
}

/// Everything one run holds
///
/// Fields are declared in reverse acquisition order; Rust drops fields in
/// declaration order, which makes teardown LIFO.
pub struct Resources<'h, E: DmaEngine, M: ReservedMemory> {
    fix: MappingGuard<'h, M>,
    dst: CoherentGuard<'h, M>,
    src: CoherentGuard<'h, M>,
    fixed_region: RegionDescriptor,
    domain: DomainGuard<'h, M>,
    channel: ChannelGuard<'h, E>,
}

/// Mutable borrows of the three run buffers
pub struct RunBuffers<'a> {
    /// Coherent source
    pub src: &'a mut Buffer,
    /// Fixed region window
    pub fix: &'a mut Buffer,
    /// Coherent destination
    pub dst: &'a mut Buffer,
}

impl<'h, E: DmaEngine, M: ReservedMemory> Resources<'h, E, M> {
    /// Lend the channel and the buffers out for a run
    pub fn split(&mut self) -> (&mut ChannelGuard<'h, E>, RunBuffers<'_>) {
        (
            &mut self.channel,
            RunBuffers {
                src: self.src.buffer_mut(),
                fix: self.fix.buffer_mut(),
                dst: self.dst.buffer_mut(),
            },
        )
    }

    /// Descriptor of the fixed region under test
    pub fn fixed_region(&self) -> &RegionDescriptor {
        &self.fixed_region
    }

    /// Device the coherent buffers belong to
    pub fn domain_device(&self) -> DeviceId {
        self.domain.device()
    }

    /// The `src` buffer
    pub fn src(&self) -> &Buffer {
        self.src.buffer()
    }

    /// The `fix` buffer
    pub fn fix(&self) -> &Buffer {
        self.fix.buffer()
    }

    /// The `dst` buffer
    pub fn dst(&self) -> &Buffer {
        self.dst.buffer()
    }
}

/// Acquire all run resources in order.
///
/// On failure everything acquired so far is released, newest first, before
/// the error is returned.
pub fn acquire<'h, E: DmaEngine, M: ReservedMemory>(
    dma: &'h E,
    memory: &'h M,
    node: &DeviceNode,
    config: &TestConfig,
    strategy: BindStrategy,
) -> Result<Resources<'h, E, M>, AcquireError> {
    let len = config.buffer_size();

    let channel = ChannelGuard::request(dma)?;
    let owner = channel.device();
    let domain = DomainGuard::bind(memory, owner, node, RESERVED_REGION_INDEX, strategy)?;
    let fixed_region = resolve_fixed_region(memory, node, len)?;
    let src = CoherentGuard::alloc(memory, domain.device(), len, BufferRole::Src)?;
    let dst = CoherentGuard::alloc(memory, domain.device(), len, BufferRole::Dst)?;
    let fix = MappingGuard::map(memory, fixed_region.base, len)?;

    Ok(Resources {
        fix,
        dst,
        src,
        fixed_region,
        domain,
        channel,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use platform::mocks::{Fault, HostEvent, Resource, SimHost, DMA_CONTROLLER};
    use platform::Errno;

    const NODE: DeviceNode = DeviceNode::new(
        "transfer-test",
        &["test-rmem-transfer"],
        &["rmem_reserved", "rmem_fixed"],
    );

    fn host(faults: &[Fault]) -> SimHost {
        let mut builder = SimHost::builder()
            .region("rmem_reserved", 0x8000_0000, 0x1_0000)
            .region("rmem_fixed", 0x9000_0000, 0x4000);
        for fault in faults {
            builder = builder.fault(*fault);
        }
        builder.build()
    }

    fn config() -> TestConfig {
        TestConfig::new(0x4000, 3).unwrap()
    }

    #[test]
    fn acquires_in_order_and_releases_in_reverse() {
        let host = host(&[]);
        let (dma, mem) = (host.dma(), host.memory());
        {
            let res = acquire(&dma, &mem, &NODE, &config(), BindStrategy::OwnerDevice).unwrap();
            assert_eq!(res.domain_device(), DMA_CONTROLLER);
            assert_eq!(res.fixed_region().base, PhysAddr(0x9000_0000));
            assert_eq!(res.fix().phys(), PhysAddr(0x9000_0000));
            assert_eq!(res.src().len(), 0x4000);
            assert_ne!(res.src().phys(), res.dst().phys());
        }
        let order: Vec<Resource> = host
            .events()
            .iter()
            .filter_map(HostEvent::resource)
            .map(|(res, _)| res)
            .take(5)
            .collect();
        assert!(matches!(order[0], Resource::Channel(_)));
        assert!(matches!(order[1], Resource::Binding(_, "rmem_reserved")));
        assert!(matches!(order[2], Resource::Coherent(_)));
        assert!(matches!(order[3], Resource::Coherent(_)));
        assert!(matches!(order[4], Resource::Mapping(_)));
        host.check_lifo().unwrap();
    }

    #[test]
    fn too_small_fixed_region_fails_before_allocation() {
        let host = SimHost::builder()
            .region("rmem_reserved", 0x8000_0000, 0x1_0000)
            .region("rmem_fixed", 0x9000_0000, 0x2000)
            .build();
        let (dma, mem) = (host.dma(), host.memory());
        let err = acquire(&dma, &mem, &NODE, &config(), BindStrategy::OwnerDevice)
            .err()
            .unwrap();
        assert_eq!(
            err,
            AcquireError::RegionTooSmall {
                index: 1,
                size: 0x2000,
                required: 0x4000
            }
        );
        let allocated = host.count(|e| matches!(e, HostEvent::CoherentAllocated { .. }));
        assert_eq!(allocated, 0);
        host.check_lifo().unwrap();
    }

    #[test]
    fn missing_region_reference() {
        const ONE_REGION: DeviceNode =
            DeviceNode::new("transfer-test", &["test-rmem-transfer"], &["rmem_reserved"]);
        let host = host(&[]);
        let (dma, mem) = (host.dma(), host.memory());
        let config = config();
        let err = acquire(&dma, &mem, &ONE_REGION, &config, BindStrategy::OwnerDevice)
            .err()
            .unwrap();
        assert_eq!(err, AcquireError::RegionMissing { index: 1 });
        host.check_lifo().unwrap();
    }

    #[test]
    fn child_strategy_binds_to_child_and_destroys_it_last() {
        let host = host(&[]);
        let (dma, mem) = (host.dma(), host.memory());
        {
            let res = acquire(&dma, &mem, &NODE, &config(), BindStrategy::ChildDevice).unwrap();
            assert_ne!(res.domain_device(), DMA_CONTROLLER);
        }
        let events = host.events();
        let unbound = events
            .iter()
            .position(|e| matches!(e, HostEvent::RegionUnbound { .. }))
            .unwrap();
        let destroyed = events
            .iter()
            .position(|e| matches!(e, HostEvent::ChildDestroyed(_)))
            .unwrap();
        assert!(unbound < destroyed);
        host.check_lifo().unwrap();
    }

    #[test]
    fn child_creation_failure_is_a_bind_failure() {
        let host = host(&[Fault::ChildDeviceFails(Errno::ENOMEM)]);
        let (dma, mem) = (host.dma(), host.memory());
        let err = acquire(&dma, &mem, &NODE, &config(), BindStrategy::ChildDevice)
            .err()
            .unwrap();
        assert_eq!(
            err,
            AcquireError::RegionBindFailed {
                index: 0,
                errno: Errno::ENOMEM
            }
        );
        host.check_lifo().unwrap();
    }

    #[test]
    fn dst_allocation_failure_frees_src() {
        let host = host(&[Fault::AllocFails { nth: 1 }]);
        let (dma, mem) = (host.dma(), host.memory());
        let err = acquire(&dma, &mem, &NODE, &config(), BindStrategy::OwnerDevice)
            .err()
            .unwrap();
        assert_eq!(
            err,
            AcquireError::OutOfMemory {
                buffer: BufferRole::Dst
            }
        );
        let freed = host.count(|e| matches!(e, HostEvent::CoherentFreed { .. }));
        assert_eq!(freed, 1);
        host.check_lifo().unwrap();
    }
}

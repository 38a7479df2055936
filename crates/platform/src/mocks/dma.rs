//! Simulated memcpy DMA engine

use std::cell::RefCell;
use std::rc::Rc;

use super::{Fault, HostEvent, SimState, DMA_CONTROLLER};
use crate::device::DeviceId;
use crate::dma::{Cookie, DmaCapabilities, DmaEngine, DmaStatus, PrepFlags};
use crate::memory::PhysAddr;

/// Channel handed out by [`MockDma`]
#[derive(Debug)]
pub struct MockChannel {
    id: u32,
    device: DeviceId,
    queued: Option<(Cookie, MockDescriptor)>,
    /// Set on submit, cleared by terminate
    dirty: bool,
}

impl MockChannel {
    /// Channel id used in [`HostEvent`]s
    pub fn id(&self) -> u32 {
        self.id
    }
}

/// Prepared memcpy
#[derive(Debug, Clone, Copy)]
pub struct MockDescriptor {
    dst: PhysAddr,
    src: PhysAddr,
    len: usize,
    attempt: usize,
}

/// DMA engine over the simulated address space
///
/// Copies happen in [`sync_wait`](DmaEngine::sync_wait), so a rejected or
/// failed operation never touches memory.
pub struct MockDma {
    state: Rc<RefCell<SimState>>,
}

impl MockDma {
    pub(super) fn new(state: Rc<RefCell<SimState>>) -> Self {
        Self { state }
    }

    #[allow(clippy::arithmetic_side_effects)] // bit & 7 keeps the shift in range
    fn complete(state: &SimState, desc: &MockDescriptor) -> DmaStatus {
        let (Some(src), Some(dst)) = (
            state.translate(desc.src, desc.len),
            state.translate(desc.dst, desc.len),
        ) else {
            return DmaStatus::Error;
        };
        // SAFETY: both ranges were bounds-checked against live region
        // backings; ptr::copy tolerates overlap.
        unsafe { core::ptr::copy(src.as_ptr(), dst.as_ptr(), desc.len) };

        for fault in &state.faults {
            if let Fault::Corrupt { nth, byte, bit } = *fault {
                if nth == desc.attempt && byte < desc.len {
                    // SAFETY: byte < len, inside the destination range above.
                    unsafe { *dst.as_ptr().add(byte) ^= 1u8 << (bit & 7) };
                }
            }
        }
        DmaStatus::Complete
    }
}

impl DmaEngine for MockDma {
    type Channel = MockChannel;
    type Descriptor = MockDescriptor;

    fn request_channel(&self, caps: DmaCapabilities) -> Option<MockChannel> {
        let mut state = self.state.borrow_mut();
        if !DmaCapabilities::MEMCPY.contains(caps) || state.has_fault(|f| *f == Fault::NoChannel) {
            return None;
        }
        state.free_channels = state.free_channels.checked_sub(1)?;
        let id = state.next_channel;
        state.next_channel = id.wrapping_add(1);
        state.record(HostEvent::ChannelRequested(id));
        Some(MockChannel {
            id,
            device: DMA_CONTROLLER,
            queued: None,
            dirty: false,
        })
    }

    fn channel_device(&self, chan: &MockChannel) -> DeviceId {
        chan.device
    }

    fn prep_dma_memcpy(
        &self,
        chan: &mut MockChannel,
        dst: PhysAddr,
        src: PhysAddr,
        len: usize,
        _flags: PrepFlags,
    ) -> Option<MockDescriptor> {
        let mut state = self.state.borrow_mut();
        let attempt = state.copy_attempts;
        state.copy_attempts = attempt.saturating_add(1);
        if chan.dirty {
            state.record(HostEvent::DirtyChannel(chan.id));
        }
        if state.has_fault(|f| *f == Fault::PrepareFails { nth: attempt }) {
            return None;
        }
        state.record(HostEvent::Prepared {
            channel: chan.id,
            dst,
            src,
            len,
        });
        Some(MockDescriptor {
            dst,
            src,
            len,
            attempt,
        })
    }

    fn submit(&self, chan: &mut MockChannel, desc: MockDescriptor) -> Cookie {
        let mut state = self.state.borrow_mut();
        if state.has_fault(|f| *f == Fault::SubmitFails { nth: desc.attempt }) {
            state.record(HostEvent::Submitted {
                channel: chan.id,
                cookie: Cookie::REJECTED.0,
            });
            return Cookie::REJECTED;
        }
        let cookie = Cookie(state.next_cookie);
        state.next_cookie = state.next_cookie.checked_add(1).unwrap_or(1);
        chan.queued = Some((cookie, desc));
        chan.dirty = true;
        state.record(HostEvent::Submitted {
            channel: chan.id,
            cookie: cookie.0,
        });
        cookie
    }

    fn sync_wait(&self, chan: &mut MockChannel, cookie: Cookie) -> DmaStatus {
        let mut state = self.state.borrow_mut();
        let status = match chan.queued {
            Some((queued, desc)) if queued == cookie => {
                if state.has_fault(|f| *f == Fault::TransferErrors { nth: desc.attempt }) {
                    chan.queued = None;
                    DmaStatus::Error
                } else if state.has_fault(|f| *f == Fault::TransferTimesOut { nth: desc.attempt }) {
                    // Stays queued until the channel is terminated.
                    DmaStatus::InProgress
                } else {
                    chan.queued = None;
                    Self::complete(&state, &desc)
                }
            }
            _ => DmaStatus::Error,
        };
        state.record(HostEvent::Waited {
            channel: chan.id,
            status,
        });
        status
    }

    fn terminate_sync(&self, chan: &mut MockChannel) {
        chan.queued = None;
        chan.dirty = false;
        let mut state = self.state.borrow_mut();
        state.record(HostEvent::Terminated(chan.id));
    }

    fn release_channel(&self, chan: MockChannel) {
        let mut state = self.state.borrow_mut();
        state.free_channels = state.free_channels.saturating_add(1);
        state.record(HostEvent::ChannelReleased(chan.id));
    }
}

//! DMA engine abstraction layer
//!
//! Mirrors the host's dmaengine client interface: request a channel by
//! capability, prepare a memcpy descriptor, submit it, wait for the
//! cookie to complete, then terminate the channel so it is clean for the
//! next descriptor.
//!
//! The channel is an owned token. Only the holder can prepare descriptors
//! on it, and giving it back via [`DmaEngine::release_channel`] consumes it.

use core::fmt;

use bitflags::bitflags;

use crate::device::DeviceId;
use crate::memory::PhysAddr;

bitflags! {
    /// Channel capabilities used to filter channel requests
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DmaCapabilities: u32 {
        /// Memory-to-memory copy
        const MEMCPY = 1 << 0;
        /// Peripheral (slave) transfers
        const SLAVE = 1 << 1;
        /// Cyclic transfers
        const CYCLIC = 1 << 2;
        /// Interleaved transfers
        const INTERLEAVE = 1 << 3;
    }
}

bitflags! {
    /// Descriptor preparation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PrepFlags: u32 {
        /// Raise a completion interrupt
        const INTERRUPT = 1 << 0;
        /// Descriptor may be reclaimed by the engine once complete
        const ACK = 1 << 1;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DmaCapabilities {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "DmaCapabilities({=u32:#x})", self.bits());
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PrepFlags {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "PrepFlags({=u32:#x})", self.bits());
    }
}

/// Submission token returned by [`DmaEngine::submit`]
///
/// Negative values mean the engine rejected the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cookie(pub i32);

impl Cookie {
    /// Rejected submission
    pub const REJECTED: Self = Self(-1);

    /// Check whether the submission was rejected
    pub const fn is_error(self) -> bool {
        self.0 < 0
    }
}

/// Final state of a submitted operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaStatus {
    /// Operation finished successfully
    Complete,
    /// Operation still running (the wait timed out)
    InProgress,
    /// Channel was paused
    Paused,
    /// Engine reported an error
    Error,
}

impl fmt::Display for DmaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::InProgress => write!(f, "in progress"),
            Self::Paused => write!(f, "paused"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// DMA engine client interface
///
/// All methods take `&self`: the engine is a shared host service, and the
/// per-operation state lives in the [`Channel`](DmaEngine::Channel) token.
pub trait DmaEngine {
    /// Exclusive handle to one channel
    type Channel;
    /// Prepared, not yet submitted descriptor
    type Descriptor;

    /// Request a free channel that has every capability in `caps`.
    ///
    /// Returns `None` when no such channel is free right now.
    fn request_channel(&self, caps: DmaCapabilities) -> Option<Self::Channel>;

    /// Device that owns the channel (the DMA controller).
    ///
    /// Buffers handed to this channel must be allocated for this device.
    fn channel_device(&self, chan: &Self::Channel) -> DeviceId;

    /// Prepare a memcpy of `len` bytes from `src` to `dst`.
    ///
    /// Returns `None` if the engine cannot describe the copy. A failed
    /// preparation leaves the channel untouched.
    fn prep_dma_memcpy(
        &self,
        chan: &mut Self::Channel,
        dst: PhysAddr,
        src: PhysAddr,
        len: usize,
        flags: PrepFlags,
    ) -> Option<Self::Descriptor>;

    /// Queue a prepared descriptor on the channel.
    fn submit(&self, chan: &mut Self::Channel, desc: Self::Descriptor) -> Cookie;

    /// Block until the operation identified by `cookie` reaches a final
    /// state or the host timeout expires.
    fn sync_wait(&self, chan: &mut Self::Channel, cookie: Cookie) -> DmaStatus;

    /// Abort anything in flight and wait until the channel is idle.
    fn terminate_sync(&self, chan: &mut Self::Channel);

    /// Give the channel back to the engine.
    fn release_channel(&self, chan: Self::Channel);
}

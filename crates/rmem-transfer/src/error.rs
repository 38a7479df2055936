//! Error taxonomy
//!
//! Acquisition errors abort the run and fail the attach. Transfer errors
//! abort the remaining steps of one stage only and are reported through the
//! log stream. Checksum mismatches are findings, not errors.

use platform::{DmaStatus, Errno};

use crate::buffer::BufferRole;
use crate::config::ChannelPolicy;
use crate::verify::Report;

/// Invalid tunable values
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Buffer length of zero
    #[error("buffer size must be non-zero")]
    ZeroBufferSize,
    /// Buffer length not word aligned
    #[error("buffer size {size} is not a multiple of 4")]
    UnalignedBufferSize {
        /// Requested length
        size: u32,
    },
    /// Buffer length does not fit the address space
    #[error("buffer size {size} exceeds the address space")]
    BufferTooLarge {
        /// Requested length
        size: u32,
    },
    /// Mode bits outside DMA/CPU
    #[error("unknown test mode bits {bits:#x}")]
    UnknownModeBits {
        /// Requested mode
        bits: u32,
    },
}

/// Malformed module-argument string
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParamError {
    /// Argument without `=value`
    #[error("parameter without value")]
    MissingValue,
    /// Value is not an unsigned 32-bit integer
    #[error("invalid parameter value")]
    InvalidValue,
    /// Name is neither `buffer_size` nor `test_mode`
    #[error("unknown parameter")]
    UnknownParameter,
}

/// Failure while acquiring run resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquireError {
    /// No free memcpy-capable channel
    #[error("failed to request dma channel")]
    ChannelUnavailable,
    /// The node has no `memory-region` entry at `index`
    #[error("no memory-region found for index {index}")]
    RegionMissing {
        /// `memory-region` index
        index: usize,
    },
    /// The host refused to bind the region (or to create the child device)
    #[error("failed to bind memory-region {index}: {errno}")]
    RegionBindFailed {
        /// `memory-region` index
        index: usize,
        /// Host error
        errno: Errno,
    },
    /// The referenced node does not resolve to a reserved region
    #[error("failed to lookup memory-region {index}")]
    RegionLookupFailed {
        /// `memory-region` index
        index: usize,
    },
    /// The fixed region is smaller than the buffer length
    #[error("the size of memory-region {index} not enough ({size:#x} < {required:#x})")]
    RegionTooSmall {
        /// `memory-region` index
        index: usize,
        /// Region size
        size: u64,
        /// Configured buffer length
        required: usize,
    },
    /// Coherent allocation failed
    #[error("failed to alloc '{buffer}' memory")]
    OutOfMemory {
        /// Buffer that could not be allocated
        buffer: BufferRole,
    },
    /// Write-combined mapping of the fixed region failed
    #[error("failed to map 'fix' memory")]
    MapFailed,
}

/// Failure of one DMA copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferError {
    /// The engine could not describe the copy
    #[error("failed to prepare dma")]
    PrepareFailed,
    /// The engine rejected the descriptor
    #[error("failed to submit dma")]
    SubmitFailed,
    /// The copy ended in a non-complete state
    #[error("failed to transfer dma ({status})")]
    TransferFailed {
        /// Final engine status
        status: DmaStatus,
    },
}

/// Attach failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProbeError {
    /// Node does not carry the driver's compatible string
    #[error("device not compatible")]
    NotCompatible,
    /// Tunables failed validation
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// Resource acquisition failed
    #[error("{0}")]
    Acquire(#[from] AcquireError),
}

impl ProbeError {
    /// Errno reported to the host driver model
    pub fn errno(&self, policy: ChannelPolicy) -> Errno {
        match self {
            Self::NotCompatible => Errno::ENODEV,
            Self::Config(_) => Errno::EINVAL,
            Self::Acquire(err) => match err {
                AcquireError::ChannelUnavailable => match policy {
                    ChannelPolicy::Defer => Errno::EPROBE_DEFER,
                    ChannelPolicy::Fail => Errno::ENODEV,
                },
                AcquireError::RegionMissing { .. } | AcquireError::RegionLookupFailed { .. } => {
                    Errno::ENODEV
                }
                AcquireError::RegionBindFailed { errno, .. } => *errno,
                AcquireError::RegionTooSmall { .. }
                | AcquireError::OutOfMemory { .. }
                | AcquireError::MapFailed => Errno::ENOMEM,
            },
        }
    }
}

/// Attach result in the host convention: 0 when attached, negative errno otherwise
pub fn probe_status(result: &Result<Report, ProbeError>, policy: ChannelPolicy) -> i32 {
    match result {
        Ok(_) => 0,
        Err(err) => err.errno(policy).to_status(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_policy_selects_errno() {
        let err = ProbeError::Acquire(AcquireError::ChannelUnavailable);
        assert_eq!(err.errno(ChannelPolicy::Defer), Errno::EPROBE_DEFER);
        assert_eq!(err.errno(ChannelPolicy::Fail), Errno::ENODEV);
    }

    #[test]
    fn bind_failure_passes_host_errno_through() {
        let err = ProbeError::from(AcquireError::RegionBindFailed {
            index: 0,
            errno: Errno::EBUSY,
        });
        assert_eq!(err.errno(ChannelPolicy::default()), Errno::EBUSY);
    }

    #[test]
    fn status_is_negative_errno() {
        let err: Result<Report, ProbeError> = Err(AcquireError::RegionTooSmall {
            index: 1,
            size: 8192,
            required: 16384,
        }
        .into());
        assert_eq!(probe_status(&err, ChannelPolicy::Defer), -12);

        let ok: Result<Report, ProbeError> = Ok(Report::new());
        assert_eq!(probe_status(&ok, ChannelPolicy::Defer), 0);
    }

    #[test]
    fn messages_name_the_failed_step() {
        let err = AcquireError::OutOfMemory {
            buffer: BufferRole::Dst,
        };
        assert_eq!(format!("{err}"), "failed to alloc 'dst' memory");
        let err = AcquireError::RegionTooSmall {
            index: 1,
            size: 0x2000,
            required: 0x4000,
        };
        assert_eq!(
            format!("{err}"),
            "the size of memory-region 1 not enough (0x2000 < 0x4000)"
        );
        let err = TransferError::TransferFailed {
            status: DmaStatus::Error,
        };
        assert_eq!(format!("{err}"), "failed to transfer dma (error)");
    }
}

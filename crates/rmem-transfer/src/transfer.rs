//! Synchronous DMA memcpy
//!
//! One copy is the full handshake on the owned channel:
//!
//! ```text
//! prep_dma_memcpy ──None──────────────────────────────► PrepareFailed
//!        │
//!      submit ──rejected──► terminate_sync ───────────► SubmitFailed
//!        │
//!    sync_wait ─────────► terminate_sync ─┬─complete──► Ok
//!                                         └─otherwise─► TransferFailed
//! ```
//!
//! Every path that reached `submit` terminates the channel before
//! returning, so the next copy starts on a clean channel. A failed
//! preparation never touched the channel and leaves it alone.

use platform::{DmaEngine, DmaStatus, PhysAddr, PrepFlags};

use crate::acquire::ChannelGuard;
use crate::error::TransferError;

impl<E: DmaEngine> ChannelGuard<'_, E> {
    /// Copy `len` bytes from `src` to `dst`, blocking until the engine is done.
    pub fn copy(&mut self, dst: PhysAddr, src: PhysAddr, len: usize) -> Result<(), TransferError> {
        let flags = PrepFlags::INTERRUPT | PrepFlags::ACK;
        let desc = self
            .engine
            .prep_dma_memcpy(&mut self.chan, dst, src, len, flags)
            .ok_or(TransferError::PrepareFailed)?;

        let cookie = self.engine.submit(&mut self.chan, desc);
        if cookie.is_error() {
            self.engine.terminate_sync(&mut self.chan);
            return Err(TransferError::SubmitFailed);
        }

        let status = self.engine.sync_wait(&mut self.chan, cookie);
        self.engine.terminate_sync(&mut self.chan);
        diag!("dma {:#x} -> {:#x}: {}", src.as_u64(), dst.as_u64(), status);

        match status {
            DmaStatus::Complete => Ok(()),
            status => Err(TransferError::TransferFailed { status }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use platform::mocks::{Fault, HostEvent, SimHost};

    const FIX: PhysAddr = PhysAddr(0x9000_0000);
    const SCRATCH: PhysAddr = PhysAddr(0x9000_1000);

    fn host(fault: Option<Fault>) -> SimHost {
        let builder = SimHost::builder().region("rmem_fixed", 0x9000_0000, 0x4000);
        match fault {
            Some(f) => builder.fault(f).build(),
            None => builder.build(),
        }
    }

    fn terminated(host: &SimHost) -> usize {
        host.count(|e| matches!(e, HostEvent::Terminated(_)))
    }

    #[test]
    fn successful_copy_terminates_once() {
        let host = host(None);
        let dma = host.dma();
        let mut chan = ChannelGuard::request(&dma).unwrap();
        chan.copy(SCRATCH, FIX, 64).unwrap();
        assert_eq!(terminated(&host), 1);
        assert_eq!(host.read(FIX, 64), host.read(SCRATCH, 64));
    }

    #[test]
    fn prepare_failure_leaves_channel_alone() {
        let host = host(Some(Fault::PrepareFails { nth: 0 }));
        let dma = host.dma();
        let mut chan = ChannelGuard::request(&dma).unwrap();
        let copied = chan.copy(SCRATCH, FIX, 64);
        assert_eq!(copied, Err(TransferError::PrepareFailed));
        assert_eq!(terminated(&host), 0);
        assert_eq!(host.count(|e| matches!(e, HostEvent::Submitted { .. })), 0);
    }

    #[test]
    fn rejected_submit_terminates() {
        let host = host(Some(Fault::SubmitFails { nth: 0 }));
        let dma = host.dma();
        let mut chan = ChannelGuard::request(&dma).unwrap();
        let copied = chan.copy(SCRATCH, FIX, 64);
        assert_eq!(copied, Err(TransferError::SubmitFailed));
        assert_eq!(terminated(&host), 1);
        assert_eq!(host.count(|e| matches!(e, HostEvent::Waited { .. })), 0);
    }

    #[test]
    fn error_and_timeout_terminate_and_report_status() {
        for (fault, status) in [
            (Fault::TransferErrors { nth: 0 }, DmaStatus::Error),
            (Fault::TransferTimesOut { nth: 0 }, DmaStatus::InProgress),
        ] {
            let host = host(Some(fault));
            let dma = host.dma();
            let mut chan = ChannelGuard::request(&dma).unwrap();
            assert_eq!(
                chan.copy(SCRATCH, FIX, 64),
                Err(TransferError::TransferFailed { status })
            );
            assert_eq!(terminated(&host), 1);
        }
    }

    #[test]
    fn channel_is_reusable_after_every_outcome() {
        for fault in [
            Fault::PrepareFails { nth: 0 },
            Fault::SubmitFails { nth: 0 },
            Fault::TransferErrors { nth: 0 },
            Fault::TransferTimesOut { nth: 0 },
        ] {
            let host = host(Some(fault));
            let dma = host.dma();
            let mut chan = ChannelGuard::request(&dma).unwrap();
            assert!(chan.copy(SCRATCH, FIX, 64).is_err());
            chan.copy(SCRATCH, FIX, 64).unwrap();
            chan.copy(FIX, SCRATCH, 64).unwrap();
            let dirty = host.count(|e| matches!(e, HostEvent::DirtyChannel(_)));
            let requested = host.count(|e| matches!(e, HostEvent::ChannelRequested(_)));
            assert_eq!((dirty, requested), (0, 1));
        }
    }
}

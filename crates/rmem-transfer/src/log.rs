//! Debug diagnostics backend selection
//!
//! `defmt` wins when both backends are enabled. With neither, the arguments
//! are still type-checked so a build without logging catches the same bugs.
//! Arguments must implement `defmt::Format` and `Display`/`Debug` as used.
//!
//! Under `tracing` the diagnostics use their own target, `rmem_transfer::diag`,
//! apart from the run events, so a host can filter them out with e.g.
//! `RUST_LOG=rmem_transfer=debug,rmem_transfer::diag=off`.

/// `tracing` target of guard and DMA handshake diagnostics
#[cfg(all(feature = "tracing", not(feature = "defmt")))]
pub(crate) const DIAG_TARGET: &str = "rmem_transfer::diag";

macro_rules! diag {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::debug!($($arg)*);
        #[cfg(all(feature = "tracing", not(feature = "defmt")))]
        tracing::debug!(target: $crate::log::DIAG_TARGET, $($arg)*);
        #[cfg(not(any(feature = "defmt", feature = "tracing")))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}

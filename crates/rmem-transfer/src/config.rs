//! Test configuration
//!
//! Two tunables drive a run: the buffer length and the stage selector.
//! They are runtime-writable (module parameters on the host) and held in
//! atomics; [`ModuleParams::snapshot`] reads and validates them exactly once
//! at the start of each attach, so a write only affects the next run.
//!
//! # Example
//!
//! ```
//! use rmem_transfer::{ModuleParams, TestMode};
//!
//! static PARAMS: ModuleParams = ModuleParams::new();
//!
//! PARAMS.apply_args("buffer_size=4096 test_mode=0x1").unwrap();
//! let config = PARAMS.snapshot().unwrap();
//! assert_eq!(config.buffer_size(), 4096);
//! assert_eq!(config.mode(), TestMode::DMA);
//! ```

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;
use platform::BindStrategy;

use crate::error::{ConfigError, ParamError};

/// Default buffer length in bytes
pub const DEFAULT_BUFFER_SIZE: u32 = 16384;

/// Default stage selector (both stages)
pub const DEFAULT_TEST_MODE: u32 = 0b11;

bitflags! {
    /// Stage selector
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TestMode: u32 {
        /// Run the DMA copy stage
        const DMA = 1 << 0;
        /// Run the CPU copy stage
        const CPU = 1 << 1;
    }
}

impl Default for TestMode {
    fn default() -> Self {
        Self::DMA | Self::CPU
    }
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.bits())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TestMode {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=u32:#x}", self.bits());
    }
}

/// Validated, immutable configuration of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TestConfig {
    buffer_size: usize,
    mode: TestMode,
}

impl TestConfig {
    /// Validate raw parameter values.
    ///
    /// The buffer length must be non-zero and a multiple of 4 (buffers are
    /// filled a 32-bit word at a time). Mode bits other than DMA/CPU are
    /// rejected; a mode of 0 is valid and runs no stage.
    pub fn new(buffer_size: u32, mode_bits: u32) -> Result<Self, ConfigError> {
        if buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        if buffer_size & 0b11 != 0 {
            return Err(ConfigError::UnalignedBufferSize { size: buffer_size });
        }
        let mode = TestMode::from_bits(mode_bits)
            .ok_or(ConfigError::UnknownModeBits { bits: mode_bits })?;
        let buffer_size = usize::try_from(buffer_size)
            .map_err(|_| ConfigError::BufferTooLarge { size: buffer_size })?;
        Ok(Self { buffer_size, mode })
    }

    /// Buffer length in bytes
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Selected stages
    pub const fn mode(&self) -> TestMode {
        self.mode
    }

    /// DMA stage selected (mode bit 0)
    pub const fn dma_enabled(&self) -> bool {
        self.mode.contains(TestMode::DMA)
    }

    /// CPU stage selected (mode bit 1)
    pub const fn cpu_enabled(&self) -> bool {
        self.mode.contains(TestMode::CPU)
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE as usize,
            mode: TestMode::default(),
        }
    }
}

/// Runtime-writable tunables
///
/// Meant to live in a `static`; all accessors take `&self`.
#[derive(Debug)]
pub struct ModuleParams {
    buffer_size: AtomicU32,
    test_mode: AtomicU32,
}

impl ModuleParams {
    /// Parameters holding their defaults
    pub const fn new() -> Self {
        Self {
            buffer_size: AtomicU32::new(DEFAULT_BUFFER_SIZE),
            test_mode: AtomicU32::new(DEFAULT_TEST_MODE),
        }
    }

    /// Current raw buffer length
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size.load(Ordering::Relaxed)
    }

    /// Current raw mode bits
    pub fn test_mode(&self) -> u32 {
        self.test_mode.load(Ordering::Relaxed)
    }

    /// Set the buffer length used by the next run
    pub fn set_buffer_size(&self, size: u32) {
        self.buffer_size.store(size, Ordering::Relaxed);
    }

    /// Set the mode bits used by the next run
    pub fn set_test_mode(&self, bits: u32) {
        self.test_mode.store(bits, Ordering::Relaxed);
    }

    /// Read both raw values once, as `(buffer_size, test_mode)`
    pub fn load(&self) -> (u32, u32) {
        (self.buffer_size(), self.test_mode())
    }

    /// Read both parameters once and validate them
    pub fn snapshot(&self) -> Result<TestConfig, ConfigError> {
        let (buffer_size, test_mode) = self.load();
        TestConfig::new(buffer_size, test_mode)
    }

    /// Apply a host module-argument string such as
    /// `"buffer_size=8192 test_mode=2"`.
    ///
    /// `test_buf_size` is accepted as an alias of `buffer_size`. Values
    /// follow the host's unsigned parsing: decimal, `0x` hex or leading-zero
    /// octal. Nothing is stored unless every argument parses.
    pub fn apply_args(&self, args: &str) -> Result<(), ParamError> {
        let mut buffer_size = None;
        let mut test_mode = None;
        for arg in args.split_whitespace() {
            let (key, value) = arg.split_once('=').ok_or(ParamError::MissingValue)?;
            let value = parse_uint(value).ok_or(ParamError::InvalidValue)?;
            match key {
                "buffer_size" | "test_buf_size" => buffer_size = Some(value),
                "test_mode" => test_mode = Some(value),
                _ => return Err(ParamError::UnknownParameter),
            }
        }
        if let Some(size) = buffer_size {
            self.set_buffer_size(size);
        }
        if let Some(bits) = test_mode {
            self.set_test_mode(bits);
        }
        Ok(())
    }
}

impl Default for ModuleParams {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_uint(s: &str) -> Option<u32> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if s.len() > 1 && s.starts_with('0') {
        u32::from_str_radix(s.get(1..)?, 8).ok()
    } else {
        s.parse().ok()
    }
}

/// What to report when no memcpy channel is free
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelPolicy {
    /// Ask the host to retry the attach later (`-EPROBE_DEFER`)
    #[default]
    Defer,
    /// Fail the attach outright (`-ENODEV`)
    Fail,
}

/// Host-convention choices for a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProbeOptions {
    /// Errno policy for an unavailable channel
    pub channel_policy: ChannelPolicy,
    /// How the coherent domain over region 0 is obtained
    pub bind_strategy: BindStrategy,
}

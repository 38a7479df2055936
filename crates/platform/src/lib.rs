//! Host collaborator abstractions for the reserved-memory transfer test
//!
//! The transfer test never talks to hardware directly. Everything it needs
//! from the host kernel or firmware is expressed as a trait in this crate,
//! so the test core can run unchanged on a real SoC and against the
//! simulated host used by the test suite.
//!
//! # Architecture Layers
//!
//! ```text
//! Driver model (host: discovers the node, calls probe)
//!         ↓
//! rmem-transfer (acquire → copy/verify → release)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Host DMA engine, reserved-memory and allocator services
//! ```
//!
//! # Collaborators
//!
//! - [`DmaEngine`] - channel request, memcpy descriptors, submit/wait/terminate
//! - [`ReservedMemory`] - reserved-region binding, coherent allocation, WC mapping
//! - [`DeviceNode`] - the parsed device-tree node the test binds to
//! - [`RandomSource`] - pseudo-random words for buffer contents
//!
//! # Features
//!
//! - `std`: Enable standard library support and the simulated host in [`mocks`]
//! - `defmt`: Enable `defmt::Format` on all platform types
//!
//! # Example
//!
//! ```no_run
//! use platform::{DmaCapabilities, DmaEngine};
//!
//! fn has_memcpy_channel<E: DmaEngine>(engine: &E) -> bool {
//!     match engine.request_channel(DmaCapabilities::MEMCPY) {
//!         Some(chan) => {
//!             engine.release_channel(chan);
//!             true
//!         }
//!         None => false,
//!     }
//! }
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this HAL crate:
#![allow(clippy::doc_markdown)] // hex addresses and register names in doc comments
#![allow(clippy::must_use_candidate)] // host accessors - callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod device;
pub mod dma;
pub mod errno;
pub mod memory;
pub mod random;

#[cfg(any(test, feature = "std"))]
pub mod mocks;

// Re-export main collaborator traits
pub use device::{DeviceId, DeviceNode};
pub use dma::{Cookie, DmaCapabilities, DmaEngine, DmaStatus, PrepFlags};
pub use errno::Errno;
pub use memory::{BindStrategy, MemoryView, PhysAddr, RegionDescriptor, ReservedMemory};
pub use random::RandomSource;

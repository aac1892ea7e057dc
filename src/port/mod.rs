//! Port layer — CPU- and board-specific glue
//!
//! Everything here is bit-exact cooperation with the Cortex-M0+/ARMv6-M
//! exception model: the naked PendSV handler, the tick alarm ISR, and
//! the core-identity read. A host stub stands in for `cargo test`.

#[cfg(target_arch = "arm")]
mod rp2040;
#[cfg(target_arch = "arm")]
pub use rp2040::*;

#[cfg(not(target_arch = "arm"))]
mod stub;
#[cfg(not(target_arch = "arm"))]
pub use stub::*;

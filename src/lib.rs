//! # trapgate
//!
//! Interrupt core for a 32-bit protected-mode kernel: builds and installs the
//! interrupt descriptor table, routes every vector through one dispatcher
//! that saves the trapped thread, runs its handler, lets the scheduler pick
//! who runs next and hands back the state to resume.
//!
//! ## Layout
//!
//! - `interrupts`: gate table, trampoline arithmetic, handler registry,
//!   dispatcher and the default fault handler
//! - `data_structures`: the interrupt-safe ring buffer
//! - `thread`: the scheduler seam and a fixed-size round-robin thread table
//! - `platform`: the CPU/console seam everything privileged goes through
//! - `devices`: the PS/2 keyboard producer
//! - `arch::i386`: entry stubs and the hardware `Platform` (x86 targets only)

#![cfg_attr(not(test), no_std)]

pub mod data_structures;
pub mod devices;
pub mod interrupts;
pub mod platform;
pub mod thread;

#[cfg(target_arch = "x86")]
pub mod arch;

#[cfg(test)]
mod testing;

pub use interrupts::{InterruptConfig, InterruptController, InterruptError};
pub use platform::{AddressSpace, Platform};
pub use thread::{Scheduler, ThreadTable};

//! Device Subsystem
//!
//! Interrupt-driven device producers:
//! - `drivers`: PS/2 keyboard

pub mod drivers;

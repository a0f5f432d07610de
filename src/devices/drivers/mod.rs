//! Device Drivers
//!
//! - PS/2 Keyboard (IRQ1)

pub mod ps2_keyboard;

pub use ps2_keyboard::{handle_keyboard, init_keyboard, next_key, KeyState, KeyboardQueue};

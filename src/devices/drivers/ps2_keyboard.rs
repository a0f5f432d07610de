//! # PS/2 Keyboard Driver
//!
//! Producer side of keyboard input. The IRQ1 handler reads one scancode per
//! interrupt and queues it; normal code drains the queue with [`next_key`].
//!
//! ```text
//! ┌─────────────┐  IRQ1 (0x21)  ┌────────────────┐  next_key()  ┌──────────┐
//! │  Keyboard   │──────────────▶│ KEYBOARD_EVENTS│─────────────▶│ consumer │
//! │  (Port 60)  │               │  (32 entries)  │              └──────────┘
//! └─────────────┘               └────────────────┘
//! ```
//!
//! Scancodes arriving while the queue is full are dropped.

use x86_64::PrivilegeLevel;

use crate::data_structures::Ring;
use crate::interrupts::dispatch::TrapContext;
use crate::interrupts::InterruptController;
use crate::platform::Platform;

/// IRQ1 after the PIC has been remapped to start at 0x20.
pub const KEYBOARD_VECTOR: u8 = 0x21;
pub const KEYBOARD_DATA_PORT: u16 = 0x60;
pub const KEYBOARD_QUEUE_CAPACITY: usize = 32;

const RELEASE_BIT: u8 = 0x80;

/// One raw set-1 scancode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyState {
    pub scancode: u8,
}

impl KeyState {
    pub const fn new(scancode: u8) -> Self {
        Self { scancode }
    }

    /// Bit 7 marks a key release.
    pub fn is_release(&self) -> bool {
        self.scancode & RELEASE_BIT != 0
    }

    pub fn key_code(&self) -> u8 {
        self.scancode & !RELEASE_BIT
    }
}

pub type KeyboardQueue = Ring<KeyState, KEYBOARD_QUEUE_CAPACITY>;

static KEYBOARD_EVENTS: KeyboardQueue = KeyboardQueue::new();

/// IRQ1 handler.
pub fn handle_keyboard(trap: &mut TrapContext<'_>) {
    read_into(&KEYBOARD_EVENTS, trap.platform());
}

fn read_into(queue: &KeyboardQueue, platform: &dyn Platform) -> bool {
    let key = KeyState::new(platform.read_port(KEYBOARD_DATA_PORT));
    queue.push(key)
}

/// Routes the keyboard IRQ to [`handle_keyboard`].
pub fn init_keyboard<P: Platform>(controller: &InterruptController<P>) {
    controller.register(
        KEYBOARD_VECTOR,
        handle_keyboard,
        controller.config().code_selector,
        PrivilegeLevel::Ring0,
    );
}

/// Oldest queued key, if any.
pub fn next_key() -> Option<KeyState> {
    KEYBOARD_EVENTS.pop()
}

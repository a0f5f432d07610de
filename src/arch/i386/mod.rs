//! # i386 Bring-up
//!
//! Process-wide interrupt state for the real machine and the boot sequence
//! that installs it.
//!
//! ```text
//! init()
//!   ├─ serial console
//!   ├─ Interrupt System: thread table, controller, gate table → lidt
//!   └─ Input Devices:    keyboard handler on vector 0x21
//! ```
//!
//! Interrupts stay disabled; the kernel enables them once the PIC is set up.

pub mod cpu;
pub mod trampoline;

use spin::{Mutex, Once};

use crate::devices::drivers::init_keyboard;
use crate::interrupts::frame::TrapState;
use crate::interrupts::{InterruptConfig, InterruptController};
use crate::platform::{AddressSpace, Platform};
use crate::println;
use crate::thread::ThreadTable;

pub use cpu::{I386, SERIAL};

pub const MAX_THREADS: usize = 16;

static INTERRUPTS: Once<InterruptController<I386>> = Once::new();
static THREADS: Once<Mutex<ThreadTable<MAX_THREADS>>> = Once::new();

pub fn interrupts() -> Option<&'static InterruptController<I386>> {
    INTERRUPTS.get()
}

/// Brings up the serial console, the interrupt table and the keyboard.
pub fn init() -> Result<(), &'static str> {
    SERIAL.lock().init();
    println!("trapgate: i386 interrupt core");

    init_phase("Interrupt System", init_interrupts)?;
    init_phase("Input Devices", init_input)?;
    Ok(())
}

fn init_phase(name: &'static str, init_fn: fn() -> Result<(), &'static str>) -> Result<(), &'static str> {
    println!("Initializing {}...", name);
    match init_fn() {
        Ok(()) => {
            println!("    {} initialized", name);
            Ok(())
        }
        Err(e) => {
            println!("    {} failed: {}", name, e);
            Err(e)
        }
    }
}

fn init_interrupts() -> Result<(), &'static str> {
    let kernel_space = I386.current_address_space();
    THREADS.call_once(|| Mutex::new(ThreadTable::new(kernel_space)));
    let controller =
        INTERRUPTS.call_once(|| InterruptController::new(I386, InterruptConfig::new(kernel_space)));

    let trampolines = trampoline::trampolines();
    trampolines
        .verify_code(trampoline::trampoline_code())
        .and_then(|()| controller.build_and_install(&trampolines))
        .map_err(|err| {
            println!("    {}", err);
            err.as_str()
        })
}

fn init_input() -> Result<(), &'static str> {
    let controller = interrupts().ok_or("interrupt system not initialized")?;
    init_keyboard(controller);
    Ok(())
}

/// Adds a user thread. Runs with interrupts disabled so a trap cannot find
/// the thread table locked.
pub fn spawn_user_thread(entry: u32, stack_top: u32, space: AddressSpace) -> Option<usize> {
    let threads = THREADS.get()?;
    I386.without_interrupts(|| threads.lock().spawn(TrapState::new_user(entry, stack_top), space))
}

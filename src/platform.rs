//! # CPU and Console Primitives
//!
//! The interrupt core never touches the processor directly. Every privileged
//! instruction it needs goes through [`Platform`], which the hardware binding
//! in `arch::i386` implements with inline assembly and which tests replace
//! with a recording mock.
//!
//! | Primitive                 | i386 instruction(s)          |
//! |---------------------------|------------------------------|
//! | `disable_interrupts`      | `cli`                        |
//! | `enable_interrupts`       | `sti`                        |
//! | `halt`                    | `cli; hlt` loop              |
//! | `load_table`              | `lidt`                       |
//! | `load_kernel_segments`    | `mov ds/es, gs`              |
//! | `switch_address_space`    | `mov cr3`                    |
//! | `read_port`               | `in al, dx`                  |

use core::fmt;

use x86_64::structures::gdt::SegmentSelector;

use crate::interrupts::gate::TableDescriptor;

/// Opaque handle naming one address space (the physical address of its
/// page directory). Only `switch_address_space` interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressSpace(u32);

impl AddressSpace {
    pub const fn new(page_directory: u32) -> Self {
        Self(page_directory)
    }

    pub const fn page_directory(self) -> u32 {
        self.0
    }
}

pub trait Platform {
    fn disable_interrupts(&self);

    fn enable_interrupts(&self);

    fn interrupts_enabled(&self) -> bool;

    /// Stops the processor. On hardware this never returns.
    fn halt(&self);

    /// Hands `descriptor` to the CPU.
    ///
    /// # Safety
    ///
    /// The table the descriptor points at must stay valid and in place for
    /// as long as interrupts can be delivered.
    unsafe fn load_table(&self, descriptor: &TableDescriptor);

    /// Loads `data` into DS/ES and `extra` into GS.
    fn load_kernel_segments(&self, data: SegmentSelector, extra: SegmentSelector);

    /// Must complete before any code relying on the new mapping runs.
    fn switch_address_space(&self, space: AddressSpace);

    fn read_port(&self, port: u16) -> u8;

    fn print(&self, args: fmt::Arguments);

    /// Runs `f` with interrupts disabled and restores the previous state.
    fn without_interrupts<R>(&self, f: impl FnOnce() -> R) -> R
    where
        Self: Sized,
    {
        let was_enabled = self.interrupts_enabled();
        if was_enabled {
            self.disable_interrupts();
        }
        let ret = f();
        if was_enabled {
            self.enable_interrupts();
        }
        ret
    }
}

/// Prints a line through a [`Platform`] console.
#[macro_export]
macro_rules! kprintln {
    ($platform:expr) => {
        $platform.print(format_args!("\n"))
    };
    ($platform:expr, $($arg:tt)*) => {
        $platform.print(format_args!("{}\n", format_args!($($arg)*)))
    };
}

//! The bare-metal [`Platform`]: inline assembly plus the COM1 serial console.

use core::arch::asm;
use core::fmt::{self, Write};

use spin::Mutex;
use uart_16550::SerialPort;
use x86_64::structures::gdt::SegmentSelector;

use crate::interrupts::frame::TrapFrame;
use crate::interrupts::gate::TableDescriptor;
use crate::platform::{AddressSpace, Platform};

pub static SERIAL: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(0x3F8) });

#[macro_export]
macro_rules! println {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let mut serial = $crate::arch::i386::SERIAL.lock();
        let _ = writeln!(serial, $($arg)*);
    }};
}

pub struct I386;

impl I386 {
    /// Page directory currently in CR3.
    pub fn current_address_space(&self) -> AddressSpace {
        let cr3: u32;
        unsafe { asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags)) };
        AddressSpace::new(cr3)
    }
}

impl Platform for I386 {
    fn disable_interrupts(&self) {
        unsafe { asm!("cli", options(nomem, nostack)) };
    }

    fn enable_interrupts(&self) {
        unsafe { asm!("sti", options(nomem, nostack)) };
    }

    fn interrupts_enabled(&self) -> bool {
        let eflags: u32;
        unsafe { asm!("pushfd", "pop {}", out(reg) eflags, options(nomem, preserves_flags)) };
        eflags & TrapFrame::IF != 0
    }

    fn halt(&self) {
        loop {
            unsafe { asm!("cli", "hlt", options(nomem, nostack)) };
        }
    }

    unsafe fn load_table(&self, descriptor: &TableDescriptor) {
        asm!("lidt [{}]", in(reg) descriptor, options(readonly, nostack, preserves_flags));
    }

    fn load_kernel_segments(&self, data: SegmentSelector, extra: SegmentSelector) {
        unsafe {
            asm!(
                "mov ds, {data:x}",
                "mov es, {data:x}",
                "mov gs, {extra:x}",
                data = in(reg) data.0,
                extra = in(reg) extra.0,
                options(nostack, preserves_flags),
            );
        }
    }

    fn switch_address_space(&self, space: AddressSpace) {
        // Reloading CR3 flushes the TLB, so skip it when nothing changes.
        if self.current_address_space() == space {
            return;
        }
        unsafe {
            asm!(
                "mov cr3, {}",
                in(reg) space.page_directory(),
                options(nostack, preserves_flags),
            );
        }
    }

    fn read_port(&self, port: u16) -> u8 {
        let value: u8;
        unsafe {
            asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
        }
        value
    }

    fn print(&self, args: fmt::Arguments) {
        let _ = SERIAL.lock().write_fmt(args);
    }
}

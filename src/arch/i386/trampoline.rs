//! Entry stubs and the common trap path.
//!
//! Every stub is 23 bytes:
//!
//! ```text
//! 6a 00 | 90 90      push 0 (no CPU error code) or two nops
//! 68 <vector:4>      push vector
//! e9 <rel:4>         jmp isr_common
//! cc * 11            padding
//! ```
//!
//! `isr_common` saves the general and segment registers, loads the kernel
//! data segment into DS/ES, calls [`trap_entry`] with a pointer to the
//! resulting [`TrapState`] and restores from whatever pointer `trap_entry`
//! returns.
//!
//! A kernel thread is resumed on its own stack, just below the `esp` it had
//! when it trapped. The TSS `esp0` must therefore never point into the boot
//! thread's stack.

use core::arch::global_asm;

use super::cpu::I386;
use super::{INTERRUPTS, THREADS};
use crate::interrupts::frame::{ResumeTarget, TrapState};
use crate::interrupts::trampoline::TrampolineTable;
use crate::interrupts::KERNEL_DATA_SELECTOR;
use crate::platform::Platform;

global_asm!(
    ".section .text",
    ".global isr_entry_list",
    ".global isr_entry_list_end",
    ".p2align 4",
    "isr_entry_list:",
    ".set isr_vector, 0",
    ".rept 256",
    // Vectors for which the CPU pushes an error code itself.
    ".if (isr_vector == 8) || (isr_vector == 10) || (isr_vector == 11) || (isr_vector == 12) || (isr_vector == 13) || (isr_vector == 14) || (isr_vector == 17) || (isr_vector == 21) || (isr_vector == 29) || (isr_vector == 30)",
    ".byte 0x90, 0x90",
    ".else",
    ".byte 0x6a, 0x00",
    ".endif",
    ".byte 0x68",
    ".long isr_vector",
    ".byte 0xe9",
    ".long isr_common - (. + 4)",
    ".fill 11, 1, 0xcc",
    ".set isr_vector, isr_vector + 1",
    ".endr",
    "isr_entry_list_end:",
    "",
    "isr_common:",
    "pushad",
    "push ds",
    "push es",
    "push fs",
    "push gs",
    "mov ax, {kernel_data}",
    "mov ds, ax",
    "mov es, ax",
    "cld",
    "mov eax, esp",
    "push eax",
    "call {trap_entry}",
    "mov esp, eax",
    "pop gs",
    "pop fs",
    "pop es",
    "pop ds",
    "popad",
    "add esp, 8",
    "iretd",
    kernel_data = const KERNEL_DATA_SELECTOR.0,
    trap_entry = sym trap_entry,
);

extern "C" {
    static isr_entry_list: u8;
    static isr_entry_list_end: u8;
}

/// The generated stub block.
pub fn trampolines() -> TrampolineTable {
    let (base, end) = bounds();
    unsafe { TrampolineTable::with_end(base, end) }
}

/// The bytes of the generated stub block.
pub fn trampoline_code() -> &'static [u8] {
    let (base, end) = bounds();
    unsafe { core::slice::from_raw_parts(base as *const u8, end.wrapping_sub(base) as usize) }
}

fn bounds() -> (u32, u32) {
    unsafe {
        (
            core::ptr::addr_of!(isr_entry_list) as u32,
            core::ptr::addr_of!(isr_entry_list_end) as u32,
        )
    }
}

/// Resume state for a user thread when the trap came from ring 0 and so left
/// no room for the user `esp`/`ss` on the kernel stack.
static mut RESUME: TrapState = TrapState::EMPTY;

/// Called by `isr_common` with interrupts disabled. Returns where the
/// registers to restore now live.
extern "C" fn trap_entry(state: *mut TrapState) -> *mut TrapState {
    let (Some(controller), Some(threads)) = (INTERRUPTS.get(), THREADS.get()) else {
        I386.halt();
        return state;
    };

    let trapped = unsafe { *state };
    let (regs, frame) = {
        let mut threads = threads.lock();
        controller.dispatch(&mut *threads, trapped.regs, trapped.frame)
    };

    let resume = TrapState { regs, frame };
    let target = match resume.resume_target(&trapped.frame) {
        ResumeTarget::InPlace => state,
        ResumeTarget::Staging => core::ptr::addr_of_mut!(RESUME),
        ResumeTarget::ThreadStack(address) => address as *mut TrapState,
    };
    unsafe { resume.write_resume(target) };
    target
}

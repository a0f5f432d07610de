//! # Trap State Layout
//!
//! What the trampoline leaves on the kernel stack before calling the
//! dispatcher, lowest address first:
//!
//! ```text
//! ┌──────────────────────────┐ <- esp at the call
//! │ gs fs es ds              │  pushed by the trampoline (SavedRegisters)
//! │ edi esi ebp esp          │  `pushad`
//! │ ebx edx ecx eax          │
//! ├──────────────────────────┤
//! │ vector  error code       │  pushed by the stub (TrapFrame)
//! │ eip cs eflags            │  pushed by the CPU
//! │ esp ss                   │  pushed by the CPU on a privilege change
//! └──────────────────────────┘
//! ```
//!
//! Both structs mirror that order field for field; the assertions below pin
//! the layout so the two sides cannot drift apart silently.

use core::mem::{offset_of, size_of};
use core::ptr::addr_of_mut;

use x86_64::{structures::gdt::SegmentSelector, PrivilegeLevel};

use super::{USER_CODE_SELECTOR, USER_DATA_SELECTOR};

/// Hardware-pushed part of the trap state plus the vector and error code
/// the stub adds.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub vector: u32,
    pub error_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u32,
}

const _: () = {
    assert!(size_of::<TrapFrame>() == 7 * 4);
    assert!(offset_of!(TrapFrame, vector) == 0);
    assert!(offset_of!(TrapFrame, error_code) == 4);
    assert!(offset_of!(TrapFrame, eip) == 8);
    assert!(offset_of!(TrapFrame, cs) == 12);
    assert!(offset_of!(TrapFrame, eflags) == 16);
    assert!(offset_of!(TrapFrame, esp) == 20);
    assert!(offset_of!(TrapFrame, ss) == 24);
};

impl TrapFrame {
    /// Interrupt-enable bit in EFLAGS.
    pub const IF: u32 = 1 << 9;

    /// Vector that fired. Stubs only ever push 0..=255.
    pub fn vector(&self) -> u8 {
        self.vector as u8
    }

    /// Privilege level the interrupted code ran at.
    pub fn privilege(&self) -> PrivilegeLevel {
        PrivilegeLevel::from_u16((self.cs & 0b11) as u16)
    }

    /// Whether the CPU pushed (and `iret` will pop) `esp`/`ss`.
    pub fn has_stack_switch(&self) -> bool {
        self.privilege() != PrivilegeLevel::Ring0
    }
}

/// Registers saved by the trampoline, in reverse push order.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavedRegisters {
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,

    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    /// ESP as `pushad` saw it; ignored by `popad`.
    pub kernel_esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
}

const _: () = {
    assert!(size_of::<SavedRegisters>() == 12 * 4);
    assert!(offset_of!(SavedRegisters, gs) == 0);
    assert!(offset_of!(SavedRegisters, fs) == 4);
    assert!(offset_of!(SavedRegisters, es) == 8);
    assert!(offset_of!(SavedRegisters, ds) == 12);
    assert!(offset_of!(SavedRegisters, edi) == 16);
    assert!(offset_of!(SavedRegisters, esi) == 20);
    assert!(offset_of!(SavedRegisters, ebp) == 24);
    assert!(offset_of!(SavedRegisters, kernel_esp) == 28);
    assert!(offset_of!(SavedRegisters, ebx) == 32);
    assert!(offset_of!(SavedRegisters, edx) == 36);
    assert!(offset_of!(SavedRegisters, ecx) == 40);
    assert!(offset_of!(SavedRegisters, eax) == 44);
};

/// Everything the trampoline hands over, laid out exactly as it sits on the
/// stack.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapState {
    pub regs: SavedRegisters,
    pub frame: TrapFrame,
}

impl TrapState {
    pub const EMPTY: Self = Self {
        regs: SavedRegisters {
            gs: 0,
            fs: 0,
            es: 0,
            ds: 0,
            edi: 0,
            esi: 0,
            ebp: 0,
            kernel_esp: 0,
            ebx: 0,
            edx: 0,
            ecx: 0,
            eax: 0,
        },
        frame: TrapFrame {
            vector: 0,
            error_code: 0,
            eip: 0,
            cs: 0,
            eflags: 0,
            esp: 0,
            ss: 0,
        },
    };
}

/// Bit 1 of EFLAGS always reads as one.
const EFLAGS_RESERVED: u32 = 1 << 1;

impl TrapState {
    /// State a never-run user thread resumes from: interrupts enabled, all
    /// data segments on the user data selector, general registers zeroed.
    pub fn new_user(entry: u32, stack_top: u32) -> Self {
        Self::with_selectors(entry, stack_top, USER_CODE_SELECTOR, USER_DATA_SELECTOR)
    }

    pub fn with_selectors(
        entry: u32,
        stack_top: u32,
        code: SegmentSelector,
        data: SegmentSelector,
    ) -> Self {
        let data = u32::from(data.0);
        let mut state = TrapState::default();
        state.regs.gs = data;
        state.regs.fs = data;
        state.regs.es = data;
        state.regs.ds = data;
        state.frame = TrapFrame {
            eip: entry,
            cs: u32::from(code.0),
            eflags: TrapFrame::IF | EFLAGS_RESERVED,
            esp: stack_top,
            ss: data,
            ..TrapFrame::default()
        };
        state
    }

    /// Where the state to resume must be laid out before `iret`, given the
    /// frame the CPU pushed for the trap being returned from.
    pub fn resume_target(&self, trapped: &TrapFrame) -> ResumeTarget {
        match (self.frame.has_stack_switch(), trapped.has_stack_switch()) {
            (true, true) => ResumeTarget::InPlace,
            (true, false) => ResumeTarget::Staging,
            // A same-privilege `iret` keeps the current stack, so the state
            // must sit on the resumed thread's own stack, right below the
            // address `pushad` recorded.
            (false, _) => ResumeTarget::ThreadStack(
                self.regs
                    .kernel_esp
                    .wrapping_sub(size_of::<SavedRegisters>() as u32),
            ),
        }
    }

    /// Writes the words the trap exit path pops. Without a stack switch
    /// `esp`/`ss` are left alone: they belong to the resumed thread's stack.
    ///
    /// # Safety
    ///
    /// `target` must be valid for writes of a full `TrapState`, or of all but
    /// the last two words when `self` has no stack switch.
    pub unsafe fn write_resume(&self, target: *mut TrapState) {
        addr_of_mut!((*target).regs).write(self.regs);
        if self.frame.has_stack_switch() {
            addr_of_mut!((*target).frame).write(self.frame);
        } else {
            addr_of_mut!((*target).frame.vector).write(self.frame.vector);
            addr_of_mut!((*target).frame.error_code).write(self.frame.error_code);
            addr_of_mut!((*target).frame.eip).write(self.frame.eip);
            addr_of_mut!((*target).frame.cs).write(self.frame.cs);
            addr_of_mut!((*target).frame.eflags).write(self.frame.eflags);
        }
    }
}

/// Placement of the resume state for the trap exit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeTarget {
    /// Over the state the trap pushed; both sides have the same shape.
    InPlace,
    /// A separate buffer. The trap came from ring 0, so its stack holds no
    /// `esp`/`ss` slots for the user thread being resumed.
    Staging,
    /// On the resumed ring-0 thread's own stack, at this address.
    ThreadStack(u32),
}

const _: () = {
    assert!(offset_of!(TrapState, regs) == 0);
    assert!(offset_of!(TrapState, frame) == size_of::<SavedRegisters>());
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_privilege_from_cs() {
        let kernel = TrapFrame { cs: 0x08, ..TrapFrame::default() };
        let user = TrapFrame { cs: 0x1B, ..TrapFrame::default() };

        assert_eq!(kernel.privilege(), PrivilegeLevel::Ring0);
        assert!(!kernel.has_stack_switch());
        assert_eq!(user.privilege(), PrivilegeLevel::Ring3);
        assert!(user.has_stack_switch());
    }

    #[test]
    fn test_new_user_context() {
        let state = TrapState::new_user(0x0804_8000, 0xBFFF_F000);
        assert_eq!(state.frame.eip, 0x0804_8000);
        assert_eq!(state.frame.esp, 0xBFFF_F000);
        assert_eq!(state.frame.cs, 0x1B);
        assert_eq!(state.frame.ss, 0x23);
        assert_eq!(state.regs.ds, 0x23);
        assert_ne!(state.frame.eflags & TrapFrame::IF, 0);
        assert!(state.frame.has_stack_switch());
    }

    fn kernel_state(kernel_esp: u32) -> TrapState {
        TrapState {
            regs: SavedRegisters { kernel_esp, eax: 0xB007, ..SavedRegisters::default() },
            frame: TrapFrame { vector: 0x20, eip: 0xC010_0000, cs: 0x08, eflags: 0x202, ..TrapFrame::default() },
        }
    }

    #[test]
    fn test_resume_target_by_privilege() {
        let user = TrapState::new_user(0x0804_8000, 0xBFFF_F000);
        let kernel = kernel_state(0xC020_0000);

        assert_eq!(user.resume_target(&user.frame), ResumeTarget::InPlace);
        assert_eq!(user.resume_target(&kernel.frame), ResumeTarget::Staging);
        assert_eq!(
            kernel.resume_target(&user.frame),
            ResumeTarget::ThreadStack(0xC020_0000 - 48)
        );
        assert_eq!(
            kernel.resume_target(&kernel.frame),
            ResumeTarget::ThreadStack(0xC020_0000 - 48)
        );
    }

    #[test]
    fn test_kernel_resume_leaves_stack_above_frame_alone() {
        const WORDS: usize = size_of::<TrapState>() / 4;
        let mut stack = [0xDEAD_BEEF_u32; WORDS];
        let kernel = kernel_state(0xC020_0000);

        unsafe { kernel.write_resume(stack.as_mut_ptr().cast::<TrapState>()) };

        assert_eq!(stack[7], 0xC020_0000);
        assert_eq!(stack[11], 0xB007);
        assert_eq!(stack[12], 0x20);
        assert_eq!(&stack[14..17], &[0xC010_0000, 0x08, 0x202]);
        assert_eq!(&stack[17..], &[0xDEAD_BEEF, 0xDEAD_BEEF]);
    }

    #[test]
    fn test_user_resume_writes_full_frame() {
        const WORDS: usize = size_of::<TrapState>() / 4;
        let mut stack = [0_u32; WORDS];
        let user = TrapState::new_user(0x0804_8000, 0xBFFF_F000);

        unsafe { user.write_resume(stack.as_mut_ptr().cast::<TrapState>()) };

        assert_eq!(&stack[17..], &[0xBFFF_F000, 0x23]);
    }

    #[test]
    fn test_vector_truncates_to_byte() {
        let frame = TrapFrame { vector: 0x21, ..TrapFrame::default() };
        assert_eq!(frame.vector(), 0x21);
    }
}

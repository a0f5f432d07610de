//! # Interrupt Gate Descriptors
//!
//! Protected-mode interrupt-gate layout (8 bytes per vector):
//!
//! ```text
//!  15             0 15             0 15             0 15             0
//! ┌────────────────┬────────────────┬────────────────┬────────────────┐
//! │  offset 0..16  │    selector    │     flags      │ offset 16..32  │
//! └────────────────┴────────────────┴────────────────┴────────────────┘
//!
//! flags = (P << 7 | DPL << 5 | type) << 8      type = 0xE (32-bit interrupt gate)
//! ```
//!
//! The table descriptor handed to `lidt` is a 16-bit limit followed by a
//! 32-bit linear base, stored here as two 16-bit halves.

use core::mem::{offset_of, size_of};

use x86_64::{structures::gdt::SegmentSelector, PrivilegeLevel};

/// Number of vectors the CPU can deliver.
pub const VECTOR_COUNT: usize = 256;

/// 32-bit interrupt gate; the CPU clears IF on entry.
pub const INTERRUPT_GATE: u8 = 0xE;

const PRESENT: u8 = 0x80;
const DPL_SHIFT: u8 = 5;
const TYPE_MASK: u8 = 0x1F;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateDescriptor {
    offset_low: u16,
    selector: u16,
    flags: u16,
    offset_high: u16,
}

const _: () = {
    assert!(size_of::<GateDescriptor>() == 8);
    assert!(offset_of!(GateDescriptor, offset_low) == 0);
    assert!(offset_of!(GateDescriptor, selector) == 2);
    assert!(offset_of!(GateDescriptor, flags) == 4);
    assert!(offset_of!(GateDescriptor, offset_high) == 6);
};

impl GateDescriptor {
    /// A gate with nothing installed. The CPU raises #NP when it hits one.
    pub const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            flags: 0,
            offset_high: 0,
        }
    }

    pub fn set_offset(&mut self, address: u32) {
        self.offset_low = address as u16;
        self.offset_high = (address >> 16) as u16;
    }

    pub fn offset(&self) -> u32 {
        u32::from(self.offset_high) << 16 | u32::from(self.offset_low)
    }

    /// Points the gate at `selector` and marks it present with the given
    /// descriptor privilege level.
    pub fn set_options(&mut self, selector: SegmentSelector, privilege: PrivilegeLevel) {
        self.selector = selector.0;
        self.flags = u16::from(gate_attributes(privilege)) << 8;
    }

    pub fn selector(&self) -> SegmentSelector {
        SegmentSelector(self.selector)
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn privilege(&self) -> PrivilegeLevel {
        PrivilegeLevel::from_u16(u16::from((self.attributes() >> DPL_SHIFT) & 0b11))
    }

    pub fn gate_type(&self) -> u8 {
        self.attributes() & TYPE_MASK
    }

    pub fn is_present(&self) -> bool {
        self.attributes() & PRESENT != 0
    }

    /// Raw words in memory order.
    pub fn words(&self) -> [u16; 4] {
        [self.offset_low, self.selector, self.flags, self.offset_high]
    }

    /// Whether an entry address has been written into this gate.
    pub fn is_patched(&self) -> bool {
        self.offset() != 0
    }

    fn attributes(&self) -> u8 {
        (self.flags >> 8) as u8
    }
}

fn gate_attributes(privilege: PrivilegeLevel) -> u8 {
    PRESENT | (privilege as u8) << DPL_SHIFT | INTERRUPT_GATE
}

/// The 256-entry table the CPU indexes by vector.
#[repr(C, align(8))]
#[derive(Debug, Clone)]
pub struct GateTable {
    entries: [GateDescriptor; VECTOR_COUNT],
}

impl GateTable {
    pub const fn new() -> Self {
        Self {
            entries: [GateDescriptor::missing(); VECTOR_COUNT],
        }
    }

    pub fn entry(&self, vector: u8) -> &GateDescriptor {
        &self.entries[usize::from(vector)]
    }

    pub fn entry_mut(&mut self, vector: u8) -> &mut GateDescriptor {
        &mut self.entries[usize::from(vector)]
    }

    pub fn entries(&self) -> &[GateDescriptor; VECTOR_COUNT] {
        &self.entries
    }

    /// Builds the descriptor for this table at its current address.
    pub fn descriptor(&self) -> TableDescriptor {
        TableDescriptor::new(self as *const Self as usize as u32, size_of::<Self>())
    }
}

impl Default for GateTable {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDescriptor {
    limit: u16,
    base_low: u16,
    base_high: u16,
}

const _: () = assert!(size_of::<TableDescriptor>() == 6);

impl TableDescriptor {
    /// `size` is the table size in bytes; the CPU wants it minus one.
    pub const fn new(base: u32, size: usize) -> Self {
        Self {
            limit: (size - 1) as u16,
            base_low: base as u16,
            base_high: (base >> 16) as u16,
        }
    }

    pub const fn limit(&self) -> u16 {
        self.limit
    }

    pub const fn base(&self) -> u32 {
        (self.base_high as u32) << 16 | self.base_low as u32
    }
}

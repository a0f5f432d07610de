//! # Interrupt Handling Core
//!
//! Owns the gate table the CPU reads, the vector → handler registry, and the
//! dispatcher every trap passes through.
//!
//! - **gate**: gate descriptors, the 256-entry table and its `lidt` descriptor
//! - **trampoline**: address arithmetic over the per-vector entry stubs
//! - **frame**: register and trap-frame layouts shared with the stubs
//! - **registry**: vector → handler entries
//! - **dispatch**: the trap path and the context handed to handlers
//! - **fault**: the halting fallback handler
//!
//! ## Vector Layout
//!
//! | Vector | Use                         | Gate                   |
//! |--------|-----------------------------|------------------------|
//! | 0-31   | CPU exceptions              | default fault handler  |
//! | 2      | NMI                         | left unpatched         |
//! | 15     | Reserved                    | left unpatched         |
//! | 32-47  | Remapped PIC IRQs           | default until replaced |
//! | 48-255 | Software / free             | default until replaced |
//!
//! ## Usage
//!
//! ```ignore
//! static INTERRUPTS: InterruptController<I386> =
//!     InterruptController::new(I386, InterruptConfig::new(KERNEL_SPACE));
//!
//! INTERRUPTS.build_and_install(&trampolines)?;
//! INTERRUPTS.register(0x80, syscall_handler, KERNEL_CODE_SELECTOR, PrivilegeLevel::Ring3);
//! ```

use core::fmt;

use spin::{Mutex, Once};
use x86_64::{structures::gdt::SegmentSelector, PrivilegeLevel};

use crate::kprintln;
use crate::platform::{AddressSpace, Platform};

pub mod dispatch;
pub mod fault;
pub mod frame;
pub mod gate;
pub mod registry;
pub mod trampoline;

use fault::default_fault_handler;
use gate::{GateDescriptor, GateTable, TableDescriptor};
use registry::{HandlerEntry, HandlerRegistry, InterruptHandler};
use trampoline::TrampolineTable;

/// Vectors whose gates are never patched: NMI and the reserved vector 15.
pub const RESERVED_VECTORS: [u8; 2] = [2, 15];

// GDT layout: null, kernel code, kernel data, user code, user data, TLS.
pub const KERNEL_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(1, PrivilegeLevel::Ring0);
pub const KERNEL_DATA_SELECTOR: SegmentSelector = SegmentSelector::new(2, PrivilegeLevel::Ring0);
pub const USER_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(3, PrivilegeLevel::Ring3);
pub const USER_DATA_SELECTOR: SegmentSelector = SegmentSelector::new(4, PrivilegeLevel::Ring3);
pub const KERNEL_TLS_SELECTOR: SegmentSelector = SegmentSelector::new(5, PrivilegeLevel::Ring0);

pub fn is_reserved(vector: u8) -> bool {
    RESERVED_VECTORS.contains(&vector)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptError {
    /// `build_and_install` already ran.
    AlreadyInstalled,
    /// The stub for `vector` does not push that vector.
    StubMismatch { vector: u8 },
    /// The stub block does not hold exactly 256 stubs.
    TrampolineLength { expected: u32, found: u32 },
}

impl InterruptError {
    /// Short form for boot-phase reporting, which only carries `&'static str`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyInstalled => "interrupt table already installed",
            Self::StubMismatch { .. } => "entry stub does not match its vector",
            Self::TrampolineLength { .. } => "entry stub block has the wrong length",
        }
    }
}

impl fmt::Display for InterruptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptError::AlreadyInstalled => f.write_str(self.as_str()),
            InterruptError::StubMismatch { vector } => {
                write!(f, "entry stub for vector {:#04x} does not push its vector", vector)
            }
            InterruptError::TrampolineLength { expected, found } => write!(
                f,
                "trampoline block is {} bytes long, expected {}",
                found, expected
            ),
        }
    }
}

/// Selectors loaded on trap entry and the address space handlers run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptConfig {
    /// Selector written into every gate by default.
    pub code_selector: SegmentSelector,
    /// Loaded into DS and ES.
    pub data_selector: SegmentSelector,
    /// Loaded into GS.
    pub extra_selector: SegmentSelector,
    pub kernel_space: AddressSpace,
}

impl InterruptConfig {
    pub const fn new(kernel_space: AddressSpace) -> Self {
        Self {
            code_selector: KERNEL_CODE_SELECTOR,
            data_selector: KERNEL_DATA_SELECTOR,
            extra_selector: KERNEL_TLS_SELECTOR,
            kernel_space,
        }
    }
}

/// Process-wide interrupt state. Lives in a `static`: the CPU keeps reading
/// the gate table from wherever it was when it was installed.
pub struct InterruptController<P> {
    platform: P,
    config: InterruptConfig,
    gates: Mutex<GateTable>,
    handlers: HandlerRegistry,
    installed: Once<TableDescriptor>,
}

impl<P: Platform> InterruptController<P> {
    pub const fn new(platform: P, config: InterruptConfig) -> Self {
        Self {
            platform,
            gates: Mutex::new(GateTable::new()),
            handlers: HandlerRegistry::new(HandlerEntry::new(
                default_fault_handler,
                config.code_selector,
                PrivilegeLevel::Ring0,
            )),
            config,
            installed: Once::new(),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn config(&self) -> &InterruptConfig {
        &self.config
    }

    /// Points every non-reserved gate at its stub with the default fault
    /// handler behind it, then loads the table. Runs once.
    pub fn build_and_install(&'static self, trampolines: &TrampolineTable) -> Result<(), InterruptError> {
        trampolines.verify()?;

        self.platform.without_interrupts(|| {
            let mut fresh = false;
            let descriptor = *self.installed.call_once(|| {
                fresh = true;
                self.populate(trampolines)
            });
            if !fresh {
                return Err(InterruptError::AlreadyInstalled);
            }

            unsafe { self.platform.load_table(&descriptor) };
            kprintln!(
                self.platform,
                "IDT: loaded {} bytes at {:#010x}, stubs at {:#010x}",
                u32::from(descriptor.limit()) + 1,
                descriptor.base(),
                trampolines.base()
            );
            Ok(())
        })
    }

    fn populate(&self, trampolines: &TrampolineTable) -> TableDescriptor {
        let mut gates = self.gates.lock();
        for vector in 0..=u8::MAX {
            if is_reserved(vector) {
                continue;
            }
            gates.entry_mut(vector).set_offset(trampolines.address_of(vector));
            self.install_entry(
                &mut gates,
                vector,
                HandlerEntry::new(default_fault_handler, self.config.code_selector, PrivilegeLevel::Ring0),
            );
        }
        gates.descriptor()
    }

    /// Routes `vector` to `handler`. Replaces whatever was there; there is no
    /// removal.
    pub fn register(
        &self,
        vector: u8,
        handler: InterruptHandler,
        selector: SegmentSelector,
        privilege: PrivilegeLevel,
    ) {
        self.platform.without_interrupts(|| {
            let mut gates = self.gates.lock();
            self.install_entry(&mut gates, vector, HandlerEntry::new(handler, selector, privilege));
        });
    }

    fn install_entry(&self, gates: &mut GateTable, vector: u8, entry: HandlerEntry) {
        self.handlers.set(vector, entry);
        let gate = gates.entry_mut(vector);
        if gate.is_patched() {
            gate.set_options(entry.selector, entry.privilege);
        }
    }

    pub fn handler_entry(&self, vector: u8) -> HandlerEntry {
        self.handlers.get(vector)
    }

    pub fn gate(&self, vector: u8) -> GateDescriptor {
        *self.gates.lock().entry(vector)
    }

    /// The descriptor handed to the CPU, once installed.
    pub fn installed_descriptor(&self) -> Option<TableDescriptor> {
        self.installed.get().copied()
    }

    /// Prints every gate as `offset-low selector flags offset-high`.
    pub fn dump_gates(&self) {
        let gates = self.gates.lock();
        for (vector, gate) in gates.entries().iter().enumerate() {
            let [offset_low, selector, flags, offset_high] = gate.words();
            kprintln!(
                self.platform,
                "{:3}: {:04x} {:04x} {:04x} {:04x}",
                vector,
                offset_low,
                selector,
                flags,
                offset_high
            );
        }
    }
}

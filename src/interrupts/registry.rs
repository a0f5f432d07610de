//! Vector → handler table consulted on every trap.

use core::fmt;

use spin::Mutex;
use x86_64::{structures::gdt::SegmentSelector, PrivilegeLevel};

use super::dispatch::TrapContext;
use super::gate::VECTOR_COUNT;

pub type InterruptHandler = fn(&mut TrapContext<'_>);

#[derive(Clone, Copy)]
pub struct HandlerEntry {
    pub handler: InterruptHandler,
    pub selector: SegmentSelector,
    pub privilege: PrivilegeLevel,
}

impl HandlerEntry {
    pub const fn new(
        handler: InterruptHandler,
        selector: SegmentSelector,
        privilege: PrivilegeLevel,
    ) -> Self {
        Self {
            handler,
            selector,
            privilege,
        }
    }

    pub fn runs(&self, handler: InterruptHandler) -> bool {
        self.handler as usize == handler as usize
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("handler", &(self.handler as usize as *const ()))
            .field("selector", &self.selector)
            .field("privilege", &self.privilege)
            .finish()
    }
}

/// Every slot always holds some handler, so a lookup cannot miss.
pub struct HandlerRegistry {
    entries: Mutex<[HandlerEntry; VECTOR_COUNT]>,
}

impl HandlerRegistry {
    pub const fn new(fallback: HandlerEntry) -> Self {
        Self {
            entries: Mutex::new([fallback; VECTOR_COUNT]),
        }
    }

    pub fn set(&self, vector: u8, entry: HandlerEntry) {
        self.entries.lock()[usize::from(vector)] = entry;
    }

    /// Copies the entry out so the lock is not held while the handler runs.
    pub fn get(&self, vector: u8) -> HandlerEntry {
        self.entries.lock()[usize::from(vector)]
    }
}

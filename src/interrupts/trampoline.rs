//! # Trampoline Table
//!
//! The entry stubs are one contiguous block of code, one stub per vector,
//! every stub exactly [`STUB_SIZE`] bytes long. The gate for vector `v`
//! therefore points at `base + v * STUB_SIZE`.
//!
//! This is the only place in the crate that does arithmetic on code
//! addresses. If the stub generator and [`STUB_SIZE`] ever disagree, every
//! gate lands in the middle of some other stub, so [`TrampolineTable::verify`]
//! checks the arithmetic against the generated block before anything is
//! installed.

use super::gate::VECTOR_COUNT;
use super::InterruptError;

/// Bytes per entry stub, fixed by the trampoline generator.
pub const STUB_SIZE: u32 = 23;

/// Vectors for which the CPU pushes an error code itself, so their stubs
/// skip the dummy push.
pub const ERROR_CODE_VECTORS: [u8; 10] = [8, 10, 11, 12, 13, 14, 17, 21, 29, 30];

const DUMMY_ERROR_CODE: [u8; 2] = [0x6a, 0x00];
const ERROR_CODE_PADDING: [u8; 2] = [0x90, 0x90];
const PUSH_IMM32: u8 = 0x68;

/// Total length of the stub block.
pub const TRAMPOLINE_LEN: u32 = VECTOR_COUNT as u32 * STUB_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrampolineTable {
    base: u32,
    end: Option<u32>,
}

impl TrampolineTable {
    /// # Safety
    ///
    /// `base` must be the address of the first stub of a block laid out with
    /// [`STUB_SIZE`]-byte stubs for all 256 vectors.
    pub const unsafe fn new(base: u32) -> Self {
        Self { base, end: None }
    }

    /// Like [`TrampolineTable::new`], with the address one past the last stub
    /// so `verify` can check the block length too.
    ///
    /// # Safety
    ///
    /// Same as [`TrampolineTable::new`]; `end` must be the end of that block.
    pub const unsafe fn with_end(base: u32, end: u32) -> Self {
        Self {
            base,
            end: Some(end),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn address_of(&self, vector: u8) -> u32 {
        self.base.wrapping_add(u32::from(vector) * STUB_SIZE)
    }

    /// Checks the block length against 256 stubs when the end of the block
    /// is known. Runs before every install.
    pub fn verify(&self) -> Result<(), InterruptError> {
        match self.end {
            Some(end) => check_length(end.wrapping_sub(self.base)),
            None => Ok(()),
        }
    }

    /// Checks the generated code itself: every stub must start with the
    /// error-code push (or padding) its vector needs, followed by a push of
    /// its own vector number. A stride mismatch shows up as the first stub
    /// whose bytes are off.
    pub fn verify_code(&self, code: &[u8]) -> Result<(), InterruptError> {
        check_length(code.len() as u32)?;

        for (vector, stub) in (0..=u8::MAX).zip(code.chunks_exact(STUB_SIZE as usize)) {
            let prefix = if ERROR_CODE_VECTORS.contains(&vector) {
                ERROR_CODE_PADDING
            } else {
                DUMMY_ERROR_CODE
            };
            let pushed = u32::from_le_bytes([stub[3], stub[4], stub[5], stub[6]]);

            if stub[..2] != prefix || stub[2] != PUSH_IMM32 || pushed != u32::from(vector) {
                return Err(InterruptError::StubMismatch { vector });
            }
        }
        Ok(())
    }
}

fn check_length(found: u32) -> Result<(), InterruptError> {
    if found == TRAMPOLINE_LEN {
        Ok(())
    } else {
        Err(InterruptError::TrampolineLength {
            expected: TRAMPOLINE_LEN,
            found,
        })
    }
}

//! # Interrupt Dispatcher
//!
//! Every trap, whatever its vector, goes through
//! [`InterruptController::dispatch`]:
//!
//! ```text
//! trampoline ──▶ kernel segments ──▶ kernel address space
//!                                          │
//!             ┌────────────────────────────┘
//!             ▼
//!   save into current thread ──▶ handler ──▶ schedule()
//!                                               │
//!             ┌─────────────────────────────────┘
//!             ▼
//!   reload current thread ──▶ its address space ──▶ trampoline (iret)
//! ```
//!
//! The whole path runs with interrupts disabled (interrupt gates clear IF
//! on entry) and never allocates. `schedule()` is the only point where the
//! running thread can change, which is why the state handed back is read
//! again from the scheduler instead of reusing what came in.

use super::frame::{SavedRegisters, TrapFrame, TrapState};
use super::InterruptController;
use crate::platform::Platform;
use crate::thread::Scheduler;

/// What a handler sees: the trapped thread's saved state, the CPU and the
/// scheduler requests that are safe to make from trap context.
pub struct TrapContext<'a> {
    platform: &'a dyn Platform,
    state: &'a mut TrapState,
    scheduler: &'a mut dyn Scheduler,
}

impl<'a> TrapContext<'a> {
    pub fn new(
        platform: &'a dyn Platform,
        state: &'a mut TrapState,
        scheduler: &'a mut dyn Scheduler,
    ) -> Self {
        Self {
            platform,
            state,
            scheduler,
        }
    }

    pub fn platform(&self) -> &'a dyn Platform {
        self.platform
    }

    pub fn vector(&self) -> u8 {
        self.state.frame.vector()
    }

    pub fn error_code(&self) -> u32 {
        self.state.frame.error_code
    }

    pub fn frame(&self) -> &TrapFrame {
        &self.state.frame
    }

    pub fn registers(&self) -> &SavedRegisters {
        &self.state.regs
    }

    /// Changes take effect when the thread resumes, e.g. a syscall result
    /// in `eax`.
    pub fn registers_mut(&mut self) -> &mut SavedRegisters {
        &mut self.state.regs
    }

    /// Id of the thread that trapped.
    pub fn thread_id(&self) -> usize {
        self.scheduler.current_id()
    }

    /// Retires the trapped thread. The switch happens in the `schedule()`
    /// that follows the handler.
    pub fn exit_thread(&mut self) -> bool {
        self.scheduler.exit_current()
    }

    /// Parks the trapped thread until some handler calls `wake_thread`.
    pub fn block_thread(&mut self) -> bool {
        self.scheduler.block_current()
    }

    pub fn wake_thread(&mut self, id: usize) -> bool {
        self.scheduler.unblock(id)
    }
}

impl<P: Platform> InterruptController<P> {
    /// Runs one trap to completion and returns the state to resume, which
    /// belongs to whichever thread is current after scheduling.
    pub fn dispatch(
        &self,
        scheduler: &mut dyn Scheduler,
        regs: SavedRegisters,
        frame: TrapFrame,
    ) -> (SavedRegisters, TrapFrame) {
        let config = self.config();
        self.platform()
            .load_kernel_segments(config.data_selector, config.extra_selector);
        self.platform().switch_address_space(config.kernel_space);

        let entry = self.handler_entry(frame.vector());
        let mut state = TrapState { regs, frame };
        *scheduler.current_context() = state;

        // The handler works on a copy so it can hold the scheduler too; the
        // slot is rewritten before `schedule()` can pick another thread.
        (entry.handler)(&mut TrapContext::new(self.platform(), &mut state, &mut *scheduler));
        *scheduler.current_context() = state;

        scheduler.schedule();

        let resume = *scheduler.current_context();
        self.platform()
            .switch_address_space(scheduler.current_address_space());
        (resume.regs, resume.frame)
    }
}

//! Thread Contexts and Scheduling
//!
//! Each thread owns one [`TrapState`] slot. The dispatcher writes the slot of
//! the current thread when a trap arrives and resumes from the slot of
//! whichever thread is current after [`Scheduler::schedule`].
//!
//! # Thread Lifecycle
//! 1. The boot thread occupies slot 0 and adopts the state of the first trap
//! 2. `spawn` fills a free slot with a fresh user-mode context
//! 3. `schedule` rotates round-robin over `Ready` threads
//! 4. An `Exited` thread keeps its slot until the scheduler switches away

use crate::interrupts::frame::TrapState;
use crate::platform::AddressSpace;

/// The dispatcher's view of the scheduler.
pub trait Scheduler {
    /// Saved-state slot of the running thread.
    fn current_context(&mut self) -> &mut TrapState;

    fn current_address_space(&self) -> AddressSpace;

    /// May change which thread is current.
    fn schedule(&mut self);

    fn current_id(&self) -> usize;

    /// Marks the running thread exited. It keeps running until the next
    /// `schedule`.
    fn exit_current(&mut self) -> bool;

    /// Takes the running thread out of rotation until `unblock`.
    fn block_current(&mut self) -> bool;

    fn unblock(&mut self, id: usize) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    Free,
    Ready,
    Running,
    Blocked,
    Exited,
}

#[derive(Clone, Copy, Debug)]
pub struct Thread {
    pub id: usize,
    pub state: ThreadState,
    pub context: TrapState,
    pub address_space: AddressSpace,
}

impl Thread {
    const FREE: Thread = Thread {
        id: 0,
        state: ThreadState::Free,
        context: TrapState::EMPTY,
        address_space: AddressSpace::new(0),
    };

    fn is_runnable(&self) -> bool {
        matches!(self.state, ThreadState::Ready | ThreadState::Running)
    }
}

/// Fixed-capacity round-robin thread table.
pub struct ThreadTable<const N: usize> {
    threads: [Thread; N],
    current: usize,
    next_id: usize,
}

impl<const N: usize> ThreadTable<N> {
    pub const BOOT_THREAD: usize = 0;

    /// Slot 0 becomes the running boot thread in `boot_space`.
    pub const fn new(boot_space: AddressSpace) -> Self {
        let mut threads = [Thread::FREE; N];
        threads[0].state = ThreadState::Running;
        threads[0].address_space = boot_space;
        Self {
            threads,
            current: 0,
            next_id: 1,
        }
    }

    /// Returns the new thread's id, or `None` when every slot is taken.
    pub fn spawn(&mut self, context: TrapState, address_space: AddressSpace) -> Option<usize> {
        let slot = self
            .threads
            .iter_mut()
            .find(|t| t.state == ThreadState::Free)?;

        let id = self.next_id;
        self.next_id += 1;
        *slot = Thread {
            id,
            state: ThreadState::Ready,
            context,
            address_space,
        };
        Some(id)
    }

    fn leave_rotation(&mut self, state: ThreadState) -> bool {
        let thread = &mut self.threads[self.current];
        if thread.id == Self::BOOT_THREAD {
            return false;
        }
        thread.state = state;
        true
    }

    fn set_state(&mut self, id: usize, state: ThreadState) -> bool {
        match self.get_thread_mut(id) {
            Some(thread) => {
                thread.state = state;
                true
            }
            None => false,
        }
    }

    pub fn thread_count(&self) -> usize {
        self.threads
            .iter()
            .filter(|t| t.state != ThreadState::Free)
            .count()
    }

    pub fn get_thread(&self, id: usize) -> Option<&Thread> {
        self.threads
            .iter()
            .find(|t| t.state != ThreadState::Free && t.id == id)
    }

    pub fn get_thread_mut(&mut self, id: usize) -> Option<&mut Thread> {
        self.threads
            .iter_mut()
            .find(|t| t.state != ThreadState::Free && t.id == id)
    }
}

impl<const N: usize> Scheduler for ThreadTable<N> {
    fn current_context(&mut self) -> &mut TrapState {
        &mut self.threads[self.current].context
    }

    fn current_address_space(&self) -> AddressSpace {
        self.threads[self.current].address_space
    }

    fn schedule(&mut self) {
        let previous = self.current;
        let next = (1..=N)
            .map(|offset| (previous + offset) % N)
            .find(|&slot| self.threads[slot].is_runnable());

        // Nothing else can run: stay on the boot thread if the current one
        // is gone.
        let next = next.unwrap_or(0);

        match self.threads[previous].state {
            ThreadState::Running if next != previous => {
                self.threads[previous].state = ThreadState::Ready;
            }
            ThreadState::Exited if next != previous => {
                self.threads[previous] = Thread::FREE;
            }
            _ => {}
        }

        self.threads[next].state = ThreadState::Running;
        self.current = next;
    }

    fn current_id(&self) -> usize {
        self.threads[self.current].id
    }

    /// The boot thread cannot exit.
    fn exit_current(&mut self) -> bool {
        self.leave_rotation(ThreadState::Exited)
    }

    /// The boot thread cannot block: it is what runs when nothing else can.
    fn block_current(&mut self) -> bool {
        self.leave_rotation(ThreadState::Blocked)
    }

    fn unblock(&mut self, id: usize) -> bool {
        let blocked = matches!(self.get_thread(id), Some(t) if t.state == ThreadState::Blocked);
        blocked && self.set_state(id, ThreadState::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOT: AddressSpace = AddressSpace::new(0x0010_0000);
    const SPACE_A: AddressSpace = AddressSpace::new(0x0040_0000);
    const SPACE_B: AddressSpace = AddressSpace::new(0x0080_0000);

    #[test]
    fn test_round_robin_rotation() {
        let mut table = ThreadTable::<4>::new(BOOT);
        let a = table.spawn(TrapState::new_user(0x1000, 0x2000), SPACE_A).unwrap();
        let b = table.spawn(TrapState::new_user(0x3000, 0x4000), SPACE_B).unwrap();

        table.schedule();
        assert_eq!(table.current_id(), a);
        assert_eq!(table.current_address_space(), SPACE_A);
        table.schedule();
        assert_eq!(table.current_id(), b);
        table.schedule();
        assert_eq!(table.current_id(), ThreadTable::<4>::BOOT_THREAD);
        assert_eq!(table.current_address_space(), BOOT);
    }

    #[test]
    fn test_spawn_fails_when_full() {
        let mut table = ThreadTable::<2>::new(BOOT);
        assert!(table.spawn(TrapState::default(), SPACE_A).is_some());
        assert!(table.spawn(TrapState::default(), SPACE_B).is_none());
        assert_eq!(table.thread_count(), 2);
    }

    #[test]
    fn test_exited_thread_is_freed_after_switch() {
        let mut table = ThreadTable::<4>::new(BOOT);
        let a = table.spawn(TrapState::default(), SPACE_A).unwrap();
        table.schedule();
        assert_eq!(table.current_id(), a);

        assert!(table.exit_current());
        table.schedule();
        assert_eq!(table.current_id(), ThreadTable::<4>::BOOT_THREAD);
        assert!(table.get_thread(a).is_none());
        assert_eq!(table.thread_count(), 1);
    }

    #[test]
    fn test_boot_thread_cannot_exit() {
        let mut table = ThreadTable::<2>::new(BOOT);
        assert!(!table.exit_current());
        table.schedule();
        assert_eq!(table.current_id(), ThreadTable::<2>::BOOT_THREAD);
    }

    #[test]
    fn test_blocked_thread_is_skipped() {
        let mut table = ThreadTable::<4>::new(BOOT);
        let a = table.spawn(TrapState::default(), SPACE_A).unwrap();
        let b = table.spawn(TrapState::default(), SPACE_B).unwrap();
        table.schedule();
        assert!(table.block_current());

        table.schedule();
        assert_eq!(table.current_id(), b);
        table.schedule();
        table.schedule();
        assert_eq!(table.current_id(), b);

        assert!(table.unblock(a));
        assert!(!table.unblock(a));
        table.schedule();
        table.schedule();
        assert_eq!(table.current_id(), a);
    }

    #[test]
    fn test_boot_thread_cannot_block() {
        let mut table = ThreadTable::<2>::new(BOOT);
        assert!(!table.block_current());
        assert_eq!(table.get_thread(ThreadTable::<2>::BOOT_THREAD).unwrap().state, ThreadState::Running);
    }
}

//! Host-side stand-ins for the CPU and the scheduler.

use core::fmt::{self, Write};

use spin::Mutex;
use x86_64::structures::gdt::SegmentSelector;

use crate::interrupts::frame::TrapState;
use crate::interrupts::gate::TableDescriptor;
use crate::interrupts::trampoline::{TrampolineTable, STUB_SIZE};
use crate::interrupts::{InterruptConfig, InterruptController};
use crate::platform::{AddressSpace, Platform};
use crate::thread::Scheduler;

/// Where tests pretend the stub block was linked.
pub const TRAMPOLINE_BASE: u32 = 0x0010_2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    DisableInterrupts,
    EnableInterrupts,
    Halt,
    LoadTable(TableDescriptor),
    LoadSegments(u16, u16),
    SwitchAddressSpace(AddressSpace),
}

#[derive(Default)]
struct MockState {
    events: Vec<Event>,
    output: String,
    interrupts_enabled: bool,
    halted: bool,
    ports: Vec<(u16, u8)>,
}

/// Records every privileged operation instead of performing it.
#[derive(Default)]
pub struct MockPlatform {
    state: Mutex<MockState>,
}

impl MockPlatform {
    /// Starts with interrupts disabled, as after a trap.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    pub fn output(&self) -> String {
        self.state.lock().output.clone()
    }

    pub fn clear_output(&self) {
        self.state.lock().output.clear();
    }

    pub fn halted(&self) -> bool {
        self.state.lock().halted
    }

    /// Value the next `read_port(port)` returns.
    pub fn set_port(&self, port: u16, value: u8) {
        let mut state = self.state.lock();
        state.ports.retain(|(p, _)| *p != port);
        state.ports.push((port, value));
    }

    fn record(&self, event: Event) {
        self.state.lock().events.push(event);
    }
}

impl Platform for MockPlatform {
    fn disable_interrupts(&self) {
        self.state.lock().interrupts_enabled = false;
        self.record(Event::DisableInterrupts);
    }

    fn enable_interrupts(&self) {
        self.state.lock().interrupts_enabled = true;
        self.record(Event::EnableInterrupts);
    }

    fn interrupts_enabled(&self) -> bool {
        self.state.lock().interrupts_enabled
    }

    fn halt(&self) {
        self.state.lock().halted = true;
        self.record(Event::Halt);
    }

    unsafe fn load_table(&self, descriptor: &TableDescriptor) {
        self.record(Event::LoadTable(*descriptor));
    }

    fn load_kernel_segments(&self, data: SegmentSelector, extra: SegmentSelector) {
        self.record(Event::LoadSegments(data.0, extra.0));
    }

    fn switch_address_space(&self, space: AddressSpace) {
        self.record(Event::SwitchAddressSpace(space));
    }

    fn read_port(&self, port: u16) -> u8 {
        self.state
            .lock()
            .ports
            .iter()
            .find(|(p, _)| *p == port)
            .map_or(0xFF, |(_, value)| *value)
    }

    fn print(&self, args: fmt::Arguments) {
        let _ = self.state.lock().output.write_fmt(args);
    }
}

/// A fresh controller with nothing installed. Leaked because installation
/// wants `&'static self`.
pub fn controller(config: InterruptConfig) -> &'static InterruptController<MockPlatform> {
    Box::leak(Box::new(InterruptController::new(MockPlatform::new(), config)))
}

/// A controller whose table has been built over stubs at [`TRAMPOLINE_BASE`],
/// with the install events and output already cleared.
pub fn installed_controller(config: InterruptConfig) -> &'static InterruptController<MockPlatform> {
    let controller = controller(config);
    let trampolines =
        unsafe { TrampolineTable::with_end(TRAMPOLINE_BASE, TRAMPOLINE_BASE + 256 * STUB_SIZE) };
    controller
        .build_and_install(&trampolines)
        .expect("mock trampoline block is well formed");
    controller.platform().clear_events();
    controller.platform().clear_output();
    controller
}

/// Two threads; switches to the other one only when told to, or when the
/// current one exits or blocks.
pub struct ScriptedScheduler {
    contexts: [TrapState; 2],
    spaces: [AddressSpace; 2],
    current: usize,
    switch_pending: bool,
}

impl ScriptedScheduler {
    pub fn new(first: AddressSpace, second: AddressSpace) -> Self {
        Self {
            contexts: [TrapState::default(); 2],
            spaces: [first, second],
            current: 0,
            switch_pending: false,
        }
    }

    pub fn context(&self, thread: usize) -> &TrapState {
        &self.contexts[thread]
    }

    pub fn context_mut(&mut self, thread: usize) -> &mut TrapState {
        &mut self.contexts[thread]
    }

    pub fn switch_on_next_schedule(&mut self) {
        self.switch_pending = true;
    }
}

impl Scheduler for ScriptedScheduler {
    fn current_context(&mut self) -> &mut TrapState {
        &mut self.contexts[self.current]
    }

    fn current_address_space(&self) -> AddressSpace {
        self.spaces[self.current]
    }

    fn schedule(&mut self) {
        if self.switch_pending {
            self.current = 1 - self.current;
            self.switch_pending = false;
        }
    }

    fn current_id(&self) -> usize {
        self.current
    }

    fn exit_current(&mut self) -> bool {
        self.switch_pending = true;
        true
    }

    fn block_current(&mut self) -> bool {
        self.switch_pending = true;
        true
    }

    fn unblock(&mut self, _id: usize) -> bool {
        false
    }
}

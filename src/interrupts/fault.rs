//! Fallback for every vector nobody registered a handler for.

use super::dispatch::TrapContext;
use crate::kprintln;

/// Reports the trap cause and stops the machine. There is no recovery path.
pub fn default_fault_handler(trap: &mut TrapContext<'_>) {
    let platform = trap.platform();
    let frame = *trap.frame();

    platform.disable_interrupts();
    kprintln!(platform);
    kprintln!(platform, "Unhandled interrupt! Disabling interrupts and halting!");
    kprintln!(platform, "Interrupt number: {:#04x}", frame.vector());
    kprintln!(platform, "Exception code: {:#010x}", frame.error_code);
    kprintln!(platform, "EIP: {:#010x}", frame.eip);
    platform.halt();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupts::frame::{TrapFrame, TrapState};
    use crate::platform::{AddressSpace, Platform};
    use crate::testing::{Event, MockPlatform, ScriptedScheduler};

    #[test]
    fn test_reports_cause_then_halts() {
        let platform = MockPlatform::new();
        platform.enable_interrupts();
        platform.clear_events();

        let mut state = TrapState {
            frame: TrapFrame {
                vector: 0x0D,
                error_code: 0x18,
                eip: 0xC010_0040,
                ..TrapFrame::default()
            },
            ..TrapState::default()
        };
        let mut scheduler = ScriptedScheduler::new(AddressSpace::new(0), AddressSpace::new(0));
        default_fault_handler(&mut TrapContext::new(&platform, &mut state, &mut scheduler));

        let output = platform.output();
        assert!(output.contains("Unhandled interrupt!"));
        assert!(output.contains("Interrupt number: 0x0d"));
        assert!(output.contains("Exception code: 0x00000018"));
        assert!(output.contains("EIP: 0xc0100040"));
        assert_eq!(
            platform.events(),
            vec![Event::DisableInterrupts, Event::Halt]
        );
        assert!(platform.halted());
    }
}

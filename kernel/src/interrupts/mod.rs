//! Supervisor trap handling.
//!
//! The assembly entry saves a [`TrapFrame`] and calls `trap_handler`, which hands the
//! frame to the global [`TrapDispatcher`]. Timer interrupts only advance the tick
//! counter and re-arm the deadline; nothing here touches the scheduler, so a process
//! that never yields keeps the CPU.

pub mod trap;

use core::sync::atomic::{AtomicU64, Ordering};

use crate::{
    arch::Hart,
    constants::{
        trap::{TICK_REPORT_INTERVAL, TIMER_INTERVAL},
        BootConfig,
    },
};
use trap::{Interrupt, Trap, TrapFrame};

/// Global dispatcher used by the trap entry.
pub static TRAPS: TrapDispatcher = TrapDispatcher::new();

pub struct TrapDispatcher {
    ticks: AtomicU64,
    timer_interval: AtomicU64,
}

impl Default for TrapDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TrapDispatcher {
    pub const fn new() -> Self {
        TrapDispatcher {
            ticks: AtomicU64::new(0),
            timer_interval: AtomicU64::new(TIMER_INTERVAL),
        }
    }

    /// Installs the trap vector, enables the timer source and global interrupts,
    /// and arms the first deadline.
    pub fn init(&self, hart: &impl Hart, trap_vector: usize, config: &BootConfig) {
        self.timer_interval.store(config.timer_interval, Ordering::Relaxed);
        hart.set_trap_vector(trap_vector);
        hart.enable_timer_interrupt();
        hart.enable_interrupts();
        hart.set_timer(config.timer_interval);
        log::info!("Trap handling initialized");
    }

    /// Routes one trap. Exceptions are fatal: the hart is parked and this call
    /// does not return.
    pub fn dispatch(&self, frame: &mut TrapFrame, hart: &impl Hart) {
        match frame.trap() {
            Trap::Interrupt(Interrupt::SupervisorTimer) => {
                self.timer_tick(hart);
            }
            Trap::Interrupt(other) => {
                log::warn!("[TRAP] Unknown interrupt: {:#x}", other.code());
            }
            Trap::Exception(cause) => {
                log::error!("[TRAP] Exception! {}", cause);
                log::error!("  scause: {:#x}", frame.scause);
                log::error!("  stval: {:#x}", frame.stval);
                log::error!("  sepc: {:#x}", frame.sepc);
                hart.halt()
            }
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Counts the tick and re-arms the timer. Returns whether the tick was reported.
    fn timer_tick(&self, hart: &impl Hart) -> bool {
        let ticks = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let report = ticks % TICK_REPORT_INTERVAL == 0;
        if report {
            log::info!("[TIMER] Tick: {}", ticks);
        }
        hart.set_timer(self.timer_interval.load(Ordering::Relaxed));
        report
    }
}

/// Ticks seen by the global dispatcher since boot.
pub fn ticks() -> u64 {
    TRAPS.ticks()
}

#[cfg(target_arch = "riscv64")]
pub fn init(hart: &impl Hart, config: &BootConfig) {
    TRAPS.init(hart, crate::arch::riscv64::trap_entry(), config);
}

#[cfg(target_arch = "riscv64")]
#[no_mangle]
extern "C" fn trap_handler(frame: &mut TrapFrame) {
    TRAPS.dispatch(frame, &crate::arch::riscv64::Riscv64Hart);
}

#[cfg(test)]
mod tests {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    use super::*;
    use crate::{constants::trap::CAUSE_INTERRUPT, testing::RecordingHart};

    fn timer_frame() -> TrapFrame {
        TrapFrame::with_cause(CAUSE_INTERRUPT | 5, 0, 0x8020_1000)
    }

    #[test]
    fn init_programs_the_hart() {
        let hart = RecordingHart::default();
        let traps = TrapDispatcher::new();
        let config = BootConfig {
            activate_paging: false,
            timer_interval: 500,
        };
        traps.init(&hart, 0x8020_0100, &config);

        assert_eq!(hart.trap_vector.get(), Some(0x8020_0100));
        assert!(hart.timer_interrupt_enabled.get());
        assert!(hart.interrupts_enabled.get());
        assert_eq!(hart.timers_armed.get(), 1);
        assert_eq!(hart.last_interval.get(), Some(500));
    }

    #[test]
    fn timer_interrupt_counts_and_rearms() {
        let hart = RecordingHart::default();
        let traps = TrapDispatcher::new();

        for _ in 0..3 {
            traps.dispatch(&mut timer_frame(), &hart);
        }

        assert_eq!(traps.ticks(), 3);
        assert_eq!(hart.timers_armed.get(), 3);
        assert_eq!(hart.last_interval.get(), Some(TIMER_INTERVAL));
    }

    #[test]
    fn ticks_are_reported_on_multiples_of_the_interval() {
        let hart = RecordingHart::default();
        let traps = TrapDispatcher::new();

        let reported: Vec<u64> = (0..2 * TICK_REPORT_INTERVAL + 1)
            .filter_map(|_| traps.timer_tick(&hart).then(|| traps.ticks()))
            .collect();

        assert_eq!(reported, [TICK_REPORT_INTERVAL, 2 * TICK_REPORT_INTERVAL]);
        assert_eq!(hart.timers_armed.get(), 2 * TICK_REPORT_INTERVAL as usize + 1);
    }

    #[test]
    fn unknown_interrupt_is_dropped() {
        let hart = RecordingHart::default();
        let traps = TrapDispatcher::new();
        let mut frame = TrapFrame::with_cause(CAUSE_INTERRUPT | 9, 0, 0);
        let before = frame;

        traps.dispatch(&mut frame, &hart);

        assert_eq!(traps.ticks(), 0);
        assert_eq!(hart.timers_armed.get(), 0);
        assert_eq!(frame, before);
    }

    #[test]
    fn exception_halts_and_never_resumes() {
        let hart = RecordingHart::default();
        let traps = TrapDispatcher::new();
        let mut frame = TrapFrame::with_cause(13, 0xdead_b000, 0x8020_2000);
        let mut resumed = false;

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            traps.dispatch(&mut frame, &hart);
            resumed = true;
        }));

        assert!(outcome.is_err());
        assert!(!resumed);
        assert_eq!(traps.ticks(), 0);
    }
}

//! Trap and timer configuration.

/// Top bit of `scause`: set for interrupts, clear for exceptions.
pub const CAUSE_INTERRUPT: u64 = 1 << 63;

pub const IRQ_SUPERVISOR_SOFTWARE: u64 = 1;
pub const IRQ_SUPERVISOR_TIMER: u64 = 5;
pub const IRQ_SUPERVISOR_EXTERNAL: u64 = 9;

/// QEMU `virt` timebase is 10 MHz, so this is one tick per millisecond.
pub const TIMER_INTERVAL: u64 = 10_000;
/// Ticks between two timer diagnostics.
pub const TICK_REPORT_INTERVAL: u64 = 1000;

//! Architecture seam.
//!
//! Core components reach the control/status registers only through [`Hart`], so they
//! can be exercised off-target with a recording implementation.

#[cfg(target_arch = "riscv64")]
pub mod riscv64;

#[cfg(target_arch = "riscv64")]
pub use riscv64::without_interrupts;

/// Executes a closure with interrupts disabled.
///
/// Off-target there are no interrupts to mask.
#[cfg(not(target_arch = "riscv64"))]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}

/// Privileged operations on the executing hardware thread.
pub trait Hart {
    /// Installs `entry` as the direct-mode trap vector.
    fn set_trap_vector(&self, entry: usize);

    /// Enables the supervisor timer interrupt source.
    fn enable_timer_interrupt(&self);

    /// Sets the global supervisor interrupt-enable bit.
    fn enable_interrupts(&self);

    /// Requests the next timer interrupt `interval` timebase cycles from now.
    fn set_timer(&self, interval: u64);

    /// Writes `satp` and invalidates cached translations.
    fn write_satp(&self, satp: u64);

    fn wait_for_interrupt(&self);

    /// Parks the hart for good.
    fn halt(&self) -> ! {
        loop {
            self.wait_for_interrupt();
        }
    }
}

//! System-wide constants and platform-specific values for the QEMU `virt` machine.

pub mod fs;
pub mod memory;
pub mod ports;
pub mod processes;
pub mod trap;

/// Boot-time policy flags, fixed at compile time through cargo features.
#[derive(Debug, Clone, Copy)]
pub struct BootConfig {
    /// Write `satp` with the kernel page table once it is built. When unset the
    /// table is still constructed but the kernel keeps running untranslated.
    pub activate_paging: bool,
    /// Timer cycles between two supervisor timer interrupts.
    pub timer_interval: u64,
}

pub const BOOT_CONFIG: BootConfig = BootConfig {
    activate_paging: cfg!(feature = "paging"),
    timer_interval: trap::TIMER_INTERVAL,
};

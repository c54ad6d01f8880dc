#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]

pub mod arch;
pub mod constants;
pub mod devices;
pub mod filesys;
pub mod interrupts;
pub mod logging;
pub mod memory;
pub mod processes;
pub mod shell;

#[cfg(test)]
mod testing;

pub use devices::serial;

pub mod prelude {
    pub use crate::debug_println;
    pub use crate::serial_print;
    pub use crate::serial_println;
}

#[macro_export]
macro_rules! debug_println {
    ($($arg:tt)*) => {
        #[cfg(debug_assertions)]
        $crate::serial_println!($($arg)*);
    }
}

/// Parks the boot hart.
#[cfg(target_arch = "riscv64")]
pub fn idle_loop() -> ! {
    use arch::Hart;
    arch::riscv64::Riscv64Hart.halt()
}

#![no_std]
#![no_main]

use nos::{
    arch::riscv64::Riscv64Hart,
    constants::BOOT_CONFIG,
    filesys, idle_loop, info, interrupts, logging, memory,
    prelude::*,
    processes,
};

extern "C" {
    static mut sbss: u8;
    static mut ebss: u8;
}

/// Zeroes `.bss`; the boot stack lives below `sbss` and is left alone.
unsafe fn clear_bss() {
    let start = core::ptr::addr_of_mut!(sbss);
    let end = core::ptr::addr_of_mut!(ebss);
    core::ptr::write_bytes(start, 0, end as usize - start as usize);
}

#[no_mangle]
extern "C" fn kmain() -> ! {
    unsafe { clear_bss() };

    if logging::init().is_err() {
        serial_println!("Logger already installed");
    }

    serial_println!();
    serial_println!("========================================");
    serial_println!("  NOS - Teaching Operating System");
    serial_println!("  RISC-V Edition");
    serial_println!("========================================");
    serial_println!();
    debug_println!("Boot config: {:?}", BOOT_CONFIG);

    let hart = Riscv64Hart;

    info!("Initializing memory management...");
    memory::init(&hart, &BOOT_CONFIG);

    info!("Initializing trap handling...");
    interrupts::init(&hart, &BOOT_CONFIG);

    info!("Initializing file system...");
    filesys::init();

    info!("Initializing process management...");
    processes::init(&hart)
}

#[panic_handler]
fn rust_panic(info: &core::panic::PanicInfo) -> ! {
    serial_println!("Kernel panic: {}", info);
    idle_loop();
}

pub mod process;
pub mod registers;
pub mod scheduler;

use spin::Mutex;

use scheduler::Scheduler;

/// The kernel's process table and ready queue.
///
/// Only process context touches it (trap handlers never do), so on a single hart
/// the lock is never contended. It must be released before a context switch.
pub static SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::new());

#[cfg(target_arch = "riscv64")]
pub use kernel_processes::{init, yield_now};

#[cfg(target_arch = "riscv64")]
mod kernel_processes {
    use super::{
        process::ProcessEntry,
        scheduler::ContextSwitch,
        SCHEDULER,
    };
    use crate::{
        arch::{riscv64, Hart},
        constants::processes::{DEMO_ITERATIONS, DEMO_SPIN_ITERATIONS},
        memory::frame_allocator::with_bitmap_frame_allocator,
        serial_println, shell,
    };

    const BOOT_PROCESSES: [(&str, ProcessEntry); 4] = [
        ("idle", idle_process),
        ("test1", test_process_1),
        ("test2", test_process_2),
        ("shell", shell::run),
    ];

    /// Resets the process table, creates the boot processes and dispatches the
    /// first one. Control never comes back to the caller.
    pub fn init(hart: &impl Hart) -> ! {
        let switch = {
            let mut scheduler = SCHEDULER.lock();
            scheduler.reset();
            log::info!("Process management initialized");

            with_bitmap_frame_allocator(|frames| {
                for (name, entry) in BOOT_PROCESSES {
                    if let Err(e) = scheduler.create(name, entry, frames) {
                        log::error!("Could not create {}: {}", name, e);
                    }
                }
            });
            scheduler.schedule()
        };

        match switch {
            Some(switch) => unsafe { perform(switch) },
            None => log::error!("No process to run"),
        }
        hart.halt()
    }

    /// Gives up the CPU to the next ready process. Returns once this process
    /// is scheduled again.
    pub fn yield_now() {
        let switch = SCHEDULER.lock().yield_now();
        if let Some(switch) = switch {
            unsafe { perform(switch) }
        }
    }

    /// # Safety
    ///
    /// The scheduler lock must not be held; the contexts point into `SCHEDULER`.
    unsafe fn perform(switch: ContextSwitch) {
        match switch {
            ContextSwitch::Swap { save, load } => riscv64::switch_context(save, load),
            ContextSwitch::Start { load } => riscv64::load_context(load),
        }
    }

    fn busy_wait() {
        for i in 0..DEMO_SPIN_ITERATIONS {
            core::hint::black_box(i);
        }
    }

    fn idle_process() -> ! {
        loop {
            serial_println!("[IDLE] Running...");
            busy_wait();
            yield_now();
        }
    }

    fn test_process_1() -> ! {
        greeter(1)
    }

    fn test_process_2() -> ! {
        greeter(2)
    }

    fn greeter(n: usize) -> ! {
        for i in 0..DEMO_ITERATIONS {
            serial_println!("[PROC{}] Hello from process {}! (iteration {})", n, n, i);
            busy_wait();
            yield_now();
        }
        serial_println!("[PROC{}] Process {} finished", n, n);
        loop {
            yield_now();
        }
    }
}

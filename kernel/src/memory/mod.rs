pub mod address;
pub mod bitmap_frame_allocator;
pub mod frame_allocator;
pub mod paging;

use address::PhysFrame;

use crate::constants::memory::FRAME_SIZE;

/// Resolves physical frames to addressable memory.
///
/// # Safety
///
/// `frame_ptr` must return a pointer valid for reads and writes of `FRAME_SIZE`
/// bytes, aligned to `FRAME_SIZE`, for every frame the paired allocator manages.
pub unsafe trait FrameMemory {
    fn frame_ptr(&self, frame: PhysFrame) -> *mut u8;

    fn zero_frame(&self, frame: PhysFrame) {
        // SAFETY: guaranteed by the trait contract.
        unsafe { core::ptr::write_bytes(self.frame_ptr(frame), 0, FRAME_SIZE) }
    }
}

/// Physical addresses are directly dereferenceable: the kernel runs untranslated,
/// or under the identity-mapped kernel page table.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectMap;

unsafe impl FrameMemory for DirectMap {
    fn frame_ptr(&self, frame: PhysFrame) -> *mut u8 {
        frame.start_address().as_u64() as *mut u8
    }
}

#[cfg(target_arch = "riscv64")]
pub use kernel_space::{init, KERNEL_PAGE_TABLE};

#[cfg(target_arch = "riscv64")]
mod kernel_space {
    use spin::Once;

    use super::{
        address::PhysAddr,
        bitmap_frame_allocator::{BitmapFrameAllocator, FrameRegion},
        frame_allocator::{with_bitmap_frame_allocator, KernelFrameAllocator, FRAME_ALLOCATOR},
        paging::{MapError, PageTable, PteFlags},
        DirectMap,
    };
    use crate::{
        arch::Hart,
        constants::{
            memory::{KERNEL_BASE, MAX_FRAMES, PAGE_SIZE, RAM_END, RAM_START},
            ports::SERIAL_PORT,
            BootConfig,
        },
    };

    extern "C" {
        static kernel_end: u8;
    }

    /// Kernel address space, built at boot and kept for the life of the system.
    pub static KERNEL_PAGE_TABLE: Once<PageTable> = Once::new();

    /// Brings up the frame allocator, then builds the kernel page table.
    pub fn init(hart: &impl Hart, config: &BootConfig) {
        let end = PhysAddr::new(unsafe { &kernel_end as *const u8 as u64 });
        let region = FrameRegion {
            base: PhysAddr::new(KERNEL_BASE),
            frames: MAX_FRAMES,
        };
        *FRAME_ALLOCATOR.lock() = Some(BitmapFrameAllocator::new(DirectMap, region, end));

        match with_bitmap_frame_allocator(build_kernel_table) {
            Ok(table) => {
                log::info!("Kernel page table created");
                let table = KERNEL_PAGE_TABLE.call_once(|| table);
                if config.activate_paging {
                    table.switch_to(hart);
                    log::info!("Virtual memory ready (Sv39, satp = {:#x})", table.satp());
                } else {
                    log::info!("Virtual memory ready (paging disabled for simplicity)");
                }
            }
            Err(e) => log::error!("Failed to create kernel page table: {}", e),
        }
    }

    fn build_kernel_table(frames: &mut KernelFrameAllocator) -> Result<PageTable, MapError> {
        let mut table = PageTable::create(frames)?;
        let kernel_flags = PteFlags::READABLE
            | PteFlags::WRITABLE
            | PteFlags::EXECUTABLE
            | PteFlags::GLOBAL
            | PteFlags::ACCESSED
            | PteFlags::DIRTY;
        table.map_identity(frames, PhysAddr::new(RAM_START), PhysAddr::new(RAM_END), kernel_flags)?;

        let uart = PhysAddr::new(SERIAL_PORT as u64);
        table.map_identity(
            frames,
            uart,
            PhysAddr::new(uart.as_u64() + PAGE_SIZE),
            PteFlags::READABLE | PteFlags::WRITABLE | PteFlags::GLOBAL | PteFlags::ACCESSED | PteFlags::DIRTY,
        )?;
        Ok(table)
    }
}

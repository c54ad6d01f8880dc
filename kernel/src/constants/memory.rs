pub const PAGE_SIZE: u64 = 4096;
pub const FRAME_SIZE: usize = 4096;
pub const PAGE_SHIFT: u64 = 12;

/// Start of DRAM on QEMU `virt`.
pub const RAM_START: u64 = 0x8000_0000;
/// Default `-m 128M` machine.
pub const RAM_SIZE: u64 = 128 * 1024 * 1024;
pub const RAM_END: u64 = RAM_START + RAM_SIZE;

/// Load address of the kernel image (right above the SBI firmware).
/// The frame allocator manages everything from here to the end of RAM.
pub const KERNEL_BASE: u64 = 0x8020_0000;

pub const MAX_FRAMES: usize = ((RAM_END - KERNEL_BASE) / PAGE_SIZE) as usize;
pub const BITMAP_ENTRY_SIZE: usize = 64;
pub const BITMAP_ENTRIES: usize = MAX_FRAMES.div_ceil(BITMAP_ENTRY_SIZE);

// Sv39
pub const PAGE_TABLE_ENTRIES: usize = 512;
pub const PAGE_TABLE_LEVELS: usize = 3;
pub const VPN_BITS: u64 = 9;
pub const VPN_MASK: u64 = (1 << VPN_BITS) - 1;
pub const SATP_MODE_SV39: u64 = 8;

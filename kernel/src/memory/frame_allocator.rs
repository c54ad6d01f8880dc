//! Global frame allocator shared by the kernel once memory is brought up.

use spin::Mutex;

use crate::memory::{bitmap_frame_allocator::BitmapFrameAllocator, DirectMap};

pub type KernelFrameAllocator = BitmapFrameAllocator<DirectMap>;

/// Global frame allocator so there is just one actual allocator throughout the codebase.
/// `None` until `memory::init` runs.
pub static FRAME_ALLOCATOR: Mutex<Option<KernelFrameAllocator>> = Mutex::new(None);

/// Number of free frames, or zero before the allocator exists.
pub fn free_frame_count() -> usize {
    FRAME_ALLOCATOR
        .lock()
        .as_ref()
        .map_or(0, |allocator| allocator.free_frame_count())
}

pub fn with_bitmap_frame_allocator<F, R>(f: F) -> R
where
    F: FnOnce(&mut KernelFrameAllocator) -> R,
{
    let mut guard = FRAME_ALLOCATOR.lock();
    if let Some(ref mut allocator) = *guard {
        f(allocator)
    } else {
        panic!("Frame allocator does not exist.");
    }
}

use core::fmt;

use crate::{
    constants::memory::{BITMAP_ENTRIES, BITMAP_ENTRY_SIZE, FRAME_SIZE, MAX_FRAMES, PAGE_SIZE},
    memory::{
        address::{PhysAddr, PhysFrame},
        FrameMemory,
    },
};

const FULL_BITMAP_ENTRY: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    OutOfMemory,
    OutOfRange(PhysAddr),
    Misaligned(PhysAddr),
    DoubleFree(PhysAddr),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::OutOfMemory => write!(f, "Out of memory"),
            FrameError::OutOfRange(addr) => write!(f, "Invalid page address: {:#x}", addr.as_u64()),
            FrameError::Misaligned(addr) => write!(f, "Unaligned page address: {:#x}", addr.as_u64()),
            FrameError::DoubleFree(addr) => write!(f, "Double free detected: {:#x}", addr.as_u64()),
        }
    }
}

/// A contiguous physical range handed to the allocator.
#[derive(Debug, Clone, Copy)]
pub struct FrameRegion {
    pub base: PhysAddr,
    pub frames: usize,
}

/// First-fit bitmap allocator over `[base, base + total_frames * FRAME_SIZE)`.
///
/// Frames below `first_free_frame` hold the kernel image and stay allocated forever.
pub struct BitmapFrameAllocator<M: FrameMemory> {
    memory: M,
    base: PhysAddr,
    total_frames: usize,
    free_frames: usize,
    first_free_frame: usize,
    bitmap: [u64; BITMAP_ENTRIES],
}

impl<M: FrameMemory> BitmapFrameAllocator<M> {
    /// Builds the allocator and reserves every frame below `kernel_end`.
    ///
    /// `region.frames` is clamped to `MAX_FRAMES`, the capacity of the bitmap.
    pub fn new(memory: M, region: FrameRegion, kernel_end: PhysAddr) -> Self {
        let base = PhysAddr::new(region.base.as_u64() & !(PAGE_SIZE - 1));
        let total_frames = region.frames.min(MAX_FRAMES);
        if total_frames < region.frames {
            log::warn!(
                "Frame region of {} frames truncated to {}",
                region.frames,
                total_frames
            );
        }

        let kernel_bytes = kernel_end.as_u64().saturating_sub(base.as_u64());
        let first_free_frame =
            (PhysAddr::new(kernel_bytes).align_up().as_u64() / PAGE_SIZE).min(total_frames as u64) as usize;

        let mut allocator = Self {
            memory,
            base,
            total_frames,
            free_frames: total_frames - first_free_frame,
            first_free_frame,
            bitmap: [0; BITMAP_ENTRIES],
        };

        for frame_index in 0..first_free_frame {
            allocator.set_bit(frame_index);
        }

        log::info!(
            "Physical memory: {} MB",
            (total_frames * FRAME_SIZE) / (1024 * 1024)
        );
        log::info!(
            "Total pages: {}, Free pages: {}",
            allocator.total_frames,
            allocator.free_frames
        );

        allocator
    }

    /// Allocates the lowest free frame and zero-fills it.
    pub fn allocate(&mut self) -> Result<PhysFrame, FrameError> {
        let Some(frame_index) = self.find_free() else {
            log::error!("Out of memory!");
            return Err(FrameError::OutOfMemory);
        };

        self.set_bit(frame_index);
        self.free_frames -= 1;

        let frame = self.frame_at(frame_index);
        self.memory.zero_frame(frame);
        Ok(frame)
    }

    /// Returns a frame to the pool. Invalid requests are logged and leave the
    /// allocator untouched.
    pub fn free(&mut self, addr: PhysAddr) -> Result<(), FrameError> {
        let result = self.release(addr);
        if let Err(e) = result {
            log::warn!("{}", e);
        }
        result
    }

    fn release(&mut self, addr: PhysAddr) -> Result<(), FrameError> {
        let first = self.base.as_u64() + (self.first_free_frame * FRAME_SIZE) as u64;
        if addr.as_u64() < first || addr >= self.end_address() {
            return Err(FrameError::OutOfRange(addr));
        }
        if !addr.is_aligned() {
            return Err(FrameError::Misaligned(addr));
        }

        let frame_index = ((addr.as_u64() - self.base.as_u64()) / PAGE_SIZE) as usize;
        if !self.is_bit_set(frame_index) {
            return Err(FrameError::DoubleFree(addr));
        }

        self.clear_bit(frame_index);
        self.free_frames += 1;
        Ok(())
    }

    pub fn free_frame_count(&self) -> usize {
        self.free_frames
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn first_free_frame(&self) -> usize {
        self.first_free_frame
    }

    pub fn base(&self) -> PhysAddr {
        self.base
    }

    /// One past the last managed address.
    pub fn end_address(&self) -> PhysAddr {
        PhysAddr::new(self.base.as_u64() + (self.total_frames * FRAME_SIZE) as u64)
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Check if frame is used. Frames outside the managed range report `false`.
    pub fn is_frame_used(&self, frame: PhysFrame) -> bool {
        let addr = frame.start_address();
        if addr < self.base || addr >= self.end_address() {
            return false;
        }
        self.is_bit_set(((addr.as_u64() - self.base.as_u64()) / PAGE_SIZE) as usize)
    }

    fn frame_at(&self, frame_index: usize) -> PhysFrame {
        PhysFrame::containing_address(PhysAddr::new(
            self.base.as_u64() + (frame_index * FRAME_SIZE) as u64,
        ))
    }

    /// Ascending first-fit scan from `first_free_frame`, skipping full words.
    fn find_free(&self) -> Option<usize> {
        if self.free_frames == 0 {
            return None;
        }

        let mut frame_index = self.first_free_frame;
        while frame_index < self.total_frames {
            let word = self.bitmap[frame_index / BITMAP_ENTRY_SIZE];
            if word == FULL_BITMAP_ENTRY {
                frame_index = (frame_index / BITMAP_ENTRY_SIZE + 1) * BITMAP_ENTRY_SIZE;
                continue;
            }
            if !self.is_bit_set(frame_index) {
                return Some(frame_index);
            }
            frame_index += 1;
        }
        None
    }

    /// set a particular bit (1), taking in frame_index (usize)
    fn set_bit(&mut self, frame_index: usize) {
        assert!(frame_index < self.total_frames);

        let word_index = frame_index / BITMAP_ENTRY_SIZE;
        let bit_index = frame_index % BITMAP_ENTRY_SIZE;
        self.bitmap[word_index] |= 1 << bit_index;
    }

    /// clear a particular bit (0), taking in frame_index (usize)
    fn clear_bit(&mut self, frame_index: usize) {
        assert!(frame_index < self.total_frames);

        let word_index = frame_index / BITMAP_ENTRY_SIZE;
        let bit_index = frame_index % BITMAP_ENTRY_SIZE;
        self.bitmap[word_index] &= !(1 << bit_index);
    }

    /// check if bit is set at frame_index. returns true if bit == 1, false otherwise
    fn is_bit_set(&self, frame_index: usize) -> bool {
        assert!(frame_index < self.total_frames);

        let word_index = frame_index / BITMAP_ENTRY_SIZE;
        let bit_index = frame_index % BITMAP_ENTRY_SIZE;
        (self.bitmap[word_index] & (1 << bit_index)) != 0
    }
}

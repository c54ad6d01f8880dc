//! Host-side stand-ins for physical memory and the hart.
//!
//! Unit tests run under the host's `#[test]` harness instead of a `#[test_case]`
//! runner booted in QEMU, so every privileged access goes through these fakes.

use std::{
    alloc::{alloc_zeroed, dealloc, Layout},
    cell::Cell,
};

use crate::{
    arch::Hart,
    constants::memory::FRAME_SIZE,
    memory::{
        address::{PhysAddr, PhysFrame},
        FrameMemory,
    },
};

/// A heap arena posing as `frames` physical frames starting at `base`.
pub struct SimulatedMemory {
    base: PhysAddr,
    frames: usize,
    arena: *mut u8,
}

impl SimulatedMemory {
    pub fn new(base: PhysAddr, frames: usize) -> Self {
        let arena = unsafe { alloc_zeroed(Self::layout(frames)) };
        assert!(!arena.is_null(), "arena allocation failed");
        SimulatedMemory { base, frames, arena }
    }

    fn layout(frames: usize) -> Layout {
        Layout::from_size_align(frames.max(1) * FRAME_SIZE, FRAME_SIZE).unwrap()
    }
}

unsafe impl FrameMemory for SimulatedMemory {
    fn frame_ptr(&self, frame: PhysFrame) -> *mut u8 {
        let offset = frame.start_address().as_u64() - self.base.as_u64();
        assert!(
            (offset as usize) < self.frames * FRAME_SIZE,
            "frame {:?} outside the simulated arena",
            frame
        );
        unsafe { self.arena.add(offset as usize) }
    }
}

impl Drop for SimulatedMemory {
    fn drop(&mut self) {
        unsafe { dealloc(self.arena, Self::layout(self.frames)) }
    }
}

/// Records every privileged operation instead of performing it.
#[derive(Default)]
pub struct RecordingHart {
    pub trap_vector: Cell<Option<usize>>,
    pub timer_interrupt_enabled: Cell<bool>,
    pub interrupts_enabled: Cell<bool>,
    pub timers_armed: Cell<usize>,
    pub last_interval: Cell<Option<u64>>,
    pub satp: Cell<Option<u64>>,
}

impl Hart for RecordingHart {
    fn set_trap_vector(&self, entry: usize) {
        self.trap_vector.set(Some(entry));
    }

    fn enable_timer_interrupt(&self) {
        self.timer_interrupt_enabled.set(true);
    }

    fn enable_interrupts(&self) {
        self.interrupts_enabled.set(true);
    }

    fn set_timer(&self, interval: u64) {
        self.timers_armed.set(self.timers_armed.get() + 1);
        self.last_interval.set(Some(interval));
    }

    fn write_satp(&self, satp: u64) {
        self.satp.set(Some(satp));
    }

    fn wait_for_interrupt(&self) {}

    /// Unwinds so a test can observe that the hart was parked.
    fn halt(&self) -> ! {
        panic!("hart halted");
    }
}

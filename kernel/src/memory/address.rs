//! Physical/virtual address newtypes and Sv39 index helpers.

use core::fmt;

use crate::constants::memory::{PAGE_SHIFT, PAGE_SIZE, VPN_BITS, VPN_MASK};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct PhysAddr(u64);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct VirtAddr(u64);

/// A 4 KiB physical frame, identified by its frame number (address >> 12).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysFrame {
    number: u64,
}

impl PhysAddr {
    pub const fn new(addr: u64) -> Self {
        PhysAddr(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn is_aligned(self) -> bool {
        self.0 & (PAGE_SIZE - 1) == 0
    }

    pub const fn align_up(self) -> Self {
        PhysAddr((self.0 + PAGE_SIZE - 1) & !(PAGE_SIZE - 1))
    }
}

impl VirtAddr {
    pub const fn new(addr: u64) -> Self {
        VirtAddr(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Index into the page table node at `level` (2 = root, 0 = leaf node).
    pub const fn vpn(self, level: usize) -> usize {
        ((self.0 >> (PAGE_SHIFT + VPN_BITS * level as u64)) & VPN_MASK) as usize
    }
}

impl PhysFrame {
    /// Returns the frame starting at `addr`, or `None` if `addr` is not frame aligned.
    #[cfg(test)]
    pub const fn from_start_address(addr: PhysAddr) -> Option<Self> {
        if addr.is_aligned() {
            Some(PhysFrame {
                number: addr.0 >> PAGE_SHIFT,
            })
        } else {
            None
        }
    }

    pub const fn containing_address(addr: PhysAddr) -> Self {
        PhysFrame {
            number: addr.0 >> PAGE_SHIFT,
        }
    }

    pub const fn from_number(number: u64) -> Self {
        PhysFrame { number }
    }

    pub const fn number(self) -> u64 {
        self.number
    }

    pub const fn start_address(self) -> PhysAddr {
        PhysAddr(self.number << PAGE_SHIFT)
    }

    /// First address past the frame; a descending stack placed in this frame starts here.
    pub const fn end_address(self) -> PhysAddr {
        PhysAddr((self.number + 1) << PAGE_SHIFT)
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#x})", self.0)
    }
}

impl fmt::Debug for PhysFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysFrame({:#x})", self.start_address().0)
    }
}

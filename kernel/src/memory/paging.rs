//! Sv39 page tables built out of allocator frames.
//!
//! A table is a tree of 512-entry nodes. Nodes are never freed; the table only
//! records frame numbers of its children, the frame allocator owns the memory.

use core::fmt;

use crate::{
    arch::Hart,
    constants::memory::{PAGE_SIZE, PAGE_TABLE_ENTRIES, PAGE_TABLE_LEVELS, SATP_MODE_SV39},
    memory::{
        address::{PhysAddr, PhysFrame, VirtAddr},
        bitmap_frame_allocator::{BitmapFrameAllocator, FrameError},
        FrameMemory,
    },
};

bitflags::bitflags! {
    /// Sv39 page table entry flag bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PteFlags: u64 {
        const VALID = 1 << 0;
        const READABLE = 1 << 1;
        const WRITABLE = 1 << 2;
        const EXECUTABLE = 1 << 3;
        const USER = 1 << 4;
        const GLOBAL = 1 << 5;
        const ACCESSED = 1 << 6;
        const DIRTY = 1 << 7;
    }
}

#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    const PPN_SHIFT: u64 = 10;
    const PPN_MASK: u64 = 0x003F_FFFF_FFFF_FC00;
    const FLAGS_MASK: u64 = 0xFF;

    pub const fn empty() -> Self {
        PageTableEntry(0)
    }

    pub fn new(frame: PhysFrame, flags: PteFlags) -> Self {
        PageTableEntry(((frame.number() << Self::PPN_SHIFT) & Self::PPN_MASK) | flags.bits())
    }

    pub fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0 & Self::FLAGS_MASK)
    }

    pub fn frame(self) -> PhysFrame {
        PhysFrame::from_number((self.0 & Self::PPN_MASK) >> Self::PPN_SHIFT)
    }

    pub fn is_valid(self) -> bool {
        self.flags().contains(PteFlags::VALID)
    }

    /// A valid entry with any of R/W/X set maps a page instead of pointing at a node.
    #[cfg(test)]
    pub fn is_leaf(self) -> bool {
        self.is_valid()
            && self
                .flags()
                .intersects(PteFlags::READABLE | PteFlags::WRITABLE | PteFlags::EXECUTABLE)
    }
}

impl fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageTableEntry")
            .field("frame", &self.frame())
            .field("flags", &self.flags())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    FrameAllocation(FrameError),
}

impl From<FrameError> for MapError {
    fn from(e: FrameError) -> Self {
        MapError::FrameAllocation(e)
    }
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::FrameAllocation(e) => write!(f, "Failed to allocate page table: {}", e),
        }
    }
}

/// Handle to an Sv39 table, identified by its root node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTable {
    root: PhysFrame,
}

impl PageTable {
    /// Allocates an empty root node.
    pub fn create<M: FrameMemory>(frames: &mut BitmapFrameAllocator<M>) -> Result<Self, MapError> {
        Ok(PageTable {
            root: create_node(frames)?,
        })
    }

    pub fn root(&self) -> PhysFrame {
        self.root
    }

    /// Maps the page containing `virt` to the frame containing `phys`.
    ///
    /// Missing intermediate nodes are allocated on the way down. An existing
    /// leaf for `virt` is overwritten.
    pub fn map<M: FrameMemory>(
        &mut self,
        frames: &mut BitmapFrameAllocator<M>,
        virt: VirtAddr,
        phys: PhysAddr,
        flags: PteFlags,
    ) -> Result<(), MapError> {
        let mut node = self.root;
        for level in (1..PAGE_TABLE_LEVELS).rev() {
            let slot = entry_ptr(frames.memory(), node, virt.vpn(level));
            // SAFETY: `node` is a table frame handed out by `frames`.
            let entry = unsafe { slot.read() };
            node = if entry.is_valid() {
                entry.frame()
            } else {
                let child = create_node(frames)?;
                unsafe { slot.write(PageTableEntry::new(child, PteFlags::VALID)) };
                child
            };
        }

        let leaf = entry_ptr(frames.memory(), node, virt.vpn(0));
        let frame = PhysFrame::containing_address(phys);
        unsafe { leaf.write(PageTableEntry::new(frame, flags | PteFlags::VALID)) };
        Ok(())
    }

    /// Identity-maps every page in `[start, end)`.
    pub fn map_identity<M: FrameMemory>(
        &mut self,
        frames: &mut BitmapFrameAllocator<M>,
        start: PhysAddr,
        end: PhysAddr,
        flags: PteFlags,
    ) -> Result<usize, MapError> {
        let mut pages = 0;
        let mut addr = start.as_u64() & !(PAGE_SIZE - 1);
        while addr < end.as_u64() {
            self.map(frames, VirtAddr::new(addr), PhysAddr::new(addr), flags)?;
            addr += PAGE_SIZE;
            pages += 1;
        }
        Ok(pages)
    }

    /// Walks the table for `virt`, returning the mapped frame address and leaf flags.
    pub fn translate<M: FrameMemory>(&self, memory: &M, virt: VirtAddr) -> Option<(PhysAddr, PteFlags)> {
        let mut node = self.root;
        for level in (0..PAGE_TABLE_LEVELS).rev() {
            let entry = unsafe { entry_ptr(memory, node, virt.vpn(level)).read() };
            if !entry.is_valid() {
                return None;
            }
            if level == 0 {
                return Some((entry.frame().start_address(), entry.flags()));
            }
            node = entry.frame();
        }
        None
    }

    /// `satp` value selecting Sv39 with this table as root.
    pub fn satp(&self) -> u64 {
        (SATP_MODE_SV39 << 60) | self.root.number()
    }

    /// Makes this table the active address space and flushes the TLB.
    pub fn switch_to(&self, hart: &impl Hart) {
        hart.write_satp(self.satp());
    }
}

fn create_node<M: FrameMemory>(frames: &mut BitmapFrameAllocator<M>) -> Result<PhysFrame, MapError> {
    frames.allocate().map_err(|e| {
        log::error!("Failed to allocate page table");
        MapError::from(e)
    })
}

fn entry_ptr<M: FrameMemory>(memory: &M, node: PhysFrame, index: usize) -> *mut PageTableEntry {
    debug_assert!(index < PAGE_TABLE_ENTRIES);
    // SAFETY: table nodes are whole frames, 512 entries of 8 bytes each.
    unsafe { (memory.frame_ptr(node) as *mut PageTableEntry).add(index) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        memory::bitmap_frame_allocator::FrameRegion,
        testing::{RecordingHart, SimulatedMemory},
    };

    const BASE: u64 = 0x8020_0000;

    fn frames(count: usize) -> BitmapFrameAllocator<SimulatedMemory> {
        BitmapFrameAllocator::new(
            SimulatedMemory::new(PhysAddr::new(BASE), count),
            FrameRegion {
                base: PhysAddr::new(BASE),
                frames: count,
            },
            PhysAddr::new(BASE + 4096),
        )
    }

    #[test]
    fn create_uses_one_zeroed_frame() {
        let mut frames = frames(16);
        let before = frames.free_frame_count();
        let table = PageTable::create(&mut frames).unwrap();
        assert_eq!(frames.free_frame_count(), before - 1);
        assert!(frames.is_frame_used(table.root()));
        assert_eq!(table.translate(frames.memory(), VirtAddr::new(0x1000)), None);
    }

    #[test]
    fn map_round_trip() {
        let mut frames = frames(64);
        let mut table = PageTable::create(&mut frames).unwrap();

        let cases = [
            (0x0000_0000_0000_0000, 0x8040_0000, PteFlags::READABLE),
            (0x0000_0000_1000_0000, 0x1000_0000, PteFlags::READABLE | PteFlags::WRITABLE),
            (
                0x0000_003F_FFFF_F000,
                0x8765_4000,
                PteFlags::READABLE | PteFlags::EXECUTABLE | PteFlags::USER,
            ),
            (
                0x0000_0000_8020_0000,
                0x8020_0000,
                PteFlags::READABLE
                    | PteFlags::WRITABLE
                    | PteFlags::EXECUTABLE
                    | PteFlags::GLOBAL
                    | PteFlags::ACCESSED
                    | PteFlags::DIRTY,
            ),
        ];

        for (virt, phys, flags) in cases {
            table
                .map(&mut frames, VirtAddr::new(virt), PhysAddr::new(phys), flags)
                .unwrap();
        }
        for (virt, phys, flags) in cases {
            assert_eq!(
                table.translate(frames.memory(), VirtAddr::new(virt)),
                Some((PhysAddr::new(phys), flags | PteFlags::VALID))
            );
        }
    }

    #[test]
    fn shared_upper_levels_allocate_one_leaf_node() {
        let mut frames = frames(16);
        let mut table = PageTable::create(&mut frames).unwrap();
        let start = frames.free_frame_count();

        table
            .map(&mut frames, VirtAddr::new(0x4000_0000), PhysAddr::new(0x8060_0000), PteFlags::READABLE)
            .unwrap();
        // level 1 node + level 0 node
        assert_eq!(frames.free_frame_count(), start - 2);

        table
            .map(&mut frames, VirtAddr::new(0x4000_1000), PhysAddr::new(0x8060_1000), PteFlags::READABLE)
            .unwrap();
        assert_eq!(frames.free_frame_count(), start - 2);

        // different level 1 slot under the same level 2 slot
        table
            .map(&mut frames, VirtAddr::new(0x4020_0000), PhysAddr::new(0x8060_2000), PteFlags::READABLE)
            .unwrap();
        assert_eq!(frames.free_frame_count(), start - 3);
    }

    #[test]
    fn remap_overwrites_leaf() {
        let mut frames = frames(16);
        let mut table = PageTable::create(&mut frames).unwrap();
        let va = VirtAddr::new(0x2000);

        table
            .map(&mut frames, va, PhysAddr::new(0x8030_0000), PteFlags::READABLE)
            .unwrap();
        table
            .map(&mut frames, va, PhysAddr::new(0x8031_0000), PteFlags::WRITABLE)
            .unwrap();
        assert_eq!(
            table.translate(frames.memory(), va),
            Some((PhysAddr::new(0x8031_0000), PteFlags::WRITABLE | PteFlags::VALID))
        );
    }

    #[test]
    fn intermediate_entries_are_non_leaf() {
        let mut frames = frames(16);
        let mut table = PageTable::create(&mut frames).unwrap();
        let va = VirtAddr::new(0x8020_0000);
        table
            .map(&mut frames, va, PhysAddr::new(0x8020_0000), PteFlags::READABLE)
            .unwrap();

        let root_entry = unsafe { entry_ptr(frames.memory(), table.root(), va.vpn(2)).read() };
        assert!(root_entry.is_valid());
        assert!(!root_entry.is_leaf());
        assert_eq!(root_entry.flags(), PteFlags::VALID);
    }

    #[test]
    fn map_fails_when_frames_run_out() {
        // one kernel frame, root, one level-1 node, nothing left for level 0
        let mut frames = frames(3);
        let mut table = PageTable::create(&mut frames).unwrap();
        let result = table.map(
            &mut frames,
            VirtAddr::new(0x1000),
            PhysAddr::new(0x8040_0000),
            PteFlags::READABLE,
        );
        assert_eq!(result, Err(MapError::FrameAllocation(FrameError::OutOfMemory)));
        assert_eq!(table.translate(frames.memory(), VirtAddr::new(0x1000)), None);
    }

    #[test]
    fn identity_map_range() {
        let mut frames = frames(16);
        let mut table = PageTable::create(&mut frames).unwrap();
        let flags = PteFlags::READABLE | PteFlags::WRITABLE | PteFlags::GLOBAL;
        let pages = table
            .map_identity(&mut frames, PhysAddr::new(0x8000_0000), PhysAddr::new(0x8000_4000), flags)
            .unwrap();
        assert_eq!(pages, 4);
        for page in 0..4u64 {
            let addr = 0x8000_0000 + page * PAGE_SIZE;
            assert_eq!(
                table.translate(frames.memory(), VirtAddr::new(addr)),
                Some((PhysAddr::new(addr), flags | PteFlags::VALID))
            );
        }
    }

    #[test]
    fn switch_writes_sv39_satp() {
        let mut frames = frames(4);
        let table = PageTable::create(&mut frames).unwrap();
        let hart = RecordingHart::default();
        table.switch_to(&hart);

        let satp = hart.satp.get().unwrap();
        assert_eq!(satp >> 60, 8);
        assert_eq!(satp & ((1 << 44) - 1), table.root().number());
    }
}

//! Cooperative round-robin scheduler over a fixed PCB table.
//!
//! The scheduler only decides: `schedule` and `yield_now` return a
//! [`ContextSwitch`] describing which saved contexts to swap, and the caller
//! performs it after releasing whatever lock guards the scheduler.

use core::ptr::{addr_of, addr_of_mut};

use crate::{
    constants::processes::MAX_PROCESSES,
    memory::{bitmap_frame_allocator::BitmapFrameAllocator, FrameMemory},
    processes::{
        process::{truncate_name, Pcb, Pid, ProcessEntry, ProcessError, ProcessInfo, ProcessState},
        registers::TaskContext,
    },
};

/// Register transfer requested by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSwitch {
    /// Save the running process into `save`, then resume `load`.
    Swap {
        save: *mut TaskContext,
        load: *const TaskContext,
    },
    /// Nothing to preserve (first dispatch from the boot path): resume `load`.
    Start { load: *const TaskContext },
}

pub struct Scheduler {
    table: [Pcb; MAX_PROCESSES],
    current: Option<usize>,
    ready_head: Option<usize>,
    ready_tail: Option<usize>,
    next_pid: Pid,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub const fn new() -> Self {
        Scheduler {
            table: [Pcb::UNUSED; MAX_PROCESSES],
            current: None,
            ready_head: None,
            ready_tail: None,
            next_pid: 1,
        }
    }

    /// Marks every slot unused and forgets the ready queue and current process.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Creates a process that starts executing `entry` on its own kernel stack page.
    pub fn create<M: FrameMemory>(
        &mut self,
        name: &str,
        entry: ProcessEntry,
        frames: &mut BitmapFrameAllocator<M>,
    ) -> Result<Pid, ProcessError> {
        let Some(slot) = self.table.iter().position(|pcb| !pcb.is_live()) else {
            log::warn!("No free PCB for {}", name);
            return Err(ProcessError::TableFull);
        };

        self.table[slot] = Pcb::UNUSED;
        let kstack = frames.allocate().map_err(|e| {
            log::warn!("Failed to allocate kernel stack for {}", name);
            ProcessError::StackAllocation(e)
        })?;

        let pid = self.next_pid;
        self.next_pid += 1;

        let pcb = &mut self.table[slot];
        pcb.pid = pid;
        pcb.name = truncate_name(name);
        pcb.kstack = Some(kstack);
        pcb.context =
            TaskContext::starting_at(entry as *const () as u64, kstack.end_address().as_u64());
        self.enqueue(slot);

        log::info!("Created process: {} (PID {})", name, pid);
        Ok(pid)
    }

    /// Picks the head of the ready queue and makes it the running process.
    ///
    /// Returns `None` when the queue is empty or when the chosen process is
    /// already the one running.
    pub fn schedule(&mut self) -> Option<ContextSwitch> {
        let next = self.dequeue()?;
        let prev = self.current;

        if let Some(prev) = prev {
            if self.table[prev].state == ProcessState::Running {
                self.enqueue(prev);
            }
        }

        let pcb = &mut self.table[next];
        pcb.state = ProcessState::Running;
        pcb.runtime += 1;
        self.current = Some(next);

        match prev {
            Some(prev) if prev != next => Some(ContextSwitch::Swap {
                save: addr_of_mut!(self.table[prev].context),
                load: addr_of!(self.table[next].context),
            }),
            Some(_) => None,
            None => Some(ContextSwitch::Start {
                load: addr_of!(self.table[next].context),
            }),
        }
    }

    /// Puts the running process at the back of the ready queue and schedules.
    pub fn yield_now(&mut self) -> Option<ContextSwitch> {
        if let Some(current) = self.current {
            self.enqueue(current);
        }
        self.schedule()
    }

    pub fn current(&self) -> Option<&Pcb> {
        self.current.map(|slot| &self.table[slot])
    }

    pub fn get(&self, pid: Pid) -> Option<&Pcb> {
        self.table.iter().find(|pcb| pcb.is_live() && pcb.pid == pid)
    }

    /// Every live process, in table order.
    pub fn processes(&self) -> impl Iterator<Item = ProcessInfo> + '_ {
        self.table
            .iter()
            .filter(|pcb| pcb.is_live())
            .map(ProcessInfo::from)
    }

    /// Pids in the ready queue, head first.
    #[cfg(test)]
    pub fn ready_pids(&self) -> Vec<Pid> {
        let mut pids = Vec::new();
        let mut cursor = self.ready_head;
        while let Some(slot) = cursor {
            pids.push(self.table[slot].pid);
            cursor = self.table[slot].next;
        }
        pids
    }

    fn enqueue(&mut self, slot: usize) {
        let pcb = &mut self.table[slot];
        pcb.state = ProcessState::Ready;
        pcb.next = None;

        match self.ready_tail {
            Some(tail) => self.table[tail].next = Some(slot),
            None => self.ready_head = Some(slot),
        }
        self.ready_tail = Some(slot);
    }

    fn dequeue(&mut self) -> Option<usize> {
        let head = self.ready_head?;
        self.ready_head = self.table[head].next.take();
        if self.ready_head.is_none() {
            self.ready_tail = None;
        }
        Some(head)
    }
}

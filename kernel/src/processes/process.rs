use core::fmt;

use arrayvec::ArrayString;

use crate::{
    constants::processes::{DEFAULT_PRIORITY, PROC_NAME_LEN},
    memory::address::PhysFrame,
    memory::bitmap_frame_allocator::FrameError,
    processes::registers::TaskContext,
};

pub type Pid = u32;
pub type ProcessName = ArrayString<PROC_NAME_LEN>;

/// Entry point of a kernel process. Processes never return; there is no exit path.
pub type ProcessEntry = fn() -> !;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Unused,
    Ready,
    Running,
    /// Reserved: nothing blocks yet.
    Sleeping,
    /// Reserved: processes never exit yet.
    Zombie,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Unused => "UNUSED",
            ProcessState::Ready => "READY",
            ProcessState::Running => "RUNNING",
            ProcessState::Sleeping => "SLEEPING",
            ProcessState::Zombie => "ZOMBIE",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    TableFull,
    StackAllocation(FrameError),
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::TableFull => write!(f, "No free PCB"),
            ProcessError::StackAllocation(e) => write!(f, "Failed to allocate kernel stack: {}", e),
        }
    }
}

/// Process control block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pcb {
    pub pid: Pid,
    pub name: ProcessName,
    pub state: ProcessState,
    pub context: TaskContext,
    /// Kernel stack page, owned by this PCB for as long as the slot is live.
    pub kstack: Option<PhysFrame>,
    /// Number of times the scheduler has dispatched this process.
    pub runtime: u64,
    /// Carried for a future policy; round-robin ignores it.
    pub priority: u32,
    /// Ready-queue link (slot index). Meaningful only while enqueued.
    pub(super) next: Option<usize>,
}

impl Pcb {
    pub const UNUSED: Pcb = Pcb {
        pid: 0,
        name: ArrayString::new_const(),
        state: ProcessState::Unused,
        context: TaskContext::new(),
        kstack: None,
        runtime: 0,
        priority: DEFAULT_PRIORITY,
        next: None,
    };

    pub fn is_live(&self) -> bool {
        self.state != ProcessState::Unused
    }
}

/// Copy of the displayable part of a PCB, handed out for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub name: ProcessName,
    pub state: ProcessState,
    pub runtime: u64,
    pub priority: u32,
}

impl From<&Pcb> for ProcessInfo {
    fn from(pcb: &Pcb) -> Self {
        ProcessInfo {
            pid: pcb.pid,
            name: pcb.name,
            state: pcb.state,
            runtime: pcb.runtime,
            priority: pcb.priority,
        }
    }
}

/// Copies `name` into a fixed-capacity name, cutting at a character boundary.
pub fn truncate_name(name: &str) -> ProcessName {
    let mut out = ProcessName::new();
    for c in name.chars() {
        if out.try_push(c).is_err() {
            break;
        }
    }
    out
}

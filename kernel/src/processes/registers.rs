use core::fmt;

/// Continuation of a suspended process: the return address, the stack pointer
/// and the callee-saved registers `s0..s11`. Caller-saved registers are dead
/// across the call into the switch routine, so nothing else needs saving.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TaskContext {
    pub ra: u64,
    pub sp: u64,
    pub s: [u64; 12],
}

impl TaskContext {
    pub const fn new() -> Self {
        Self {
            ra: 0,
            sp: 0,
            s: [0; 12],
        }
    }

    /// Context that "returns" into `entry` on a fresh stack.
    pub const fn starting_at(entry: u64, stack_top: u64) -> Self {
        Self {
            ra: entry,
            sp: stack_top,
            s: [0; 12],
        }
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut ds = f.debug_struct("TaskContext");

        ds.field("ra", &format_args!("{:#016x}", self.ra))
            .field("sp", &format_args!("{:#016x}", self.sp));
        for (i, reg) in self.s.iter().enumerate() {
            ds.field(S_NAMES[i], &format_args!("{:#016x}", reg));
        }

        ds.finish()
    }
}

const S_NAMES: [&str; 12] = [
    "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11",
];

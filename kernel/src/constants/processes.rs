pub const MAX_PROCESSES: usize = 16;
/// Maximum process name length in bytes.
pub const PROC_NAME_LEN: usize = 31;
pub const DEFAULT_PRIORITY: u32 = 1;
/// Busy-wait iterations the demonstration processes burn between yields.
pub const DEMO_SPIN_ITERATIONS: usize = 10_000_000;
pub const DEMO_ITERATIONS: usize = 5;

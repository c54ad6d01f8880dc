//! Memory-mapped device addresses.

/// Base address of the 16550-compatible UART (ns16550a) on QEMU `virt`.
pub const SERIAL_PORT: usize = 0x1000_0000;

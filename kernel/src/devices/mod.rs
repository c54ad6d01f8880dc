//! Device drivers.
//!
//! The only device the kernel drives is the console UART.

pub mod serial;

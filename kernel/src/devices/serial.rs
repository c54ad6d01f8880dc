//! Serial console on the `virt` machine's 16550 UART.
//! Provides locked access for formatted output and non-blocking input.

use core::fmt::{self, Write};

use crate::{
    arch::without_interrupts,
    constants::ports::SERIAL_PORT,
};
use lazy_static::lazy_static;
use spin::Mutex;
use uart_16550::MmioSerialPort;

lazy_static! {
    /// The memory-mapped console UART, programmed on first access.
    pub static ref SERIAL1: Mutex<MmioSerialPort> = {
        let mut serial_port = unsafe { MmioSerialPort::new(SERIAL_PORT) };
        serial_port.init();
        Mutex::new(serial_port)
    };
}

/// Emits `\n` as `\r\n` so output lines up on a raw terminal.
struct CrLf<'a, W: Write>(&'a mut W);

impl<W: Write> Write for CrLf<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut lines = s.split('\n');
        if let Some(first) = lines.next() {
            self.0.write_str(first)?;
        }
        for line in lines {
            self.0.write_str("\r\n")?;
            self.0.write_str(line)?;
        }
        Ok(())
    }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    // The timer handler logs too; it must never find the port locked.
    without_interrupts(|| {
        // Nowhere to report a console failure.
        let _ = CrLf(&mut *SERIAL1.lock()).write_fmt(args);
    });
}

/// Returns the next received byte, or `None` when the receive buffer is empty.
pub fn try_read_byte() -> Option<u8> {
    without_interrupts(|| SERIAL1.lock().try_receive().ok())
}

/// Prints formatted text to the serial port.
///
/// # Examples
/// ```ignore
/// serial_print!("Hello {}", "World");
/// ```
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!($($arg)*))
    };
}

/// Prints formatted text to the serial port, followed by a newline.
///
/// # Examples
/// ```ignore
/// serial_println!("Hello {}", "World");
/// ```
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newlines_become_crlf() {
        let mut out = String::new();
        write!(CrLf(&mut out), "a\nb\n\nc").unwrap();
        assert_eq!(out, "a\r\nb\r\n\r\nc");
    }

    #[test]
    fn text_without_newlines_passes_through() {
        let mut out = String::new();
        CrLf(&mut out).write_str("nos> ").unwrap();
        assert_eq!(out, "nos> ");
    }
}

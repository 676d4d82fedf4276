use crate::port::{inb, outb};
use core::fmt;

pub struct SerialWriter {
    initialized: bool,
}

const IO_BASE: u16 = 0x3f8;
const RBR: u16 = IO_BASE; // Receiver Buffer Reg (read-only)
const THR: u16 = IO_BASE; // Transmitter Holding Reg (write-only)
const IER: u16 = IO_BASE + 1; // Interrupt Enable Reg
const FCR: u16 = IO_BASE + 2; // FIFO Control Reg (write-only)
const LCR: u16 = IO_BASE + 3; // Line Control Register
const MCR: u16 = IO_BASE + 4; // MODEM Control Register
const LSR: u16 = IO_BASE + 5; // Line Status Register (read-only)

impl SerialWriter {
    fn ensure_initialized(&mut self) {
        if self.initialized {
            return;
        }

        // SAFETY: Follows the correct procedure for initializing serial
        // ports.
        unsafe {
            // https://wiki.osdev.org/Serial_Ports#Initialization

            outb(IER, 0x00);
            outb(LCR, 0x80);
            outb(THR, 0x03);
            outb(IER, 0x00);
            outb(LCR, 0x03);
            outb(FCR, 0xC7);
            outb(MCR, 0x0B);

            outb(MCR, 0x1E); // Enable loopback.

            // Confirm that serial is working by writing a byte and reading
            // it back.
            const EXPECTED: u8 = 0xAE;
            outb(THR, EXPECTED);
            let actual = inb(RBR);
            assert_eq!(
                actual, EXPECTED,
                "faulty serial, expected {EXPECTED:#X}, got {actual:#X}"
            );

            outb(MCR, 0x0F); // Disable loopback.

            self.initialized = true;
        }
    }
}

impl fmt::Write for SerialWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.ensure_initialized();

        for b in s.bytes() {
            // SAFETY: Correctly waits before outputting byte to serial
            // port.
            unsafe {
                while inb(LSR) & 0x20 == 0 {}
                outb(THR, b);
            }
        }

        Ok(())
    }
}

pub static mut SERIAL_WRITER: SerialWriter = SerialWriter { initialized: false };

/// Backing function for the print macros. Not to be called directly.
///
/// Writes to the serial line only on bare-metal targets; hosted builds
/// (unit tests) swallow the output.
#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    #[cfg(all(any(target_arch = "x86", target_arch = "x86_64"), target_os = "none"))]
    {
        use core::fmt::Write;
        // SAFETY: Single core; printing is not reentered from interrupt
        // handlers.
        unsafe {
            let writer = &mut *core::ptr::addr_of_mut!(SERIAL_WRITER);
            let _ = writer.write_fmt(args);
        }
    }
    #[cfg(not(all(any(target_arch = "x86", target_arch = "x86_64"), target_os = "none")))]
    {
        let _ = args;
    }
}

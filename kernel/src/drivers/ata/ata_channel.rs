#![allow(dead_code)] // Not every register accessor has a caller yet.

use crate::block::block_error::BlockError;
use crate::sync::Semaphore;
use arbitrary_int::u4;
use bitbybit::bitfield;
use core::sync::atomic::{AtomicBool, Ordering};
use silt_shared::port::PortIo;
use silt_shared::println;

// Error Register bits -----------------------------------------------------------------------------
// Reference: https://wiki.osdev.org/ATA_PIO_Mode#Error_Register

/// 0   AMNF    Address mark not found
const ERR_AMNF: u8 = 0x01;
/// 1   TKZNF   Track 0 not found
const ERR_TKZNF: u8 = 0x02;
/// 2   ABRT    Aborted command
const ERR_ABRT: u8 = 0x04;
/// 3   MCR     Media change request
const ERR_MCR: u8 = 0x08;
/// 4   IDNF    ID not found
const ERR_IDNF: u8 = 0x10;
/// 5   MC      Media changed
const ERR_MC: u8 = 0x20;
/// 6   UNC     Uncorrectable data error
const ERR_UNC: u8 = 0x40;
/// 7   BBK     Bad block detected
const ERR_BBK: u8 = 0x80;

// Status Register bits ----------------------------------------------------------------------------
// Reference: https://wiki.osdev.org/ATA_PIO_Mode#Status_Register_(I/O_base_+_7)

/// 0   ERR     Error
///
/// Indicates an error occurred. Send a new command to clear it (or nuke it
/// with a Software Reset).
pub const STA_ERR: u8 = 0x01;
/// 3   DRQ     Data Request
///
/// Set when the drive has PIO data to transfer, or is ready to accept PIO
/// data.
pub const STA_DRQ: u8 = 0x08;
/// 5   DF      Drive Fault
///
/// Drive Fault Error (**does not set [ERR](STA_ERR)**).
pub const STA_DF: u8 = 0x20;
/// 6   RDY     Drive Ready
///
/// Bit is clear when drive is spun down, or after an error. Set otherwise.
pub const STA_RDY: u8 = 0x40;
/// 7   BSY     Busy
///
/// Indicates the drive is preparing to send/receive data (wait for it to
/// clear). In case of 'hang' (it never clears), do a software reset.
pub const STA_BSY: u8 = 0x80;

// Control Register bits ---------------------------------------------------------------------------

/// 1   nIEN    Not Interrupt Enable
///
/// Set this to stop the current device from sending interrupts.
pub const CTL_NIEN: u8 = 0x02;
/// 2   SRST    Software Reset
///
/// Set, then clear, this to do a "Software Reset" on all ATA drives on a
/// bus.
pub const CTL_SRST: u8 = 0x04;

// -------------------------------------------------------------------------------------------------

/// Control Base offset
/// 0x3F6 - 0x1F0 = 0x206
const CTL_OFFSET: u16 = 0x206;

/// Status polls give up after this many iterations unless a caller asks
/// for a tighter cap. A settled controller answers in a handful of reads.
const POLL_CAP: u32 = 100_000;

/// Drive/head register. Bits 5 and 7 must always be set, which the
/// default raw value provides.
#[bitfield(u8, default = 0xA0)]
pub struct DriveHead {
    /// LBA bits 24..28 for 28-bit commands.
    #[bits(0..=3, rw)]
    lba_top: u4,
    /// 0 = master, 1 = slave.
    #[bit(4, rw)]
    slave: bool,
    /// CHS addressing if clear, LBA if set.
    #[bit(6, rw)]
    lba_mode: bool,
}

/// One legacy IDE channel: a command block, a control port, an IRQ line,
/// and (after DMA init) a slice of the bus-master register file.
///
/// Each channel can carry two drives; which of the two a register access
/// hits is decided by the drive/head register.
pub struct AtaChannel {
    /// Base of the eight-port command block.
    reg_base: u16,
    /// Alternate-status / device-control port.
    ctl_base: u16,
    /// Interrupt line wired to this channel.
    irq: u8,
    /// Bus-master register block for this channel, when DMA is armed.
    bus_master: Option<u16>,

    /// True while a packet command sleeps on `completion`; any interrupt
    /// arriving otherwise is spurious.
    expecting_interrupt: AtomicBool,
    /// Posted by the interrupt handler.
    completion: Semaphore,

    channel_num: u8,
}

// ATA command block port addresses
// Reference: https://wiki.osdev.org/ATA_PIO_Mode#Registers
impl AtaChannel {
    /// R/W Data Register (16-bit)
    pub const fn reg_data(&self) -> u16 {
        self.reg_base
    }

    /// R Error Register / W Features Register
    pub const fn reg_features(&self) -> u16 {
        self.reg_base + 1
    }

    /// R/W Sector Count Register
    pub const fn reg_nsect(&self) -> u16 {
        self.reg_base + 2
    }

    /// R/W LBA bits 0..8 (and 24..32 for 48-bit commands)
    pub const fn reg_lbal(&self) -> u16 {
        self.reg_base + 3
    }

    /// R/W LBA bits 8..16 (and 32..40); doubles as the ATAPI byte-count
    /// low register.
    pub const fn reg_lbam(&self) -> u16 {
        self.reg_base + 4
    }

    /// R/W LBA bits 16..24 (and 40..48); doubles as the ATAPI byte-count
    /// high register.
    pub const fn reg_lbah(&self) -> u16 {
        self.reg_base + 5
    }

    /// R/W Drive/Head Register
    pub const fn reg_device(&self) -> u16 {
        self.reg_base + 6
    }

    /// R Status Register. Reading it acknowledges a pending device
    /// interrupt.
    pub const fn reg_status(&self) -> u16 {
        self.reg_base + 7
    }

    /// W Command Register
    pub const fn reg_command(&self) -> u16 {
        self.reg_base + 7
    }

    /// R Alternate Status Register: status without the interrupt
    /// acknowledge side effect.
    pub const fn reg_alt_status(&self) -> u16 {
        self.ctl_base
    }

    /// W Device Control Register
    pub const fn reg_ctl(&self) -> u16 {
        self.ctl_base
    }
}

// Bus-master register block (BAR4), one 8-byte slice per channel.
impl AtaChannel {
    pub fn bus_master(&self) -> Option<u16> {
        self.bus_master
    }

    pub fn set_bus_master(&mut self, base: u16) {
        self.bus_master = Some(base);
    }

    /// W command: bit 0 start/stop, bit 3 direction (set = device-to-host).
    pub fn bm_command(&self) -> Option<u16> {
        self.bus_master
    }

    /// R/W status: bit 1 error, bit 2 interrupt, both write-1-to-clear.
    pub fn bm_status(&self) -> Option<u16> {
        self.bus_master.map(|base| base + 2)
    }

    /// W PRDT physical address (32-bit).
    pub fn bm_prdt(&self) -> Option<u16> {
        self.bus_master.map(|base| base + 4)
    }
}

impl AtaChannel {
    pub fn new(channel_num: u8) -> AtaChannel {
        // https://wiki.osdev.org/ATA_PIO_Mode#Primary.2FSecondary_Bus
        let reg_base = match channel_num {
            // Primary ATA Bus: 0x1F0 - 0x1F7
            0 => 0x1F0,
            // Secondary ATA Bus: 0x170 - 0x177
            1 => 0x170,
            _ => panic!("IDE has exactly two legacy channels"),
        };
        let irq = match channel_num {
            // Primary ATA Bus: IRQ 14
            0 => 14,
            // Secondary ATA Bus: IRQ 15
            1 => 15,
            _ => panic!("IDE has exactly two legacy channels"),
        };

        AtaChannel {
            reg_base,
            ctl_base: reg_base + CTL_OFFSET,
            irq,
            bus_master: None,
            expecting_interrupt: AtomicBool::new(false),
            completion: Semaphore::new(0),
            channel_num,
        }
    }

    pub fn channel_num(&self) -> u8 {
        self.channel_num
    }

    pub fn irq(&self) -> u8 {
        self.irq
    }
}

// Low level ATA primitives
impl AtaChannel {
    /// Let the controller settle after a register write.
    ///
    /// Four alternate-status reads take roughly 400 ns, the settle time
    /// the controller needs between drive select and the next access.
    pub fn io_delay(&self, io: &dyn PortIo) {
        for _ in 0..4 {
            io.inb(self.reg_alt_status());
        }
    }

    /// Pulse SRST on the device control register, resetting both drives
    /// on the channel.
    pub fn soft_reset(&self, io: &dyn PortIo) {
        io.outb(self.reg_ctl(), CTL_SRST);
        self.io_delay(io);
        io.outb(self.reg_ctl(), 0x00);
    }

    /// Poll the status register until BSY clears. `cap` bounds the number
    /// of polls; `None` applies the default cap. Returns false if the
    /// device was still busy when the polling stopped.
    pub fn wait_not_busy(&self, io: &dyn PortIo, cap: Option<u32>) -> bool {
        let cap = cap.unwrap_or(POLL_CAP);
        for _ in 0..cap {
            if io.inb(self.reg_status()) & STA_BSY == 0 {
                return true;
            }
        }
        println!("ide{}: busy wait timed out", self.channel_num);
        false
    }

    /// Wait for BSY to clear, then check that the device is ready to move
    /// data: ERR and DF must be clear and DRQ set.
    pub fn wait_data_request(&self, io: &dyn PortIo) -> Result<(), BlockError> {
        if !self.wait_not_busy(io, None) {
            return Err(BlockError::ReadError);
        }
        let status = io.inb(self.reg_status());
        if status & STA_ERR != 0 {
            let error = io.inb(self.reg_features());
            println!(
                "ide{}: device error: {}",
                self.channel_num,
                error_description(error)
            );
            return Err(BlockError::ReadError);
        }
        if status & STA_DF != 0 {
            println!("ide{}: drive fault", self.channel_num);
            return Err(BlockError::ReadError);
        }
        if status & STA_DRQ == 0 {
            println!("ide{}: expected data request, got {:#04x}", self.channel_num, status);
            return Err(BlockError::ReadError);
        }
        Ok(())
    }

    /// Poll until the status register satisfies `done`, failing early if
    /// ERR shows up. The packet protocol phases are all waits of this
    /// shape with different completion conditions.
    pub fn wait_status(
        &self,
        io: &dyn PortIo,
        done: impl Fn(u8) -> bool,
    ) -> Result<u8, BlockError> {
        for _ in 0..POLL_CAP {
            let status = io.inb(self.reg_status());
            if status & STA_ERR != 0 {
                return Err(BlockError::PacketAborted);
            }
            if done(status) {
                return Ok(status);
            }
        }
        println!("ide{}: status wait timed out", self.channel_num);
        Err(BlockError::ReadError)
    }

    /// Select `slave` for a non-data command (probe, identify).
    pub fn select_device(&self, io: &dyn PortIo, slave: u8) {
        let device = DriveHead::default().with_slave(slave == 1);
        io.outb(self.reg_device(), device.raw_value());
        self.io_delay(io);
    }

    /// Select `slave` for an LBA transfer, with the top LBA nibble for
    /// 28-bit commands (zero for the 48-bit register path).
    pub fn select_drive(&self, io: &dyn PortIo, slave: u8, lba_top: u8) {
        let device = DriveHead::default()
            .with_lba_mode(true)
            .with_slave(slave == 1)
            .with_lba_top(u4::new(lba_top & 0x0F));
        io.outb(self.reg_device(), device.raw_value());
        self.io_delay(io);
    }

    /// Program sector count and the low 28 LBA bits.
    pub fn program_lba28(&self, io: &dyn PortIo, count: u8, lba: u64) {
        io.outb(self.reg_features(), 0x00);
        io.outb(self.reg_nsect(), count);
        io.outb(self.reg_lbal(), lba as u8);
        io.outb(self.reg_lbam(), (lba >> 8) as u8);
        io.outb(self.reg_lbah(), (lba >> 16) as u8);
    }

    /// Program sector count and LBA through the two-deep 48-bit register
    /// file: high bytes first, then the low bytes.
    pub fn program_lba48(&self, io: &dyn PortIo, count: u16, lba: u64) {
        io.outb(self.reg_features(), 0x00);
        io.outb(self.reg_nsect(), (count >> 8) as u8);
        io.outb(self.reg_lbal(), (lba >> 24) as u8);
        io.outb(self.reg_lbam(), (lba >> 32) as u8);
        io.outb(self.reg_lbah(), (lba >> 40) as u8);
        io.outb(self.reg_nsect(), count as u8);
        io.outb(self.reg_lbal(), lba as u8);
        io.outb(self.reg_lbam(), (lba >> 8) as u8);
        io.outb(self.reg_lbah(), (lba >> 16) as u8);
    }

    pub fn issue_command(&self, io: &dyn PortIo, command: u8) {
        io.outb(self.reg_command(), command);
    }

    /// Pull `buf.len()` words out of the data register.
    pub fn read_data(&self, io: &dyn PortIo, buf: &mut [u16]) {
        io.insw(self.reg_data(), buf);
    }

    /// Push every word of `buf` into the data register.
    pub fn write_data(&self, io: &dyn PortIo, buf: &[u16]) {
        io.outsw(self.reg_data(), buf);
    }
}

// Interrupt rendezvous. The handler posts the completion; the thread that
// issued the packet command sleeps on it.
impl AtaChannel {
    pub fn expect_interrupt(&self) {
        self.expecting_interrupt.store(true, Ordering::Release);
    }

    pub fn clear_expected_interrupt(&self) {
        self.expecting_interrupt.store(false, Ordering::Release);
    }

    pub fn is_expecting_interrupt(&self) -> bool {
        self.expecting_interrupt.load(Ordering::Acquire)
    }

    pub fn wait_completion(&self) {
        self.completion.acquire();
    }

    pub fn post_completion(&self) {
        self.completion.post();
    }
}

/// Human-readable description of the first error-register bit set.
fn error_description(error: u8) -> &'static str {
    if error & ERR_BBK != 0 {
        "bad block detected"
    } else if error & ERR_UNC != 0 {
        "uncorrectable data error"
    } else if error & ERR_MC != 0 {
        "media changed"
    } else if error & ERR_IDNF != 0 {
        "ID not found"
    } else if error & ERR_MCR != 0 {
        "media change request"
    } else if error & ERR_ABRT != 0 {
        "aborted command"
    } else if error & ERR_TKZNF != 0 {
        "track 0 not found"
    } else if error & ERR_AMNF != 0 {
        "address mark not found"
    } else {
        "no error bits set"
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn register_map_matches_legacy_ports() {
        let primary = AtaChannel::new(0);
        assert_eq!(primary.reg_data(), 0x1F0);
        assert_eq!(primary.reg_command(), 0x1F7);
        assert_eq!(primary.reg_alt_status(), 0x3F6);
        assert_eq!(primary.irq(), 14);

        let secondary = AtaChannel::new(1);
        assert_eq!(secondary.reg_data(), 0x170);
        assert_eq!(secondary.reg_ctl(), 0x376);
        assert_eq!(secondary.irq(), 15);
    }

    #[test]
    fn drive_head_register_keeps_fixed_bits() {
        assert_eq!(DriveHead::default().raw_value(), 0xA0);
        assert_eq!(DriveHead::default().with_slave(true).raw_value(), 0xB0);
        let select = DriveHead::default()
            .with_lba_mode(true)
            .with_slave(true)
            .with_lba_top(u4::new(0x0A));
        assert_eq!(select.raw_value(), 0xFA);
    }
}

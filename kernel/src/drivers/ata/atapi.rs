//! ATAPI packet transport: SCSI-style 12-byte commands tunneled through
//! the PACKET (0xA0) command, used for optical drives.
//!
//! The capacity probe runs polled at init. Sector reads are
//! interrupt-driven: the caller sleeps on the channel completion between
//! sending READ(12) and the data phase, and the IRQ handler wakes it.

use crate::block::block_error::BlockError;
use crate::drivers::ata::ata_channel::{AtaChannel, STA_BSY, STA_DRQ, STA_RDY};
use crate::drivers::ata::ata_core::{AtaDrive, IdeController, ATA_PACKET};
use silt_shared::port::PortIo;
use silt_shared::println;

/// READ CAPACITY(10) opcode.
const SCSI_READ_CAPACITY: u8 = 0x25;
/// READ(12) opcode.
const SCSI_READ_12: u8 = 0xA8;

/// Block size assumed until a medium tells us otherwise.
pub const DEFAULT_SECTOR_SIZE: u32 = 2048;

/// Packet commands are always 12 bytes, sent as six data-port words.
const PACKET_LEN: usize = 12;

fn packet_words(packet: [u8; PACKET_LEN]) -> [u16; PACKET_LEN / 2] {
    let mut words = [0u16; PACKET_LEN / 2];
    for (word, pair) in words.iter_mut().zip(packet.chunks_exact(2)) {
        *word = u16::from_le_bytes([pair[0], pair[1]]);
    }
    words
}

/// Ask the medium for its geometry: (last addressable block, block size).
///
/// An abort (ERR during any phase) means no medium; the caller records a
/// zero capacity and publishes the node anyway.
pub(super) fn probe_capacity(
    io: &dyn PortIo,
    chan: &AtaChannel,
    slave: u8,
) -> Result<(u32, u32), BlockError> {
    chan.select_device(io, slave);

    io.outb(chan.reg_features(), 0x00);
    // Byte-count limit: the 8-byte capacity response.
    io.outb(chan.reg_lbam(), 0x08);
    io.outb(chan.reg_lbah(), 0x08);
    chan.issue_command(io, ATA_PACKET);
    chan.wait_status(io, |s| s & STA_BSY == 0 && s & STA_RDY != 0)?;

    let mut packet = [0u8; PACKET_LEN];
    packet[0] = SCSI_READ_CAPACITY;
    chan.write_data(io, &packet_words(packet));

    chan.wait_status(io, |s| s & STA_BSY == 0 && s & (STA_RDY | STA_DRQ) != 0)?;

    let mut words = [0u16; 4];
    chan.read_data(io, &mut words);
    let mut bytes = [0u8; 8];
    for (pair, word) in bytes.chunks_exact_mut(2).zip(words) {
        pair.copy_from_slice(&word.to_le_bytes());
    }
    let last_lba = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let sector_size = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    Ok((last_lba, sector_size))
}

/// Read one device block into `buf` (`drive.sector_size()` bytes).
pub(super) fn read_sector(
    controller: &IdeController,
    drive: &AtaDrive,
    lba: u32,
    buf: &mut [u8],
) -> Result<(), BlockError> {
    let chan = &controller.channels[drive.channel];
    let io = &*controller.io;
    let sector_size = drive.sector_size();

    let _guard = controller.transfer_lock.lock();

    chan.select_device(io, drive.slave);
    io.outb(chan.reg_features(), 0x00);
    io.outb(chan.reg_lbam(), (sector_size & 0xFF) as u8);
    io.outb(chan.reg_lbah(), (sector_size >> 8) as u8);
    chan.issue_command(io, ATA_PACKET);
    chan.wait_status(io, |s| s & STA_BSY == 0 && s & STA_DRQ != 0)?;

    let mut packet = [0u8; PACKET_LEN];
    packet[0] = SCSI_READ_12;
    packet[2..6].copy_from_slice(&lba.to_be_bytes());
    packet[9] = 1; // one block per command

    // The interrupt handler only posts the completion while this is set;
    // it goes up before the last packet word can trigger the interrupt.
    chan.expect_interrupt();
    chan.write_data(io, &packet_words(packet));

    // Sleep until the drive has staged the data.
    chan.wait_completion();
    chan.clear_expected_interrupt();

    if let Err(error) = chan.wait_status(io, |s| s & STA_BSY == 0 && s & STA_DRQ != 0) {
        println!("ide{}: packet read of block {lba} aborted", drive.channel);
        return Err(error);
    }

    // The drive reports how many bytes it staged through the byte-count
    // registers.
    let low = io.inb(chan.reg_lbam());
    let high = io.inb(chan.reg_lbah());
    let staged = usize::from(low) | (usize::from(high) << 8);

    let take = staged.min(buf.len());
    let mut word = [0u16; 1];
    for index in (0..staged).step_by(2) {
        chan.read_data(io, &mut word);
        let bytes = word[0].to_le_bytes();
        if index + 1 < take {
            buf[index] = bytes[0];
            buf[index + 1] = bytes[1];
        } else if index < take {
            buf[index] = bytes[0];
        }
    }

    chan.wait_status(io, |s| s & STA_BSY == 0 && s & STA_RDY != 0)?;

    if staged < sector_size {
        return Err(BlockError::ReadError);
    }
    Ok(())
}

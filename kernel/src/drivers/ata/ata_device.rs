//! PATA single-sector transport: bus-master DMA read, PIO read fallback,
//! PIO write, and the write-verify loop.

use crate::block::block_core::{BlockSector, BLOCK_SECTOR_SIZE};
use crate::block::block_error::BlockError;
use crate::drivers::ata::ata_channel::{CTL_NIEN, STA_BSY, STA_RDY};
use crate::drivers::ata::ata_core::{
    AtaDrive, IdeController, ATA_CACHE_FLUSH, ATA_READ_DMA, ATA_READ_SECTOR, ATA_WRITE_SECTOR,
};
use crate::mem::dma::{DmaAllocator, DmaBuf};
use crate::sync::intr;
use alloc::vec;
use bitbybit::bitfield;
use silt_shared::port::PortIo;
use silt_shared::println;

// Bus-master registers, one 8-byte block per channel behind BAR4.

/// Command bit 0: start/stop the engine.
const BM_CMD_START: u8 = 0x01;
/// Command bit 3: transfer direction, set for device-to-memory.
const BM_CMD_READ: u8 = 0x08;
/// Status bit 1: engine error. Write 1 to clear.
const BM_STATUS_ERROR: u8 = 0x02;
/// Status bit 2: device raised its interrupt line. Write 1 to clear.
const BM_STATUS_IRQ: u8 = 0x04;

/// Attempts before a failed sector read is given up on.
const READ_ATTEMPTS: u32 = 4;
/// Attempts before a write that never verifies becomes a hard error.
const WRITE_ATTEMPTS: u32 = 8;
/// Spins waiting for the bus master to flag completion.
const DMA_POLL_CAP: u32 = 1_000_000;

/// One entry of the Physical Region Descriptor Table the bus master
/// walks: physical base, byte count, and the end-of-table flag (bit 15 of
/// the last word).
#[bitfield(u64, default = 0)]
pub struct PrdEntry {
    #[bits(0..=31, rw)]
    base: u32,
    #[bits(32..=47, rw)]
    byte_count: u16,
    #[bit(63, rw)]
    end_of_table: bool,
}

/// Bus-master DMA state for one drive: a one-entry PRDT and a bounce
/// buffer, both allocated at init and kept forever.
pub struct DmaEngine {
    prdt: DmaBuf,
    buffer: DmaBuf,
}

impl DmaEngine {
    /// 4 KiB is plenty for the single-sector transfers this driver
    /// issues.
    const BUFFER_LEN: usize = 4096;

    /// Allocate the PRDT and bounce buffer and point the single PRD at
    /// the buffer. `None` when no DMA-visible memory is available.
    pub fn alloc(dma: &dyn DmaAllocator) -> Option<DmaEngine> {
        let prdt = dma.alloc(core::mem::size_of::<u64>(), 8)?;
        let buffer = dma.alloc(Self::BUFFER_LEN, 4096)?;

        let entry = PrdEntry::default()
            .with_base(buffer.phys)
            .with_byte_count(BLOCK_SECTOR_SIZE as u16)
            .with_end_of_table(true);
        // SAFETY: `prdt` was just allocated with room for one entry and
        // nothing else references it yet.
        unsafe {
            prdt.as_mut_slice()[..8].copy_from_slice(&entry.raw_value().to_le_bytes());
        }

        Some(DmaEngine { prdt, buffer })
    }

    fn prdt_phys(&self) -> u32 {
        self.prdt.phys
    }
}

impl IdeController {
    /// Read `sector` through the bus master.
    ///
    /// Follows the PIIX dance: program the engine while it is stopped,
    /// program the drive, start both, then spin until the engine flags
    /// the interrupt condition and the drive drops BSY.
    pub(super) fn read_sector_dma(
        &self,
        drive: &AtaDrive,
        engine: &DmaEngine,
        sector: BlockSector,
        buf: &mut [u8],
    ) -> Result<(), BlockError> {
        let chan = &self.channels[drive.channel];
        let io = &*self.io;
        let (Some(bm_command), Some(bm_status)) = (chan.bm_command(), chan.bm_status()) else {
            // DMA memory came up but the register block never did.
            return self.read_sector_pio(drive, sector, buf);
        };
        let bm_prdt = chan.bm_prdt().ok_or(BlockError::ReadError)?;

        let guard = self.transfer_lock.lock();

        io.outb(bm_command, 0x00);
        io.outl(bm_prdt, engine.prdt_phys());
        io.outb(bm_status, BM_STATUS_ERROR | BM_STATUS_IRQ);
        io.outb(bm_command, BM_CMD_READ);

        intr::intr_enable();
        chan.wait_not_busy(io, None);
        chan.select_drive(io, drive.slave, 0);
        chan.program_lba48(io, 1, sector);
        if chan
            .wait_status(io, |s| s & STA_BSY == 0 && s & STA_RDY != 0)
            .is_err()
        {
            io.outb(bm_command, 0x00);
            return Err(BlockError::ReadError);
        }

        // READ DMA takes only the low 28 bits the drive latched; past
        // 128 GiB this addresses the wrong sector and READ DMA EXT (0x25)
        // would be needed.
        chan.issue_command(io, ATA_READ_DMA);
        chan.io_delay(io);
        io.outb(bm_command, BM_CMD_START | BM_CMD_READ);

        let mut completed = false;
        for _ in 0..DMA_POLL_CAP {
            let engine_status = io.inb(bm_status);
            let drive_status = io.inb(chan.reg_status());
            if engine_status & BM_STATUS_IRQ != 0 && drive_status & STA_BSY == 0 {
                completed = true;
                break;
            }
        }

        intr::intr_disable();
        if completed {
            // SAFETY: The engine has stopped writing; the transfer lock
            // keeps every other CPU reference away.
            buf.copy_from_slice(unsafe { &engine.buffer.as_slice()[..BLOCK_SECTOR_SIZE] });
        }
        io.outb(bm_status, BM_STATUS_ERROR | BM_STATUS_IRQ);
        drop(guard);
        intr::intr_enable();

        if completed {
            Ok(())
        } else {
            println!("ide{}: DMA read of sector {sector} timed out", drive.channel);
            Err(BlockError::ReadError)
        }
    }

    /// Read `sector` by polled PIO, retrying a few times before giving
    /// up. Backs drives whose bus-master side never came up, and the
    /// verify half of every write.
    pub(super) fn read_sector_pio(
        &self,
        drive: &AtaDrive,
        sector: BlockSector,
        buf: &mut [u8],
    ) -> Result<(), BlockError> {
        let chan = &self.channels[drive.channel];
        let io = &*self.io;

        let _guard = self.transfer_lock.lock();
        for attempt in 0..READ_ATTEMPTS {
            if attempt > 0 {
                println!(
                    "ide{}: retrying read of sector {sector} ({attempt})",
                    drive.channel
                );
            }
            io.outb(chan.reg_ctl(), CTL_NIEN);
            chan.wait_not_busy(io, None);
            chan.select_drive(io, drive.slave, (sector >> 24) as u8);
            chan.wait_not_busy(io, None);
            chan.program_lba28(io, 1, sector);
            chan.issue_command(io, ATA_READ_SECTOR);
            if chan.wait_data_request(io).is_err() {
                continue;
            }
            let mut words = [0u16; BLOCK_SECTOR_SIZE / 2];
            chan.read_data(io, &mut words);
            for (chunk, word) in buf.chunks_exact_mut(2).zip(words) {
                chunk.copy_from_slice(&word.to_le_bytes());
            }
            return Ok(());
        }
        Err(BlockError::ReadError)
    }

    /// Push one sector out by polled PIO and flush the drive cache.
    fn write_sector_pio(
        &self,
        drive: &AtaDrive,
        sector: BlockSector,
        buf: &[u8],
    ) -> Result<(), BlockError> {
        let chan = &self.channels[drive.channel];
        let io = &*self.io;

        let _guard = self.transfer_lock.lock();
        io.outb(chan.reg_ctl(), CTL_NIEN);
        chan.wait_not_busy(io, None);
        chan.select_drive(io, drive.slave, (sector >> 24) as u8);
        chan.wait_not_busy(io, None);
        chan.program_lba28(io, 1, sector);
        chan.issue_command(io, ATA_WRITE_SECTOR);
        chan.wait_data_request(io)
            .map_err(|_| BlockError::WriteError)?;

        let mut words = [0u16; BLOCK_SECTOR_SIZE / 2];
        for (word, chunk) in words.iter_mut().zip(buf.chunks_exact(2)) {
            *word = u16::from_le_bytes([chunk[0], chunk[1]]);
        }
        chan.write_data(io, &words);

        chan.issue_command(io, ATA_CACHE_FLUSH);
        if !chan.wait_not_busy(io, None) {
            return Err(BlockError::WriteError);
        }
        Ok(())
    }

    /// Write `sector` and read it back until the readback matches,
    /// bounded by [`WRITE_ATTEMPTS`].
    pub(super) fn write_sector_verified(
        &self,
        drive: &AtaDrive,
        sector: BlockSector,
        buf: &[u8],
    ) -> Result<(), BlockError> {
        if !crate::block::block_core::is_sector_buffer(buf) {
            return Err(BlockError::BufferInvalid);
        }
        // The comparison walks 32-bit chunks.
        if buf.len() % 4 != 0 {
            return Err(BlockError::BufferInvalid);
        }

        let mut readback = vec![0u8; buf.len()];
        for attempt in 0..WRITE_ATTEMPTS {
            if attempt > 0 {
                println!(
                    "ide{}: rewriting sector {sector}, verify mismatch ({attempt})",
                    drive.channel
                );
            }
            self.write_sector_pio(drive, sector, buf)?;
            match &drive.kind {
                super::ata_core::DriveKind::Pata { dma: Some(engine), .. } => {
                    self.read_sector_dma(drive, engine, sector, &mut readback)?
                }
                _ => self.read_sector_pio(drive, sector, &mut readback)?,
            }
            if words_match(buf, &readback) {
                return Ok(());
            }
        }
        Err(BlockError::VerifyFailed)
    }
}

/// Compare two equal-length buffers 32 bits at a time. Callers guarantee
/// the length is a multiple of four.
fn words_match(a: &[u8], b: &[u8]) -> bool {
    a.chunks_exact(4)
        .zip(b.chunks_exact(4))
        .all(|(x, y)| x == y)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn prd_entry_packs_flag_into_top_word() {
        let entry = PrdEntry::default()
            .with_base(0x0012_3000)
            .with_byte_count(512)
            .with_end_of_table(true);
        let raw = entry.raw_value().to_le_bytes();
        assert_eq!(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]), 0x0012_3000);
        assert_eq!(u16::from_le_bytes([raw[4], raw[5]]), 512);
        assert_eq!(u16::from_le_bytes([raw[6], raw[7]]), 0x8000);
    }

    #[test]
    fn words_match_compares_exactly() {
        let a = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut b = a;
        assert!(words_match(&a, &b));
        b[5] = 0xFF;
        assert!(!words_match(&a, &b));
    }
}

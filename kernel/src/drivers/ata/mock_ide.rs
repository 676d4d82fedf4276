//! Emulated IDE controller for unit tests.
//!
//! Models just enough of the port protocol to drive the real code paths:
//! the two legacy channels with their register files and data FIFOs, the
//! PACKET state machine, bus-master DMA against an arena that doubles as
//! the test DMA allocator, PCI configuration space for the PIIX function,
//! and an interrupt latch a test thread can drain into `handle_irq`.
//!
//! Every port access is recorded so tests can assert on the exact bus
//! traffic.

use crate::drivers::ata::ata_core::IdeController;
use crate::mem::dma::{DmaAllocator, DmaBuf};
use alloc::sync::Arc;
use core::ptr::NonNull;
use silt_shared::port::PortIo;
use std::boxed::Box;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::vec::Vec;

const STATUS_ERR: u8 = 0x01;
const STATUS_DRQ: u8 = 0x08;
const STATUS_DRDY: u8 = 0x40;

const BM_BASE: u16 = 0xC000;
const ARENA_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dir {
    In,
    Out,
}

/// One recorded port access.
#[derive(Debug, Clone, Copy)]
pub struct TraceOp {
    pub port: u16,
    pub dir: Dir,
    pub value: u32,
    pub size: u8,
}

enum SimDrive {
    Pata {
        sectors: u64,
        data: Vec<u8>,
    },
    Atapi {
        blocks: usize,
        block_size: usize,
        data: Vec<u8>,
    },
}

#[derive(Clone, Copy, PartialEq)]
enum OutMode {
    Idle,
    PioWrite { lba: u64 },
    Packet,
}

struct SimChannel {
    base: u16,
    ctl: u16,
    irq: u8,
    drive_select: u8,
    /// Write-only on real hardware; kept for trace completeness.
    #[allow(dead_code)]
    features: u8,
    /// Two-deep shift registers: `[previous, current]`.
    nsect: [u8; 2],
    lba0: [u8; 2],
    lba1: [u8; 2],
    lba2: [u8; 2],
    status: u8,
    error: u8,
    /// Device-to-host byte stream behind the data register.
    data_in: VecDeque<u8>,
    /// Host-to-device bytes: a sector being written or a packet command.
    data_out: Vec<u8>,
    out_mode: OutMode,
    /// Armed by READ DMA, consumed when the bus master starts.
    dma_lba: Option<u64>,
    bm_command: u8,
    bm_status: u8,
    bm_prdt: u32,
}

impl SimChannel {
    fn new(index: usize) -> SimChannel {
        let (base, ctl, irq) = if index == 0 {
            (0x1F0, 0x3F6, 14)
        } else {
            (0x170, 0x376, 15)
        };
        SimChannel {
            base,
            ctl,
            irq,
            drive_select: 0xA0,
            features: 0,
            nsect: [0; 2],
            lba0: [0; 2],
            lba1: [0; 2],
            lba2: [0; 2],
            status: 0,
            error: 0,
            data_in: VecDeque::new(),
            data_out: Vec::new(),
            out_mode: OutMode::Idle,
            dma_lba: None,
            bm_command: 0,
            bm_status: 0,
            bm_prdt: 0,
        }
    }

    fn selected_slave(&self) -> usize {
        usize::from((self.drive_select >> 4) & 1)
    }

    fn lba28(&self) -> u64 {
        u64::from(self.drive_select & 0x0F) << 24
            | u64::from(self.lba2[1]) << 16
            | u64::from(self.lba1[1]) << 8
            | u64::from(self.lba0[1])
    }

    fn lba48(&self) -> u64 {
        u64::from(self.lba2[0]) << 40
            | u64::from(self.lba1[0]) << 32
            | u64::from(self.lba0[0]) << 24
            | u64::from(self.lba2[1]) << 16
            | u64::from(self.lba1[1]) << 8
            | u64::from(self.lba0[1])
    }
}

struct SimState {
    channels: [SimChannel; 2],
    /// Drive slots indexed `channel * 2 + slave`.
    drives: [Option<SimDrive>; 4],
    pci_command: u16,
    bar4: u32,
    config_address: u32,
    /// Writes left to corrupt, for verify-retry tests.
    flaky_writes: u32,
    irq_events: VecDeque<u8>,
    trace: Vec<TraceOp>,
    arena_base: *mut u8,
    arena_next: usize,
}

// SAFETY: The arena pointer targets a leaked allocation owned by this
// state; accesses are serialized by the surrounding mutex.
unsafe impl Send for SimState {}

impl SimState {
    fn drive_mut(&mut self, channel: usize) -> Option<&mut SimDrive> {
        let slave = self.channels[channel].selected_slave();
        self.drives[channel * 2 + slave].as_mut()
    }

    fn raise_irq(&mut self, channel: usize) {
        let irq = self.channels[channel].irq;
        self.irq_events.push_back(irq);
    }

    fn present_signature(&mut self, channel: usize) {
        let slave = self.channels[channel].selected_slave();
        let drive = self.drives[channel * 2 + slave].as_ref();
        let chan = &mut self.channels[channel];
        match drive {
            None => {
                chan.lba1[1] = 0xFF;
                chan.lba2[1] = 0xFF;
                chan.status = 0;
            }
            Some(SimDrive::Pata { .. }) => {
                chan.lba1[1] = 0x00;
                chan.lba2[1] = 0x00;
                chan.status = STATUS_DRDY;
            }
            Some(SimDrive::Atapi { .. }) => {
                chan.lba1[1] = 0x14;
                chan.lba2[1] = 0xEB;
                chan.status = STATUS_DRDY;
            }
        }
        chan.error = 0;
    }

    fn soft_reset(&mut self, channel: usize) {
        let chan = &mut self.channels[channel];
        chan.drive_select = 0xA0;
        chan.data_in.clear();
        chan.data_out.clear();
        chan.out_mode = OutMode::Idle;
        chan.dma_lba = None;
        self.present_signature(channel);
    }

    fn chan_index(&self, port: u16) -> Option<(usize, u16)> {
        for (index, chan) in self.channels.iter().enumerate() {
            if (chan.base..chan.base + 8).contains(&port) {
                return Some((index, port - chan.base));
            }
            if port == chan.ctl {
                return Some((index, 8));
            }
        }
        None
    }

    fn bm_index(&self, port: u16) -> Option<(usize, u16)> {
        if (BM_BASE..BM_BASE + 16).contains(&port) {
            let offset = port - BM_BASE;
            Some(((offset / 8) as usize, offset % 8))
        } else {
            None
        }
    }

    fn read8(&mut self, port: u16) -> u8 {
        if let Some((index, offset)) = self.chan_index(port) {
            let chan = &self.channels[index];
            return match offset {
                1 => chan.error,
                2 => chan.nsect[1],
                3 => chan.lba0[1],
                4 => chan.lba1[1],
                5 => chan.lba2[1],
                6 => chan.drive_select,
                // Status and alternate status; the interrupt latch here is
                // the event queue, which delivery already consumed.
                7 | 8 => chan.status,
                _ => 0,
            };
        }
        if let Some((index, offset)) = self.bm_index(port) {
            let chan = &self.channels[index];
            return match offset {
                0 => chan.bm_command,
                2 => chan.bm_status,
                _ => 0,
            };
        }
        0
    }

    fn write8(&mut self, port: u16, value: u8) {
        if let Some((index, offset)) = self.chan_index(port) {
            match offset {
                1 => self.channels[index].features = value,
                2 => {
                    let chan = &mut self.channels[index];
                    chan.nsect[0] = chan.nsect[1];
                    chan.nsect[1] = value;
                }
                3 => {
                    let chan = &mut self.channels[index];
                    chan.lba0[0] = chan.lba0[1];
                    chan.lba0[1] = value;
                }
                4 => {
                    let chan = &mut self.channels[index];
                    chan.lba1[0] = chan.lba1[1];
                    chan.lba1[1] = value;
                }
                5 => {
                    let chan = &mut self.channels[index];
                    chan.lba2[0] = chan.lba2[1];
                    chan.lba2[1] = value;
                }
                6 => {
                    self.channels[index].drive_select = value;
                    self.present_signature(index);
                }
                7 => self.command(index, value),
                8 => {
                    if value & 0x04 != 0 {
                        self.soft_reset(index);
                    }
                }
                _ => {}
            }
            return;
        }
        if let Some((index, offset)) = self.bm_index(port) {
            match offset {
                0 => {
                    self.channels[index].bm_command = value;
                    if value & 0x01 != 0 && value & 0x08 != 0 {
                        self.dma_start(index);
                    }
                }
                2 => self.channels[index].bm_status &= !(value & 0x06),
                _ => {}
            }
        }
    }

    fn read16(&mut self, port: u16) -> u16 {
        if let Some((index, 0)) = self.chan_index(port) {
            let chan = &mut self.channels[index];
            let lo = chan.data_in.pop_front().unwrap_or(0);
            let hi = chan.data_in.pop_front().unwrap_or(0);
            if chan.data_in.is_empty() {
                chan.status &= !STATUS_DRQ;
            }
            return u16::from_le_bytes([lo, hi]);
        }
        u16::from(self.read8(port))
    }

    fn write16(&mut self, port: u16, value: u16) {
        if let Some((index, 0)) = self.chan_index(port) {
            let [lo, hi] = value.to_le_bytes();
            self.channels[index].data_out.push(lo);
            self.channels[index].data_out.push(hi);
            self.advance_out(index);
            return;
        }
        self.write8(port, value as u8);
    }

    fn read32(&mut self, port: u16) -> u32 {
        match port {
            0xCF8 => self.config_address,
            0xCFC => self.config_read(),
            _ => u32::from(self.read16(port)),
        }
    }

    fn write32(&mut self, port: u16, value: u32) {
        match port {
            0xCF8 => self.config_address = value,
            0xCFC => self.config_write(value),
            _ => {
                if let Some((index, 4)) = self.bm_index(port) {
                    self.channels[index].bm_prdt = value;
                } else {
                    self.write16(port, value as u16);
                }
            }
        }
    }

    fn config_target(&self) -> (u8, u8, u8, u8) {
        let address = self.config_address;
        (
            (address >> 16) as u8,
            ((address >> 11) & 0x1F) as u8,
            ((address >> 8) & 0x07) as u8,
            (address & 0xFC) as u8,
        )
    }

    fn config_read(&self) -> u32 {
        match self.config_target() {
            // PIIX3 ISA bridge at function 0, so multi-function scans
            // keep going.
            (0, 1, 0, 0x00) => 0x7000_8086,
            (0, 1, 1, 0x00) => 0x7010_8086,
            (0, 1, 1, 0x04) => 0x0280_0000 | u32::from(self.pci_command),
            (0, 1, 1, 0x20) => self.bar4,
            _ => 0xFFFF_FFFF,
        }
    }

    fn config_write(&mut self, value: u32) {
        if let (0, 1, 1, 0x04) = self.config_target() {
            self.pci_command = value as u16;
        }
    }

    fn command(&mut self, index: usize, command: u8) {
        enum Action {
            Absent,
            Abort,
            DataIn(Vec<u8>),
            StartPioWrite(u64),
            ArmDma(u64),
            Flush,
            StartPacket,
        }

        let lba28 = self.channels[index].lba28();
        let lba48 = self.channels[index].lba48();
        let count = u64::from(self.channels[index].nsect[1]).max(1);
        let slot = index * 2 + self.channels[index].selected_slave();

        let action = match (command, &self.drives[slot]) {
            (_, None) => Action::Absent,
            (0xEC, Some(SimDrive::Pata { sectors, .. })) => {
                Action::DataIn(pata_identify(*sectors, "SIM HARDDISK"))
            }
            (0xA1, Some(SimDrive::Atapi { .. })) => Action::DataIn(atapi_identify("SIM CD-ROM")),
            (0x20, Some(SimDrive::Pata { sectors, data })) => {
                if lba28 + count > *sectors {
                    Action::Abort
                } else {
                    let mut bytes = Vec::new();
                    for sector in lba28..lba28 + count {
                        bytes.extend_from_slice(&sector_bytes(data, sector));
                    }
                    Action::DataIn(bytes)
                }
            }
            (0x30, Some(SimDrive::Pata { .. })) => Action::StartPioWrite(lba28),
            (0xC8, Some(SimDrive::Pata { .. })) => Action::ArmDma(lba48),
            (0xE7, Some(_)) => Action::Flush,
            (0xA0, Some(SimDrive::Atapi { .. })) => Action::StartPacket,
            _ => Action::Abort,
        };

        match action {
            Action::Absent => self.channels[index].status = 0,
            Action::Abort => self.abort(index),
            Action::DataIn(bytes) => {
                let chan = &mut self.channels[index];
                chan.data_in = bytes.into();
                chan.status = STATUS_DRDY | STATUS_DRQ;
                self.raise_irq(index);
            }
            Action::StartPioWrite(lba) => {
                let chan = &mut self.channels[index];
                chan.data_out.clear();
                chan.out_mode = OutMode::PioWrite { lba };
                chan.status = STATUS_DRDY | STATUS_DRQ;
            }
            Action::ArmDma(lba) => {
                let chan = &mut self.channels[index];
                chan.dma_lba = Some(lba);
                chan.status = STATUS_DRDY;
            }
            Action::Flush => self.channels[index].status = STATUS_DRDY,
            Action::StartPacket => {
                let chan = &mut self.channels[index];
                chan.data_out.clear();
                chan.out_mode = OutMode::Packet;
                chan.status = STATUS_DRDY | STATUS_DRQ;
            }
        }
    }

    fn abort(&mut self, index: usize) {
        let chan = &mut self.channels[index];
        chan.status = STATUS_DRDY | STATUS_ERR;
        chan.error = 0x04; // ABRT
    }

    fn advance_out(&mut self, index: usize) {
        match self.channels[index].out_mode {
            OutMode::Idle => {
                self.channels[index].data_out.clear();
            }
            OutMode::PioWrite { lba } => {
                if self.channels[index].data_out.len() < 512 {
                    return;
                }
                let mut sector: Vec<u8> = self.channels[index].data_out.drain(..512).collect();
                self.channels[index].out_mode = OutMode::Idle;
                if self.flaky_writes > 0 {
                    self.flaky_writes -= 1;
                    sector[0] ^= 0xFF;
                }
                if let Some(SimDrive::Pata { data, .. }) = self.drive_mut(index) {
                    let end = (lba as usize + 1) * 512;
                    if data.len() < end {
                        data.resize(end, 0);
                    }
                    data[end - 512..end].copy_from_slice(&sector);
                }
                self.channels[index].status = STATUS_DRDY;
                self.raise_irq(index);
            }
            OutMode::Packet => {
                if self.channels[index].data_out.len() < 12 {
                    return;
                }
                let mut packet = [0u8; 12];
                packet.copy_from_slice(&self.channels[index].data_out[..12]);
                self.channels[index].data_out.clear();
                self.channels[index].out_mode = OutMode::Idle;
                self.handle_packet(index, packet);
            }
        }
    }

    /// Signal CHECK CONDITION for a packet command.
    fn packet_error(&mut self, index: usize) {
        let chan = &mut self.channels[index];
        chan.status = STATUS_DRDY | STATUS_ERR;
        chan.error = 0x20;
        self.raise_irq(index);
    }

    fn handle_packet(&mut self, index: usize, packet: [u8; 12]) {
        let slot = index * 2 + self.channels[index].selected_slave();
        let geometry = match &self.drives[slot] {
            Some(SimDrive::Atapi {
                blocks, block_size, ..
            }) => Some((*blocks, *block_size)),
            _ => None,
        };
        let Some((blocks, block_size)) = geometry else {
            self.abort(index);
            return;
        };

        match packet[0] {
            // READ CAPACITY(10)
            0x25 => {
                if blocks == 0 {
                    self.packet_error(index);
                    return;
                }
                let mut response = Vec::with_capacity(8);
                response.extend_from_slice(&((blocks - 1) as u32).to_be_bytes());
                response.extend_from_slice(&(block_size as u32).to_be_bytes());
                let chan = &mut self.channels[index];
                chan.data_in = response.into();
                chan.lba1[1] = 8;
                chan.lba2[1] = 0;
                chan.status = STATUS_DRDY | STATUS_DRQ;
                self.raise_irq(index);
            }
            // READ(12)
            0xA8 => {
                let lba = u32::from_be_bytes([packet[2], packet[3], packet[4], packet[5]]) as usize;
                let count = usize::from(packet[9]);
                if blocks == 0 || lba + count > blocks {
                    self.packet_error(index);
                    return;
                }
                let mut bytes = Vec::with_capacity(count * block_size);
                if let Some(SimDrive::Atapi { data, .. }) = &self.drives[slot] {
                    for block in lba..lba + count {
                        bytes.extend_from_slice(&block_bytes(data, block, block_size));
                    }
                }
                let staged = bytes.len();
                let chan = &mut self.channels[index];
                chan.data_in = bytes.into();
                chan.lba1[1] = (staged & 0xFF) as u8;
                chan.lba2[1] = (staged >> 8) as u8;
                chan.status = STATUS_DRDY | STATUS_DRQ;
                self.raise_irq(index);
            }
            _ => self.abort(index),
        }
    }

    fn dma_start(&mut self, index: usize) {
        let prdt = self.channels[index].bm_prdt as usize;
        let mut raw = [0u8; 8];
        // SAFETY: The PRDT "physical" address is an arena offset handed
        // out by the allocator half of this mock.
        unsafe {
            core::ptr::copy_nonoverlapping(self.arena_base.add(prdt), raw.as_mut_ptr(), 8);
        }
        let base = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        let count = usize::from(u16::from_le_bytes([raw[4], raw[5]]));

        if let Some(lba) = self.channels[index].dma_lba.take() {
            if let Some(SimDrive::Pata { data, .. }) = self.drive_mut(index) {
                let sector = sector_bytes(data, lba);
                let len = count.min(sector.len());
                // SAFETY: Same arena; the driver allocated `count` bytes
                // at `base` for the bounce buffer.
                unsafe {
                    core::ptr::copy_nonoverlapping(
                        sector.as_ptr(),
                        self.arena_base.add(base),
                        len,
                    );
                }
            }
            let chan = &mut self.channels[index];
            chan.bm_status |= 0x04;
            chan.status = STATUS_DRDY;
            self.raise_irq(index);
        }
    }
}

fn sector_bytes(data: &[u8], sector: u64) -> Vec<u8> {
    let start = sector as usize * 512;
    let mut bytes = std::vec![0u8; 512];
    if start < data.len() {
        let end = (start + 512).min(data.len());
        bytes[..end - start].copy_from_slice(&data[start..end]);
    }
    bytes
}

fn block_bytes(data: &[u8], block: usize, block_size: usize) -> Vec<u8> {
    let start = block * block_size;
    let mut bytes = std::vec![0u8; block_size];
    if start < data.len() {
        let end = (start + block_size).min(data.len());
        bytes[..end - start].copy_from_slice(&data[start..end]);
    }
    bytes
}

fn put_model(identify: &mut [u8], model: &str) {
    let mut padded = [b' '; 40];
    padded[..model.len()].copy_from_slice(model.as_bytes());
    // ATA strings carry two characters per word, high byte first.
    for (pair, chunk) in padded.chunks_exact(2).enumerate() {
        identify[54 + pair * 2] = chunk[1];
        identify[54 + pair * 2 + 1] = chunk[0];
    }
}

fn pata_identify(sectors: u64, model: &str) -> Vec<u8> {
    let mut identify = std::vec![0u8; 512];
    put_model(&mut identify, model);
    let lba28 = u32::try_from(sectors).unwrap_or(0x0FFF_FFFF);
    identify[120..124].copy_from_slice(&lba28.to_le_bytes());
    if sectors >= 1 << 28 {
        identify[200..208].copy_from_slice(&sectors.to_le_bytes());
    }
    identify
}

fn atapi_identify(model: &str) -> Vec<u8> {
    let mut identify = std::vec![0u8; 512];
    put_model(&mut identify, model);
    identify
}

/// The emulated controller, shared between the port capability, the DMA
/// allocator, and the test body.
pub struct SimIde {
    state: Mutex<SimState>,
}

impl SimIde {
    pub fn new() -> Arc<SimIde> {
        let arena = Box::leak(std::vec![0u8; ARENA_LEN].into_boxed_slice());
        Arc::new(SimIde {
            state: Mutex::new(SimState {
                channels: [SimChannel::new(0), SimChannel::new(1)],
                drives: [None, None, None, None],
                pci_command: 0x0000,
                bar4: u32::from(BM_BASE) | 1,
                config_address: 0,
                flaky_writes: 0,
                irq_events: VecDeque::new(),
                trace: Vec::new(),
                arena_base: arena.as_mut_ptr(),
                arena_next: 0,
            }),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().expect("sim state poisoned")
    }

    pub fn install_pata(&self, channel: usize, slave: usize, sectors: u64, data: Vec<u8>) {
        self.state().drives[channel * 2 + slave] = Some(SimDrive::Pata { sectors, data });
    }

    pub fn install_atapi(
        &self,
        channel: usize,
        slave: usize,
        blocks: usize,
        block_size: usize,
        data: Vec<u8>,
    ) {
        self.state().drives[channel * 2 + slave] = Some(SimDrive::Atapi {
            blocks,
            block_size,
            data,
        });
    }

    /// Replace BAR4, e.g. with a memory-space BAR to force the PIO path.
    pub fn set_bar4(&self, value: u32) {
        self.state().bar4 = value;
    }

    /// Corrupt the next `count` sector writes, for verify-retry tests.
    pub fn set_flaky_writes(&self, count: u32) {
        self.state().flaky_writes = count;
    }

    pub fn take_irq(&self) -> Option<u8> {
        self.state().irq_events.pop_front()
    }

    pub fn trace(&self) -> Vec<TraceOp> {
        self.state().trace.clone()
    }

    pub fn trace_len(&self) -> usize {
        self.state().trace.len()
    }

    /// Values written to a channel's command register, in order.
    pub fn command_writes(&self, channel: usize) -> Vec<u8> {
        let state = self.state();
        let port = state.channels[channel].base + 7;
        state
            .trace
            .iter()
            .filter(|op| op.dir == Dir::Out && op.port == port && op.size == 1)
            .map(|op| op.value as u8)
            .collect()
    }

    /// Current contents of a PATA drive's backing store.
    pub fn pata_data(&self, channel: usize, slave: usize) -> Vec<u8> {
        match &self.state().drives[channel * 2 + slave] {
            Some(SimDrive::Pata { data, .. }) => data.clone(),
            _ => Vec::new(),
        }
    }

    pub fn pci_command(&self) -> u16 {
        self.state().pci_command
    }
}

/// Port capability backed by the simulator.
pub struct SimPort(pub Arc<SimIde>);

impl PortIo for SimPort {
    fn inb(&self, port: u16) -> u8 {
        let mut state = self.0.state();
        let value = state.read8(port);
        state.trace.push(TraceOp {
            port,
            dir: Dir::In,
            value: u32::from(value),
            size: 1,
        });
        value
    }

    fn outb(&self, port: u16, value: u8) {
        let mut state = self.0.state();
        state.trace.push(TraceOp {
            port,
            dir: Dir::Out,
            value: u32::from(value),
            size: 1,
        });
        state.write8(port, value);
    }

    fn inw(&self, port: u16) -> u16 {
        let mut state = self.0.state();
        let value = state.read16(port);
        state.trace.push(TraceOp {
            port,
            dir: Dir::In,
            value: u32::from(value),
            size: 2,
        });
        value
    }

    fn outw(&self, port: u16, value: u16) {
        let mut state = self.0.state();
        state.trace.push(TraceOp {
            port,
            dir: Dir::Out,
            value: u32::from(value),
            size: 2,
        });
        state.write16(port, value);
    }

    fn inl(&self, port: u16) -> u32 {
        let mut state = self.0.state();
        let value = state.read32(port);
        state.trace.push(TraceOp {
            port,
            dir: Dir::In,
            value,
            size: 4,
        });
        value
    }

    fn outl(&self, port: u16, value: u32) {
        let mut state = self.0.state();
        state.trace.push(TraceOp {
            port,
            dir: Dir::Out,
            value,
            size: 4,
        });
        state.write32(port, value);
    }
}

/// DMA allocator carving the simulator's arena; "physical" addresses are
/// arena offsets, which is what the bus-master model expects.
pub struct SimDmaAlloc(pub Arc<SimIde>);

impl DmaAllocator for SimDmaAlloc {
    fn alloc(&self, len: usize, align: usize) -> Option<DmaBuf> {
        let mut state = self.0.state();
        let start = (state.arena_next + align - 1) & !(align - 1);
        if start + len > ARENA_LEN {
            return None;
        }
        state.arena_next = start + len;
        // SAFETY: In-bounds offset into the leaked arena.
        let virt = NonNull::new(unsafe { state.arena_base.add(start) })?;
        Some(DmaBuf {
            virt,
            phys: start as u32,
            len,
        })
    }
}

/// Probe the simulated machine exactly the way boot does.
pub fn bring_up(sim: &Arc<SimIde>) -> Arc<IdeController> {
    IdeController::init(
        Box::new(SimPort(Arc::clone(sim))),
        Box::new(SimDmaAlloc(Arc::clone(sim))),
    )
}

/// Background thread delivering latched interrupts to the controller,
/// standing in for the IDT.
pub struct IrqPump {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl IrqPump {
    pub fn spawn(sim: Arc<SimIde>, controller: Arc<IdeController>) -> IrqPump {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            while !stop_flag.load(Ordering::Acquire) {
                match sim.take_irq() {
                    Some(irq) => controller.handle_irq(irq),
                    None => std::thread::yield_now(),
                }
            }
        });
        IrqPump {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for IrqPump {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// Driver core for PCI IDE (PATA + ATAPI) controllers.
// Reference: https://wiki.osdev.org/ATA_PIO_Mode
// Reference: https://wiki.osdev.org/ATA/ATAPI_using_DMA

use crate::block::block_core::{BlockSector, BLOCK_SECTOR_SIZE};
use crate::block::block_error::BlockError;
use crate::drivers::ata::ata_channel::AtaChannel;
use crate::drivers::ata::ata_device::DmaEngine;
use crate::drivers::ata::atapi;
use crate::drivers::ata::identify::IdentifyBlock;
use crate::drivers::pci::{self, PciAddress};
use crate::interrupts::pic;
use crate::mem::dma::DmaAllocator;
use crate::sync::SpinLock;
use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use silt_shared::port::PortIo;
use silt_shared::{eprintln, println};

// Commands ----------------------------------------------------------------------------------------
// Reference: https://wiki.osdev.org/ATA_Command_Matrix

/// READ SECTOR              PIO
pub const ATA_READ_SECTOR: u8 = 0x20;
/// WRITE SECTOR             PIO
pub const ATA_WRITE_SECTOR: u8 = 0x30;
/// PACKET                   ATAPI command transport
pub const ATA_PACKET: u8 = 0xA0;
/// IDENTIFY PACKET DEVICE   PIO
pub const ATA_IDENTIFY_PACKET: u8 = 0xA1;
/// READ DMA                 28-bit bus-master read
pub const ATA_READ_DMA: u8 = 0xC8;
/// CACHE FLUSH
pub const ATA_CACHE_FLUSH: u8 = 0xE7;
/// IDENTIFY DEVICE          PIO
pub const ATA_IDENTIFY: u8 = 0xEC;

/// PCI vendor/device pairs this driver binds to (PIIX / PIIX3 IDE).
const IDE_CONTROLLERS: [(u16, u16); 2] = [(0x8086, 0x7010), (0x8086, 0x7111)];

/// BSY-clear poll bound used while a freshly reset device settles.
const PROBE_POLL_CAP: u32 = 10_000;

/// What the post-reset signature in LBA1/LBA2 says sits at a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriveSignature {
    Absent,
    Pata,
    Atapi,
    Unknown,
}

fn classify_signature(lba1: u8, lba2: u8) -> DriveSignature {
    match (lba1, lba2) {
        (0xFF, 0xFF) => DriveSignature::Absent,
        // PATA, or SATA in legacy emulation.
        (0x00, 0x00) | (0x3C, 0xC3) => DriveSignature::Pata,
        // ATAPI, or SATA ATAPI.
        (0x14, 0xEB) | (0x69, 0x96) => DriveSignature::Atapi,
        _ => DriveSignature::Unknown,
    }
}

/// A discovered drive, fixed after probe.
pub struct AtaDrive {
    /// Channel index (0 = primary, 1 = secondary).
    pub(super) channel: usize,
    /// 0 = master, 1 = slave; bit 4 of the drive/head register.
    pub(super) slave: u8,
    pub(super) kind: DriveKind,
    /// Node attribute name (`atadev0`, `cdrom0`, ...).
    name: String,
    /// Name under `/dev` (`hda`, `cdrom0`, ...).
    dev_name: String,
    identify: IdentifyBlock,
}

pub(super) enum DriveKind {
    Pata {
        /// Addressable sectors from IDENTIFY.
        sectors: u64,
        /// Bus-master state; `None` means every transfer takes the PIO
        /// path.
        dma: Option<DmaEngine>,
    },
    Atapi {
        /// Last addressable block, inclusive. Zero when no medium is
        /// loaded.
        last_lba: u32,
        /// Block size reported by READ CAPACITY, usually 2048.
        sector_size: u32,
    },
}

impl AtaDrive {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dev_name(&self) -> &str {
        &self.dev_name
    }

    pub fn model(&self) -> String {
        self.identify.model()
    }

    pub fn is_atapi(&self) -> bool {
        matches!(self.kind, DriveKind::Atapi { .. })
    }

    /// Transfer granularity of the device in bytes.
    pub fn sector_size(&self) -> usize {
        match self.kind {
            DriveKind::Pata { .. } => BLOCK_SECTOR_SIZE,
            DriveKind::Atapi { sector_size, .. } => sector_size as usize,
        }
    }

    /// Device capacity in bytes; zero for an empty optical drive.
    pub fn capacity_bytes(&self) -> u64 {
        match self.kind {
            DriveKind::Pata { sectors, .. } => sectors * BLOCK_SECTOR_SIZE as u64,
            DriveKind::Atapi {
                last_lba,
                sector_size,
            } => {
                if last_lba == 0 {
                    0
                } else {
                    (u64::from(last_lba) + 1) * u64::from(sector_size)
                }
            }
        }
    }
}

/// The driver context: collaborator handles, the two channels, and the
/// drives the probe found.
///
/// A single instance exists per controller function; every hardware
/// transaction, on any channel, is serialized by `transfer_lock`.
pub struct IdeController {
    pub(super) io: Box<dyn PortIo>,
    pub(super) channels: [AtaChannel; 2],
    drives: Vec<AtaDrive>,
    /// PCI function of the IDE controller, when the scan found one.
    pci: Option<PciAddress>,
    pub(super) transfer_lock: SpinLock<()>,
}

impl IdeController {
    /// Probe the four legacy positions and build the driver context.
    ///
    /// Must run with interrupts still masked for the IDE lines; the
    /// caller wires up the handlers (see `ata_interrupt::install`) after
    /// this returns.
    pub fn init(io: Box<dyn PortIo>, dma: Box<dyn DmaAllocator>) -> Arc<IdeController> {
        let pci = pci::find_device(&*io, &IDE_CONTROLLERS);
        match pci {
            Some(addr) => println!("ide: controller at {addr}"),
            None => println!("ide: no PCI IDE function; bus-master DMA unavailable"),
        }

        let mut controller = IdeController {
            io,
            channels: [AtaChannel::new(0), AtaChannel::new(1)],
            drives: Vec::new(),
            pci,
            transfer_lock: SpinLock::new(()),
        };

        let mut hd_count = 0u8;
        let mut cdrom_count = 0u8;
        for channel in 0..2 {
            for slave in 0..2u8 {
                controller.probe_position(channel, slave, &*dma, &mut hd_count, &mut cdrom_count);
            }
        }

        Arc::new(controller)
    }

    pub fn drives(&self) -> &[AtaDrive] {
        &self.drives
    }

    pub fn drive(&self, index: usize) -> Option<&AtaDrive> {
        self.drives.get(index)
    }

    /// Classify whatever sits at (channel, slave) and, for real drives,
    /// identify it and bring its transport up.
    fn probe_position(
        &mut self,
        channel: usize,
        slave: u8,
        dma: &dyn DmaAllocator,
        hd_count: &mut u8,
        cdrom_count: &mut u8,
    ) {
        let io = &*self.io;
        let chan = &self.channels[channel];

        chan.soft_reset(io);
        chan.io_delay(io);
        chan.select_device(io, slave);
        chan.wait_not_busy(io, Some(PROBE_POLL_CAP));

        let lba1 = io.inb(chan.reg_lbam());
        let lba2 = io.inb(chan.reg_lbah());
        let signature = classify_signature(lba1, lba2);

        match signature {
            DriveSignature::Absent => {}
            DriveSignature::Unknown => {
                println!(
                    "ide{channel}.{slave}: unknown signature {lba1:#04x},{lba2:#04x}, skipping"
                );
            }
            DriveSignature::Pata => {
                let Some(identify) = self.identify_drive(channel, slave, ATA_IDENTIFY) else {
                    return;
                };
                let sectors = identify.sectors();
                let engine = self.dma_init(channel, dma);
                let index = *hd_count;
                *hd_count += 1;
                let drive = AtaDrive {
                    channel,
                    slave,
                    kind: DriveKind::Pata {
                        sectors,
                        dma: engine,
                    },
                    name: format!("atadev{index}"),
                    dev_name: format!("hd{}", char::from(b'a' + index)),
                    identify,
                };
                println!(
                    "ide{channel}.{slave}: {} \"{}\", {} sectors ({}M)",
                    drive.dev_name,
                    drive.model(),
                    sectors,
                    sectors >> 11
                );
                self.drives.push(drive);
            }
            DriveSignature::Atapi => {
                let Some(identify) = self.identify_drive(channel, slave, ATA_IDENTIFY_PACKET)
                else {
                    return;
                };
                let (last_lba, sector_size) =
                    match atapi::probe_capacity(io, &self.channels[channel], slave) {
                        Ok(capacity) => capacity,
                        Err(_) => (0, atapi::DEFAULT_SECTOR_SIZE),
                    };
                let index = *cdrom_count;
                *cdrom_count += 1;
                let drive = AtaDrive {
                    channel,
                    slave,
                    kind: DriveKind::Atapi {
                        last_lba,
                        sector_size,
                    },
                    name: format!("cdrom{index}"),
                    dev_name: format!("cdrom{index}"),
                    identify,
                };
                if last_lba == 0 {
                    println!(
                        "ide{channel}.{slave}: {} \"{}\", no medium",
                        drive.dev_name,
                        drive.model()
                    );
                } else {
                    println!(
                        "ide{channel}.{slave}: {} \"{}\", {} blocks of {} bytes",
                        drive.dev_name,
                        drive.model(),
                        u64::from(last_lba) + 1,
                        sector_size
                    );
                }
                self.drives.push(drive);
            }
        }
    }

    /// Issue IDENTIFY (0xEC) or IDENTIFY PACKET (0xA1) and read the
    /// 256-word response. `None` means the device never produced data
    /// and the position is treated as empty.
    fn identify_drive(&self, channel: usize, slave: u8, command: u8) -> Option<IdentifyBlock> {
        let io = &*self.io;
        let chan = &self.channels[channel];

        chan.select_device(io, slave);
        chan.issue_command(io, command);
        chan.io_delay(io);
        if chan.wait_data_request(io).is_err() {
            println!("ide{channel}.{slave}: no IDENTIFY response, skipping");
            return None;
        }

        let mut words = [0u16; IdentifyBlock::SIZE / 2];
        chan.read_data(io, &mut words);

        let mut block = IdentifyBlock::new_zeroed();
        for (bytes, word) in block.as_bytes_mut().chunks_exact_mut(2).zip(words) {
            bytes[0] = word as u8;
            bytes[1] = (word >> 8) as u8;
        }
        Some(block)
    }

    /// Set up the bus-master side for a PATA drive: PRDT + bounce buffer
    /// and the channel's register block behind BAR4.
    ///
    /// Returns `None` (leaving the drive on the PIO path) when there is
    /// no PCI function, no DMA memory, or BAR4 is not an I/O-space BAR.
    fn dma_init(&mut self, channel: usize, dma: &dyn DmaAllocator) -> Option<DmaEngine> {
        let pci_addr = self.pci?;
        let io = &*self.io;

        let engine = DmaEngine::alloc(dma)?;

        let bar4 = pci::read_bar4(io, pci_addr);
        if bar4 & 1 == 0 {
            // Memory-mapped bus-master registers; nothing here can drive
            // them, so the device stays on PIO.
            println!("ide{channel}: BAR4 is not I/O space, disabling DMA");
            return None;
        }
        pci::enable_bus_master(io, pci_addr);

        let base = (bar4 & 0xFFFF_FFFC) as u16 + channel as u16 * 8;
        self.channels[channel].set_bus_master(base);
        Some(engine)
    }

    /// Unmask both IDE lines at the PIC. Runs after the handler entry
    /// points are wired up.
    pub fn enable_irqs(&self) {
        for channel in &self.channels {
            pic::irq_unmask(&*self.io, channel.irq());
        }
    }

    /// Interrupt handler body, shared by lines 14 and 15.
    ///
    /// Reads the status register to acknowledge the device, wakes a
    /// sleeping packet command if one is expected, and EOIs the PIC.
    /// Never takes `transfer_lock`.
    pub fn handle_irq(&self, irq: u8) {
        for channel in &self.channels {
            if channel.irq() == irq {
                let status = self.io.inb(channel.reg_status());
                if channel.is_expecting_interrupt() {
                    channel.post_completion();
                } else if status & crate::drivers::ata::ata_channel::STA_BSY == 0 {
                    // DMA completions poll the status bits instead of
                    // sleeping; anything else is spurious.
                    eprintln!(
                        "ide{}: spurious interrupt (status {status:#04x})",
                        channel.channel_num()
                    );
                }
            }
        }
        pic::end_of_interrupt(&*self.io, irq);
    }

    /// Read one device sector (`drive.sector_size()` bytes) into `buf`.
    pub fn read_sector(
        &self,
        index: usize,
        sector: BlockSector,
        buf: &mut [u8],
    ) -> Result<(), BlockError> {
        let drive = self.drives.get(index).ok_or(BlockError::SectorOutOfBounds)?;
        if buf.len() != drive.sector_size() {
            return Err(BlockError::BufferInvalid);
        }
        match &drive.kind {
            DriveKind::Pata { dma: Some(engine), .. } => {
                self.read_sector_dma(drive, engine, sector, buf)
            }
            DriveKind::Pata { dma: None, .. } => self.read_sector_pio(drive, sector, buf),
            DriveKind::Atapi { last_lba, .. } => {
                if *last_lba == 0 {
                    return Err(BlockError::NoMedium);
                }
                atapi::read_sector(self, drive, sector as u32, buf)
            }
        }
    }

    /// Write one 512-byte sector and read it back until the data on the
    /// platter matches, with a bounded number of attempts.
    pub fn write_sector(
        &self,
        index: usize,
        sector: BlockSector,
        buf: &[u8],
    ) -> Result<(), BlockError> {
        let drive = self.drives.get(index).ok_or(BlockError::SectorOutOfBounds)?;
        match &drive.kind {
            DriveKind::Pata { .. } => self.write_sector_verified(drive, sector, buf),
            // Optical media are read-only here.
            DriveKind::Atapi { .. } => Err(BlockError::WriteError),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::drivers::ata::mock_ide::{bring_up, Dir, IrqPump, SimIde};
    use crate::vfs::block_node::publish_nodes;
    use crate::vfs::{NodeRegistry, NODE_BLOCK_DEVICE};

    const HDA_SECTORS: u64 = 32_768; // 16 MiB
    const CD_BLOCKS: usize = 358_400; // 700 MiB at 2048 bytes

    fn pattern(len: usize, seed: u32) -> Vec<u8> {
        (0..len).map(|i| (i as u32 * 31 + seed) as u8).collect()
    }

    /// Primary-master disk and secondary-master CD, the machine most
    /// tests run against.
    fn default_machine() -> Arc<SimIde> {
        let sim = SimIde::new();
        sim.install_pata(0, 0, HDA_SECTORS, pattern(64 * 512, 1));
        sim.install_atapi(1, 0, CD_BLOCKS, 2048, pattern(8 * 2048, 2));
        sim
    }

    fn registry_for(sim: &Arc<SimIde>) -> (Arc<IdeController>, NodeRegistry) {
        let controller = bring_up(sim);
        let mut registry = NodeRegistry::new();
        publish_nodes(&controller, &mut registry);
        (controller, registry)
    }

    #[test]
    fn probe_publishes_expected_topology() {
        let sim = default_machine();
        let (controller, registry) = registry_for(&sim);

        assert_eq!(registry.len(), 2);

        let hda = registry.by_path("/dev/hda").expect("hda mounted");
        assert_eq!(hda.length, 16_777_216);
        assert_eq!(hda.name, "atadev0");
        assert_eq!(hda.flags, NODE_BLOCK_DEVICE);
        assert_eq!(hda.mask, 0o660);
        assert_eq!((hda.uid, hda.gid), (0, 0));

        let cdrom = registry.by_path("/dev/cdrom0").expect("cdrom mounted");
        assert_eq!(cdrom.length, 734_003_200);
        assert_eq!(cdrom.name, "cdrom0");

        assert!(registry.by_path("/dev/hdb").is_none());
        assert_eq!(controller.drives().len(), 2);
        assert_eq!(controller.drive(0).map(|d| d.model()), Some(String::from("SIM HARDDISK")));
    }

    #[test]
    fn single_sector_read_issues_one_dma_command() {
        let sim = default_machine();
        let (_controller, registry) = registry_for(&sim);
        let hda = registry.by_path("/dev/hda").expect("hda mounted");

        let commands_before = sim.command_writes(0).len();
        let mut buf = vec![0u8; 512];
        assert_eq!(hda.read(0, &mut buf), 512);
        assert_eq!(buf, &pattern(64 * 512, 1)[..512]);

        let commands: Vec<u8> = sim.command_writes(0)[commands_before..].to_vec();
        assert_eq!(commands, vec![ATA_READ_DMA]);
    }

    #[test]
    fn unaligned_read_spans_three_sectors() {
        let sim = default_machine();
        let (_controller, registry) = registry_for(&sim);
        let hda = registry.by_path("/dev/hda").expect("hda mounted");

        let commands_before = sim.command_writes(0).len();
        let mut buf = vec![0u8; 1000];
        assert_eq!(hda.read(100, &mut buf), 1000);
        assert_eq!(buf, &pattern(64 * 512, 1)[100..1100]);

        // Prefix on sector 0, whole sector 1, postfix on sector 2.
        let commands: Vec<u8> = sim.command_writes(0)[commands_before..].to_vec();
        assert_eq!(commands, vec![ATA_READ_DMA; 3]);
    }

    #[test]
    fn write_is_verified_by_a_read_back() {
        let sim = default_machine();
        let (_controller, registry) = registry_for(&sim);
        let hda = registry.by_path("/dev/hda").expect("hda mounted");

        let commands_before = sim.command_writes(0).len();
        let data = vec![0xAA; 512];
        assert_eq!(hda.write(512, &data), 512);

        let commands: Vec<u8> = sim.command_writes(0)[commands_before..].to_vec();
        assert_eq!(commands, vec![ATA_WRITE_SECTOR, ATA_CACHE_FLUSH, ATA_READ_DMA]);

        let mut buf = vec![0u8; 512];
        assert_eq!(hda.read(512, &mut buf), 512);
        assert_eq!(buf, data);
        assert_eq!(&sim.pata_data(0, 0)[512..1024], &data[..]);
    }

    #[test]
    fn verify_mismatch_rewrites_the_sector() {
        let sim = default_machine();
        let (_controller, registry) = registry_for(&sim);
        let hda = registry.by_path("/dev/hda").expect("hda mounted");

        sim.set_flaky_writes(1);
        let commands_before = sim.command_writes(0).len();
        let data = pattern(512, 9);
        assert_eq!(hda.write(0, &data), 512);

        let commands: Vec<u8> = sim.command_writes(0)[commands_before..].to_vec();
        assert_eq!(
            commands,
            vec![
                ATA_WRITE_SECTOR,
                ATA_CACHE_FLUSH,
                ATA_READ_DMA,
                ATA_WRITE_SECTOR,
                ATA_CACHE_FLUSH,
                ATA_READ_DMA,
            ]
        );
        assert_eq!(&sim.pata_data(0, 0)[..512], &data[..]);
    }

    #[test]
    fn verify_exhaustion_is_a_hard_error() {
        let sim = default_machine();
        let (controller, registry) = registry_for(&sim);
        let hda = registry.by_path("/dev/hda").expect("hda mounted");

        sim.set_flaky_writes(u32::MAX);
        let data = pattern(512, 3);
        assert_eq!(hda.write(0, &data), 0);
        assert_eq!(
            controller.write_sector(0, 0, &data),
            Err(BlockError::VerifyFailed)
        );
    }

    #[test]
    fn memory_bar4_falls_back_to_pio_reads() {
        let sim = SimIde::new();
        sim.install_pata(0, 0, HDA_SECTORS, pattern(64 * 512, 1));
        sim.set_bar4(0xE000_0000);
        let (_controller, registry) = registry_for(&sim);

        // The node exists even though DMA never armed.
        let hda = registry.by_path("/dev/hda").expect("hda mounted");

        let commands_before = sim.command_writes(0).len();
        let mut buf = vec![0u8; 512];
        assert_eq!(hda.read(1024, &mut buf), 512);
        assert_eq!(buf, &pattern(64 * 512, 1)[1024..1536]);

        let commands: Vec<u8> = sim.command_writes(0)[commands_before..].to_vec();
        assert_eq!(commands, vec![ATA_READ_SECTOR]);
        // Bus mastering was never switched on.
        assert_eq!(sim.pci_command() & (1 << 2), 0);
    }

    #[test]
    fn out_of_range_requests_do_no_port_io() {
        let sim = default_machine();
        let (_controller, registry) = registry_for(&sim);
        let hda = registry.by_path("/dev/hda").expect("hda mounted");

        let trace_before = sim.trace_len();
        let mut buf = vec![0u8; 512];
        assert_eq!(hda.read(16_777_216, &mut buf), 0);
        assert_eq!(hda.read(u64::MAX, &mut buf), 0);
        assert_eq!(hda.write(16_777_216, &buf), 0);
        assert_eq!(sim.trace_len(), trace_before);
    }

    #[test]
    fn reads_clamp_at_capacity() {
        let sim = default_machine();
        let (_controller, registry) = registry_for(&sim);
        let hda = registry.by_path("/dev/hda").expect("hda mounted");

        let mut buf = vec![0u8; 1000];
        assert_eq!(hda.read(16_777_216 - 100, &mut buf), 100);
    }

    #[test]
    fn atapi_read_is_interrupt_driven() {
        let sim = default_machine();
        let (controller, registry) = registry_for(&sim);
        let cdrom = registry.by_path("/dev/cdrom0").expect("cdrom mounted");

        let _pump = IrqPump::spawn(Arc::clone(&sim), Arc::clone(&controller));

        let commands_before = sim.command_writes(1).len();
        let mut buf = vec![0u8; 2048];
        assert_eq!(cdrom.read(4096, &mut buf), 2048);
        assert_eq!(buf, &pattern(8 * 2048, 2)[4096..6144]);

        // One PACKET command carried the READ(12).
        let commands: Vec<u8> = sim.command_writes(1)[commands_before..].to_vec();
        assert_eq!(commands, vec![ATA_PACKET]);
    }

    #[test]
    fn atapi_without_medium_reads_nothing() {
        let sim = SimIde::new();
        sim.install_atapi(1, 1, 0, 2048, Vec::new());
        let (_controller, registry) = registry_for(&sim);

        let cdrom = registry.by_path("/dev/cdrom0").expect("node still mounted");
        assert_eq!(cdrom.length, 0);

        let trace_before = sim.trace_len();
        let mut buf = vec![0u8; 2048];
        assert_eq!(cdrom.read(0, &mut buf), 0);
        assert_eq!(sim.trace_len(), trace_before);
    }

    #[test]
    fn atapi_writes_are_refused() {
        let sim = default_machine();
        let (controller, registry) = registry_for(&sim);
        let cdrom = registry.by_path("/dev/cdrom0").expect("cdrom mounted");

        let buf = vec![0u8; 2048];
        assert_eq!(cdrom.write(0, &buf), 0);
        assert_eq!(
            controller.write_sector(1, 0, &buf[..512]),
            Err(BlockError::WriteError)
        );
    }

    #[test]
    fn concurrent_reads_serialize_into_whole_transactions() {
        let sim = default_machine();
        let (controller, _registry) = registry_for(&sim);

        let trace_before = sim.trace_len();
        let mut workers = Vec::new();
        for lba in [3u64, 7] {
            let controller = Arc::clone(&controller);
            workers.push(std::thread::spawn(move || {
                let mut buf = vec![0u8; 512];
                controller.read_sector(0, lba, &mut buf).expect("read");
                buf
            }));
        }
        let results: Vec<Vec<u8>> = workers
            .into_iter()
            .map(|w| w.join().expect("worker"))
            .collect();
        let backing = pattern(64 * 512, 1);
        assert_eq!(results[0], &backing[3 * 512..4 * 512]);
        assert_eq!(results[1], &backing[7 * 512..8 * 512]);

        // The writes that program a DMA transaction must come out as two
        // complete back-to-back sequences, never interleaved mid-command.
        let interesting = [0x1F7u16, 0xC000, 0xC002, 0xC004];
        let ops: Vec<(u16, u32)> = sim.trace()[trace_before..]
            .iter()
            .filter(|op| op.dir == Dir::Out && interesting.contains(&op.port))
            .map(|op| (op.port, op.value))
            .collect();
        let expected_one = [
            (0xC000u16, 0x00u32),
            (0xC004, u32::MAX), // PRDT address, value not asserted
            (0xC002, 0x06),
            (0xC000, 0x08),
            (0x1F7, 0xC8),
            (0xC000, 0x09),
            (0xC002, 0x06),
        ];
        assert_eq!(ops.len(), expected_one.len() * 2);
        for (op, expected) in ops.iter().zip(expected_one.iter().chain(expected_one.iter())) {
            assert_eq!(op.0, expected.0, "port order differs: {ops:?}");
            if expected.1 != u32::MAX {
                assert_eq!(op.1, expected.1, "value order differs: {ops:?}");
            }
        }
    }
}

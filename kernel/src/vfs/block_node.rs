//! Device-node capabilities for the IDE driver: byte-range reads and
//! writes executed as planned sector operations.

use crate::drivers::ata::ata_core::IdeController;
use crate::vfs::range::RangePlan;
use crate::vfs::{BlockCapability, DeviceNode, NodeRegistry};
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;

/// Read `buf.len()` bytes at `offset` from drive `index`, returning how
/// many bytes made it. Stops short at the first transport error.
fn read_planned(controller: &IdeController, index: usize, offset: u64, buf: &mut [u8]) -> usize {
    let Some(drive) = controller.drive(index) else {
        return 0;
    };
    let sector_size = drive.sector_size();
    let plan = RangePlan::new(offset, buf.len(), sector_size, drive.capacity_bytes());
    if plan.is_empty() {
        return 0;
    }

    let mut moved = 0;
    if let Some(prefix) = plan.prefix {
        // Scratch sector for the partial; freed on every path out.
        let mut scratch = vec![0u8; sector_size];
        if controller.read_sector(index, prefix.sector, &mut scratch).is_err() {
            return moved;
        }
        buf[prefix.buf_offset..prefix.buf_offset + prefix.len]
            .copy_from_slice(&scratch[prefix.offset_in_sector..prefix.offset_in_sector + prefix.len]);
        moved += prefix.len;
    }

    let mut buf_offset = plan.body_buf_offset;
    for sector in plan.body_sectors() {
        if controller
            .read_sector(index, sector, &mut buf[buf_offset..buf_offset + sector_size])
            .is_err()
        {
            return moved;
        }
        moved += sector_size;
        buf_offset += sector_size;
    }

    if let Some(postfix) = plan.postfix {
        let mut scratch = vec![0u8; sector_size];
        if controller.read_sector(index, postfix.sector, &mut scratch).is_err() {
            return moved;
        }
        buf[postfix.buf_offset..postfix.buf_offset + postfix.len]
            .copy_from_slice(&scratch[..postfix.len]);
        moved += postfix.len;
    }

    moved
}

/// Write `buf` at `offset` to drive `index`. Partial sectors are merged
/// through a scratch read-modify-write; every sector is verified by the
/// transport before it counts.
fn write_planned(controller: &IdeController, index: usize, offset: u64, buf: &[u8]) -> usize {
    let Some(drive) = controller.drive(index) else {
        return 0;
    };
    let sector_size = drive.sector_size();
    let plan = RangePlan::new(offset, buf.len(), sector_size, drive.capacity_bytes());
    if plan.is_empty() {
        return 0;
    }

    let mut moved = 0;
    if let Some(prefix) = plan.prefix {
        let mut scratch = vec![0u8; sector_size];
        if controller.read_sector(index, prefix.sector, &mut scratch).is_err() {
            return moved;
        }
        scratch[prefix.offset_in_sector..prefix.offset_in_sector + prefix.len]
            .copy_from_slice(&buf[prefix.buf_offset..prefix.buf_offset + prefix.len]);
        if controller.write_sector(index, prefix.sector, &scratch).is_err() {
            return moved;
        }
        moved += prefix.len;
    }

    let mut buf_offset = plan.body_buf_offset;
    for sector in plan.body_sectors() {
        if controller
            .write_sector(index, sector, &buf[buf_offset..buf_offset + sector_size])
            .is_err()
        {
            return moved;
        }
        moved += sector_size;
        buf_offset += sector_size;
    }

    if let Some(postfix) = plan.postfix {
        let mut scratch = vec![0u8; sector_size];
        if controller.read_sector(index, postfix.sector, &mut scratch).is_err() {
            return moved;
        }
        scratch[..postfix.len]
            .copy_from_slice(&buf[postfix.buf_offset..postfix.buf_offset + postfix.len]);
        if controller.write_sector(index, postfix.sector, &scratch).is_err() {
            return moved;
        }
        moved += postfix.len;
    }

    moved
}

/// Capability for a hard disk.
struct PataNode {
    controller: Arc<IdeController>,
    index: usize,
}

impl BlockCapability for PataNode {
    fn read(&self, offset: u64, buf: &mut [u8]) -> usize {
        read_planned(&self.controller, self.index, offset, buf)
    }

    fn write(&self, offset: u64, buf: &[u8]) -> usize {
        write_planned(&self.controller, self.index, offset, buf)
    }
}

/// Capability for an optical drive: reads plan like disks (with the
/// medium's block size); writes are refused.
struct AtapiNode {
    controller: Arc<IdeController>,
    index: usize,
}

impl BlockCapability for AtapiNode {
    fn read(&self, offset: u64, buf: &mut [u8]) -> usize {
        read_planned(&self.controller, self.index, offset, buf)
    }

    fn write(&self, _offset: u64, _buf: &[u8]) -> usize {
        0
    }
}

/// Build a node for every probed drive and mount it under `/dev`.
pub fn publish_nodes(controller: &Arc<IdeController>, registry: &mut NodeRegistry) {
    for (index, drive) in controller.drives().iter().enumerate() {
        let ops: Arc<dyn BlockCapability> = if drive.is_atapi() {
            Arc::new(AtapiNode {
                controller: Arc::clone(controller),
                index,
            })
        } else {
            Arc::new(PataNode {
                controller: Arc::clone(controller),
                index,
            })
        };
        let node = DeviceNode::new(String::from(drive.name()), drive.capacity_bytes(), ops);
        registry.mount(format!("/dev/{}", drive.dev_name()), Arc::new(node));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::drivers::ata::mock_ide::{bring_up, SimIde};

    fn machine() -> (Arc<SimIde>, NodeRegistry) {
        let sim = SimIde::new();
        sim.install_pata(0, 0, 4096, vec![0u8; 64 * 512]);
        let controller = bring_up(&sim);
        let mut registry = NodeRegistry::new();
        publish_nodes(&controller, &mut registry);
        (sim, registry)
    }

    #[test]
    fn unaligned_write_merges_into_neighbouring_sectors() {
        let (sim, registry) = machine();
        let hda = registry.by_path("/dev/hda").expect("hda mounted");

        let payload: Vec<u8> = (0..1000u32).map(|i| (i * 7) as u8).collect();
        assert_eq!(hda.write(100, &payload), 1000);

        let disk = sim.pata_data(0, 0);
        assert!(disk[..100].iter().all(|&b| b == 0), "prefix bytes clobbered");
        assert_eq!(&disk[100..1100], &payload[..]);
        assert!(disk[1100..1536].iter().all(|&b| b == 0), "postfix bytes clobbered");

        let mut readback = vec![0u8; 1000];
        assert_eq!(hda.read(100, &mut readback), 1000);
        assert_eq!(readback, payload);
    }

    #[test]
    fn read_write_round_trip_preserves_device_contents() {
        let (sim, registry) = machine();
        let hda = registry.by_path("/dev/hda").expect("hda mounted");

        let payload = vec![0x5A; 3 * 512];
        assert_eq!(hda.write(2 * 512, &payload), payload.len());
        let before = sim.pata_data(0, 0);

        // Writing back exactly what a read returned must be a no-op.
        let mut snapshot = vec![0u8; 700];
        assert_eq!(hda.read(900, &mut snapshot), 700);
        assert_eq!(hda.write(900, &snapshot), 700);
        assert_eq!(sim.pata_data(0, 0), before);
    }

    #[test]
    fn open_and_close_are_no_ops() {
        let (_sim, registry) = machine();
        let hda = registry.by_path("/dev/hda").expect("hda mounted");
        hda.open();
        hda.close();
    }
}

//! PCI configuration space access over ports 0xCF8/0xCFC.
//!
//! Just enough of the bus to find the IDE function, read BAR4, and turn
//! on bus mastering.

#![allow(dead_code)]

use silt_shared::port::PortIo;

const CONFIG_ADDRESS: u16 = 0xCF8;
const CONFIG_DATA: u16 = 0xCFC;

pub const PCI_VENDOR_ID: u8 = 0x00;
pub const PCI_COMMAND: u8 = 0x04;
pub const PCI_BAR4: u8 = 0x20;

/// Bit 2 of the command register lets the function master the bus.
const PCI_COMMAND_BUS_MASTER: u16 = 1 << 2;

/// Bus/slot/function triple of a configuration-space function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciAddress {
    pub bus: u8,
    pub slot: u8,
    pub func: u8,
}

impl core::fmt::Display for PciAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.slot, self.func)
    }
}

fn config_address(addr: PciAddress, offset: u8) -> u32 {
    0x8000_0000
        | (u32::from(addr.bus) << 16)
        | (u32::from(addr.slot) << 11)
        | (u32::from(addr.func) << 8)
        | (u32::from(offset) & 0xFC)
}

pub fn read_config_32(io: &dyn PortIo, addr: PciAddress, offset: u8) -> u32 {
    io.outl(CONFIG_ADDRESS, config_address(addr, offset));
    io.inl(CONFIG_DATA)
}

pub fn read_config_16(io: &dyn PortIo, addr: PciAddress, offset: u8) -> u16 {
    (read_config_32(io, addr, offset) >> ((offset & 2) * 8)) as u16
}

pub fn write_config_32(io: &dyn PortIo, addr: PciAddress, offset: u8, value: u32) {
    io.outl(CONFIG_ADDRESS, config_address(addr, offset));
    io.outl(CONFIG_DATA, value);
}

/// Scan every function for one whose vendor/device pair is in `wanted`.
///
/// A flat scan is plenty here; the legacy IDE function sits on bus 0 on
/// real chipsets, but walking all buses costs nothing at boot.
pub fn find_device(io: &dyn PortIo, wanted: &[(u16, u16)]) -> Option<PciAddress> {
    for bus in 0..=255u8 {
        for slot in 0..32u8 {
            for func in 0..8u8 {
                let addr = PciAddress { bus, slot, func };
                let id = read_config_32(io, addr, PCI_VENDOR_ID);
                let vendor = (id & 0xFFFF) as u16;
                if vendor == 0xFFFF {
                    if func == 0 {
                        // No function 0 means no device in this slot.
                        break;
                    }
                    continue;
                }
                let device = (id >> 16) as u16;
                if wanted.contains(&(vendor, device)) {
                    return Some(addr);
                }
            }
        }
    }
    None
}

/// Set the bus-master enable bit in the command register.
pub fn enable_bus_master(io: &dyn PortIo, addr: PciAddress) {
    let command = read_config_32(io, addr, PCI_COMMAND);
    write_config_32(
        io,
        addr,
        PCI_COMMAND,
        command | u32::from(PCI_COMMAND_BUS_MASTER),
    );
}

pub fn read_bar4(io: &dyn PortIo, addr: PciAddress) -> u32 {
    read_config_32(io, addr, PCI_BAR4)
}

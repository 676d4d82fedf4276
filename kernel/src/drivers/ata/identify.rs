//! The 512-byte response to IDENTIFY DEVICE / IDENTIFY PACKET DEVICE.
//!
//! Only three fields matter to this driver: the two capacity words and
//! the model string. Everything else is kept raw inside the device
//! descriptor.

use alloc::string::String;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// Response block layout, as 16-bit words off the data port stored
/// little-endian.
#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned, Clone)]
pub struct IdentifyBlock {
    /// Words 0..27.
    _config: [[u8; 2]; 27],
    /// Words 27..47: model number, ASCII with each byte pair swapped.
    model: [u8; 40],
    /// Words 47..60.
    _reserved1: [[u8; 2]; 13],
    /// Words 60..62: total sectors addressable with 28-bit LBA.
    sectors_28: U32,
    /// Words 62..100.
    _reserved2: [[u8; 2]; 38],
    /// Words 100..104: total sectors addressable with 48-bit LBA.
    sectors_48: U64,
    /// Words 104..256.
    _reserved3: [[u8; 2]; 152],
}

impl IdentifyBlock {
    pub const SIZE: usize = 512;

    pub fn new_zeroed() -> Self {
        FromZeroes::new_zeroed()
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        AsBytes::as_bytes_mut(self)
    }

    /// Addressable sectors. The 48-bit count wins whenever the device
    /// reports one.
    pub fn sectors(&self) -> u64 {
        let sectors_48 = self.sectors_48.get();
        if sectors_48 != 0 {
            sectors_48
        } else {
            u64::from(self.sectors_28.get())
        }
    }

    /// Model string with the wire byte order undone and padding trimmed.
    ///
    /// The ATA string convention packs two ASCII characters per word with
    /// the first character in the high byte, so each pair arrives
    /// swapped.
    pub fn model(&self) -> String {
        let mut swapped = [0u8; 40];
        for (pair, out) in self.model.chunks_exact(2).zip(swapped.chunks_exact_mut(2)) {
            out[0] = pair[1];
            out[1] = pair[0];
        }
        let end = swapped
            .iter()
            .rposition(|&b| b != b' ' && b != 0)
            .map_or(0, |i| i + 1);
        String::from_utf8_lossy(&swapped[..end]).into_owned()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn block_with_words(words: &[(usize, u16)]) -> IdentifyBlock {
        let mut raw = [0u8; IdentifyBlock::SIZE];
        for &(index, word) in words {
            raw[index * 2] = word as u8;
            raw[index * 2 + 1] = (word >> 8) as u8;
        }
        IdentifyBlock::read_from(&raw[..]).expect("512 bytes is a whole block")
    }

    #[test]
    fn capacity_prefers_48_bit_count() {
        let block = block_with_words(&[(60, 0x8000), (61, 0x0000)]);
        assert_eq!(block.sectors(), 0x8000);

        let block = block_with_words(&[(60, 0x8000), (100, 0x2000), (102, 0x0001)]);
        assert_eq!(block.sectors(), 0x1_0000_2000);
    }

    #[test]
    fn model_unswaps_pairs_and_trims() {
        // "QEMU HARDDISK" with the ATA per-word byte swap applied.
        let mut raw = [0u8; IdentifyBlock::SIZE];
        let model = b"QEMU HARDDISK";
        for (i, chunk) in model.chunks(2).enumerate() {
            raw[54 + i * 2] = *chunk.get(1).unwrap_or(&b' ');
            raw[54 + i * 2 + 1] = chunk[0];
        }
        for i in (54 + 14)..(54 + 40) {
            raw[i] = b' ';
        }
        let block = IdentifyBlock::read_from(&raw[..]).expect("512 bytes is a whole block");
        assert_eq!(block.model(), "QEMU HARDDISK");
    }
}

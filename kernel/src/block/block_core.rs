/// Size of a hard-disk sector in bytes.
///
/// All IDE disks use this sector size. Optical media do not; their block
/// size is discovered per medium by the capacity probe.
pub const BLOCK_SECTOR_SIZE: usize = 512;

/// Index of a block device sector.
///
/// Wide enough for 48-bit LBA addressing.
pub type BlockSector = u64;

/// Verifies that `buf` can hold exactly one hard-disk sector.
pub fn is_sector_buffer(buf: &[u8]) -> bool {
    buf.len() == BLOCK_SECTOR_SIZE
}

pub const KB: usize = 1024;
pub const MB: usize = KB * KB;
pub const GB: usize = MB * KB;

/// Sector size shared by every IDE disk this kernel drives.
pub const SECTOR_SIZE: usize = 512;

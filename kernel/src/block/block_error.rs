use core::error::Error;
use core::fmt::{Debug, Display, Formatter};

/// Error type for sector transport operations.
///
/// These never cross the device-node surface; the byte-range adapter
/// folds them into a short transfer count.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BlockError {
    /// The sector is past the end of the device
    SectorOutOfBounds,
    /// The buffer has an invalid size for the transfer
    BufferInvalid,
    /// The device reported an error or never produced the data
    ReadError,
    /// The device rejected the write
    WriteError,
    /// Read-back after write kept differing from the data written
    VerifyFailed,
    /// The device aborted a packet command
    PacketAborted,
    /// No medium in the drive
    NoMedium,
}

impl Display for BlockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let description = match self {
            BlockError::SectorOutOfBounds => "sector past the end of the device",
            BlockError::BufferInvalid => "invalid buffer size for the transfer",
            BlockError::ReadError => "error reading from the device",
            BlockError::WriteError => "error writing to the device",
            BlockError::VerifyFailed => "write verification kept failing",
            BlockError::PacketAborted => "packet command aborted by the device",
            BlockError::NoMedium => "no medium present",
        };
        write!(f, "{description}")
    }
}

impl Error for BlockError {}

//! Link error types.

use crate::link::frame::Opcode;
use crate::link::FirmwareVersion;
use crate::transition::ParameterError;
use std::io;
use thiserror::Error;

/// Errors raised by the device link. All of them are fatal: the link is not
/// retried, and the caller is expected to reset it.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Transport failed while writing or reading a frame
    #[error("Transport error: {0}")]
    Io(#[from] io::Error),

    /// Device did not answer within the transport timeout
    #[error("Timed out waiting for the response to {opcode}")]
    Timeout { opcode: Opcode },

    /// Sync echo byte did not match
    #[error("Out of sync: expected echo 0xD0, got {got:#04X}")]
    SyncMismatch { got: u8 },

    /// Response could not be interpreted
    #[error("Malformed response to {opcode}: {reason}")]
    Malformed { opcode: Opcode, reason: String },

    /// Device firmware predates the oldest supported version
    #[error(
        "Device firmware {found} is not supported, firmware >= {required} is required. \
         Check that the correct port was opened, then update the device firmware"
    )]
    IncompatibleFirmware {
        found: FirmwareVersion,
        required: FirmwareVersion,
    },

    /// Operand rejected before any bytes were sent
    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

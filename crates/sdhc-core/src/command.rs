//! Command, data transfer and response structures
//!
//! A [`Command`] describes one SD-bus command: opcode, argument, expected
//! response shape, retry budget and timeout. Opcode and argument values are
//! carried opaquely; their semantics belong to the SD specification, not to
//! this layer. A command may have a [`DataTransfer`] attached for its data
//! phase. Completed requests are reported as a returned [`Response`] value
//! rather than written back into the command.

use crate::error::{Error, Result};

/// Default per-command timeout, in milliseconds
pub const DEFAULT_CMD_TIMEOUT_MS: u32 = 200;

/// Default data-phase timeout, in milliseconds
pub const DEFAULT_DATA_TIMEOUT_MS: u32 = 1000;

/// Expected response shape for a command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ResponseType {
    /// No response expected
    #[default]
    None,
    /// R1: normal 48-bit response
    R1,
    /// R1b: R1 with a busy phase on the data lines
    R1b,
    /// R2: 136-bit response (CID/CSD), four response words
    R2,
    /// R3: OCR response
    R3,
    /// R4: I/O OCR response
    R4,
    /// R5: I/O response
    R5,
    /// R6: published RCA response
    R6,
    /// R7: card interface condition response
    R7,
}

impl ResponseType {
    /// Number of 32-bit response words this shape carries
    pub const fn word_count(self) -> usize {
        match self {
            Self::None => 0,
            Self::R2 => 4,
            _ => 1,
        }
    }

    /// Returns true if this response carries a busy phase
    pub const fn has_busy(self) -> bool {
        matches!(self, Self::R1b)
    }
}

/// Command timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Bounded timeout in milliseconds
    Millis(u32),
    /// No timeout; wait indefinitely for completion
    Forever,
}

impl Default for Timeout {
    fn default() -> Self {
        Self::Millis(DEFAULT_CMD_TIMEOUT_MS)
    }
}

/// A single SD-bus command
///
/// Constructed per request by the caller and discarded after the result has
/// been inspected; the engine never persists commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Command opcode (opaque to this layer)
    pub opcode: u8,
    /// 32-bit command argument
    pub arg: u32,
    /// Expected response shape
    pub response_type: ResponseType,
    /// Number of retries after the first attempt
    pub retries: u32,
    /// Completion timeout
    pub timeout: Timeout,
}

impl Command {
    /// Create a command with no retries and the default timeout
    pub const fn new(opcode: u8, arg: u32, response_type: ResponseType) -> Self {
        Self {
            opcode,
            arg,
            response_type,
            retries: 0,
            timeout: Timeout::Millis(DEFAULT_CMD_TIMEOUT_MS),
        }
    }

    /// Set the retry budget
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the timeout
    pub const fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Direction-tagged data buffer for one transfer
///
/// The buffer is exclusively borrowed by the engine for the duration of one
/// `execute` call; the borrow ends when the call returns.
#[derive(Debug)]
pub enum DataBuffer<'a> {
    /// Card-to-host transfer; filled by the controller
    Read(&'a mut [u8]),
    /// Host-to-card transfer; consumed by the controller
    Write(&'a [u8]),
}

impl DataBuffer<'_> {
    /// Buffer length in bytes
    pub fn len(&self) -> usize {
        match self {
            Self::Read(buf) => buf.len(),
            Self::Write(buf) => buf.len(),
        }
    }

    /// Returns true if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true for card-to-host transfers
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read(_))
    }
}

/// Data phase attached to a command
#[derive(Debug)]
pub struct DataTransfer<'a> {
    /// Starting block address on the card
    pub block_addr: u32,
    /// Block size in bytes
    pub block_size: u16,
    /// Number of blocks to transfer
    pub block_count: u16,
    /// The caller's buffer
    pub buf: DataBuffer<'a>,
    /// Data-phase timeout in milliseconds
    pub timeout_ms: u32,
}

impl<'a> DataTransfer<'a> {
    /// Create a card-to-host transfer
    pub fn read(block_addr: u32, block_size: u16, block_count: u16, buf: &'a mut [u8]) -> Self {
        Self {
            block_addr,
            block_size,
            block_count,
            buf: DataBuffer::Read(buf),
            timeout_ms: DEFAULT_DATA_TIMEOUT_MS,
        }
    }

    /// Create a host-to-card transfer
    pub fn write(block_addr: u32, block_size: u16, block_count: u16, buf: &'a [u8]) -> Self {
        Self {
            block_addr,
            block_size,
            block_count,
            buf: DataBuffer::Write(buf),
            timeout_ms: DEFAULT_DATA_TIMEOUT_MS,
        }
    }

    /// Set the data-phase timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Total bytes this transfer moves
    pub fn total_bytes(&self) -> u32 {
        u32::from(self.block_size) * u32::from(self.block_count)
    }
}

/// Completed request result
///
/// Returned by value from [`crate::host::HostController::request`] and
/// [`crate::transaction::execute`]; carries both the response payload and
/// the transfer accounting so no output parameter is left half-written on
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    /// Raw response words; `kind.word_count()` of them are meaningful
    pub raw: [u32; 4],
    /// Response shape actually reported by the controller
    pub kind: ResponseType,
    /// Bytes moved during the data phase; 0 for command-only requests
    pub bytes_transferred: u32,
}

impl Response {
    /// A command-only response of the given shape
    pub const fn new(kind: ResponseType, raw: [u32; 4]) -> Self {
        Self {
            raw,
            kind,
            bytes_transferred: 0,
        }
    }

    /// Response word `i`, or `IoFailure` if the shape does not carry it
    pub fn word(&self, i: usize) -> Result<u32> {
        if i < self.kind.word_count() {
            Ok(self.raw[i])
        } else {
            Err(Error::IoFailure)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_word_counts() {
        assert_eq!(ResponseType::None.word_count(), 0);
        assert_eq!(ResponseType::R1.word_count(), 1);
        assert_eq!(ResponseType::R2.word_count(), 4);
        assert_eq!(ResponseType::R7.word_count(), 1);
    }

    #[test]
    fn command_builder_defaults() {
        let cmd = Command::new(17, 0x100, ResponseType::R1);
        assert_eq!(cmd.retries, 0);
        assert_eq!(cmd.timeout, Timeout::Millis(DEFAULT_CMD_TIMEOUT_MS));

        let cmd = cmd.with_retries(3).with_timeout(Timeout::Forever);
        assert_eq!(cmd.retries, 3);
        assert_eq!(cmd.timeout, Timeout::Forever);
    }

    #[test]
    fn transfer_accounting() {
        let mut buf = [0u8; 1024];
        let xfer = DataTransfer::read(0, 512, 2, &mut buf);
        assert_eq!(xfer.total_bytes(), 1024);
        assert!(xfer.buf.is_read());
    }

    #[test]
    fn response_word_out_of_shape() {
        let resp = Response::new(ResponseType::R1, [0xAA, 0, 0, 0]);
        assert_eq!(resp.word(0), Ok(0xAA));
        assert_eq!(resp.word(1), Err(Error::IoFailure));
    }
}

//! Transaction engine
//!
//! Executes a single command (optionally with an attached data phase)
//! against a [`HostController`], applying the command's retry budget and
//! validating the response shape. The engine is stateless: it holds nothing
//! across calls and is safe to use concurrently against independent
//! controller instances. A single controller instance must never be driven
//! from two calling contexts at once.

use crate::command::{Command, DataTransfer, Response, ResponseType};
use crate::error::{Error, Result};
use crate::host::{HostController, HostProps, WidthSupport};

/// Maximum busy polls drained between retries before giving up on the drain
/// and retrying anyway
const BUSY_DRAIN_POLLS: u32 = 64;

/// Execute one command against a host controller
///
/// Validation happens before any hardware I/O: a request outside the
/// controller's advertised capability fails fast with
/// [`Error::Unsupported`]. `Timeout` and `IoFailure` outcomes are retried
/// up to `cmd.retries` additional attempts, draining the busy line between
/// attempts so a fresh command is not issued onto a still-busy bus.
/// `Unsupported` is never retried. On success the response shape is checked
/// against the command's expected type; a structurally wrong response is
/// reported as [`Error::IoFailure`], since a malformed response indicates
/// protocol desynchronization.
pub fn execute<C: HostController + ?Sized>(
    host: &mut C,
    cmd: &Command,
    mut data: Option<&mut DataTransfer<'_>>,
) -> Result<Response> {
    let props = host.host_props();
    validate_request(&props, cmd, data.as_deref())?;

    let mut retries_remaining = cmd.retries;
    loop {
        match host.request(cmd, data.as_deref_mut()) {
            Ok(resp) => {
                check_response(cmd, data.as_deref(), &resp)?;
                return Ok(resp);
            }
            Err(Error::Unsupported) => return Err(Error::Unsupported),
            Err(err @ (Error::Timeout | Error::IoFailure)) => {
                if retries_remaining == 0 {
                    return Err(err);
                }
                retries_remaining -= 1;
                log::debug!(
                    "CMD{} failed ({}), retrying ({} left)",
                    cmd.opcode,
                    err,
                    retries_remaining
                );
                // A failed data command can leave the card holding DAT0 low.
                // Drain it before reissuing; if the drain itself fails, retry
                // anyway and let the controller report the outcome.
                if wait_not_busy(host, BUSY_DRAIN_POLLS).is_err() {
                    log::warn!("card still busy after failed CMD{}", cmd.opcode);
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// Poll the data lines until the card reports not-busy
///
/// Returns `Timeout` after `max_polls` samples. Each sample is bounded by
/// the controller's hardware polling interval. Callers use this after
/// busy-signaling (R1b) commands before issuing the next request.
pub fn wait_not_busy<C: HostController + ?Sized>(host: &mut C, max_polls: u32) -> Result<()> {
    for _ in 0..max_polls {
        if !host.card_busy()? {
            return Ok(());
        }
    }
    Err(Error::Timeout)
}

/// Reject a request the controller cannot issue, before touching hardware
fn validate_request(props: &HostProps, cmd: &Command, data: Option<&DataTransfer<'_>>) -> Result<()> {
    if props.is_spi() && cmd.response_type == ResponseType::R2 {
        // 136-bit native responses do not exist on the SPI bus
        return Err(Error::Unsupported);
    }
    if let Some(data) = data {
        if data.block_count == 0 || data.block_size == 0 {
            return Err(Error::Unsupported);
        }
        if data.block_size > props.max_block_size || data.block_count > props.max_blocks {
            return Err(Error::Unsupported);
        }
        if (data.buf.len() as u32) < data.total_bytes() {
            return Err(Error::Unsupported);
        }
        if data.block_size == 1 && !props.bus_widths.contains(WidthSupport::W8) {
            // Byte-granular transfers are an 8-bit-bus register access path
            return Err(Error::Unsupported);
        }
    }
    Ok(())
}

/// Check a successful response against the expected shape
fn check_response(cmd: &Command, data: Option<&DataTransfer<'_>>, resp: &Response) -> Result<()> {
    if resp.kind != cmd.response_type {
        log::warn!(
            "CMD{}: response shape mismatch (expected {:?}, got {:?})",
            cmd.opcode,
            cmd.response_type,
            resp.kind
        );
        return Err(Error::IoFailure);
    }
    if let Some(data) = data {
        if resp.bytes_transferred != data.total_bytes() {
            log::warn!(
                "CMD{}: short transfer ({} of {} bytes)",
                cmd.opcode,
                resp.bytes_transferred,
                data.total_bytes()
            );
            return Err(Error::IoFailure);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::DataBuffer;
    use crate::host::HostFeatures;

    fn props() -> HostProps {
        HostProps {
            max_block_size: 512,
            max_blocks: 4,
            ..HostProps::default()
        }
    }

    fn read_xfer(buf: &mut [u8], block_size: u16, block_count: u16) -> DataTransfer<'_> {
        DataTransfer::read(0, block_size, block_count, buf)
    }

    #[test]
    fn rejects_oversized_data_phase() {
        let props = props();
        let cmd = Command::new(18, 0, ResponseType::R1);
        let mut buf = [0u8; 4096];

        let xfer = read_xfer(&mut buf, 1024, 1);
        assert_eq!(
            validate_request(&props, &cmd, Some(&xfer)),
            Err(Error::Unsupported)
        );

        let xfer = read_xfer(&mut buf, 512, 8);
        assert_eq!(
            validate_request(&props, &cmd, Some(&xfer)),
            Err(Error::Unsupported)
        );

        let xfer = read_xfer(&mut buf, 512, 4);
        assert_eq!(validate_request(&props, &cmd, Some(&xfer)), Ok(()));
    }

    #[test]
    fn rejects_zero_geometry_and_short_buffer() {
        let props = props();
        let cmd = Command::new(17, 0, ResponseType::R1);
        let mut buf = [0u8; 256];

        let xfer = read_xfer(&mut buf, 512, 0);
        assert_eq!(
            validate_request(&props, &cmd, Some(&xfer)),
            Err(Error::Unsupported)
        );

        // buffer shorter than block_size * block_count
        let xfer = read_xfer(&mut buf, 512, 1);
        assert_eq!(
            validate_request(&props, &cmd, Some(&xfer)),
            Err(Error::Unsupported)
        );
    }

    #[test]
    fn rejects_r2_under_spi_mode() {
        let mut props = props();
        props.features |= HostFeatures::SPI_MODE;
        let cmd = Command::new(2, 0, ResponseType::R2);
        assert_eq!(validate_request(&props, &cmd, None), Err(Error::Unsupported));
    }

    #[test]
    fn rejects_byte_access_without_8bit_bus() {
        let props = props(); // 1-bit only
        let cmd = Command::new(8, 0, ResponseType::R1);
        let mut buf = [0u8; 8];
        let xfer = read_xfer(&mut buf, 1, 8);
        assert_eq!(
            validate_request(&props, &cmd, Some(&xfer)),
            Err(Error::Unsupported)
        );
    }

    #[test]
    fn shape_mismatch_is_io_failure() {
        let cmd = Command::new(13, 0, ResponseType::R1);
        let resp = Response::new(ResponseType::R2, [0; 4]);
        assert_eq!(check_response(&cmd, None, &resp), Err(Error::IoFailure));
    }

    #[test]
    fn short_transfer_is_io_failure() {
        let cmd = Command::new(17, 0, ResponseType::R1);
        let mut buf = [0u8; 512];
        let xfer = DataTransfer {
            block_addr: 0,
            block_size: 512,
            block_count: 1,
            buf: DataBuffer::Read(&mut buf),
            timeout_ms: 1000,
        };
        let mut resp = Response::new(ResponseType::R1, [0; 4]);
        resp.bytes_transferred = 256;
        assert_eq!(check_response(&cmd, Some(&xfer), &resp), Err(Error::IoFailure));

        resp.bytes_transferred = 512;
        assert_eq!(check_response(&cmd, Some(&xfer), &resp), Ok(()));
    }
}

//! sdhc-dummy - In-memory SD host controller emulator for testing
//!
//! This crate provides a dummy host controller that emulates a simple SD
//! card behind an in-memory block store. It implements the full
//! [`HostController`] contract, records everything the engine does to it
//! (applied operating points, request and tuning counts) and takes a
//! scriptable [`FaultPlan`] so tests can exercise timeout, retry, rollback
//! and negotiation paths without real hardware.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::{vec, vec::Vec};

use sdhc_core::bus::{clock, SdhcIo, Timing};
use sdhc_core::command::{Command, DataBuffer, DataTransfer, Response, ResponseType};
use sdhc_core::error::{Error, Result};
use sdhc_core::host::{
    HostController, HostFeatures, HostProps, RetunePolicy, TimingSupport, VoltageSupport,
    WidthSupport,
};

/// SD command opcodes the emulated card understands
pub mod opcodes {
    /// CMD0: reset the card to idle
    pub const GO_IDLE_STATE: u8 = 0;
    /// CMD12: stop an open-ended transfer
    pub const STOP_TRANSMISSION: u8 = 12;
    /// CMD13: read the card status register
    pub const SEND_STATUS: u8 = 13;
    /// CMD17: read one block
    pub const READ_SINGLE_BLOCK: u8 = 17;
    /// CMD18: read multiple blocks
    pub const READ_MULTIPLE_BLOCK: u8 = 18;
    /// CMD24: write one block
    pub const WRITE_BLOCK: u8 = 24;
    /// CMD25: write multiple blocks
    pub const WRITE_MULTIPLE_BLOCK: u8 = 25;
}

/// Card status word reported in R1 responses: transfer state, ready for data
const CARD_STATUS_TRAN: u32 = (4 << 9) | (1 << 8);

/// Configuration for the dummy host
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Capabilities the host advertises
    pub props: HostProps,
    /// Emulated card capacity in bytes
    pub card_size: usize,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            props: HostProps {
                f_min: clock::ID,
                f_max: clock::SDR104,
                base_clock: clock::SDR104,
                timings: TimingSupport::LEGACY
                    | TimingSupport::HS
                    | TimingSupport::SDR12
                    | TimingSupport::SDR25
                    | TimingSupport::SDR50
                    | TimingSupport::SDR104
                    | TimingSupport::DDR50,
                voltages: VoltageSupport::V33 | VoltageSupport::V18,
                bus_widths: WidthSupport::W1 | WidthSupport::W4,
                features: HostFeatures::DMA,
                max_current_330: 150,
                max_current_180: 100,
                max_block_size: 512,
                retune: RetunePolicy::None,
                power_delay_ms: 10,
                ..HostProps::default()
            },
            card_size: 64 * 1024,
        }
    }
}

/// Scripted fault injection
///
/// All counters are consumed as the faults fire; a zeroed plan means the
/// emulator behaves perfectly.
#[derive(Debug, Clone)]
pub struct FaultPlan {
    /// Fail the next N requests with `request_error`
    pub request_failures: u32,
    /// Error returned while `request_failures` is nonzero
    pub request_error: Error,
    /// Fail the next N `set_io` calls, leaving the point unchanged
    pub io_failures: u32,
    /// Fail every `set_io` whose candidate uses this timing mode
    pub fail_io_timing: Option<Timing>,
    /// Fail the next N tuning sequences
    pub tuning_failures: u32,
    /// Report busy for the next N `card_busy` polls
    pub busy_polls: u32,
    /// Report the card as absent
    pub card_absent: bool,
    /// Override the response shape of successful requests
    pub force_response_kind: Option<ResponseType>,
}

impl Default for FaultPlan {
    fn default() -> Self {
        Self {
            request_failures: 0,
            request_error: Error::Timeout,
            io_failures: 0,
            fail_io_timing: None,
            tuning_failures: 0,
            busy_polls: 0,
            card_absent: false,
            force_response_kind: None,
        }
    }
}

/// Dummy host controller
///
/// Emulates a host controller and a simple SD card in memory.
#[cfg(feature = "alloc")]
pub struct DummyHost {
    config: DummyConfig,
    data: Vec<u8>,
    io: SdhcIo,
    faults: FaultPlan,
    io_history: Vec<SdhcIo>,
    request_count: u32,
    tuning_count: u32,
    reset_count: u32,
}

#[cfg(feature = "alloc")]
impl DummyHost {
    /// Create a new dummy host with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let data = vec![0u8; config.card_size];
        Self {
            config,
            data,
            io: SdhcIo::ident(),
            faults: FaultPlan::default(),
            io_history: Vec::new(),
            request_count: 0,
            tuning_count: 0,
            reset_count: 0,
        }
    }

    /// Create a new dummy host with the default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a dummy host with pre-filled card contents
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut host = Self::new(config);
        let len = core::cmp::min(initial_data.len(), host.data.len());
        host.data[..len].copy_from_slice(&initial_data[..len]);
        host
    }

    /// Get a reference to the emulated card contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get a mutable reference to the emulated card contents
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The operating point currently in effect
    pub fn io(&self) -> &SdhcIo {
        &self.io
    }

    /// Every operating point successfully applied, in order
    pub fn io_history(&self) -> &[SdhcIo] {
        &self.io_history
    }

    /// Number of `request` invocations, including failed ones
    pub fn request_count(&self) -> u32 {
        self.request_count
    }

    /// Number of tuning sequences run, including failed ones
    pub fn tuning_count(&self) -> u32 {
        self.tuning_count
    }

    /// Number of resets
    pub fn reset_count(&self) -> u32 {
        self.reset_count
    }

    /// Mutable access to the fault plan
    pub fn faults_mut(&mut self) -> &mut FaultPlan {
        &mut self.faults
    }

    fn handle_read(&mut self, xfer: &mut DataTransfer<'_>) -> Result<u32> {
        let offset = xfer.block_addr as usize * xfer.block_size as usize;
        let len = xfer.total_bytes() as usize;
        if offset + len > self.data.len() {
            return Err(Error::IoFailure);
        }
        match &mut xfer.buf {
            DataBuffer::Read(buf) => {
                buf[..len].copy_from_slice(&self.data[offset..offset + len]);
                Ok(len as u32)
            }
            DataBuffer::Write(_) => Err(Error::IoFailure),
        }
    }

    fn handle_write(&mut self, xfer: &DataTransfer<'_>) -> Result<u32> {
        let offset = xfer.block_addr as usize * xfer.block_size as usize;
        let len = xfer.total_bytes() as usize;
        if offset + len > self.data.len() {
            return Err(Error::IoFailure);
        }
        match &xfer.buf {
            DataBuffer::Write(buf) => {
                self.data[offset..offset + len].copy_from_slice(&buf[..len]);
                Ok(len as u32)
            }
            DataBuffer::Read(_) => Err(Error::IoFailure),
        }
    }

    fn respond(&self, cmd: &Command, bytes_transferred: u32) -> Response {
        let kind = self.faults.force_response_kind.unwrap_or(cmd.response_type);
        let mut raw = [0u32; 4];
        if kind.word_count() >= 1 {
            raw[0] = CARD_STATUS_TRAN;
        }
        Response {
            raw,
            kind,
            bytes_transferred,
        }
    }
}

#[cfg(feature = "alloc")]
impl HostController for DummyHost {
    fn reset(&mut self) -> Result<()> {
        self.reset_count += 1;
        self.io = SdhcIo::ident();
        self.faults.busy_polls = 0;
        Ok(())
    }

    fn request(&mut self, cmd: &Command, data: Option<&mut DataTransfer<'_>>) -> Result<Response> {
        self.request_count += 1;

        if self.faults.request_failures > 0 {
            self.faults.request_failures -= 1;
            return Err(self.faults.request_error);
        }

        let bytes = match (cmd.opcode, data) {
            (opcodes::READ_SINGLE_BLOCK | opcodes::READ_MULTIPLE_BLOCK, Some(xfer)) => {
                self.handle_read(xfer)?
            }
            (opcodes::WRITE_BLOCK | opcodes::WRITE_MULTIPLE_BLOCK, Some(xfer)) => {
                self.handle_write(xfer)?
            }
            // Command-only requests, including opcodes the emulated card
            // has no special handling for
            _ => 0,
        };

        Ok(self.respond(cmd, bytes))
    }

    fn set_io(&mut self, io: &SdhcIo) -> Result<()> {
        // Failures leave the previous point untouched
        if self.faults.io_failures > 0 {
            self.faults.io_failures -= 1;
            return Err(Error::IoFailure);
        }
        if self.faults.fail_io_timing == Some(io.timing) {
            return Err(Error::IoFailure);
        }
        if !self.config.props.supports_io(io) {
            return Err(Error::Unsupported);
        }
        self.io = *io;
        self.io_history.push(*io);
        log::debug!(
            "dummy: io now {:?} {}-bit @ {} Hz",
            io.timing,
            io.bus_width.lines(),
            io.clock
        );
        Ok(())
    }

    fn card_present(&mut self) -> Result<bool> {
        Ok(!self.faults.card_absent)
    }

    fn execute_tuning(&mut self) -> Result<()> {
        self.tuning_count += 1;
        if self.faults.tuning_failures > 0 {
            self.faults.tuning_failures -= 1;
            return Err(Error::IoFailure);
        }
        Ok(())
    }

    fn card_busy(&mut self) -> Result<bool> {
        if self.faults.busy_polls > 0 {
            self.faults.busy_polls -= 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn host_props(&self) -> HostProps {
        self.config.props
    }
}

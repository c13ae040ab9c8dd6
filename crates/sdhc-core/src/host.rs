//! Host controller contract and capability descriptor
//!
//! [`HostController`] is the narrow operation set a concrete SD/eMMC host
//! controller must implement. One implementation exists per hardware family
//! and is selected at composition time; the transaction engine and the mode
//! negotiator are generic over this trait and hold no controller state of
//! their own.

use crate::bus::{BusWidth, DriverType, SdhcIo, SignalVoltage, Timing};
use crate::command::{Command, DataTransfer, Response};
use crate::error::Result;
use bitflags::bitflags;

bitflags! {
    /// Timing modes a host controller advertises
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TimingSupport: u16 {
        /// Default/identification timing
        const LEGACY = 1 << 0;
        /// High-speed timing
        const HS     = 1 << 1;
        /// UHS-I SDR12
        const SDR12  = 1 << 2;
        /// UHS-I SDR25
        const SDR25  = 1 << 3;
        /// UHS-I SDR50
        const SDR50  = 1 << 4;
        /// UHS-I SDR104
        const SDR104 = 1 << 5;
        /// UHS-I DDR50
        const DDR50  = 1 << 6;
        /// eMMC DDR52
        const DDR52  = 1 << 7;
        /// eMMC HS200
        const HS200  = 1 << 8;
        /// eMMC HS400
        const HS400  = 1 << 9;
    }
}

bitflags! {
    /// Bus widths a host controller advertises
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WidthSupport: u8 {
        /// 1-bit bus
        const W1 = 1 << 0;
        /// 4-bit bus
        const W4 = 1 << 1;
        /// 8-bit bus
        const W8 = 1 << 2;
    }
}

bitflags! {
    /// Signal voltages a host controller advertises
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VoltageSupport: u8 {
        /// 3.3 V signaling
        const V33 = 1 << 0;
        /// 3.0 V signaling
        const V30 = 1 << 1;
        /// 1.8 V signaling
        const V18 = 1 << 2;
        /// 1.2 V signaling
        const V12 = 1 << 3;
    }
}

bitflags! {
    /// Driver strength types a host controller advertises
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DriverSupport: u8 {
        /// Type A (33 ohm)
        const A = 1 << 0;
        /// Type B (50 ohm, default)
        const B = 1 << 1;
        /// Type C (66 ohm)
        const C = 1 << 2;
        /// Type D (100 ohm)
        const D = 1 << 3;
    }
}

bitflags! {
    /// Auxiliary host controller features
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HostFeatures: u8 {
        /// Simple DMA data transfers
        const DMA               = 1 << 0;
        /// Scatter-gather (ADMA) data transfers
        const SCATTER_GATHER    = 1 << 1;
        /// SDR50 requires a tuning sequence on this controller
        const SDR50_NEEDS_TUNING = 1 << 2;
        /// Controller drives the card over SPI; bus-width, voltage and
        /// open-drain concepts do not apply
        const SPI_MODE          = 1 << 3;
    }
}

impl Timing {
    /// The support flag corresponding to this timing mode
    pub const fn support_flag(self) -> TimingSupport {
        match self {
            Self::Legacy => TimingSupport::LEGACY,
            Self::Hs => TimingSupport::HS,
            Self::Sdr12 => TimingSupport::SDR12,
            Self::Sdr25 => TimingSupport::SDR25,
            Self::Sdr50 => TimingSupport::SDR50,
            Self::Sdr104 => TimingSupport::SDR104,
            Self::Ddr50 => TimingSupport::DDR50,
            Self::Ddr52 => TimingSupport::DDR52,
            Self::Hs200 => TimingSupport::HS200,
            Self::Hs400 => TimingSupport::HS400,
        }
    }
}

impl BusWidth {
    /// The support flag corresponding to this bus width
    pub const fn support_flag(self) -> WidthSupport {
        match self {
            Self::W1 => WidthSupport::W1,
            Self::W4 => WidthSupport::W4,
            Self::W8 => WidthSupport::W8,
        }
    }
}

impl SignalVoltage {
    /// The support flag corresponding to this voltage
    pub const fn support_flag(self) -> VoltageSupport {
        match self {
            Self::V33 => VoltageSupport::V33,
            Self::V30 => VoltageSupport::V30,
            Self::V18 => VoltageSupport::V18,
            Self::V12 => VoltageSupport::V12,
        }
    }
}

impl DriverType {
    /// The support flag corresponding to this driver strength
    pub const fn support_flag(self) -> DriverSupport {
        match self {
            Self::A => DriverSupport::A,
            Self::B => DriverSupport::B,
            Self::C => DriverSupport::C,
            Self::D => DriverSupport::D,
        }
    }
}

/// Retuning policy for high-speed modes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetunePolicy {
    /// No retuning required
    #[default]
    None,
    /// Retune every `interval_secs` seconds
    Periodic {
        /// Retuning interval in seconds
        interval_secs: u16,
    },
    /// Retune when the controller signals the need
    OnDemand,
}

/// Static capability descriptor for one host controller instance
///
/// Read once via [`HostController::host_props`] and treated as read-only
/// for the controller's lifetime; re-query only after [`HostController::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostProps {
    /// Minimum bus clock in Hz
    pub f_min: u32,
    /// Maximum bus clock in Hz
    pub f_max: u32,
    /// Input clock the controller divides down from
    pub base_clock: u32,
    /// Supported timing modes
    pub timings: TimingSupport,
    /// Supported bus widths
    pub bus_widths: WidthSupport,
    /// Supported signal voltages
    pub voltages: VoltageSupport,
    /// Supported driver strength types
    pub driver_types: DriverSupport,
    /// Auxiliary features
    pub features: HostFeatures,
    /// Max sustained current at 3.3 V, in mA (0 = not specified)
    pub max_current_330: u16,
    /// Max sustained current at 3.0 V, in mA
    pub max_current_300: u16,
    /// Max sustained current at 1.8 V, in mA
    pub max_current_180: u16,
    /// Max sustained current at 1.2 V, in mA
    pub max_current_120: u16,
    /// Maximum block count per data transfer
    pub max_blocks: u16,
    /// Maximum block size per data transfer, in bytes
    pub max_block_size: u16,
    /// Retuning policy for tuned modes
    pub retune: RetunePolicy,
    /// Settle delay after power/voltage changes, in milliseconds
    pub power_delay_ms: u16,
}

impl HostProps {
    /// Returns true if the controller runs the card over SPI
    pub fn is_spi(&self) -> bool {
        self.features.contains(HostFeatures::SPI_MODE)
    }

    /// Check an operating point against the advertised capabilities
    ///
    /// Every field must be advertised before the point may be applied.
    /// Under SPI mode the bus-width, voltage and bus-mode fields carry no
    /// meaning and are not checked.
    pub fn supports_io(&self, io: &SdhcIo) -> bool {
        if io.clock != 0 && (io.clock < self.f_min || io.clock > self.f_max) {
            return false;
        }
        if !self.timings.contains(io.timing.support_flag()) {
            return false;
        }
        if !self.driver_types.contains(io.driver_type.support_flag()) {
            return false;
        }
        if self.is_spi() {
            return true;
        }
        self.bus_widths.contains(io.bus_width.support_flag())
            && self.voltages.contains(io.signal_voltage.support_flag())
    }

    /// Returns true if the given timing mode requires a tuning sequence
    /// on this controller
    pub fn timing_requires_tuning(&self, timing: Timing) -> bool {
        match timing {
            Timing::Sdr104 | Timing::Hs200 | Timing::Hs400 => true,
            Timing::Sdr50 => self.features.contains(HostFeatures::SDR50_NEEDS_TUNING),
            _ => false,
        }
    }
}

impl Default for HostProps {
    /// A minimal identification-capable host: legacy timing, 1-bit bus,
    /// 3.3 V, no tuning, no DMA
    fn default() -> Self {
        Self {
            f_min: crate::bus::clock::ID,
            f_max: crate::bus::clock::SD_DEFAULT,
            base_clock: crate::bus::clock::SD_DEFAULT,
            timings: TimingSupport::LEGACY,
            bus_widths: WidthSupport::W1,
            voltages: VoltageSupport::V33,
            driver_types: DriverSupport::B,
            features: HostFeatures::empty(),
            max_current_330: 0,
            max_current_300: 0,
            max_current_180: 0,
            max_current_120: 0,
            max_blocks: u16::MAX,
            max_block_size: 512,
            retune: RetunePolicy::None,
            power_delay_ms: 0,
        }
    }
}

/// Host controller contract
///
/// One instance represents exclusive ownership of one physical bus; the
/// `&mut` receivers make that exclusivity a compile-time property. Distinct
/// instances may be driven concurrently with no coordination.
///
/// `card_present` and `card_busy` are safe to call between, but not during,
/// an active `request`; concrete hardware families may relax this.
pub trait HostController {
    /// Return the controller to a known idle state, clearing any latched
    /// error or busy condition
    fn reset(&mut self) -> Result<()>;

    /// Issue one command (and its data phase, if present), blocking until
    /// completion, timeout or error
    ///
    /// On success the returned [`Response`] carries the response words and,
    /// for data transfers, the byte count actually moved.
    fn request(&mut self, cmd: &Command, data: Option<&mut DataTransfer<'_>>) -> Result<Response>;

    /// Reconfigure clock/width/voltage/timing/power
    ///
    /// Atomic from the caller's point of view: either the new point is fully
    /// in effect on return, or the previous point remains unchanged and an
    /// error is returned.
    fn set_io(&mut self, io: &SdhcIo) -> Result<()>;

    /// Sense card presence; never blocks longer than a bounded hardware
    /// polling interval
    fn card_present(&mut self) -> Result<bool>;

    /// Run the tuning sequence required by SDR104/SDR50/HS200-class modes
    ///
    /// A controller that needs no tuning for the active mode returns `Ok`
    /// immediately.
    fn execute_tuning(&mut self) -> Result<()>;

    /// Sample the data lines without issuing a command
    fn card_busy(&mut self) -> Result<bool>;

    /// The static capability descriptor; pure and side-effect-free
    fn host_props(&self) -> HostProps;
}

// Blanket impl for boxed controllers to allow trait objects
#[cfg(feature = "alloc")]
impl HostController for alloc::boxed::Box<dyn HostController + Send> {
    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn request(&mut self, cmd: &Command, data: Option<&mut DataTransfer<'_>>) -> Result<Response> {
        (**self).request(cmd, data)
    }

    fn set_io(&mut self, io: &SdhcIo) -> Result<()> {
        (**self).set_io(io)
    }

    fn card_present(&mut self) -> Result<bool> {
        (**self).card_present()
    }

    fn execute_tuning(&mut self) -> Result<()> {
        (**self).execute_tuning()
    }

    fn card_busy(&mut self) -> Result<bool> {
        (**self).card_busy()
    }

    fn host_props(&self) -> HostProps {
        (**self).host_props()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{clock, BusWidth, SdhcIo, SignalVoltage, Timing};

    fn uhs_props() -> HostProps {
        HostProps {
            f_max: clock::SDR104,
            timings: TimingSupport::LEGACY
                | TimingSupport::HS
                | TimingSupport::SDR50
                | TimingSupport::SDR104,
            bus_widths: WidthSupport::W1 | WidthSupport::W4,
            voltages: VoltageSupport::V33 | VoltageSupport::V18,
            ..HostProps::default()
        }
    }

    #[test]
    fn supports_io_checks_every_field() {
        let props = uhs_props();

        let ok = SdhcIo::for_timing(Timing::Sdr104, BusWidth::W4, SignalVoltage::V18);
        assert!(props.supports_io(&ok));

        let bad_timing = SdhcIo::for_timing(Timing::Hs400, BusWidth::W4, SignalVoltage::V18);
        assert!(!props.supports_io(&bad_timing));

        let bad_width = SdhcIo::for_timing(Timing::Sdr104, BusWidth::W8, SignalVoltage::V18);
        assert!(!props.supports_io(&bad_width));

        let bad_voltage = SdhcIo::for_timing(Timing::Sdr104, BusWidth::W4, SignalVoltage::V12);
        assert!(!props.supports_io(&bad_voltage));

        let bad_clock =
            SdhcIo::for_timing(Timing::Hs, BusWidth::W4, SignalVoltage::V33).with_clock(300_000_000);
        assert!(!props.supports_io(&bad_clock));
    }

    #[test]
    fn spi_mode_skips_bus_fields() {
        let mut props = uhs_props();
        props.features |= HostFeatures::SPI_MODE;

        // 8-bit and 1.2 V are not advertised, but SPI mode ignores both
        let io = SdhcIo::for_timing(Timing::Hs, BusWidth::W8, SignalVoltage::V12);
        assert!(props.supports_io(&io));
    }

    #[test]
    fn tuning_requirements_per_mode() {
        let mut props = uhs_props();
        assert!(props.timing_requires_tuning(Timing::Sdr104));
        assert!(props.timing_requires_tuning(Timing::Hs200));
        assert!(props.timing_requires_tuning(Timing::Hs400));
        assert!(!props.timing_requires_tuning(Timing::Sdr50));
        assert!(!props.timing_requires_tuning(Timing::Legacy));

        props.features |= HostFeatures::SDR50_NEEDS_TUNING;
        assert!(props.timing_requires_tuning(Timing::Sdr50));
    }
}

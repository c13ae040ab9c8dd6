//! SD bus parameter types
//!
//! The types in this module describe one electrical/timing operating point
//! of an SD/eMMC bus: clock rate, bus mode, power state, bus width, timing
//! mode, driver strength and signal voltage. An [`SdhcIo`] bundles one full
//! operating point; the [`crate::host::HostProps`] capability descriptor
//! constrains which operating points are legal for a given controller.

/// Standard clock rates, in Hz
///
/// These are the rate classes named by the SD and eMMC specifications.
/// An operating point may carry any frequency within the controller's
/// advertised range; these constants cover the common targets.
pub mod clock {
    /// Identification-mode clock (card enumeration)
    pub const ID: u32 = 400_000;
    /// SD default-speed clock
    pub const SD_DEFAULT: u32 = 25_000_000;
    /// SD high-speed clock
    pub const SD_HIGH_SPEED: u32 = 50_000_000;
    /// UHS-I SDR50 clock
    pub const SDR50: u32 = 100_000_000;
    /// UHS-I SDR104 clock
    pub const SDR104: u32 = 208_000_000;
    /// eMMC legacy clock
    pub const MMC_LEGACY: u32 = 26_000_000;
    /// eMMC high-speed (DDR52/SDR52) clock
    pub const MMC_HIGH_SPEED: u32 = 52_000_000;
    /// eMMC HS200/HS400 clock
    pub const MMC_HS: u32 = 200_000_000;
}

/// Bus timing mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Timing {
    /// Default/identification timing (up to 25 MHz)
    #[default]
    Legacy,
    /// High-speed timing (up to 50 MHz)
    Hs,
    /// UHS-I SDR12
    Sdr12,
    /// UHS-I SDR25
    Sdr25,
    /// UHS-I SDR50
    Sdr50,
    /// UHS-I SDR104
    Sdr104,
    /// UHS-I DDR50
    Ddr50,
    /// eMMC DDR52
    Ddr52,
    /// eMMC HS200
    Hs200,
    /// eMMC HS400
    Hs400,
}

impl Timing {
    /// Maximum clock rate for this timing mode, in Hz
    pub const fn max_clock(self) -> u32 {
        match self {
            Self::Legacy => clock::SD_DEFAULT,
            Self::Hs => clock::SD_HIGH_SPEED,
            Self::Sdr12 => clock::SD_DEFAULT,
            Self::Sdr25 | Self::Ddr50 => clock::SD_HIGH_SPEED,
            Self::Sdr50 => clock::SDR50,
            Self::Sdr104 => clock::SDR104,
            Self::Ddr52 => clock::MMC_HIGH_SPEED,
            Self::Hs200 | Self::Hs400 => clock::MMC_HS,
        }
    }

    /// Returns true for modes that run the bus at 1.8 V signaling
    pub const fn uses_1v8(self) -> bool {
        matches!(
            self,
            Self::Sdr12
                | Self::Sdr25
                | Self::Sdr50
                | Self::Sdr104
                | Self::Ddr50
                | Self::Hs200
                | Self::Hs400
        )
    }

    /// Returns true for eMMC-class modes that can use an 8-bit bus
    pub const fn allows_8bit(self) -> bool {
        matches!(self, Self::Legacy | Self::Hs | Self::Ddr52 | Self::Hs200 | Self::Hs400)
    }
}

/// Bus signaling mode
///
/// Open-drain is used during card identification; push-pull everywhere
/// else. Meaningless when the controller runs in SPI mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BusMode {
    /// Push-pull signaling
    #[default]
    PushPull,
    /// Open-drain signaling (identification phase)
    OpenDrain,
}

/// Bus power state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PowerMode {
    /// Card power on
    #[default]
    On,
    /// Card power off
    Off,
}

/// Data bus width
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BusWidth {
    /// 1-bit bus
    #[default]
    W1,
    /// 4-bit bus
    W4,
    /// 8-bit bus (eMMC only)
    W8,
}

impl BusWidth {
    /// Number of data lines
    pub const fn lines(self) -> u8 {
        match self {
            Self::W1 => 1,
            Self::W4 => 4,
            Self::W8 => 8,
        }
    }
}

/// Output driver strength type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DriverType {
    /// Type B (default, 50 ohm)
    #[default]
    B,
    /// Type A (33 ohm)
    A,
    /// Type C (66 ohm)
    C,
    /// Type D (100 ohm)
    D,
}

/// Bus signal voltage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SignalVoltage {
    /// 3.3 V signaling
    #[default]
    V33,
    /// 3.0 V signaling
    V30,
    /// 1.8 V signaling
    V18,
    /// 1.2 V signaling
    V12,
}

/// One bus operating point
///
/// The live bundle of electrical/timing parameters applied (or about to be
/// applied) to a controller. Every field must be advertised as supported by
/// the controller's [`crate::host::HostProps`] before the point is applied;
/// see [`crate::host::HostProps::supports_io`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdhcIo {
    /// Target clock rate in Hz
    pub clock: u32,
    /// Signaling mode (ignored under SPI mode)
    pub bus_mode: BusMode,
    /// Card power state
    pub power: PowerMode,
    /// Data bus width
    pub bus_width: BusWidth,
    /// Bus timing mode
    pub timing: Timing,
    /// Output driver strength
    pub driver_type: DriverType,
    /// Signal voltage (ignored under SPI mode)
    pub signal_voltage: SignalVoltage,
}

impl SdhcIo {
    /// The identification-mode default: 400 kHz, open-drain, 1-bit,
    /// legacy timing, 3.3 V
    pub const fn ident() -> Self {
        Self {
            clock: clock::ID,
            bus_mode: BusMode::OpenDrain,
            power: PowerMode::On,
            bus_width: BusWidth::W1,
            timing: Timing::Legacy,
            driver_type: DriverType::B,
            signal_voltage: SignalVoltage::V33,
        }
    }

    /// Build an operating point for a timing mode at its maximum clock,
    /// push-pull, powered on, default driver strength
    pub const fn for_timing(timing: Timing, bus_width: BusWidth, voltage: SignalVoltage) -> Self {
        Self {
            clock: timing.max_clock(),
            bus_mode: BusMode::PushPull,
            power: PowerMode::On,
            bus_width,
            timing,
            driver_type: DriverType::B,
            signal_voltage: voltage,
        }
    }

    /// Set the clock rate for this point
    pub const fn with_clock(mut self, clock: u32) -> Self {
        self.clock = clock;
        self
    }

    /// Set the driver strength for this point
    pub const fn with_driver_type(mut self, driver_type: DriverType) -> Self {
        self.driver_type = driver_type;
        self
    }
}

impl Default for SdhcIo {
    fn default() -> Self {
        Self::ident()
    }
}

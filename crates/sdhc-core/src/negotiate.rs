//! Operating-mode negotiation
//!
//! Moves the bus from its initial identification state to the best
//! mutually-supported operating point. Negotiation is inherently
//! speculative: a mode a controller/card pair advertises may still fail
//! electrically, so candidates are tried from most to least aggressive with
//! guaranteed rollback to the last-known-good point on every failure. A
//! single candidate is never retried; repeating an electrically marginal
//! configuration is not expected to change the outcome.

use crate::bus::{BusWidth, DriverType, SdhcIo, SignalVoltage, Timing};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::host::{DriverSupport, HostController, HostProps, VoltageSupport, WidthSupport};
use crate::transaction;

/// Maximum length of a generated candidate plan
pub const MAX_CANDIDATES: usize = 16;

/// Negotiation progression: `Probing(n)` tries candidate `n`,
/// `Reverting(n)` rolls back after candidate `n` failed. Accepting a
/// candidate or running past the end of the list terminates the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Probing(usize),
    Reverting(usize),
}

/// Outcome of one candidate attempt
enum Attempt {
    /// Applied, tuned and probed successfully
    Accepted,
    /// A field is not advertised by the controller; nothing was applied
    Skipped,
    /// `set_io` failed; the previous point is still in effect
    NotApplied,
    /// Applied, but tuning or the probe failed; rollback required
    Failed,
}

/// Negotiate the best mutually-supported operating point
///
/// `candidates` is ordered from most to least aggressive. `current` is the
/// point in effect when negotiation begins (typically the identification
/// default) and is the rollback target for every failed candidate. `probe`
/// is a lightweight caller-supplied command issued through the transaction
/// engine to confirm the bus is actually responsive at each new point.
///
/// On success the accepted point is returned and left in effect. If no
/// candidate succeeds, [`Error::NegotiationFailed`] is returned and the
/// controller is left at `current`.
pub fn negotiate<C: HostController + ?Sized>(
    host: &mut C,
    current: &SdhcIo,
    candidates: &[SdhcIo],
    probe: &Command,
) -> Result<SdhcIo> {
    let props = host.host_props();
    let mut state = State::Probing(0);

    loop {
        state = match state {
            State::Probing(idx) => {
                let Some(candidate) = candidates.get(idx) else {
                    log::debug!("negotiation exhausted after {} candidates", candidates.len());
                    return Err(Error::NegotiationFailed);
                };
                match try_candidate(host, &props, candidate, probe) {
                    Attempt::Accepted => {
                        log::debug!(
                            "accepted {:?} {}-bit @ {} Hz",
                            candidate.timing,
                            candidate.bus_width.lines(),
                            candidate.clock
                        );
                        return Ok(*candidate);
                    }
                    Attempt::Skipped | Attempt::NotApplied => State::Probing(idx + 1),
                    Attempt::Failed => State::Reverting(idx),
                }
            }
            State::Reverting(idx) => {
                if let Err(err) = host.set_io(current) {
                    log::warn!("rollback to {:?} failed: {}", current.timing, err);
                }
                State::Probing(idx + 1)
            }
        };
    }
}

fn try_candidate<C: HostController + ?Sized>(
    host: &mut C,
    props: &HostProps,
    candidate: &SdhcIo,
    probe: &Command,
) -> Attempt {
    if !props.supports_io(candidate) {
        log::trace!("skipping {:?}: not advertised by host", candidate.timing);
        return Attempt::Skipped;
    }

    if let Err(err) = host.set_io(candidate) {
        log::debug!("apply {:?} failed: {}", candidate.timing, err);
        return Attempt::NotApplied;
    }

    if props.timing_requires_tuning(candidate.timing) {
        if let Err(err) = host.execute_tuning() {
            log::debug!("tuning failed at {:?}: {}", candidate.timing, err);
            return Attempt::Failed;
        }
    }

    match transaction::execute(host, probe, None) {
        Ok(_) => Attempt::Accepted,
        Err(err) => {
            log::debug!("probe failed at {:?}: {}", candidate.timing, err);
            Attempt::Failed
        }
    }
}

/// Re-run tuning on an already-negotiated bus
///
/// For controllers whose [`HostProps::retune`] policy is periodic or
/// on-demand, the client invokes this outside of initial negotiation.
/// Success and failure handling matches initial tuning: the error is
/// surfaced verbatim, and the caller decides whether to renegotiate.
pub fn retune<C: HostController + ?Sized>(host: &mut C) -> Result<()> {
    match host.execute_tuning() {
        Ok(()) => Ok(()),
        Err(err) => {
            log::warn!("retuning failed: {}", err);
            Err(err)
        }
    }
}

/// Descending candidate order, most aggressive first
const DESCENT: [Timing; 10] = [
    Timing::Hs400,
    Timing::Hs200,
    Timing::Sdr104,
    Timing::Ddr52,
    Timing::Ddr50,
    Timing::Sdr50,
    Timing::Sdr25,
    Timing::Hs,
    Timing::Sdr12,
    Timing::Legacy,
];

/// Build the default most-to-least-aggressive candidate plan for a host
///
/// Each advertised timing mode contributes one candidate at its maximum
/// clock (clamped to `f_max`), with the widest advertised bus width the
/// mode allows and the voltage the mode requires. Modes whose required
/// voltage is not advertised are left out entirely. The result feeds
/// straight into [`negotiate`]; callers with card-side knowledge can build
/// their own list instead.
pub fn candidate_plan(props: &HostProps) -> heapless::Vec<SdhcIo, MAX_CANDIDATES> {
    let mut plan = heapless::Vec::new();

    for &timing in DESCENT.iter() {
        if !props.timings.contains(timing.support_flag()) {
            continue;
        }
        let Some(voltage) = pick_voltage(props, timing) else {
            continue;
        };
        let width = pick_width(props, timing);
        let clock = timing.max_clock().min(props.f_max);
        let io = SdhcIo::for_timing(timing, width, voltage)
            .with_clock(clock)
            .with_driver_type(pick_driver(props));
        if plan.push(io).is_err() {
            break;
        }
    }

    plan
}

fn pick_voltage(props: &HostProps, timing: Timing) -> Option<SignalVoltage> {
    if timing.uses_1v8() {
        return props
            .voltages
            .contains(VoltageSupport::V18)
            .then_some(SignalVoltage::V18);
    }
    if props.voltages.contains(VoltageSupport::V33) {
        Some(SignalVoltage::V33)
    } else if props.voltages.contains(VoltageSupport::V30) {
        Some(SignalVoltage::V30)
    } else if props.voltages.contains(VoltageSupport::V18) {
        Some(SignalVoltage::V18)
    } else {
        None
    }
}

fn pick_width(props: &HostProps, timing: Timing) -> BusWidth {
    if timing.allows_8bit() && props.bus_widths.contains(WidthSupport::W8) {
        BusWidth::W8
    } else if props.bus_widths.contains(WidthSupport::W4) {
        BusWidth::W4
    } else {
        BusWidth::W1
    }
}

fn pick_driver(props: &HostProps) -> DriverType {
    if props.driver_types.contains(DriverSupport::B) {
        DriverType::B
    } else if props.driver_types.contains(DriverSupport::A) {
        DriverType::A
    } else if props.driver_types.contains(DriverSupport::C) {
        DriverType::C
    } else {
        DriverType::D
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::clock;
    use crate::host::TimingSupport;

    #[test]
    fn plan_descends_from_most_aggressive() {
        let props = HostProps {
            f_max: clock::SDR104,
            timings: TimingSupport::LEGACY
                | TimingSupport::HS
                | TimingSupport::SDR50
                | TimingSupport::SDR104,
            bus_widths: WidthSupport::W1 | WidthSupport::W4,
            voltages: VoltageSupport::V33 | VoltageSupport::V18,
            ..HostProps::default()
        };

        let plan = candidate_plan(&props);
        let timings: heapless::Vec<Timing, MAX_CANDIDATES> =
            plan.iter().map(|io| io.timing).collect();
        assert_eq!(
            &timings[..],
            &[Timing::Sdr104, Timing::Sdr50, Timing::Hs, Timing::Legacy]
        );
        assert_eq!(plan[0].clock, clock::SDR104);
        assert_eq!(plan[0].bus_width, BusWidth::W4);
        assert_eq!(plan[0].signal_voltage, SignalVoltage::V18);
        assert_eq!(plan[2].signal_voltage, SignalVoltage::V33);
    }

    #[test]
    fn plan_drops_modes_without_their_voltage() {
        // 3.3 V only host: UHS modes need 1.8 V and must not appear
        let props = HostProps {
            f_max: clock::SDR104,
            timings: TimingSupport::LEGACY | TimingSupport::HS | TimingSupport::SDR104,
            bus_widths: WidthSupport::W1 | WidthSupport::W4,
            ..HostProps::default()
        };

        let plan = candidate_plan(&props);
        assert!(plan.iter().all(|io| io.timing != Timing::Sdr104));
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn plan_clamps_clock_to_host_max() {
        let props = HostProps {
            f_max: clock::SD_HIGH_SPEED,
            timings: TimingSupport::LEGACY | TimingSupport::SDR104,
            voltages: VoltageSupport::V33 | VoltageSupport::V18,
            bus_widths: WidthSupport::W1,
            ..HostProps::default()
        };

        let plan = candidate_plan(&props);
        assert_eq!(plan[0].timing, Timing::Sdr104);
        assert_eq!(plan[0].clock, clock::SD_HIGH_SPEED);
    }

    #[test]
    fn plan_prefers_8bit_for_emmc_modes() {
        let props = HostProps {
            f_max: clock::MMC_HS,
            timings: TimingSupport::HS200 | TimingSupport::SDR104 | TimingSupport::LEGACY,
            bus_widths: WidthSupport::W1 | WidthSupport::W4 | WidthSupport::W8,
            voltages: VoltageSupport::V33 | VoltageSupport::V18,
            ..HostProps::default()
        };

        let plan = candidate_plan(&props);
        assert_eq!(plan[0].timing, Timing::Hs200);
        assert_eq!(plan[0].bus_width, BusWidth::W8);
        // SD UHS mode stays at 4-bit
        assert_eq!(plan[1].timing, Timing::Sdr104);
        assert_eq!(plan[1].bus_width, BusWidth::W4);
    }
}

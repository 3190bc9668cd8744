//! Periodic interrupt scheduling and lost-tick compensation.
//!
//! Deadlines are computed on the 32.768 kHz reference grid so that changing the rate while the
//! timer runs carries the partially elapsed tick over instead of dropping or duplicating it.

use crate::clock::Clock;
use crate::irq::IrqLine;

use super::calendar::NS_PER_SEC;
use super::regs::{self, StatusB, StatusC, REG_STATUS_A};
use super::{LostTickPolicy, RtcCmos};

pub(crate) const RTC_CLOCK_RATE: u64 = 32_768;

/// Register C reads re-inject at most this many coalesced interrupts before a new periodic
/// interrupt resets the count.
pub(crate) const MAX_REINJECT_ON_ACK: u16 = 20;

/// The catch-up timer splits one period into at most this many slots.
const MAX_CATCHUP_DIVISOR: u32 = 8;

pub(crate) fn ns_to_clock(ns: u64) -> u64 {
    (u128::from(ns) * u128::from(RTC_CLOCK_RATE) / u128::from(NS_PER_SEC)) as u64
}

pub(crate) fn clock_to_ns(clock: u64) -> u64 {
    (u128::from(clock) * u128::from(NS_PER_SEC) / u128::from(RTC_CLOCK_RATE)) as u64
}

/// Inverse of the `clock_to_ns(clock) + 1` deadline encoding.
pub(crate) fn deadline_to_clock(deadline_ns: u64) -> u64 {
    let ns = u128::from(deadline_ns.saturating_sub(1));
    let num = ns * u128::from(RTC_CLOCK_RATE);
    num.div_ceil(u128::from(NS_PER_SEC)) as u64
}

impl<C: Clock, I: IrqLine> RtcCmos<C, I> {
    /// Programmed period in 32.768 kHz ticks, or 0 when periodic interrupts are disabled.
    pub(super) fn periodic_ticks(&self) -> u32 {
        if !self.status_b().contains(StatusB::PIE) {
            return 0;
        }
        regs::period_ticks_for_rate(self.cmos[REG_STATUS_A as usize])
    }

    /// Recomputes the periodic deadline from `current_ns`.
    ///
    /// With `period_change`, the ticks elapsed since the last interrupt of `old_period` are
    /// carried into the new period.
    pub(super) fn periodic_timer_update(
        &mut self,
        current_ns: u64,
        old_period: u32,
        period_change: bool,
    ) {
        let period = self.periodic_ticks();
        self.period = period;

        if period == 0 {
            self.irq_coalesced = 0;
            self.periodic_timer.cancel();
            self.coalesced_timer.cancel();
            tracing::debug!("RTC periodic timer disabled");
            return;
        }

        let cur_clock = ns_to_clock(current_ns) as i64;
        let period = i64::from(period);
        let mut lost_clock: i64 = 0;

        if old_period != 0 && period_change {
            let next_clock = ns_to_clock(self.next_periodic_ns) as i64;
            let last_clock = next_clock - i64::from(old_period);
            lost_clock = cur_clock - last_clock;
            if lost_clock < 0 {
                tracing::warn!(lost_clock, "RTC clock moved backwards, clamping lost ticks");
                lost_clock = 0;
            }
        }

        match self.cfg.lost_tick_policy {
            LostTickPolicy::Slew => {
                // Missed ticks are re-expressed in the new period; leftovers carry over.
                let old_coalesced = self.irq_coalesced;
                lost_clock += i64::from(old_coalesced) * i64::from(old_period);
                self.irq_coalesced = u32::try_from(lost_clock / period).unwrap_or(u32::MAX);
                lost_clock %= period;
                if old_coalesced != self.irq_coalesced || i64::from(old_period) != period {
                    self.coalesced_timer_update();
                }
            }
            LostTickPolicy::Discard => {
                lost_clock = lost_clock.min(period);
            }
        }
        debug_assert!((0..=period).contains(&lost_clock));

        let next_irq_clock = (cur_clock + period - lost_clock) as u64;
        self.next_periodic_ns = clock_to_ns(next_irq_clock) + 1;
        self.periodic_timer.arm(self.next_periodic_ns);
        tracing::debug!(
            period_ticks = period,
            next_periodic_ns = self.next_periodic_ns,
            irq_coalesced = self.irq_coalesced,
            "RTC periodic timer armed"
        );
    }

    /// Arms the catch-up timer for the coalesced backlog, or cancels it when there is none.
    pub(super) fn coalesced_timer_update(&mut self) {
        if self.irq_coalesced == 0 {
            self.coalesced_timer.cancel();
            return;
        }
        let divisor = self.irq_coalesced.min(MAX_CATCHUP_DIVISOR - 1) + 1;
        let mut interval_ns = clock_to_ns(u64::from(self.period / divisor));
        if interval_ns == 0 {
            tracing::warn!(period = self.period, "zero catch-up interval, clamping to 1ns");
            interval_ns = 1;
        }
        self.coalesced_timer
            .arm(self.clock.now_ns().saturating_add(interval_ns));
    }

    pub(super) fn periodic_timer_fired(&mut self) {
        let deadline = self.next_periodic_ns;
        self.periodic_timer_update(deadline, self.period, false);

        if self.cfg.lost_tick_policy == LostTickPolicy::Discard {
            self.skip_missed_periodic_deadlines();
        }

        let mut c = self.status_c() | StatusC::PF;
        if self.status_b().contains(StatusB::PIE) {
            c |= StatusC::IRQF;
            self.set_status_c(c);
            match self.cfg.lost_tick_policy {
                LostTickPolicy::Slew => {
                    if self.irq_reinject_on_ack_count >= MAX_REINJECT_ON_ACK {
                        self.irq_reinject_on_ack_count = 0;
                    }
                    if !self.slew_deliver_irq() {
                        self.irq_coalesced = self.irq_coalesced.saturating_add(1);
                        self.coalesced_timer_update();
                        tracing::trace!(
                            irq_coalesced = self.irq_coalesced,
                            "RTC periodic interrupt coalesced"
                        );
                    }
                }
                LostTickPolicy::Discard => self.raise_irq(),
            }
        } else {
            self.set_status_c(c);
        }
    }

    /// Moves a deadline that is already in the past to the first grid point after now.
    fn skip_missed_periodic_deadlines(&mut self) {
        let now = self.clock.now_ns();
        if self.period == 0 || self.next_periodic_ns > now {
            return;
        }
        let period = u64::from(self.period);
        let next_clock = deadline_to_clock(self.next_periodic_ns);
        let skips = (ns_to_clock(now).saturating_sub(next_clock)) / period + 1;
        self.next_periodic_ns = clock_to_ns(next_clock + skips * period) + 1;
        self.periodic_timer.arm(self.next_periodic_ns);
        tracing::debug!(
            skipped = skips,
            next_periodic_ns = self.next_periodic_ns,
            "RTC periodic deadlines discarded"
        );
    }

    pub(super) fn coalesced_timer_fired(&mut self) {
        if self.irq_coalesced != 0 {
            let c = self.status_c() | StatusC::IRQF | StatusC::PF;
            self.set_status_c(c);
            if self.slew_deliver_irq() {
                self.irq_coalesced -= 1;
            }
        }
        self.coalesced_timer_update();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_clock_conversions() {
        assert_eq!(ns_to_clock(NS_PER_SEC), RTC_CLOCK_RATE);
        assert_eq!(clock_to_ns(32), 976_562);
        assert_eq!(clock_to_ns(RTC_CLOCK_RATE), NS_PER_SEC);
    }

    #[test]
    fn deadline_round_trips_to_grid_point() {
        for clock in [0u64, 1, 31, 32, 33, 32_768, 1_000_003, 123_456_789] {
            assert_eq!(deadline_to_clock(clock_to_ns(clock) + 1), clock, "clock={clock}");
        }
    }
}

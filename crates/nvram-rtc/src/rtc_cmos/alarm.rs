//! Alarm delay computation with "don't care" fields.

use crate::clock::Clock;
use crate::irq::IrqLine;

use super::calendar::{convert_hour, from_bcd};
use super::regs::{
    StatusB, REG_HOURS, REG_HOURS_ALARM, REG_MINUTES, REG_MINUTES_ALARM, REG_SECONDS,
    REG_SECONDS_ALARM,
};
use super::RtcCmos;

const SECS_PER_DAY: i64 = 86_400;

/// Alarm fields; `None` matches any value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AlarmTime {
    pub second: Option<i32>,
    pub minute: Option<i32>,
    pub hour: Option<i32>,
}

/// Seconds from the start of the current second `(hour, minute, second)` until the alarm
/// next matches, in `1..=86400` for in-range inputs.
///
/// Don't-care fields take the current value and carry upward, which yields the chip's
/// behaviour for ambiguous combinations: for instance an alarm whose concrete fields match
/// the current second exactly fires a day later rather than an hour or minute later.
pub(crate) fn alarm_delay_secs(alarm: AlarmTime, now: (i32, i32, i32)) -> i64 {
    let (cur_hour, cur_min, cur_sec) = now;
    let AlarmTime {
        mut second,
        mut minute,
        hour,
    } = alarm;

    let mut hour = match hour {
        None => {
            let mut hour = cur_hour;
            match minute {
                None => {
                    minute = Some(cur_min);
                    match second {
                        None => second = Some(cur_sec + 1),
                        Some(s) if cur_sec > s => minute = Some(cur_min + 1),
                        Some(_) => {}
                    }
                }
                Some(m) if m == cur_min => {
                    match second {
                        None => second = Some(cur_sec + 1),
                        Some(s) if cur_sec > s => hour += 1,
                        Some(_) => {}
                    }
                    // Minutes are fixed, so a seconds overflow moves to the next hour.
                    if second == Some(60) {
                        second = Some(0);
                        hour += 1;
                    }
                }
                Some(m) if cur_min > m => hour += 1,
                Some(_) => {}
            }
            hour
        }
        Some(h) => {
            if cur_hour == h {
                match minute {
                    None => {
                        let mut m = cur_min;
                        match second {
                            None => second = Some(cur_sec + 1),
                            Some(s) if cur_sec > s => m += 1,
                            Some(_) => {}
                        }
                        if second == Some(60) {
                            second = Some(0);
                            m += 1;
                        }
                        // Hour is fixed: wrap into the same hour tomorrow.
                        minute = Some(m % 60);
                    }
                    Some(m) if m == cur_min => {
                        second = Some(second.unwrap_or(cur_sec + 1) % 60);
                    }
                    Some(_) => {}
                }
            }
            h
        }
    };

    let mut second = second.unwrap_or(0);
    let mut minute = minute.unwrap_or(0);
    if second == 60 {
        second = 0;
        minute += 1;
    }
    if minute == 60 {
        minute = 0;
        hour += 1;
    }
    hour %= 24;

    let delta = i64::from(((hour - cur_hour) * 60 + minute - cur_min) * 60 + second - cur_sec);
    if delta <= 0 {
        delta + SECS_PER_DAY
    } else {
        delta
    }
}

impl<C: Clock, I: IrqLine> RtcCmos<C, I> {
    /// Whole seconds from the current guest second until the alarm fires.
    pub(super) fn next_alarm_delay_secs(&mut self) -> i64 {
        self.update_time();

        let binary = self.status_b().contains(StatusB::DM);
        let field = |reg: u8| from_bcd(binary, self.cmos[reg as usize]);
        let dont_care = |v: i32| (v != -1).then_some(v);

        // The hours bytes are decoded with their 12-hour PM bit still in place.
        let alarm = AlarmTime {
            second: dont_care(field(REG_SECONDS_ALARM)),
            minute: dont_care(field(REG_MINUTES_ALARM)),
            hour: dont_care(field(REG_HOURS_ALARM)).map(|h| convert_hour(&self.cmos, h)),
        };
        let now = (
            convert_hour(&self.cmos, field(REG_HOURS)),
            field(REG_MINUTES),
            field(REG_SECONDS),
        );
        alarm_delay_secs(alarm, now)
    }
}

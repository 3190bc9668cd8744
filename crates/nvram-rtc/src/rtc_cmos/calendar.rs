//! Conversions between UNIX seconds and the CMOS date/time bytes.

use time::OffsetDateTime;

use super::regs::{
    StatusB, ALARM_DONT_CARE, HOURS_PM, REG_CENTURY, REG_DAY_OF_MONTH, REG_DAY_OF_WEEK,
    REG_HOURS, REG_MINUTES, REG_MONTH, REG_SECONDS, REG_STATUS_B, REG_YEAR,
};

pub(crate) const NS_PER_SEC: u64 = 1_000_000_000;

/// Broken-down UTC time. Fields decoded from guest bytes are not range checked and may be
/// `-1` for "don't care" encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CalendarFields {
    pub second: i32,
    pub minute: i32,
    pub hour: i32,
    /// 0 = Sunday.
    pub weekday: i32,
    pub day: i32,
    /// 1-based.
    pub month: i32,
    pub year: i32,
}

impl CalendarFields {
    pub(crate) fn from_unix_seconds(secs: i64) -> Option<Self> {
        let dt = OffsetDateTime::from_unix_timestamp(secs).ok()?;
        Some(Self {
            second: i32::from(dt.second()),
            minute: i32::from(dt.minute()),
            hour: i32::from(dt.hour()),
            weekday: i32::from(dt.weekday().number_days_from_sunday()),
            day: i32::from(dt.day()),
            month: i32::from(u8::from(dt.month())),
            year: dt.year(),
        })
    }

    /// Seconds since the UNIX epoch. Out-of-range fields carry into the neighbouring ones
    /// instead of failing, so arbitrary guest bytes always produce a time.
    pub(crate) fn to_unix_seconds(&self) -> i64 {
        let mut y = i64::from(self.year);
        let mut m = i64::from(self.month);
        let d = i64::from(self.day);
        if m < 3 {
            m += 12;
            y -= 1;
        }
        let days = d + (153 * m - 457) / 5 + 365 * y + y / 4 - y / 100 + y / 400 - 719_469;
        86_400 * days
            + 3_600 * i64::from(self.hour)
            + 60 * i64::from(self.minute)
            + i64::from(self.second)
    }
}

pub(crate) fn to_bcd(binary: bool, value: i32) -> u8 {
    if binary {
        value as u8
    } else {
        (((value / 10) << 4) | (value % 10)) as u8
    }
}

/// Decodes a data byte; both top bits set is the "don't care" pattern and yields `-1`.
pub(crate) fn from_bcd(binary: bool, value: u8) -> i32 {
    if value & ALARM_DONT_CARE == ALARM_DONT_CARE {
        return -1;
    }
    if binary {
        i32::from(value)
    } else {
        i32::from(value >> 4) * 10 + i32::from(value & 0x0F)
    }
}

/// Maps a decoded hour to 0..24. In 12-hour mode the PM flag is taken from the current
/// hours byte.
pub(crate) fn convert_hour(cmos: &[u8; 256], hour: i32) -> i32 {
    let b = StatusB::from_bits_retain(cmos[REG_STATUS_B as usize]);
    if b.contains(StatusB::HOUR_24) {
        return hour;
    }
    let mut hour = hour % 12;
    if cmos[REG_HOURS as usize] & HOURS_PM != 0 {
        hour += 12;
    }
    hour
}

/// Reads the date/time bytes in the current data mode.
pub(crate) fn read_cmos(cmos: &[u8; 256], base_year: i32) -> CalendarFields {
    let binary = StatusB::from_bits_retain(cmos[REG_STATUS_B as usize]).contains(StatusB::DM);
    let field = |reg: u8| from_bcd(binary, cmos[reg as usize]);

    let hour = from_bcd(binary, cmos[REG_HOURS as usize] & !HOURS_PM);
    CalendarFields {
        second: field(REG_SECONDS),
        minute: field(REG_MINUTES),
        hour: convert_hour(cmos, hour),
        weekday: field(REG_DAY_OF_WEEK) - 1,
        day: field(REG_DAY_OF_MONTH),
        month: field(REG_MONTH),
        year: field(REG_YEAR) + base_year + field(REG_CENTURY) * 100,
    }
}

/// Writes the date/time bytes in the current data and hour modes.
pub(crate) fn write_cmos(cmos: &mut [u8; 256], tm: &CalendarFields, base_year: i32) {
    let b = StatusB::from_bits_retain(cmos[REG_STATUS_B as usize]);
    let binary = b.contains(StatusB::DM);

    cmos[REG_SECONDS as usize] = to_bcd(binary, tm.second);
    cmos[REG_MINUTES as usize] = to_bcd(binary, tm.minute);
    cmos[REG_HOURS as usize] = if b.contains(StatusB::HOUR_24) {
        to_bcd(binary, tm.hour)
    } else {
        let h = match tm.hour % 12 {
            0 => 12,
            h => h,
        };
        let pm = if tm.hour >= 12 { HOURS_PM } else { 0 };
        to_bcd(binary, h) | pm
    };
    cmos[REG_DAY_OF_WEEK as usize] = to_bcd(binary, tm.weekday + 1);
    cmos[REG_DAY_OF_MONTH as usize] = to_bcd(binary, tm.day);
    cmos[REG_MONTH as usize] = to_bcd(binary, tm.month);
    let year = tm.year - base_year;
    cmos[REG_YEAR as usize] = to_bcd(binary, year % 100);
    cmos[REG_CENTURY as usize] = to_bcd(binary, year / 100);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// 1980-01-01T00:00:00Z
    const MIN_SECS: i64 = 315_532_800;
    /// 9999-12-31T23:59:59Z
    const MAX_SECS: i64 = 253_402_300_799;

    proptest! {
        #[test]
        fn cmos_bytes_round_trip_in_every_mode(
            secs in MIN_SECS..=MAX_SECS,
            binary in any::<bool>(),
            hour_24 in any::<bool>(),
            base_year in prop_oneof![Just(0i32), Just(1980i32)],
        ) {
            let mut b = StatusB::empty();
            b.set(StatusB::DM, binary);
            b.set(StatusB::HOUR_24, hour_24);
            let mut cmos = [0u8; 256];
            cmos[REG_STATUS_B as usize] = b.bits();

            let tm = CalendarFields::from_unix_seconds(secs).unwrap();
            write_cmos(&mut cmos, &tm, base_year);
            let decoded = read_cmos(&cmos, base_year);

            prop_assert_eq!(decoded.to_unix_seconds(), secs);
            prop_assert_eq!(decoded, tm);
        }
    }

    #[test]
    fn unix_seconds_matches_known_dates() {
        let y2k = CalendarFields {
            second: 0,
            minute: 0,
            hour: 0,
            weekday: 6,
            day: 1,
            month: 1,
            year: 2000,
        };
        assert_eq!(y2k.to_unix_seconds(), 946_684_800);
        assert_eq!(CalendarFields::from_unix_seconds(946_684_800), Some(y2k));

        // 2024-02-29 12:34:56 UTC, a Thursday.
        let leap = CalendarFields::from_unix_seconds(1_709_210_096).unwrap();
        assert_eq!(
            (leap.year, leap.month, leap.day, leap.weekday),
            (2024, 2, 29, 4)
        );
        assert_eq!((leap.hour, leap.minute, leap.second), (12, 34, 56));
    }

    #[test]
    fn out_of_range_fields_carry() {
        let mut tm = CalendarFields::from_unix_seconds(946_684_800).unwrap();
        tm.second = 60;
        assert_eq!(tm.to_unix_seconds(), 946_684_860);
        tm.second = -1;
        assert_eq!(tm.to_unix_seconds(), 946_684_799);
    }

    #[test]
    fn bcd_encoding() {
        assert_eq!(to_bcd(false, 59), 0x59);
        assert_eq!(to_bcd(true, 59), 59);
        assert_eq!(from_bcd(false, 0x59), 59);
        assert_eq!(from_bcd(true, 59), 59);
        assert_eq!(from_bcd(false, 0xC0), -1);
        assert_eq!(from_bcd(true, 0xFF), -1);
    }

    #[test]
    fn twelve_hour_mode_sets_pm_flag() {
        let mut cmos = [0u8; 256];
        cmos[REG_STATUS_B as usize] = 0;
        let mut tm = CalendarFields::from_unix_seconds(946_684_800).unwrap();

        tm.hour = 0;
        write_cmos(&mut cmos, &tm, 1980);
        assert_eq!(cmos[REG_HOURS as usize], 0x12);
        assert_eq!(read_cmos(&cmos, 1980).hour, 0);

        tm.hour = 12;
        write_cmos(&mut cmos, &tm, 1980);
        assert_eq!(cmos[REG_HOURS as usize], 0x92);
        assert_eq!(read_cmos(&cmos, 1980).hour, 12);

        tm.hour = 23;
        write_cmos(&mut cmos, &tm, 1980);
        assert_eq!(cmos[REG_HOURS as usize], 0x91);
        assert_eq!(read_cmos(&cmos, 1980).hour, 23);
    }

    #[test]
    fn century_follows_base_year() {
        let mut cmos = [0u8; 256];
        cmos[REG_STATUS_B as usize] = StatusB::HOUR_24.bits();
        let tm = CalendarFields::from_unix_seconds(1_709_210_096).unwrap();

        write_cmos(&mut cmos, &tm, 0);
        assert_eq!(cmos[REG_YEAR as usize], 0x24);
        assert_eq!(cmos[REG_CENTURY as usize], 0x20);

        write_cmos(&mut cmos, &tm, 1980);
        assert_eq!(cmos[REG_YEAR as usize], 0x44);
        assert_eq!(cmos[REG_CENTURY as usize], 0x00);
        assert_eq!(read_cmos(&cmos, 1980).year, 2024);
    }
}

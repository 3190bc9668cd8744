//! CMOS register indices, control bits, and the per-index access table.

use bitflags::bitflags;

pub const REG_SECONDS: u8 = 0x00;
pub const REG_SECONDS_ALARM: u8 = 0x01;
pub const REG_MINUTES: u8 = 0x02;
pub const REG_MINUTES_ALARM: u8 = 0x03;
pub const REG_HOURS: u8 = 0x04;
pub const REG_HOURS_ALARM: u8 = 0x05;
pub const REG_DAY_OF_WEEK: u8 = 0x06;
pub const REG_DAY_OF_MONTH: u8 = 0x07;
pub const REG_MONTH: u8 = 0x08;
pub const REG_YEAR: u8 = 0x09;
pub const REG_STATUS_A: u8 = 0x0A;
pub const REG_STATUS_B: u8 = 0x0B;
pub const REG_STATUS_C: u8 = 0x0C;
pub const REG_STATUS_D: u8 = 0x0D;
/// Shutdown status byte; `0xFE` asks firmware to resume from S3.
pub const REG_SHUTDOWN_STATUS: u8 = 0x0F;
pub const REG_CENTURY: u8 = 0x32;
pub const REG_IBM_PS2_CENTURY: u8 = 0x37;

pub const SHUTDOWN_S3_RESUME: u8 = 0xFE;

/// Alarm byte values with both top bits set match any value.
pub const ALARM_DONT_CARE: u8 = 0xC0;

/// Bit 7 of the hours byte in 12-hour mode.
pub const HOURS_PM: u8 = 0x80;

pub const REG_A_UIP: u8 = 0x80;
/// Divider chain select bits (DV2..DV0).
pub const REG_A_DIVIDER_MASK: u8 = 0x70;
/// Both set means the divider chain is held in reset.
pub const REG_A_DIVIDER_RESET: u8 = 0x60;
/// Highest divider select that still lets the clock run.
pub const REG_A_DIVIDER_RUNNING_MAX: u8 = 0x20;
pub const REG_A_RATE_MASK: u8 = 0x0F;

pub const REG_A_POWER_ON: u8 = 0x26;
pub const REG_B_POWER_ON: u8 = 0x02;
pub const REG_D_VALID_RAM: u8 = 0x80;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusB: u8 {
        const SET = 0x80;
        const PIE = 0x40;
        const AIE = 0x20;
        const UIE = 0x10;
        const SQWE = 0x08;
        /// Binary (rather than BCD) data mode.
        const DM = 0x04;
        const HOUR_24 = 0x02;
        const DSE = 0x01;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusC: u8 {
        const IRQF = 0x80;
        const PF = 0x40;
        const AF = 0x20;
        const UF = 0x10;
    }
}

impl StatusC {
    /// The three individual sources, in the bit positions of their enables in register B.
    pub const SOURCES: Self = Self::PF.union(Self::AF).union(Self::UF);
}

/// How an index in the low bank is read and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegRole {
    /// Auto-updating date/time byte.
    Calendar,
    /// Alarm seconds/minutes/hours.
    Alarm,
    StatusA,
    StatusB,
    StatusC,
    StatusD,
    /// Another index's handler; the selected index is rewritten to the target.
    Alias(u8),
    Nvram,
}

const fn build_reg_table() -> [RegRole; 128] {
    let mut table = [RegRole::Nvram; 128];
    table[REG_SECONDS as usize] = RegRole::Calendar;
    table[REG_MINUTES as usize] = RegRole::Calendar;
    table[REG_HOURS as usize] = RegRole::Calendar;
    table[REG_DAY_OF_WEEK as usize] = RegRole::Calendar;
    table[REG_DAY_OF_MONTH as usize] = RegRole::Calendar;
    table[REG_MONTH as usize] = RegRole::Calendar;
    table[REG_YEAR as usize] = RegRole::Calendar;
    table[REG_CENTURY as usize] = RegRole::Calendar;
    table[REG_SECONDS_ALARM as usize] = RegRole::Alarm;
    table[REG_MINUTES_ALARM as usize] = RegRole::Alarm;
    table[REG_HOURS_ALARM as usize] = RegRole::Alarm;
    table[REG_STATUS_A as usize] = RegRole::StatusA;
    table[REG_STATUS_B as usize] = RegRole::StatusB;
    table[REG_STATUS_C as usize] = RegRole::StatusC;
    table[REG_STATUS_D as usize] = RegRole::StatusD;
    table[REG_IBM_PS2_CENTURY as usize] = RegRole::Alias(REG_CENTURY);
    table
}

static REG_TABLE: [RegRole; 128] = build_reg_table();

/// Resolves `index` to the index that actually services it and that index's role.
///
/// Indices above the low bank are plain NVRAM.
pub(crate) fn resolve(index: u8) -> (u8, RegRole) {
    match REG_TABLE.get(index as usize).copied() {
        Some(RegRole::Alias(target)) => (target, REG_TABLE[target as usize]),
        Some(role) => (index, role),
        None => (index, RegRole::Nvram),
    }
}

/// Periodic interrupt period, in 32.768 kHz ticks, for a register A rate selector.
///
/// Rate selectors 1 and 2 alias 8 and 9 (the 256 Hz and 128 Hz rates).
pub const fn period_ticks_for_rate(rate: u8) -> u32 {
    let mut code = (rate & REG_A_RATE_MASK) as u32;
    if code == 0 {
        return 0;
    }
    if code <= 2 {
        code += 7;
    }
    1 << (code - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ps2_century_aliases_century() {
        assert_eq!(resolve(REG_IBM_PS2_CENTURY), (REG_CENTURY, RegRole::Calendar));
        assert_eq!(resolve(REG_CENTURY), (REG_CENTURY, RegRole::Calendar));
        assert_eq!(resolve(0x0E), (0x0E, RegRole::Nvram));
        assert_eq!(resolve(0x90), (0x90, RegRole::Nvram));
        assert_eq!(resolve(REG_HOURS_ALARM), (REG_HOURS_ALARM, RegRole::Alarm));
    }

    #[test]
    fn rate_table() {
        assert_eq!(period_ticks_for_rate(0), 0);
        assert_eq!(period_ticks_for_rate(1), 256);
        assert_eq!(period_ticks_for_rate(2), 512);
        assert_eq!(period_ticks_for_rate(3), 4);
        assert_eq!(period_ticks_for_rate(6), 32);
        assert_eq!(period_ticks_for_rate(15), 16384);
        // Only the low nibble selects the rate.
        assert_eq!(period_ticks_for_rate(0x26), 32);
    }
}

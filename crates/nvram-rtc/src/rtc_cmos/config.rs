use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Number of legacy ISA interrupt lines.
pub const ISA_NUM_IRQS: u8 = 16;

pub const DEFAULT_IO_BASE: u16 = 0x70;
pub const DEFAULT_EXTENDED_IO_BASE: u16 = 0x74;
pub const DEFAULT_ISA_IRQ: u8 = 8;
pub const DEFAULT_BASE_YEAR: i32 = 1980;
pub const DEFAULT_MAX_CLOCK_JUMP_NS: u64 = 60 * 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RtcConfigError {
    #[error("invalid RTC irq {irq} (maximum value is {max})")]
    InvalidIrq { irq: u8, max: u8 },

    #[error("invalid lost tick policy: {0:?}")]
    InvalidLostTickPolicy(String),

    #[error("RTC I/O port {port:#x} is already in use")]
    IoPortOverlap { port: u16 },
}

/// What to do with periodic interrupts the guest did not observe in time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LostTickPolicy {
    /// Let time progress; missed ticks are not replayed.
    #[default]
    Discard,
    /// Count missed ticks and re-inject them at a higher short-term rate.
    Slew,
}

impl FromStr for LostTickPolicy {
    type Err = RtcConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard" => Ok(Self::Discard),
            "slew" => Ok(Self::Slew),
            _ => Err(RtcConfigError::InvalidLostTickPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for LostTickPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discard => "discard",
            Self::Slew => "slew",
        })
    }
}

/// Where the calendar is seeded from when the device is created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RtcStartTime {
    /// Host wall clock at construction.
    #[default]
    Host,
    /// Fixed UNIX time, for reproducible runs.
    UnixSeconds(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcConfig {
    /// Year that a zero year/century pair represents. `2000` is treated as `0` so the century
    /// byte carries the real century.
    pub base_year: i32,
    /// Index/data port pair for the 128-byte bank.
    pub io_base: u16,
    /// Index/data port pair for the full 256-byte bank.
    pub extended_io_base: u16,
    pub isa_irq: u8,
    pub lost_tick_policy: LostTickPolicy,
    pub start_time: RtcStartTime,
    /// Restore recomputes the periodic deadline if the clock moved further than this past it.
    pub max_clock_jump_ns: u64,
    /// Never recompute the periodic deadline on restore.
    pub replay_deterministic: bool,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            base_year: DEFAULT_BASE_YEAR,
            io_base: DEFAULT_IO_BASE,
            extended_io_base: DEFAULT_EXTENDED_IO_BASE,
            isa_irq: DEFAULT_ISA_IRQ,
            lost_tick_policy: LostTickPolicy::Discard,
            start_time: RtcStartTime::Host,
            max_clock_jump_ns: DEFAULT_MAX_CLOCK_JUMP_NS,
            replay_deterministic: false,
        }
    }
}

impl RtcConfig {
    pub fn validate(&self) -> Result<(), RtcConfigError> {
        if self.isa_irq >= ISA_NUM_IRQS {
            return Err(RtcConfigError::InvalidIrq {
                irq: self.isa_irq,
                max: ISA_NUM_IRQS - 1,
            });
        }
        // The two port pairs must not overlap each other.
        let primary = self.io_base..self.io_base.saturating_add(2);
        for port in [self.extended_io_base, self.extended_io_base.wrapping_add(1)] {
            if primary.contains(&port) {
                return Err(RtcConfigError::IoPortOverlap { port });
            }
        }
        Ok(())
    }

    pub(crate) fn effective_base_year(&self) -> i32 {
        if self.base_year == 2000 {
            0
        } else {
            self.base_year
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("slew".parse(), Ok(LostTickPolicy::Slew));
        assert_eq!(" Discard ".parse(), Ok(LostTickPolicy::Discard));
        assert_eq!(
            "delay".parse::<LostTickPolicy>(),
            Err(RtcConfigError::InvalidLostTickPolicy("delay".to_string()))
        );
        assert_eq!(LostTickPolicy::Slew.to_string(), "slew");
    }

    #[test]
    fn validate_rejects_bad_irq_and_overlapping_ports() {
        assert!(RtcConfig::default().validate().is_ok());

        let cfg = RtcConfig {
            isa_irq: 16,
            ..RtcConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(RtcConfigError::InvalidIrq { irq: 16, max: 15 })
        );

        let cfg = RtcConfig {
            extended_io_base: 0x71,
            ..RtcConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(RtcConfigError::IoPortOverlap { port: 0x71 })
        );
    }

    #[test]
    fn base_year_2000_maps_to_zero() {
        let cfg = RtcConfig {
            base_year: 2000,
            ..RtcConfig::default()
        };
        assert_eq!(cfg.effective_base_year(), 0);
        assert_eq!(RtcConfig::default().effective_base_year(), 1980);
    }
}

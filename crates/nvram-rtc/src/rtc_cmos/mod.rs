//! MC146818-compatible RTC/CMOS with the VIA extended NVRAM bank.
//!
//! The device keeps guest time as `base_rtc` seconds at host instant `last_update_ns`, plus a
//! sub-second `offset_ns`. Calendar bytes are re-derived from that on demand, and written
//! calendar bytes are folded back into it while the clock runs.
//!
//! Three one-shot timers drive interrupts: the periodic timer, the update/alarm timer, and
//! (under [`LostTickPolicy::Slew`]) a catch-up timer that re-injects coalesced periodic
//! interrupts. The host calls [`RtcCmos::tick`] at or after [`RtcCmos::next_deadline_ns`].

mod alarm;
mod calendar;
mod config;
mod periodic;
pub mod regs;
mod snapshot;
mod timer;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use nvram_platform::io::{IoPortBus, PortIoDevice};

use crate::clock::Clock;
use crate::irq::IrqLine;

use calendar::{CalendarFields, NS_PER_SEC};
use regs::{
    RegRole, StatusB, StatusC, REG_A_DIVIDER_MASK, REG_A_DIVIDER_RESET, REG_A_DIVIDER_RUNNING_MAX,
    REG_A_POWER_ON, REG_A_UIP, REG_B_POWER_ON, REG_D_VALID_RAM, REG_SHUTDOWN_STATUS,
    REG_STATUS_A, REG_STATUS_B, REG_STATUS_C, REG_STATUS_D, SHUTDOWN_S3_RESUME,
};
use timer::OneShotTimer;

pub use config::{
    LostTickPolicy, RtcConfig, RtcConfigError, RtcStartTime, DEFAULT_EXTENDED_IO_BASE,
    DEFAULT_IO_BASE, DEFAULT_ISA_IRQ, ISA_NUM_IRQS,
};

/// Length of the update-in-progress window before each second boundary (8 cycles of 32 kHz).
const UIP_WINDOW_NS: u64 = 8 * NS_PER_SEC / 32_768;

/// Sub-second phase after leaving set mode or divider reset: the first update comes 500 ms
/// later.
const FIRST_UPDATE_OFFSET_NS: i64 = 500_000_000;

/// Current guest date and time, normalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcDateTime {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// 0 = Sunday.
    pub weekday: u8,
}

impl RtcDateTime {
    fn from_fields(tm: &CalendarFields) -> Self {
        // Callers pass fields produced by `CalendarFields::from_unix_seconds`, which are in range.
        Self {
            year: tm.year,
            month: tm.month as u8,
            day: tm.day as u8,
            hour: tm.hour as u8,
            minute: tm.minute as u8,
            second: tm.second as u8,
            weekday: tm.weekday as u8,
        }
    }
}

#[derive(Default)]
pub struct RtcCallbacks {
    /// Called when the alarm matches while alarm interrupts are enabled.
    pub wake: Option<Box<dyn FnMut()>>,
    /// Called with "guest RTC minus host wall clock", in seconds, whenever the guest sets the
    /// clock.
    pub time_changed: Option<Box<dyn FnMut(i64)>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerSource {
    Periodic,
    Update,
    Coalesced,
}

pub struct RtcCmos<C: Clock, I: IrqLine> {
    cfg: RtcConfig,
    base_year: i32,
    clock: C,
    irq: I,
    callbacks: RtcCallbacks,

    cmos: [u8; 256],
    index: u8,

    base_rtc: i64,
    last_update_ns: u64,
    offset_ns: i64,

    /// Host wall clock (UNIX seconds) at `host_ref_ns`; used to report guest/host skew.
    host_ref_secs: i64,
    host_ref_ns: u64,

    /// Periodic period in 32.768 kHz ticks; 0 when periodic interrupts are off.
    period: u32,
    next_periodic_ns: u64,
    irq_coalesced: u32,
    irq_reinject_on_ack_count: u16,
    next_alarm_ns: u64,

    periodic_timer: OneShotTimer,
    update_timer: OneShotTimer,
    coalesced_timer: OneShotTimer,

    irq_level: bool,
}

pub type SharedRtcCmos<C, I> = Rc<RefCell<RtcCmos<C, I>>>;

fn host_wall_clock_secs() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        Err(err) => {
            tracing::warn!(%err, "host wall clock is before the UNIX epoch");
            0
        }
    }
}

impl<C: Clock, I: IrqLine> RtcCmos<C, I> {
    /// Creates an RTC with the default configuration, seeded from the host wall clock.
    pub fn new(clock: C, irq: I) -> Self {
        Self::build(clock, irq, RtcConfig::default())
    }

    pub fn with_config(clock: C, irq: I, cfg: RtcConfig) -> Result<Self, RtcConfigError> {
        cfg.validate()?;
        Ok(Self::build(clock, irq, cfg))
    }

    fn build(clock: C, irq: I, cfg: RtcConfig) -> Self {
        let now = clock.now_ns();
        let start_secs = match cfg.start_time {
            RtcStartTime::Host => host_wall_clock_secs(),
            RtcStartTime::UnixSeconds(secs) => secs,
        };

        let mut cmos = [0u8; 256];
        cmos[REG_STATUS_A as usize] = REG_A_POWER_ON;
        cmos[REG_STATUS_B as usize] = REG_B_POWER_ON;
        cmos[REG_STATUS_C as usize] = 0;
        cmos[REG_STATUS_D as usize] = REG_D_VALID_RAM;
        // The last byte of the high bank powers on as zero.
        cmos[0x80..0xFF].fill(0xFF);

        let mut dev = Self {
            base_year: cfg.effective_base_year(),
            cfg,
            clock,
            irq,
            callbacks: RtcCallbacks::default(),
            cmos,
            index: 0,
            base_rtc: start_secs,
            last_update_ns: now,
            offset_ns: 0,
            host_ref_secs: start_secs,
            host_ref_ns: now,
            period: 0,
            next_periodic_ns: 0,
            irq_coalesced: 0,
            irq_reinject_on_ack_count: 0,
            next_alarm_ns: 0,
            periodic_timer: OneShotTimer::default(),
            update_timer: OneShotTimer::default(),
            coalesced_timer: OneShotTimer::default(),
            irq_level: false,
        };

        match CalendarFields::from_unix_seconds(start_secs) {
            Some(tm) => calendar::write_cmos(&mut dev.cmos, &tm, dev.base_year),
            None => tracing::warn!(start_secs, "RTC start time is outside the calendar range"),
        }
        dev.check_update_timer();
        dev
    }

    pub fn cfg(&self) -> RtcConfig {
        self.cfg
    }

    pub fn set_callbacks(&mut self, callbacks: RtcCallbacks) {
        self.callbacks = callbacks;
    }

    fn status_a(&self) -> u8 {
        self.cmos[REG_STATUS_A as usize]
    }

    fn status_b(&self) -> StatusB {
        StatusB::from_bits_retain(self.cmos[REG_STATUS_B as usize])
    }

    fn status_c(&self) -> StatusC {
        StatusC::from_bits_retain(self.cmos[REG_STATUS_C as usize])
    }

    fn set_status_c(&mut self, c: StatusC) {
        self.cmos[REG_STATUS_C as usize] = c.bits();
    }

    fn clear_uip(&mut self) {
        self.cmos[REG_STATUS_A as usize] &= !REG_A_UIP;
    }

    fn divider_in_reset(&self) -> bool {
        self.status_a() & REG_A_DIVIDER_RESET == REG_A_DIVIDER_RESET
    }

    fn divider_running(a: u8) -> bool {
        a & REG_A_DIVIDER_MASK <= REG_A_DIVIDER_RUNNING_MAX
    }

    /// The calendar advances on its own: not in set mode and the divider chain is running.
    fn rtc_running(&self) -> bool {
        !self.status_b().contains(StatusB::SET) && Self::divider_running(self.status_a())
    }

    fn guest_rtc_ns(&self) -> i128 {
        let now = self.clock.now_ns();
        i128::from(self.base_rtc) * i128::from(NS_PER_SEC) + i128::from(now)
            - i128::from(self.last_update_ns)
            + i128::from(self.offset_ns)
    }

    fn guest_subsec_ns(&self) -> u64 {
        self.guest_rtc_ns().rem_euclid(i128::from(NS_PER_SEC)) as u64
    }

    /// Register contents with the calendar bytes brought up to the current guest time.
    fn refreshed_cmos(&self) -> [u8; 256] {
        let mut cmos = self.cmos;
        if self.status_b().contains(StatusB::SET) {
            return cmos;
        }
        let guest_secs = self.guest_rtc_ns().div_euclid(i128::from(NS_PER_SEC));
        match i64::try_from(guest_secs)
            .ok()
            .and_then(CalendarFields::from_unix_seconds)
        {
            Some(tm) => calendar::write_cmos(&mut cmos, &tm, self.base_year),
            None => tracing::warn!(%guest_secs, "guest RTC time is outside the calendar range"),
        }
        cmos
    }

    fn update_time(&mut self) {
        self.cmos = self.refreshed_cmos();
    }

    /// Re-bases guest time on the calendar bytes. The sub-second offset is kept.
    fn set_time(&mut self) {
        let tm = calendar::read_cmos(&self.cmos, self.base_year);
        self.base_rtc = tm.to_unix_seconds();
        self.last_update_ns = self.clock.now_ns();
        tracing::trace!(base_rtc = self.base_rtc, offset_ns = self.offset_ns, "RTC time set");

        if let Some(cb) = self.callbacks.time_changed.as_mut() {
            let host_secs = self.host_ref_secs.saturating_add(
                (self.last_update_ns.saturating_sub(self.host_ref_ns) / NS_PER_SEC) as i64,
            );
            cb(self.base_rtc.saturating_sub(host_secs));
        }
    }

    fn update_in_progress(&mut self) -> bool {
        if !self.rtc_running() {
            return false;
        }
        if let Some(next_update) = self.update_timer.deadline() {
            // Latch UIP until the update timer fires.
            if self.clock.now_ns() >= next_update.saturating_sub(UIP_WINDOW_NS) {
                self.cmos[REG_STATUS_A as usize] |= REG_A_UIP;
                return true;
            }
        }
        self.guest_subsec_ns() >= NS_PER_SEC - UIP_WINDOW_NS
    }

    fn raise_irq(&mut self) {
        if !self.irq_level {
            self.irq_level = true;
            self.irq.set_level(true);
        }
    }

    fn lower_irq(&mut self) {
        if self.irq_level {
            self.irq_level = false;
            self.irq.set_level(false);
        }
    }

    /// Raises the line for a periodic interrupt and reports whether it was delivered. A raise
    /// while the line is still high is never a new interrupt.
    fn slew_deliver_irq(&mut self) -> bool {
        if self.irq_level {
            return false;
        }
        self.irq_level = true;
        self.irq.raise_edge()
    }

    /// Re-arms the update timer for the next second boundary, or for the alarm when only the
    /// alarm can still change register C.
    fn check_update_timer(&mut self) {
        if self.divider_in_reset() {
            debug_assert_eq!(self.status_a() & REG_A_UIP, 0);
            self.update_timer.cancel();
            return;
        }

        let now = self.clock.now_ns();
        let mut next_update_ns = now + NS_PER_SEC - self.guest_subsec_ns();

        let mut alarm_delay = self.next_alarm_delay_secs();
        if alarm_delay < 1 {
            tracing::warn!(alarm_delay, "alarm delay out of range, clamping to 1s");
            alarm_delay = 1;
        }
        self.next_alarm_ns = next_update_ns.saturating_add((alarm_delay as u64 - 1) * NS_PER_SEC);

        let c = self.status_c();
        if self.status_a() & REG_A_UIP == 0 && c.contains(StatusC::UF) {
            if self.status_b().contains(StatusB::SET) || c.contains(StatusC::AF) {
                self.update_timer.cancel();
                return;
            }
            next_update_ns = self.next_alarm_ns;
        }

        tracing::debug!(
            next_update_ns,
            next_alarm_ns = self.next_alarm_ns,
            alarm_delay,
            "RTC update timer armed"
        );
        self.update_timer.arm(next_update_ns);
    }

    fn update_timer_fired(&mut self) {
        debug_assert!(!self.divider_in_reset());

        self.update_time();
        self.clear_uip();

        let mut irqs = StatusC::UF;
        if self.clock.now_ns() >= self.next_alarm_ns {
            irqs |= StatusC::AF;
            if self.status_b().contains(StatusB::AIE) {
                tracing::debug!("RTC alarm wake request");
                if let Some(wake) = self.callbacks.wake.as_mut() {
                    wake();
                }
            }
        }

        let c = self.status_c();
        let new_irqs = irqs & !c;
        let mut c = c | irqs;
        if new_irqs.bits() & self.status_b().bits() != 0 {
            c |= StatusC::IRQF;
            self.set_status_c(c);
            self.raise_irq();
        } else {
            self.set_status_c(c);
        }
        self.check_update_timer();
    }

    fn next_due(&self, now: u64) -> Option<TimerSource> {
        [
            (TimerSource::Periodic, &self.periodic_timer),
            (TimerSource::Update, &self.update_timer),
            (TimerSource::Coalesced, &self.coalesced_timer),
        ]
        .into_iter()
        .filter(|(_, t)| t.is_due(now))
        .min_by_key(|(_, t)| t.deadline())
        .map(|(source, _)| source)
    }

    /// Fires every timer whose deadline has passed, earliest first.
    pub fn tick(&mut self) {
        let now = self.clock.now_ns();
        while let Some(source) = self.next_due(now) {
            match source {
                TimerSource::Periodic => {
                    self.periodic_timer.cancel();
                    self.periodic_timer_fired();
                }
                TimerSource::Update => {
                    self.update_timer.cancel();
                    self.update_timer_fired();
                }
                TimerSource::Coalesced => {
                    self.coalesced_timer.cancel();
                    self.coalesced_timer_fired();
                }
            }
        }
    }

    /// Earliest pending timer deadline, in clock nanoseconds.
    pub fn next_deadline_ns(&self) -> Option<u64> {
        [
            self.periodic_timer.deadline(),
            self.update_timer.deadline(),
            self.coalesced_timer.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn periodic_deadline_ns(&self) -> Option<u64> {
        self.periodic_timer.deadline()
    }

    pub fn update_deadline_ns(&self) -> Option<u64> {
        self.update_timer.deadline()
    }

    pub fn next_alarm_ns(&self) -> u64 {
        self.next_alarm_ns
    }

    pub fn irq_level(&self) -> bool {
        self.irq_level
    }

    /// Periodic interrupts owed to the guest under [`LostTickPolicy::Slew`].
    pub fn irq_coalesced(&self) -> u32 {
        self.irq_coalesced
    }

    /// Drops the coalesced-interrupt backlog.
    pub fn reset_reinjection(&mut self) {
        self.irq_coalesced = 0;
    }

    /// Selects a register through the primary index port; bit 7 is ignored.
    pub fn select(&mut self, index: u8) {
        self.index = index & 0x7F;
    }

    /// Selects a register through the extended index port (full 8-bit index).
    pub fn select_extended(&mut self, index: u8) {
        self.index = index;
    }

    pub fn selected_index(&self) -> u8 {
        self.index
    }

    /// Reads the selected register.
    pub fn read_data(&mut self) -> u8 {
        let (index, role) = regs::resolve(self.index);
        self.index = index;

        let value = match role {
            RegRole::Calendar => {
                if self.rtc_running() {
                    self.update_time();
                }
                self.cmos[index as usize]
            }
            RegRole::StatusA => {
                let mut a = self.status_a();
                if self.update_in_progress() {
                    a |= REG_A_UIP;
                }
                a
            }
            RegRole::StatusC => self.read_status_c(),
            RegRole::Alarm
            | RegRole::StatusB
            | RegRole::StatusD
            | RegRole::Alias(_)
            | RegRole::Nvram => self.cmos[index as usize],
        };
        tracing::trace!(index, value, "RTC register read");
        value
    }

    /// Writes the selected register.
    pub fn write_data(&mut self, value: u8) {
        let (index, role) = regs::resolve(self.index);
        self.index = index;
        tracing::trace!(index, value, "RTC register write");

        match role {
            RegRole::Alarm => {
                self.cmos[index as usize] = value;
                self.check_update_timer();
            }
            RegRole::Calendar => {
                self.cmos[index as usize] = value;
                // In set mode the bytes are only latched.
                if self.rtc_running() {
                    self.set_time();
                    self.check_update_timer();
                }
            }
            RegRole::StatusA => self.write_status_a(value),
            RegRole::StatusB => self.write_status_b(value),
            RegRole::StatusC | RegRole::StatusD => {}
            RegRole::Alias(_) | RegRole::Nvram => self.cmos[index as usize] = value,
        }
    }

    pub fn read_register(&mut self, index: u8) -> u8 {
        self.index = index;
        self.read_data()
    }

    pub fn write_register(&mut self, index: u8, value: u8) {
        self.index = index;
        self.write_data(value);
    }

    /// Raw register byte, without any read side effects.
    pub fn raw_byte(&self, index: u8) -> u8 {
        self.cmos[index as usize]
    }

    /// Stores a raw register byte, without any write side effects.
    pub fn set_raw_byte(&mut self, index: u8, value: u8) {
        self.cmos[index as usize] = value;
    }

    fn read_status_c(&mut self) -> u8 {
        let ret = self.status_c();
        self.lower_irq();
        self.set_status_c(StatusC::empty());
        if ret.intersects(StatusC::UF | StatusC::AF) {
            self.check_update_timer();
        }

        if self.irq_coalesced != 0
            && self.status_b().contains(StatusB::PIE)
            && self.irq_reinject_on_ack_count < periodic::MAX_REINJECT_ON_ACK
        {
            self.irq_reinject_on_ack_count += 1;
            self.set_status_c(StatusC::IRQF | StatusC::PF);
            if self.slew_deliver_irq() {
                self.irq_coalesced -= 1;
            }
            tracing::debug!(
                irq_coalesced = self.irq_coalesced,
                reinjected = self.irq_reinject_on_ack_count,
                "RTC periodic interrupt re-injected on ack"
            );
        }
        ret.bits()
    }

    fn write_status_a(&mut self, data: u8) {
        let old_a = self.status_a();
        let rate_changed = (old_a ^ data) & regs::REG_A_RATE_MASK != 0;
        let old_period = self.periodic_ticks();

        if data & REG_A_DIVIDER_RESET == REG_A_DIVIDER_RESET {
            if self.rtc_running() {
                self.update_time();
            }
            self.clear_uip();
        } else if old_a & REG_A_DIVIDER_RESET == REG_A_DIVIDER_RESET && Self::divider_running(data)
        {
            if !self.status_b().contains(StatusB::SET) {
                self.offset_ns = FIRST_UPDATE_OFFSET_NS;
                self.set_time();
            }
            self.clear_uip();
        }
        // UIP is read-only.
        self.cmos[REG_STATUS_A as usize] = (data & !REG_A_UIP) | (self.status_a() & REG_A_UIP);

        if rate_changed {
            let now = self.clock.now_ns();
            self.periodic_timer_update(now, old_period, true);
        }
        self.check_update_timer();
    }

    fn write_status_b(&mut self, data: u8) {
        let mut data = StatusB::from_bits_retain(data);
        let old_b = self.status_b();
        let pie_changed = (old_b ^ data).contains(StatusB::PIE);
        let old_period = self.periodic_ticks();

        if data.contains(StatusB::SET) {
            if self.rtc_running() {
                self.update_time();
            }
            self.clear_uip();
            data.remove(StatusB::UIE);
        } else if old_b.contains(StatusB::SET) && Self::divider_running(self.status_a()) {
            self.offset_ns = FIRST_UPDATE_OFFSET_NS;
            self.set_time();
        }

        // A flag that is already pending raises the line as soon as its enable is set.
        let mut c = self.status_c();
        if data.bits() & c.bits() & StatusC::SOURCES.bits() != 0 {
            c |= StatusC::IRQF;
            self.set_status_c(c);
            self.raise_irq();
        } else {
            c.remove(StatusC::IRQF);
            self.set_status_c(c);
            self.lower_irq();
        }
        self.cmos[REG_STATUS_B as usize] = data.bits();

        if pie_changed {
            let now = self.clock.now_ns();
            self.periodic_timer_update(now, old_period, true);
        }
        self.check_update_timer();
    }

    /// Power-on reset. Calendar and NVRAM bytes survive.
    pub fn reset(&mut self) {
        let b = self.status_b() - (StatusB::PIE | StatusB::AIE | StatusB::SQWE);
        self.cmos[REG_STATUS_B as usize] = b.bits();
        let c = self.status_c() - (StatusC::UF | StatusC::IRQF | StatusC::PF | StatusC::AF);
        self.set_status_c(c);
        self.check_update_timer();

        if self.cfg.lost_tick_policy == LostTickPolicy::Slew {
            self.irq_coalesced = 0;
            self.irq_reinject_on_ack_count = 0;
        }
        // PIE is now clear, so this tears the periodic timer down.
        let now = self.clock.now_ns();
        self.periodic_timer_update(now, self.period, false);

        self.irq_level = false;
        self.irq.set_level(false);
        tracing::debug!("RTC reset");
    }

    /// Current guest calendar, normalised. Returns `None` if the guest programmed a date the
    /// calendar cannot represent.
    pub fn date_time(&mut self) -> Option<RtcDateTime> {
        self.update_time();
        let secs = calendar::read_cmos(&self.cmos, self.base_year).to_unix_seconds();
        CalendarFields::from_unix_seconds(secs).map(|tm| RtcDateTime::from_fields(&tm))
    }

    /// Marks the shutdown status byte so firmware resumes from S3.
    pub fn notify_suspend(&mut self) {
        self.cmos[REG_SHUTDOWN_STATUS as usize] = SHUTDOWN_S3_RESUME;
    }

    fn port_read_u8(&mut self, port: u16) -> u8 {
        let io = self.cfg.io_base;
        let ext = self.cfg.extended_io_base;
        if port == io {
            // The primary index port is write-only.
            0xFF
        } else if port == io.wrapping_add(1) {
            self.read_data()
        } else if port == ext {
            self.index
        } else if port == ext.wrapping_add(1) {
            if self.index > 0x7F {
                self.cmos[self.index as usize]
            } else {
                self.read_data()
            }
        } else {
            0xFF
        }
    }

    fn port_write_u8(&mut self, port: u16, value: u8) {
        let io = self.cfg.io_base;
        let ext = self.cfg.extended_io_base;
        if port == io {
            self.select(value);
        } else if port == io.wrapping_add(1) {
            self.write_data(value);
        } else if port == ext {
            self.select_extended(value);
        } else if port == ext.wrapping_add(1) {
            if self.index > 0x7F {
                self.cmos[self.index as usize] = value;
            } else {
                self.write_data(value);
            }
        }
    }
}

impl<C: Clock, I: IrqLine> PortIoDevice for RtcCmos<C, I> {
    /// Wider accesses are split into byte accesses on consecutive ports.
    fn read(&mut self, port: u16, size: u8) -> u32 {
        let mut value = 0u32;
        for i in 0..size.min(4) {
            let byte = self.port_read_u8(port.wrapping_add(u16::from(i)));
            value |= u32::from(byte) << (8 * u32::from(i));
        }
        value
    }

    fn write(&mut self, port: u16, size: u8, value: u32) {
        for i in 0..size.min(4) {
            let byte = (value >> (8 * u32::from(i))) as u8;
            self.port_write_u8(port.wrapping_add(u16::from(i)), byte);
        }
    }

    fn reset(&mut self) {
        RtcCmos::reset(self);
    }
}

/// Per-port handle onto a shared RTC.
pub struct RtcCmosPort<C: Clock, I: IrqLine> {
    rtc: SharedRtcCmos<C, I>,
    port: u16,
}

impl<C: Clock, I: IrqLine> RtcCmosPort<C, I> {
    fn new(rtc: SharedRtcCmos<C, I>, port: u16) -> Self {
        Self { rtc, port }
    }
}

impl<C: Clock, I: IrqLine> PortIoDevice for RtcCmosPort<C, I> {
    fn read(&mut self, port: u16, size: u8) -> u32 {
        debug_assert_eq!(port, self.port);
        self.rtc.borrow_mut().read(port, size)
    }

    fn write(&mut self, port: u16, size: u8, value: u32) {
        debug_assert_eq!(port, self.port);
        self.rtc.borrow_mut().write(port, size, value);
    }

    fn reset(&mut self) {
        // Every port of the device sees the bus reset; only the index port resets the RTC.
        let io_base = self.rtc.borrow().cfg.io_base;
        if self.port == io_base {
            self.rtc.borrow_mut().reset();
        }
    }
}

/// Registers the primary and extended index/data port pairs on an [`IoPortBus`].
pub fn register_rtc_cmos<C: Clock + 'static, I: IrqLine + 'static>(
    bus: &mut IoPortBus,
    rtc: SharedRtcCmos<C, I>,
) -> Result<(), RtcConfigError> {
    let cfg = rtc.borrow().cfg();
    let ports = [
        cfg.io_base,
        cfg.io_base.wrapping_add(1),
        cfg.extended_io_base,
        cfg.extended_io_base.wrapping_add(1),
    ];
    if let Some(&port) = ports.iter().find(|&&port| bus.is_registered(port)) {
        return Err(RtcConfigError::IoPortOverlap { port });
    }
    for base in [cfg.io_base, cfg.extended_io_base] {
        bus.register_shared_range(base, 2, |port| {
            Box::new(RtcCmosPort::new(rtc.clone(), port))
        });
    }
    Ok(())
}

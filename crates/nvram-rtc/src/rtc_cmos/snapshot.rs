use nvram_io_snapshot::codec::{Decoder, Encoder};
use nvram_io_snapshot::{
    IoSnapshot, SnapshotError, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter,
};

use crate::clock::Clock;
use crate::irq::IrqLine;

use super::periodic::{deadline_to_clock, ns_to_clock};
use super::{LostTickPolicy, RtcCmos};

const TAG_CMOS: u16 = 1;
const TAG_INDEX: u16 = 2;
const TAG_BASE_RTC: u16 = 3;
const TAG_LAST_UPDATE_NS: u16 = 4;
const TAG_OFFSET_NS: u16 = 5;
/// Periodic deadline, period, update deadline, alarm deadline and (1.3+) catch-up deadline.
const TAG_TIMERS: u16 = 6;
const TAG_IRQ_COALESCED: u16 = 7;
const TAG_REINJECT_ON_ACK: u16 = 8;
const TAG_IRQ_LEVEL: u16 = 9;

/// Device state as stored in a snapshot, after migration to the current minor version.
#[derive(Debug, Clone)]
struct SavedState {
    cmos: [u8; 256],
    index: u8,
    base_rtc: i64,
    last_update_ns: u64,
    offset_ns: i64,
    next_periodic_ns: u64,
    irq_coalesced: u32,
    update_deadline_ns: Option<u64>,
    next_alarm_ns: u64,
    coalesced_deadline_ns: Option<u64>,
    irq_reinject_on_ack_count: u16,
    irq_level: bool,
    /// Guest time must be re-derived from the calendar bytes after loading.
    resync_time: bool,
}

impl SavedState {
    fn decode(r: &SnapshotReader<'_>, minor: u16) -> SnapshotResult<Self> {
        let cmos_bytes = r
            .bytes(TAG_CMOS)
            .ok_or(SnapshotError::InvalidFieldEncoding("rtc cmos missing"))?;
        let cmos: [u8; 256] = cmos_bytes
            .try_into()
            .map_err(|_| SnapshotError::InvalidFieldEncoding("rtc cmos length"))?;

        let mut next_periodic_ns = 0;
        let mut update_deadline_ns = None;
        let mut next_alarm_ns = 0;
        let mut coalesced_deadline_ns = None;
        if let Some(buf) = r.bytes(TAG_TIMERS) {
            let mut d = Decoder::new(buf);
            next_periodic_ns = d.u64()?;
            // The period is recomputed from registers A and B.
            let _period = d.u32()?;
            update_deadline_ns = Some(d.u64()?).filter(|&ns| ns != 0);
            next_alarm_ns = d.u64()?;
            if minor >= 3 {
                coalesced_deadline_ns = Some(d.u64()?).filter(|&ns| ns != 0);
            }
            d.finish()?;
        }

        Ok(Self {
            cmos,
            index: r.u8(TAG_INDEX)?.unwrap_or(0),
            base_rtc: r.i64(TAG_BASE_RTC)?.unwrap_or(0),
            last_update_ns: r.u64(TAG_LAST_UPDATE_NS)?.unwrap_or(0),
            offset_ns: r.i64(TAG_OFFSET_NS)?.unwrap_or(0),
            next_periodic_ns,
            irq_coalesced: r.u32(TAG_IRQ_COALESCED)?.unwrap_or(0),
            update_deadline_ns,
            next_alarm_ns,
            coalesced_deadline_ns,
            irq_reinject_on_ack_count: r.u16(TAG_REINJECT_ON_ACK)?.unwrap_or(0),
            irq_level: r.bool(TAG_IRQ_LEVEL)?.unwrap_or(false),
            resync_time: false,
        })
    }

    /// Brings a snapshot written by an older minor version up to the current layout.
    fn migrate(self, from_minor: u16) -> Self {
        let mut state = self;
        if from_minor < 1 {
            state = state.migrate_1_0_to_1_1();
        }
        if from_minor < 2 {
            state = state.migrate_1_1_to_1_2();
        }
        if from_minor < 3 {
            state = state.migrate_1_2_to_1_3();
        }
        state
    }

    /// 1.0 did not track the sub-second offset.
    fn migrate_1_0_to_1_1(mut self) -> Self {
        self.offset_ns = 0;
        self.resync_time = true;
        self
    }

    /// 1.1 did not track re-injections per acknowledgment.
    fn migrate_1_1_to_1_2(mut self) -> Self {
        self.irq_reinject_on_ack_count = 0;
        self
    }

    /// 1.2 did not save the catch-up deadline; it is re-armed from the restore time.
    fn migrate_1_2_to_1_3(mut self) -> Self {
        self.coalesced_deadline_ns = None;
        self
    }
}

impl<C: Clock, I: IrqLine> IoSnapshot for RtcCmos<C, I> {
    const DEVICE_ID: [u8; 4] = *b"RTCC";
    const DEVICE_VERSION: SnapshotVersion = SnapshotVersion::new(1, 3);

    fn save_state(&self) -> Vec<u8> {
        let mut w = SnapshotWriter::new(Self::DEVICE_ID, Self::DEVICE_VERSION);
        w.field_bytes(TAG_CMOS, self.refreshed_cmos().to_vec());
        w.field_u8(TAG_INDEX, self.index);
        w.field_i64(TAG_BASE_RTC, self.base_rtc);
        w.field_u64(TAG_LAST_UPDATE_NS, self.last_update_ns);
        w.field_i64(TAG_OFFSET_NS, self.offset_ns);
        let timers = Encoder::new()
            .u64(self.next_periodic_ns)
            .u32(self.period)
            .u64(self.update_timer.deadline().unwrap_or(0))
            .u64(self.next_alarm_ns)
            .u64(self.coalesced_timer.deadline().unwrap_or(0))
            .finish();
        w.field_bytes(TAG_TIMERS, timers);
        w.field_u32(TAG_IRQ_COALESCED, self.irq_coalesced);
        w.field_u16(TAG_REINJECT_ON_ACK, self.irq_reinject_on_ack_count);
        w.field_bool(TAG_IRQ_LEVEL, self.irq_level);
        w.finish()
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        let r = SnapshotReader::parse(bytes, Self::DEVICE_ID)?;
        r.ensure_device_major(Self::DEVICE_VERSION.major)?;
        let minor = r.header().device_version.minor;

        let state = SavedState::decode(&r, minor)?.migrate(minor);

        self.cmos = state.cmos;
        self.index = state.index;
        self.base_rtc = state.base_rtc;
        self.last_update_ns = state.last_update_ns;
        self.offset_ns = state.offset_ns;
        self.next_periodic_ns = state.next_periodic_ns;
        self.irq_coalesced = state.irq_coalesced;
        self.next_alarm_ns = state.next_alarm_ns;
        self.irq_reinject_on_ack_count = state.irq_reinject_on_ack_count;
        match state.update_deadline_ns {
            Some(deadline) => self.update_timer.arm(deadline),
            None => self.update_timer.cancel(),
        }
        self.coalesced_timer.cancel();

        if state.resync_time {
            self.set_time();
            self.offset_ns = 0;
            self.check_update_timer();
        }

        let recomputed = self.restore_periodic_timer();

        if self.cfg.lost_tick_policy == LostTickPolicy::Slew {
            match state.coalesced_deadline_ns {
                Some(deadline) if !recomputed && self.irq_coalesced != 0 => {
                    self.coalesced_timer.arm(deadline)
                }
                _ => self.coalesced_timer_update(),
            }
        }

        self.irq_level = false;
        if state.irq_level {
            self.raise_irq();
        } else {
            self.irq.set_level(false);
        }
        tracing::debug!(
            version = %r.header().device_version,
            resynced = state.resync_time,
            "RTC state restored"
        );
        Ok(())
    }
}

impl<C: Clock, I: IrqLine> RtcCmos<C, I> {
    /// Re-arms the periodic timer after a restore, recomputing the deadline only if the clock
    /// moved back before the last interrupt or jumped too far past the next one.
    ///
    /// Returns whether the deadline was recomputed.
    fn restore_periodic_timer(&mut self) -> bool {
        self.period = self.periodic_ticks();
        if self.period == 0 {
            // No backlog is owed while periodic interrupts are disabled.
            self.irq_coalesced = 0;
            self.periodic_timer.cancel();
            self.coalesced_timer.cancel();
            return false;
        }
        self.periodic_timer.arm(self.next_periodic_ns);

        if self.cfg.replay_deterministic {
            return false;
        }
        let now = self.clock.now_ns();
        let last_periodic_clock =
            deadline_to_clock(self.next_periodic_ns).saturating_sub(u64::from(self.period));
        let jumped_back = ns_to_clock(now) < last_periodic_clock;
        let jumped_forward = now > self.next_periodic_ns.saturating_add(self.cfg.max_clock_jump_ns);
        if jumped_back || jumped_forward {
            tracing::warn!(
                now,
                next_periodic_ns = self.next_periodic_ns,
                "RTC clock discontinuity on restore, recomputing periodic deadline"
            );
            self.periodic_timer_update(now, self.period, false);
        }
        jumped_back || jumped_forward
    }
}

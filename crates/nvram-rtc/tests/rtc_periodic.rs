use nvram_rtc::clock::ManualClock;
use nvram_rtc::irq::IrqLine;
use nvram_rtc::{LostTickPolicy, RtcCmos, RtcConfig, RtcStartTime};
use std::cell::Cell;
use std::rc::Rc;

const START: i64 = 946_684_800 + 12 * 3600 + 59 * 60 + 59;

#[derive(Clone, Default)]
struct TestIrq {
    level: Rc<Cell<bool>>,
    raises: Rc<Cell<u32>>,
}

impl IrqLine for TestIrq {
    fn set_level(&self, level: bool) {
        if level && !self.level.get() {
            self.raises.set(self.raises.get() + 1);
        }
        self.level.set(level);
    }
}

type Rtc = RtcCmos<ManualClock, TestIrq>;

fn rtc_with_policy(policy: LostTickPolicy) -> (ManualClock, TestIrq, Rtc) {
    let clock = ManualClock::new();
    let irq = TestIrq::default();
    let cfg = RtcConfig {
        start_time: RtcStartTime::UnixSeconds(START),
        lost_tick_policy: policy,
        ..RtcConfig::default()
    };
    let rtc = RtcCmos::with_config(clock.clone(), irq.clone(), cfg).unwrap();
    (clock, irq, rtc)
}

/// Nanosecond offset of a 32.768 kHz reference tick.
fn grid_ns(ticks: u64) -> u64 {
    ticks * 1_000_000_000 / 32_768
}

/// Deadline of the `n`th interrupt at the 1024 Hz power-on rate when enabled at time 0.
fn deadline(n: u64) -> u64 {
    grid_ns(32 * n) + 1
}

fn enable_periodic(rtc: &mut Rtc) {
    rtc.write_register(0x0B, 0x42);
}

#[test]
fn first_periodic_interrupt_lands_on_the_grid() {
    let (clock, irq, mut rtc) = rtc_with_policy(LostTickPolicy::Discard);
    enable_periodic(&mut rtc);
    assert_eq!(rtc.periodic_deadline_ns(), Some(deadline(1)));
    assert_eq!(rtc.next_deadline_ns(), Some(deadline(1)));

    clock.set_ns(deadline(1) - 1);
    rtc.tick();
    assert!(!irq.level.get());

    clock.set_ns(deadline(1));
    rtc.tick();
    assert!(irq.level.get());
    assert_eq!(rtc.periodic_deadline_ns(), Some(deadline(2)));
    assert_eq!(rtc.read_register(0x0C), 0xC0);
    assert!(!irq.level.get());
}

#[test]
fn clearing_pie_stops_periodic_interrupts() {
    let (clock, irq, mut rtc) = rtc_with_policy(LostTickPolicy::Discard);
    enable_periodic(&mut rtc);

    clock.set_ns(deadline(1));
    rtc.tick();
    rtc.read_register(0x0C);

    rtc.write_register(0x0B, 0x02);
    assert_eq!(rtc.periodic_deadline_ns(), None);
    clock.set_ns(deadline(3));
    rtc.tick();
    assert!(!irq.level.get());
    assert_eq!(rtc.read_register(0x0C), 0x00);
}

#[test]
fn clearing_pie_keeps_a_latched_pf() {
    let (clock, irq, mut rtc) = rtc_with_policy(LostTickPolicy::Discard);
    enable_periodic(&mut rtc);

    clock.set_ns(deadline(1));
    rtc.tick();
    assert!(irq.level.get());

    rtc.write_register(0x0B, 0x02);
    assert!(!irq.level.get());
    assert!(!rtc.irq_level());
    assert_eq!(rtc.read_register(0x0C), 0x40);
    assert_eq!(rtc.read_register(0x0C), 0x00);
}

#[test]
fn discard_fires_once_for_a_backlog() {
    let (clock, irq, mut rtc) = rtc_with_policy(LostTickPolicy::Discard);
    enable_periodic(&mut rtc);

    let now = 10_000_000;
    clock.set_ns(now);
    rtc.tick();

    assert_eq!(irq.raises.get(), 1);
    assert_eq!(rtc.irq_coalesced(), 0);
    let next = rtc.periodic_deadline_ns().unwrap();
    assert!(next > now && next <= now + grid_ns(32) + 1, "next={next}");
    assert_eq!(next, deadline(11));

    assert_eq!(rtc.read_register(0x0C), 0xC0);
    assert_eq!(rtc.read_register(0x0C), 0x00);
    assert!(!irq.level.get());
}

#[test]
fn rate_change_counts_from_the_last_interrupt() {
    let (clock, _irq, mut rtc) = rtc_with_policy(LostTickPolicy::Discard);
    enable_periodic(&mut rtc);

    // Half way through the first 32-tick period, switch to 64 ticks.
    clock.set_ns(500_000);
    rtc.write_register(0x0A, 0x27);
    assert_eq!(rtc.periodic_deadline_ns(), Some(grid_ns(64) + 1));
}

#[test]
fn rate_zero_disables_periodic_interrupts() {
    let (clock, _irq, mut rtc) = rtc_with_policy(LostTickPolicy::Discard);
    enable_periodic(&mut rtc);
    clock.set_ns(100_000);
    rtc.write_register(0x0A, 0x20);
    assert_eq!(rtc.periodic_deadline_ns(), None);
}

#[test]
fn slew_counts_undelivered_interrupts() {
    let (clock, irq, mut rtc) = rtc_with_policy(LostTickPolicy::Slew);
    enable_periodic(&mut rtc);

    clock.set_ns(deadline(5));
    rtc.tick();

    // One delivered, four coalesced behind the still-high line.
    assert_eq!(irq.raises.get(), 1);
    assert_eq!(rtc.irq_coalesced(), 4);
    assert_eq!(rtc.periodic_deadline_ns(), Some(deadline(6)));
    // Catch-up interval is a fifth of the period.
    assert_eq!(rtc.next_deadline_ns(), Some(deadline(5) + grid_ns(32 / 5)));

    // Acknowledging re-injects one owed interrupt.
    assert_eq!(rtc.read_register(0x0C), 0xC0);
    assert!(irq.level.get());
    assert_eq!(irq.raises.get(), 2);
    assert_eq!(rtc.irq_coalesced(), 3);
}

#[test]
fn slew_reinjection_on_ack_is_bounded() {
    let (clock, irq, mut rtc) = rtc_with_policy(LostTickPolicy::Slew);
    enable_periodic(&mut rtc);

    clock.set_ns(deadline(31));
    rtc.tick();
    assert_eq!(rtc.irq_coalesced(), 30);

    for _ in 0..20 {
        assert_eq!(rtc.read_register(0x0C), 0xC0);
    }
    assert_eq!(rtc.irq_coalesced(), 10);
    assert!(irq.level.get());

    // The 21st acknowledgment does not re-inject.
    assert_eq!(rtc.read_register(0x0C), 0xC0);
    assert!(!irq.level.get());
    for _ in 0..5 {
        assert_eq!(rtc.read_register(0x0C), 0x00);
    }
    assert_eq!(rtc.irq_coalesced(), 10);
}

#[test]
fn slew_catch_up_timer_delivers_once_the_line_drops() {
    let (clock, irq, mut rtc) = rtc_with_policy(LostTickPolicy::Slew);
    enable_periodic(&mut rtc);

    clock.set_ns(deadline(31));
    rtc.tick();
    for _ in 0..21 {
        rtc.read_register(0x0C);
    }
    assert!(!irq.level.get());
    assert_eq!(rtc.irq_coalesced(), 10);

    // With 8+ owed interrupts the catch-up timer runs at 8x the periodic rate.
    let catch_up = deadline(31) + grid_ns(32 / 8);
    assert!(catch_up < deadline(32));
    clock.set_ns(catch_up);
    rtc.tick();

    assert!(irq.level.get());
    assert_eq!(rtc.irq_coalesced(), 9);
    assert_eq!(rtc.read_register(0x0C), 0xC0);
}

#[test]
fn slew_backlog_is_dropped_on_demand_and_when_pie_clears() {
    let (clock, _irq, mut rtc) = rtc_with_policy(LostTickPolicy::Slew);
    enable_periodic(&mut rtc);

    clock.set_ns(deadline(5));
    rtc.tick();
    rtc.reset_reinjection();
    assert_eq!(rtc.irq_coalesced(), 0);

    clock.set_ns(deadline(9));
    rtc.tick();
    assert_eq!(rtc.irq_coalesced(), 4);
    rtc.write_register(0x0B, 0x02);
    assert_eq!(rtc.irq_coalesced(), 0);
    assert_eq!(rtc.next_deadline_ns(), rtc.update_deadline_ns());
}

#![forbid(unsafe_code)]

pub mod clock;
pub mod irq;
pub mod rtc_cmos;

pub use rtc_cmos::{
    register_rtc_cmos, LostTickPolicy, RtcCallbacks, RtcCmos, RtcConfig, RtcConfigError,
    RtcDateTime, RtcStartTime, SharedRtcCmos,
};

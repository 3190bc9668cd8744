//! Port I/O plumbing shared by the NVRAM/RTC device models.

#![forbid(unsafe_code)]

pub mod io;

pub use io::{IoPortBus, PortIoDevice};

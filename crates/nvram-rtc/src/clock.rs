use std::cell::Cell;
use std::rc::Rc;

/// Monotonic host time source, in nanoseconds.
pub trait Clock {
    fn now_ns(&self) -> u64;
}

/// Clock that never advances.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullClock;

impl Clock for NullClock {
    fn now_ns(&self) -> u64 {
        0
    }
}

/// Manually driven clock. Clones share the same underlying time.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now_ns: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ns(&self, ns: u64) {
        self.now_ns.set(ns);
    }

    pub fn advance_ns(&self, delta_ns: u64) {
        self.now_ns.set(self.now_ns.get().saturating_add(delta_ns));
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.get()
    }
}

impl<T: Clock + ?Sized> Clock for Rc<T> {
    fn now_ns(&self) -> u64 {
        (**self).now_ns()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_time() {
        let a = ManualClock::new();
        let b = a.clone();
        a.set_ns(10);
        b.advance_ns(5);
        assert_eq!(a.now_ns(), 15);
        assert_eq!(NullClock.now_ns(), 0);
    }
}

/// Single pending deadline for one interrupt source.
///
/// Arming replaces any previous deadline, so a source never has two deadlines pending.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OneShotTimer {
    deadline_ns: Option<u64>,
}

impl OneShotTimer {
    pub(crate) fn arm(&mut self, deadline_ns: u64) {
        self.deadline_ns = Some(deadline_ns);
    }

    pub(crate) fn cancel(&mut self) {
        self.deadline_ns = None;
    }

    pub(crate) fn deadline(&self) -> Option<u64> {
        self.deadline_ns
    }

    pub(crate) fn is_due(&self, now_ns: u64) -> bool {
        self.deadline_ns.is_some_and(|deadline| deadline <= now_ns)
    }
}

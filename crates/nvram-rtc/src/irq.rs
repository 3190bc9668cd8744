use std::rc::Rc;

/// Interrupt line driven by a device model.
pub trait IrqLine {
    fn set_level(&self, level: bool);

    /// Raises the line and reports whether the interrupt controller saw a new edge.
    ///
    /// Hosts that can detect coalesced interrupts override this; the default assumes every
    /// raise is delivered.
    fn raise_edge(&self) -> bool {
        self.set_level(true);
        true
    }
}

/// Interrupt sink that drops every assertion.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIrq;

impl IrqLine for NoIrq {
    fn set_level(&self, _level: bool) {}
}

impl<T: IrqLine + ?Sized> IrqLine for Box<T> {
    fn set_level(&self, level: bool) {
        (**self).set_level(level)
    }

    fn raise_edge(&self) -> bool {
        (**self).raise_edge()
    }
}

impl<T: IrqLine + ?Sized> IrqLine for Rc<T> {
    fn set_level(&self, level: bool) {
        (**self).set_level(level)
    }

    fn raise_edge(&self) -> bool {
        (**self).raise_edge()
    }
}

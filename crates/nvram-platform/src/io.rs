use std::collections::HashMap;

pub trait PortIoDevice {
    fn read(&mut self, port: u16, size: u8) -> u32;
    fn write(&mut self, port: u16, size: u8, value: u32);

    /// Reset the device back to its power-on state.
    fn reset(&mut self) {}
}

/// Dispatches x86-style port accesses to per-port handlers.
///
/// Unmapped ports float high on reads and swallow writes.
pub struct IoPortBus {
    devices: HashMap<u16, Box<dyn PortIoDevice>>,
}

impl IoPortBus {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
        }
    }

    pub fn register(&mut self, port: u16, device: Box<dyn PortIoDevice>) {
        if self.devices.insert(port, device).is_some() {
            tracing::warn!(port = format_args!("{port:#x}"), "replaced existing port handler");
        }
    }

    /// Unregister an I/O port handler, returning the removed device (if any).
    pub fn unregister(&mut self, port: u16) -> Option<Box<dyn PortIoDevice>> {
        self.devices.remove(&port)
    }

    pub fn is_registered(&self, port: u16) -> bool {
        self.devices.contains_key(&port)
    }

    /// Register a device for a contiguous range of I/O ports.
    ///
    /// The provided factory is invoked once per port. It can be used to build
    /// per-port wrapper devices that share a single underlying implementation
    /// (e.g. via `Rc<RefCell<...>>`).
    pub fn register_shared_range<F>(&mut self, start: u16, len: u16, mut make: F)
    where
        F: FnMut(u16) -> Box<dyn PortIoDevice>,
    {
        for offset in 0..len {
            let port = start.wrapping_add(offset);
            self.register(port, make(port));
        }
    }

    pub fn read(&mut self, port: u16, size: u8) -> u32 {
        if size == 0 {
            return 0;
        }
        // Only {1,2,4} are valid port widths; anything else floats high.
        if !matches!(size, 1 | 2 | 4) {
            return 0xFFFF_FFFF;
        }
        if let Some(dev) = self.devices.get_mut(&port) {
            return dev.read(port, size);
        }

        match size {
            1 => 0xFF,
            2 => 0xFFFF,
            _ => 0xFFFF_FFFF,
        }
    }

    pub fn write(&mut self, port: u16, size: u8, value: u32) {
        if !matches!(size, 1 | 2 | 4) {
            return;
        }
        if let Some(device) = self.devices.get_mut(&port) {
            device.write(port, size, value);
        }
    }

    pub fn read_u8(&mut self, port: u16) -> u8 {
        self.read(port, 1) as u8
    }

    pub fn write_u8(&mut self, port: u16, value: u8) {
        self.write(port, 1, value as u32);
    }

    pub fn reset(&mut self) {
        for dev in self.devices.values_mut() {
            dev.reset();
        }
    }
}

impl Default for IoPortBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    struct Latch {
        value: u8,
        resets: u32,
    }

    struct LatchPort {
        state: Rc<RefCell<Latch>>,
    }

    impl PortIoDevice for LatchPort {
        fn read(&mut self, _port: u16, _size: u8) -> u32 {
            u32::from(self.state.borrow().value)
        }

        fn write(&mut self, _port: u16, _size: u8, value: u32) {
            self.state.borrow_mut().value = value as u8;
        }

        fn reset(&mut self) {
            let mut state = self.state.borrow_mut();
            state.value = 0;
            state.resets += 1;
        }
    }

    #[test]
    fn unmapped_ports_float_high() {
        let mut bus = IoPortBus::new();
        assert_eq!(bus.read(0x80, 1), 0xFF);
        assert_eq!(bus.read(0x80, 2), 0xFFFF);
        assert_eq!(bus.read(0x80, 4), 0xFFFF_FFFF);
        assert_eq!(bus.read(0x80, 3), 0xFFFF_FFFF);
        assert_eq!(bus.read(0x80, 0), 0);
        bus.write(0x80, 1, 0x12);
    }

    #[test]
    fn shared_range_routes_to_one_backing_state() {
        let mut bus = IoPortBus::new();
        let state = Rc::new(RefCell::new(Latch::default()));
        bus.register_shared_range(0x70, 2, {
            let state = state.clone();
            move |_port| Box::new(LatchPort { state: state.clone() })
        });

        assert!(bus.is_registered(0x71));
        assert!(!bus.is_registered(0x72));

        bus.write_u8(0x70, 0x5A);
        assert_eq!(bus.read_u8(0x71), 0x5A);

        bus.reset();
        assert_eq!(bus.read_u8(0x70), 0);
        // One reset per registered port.
        assert_eq!(state.borrow().resets, 2);

        assert!(bus.unregister(0x70).is_some());
        assert_eq!(bus.read_u8(0x70), 0xFF);
    }
}

use log::{debug, error, trace};

use super::peripheral::display::cga::DisplayAdapter;
use super::peripheral::pic_8259::{Acknowledge, PIC8259, MASTER_BASE};
use super::peripheral::{InstallError, Peripheral, PeripheralClass};

/// Handle into the bus device registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceId(pub usize);

const PORT_COUNT: usize = 0x10000;

/// Ownership map of the I/O port space and the memory windows.
pub struct IoMap {
    ports: Vec<Option<DeviceId>>,
    mem: Vec<(u32, u32, DeviceId)>,
}

impl IoMap {
    fn new() -> Self {
        Self {
            ports: vec![None; PORT_COUNT],
            mem: Vec::new(),
        }
    }

    fn port_owner(&self, port: u16) -> Option<DeviceId> {
        self.ports[port as usize]
    }

    fn mem_owner(&self, addr: u32) -> Option<DeviceId> {
        self.mem
            .iter()
            .find(|(first, last, _)| (*first..=*last).contains(&addr))
            .map(|(_, _, id)| *id)
    }

    fn release(&mut self, id: DeviceId) {
        self.ports
            .iter_mut()
            .filter(|owner| **owner == Some(id))
            .for_each(|owner| *owner = None);
        self.mem.retain(|(_, _, owner)| *owner != id);
    }
}

/// Handed to [`Peripheral::install`] so a device can claim its ranges.
pub struct Installer<'a> {
    map: &'a mut IoMap,
    id: DeviceId,
    device: &'static str,
}

impl Installer<'_> {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn install_io(&mut self, first: u16, last: u16) -> Result<(), InstallError> {
        for port in first..=last {
            if let Some(owner) = self.map.port_owner(port) {
                return Err(InstallError::PortConflict {
                    device: self.device,
                    port,
                    owner,
                });
            }
        }

        for port in first..=last {
            self.map.ports[port as usize] = Some(self.id);
        }

        Ok(())
    }

    pub fn install_mem(&mut self, first: u32, last: u32) -> Result<(), InstallError> {
        let conflict = self
            .map
            .mem
            .iter()
            .find(|(start, end, _)| first <= *end && *start <= last);

        if let Some((start, _, owner)) = conflict {
            return Err(InstallError::MemoryConflict {
                device: self.device,
                addr: first.max(*start),
                owner: *owner,
            });
        }

        self.map.mem.push((first, last, self.id));
        Ok(())
    }
}

pub struct Bus {
    devices: Vec<Box<dyn Peripheral>>,
    io: IoMap,
    primary_pic: Option<DeviceId>,
}

impl Default for Bus {
    fn default() -> Self {
        Bus::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            io: IoMap::new(),
            primary_pic: None,
        }
    }

    pub fn attach<P: Peripheral + 'static>(&mut self, device: P) -> Result<DeviceId, InstallError> {
        self.attach_boxed(Box::new(device))
    }

    /// Installs the device. On a range conflict nothing the device claimed
    /// stays registered and the device is dropped.
    pub fn attach_boxed(&mut self, mut device: Box<dyn Peripheral>) -> Result<DeviceId, InstallError> {
        let id = DeviceId(self.devices.len());
        let mut installer = Installer {
            map: &mut self.io,
            id,
            device: device.name(),
        };

        if let Err(err) = device.install(&mut installer) {
            error!("{err}");
            self.io.release(id);
            return Err(err);
        }

        debug!("Installed {} as device {}", device.name(), id.0);

        if device.class() == PeripheralClass::InterruptController && self.primary_pic.is_none() {
            self.primary_pic = Some(id);
        }

        self.devices.push(device);

        Ok(id)
    }

    /// Links the controller at the conventional master address to the first
    /// other interrupt controller found in the registry. Links that already
    /// exist are left alone.
    pub fn wire_cascade(&mut self) {
        let pics: Vec<DeviceId> = (0..self.devices.len())
            .map(DeviceId)
            .filter(|id| self.devices[id.0].class() == PeripheralClass::InterruptController)
            .collect();

        for &master in &pics {
            let Some(pic) = self.devices[master.0].as_pic_mut() else {
                continue;
            };

            if pic.base() != MASTER_BASE {
                continue;
            }

            self.primary_pic = Some(master);

            if pic.slave().is_some() {
                continue;
            }

            if let Some(&slave) = pics.iter().find(|&&id| id != master) {
                pic.attach_slave(slave);
                debug!("Cascade: device {} is slave of device {}", slave.0, master.0);
            }
        }
    }

    pub fn reset(&mut self) {
        for device in self.devices.iter_mut() {
            debug!("Reset {}", device.name());
            device.reset();
        }
    }

    pub fn update(&mut self, cycles: u32) {
        for device in self.devices.iter_mut() {
            device.update(cycles);
        }
    }

    pub fn port_in(&mut self, port: u16) -> u8 {
        match self.io.port_owner(port) {
            Some(id) => self.devices[id.0].port_in(port),
            None => {
                trace!("IN from unmapped port {port:04X}");
                0xFF
            }
        }
    }

    pub fn port_out(&mut self, val: u8, port: u16) {
        match self.io.port_owner(port) {
            Some(id) => self.devices[id.0].port_out(val, port),
            None => trace!("OUT {val:02X} to unmapped port {port:04X}"),
        }
    }

    pub fn read_8(&mut self, addr: u32) -> u8 {
        match self.io.mem_owner(addr) {
            Some(id) => self.devices[id.0].mem_read(addr),
            None => 0xFF,
        }
    }

    pub fn write_8(&mut self, addr: u32, val: u8) {
        if let Some(id) = self.io.mem_owner(addr) {
            self.devices[id.0].mem_write(addr, val);
        }
    }

    /// Raises an interrupt line on the primary controller. Lines 8-15 travel
    /// down the cascade.
    pub fn raise_irq(&mut self, line: u8) {
        let Some(mut id) = self.primary_pic else {
            trace!("IRQ {line} raised with no interrupt controller installed");
            return;
        };
        let mut line = line;

        while let Some((slave, slave_line)) = self.interrupt_controller_mut(id).and_then(|pic| pic.raise_irq(line)) {
            id = slave;
            line = slave_line;
        }
    }

    /// Interrupt acknowledge as seen by the CPU.
    pub fn next_pending_vector(&mut self) -> Option<u8> {
        self.primary_pic.and_then(|id| self.acknowledge(id))
    }

    fn acknowledge(&mut self, id: DeviceId) -> Option<u8> {
        match self.interrupt_controller_mut(id)?.next_pending_vector()? {
            Acknowledge::Vector(vector) => Some(vector),
            Acknowledge::Cascade(slave) => self.acknowledge(slave).map(|v| v.wrapping_add(8)),
        }
    }

    pub fn primary_pic(&self) -> Option<DeviceId> {
        self.primary_pic
    }

    pub fn devices(&self) -> impl Iterator<Item = (DeviceId, &dyn Peripheral)> {
        self.devices
            .iter()
            .enumerate()
            .map(|(i, device)| (DeviceId(i), device.as_ref()))
    }

    pub fn interrupt_controller(&self, id: DeviceId) -> Option<&PIC8259> {
        self.devices.get(id.0)?.as_pic()
    }

    pub fn interrupt_controller_mut(&mut self, id: DeviceId) -> Option<&mut PIC8259> {
        self.devices.get_mut(id.0)?.as_pic_mut()
    }

    pub fn display_adapter(&self, id: DeviceId) -> Option<&DisplayAdapter> {
        self.devices.get(id.0)?.as_display()
    }

    pub fn display_adapter_mut(&mut self, id: DeviceId) -> Option<&mut DisplayAdapter> {
        self.devices.get_mut(id.0)?.as_display_mut()
    }
}

use thiserror::Error;

use super::bus::{DeviceId, Installer};

pub mod display;
pub mod pic_8259;

use display::cga::DisplayAdapter;
use pic_8259::PIC8259;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeripheralClass {
    InterruptController,
    Video,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InstallError {
    #[error("{device}: I/O port {port:#06X} already owned by device {owner:?}")]
    PortConflict {
        device: &'static str,
        port: u16,
        owner: DeviceId,
    },
    #[error("{device}: memory address {addr:#07X} already owned by device {owner:?}")]
    MemoryConflict {
        device: &'static str,
        addr: u32,
        owner: DeviceId,
    },
}

/// A device that plugs into the [`Bus`](super::bus::Bus).
///
/// Every operation except `install` is total: register programming that
/// makes no sense on real hardware still has a defined effect here.
pub trait Peripheral: Send {
    /// Claim the port and memory ranges this device answers to.
    fn install(&mut self, installer: &mut Installer) -> Result<(), InstallError>;
    fn reset(&mut self);
    fn update(&mut self, cycles: u32);

    fn port_in(&mut self, port: u16) -> u8;
    fn port_out(&mut self, val: u8, port: u16);

    fn mem_read(&mut self, _addr: u32) -> u8 {
        0xFF
    }
    fn mem_write(&mut self, _addr: u32, _val: u8) {}

    fn name(&self) -> &'static str;
    fn class(&self) -> PeripheralClass;

    fn as_pic(&self) -> Option<&PIC8259> {
        None
    }
    fn as_pic_mut(&mut self) -> Option<&mut PIC8259> {
        None
    }
    fn as_display(&self) -> Option<&DisplayAdapter> {
        None
    }
    fn as_display_mut(&mut self) -> Option<&mut DisplayAdapter> {
        None
    }
}

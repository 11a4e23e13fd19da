use std::sync::Arc;

use log::debug;
use thiserror::Error;

use super::bus::{Bus, DeviceId};
use super::clock::Clock;
use super::peripheral::display::cga::DisplayAdapter;
use super::peripheral::display::font::{Font, FontError};
use super::peripheral::display::render::FrameRenderer;
use super::peripheral::pic_8259::PIC8259;
use super::peripheral::InstallError;
use crate::config::{ConfigError, MachineConfig};

#[derive(Error, Debug)]
pub enum MachineError {
    #[error(transparent)]
    Install(#[from] InstallError),
    #[error(transparent)]
    Font(#[from] FontError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The peripherals of one machine, installed and wired on a bus.
pub struct System {
    pub bus: Bus,

    pub master_pic: DeviceId,
    pub slave_pic: Option<DeviceId>,
    pub display: Option<DeviceId>,
}

impl System {
    pub fn new(cfg: &MachineConfig, clock: Arc<dyn Clock>) -> Result<Self, MachineError> {
        let mut bus = Bus::new();

        let master_pic = bus.attach(PIC8259::new(cfg.master_pic))?;
        let slave_pic = cfg
            .slave_pic
            .map(|base| bus.attach(PIC8259::new(base)))
            .transpose()?;

        let display = if cfg.video {
            let font = match &cfg.font_rom {
                Some(path) => Font::from_file(path)?,
                None => Font::default(),
            };

            Some(bus.attach(DisplayAdapter::new(font, clock))?)
        } else {
            None
        };

        bus.wire_cascade();
        bus.reset();
        debug!("Machine ready: {} devices", bus.devices().count());

        Ok(Self {
            bus,
            master_pic,
            slave_pic,
            display,
        })
    }

    pub fn rst(&mut self) {
        self.bus.reset();
    }

    pub fn update(&mut self, cycles: u32) {
        self.bus.update(cycles);
    }

    pub fn display_mut(&mut self) -> Option<&mut DisplayAdapter> {
        self.bus.display_adapter_mut(self.display?)
    }

    pub fn frame_renderer(&self) -> Option<FrameRenderer> {
        self.bus.display_adapter(self.display?).map(DisplayAdapter::renderer)
    }
}

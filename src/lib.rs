pub mod config;
pub mod hardware;

pub use config::MachineConfig;
pub use hardware::bus::{Bus, DeviceId};
pub use hardware::clock::{Clock, ManualClock, SystemClock};
pub use hardware::peripheral::display::cga::DisplayAdapter;
pub use hardware::peripheral::display::font::Font;
pub use hardware::peripheral::display::render::FrameRenderer;
pub use hardware::peripheral::pic_8259::PIC8259;
pub use hardware::peripheral::{Peripheral, PeripheralClass};
pub use hardware::sys::{MachineError, System};

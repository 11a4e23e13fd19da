use log::{debug, trace};

use super::{InstallError, Peripheral, PeripheralClass};
use crate::hardware::bus::{DeviceId, Installer};

/// Base port of the controller that owns the CPU interrupt line.
pub const MASTER_BASE: u16 = 0x20;
/// Master input the slave's INT output is wired to.
pub const CASCADE_LINE: u8 = 2;

const ICW1: u8 = 0b00010000;
const ICW1_SINGLE: u8 = 0b00000010;
const ICW4_AUTO_EOI: u8 = 0b00000010;
const OCW2_EOI: u8 = 0b00100000;

/// Outcome of an interrupt acknowledge on one controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acknowledge {
    Vector(u8),
    /// The cascade input won; the slave has to supply the vector.
    Cascade(DeviceId),
}

#[derive(Debug)]
pub struct PIC8259 {
    imr: u8, // Interrupt Mask Register
    irr: u8, // Interrupt Request Register
    isr: u8, // In-Service Register

    icw_step: u8,
    icw: [u8; 5],
    read_isr: bool,

    base: u16,
    slave: Option<DeviceId>,
}

impl PIC8259 {
    pub fn new(base: u16) -> Self {
        Self {
            imr: 0,
            irr: 0,
            isr: 0,

            icw_step: 0,
            icw: [0; 5],
            read_isr: false,

            base,
            slave: None,
        }
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    pub fn slave(&self) -> Option<DeviceId> {
        self.slave
    }

    pub(crate) fn attach_slave(&mut self, slave: DeviceId) {
        self.slave = Some(slave);
    }

    pub fn mask(&self) -> u8 {
        self.imr
    }

    pub fn request(&self) -> u8 {
        self.irr
    }

    pub fn in_service(&self) -> u8 {
        self.isr
    }

    pub fn init_step(&self) -> u8 {
        self.icw_step
    }

    pub fn vector_base(&self) -> u8 {
        self.icw[2]
    }

    pub fn auto_eoi(&self) -> bool {
        self.icw[4] & ICW4_AUTO_EOI > 0
    }

    /// Sets the request bit for `line`. When a slave is attached, lines above
    /// 7 are latched on the cascade input and the returned pair tells the
    /// caller which controller and line to forward to.
    pub fn raise_irq(&mut self, line: u8) -> Option<(DeviceId, u8)> {
        let (line, forward) = match self.slave {
            Some(slave) if line > 7 => (CASCADE_LINE, Some((slave, line - 8))),
            _ => (line, None),
        };

        if line > 7 {
            trace!("PIC {:02X}: IRQ {line} has no input", self.base);
        } else {
            self.irr |= 1 << line;
        }

        forward
    }

    /// Moves the lowest numbered unmasked request into service.
    pub fn next_pending_vector(&mut self) -> Option<Acknowledge> {
        let requested_ints = self.irr & !self.imr;

        for i in 0..8 {
            let next_int = 1u8 << i;

            if requested_ints & next_int == 0 || self.isr & next_int > 0 {
                continue;
            }

            self.irr ^= next_int;
            // Stays in service until an explicit EOI, auto-EOI included.
            self.isr |= next_int;

            return match self.slave {
                Some(slave) if i == CASCADE_LINE => Some(Acknowledge::Cascade(slave)),
                _ => Some(Acknowledge::Vector(self.icw[2].wrapping_add(i))),
            };
        }

        None
    }

    fn non_specific_eoi(&mut self) {
        if self.isr == 0 {
            return;
        }

        // Clear only the lowest set bit.
        self.isr &= self.isr - 1;
    }

    fn command(&mut self, val: u8) {
        if val & ICW1 > 0 {
            debug!("PIC {:02X}: ICW1 {val:02X}", self.base);

            self.imr = 0;
            self.icw[1] = val;
            self.icw_step = 2;
        } else if val & 0b10011000 == 0b00001000 && val & 0b00000010 > 0 {
            // OCW3
            trace!("PIC {:02X}: OCW3 {val:02X}", self.base);
            self.read_isr = val & 0b00000010 > 0;
        } else if val & OCW2_EOI > 0 {
            trace!("PIC {:02X}: EOI", self.base);
            self.non_specific_eoi();
        }
    }

    fn data(&mut self, val: u8) {
        // No ICW3 when running single.
        if self.icw_step == 3 && self.icw[1] & ICW1_SINGLE > 0 {
            self.icw_step = 4;
        }

        if self.icw_step < 5 {
            self.icw[self.icw_step as usize] = val;
            self.icw_step += 1;
        } else {
            // OCW1
            self.imr = val;
        }
    }
}

impl Peripheral for PIC8259 {
    fn install(&mut self, installer: &mut Installer) -> Result<(), InstallError> {
        installer.install_io(self.base, self.base + 1)
    }

    fn reset(&mut self) {
        *self = Self {
            slave: self.slave,
            ..Self::new(self.base)
        };
    }

    fn update(&mut self, _cycles: u32) {}

    fn port_in(&mut self, port: u16) -> u8 {
        if port == self.base {
            if self.read_isr {
                self.isr
            } else {
                self.irr
            }
        } else {
            self.imr
        }
    }

    fn port_out(&mut self, val: u8, port: u16) {
        if port == self.base {
            self.command(val);
        } else {
            self.data(val);
        }
    }

    fn name(&self) -> &'static str {
        "PIC (Intel 8259)"
    }

    fn class(&self) -> PeripheralClass {
        PeripheralClass::InterruptController
    }

    fn as_pic(&self) -> Option<&PIC8259> {
        Some(self)
    }

    fn as_pic_mut(&mut self) -> Option<&mut PIC8259> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use assert_hex::assert_eq_hex;

    use super::*;

    fn init(pic: &mut PIC8259, words: &[u8]) {
        pic.port_out(words[0], pic.base);
        for &word in &words[1..] {
            pic.port_out(word, pic.base + 1);
        }
    }

    #[test]
    fn icw1_single_skips_icw3() {
        let mut pic = PIC8259::new(0x20);

        pic.port_out(0x13, 0x20);
        assert_eq!(pic.init_step(), 2);

        pic.port_out(0x08, 0x21); // ICW2
        assert_eq!(pic.init_step(), 3);
        pic.port_out(0x09, 0x21); // ICW4
        assert_eq!(pic.init_step(), 5);
        assert_eq_hex!(pic.vector_base(), 0x08);
        assert_eq_hex!(pic.icw[3], 0x00);
        assert_eq_hex!(pic.icw[4], 0x09);

        pic.port_out(0xBC, 0x21);
        assert_eq!(pic.init_step(), 5);
        assert_eq_hex!(pic.port_in(0x21), 0xBC);
    }

    #[test]
    fn icw1_cascade_takes_icw3() {
        let mut pic = PIC8259::new(0x20);

        pic.port_out(0x11, 0x20);
        pic.port_out(0x08, 0x21);
        pic.port_out(0x04, 0x21);
        assert_eq!(pic.init_step(), 4);
        pic.port_out(0x01, 0x21);
        assert_eq!(pic.init_step(), 5);
        assert_eq_hex!(pic.icw[3], 0x04);
        assert_eq_hex!(pic.icw[4], 0x01);
        assert_eq_hex!(pic.mask(), 0x00);

        pic.port_out(0xFE, 0x21);
        assert_eq_hex!(pic.mask(), 0xFE);
    }

    #[test]
    fn icw1_restarts_sequence_and_clears_mask() {
        let mut pic = PIC8259::new(0x20);
        init(&mut pic, &[0x13, 0x08, 0x09, 0xFF]);
        assert_eq_hex!(pic.mask(), 0xFF);

        pic.port_out(0x13, 0x20);
        assert_eq_hex!(pic.mask(), 0x00);
        assert_eq!(pic.init_step(), 2);

        // A short sequence is not an error; bytes keep filling ICWs.
        pic.port_out(0x70, 0x21);
        assert_eq!(pic.init_step(), 3);
        assert_eq_hex!(pic.vector_base(), 0x70);
    }

    #[test]
    fn lowest_line_wins() {
        let mut pic = PIC8259::new(0x20);
        init(&mut pic, &[0x13, 0x08, 0x09]);

        pic.raise_irq(5);
        pic.raise_irq(3);

        assert_eq!(pic.next_pending_vector(), Some(Acknowledge::Vector(0x0B)));
        assert_eq!(pic.next_pending_vector(), Some(Acknowledge::Vector(0x0D)));
        assert_eq!(pic.next_pending_vector(), None);
        assert_eq_hex!(pic.in_service(), 0b00101000);
        assert_eq_hex!(pic.request(), 0x00);
    }

    #[test]
    fn masked_and_in_service_lines_are_skipped() {
        let mut pic = PIC8259::new(0x20);
        init(&mut pic, &[0x13, 0x08, 0x09, 0b00000001]);

        pic.raise_irq(0);
        pic.raise_irq(1);
        assert_eq!(pic.next_pending_vector(), Some(Acknowledge::Vector(0x09)));
        assert_eq_hex!(pic.request(), 0b00000001);

        // Line 1 raised again while still in service.
        pic.raise_irq(1);
        assert_eq!(pic.next_pending_vector(), None);
        assert_eq_hex!(pic.request(), 0b00000011);

        // EOI frees line 1; the masked line 0 still waits.
        pic.port_out(0x20, 0x20);
        assert_eq!(pic.next_pending_vector(), Some(Acknowledge::Vector(0x09)));
        assert_eq_hex!(pic.request(), 0b00000001);
    }

    #[test]
    fn non_specific_eoi_clears_lowest_bit_only() {
        let mut pic = PIC8259::new(0x20);
        init(&mut pic, &[0x13, 0x08, 0x09]);

        pic.raise_irq(4);
        pic.raise_irq(6);
        pic.next_pending_vector();
        pic.next_pending_vector();
        assert_eq_hex!(pic.in_service(), 0b01010000);

        pic.port_out(0x20, 0x20);
        assert_eq_hex!(pic.in_service(), 0b01000000);
        pic.port_out(0x20, 0x20);
        assert_eq_hex!(pic.in_service(), 0x00);
        pic.port_out(0x20, 0x20);
        assert_eq_hex!(pic.in_service(), 0x00);
    }

    #[test]
    fn auto_eoi_keeps_line_in_service() {
        let mut pic = PIC8259::new(0x20);
        init(&mut pic, &[0x13, 0x08, 0x0B]);
        assert!(pic.auto_eoi());

        pic.raise_irq(0);
        pic.next_pending_vector();
        assert_eq_hex!(pic.in_service(), 0x01);
    }

    #[test]
    fn ocw3_selects_isr_read() {
        let mut pic = PIC8259::new(0x20);
        init(&mut pic, &[0x13, 0x08, 0x09]);

        pic.raise_irq(1);
        pic.raise_irq(7);
        pic.next_pending_vector();

        assert_eq_hex!(pic.port_in(0x20), 0b10000000);
        pic.port_out(0x0B, 0x20);
        assert_eq_hex!(pic.port_in(0x20), 0b00000010);
    }

    #[test]
    fn high_line_without_slave_is_ignored() {
        let mut pic = PIC8259::new(0x20);
        assert_eq!(pic.raise_irq(9), None);
        assert_eq_hex!(pic.request(), 0x00);
    }

    #[test]
    fn cascade_line_defers_to_slave() {
        let mut pic = PIC8259::new(0x20);
        pic.attach_slave(DeviceId(1));
        init(&mut pic, &[0x11, 0x08, 0x04, 0x01]);

        assert_eq!(pic.raise_irq(12), Some((DeviceId(1), 4)));
        assert_eq_hex!(pic.request(), 0b00000100);
        assert_eq!(pic.next_pending_vector(), Some(Acknowledge::Cascade(DeviceId(1))));
    }

    #[test]
    fn reset_keeps_wiring() {
        let mut pic = PIC8259::new(0x20);
        pic.attach_slave(DeviceId(3));
        init(&mut pic, &[0x11, 0x08, 0x04, 0x01, 0xAA]);
        pic.raise_irq(0);
        pic.port_out(0x0B, 0x20);

        pic.reset();

        assert_eq!(pic.init_step(), 0);
        assert_eq_hex!(pic.mask(), 0x00);
        assert_eq_hex!(pic.request(), 0x00);
        assert_eq_hex!(pic.vector_base(), 0x00);
        assert_eq!(pic.base(), 0x20);
        assert_eq!(pic.slave(), Some(DeviceId(3)));
        assert!(!pic.read_isr);
    }
}

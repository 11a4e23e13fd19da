const CURSOR_START_REG: u8 = 0x0A;
const START_ADDRESSH_REG: u8 = 0x0C;
const START_ADDRESSL_REG: u8 = 0x0D;
const CURSORH_REG: u8 = 0x0E;
const CURSORL_REG: u8 = 0x0F;

const CURSOR_OFF: u8 = 0b00100000;

/// 6845 style index/data register file. All 256 indexes are backed so any
/// value written reads back unchanged.
pub struct CRTC6845 {
    regs: [u8; 0x100],
    pub addr_reg: u8,

    cursor_visible: bool,
    cursor_offset: u16,
}

impl Default for CRTC6845 {
    fn default() -> Self {
        Self {
            regs: [0; 0x100],
            addr_reg: 0,

            cursor_visible: true,
            cursor_offset: 0,
        }
    }
}

impl CRTC6845 {
    pub fn read_reg(&self) -> u8 {
        self.regs[self.addr_reg as usize]
    }

    pub fn write_reg(&mut self, val: u8) {
        self.regs[self.addr_reg as usize] = val;

        match self.addr_reg {
            CURSOR_START_REG => self.cursor_visible = val & CURSOR_OFF == 0,
            CURSORH_REG => self.cursor_offset = (self.cursor_offset & 0x00FF) | ((val as u16) << 8),
            CURSORL_REG => self.cursor_offset = (self.cursor_offset & 0xFF00) | val as u16,
            _ => {}
        }
    }

    pub fn reset_cursor(&mut self) {
        self.cursor_visible = true;
        self.cursor_offset = 0;
    }

    pub fn cursor_visible(&self) -> bool {
        self.cursor_visible
    }

    pub fn cursor_offset(&self) -> u16 {
        self.cursor_offset
    }

    /// Start address of the displayed page, in bytes into the text window.
    pub fn video_page(&self) -> u16 {
        ((self.regs[START_ADDRESSH_REG as usize] as u16) << 8)
            | self.regs[START_ADDRESSL_REG as usize] as u16
    }
}

use std::sync::Arc;

use log::{debug, trace};

use super::crtc6845::CRTC6845;
use super::font::Font;
use super::render::{DisplayState, FrameRenderer, CGA_BASE, MEMORY_SIZE};
use super::PALETTE;
use crate::hardware::bus::Installer;
use crate::hardware::clock::Clock;
use crate::hardware::peripheral::{InstallError, Peripheral, PeripheralClass};

pub const MEMORY_START: u32 = 0xB0000;

/// Horizontal scan period in nanoseconds.
pub const SCANLINE_TIMING: i64 = 31469;
pub const SCANLINES: u16 = 525;
const LAST_VISIBLE_SCANLINE: u16 = 479;

const STATUS_RETRACE: u8 = 0b00000001;
const STATUS_VBLANK: u8 = 0x58;

/// CGA compatible adapter that also understands the Hercules graphics
/// page. Owns 64 KiB at 0xB0000 and ports 0x3B0-0x3BF, 0x3D0-0x3DF.
pub struct DisplayAdapter {
    mem: Box<[u8]>,
    crtc: CRTC6845,

    mode_ctrl: u8,
    color_ctrl: u8,
    status: u8,

    hgc_enable: u8,
    hgc_mode: bool,
    hgc_base: usize,

    last_scanline: i64,
    current_scanline: u16,

    dirty: bool,

    clock: Arc<dyn Clock>,
    renderer: FrameRenderer,
}

impl DisplayAdapter {
    pub fn new(font: Font, clock: Arc<dyn Clock>) -> Self {
        Self {
            mem: vec![0; MEMORY_SIZE].into_boxed_slice(),
            crtc: CRTC6845::default(),

            mode_ctrl: 0,
            color_ctrl: 0,
            status: 0,

            hgc_enable: 0,
            hgc_mode: false,
            hgc_base: 0,

            last_scanline: clock.micros() * 1000,
            current_scanline: 0,

            dirty: false,

            renderer: FrameRenderer::new(font, clock.clone()),
            clock,
        }
    }

    fn display_state(&self) -> DisplayState {
        DisplayState {
            cursor_visible: self.crtc.cursor_visible(),
            cursor_offset: self.crtc.cursor_offset(),
            hgc_mode: self.hgc_mode,
            hgc_base: self.hgc_base,
            video_page: self.crtc.video_page(),
            mode_ctrl: self.mode_ctrl,
            color_ctrl: self.color_ctrl,
        }
    }

    /// Copies live state into the snapshot if anything changed since the
    /// last call.
    pub fn take_snapshot(&mut self) -> bool {
        if !self.dirty {
            return false;
        }

        let mut snapshot = self.renderer.lock();
        snapshot.mem.copy_from_slice(&self.mem);
        snapshot.state = self.display_state();

        self.dirty = false;
        true
    }

    pub fn render<F, R>(&self, f: F) -> R
    where
        F: FnOnce(usize, usize, &[u8]) -> R,
    {
        self.renderer.render(f)
    }

    /// Handle the host keeps for rendering on its own schedule.
    pub fn renderer(&self) -> FrameRenderer {
        self.renderer.clone()
    }

    pub fn border_color(&self) -> u32 {
        PALETTE[(self.color_ctrl & 0x0F) as usize]
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn current_scanline(&self) -> u16 {
        self.current_scanline
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn hgc_mode(&self) -> bool {
        self.hgc_mode
    }

    fn read_status(&mut self) -> u8 {
        let status = self.status;
        self.status &= !STATUS_RETRACE;
        status
    }

    fn hgc_config(&mut self, val: u8) {
        // Bit 1 selects graphics, bit 7 the upper 32K page.
        self.hgc_mode = (self.hgc_enable & 1) & ((val & 0b00000010) >> 1) != 0;
        self.hgc_base = if (self.hgc_enable >> 1) & (val >> 7) != 0 {
            CGA_BASE
        } else {
            0
        };

        trace!("HGC mode {} page {:04X}", self.hgc_mode, self.hgc_base);
    }

    #[inline]
    fn offset(addr: u32) -> usize {
        addr.wrapping_sub(MEMORY_START) as usize % MEMORY_SIZE
    }
}

impl Peripheral for DisplayAdapter {
    fn install(&mut self, installer: &mut Installer) -> Result<(), InstallError> {
        installer.install_mem(MEMORY_START, MEMORY_START + MEMORY_SIZE as u32 - 1)?;
        installer.install_io(0x3B0, 0x3BF)?;
        installer.install_io(0x3D0, 0x3DF)
    }

    fn reset(&mut self) {
        self.last_scanline = self.clock.micros() * 1000;
        self.current_scanline = 0;

        self.crtc.reset_cursor();
        self.dirty = true;

        self.mode_ctrl = 0x01;
        self.color_ctrl = 0x20;
        self.status = 0;

        self.hgc_enable = 0;
        self.hgc_base = 0;
        self.hgc_mode = false;

        debug!("{} reset", self.name());
    }

    fn update(&mut self, _cycles: u32) {
        let now = self.clock.micros() * 1000;
        let elapsed = now - self.last_scanline;
        let scanlines = elapsed / SCANLINE_TIMING;

        if scanlines <= 0 {
            return;
        }

        self.last_scanline = now - elapsed % SCANLINE_TIMING;
        self.current_scanline =
            ((self.current_scanline as i64 + scanlines) % SCANLINES as i64) as u16;

        self.status = if self.current_scanline > LAST_VISIBLE_SCANLINE {
            STATUS_VBLANK
        } else {
            0
        };
        self.status |= STATUS_RETRACE;
    }

    fn port_in(&mut self, port: u16) -> u8 {
        match port {
            0x3B1 | 0x3B3 | 0x3B5 | 0x3B7 | 0x3D1 | 0x3D3 | 0x3D5 | 0x3D7 => self.crtc.read_reg(),
            0x3D9 => self.color_ctrl,
            0x3BA if !self.hgc_mode => 0xFF,
            0x3DA if self.hgc_mode => 0xFF,
            0x3BA | 0x3DA => self.read_status(),

            _ => 0,
        }
    }

    fn port_out(&mut self, val: u8, port: u16) {
        self.dirty = true;

        match port {
            0x3B0 | 0x3B2 | 0x3B4 | 0x3B6 | 0x3D0 | 0x3D2 | 0x3D4 | 0x3D6 => self.crtc.addr_reg = val,
            0x3B1 | 0x3B3 | 0x3B5 | 0x3B7 | 0x3D1 | 0x3D3 | 0x3D5 | 0x3D7 => self.crtc.write_reg(val),
            0x3B8 => self.hgc_config(val),
            0x3D8 => self.mode_ctrl = val,
            0x3D9 => self.color_ctrl = val,
            // Bit 0 unlocks graphics select on 3B8, bit 1 the upper page.
            0x3BF => self.hgc_enable = val & 0b00000011,

            _ => {}
        }
    }

    fn mem_read(&mut self, addr: u32) -> u8 {
        self.mem[Self::offset(addr)]
    }

    fn mem_write(&mut self, addr: u32, val: u8) {
        self.mem[Self::offset(addr)] = val;
        self.dirty = true;
    }

    fn name(&self) -> &'static str {
        "CGA/HGC Compatible Device"
    }

    fn class(&self) -> PeripheralClass {
        PeripheralClass::Video
    }

    fn as_display(&self) -> Option<&DisplayAdapter> {
        Some(self)
    }

    fn as_display_mut(&mut self) -> Option<&mut DisplayAdapter> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use assert_hex::assert_eq_hex;
    use ntest::timeout;

    use super::*;
    use crate::hardware::clock::ManualClock;

    const SCANLINE_US: i64 = 32;

    fn adapter(clock: &ManualClock) -> DisplayAdapter {
        let mut video = DisplayAdapter::new(Font::default(), Arc::new(clock.clone()));
        video.reset();
        video
    }

    #[test]
    fn reset_defaults_keep_memory() {
        let clock = ManualClock::new(0);
        let mut video = adapter(&clock);

        video.mem_write(0xB8000, 0x41);
        video.port_out(0x0A, 0x3D8);
        video.port_out(0x0A, 0x3D4);
        video.port_out(0x20, 0x3D5);

        video.reset();

        assert_eq_hex!(video.mem_read(0xB8000), 0x41);
        assert_eq_hex!(video.mode_ctrl, 0x01);
        assert_eq_hex!(video.color_ctrl, 0x20);
        assert!(video.crtc.cursor_visible());
        assert!(video.is_dirty());
        // CRT registers survive.
        assert_eq_hex!(video.port_in(0x3D5), 0x20);
    }

    #[test]
    fn crt_ports_are_aliased() {
        let clock = ManualClock::new(0);
        let mut video = adapter(&clock);

        video.port_out(0x0E, 0x3B0);
        video.port_out(0x12, 0x3D7);
        video.port_out(0x0F, 0x3D2);
        video.port_out(0x34, 0x3B3);

        assert_eq_hex!(video.crtc.cursor_offset(), 0x1234);
        assert_eq_hex!(video.port_in(0x3B5), 0x34);
        assert_eq_hex!(video.port_in(0x3D1), 0x34);
    }

    #[test]
    fn readable_ports() {
        let clock = ManualClock::new(0);
        let mut video = adapter(&clock);

        video.port_out(0x3F, 0x3D9);
        assert_eq_hex!(video.port_in(0x3D9), 0x3F);
        assert_eq_hex!(video.port_in(0x3D8), 0x00);
        assert_eq_hex!(video.port_in(0x3BF), 0x00);
        // Mono status is not decoded outside HGC mode.
        assert_eq_hex!(video.port_in(0x3BA), 0xFF);
    }

    #[test]
    fn status_tracks_scanlines() {
        let clock = ManualClock::new(0);
        let mut video = adapter(&clock);

        video.update(0);
        assert_eq!(video.current_scanline(), 0);
        assert_eq_hex!(video.port_in(0x3DA), 0x00);

        clock.advance(SCANLINE_US);
        video.update(0);
        assert_eq!(video.current_scanline(), 1);
        assert_eq_hex!(video.port_in(0x3DA), 0x01);
        // Reading clears the retrace bit.
        assert_eq_hex!(video.port_in(0x3DA), 0x00);

        // 480 * 31469 ns = 15105.12 us
        clock.set(15_106);
        video.update(0);
        assert_eq!(video.current_scanline(), 480);
        assert_eq_hex!(video.port_in(0x3DA), 0x59);
        assert_eq_hex!(video.port_in(0x3DA), 0x58);
    }

    #[test]
    #[timeout(5000)]
    fn scanline_counter_wraps_and_keeps_remainder() {
        let clock = ManualClock::new(0);
        let mut video = adapter(&clock);

        let mut expected = 0u16;
        for _ in 0..2000 {
            clock.advance(SCANLINE_US);
            video.update(0);
            expected = (expected + 1) % SCANLINES;

            // 32 us per step drifts ahead of 31.469 us scanlines.
            let drift = video.current_scanline() as i64 - expected as i64;
            assert!(drift.rem_euclid(SCANLINES as i64) < 40);
        }

        let total_ns = clock.micros() * 1000;
        assert_eq!(
            video.current_scanline() as i64,
            (total_ns / SCANLINE_TIMING) % SCANLINES as i64
        );
    }

    #[test]
    fn hgc_needs_enable_bits() {
        let clock = ManualClock::new(0);
        let mut video = adapter(&clock);

        video.port_out(0x82, 0x3B8);
        assert!(!video.hgc_mode());

        video.port_out(0x01, 0x3BF);
        video.port_out(0x82, 0x3B8);
        assert!(video.hgc_mode());
        assert_eq!(video.hgc_base, 0);

        video.port_out(0x03, 0x3BF);
        video.port_out(0x82, 0x3B8);
        assert_eq!(video.hgc_base, CGA_BASE);

        // Status ports swap roles.
        assert_eq_hex!(video.port_in(0x3DA), 0xFF);
        assert_eq_hex!(video.port_in(0x3BA), 0x00);
    }

    #[test]
    fn snapshot_copies_state() {
        let clock = ManualClock::new(0);
        let mut video = adapter(&clock);

        video.mem_write(0xBFFFF, 0x99);
        video.port_out(0x0C, 0x3D4);
        video.port_out(0x01, 0x3D5);
        video.port_out(0x0D, 0x3D4);
        video.port_out(0x40, 0x3D5);

        assert!(video.take_snapshot());
        assert!(!video.take_snapshot());

        let snapshot = video.renderer.lock();
        assert_eq_hex!(snapshot.mem[0xFFFF], 0x99);
        assert_eq_hex!(snapshot.state().video_page, 0x0140);
        assert_eq_hex!(snapshot.state().mode_ctrl, 0x01);
        assert!(snapshot.state().cursor_visible);
    }

    #[test]
    fn border_color_from_color_control() {
        let clock = ManualClock::new(0);
        let mut video = adapter(&clock);

        video.port_out(0x24, 0x3D9);
        assert_eq_hex!(video.border_color(), 0xAA0000);
    }
}

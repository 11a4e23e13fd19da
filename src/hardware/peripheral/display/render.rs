use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rayon::prelude::*;

use super::font::{Font, GLYPH_HEIGHT};
use super::{blit32, MAX_HEIGHT, MAX_WIDTH, PALETTE, SURFACE_SIZE};
use crate::hardware::clock::Clock;

pub const MEMORY_SIZE: usize = 0x10000;
/// CGA memory sits in the upper half of the bank.
pub const CGA_BASE: usize = 0x8000;

const BLINK_PERIOD_US: i64 = 500_000;

const HGC_LINES: usize = 348;
const HGC_STRIDE: usize = 90;
const CGA_STRIDE: usize = 80;
const CGA_ODD_FIELD: usize = 0x2000;

const TEXT_ROWS: usize = 25;
const CURSOR_GLYPH: u8 = b'_';

const MODE_80_COLUMNS: u8 = 0b00000001;
const MODE_GRAPHICS: u8 = 0b00000010;
const MODE_HIGH_RES: u8 = 0b00010000;
const MODE_BLINK: u8 = 0b00100000;

/// Display registers as seen by the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisplayState {
    pub cursor_visible: bool,
    pub cursor_offset: u16,
    pub hgc_mode: bool,
    pub hgc_base: usize,
    pub video_page: u16,
    pub mode_ctrl: u8,
    pub color_ctrl: u8,
}

impl DisplayState {
    /// Column and row of the cursor on a text screen `columns` cells wide.
    pub fn cursor_xy(&self, columns: usize) -> (usize, usize) {
        let offset = self.cursor_offset as usize;
        (offset % columns, offset / columns)
    }
}

/// Point in time copy of video memory and display registers.
pub struct Snapshot {
    pub(crate) mem: Box<[u8]>,
    pub(crate) state: DisplayState,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            mem: vec![0; MEMORY_SIZE].into_boxed_slice(),
            state: DisplayState::default(),
        }
    }
}

impl Snapshot {
    pub fn state(&self) -> &DisplayState {
        &self.state
    }
}

/// Host side working copy of a snapshot plus the surface it is rasterised to.
pub struct Frame {
    mem: Box<[u8]>,
    state: DisplayState,
    surface: Vec<u8>,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            mem: vec![0; MEMORY_SIZE].into_boxed_slice(),
            state: DisplayState::default(),
            surface: vec![0; SURFACE_SIZE],
        }
    }
}

impl Frame {
    pub fn load(&mut self, snapshot: &Snapshot) {
        self.mem.copy_from_slice(&snapshot.mem);
        self.state = snapshot.state;
    }

    /// Rasterises the frame and returns the width and height used.
    pub fn rasterize(&mut self, font: &Font, blink: bool) -> (usize, usize) {
        let Frame { mem, state, surface } = self;

        if state.hgc_mode {
            hgc_mode(mem, state.hgc_base, surface)
        } else if state.mode_ctrl & MODE_GRAPHICS > 0 {
            if state.mode_ctrl & MODE_HIGH_RES > 0 {
                high_res_mode(mem, surface)
            } else {
                medium_res_mode(mem, state.color_ctrl, surface)
            }
        } else {
            alphanumeric_mode(mem, state, font, blink, surface)
        }
    }

    pub fn surface(&self) -> &[u8] {
        &self.surface
    }
}

/// Host side handle for turning the latest snapshot into pixels. Cheap to
/// clone and safe to use from another thread than the one stepping the bus.
#[derive(Clone)]
pub struct FrameRenderer {
    snapshot: Arc<Mutex<Snapshot>>,
    frame: Arc<Mutex<Frame>>,
    font: Arc<Font>,
    clock: Arc<dyn Clock>,
    activation: i64,
}

impl FrameRenderer {
    pub(crate) fn new(font: Font, clock: Arc<dyn Clock>) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(Snapshot::default())),
            frame: Arc::new(Mutex::new(Frame::default())),
            font: Arc::new(font),
            activation: clock.micros(),
            clock,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Half second on, half second off, counted from device creation.
    pub fn blink_on(&self) -> bool {
        ((self.clock.micros() - self.activation) / BLINK_PERIOD_US) % 2 == 0
    }

    /// Rasterises the snapshot and hands `(width, height, pixels)` to `f`.
    /// `pixels` is always the full 720x350 ARGB backing store; only the first
    /// `width * height` pixels belong to the frame.
    ///
    /// The snapshot is only locked while it is copied into the working frame,
    /// so `take_snapshot` never waits for rasterisation or for `f`.
    pub fn render<F, R>(&self, f: F) -> R
    where
        F: FnOnce(usize, usize, &[u8]) -> R,
    {
        let blink = self.blink_on();
        let mut frame = self.frame.lock().unwrap_or_else(PoisonError::into_inner);
        frame.load(&self.lock());

        let (width, height) = frame.rasterize(&self.font, blink);

        f(width, height, frame.surface())
    }
}

fn hgc_mode(mem: &[u8], base: usize, surface: &mut [u8]) -> (usize, usize) {
    surface
        .par_chunks_mut(MAX_WIDTH * 4)
        .enumerate()
        .for_each(|(y, row)| {
            if y >= HGC_LINES {
                row.chunks_exact_mut(4).for_each(|pixel| blit32(pixel, PALETTE[0]));
                return;
            }

            for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
                let addr = ((y & 3) << 13) + (y >> 2) * HGC_STRIDE + (x >> 3);
                let bit = (mem[base + addr] >> (7 - (x & 7))) & 1;

                blit32(pixel, PALETTE[bit as usize * 15]);
            }
        });

    (MAX_WIDTH, MAX_HEIGHT)
}

#[inline]
fn cga_line(y: usize) -> usize {
    CGA_BASE + (y >> 1) * CGA_STRIDE + (y & 1) * CGA_ODD_FIELD
}

fn high_res_mode(mem: &[u8], surface: &mut [u8]) -> (usize, usize) {
    let (width, height) = (640, 200);

    surface[..width * height * 4]
        .par_chunks_mut(width * 4)
        .enumerate()
        .for_each(|(y, row)| {
            let line = cga_line(y);

            for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
                let bit = (mem[line + (x >> 3)] >> (7 - (x & 7))) & 1;
                blit32(pixel, PALETTE[bit as usize * 15]);
            }
        });

    (width, height)
}

fn medium_res_mode(mem: &[u8], color: u8, surface: &mut [u8]) -> (usize, usize) {
    let (width, height) = (320, 200);

    let palette = ((color >> 5) & 1) as usize;
    let background = (color & 0x0F) as usize;
    let intensity = (((color >> 4) & 1) << 3) as usize;

    surface[..width * height * 4]
        .par_chunks_mut(width * 4)
        .enumerate()
        .for_each(|(y, row)| {
            let line = cga_line(y);

            for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
                let group = mem[line + (x >> 2)];
                let val = ((group >> (2 * (3 - (x & 3)))) & 3) as usize;

                let index = if val == 0 {
                    background
                } else {
                    val * 2 + palette + intensity
                };

                blit32(pixel, PALETTE[index]);
            }
        });

    (width, height)
}

/// Foreground and background for a text attribute.
fn decode_attribute(attr: u8, mode_ctrl: u8, blink: bool) -> (u32, u32) {
    let mut back = ((attr & 0x70) >> 4) as usize;
    let mut front = (attr & 0x0F) as usize;

    if attr & 0x80 > 0 {
        if mode_ctrl & MODE_BLINK > 0 {
            if blink {
                front = back;
            }
        } else {
            back += 8;
        }
    }

    (PALETTE[front], PALETTE[back])
}

#[inline]
fn blit_glyph_line(row: &mut [u8], col: usize, glyph_line: u8, colors: (u32, u32)) {
    let cell = &mut row[col * 8 * 4..(col + 1) * 8 * 4];

    for (j, pixel) in cell.chunks_exact_mut(4).enumerate() {
        let color = if glyph_line & (0x80 >> j) > 0 {
            colors.0
        } else {
            colors.1
        };

        blit32(pixel, color);
    }
}

fn alphanumeric_mode(
    mem: &[u8],
    state: &DisplayState,
    font: &Font,
    blink: bool,
    surface: &mut [u8],
) -> (usize, usize) {
    let columns = if state.mode_ctrl & MODE_80_COLUMNS > 0 { 80 } else { 40 };
    let (width, height) = (columns * 8, TEXT_ROWS * GLYPH_HEIGHT);
    let page = CGA_BASE + state.video_page as usize;

    let cell_at = |index: usize| {
        let offset = (page + index * 2) % MEMORY_SIZE;
        (mem[offset], mem[(offset + 1) % MEMORY_SIZE])
    };

    surface[..width * height * 4]
        .par_chunks_mut(width * 4)
        .enumerate()
        .for_each(|(y, row)| {
            let (char_row, glyph_row) = (y / GLYPH_HEIGHT, y % GLYPH_HEIGHT);

            for col in 0..columns {
                let (ch, attr) = cell_at(char_row * columns + col);
                let colors = decode_attribute(attr, state.mode_ctrl, blink);

                blit_glyph_line(row, col, font.line(ch, glyph_row), colors);
            }
        });

    if blink && state.cursor_visible {
        let (x, y) = state.cursor_xy(columns);

        if y < TEXT_ROWS {
            let (_, attr) = cell_at(y * columns + x);
            let colors = decode_attribute((attr & 0x70) | 0x0F, state.mode_ctrl, blink);

            for (glyph_row, row) in surface
                .chunks_exact_mut(width * 4)
                .skip(y * GLYPH_HEIGHT)
                .take(GLYPH_HEIGHT)
                .enumerate()
            {
                blit_glyph_line(row, x, font.line(CURSOR_GLYPH, glyph_row), colors);
            }
        }
    }

    (width, height)
}

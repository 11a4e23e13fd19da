use std::path::Path;

use thiserror::Error;

pub const GLYPH_COUNT: usize = 256;
pub const GLYPH_HEIGHT: usize = 8;
pub const FONT_SIZE: usize = GLYPH_COUNT * GLYPH_HEIGHT;

/// Offset of the 8x8 double dot set in the IBM MDA/CGA character ROM.
pub const CGA_ROM_OFFSET: usize = 0x1800;

#[derive(Error, Debug)]
pub enum FontError {
    #[error("failed to read character ROM: {0}")]
    Io(#[from] std::io::Error),
    #[error("character ROM is {0} bytes, expected at least {1}")]
    Truncated(usize, usize),
}

/// 8x8 character generator. One byte per glyph line, MSB is the leftmost pixel.
#[derive(Clone)]
pub struct Font {
    glyphs: [[u8; GLYPH_HEIGHT]; GLYPH_COUNT],
}

impl Default for Font {
    fn default() -> Self {
        Self {
            glyphs: [[0; GLYPH_HEIGHT]; GLYPH_COUNT],
        }
    }
}

impl Font {
    pub fn from_glyphs(data: &[u8; FONT_SIZE]) -> Self {
        let mut font = Font::default();

        for (glyph, lines) in font.glyphs.iter_mut().zip(data.chunks_exact(GLYPH_HEIGHT)) {
            glyph.copy_from_slice(lines);
        }

        font
    }

    /// Decodes the CGA set out of a full character ROM dump.
    pub fn from_rom_image(rom: &[u8]) -> Result<Self, FontError> {
        let end = CGA_ROM_OFFSET + FONT_SIZE;

        let data = rom
            .get(CGA_ROM_OFFSET..end)
            .ok_or(FontError::Truncated(rom.len(), end))?;

        let mut glyphs = [0; FONT_SIZE];
        glyphs.copy_from_slice(data);
        Ok(Self::from_glyphs(&glyphs))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FontError> {
        let rom = std::fs::read(path)?;
        Self::from_rom_image(&rom)
    }

    #[inline]
    pub fn line(&self, ch: u8, row: usize) -> u8 {
        self.glyphs[ch as usize][row]
    }

    pub fn set_glyph(&mut self, ch: u8, lines: [u8; GLYPH_HEIGHT]) {
        self.glyphs[ch as usize] = lines;
    }
}

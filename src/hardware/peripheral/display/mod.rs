pub mod cga;
pub mod crtc6845;
pub mod font;
pub mod render;

/// Largest surface any mode produces (HGC graphics).
pub const MAX_WIDTH: usize = 720;
pub const MAX_HEIGHT: usize = 350;
pub const SURFACE_SIZE: usize = MAX_WIDTH * MAX_HEIGHT * 4;

const fn decode_rgb(val: u8) -> u32 {
    let intensity = ((val >> 3) & 1) as u32;
    let red = ((val >> 2) & 1) as u32;
    let mut green = ((val >> 1) & 1) as u32 * 0xAA + intensity * 0x55;
    let blue = (val & 1) as u32;

    // Dark yellow is brown on a real monitor.
    if val == 6 {
        green = 0x55;
    }

    ((red * 0xAA + intensity * 0x55) << 16) | (green << 8) | (blue * 0xAA + intensity * 0x55)
}

const fn build_palette() -> [u32; 16] {
    let mut palette = [0; 16];
    let mut i = 0;

    while i < 16 {
        palette[i] = decode_rgb(i as u8);
        i += 1;
    }

    palette
}

/// CGA RGBI colours as 0x00RRGGBB.
pub const PALETTE: [u32; 16] = build_palette();

/// Writes one pixel in alpha, red, green, blue order.
#[inline]
pub(crate) fn blit32(pixel: &mut [u8], color: u32) {
    pixel[0] = 0xFF;
    pixel[1] = (color >> 16) as u8;
    pixel[2] = (color >> 8) as u8;
    pixel[3] = color as u8;
}

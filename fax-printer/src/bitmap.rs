//! Monochrome bitmaps and line-graphics packing
//!
//! A [`PixelBitmap`] is the last stop before bytes: one bool per dot,
//! row-major, `true` = black. Resizing and dithering happen upstream; this
//! module only thresholds and packs.

use crate::error::{PrintError, PrintResult};

const ESC: u8 = 0x1B;
const LF: u8 = 0x0A;

/// Luma below this value prints black
pub const LUMA_THRESHOLD: u8 = 128;

/// Order of pixels inside a packed byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitOrder {
    /// Bit 0 holds the leftmost pixel of the group
    #[default]
    LsbFirst,
    /// Bit 7 holds the leftmost pixel of the group
    MsbFirst,
}

/// Physical characteristics of the attached printer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrinterProfile {
    /// Printable dots per line (384 for 58mm heads)
    pub dots_per_line: u32,
    pub bit_order: BitOrder,
}

impl PrinterProfile {
    /// Bytes in one full graphics line
    pub fn line_bytes(&self) -> usize {
        (self.dots_per_line / 8) as usize
    }
}

impl Default for PrinterProfile {
    fn default() -> Self {
        Self {
            dots_per_line: 384,
            bit_order: BitOrder::LsbFirst,
        }
    }
}

/// Row-major black/white raster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBitmap {
    width: u32,
    height: u32,
    dots: Vec<bool>,
}

impl PixelBitmap {
    /// All-white bitmap
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            dots: vec![false; width as usize * height as usize],
        }
    }

    /// Threshold an 8-bit grayscale buffer (row-major, one byte per pixel)
    pub fn from_luma(width: u32, height: u32, luma: &[u8]) -> PrintResult<Self> {
        let expected = width as usize * height as usize;
        if luma.len() != expected {
            return Err(PrintError::ImageDecode(format!(
                "expected {} luma samples, got {}",
                expected,
                luma.len()
            )));
        }
        Ok(Self {
            width,
            height,
            dots: luma.iter().map(|&y| y < LUMA_THRESHOLD).collect(),
        })
    }

    /// Decode an encoded picture (PNG, JPEG, GIF) into dots
    ///
    /// Transparent pixels print white; opaque pixels are black iff their
    /// luma is below [`LUMA_THRESHOLD`].
    #[cfg(feature = "image")]
    pub fn decode(bytes: &[u8]) -> PrintResult<Self> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| PrintError::ImageDecode(e.to_string()))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        let dots = rgba
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0;
                if a < 128 {
                    return false;
                }
                let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000;
                luma < LUMA_THRESHOLD as u32
            })
            .collect();

        Ok(Self {
            width,
            height,
            dots,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.dots[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, black: bool) {
        let idx = self.index(x, y);
        self.dots[idx] = black;
    }

    /// Iterate over rows as dot slices
    pub fn rows(&self) -> impl Iterator<Item = &[bool]> {
        // chunks_exact panics on 0; an empty-width bitmap simply has no dots
        self.dots.chunks_exact(self.width.max(1) as usize)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        y as usize * self.width as usize + x as usize
    }
}

/// Pack a row of dots into bytes, 8 dots per byte, black = bit set
///
/// A trailing partial group is padded with white.
pub fn pack_row(row: &[bool], order: BitOrder) -> Vec<u8> {
    row.chunks(8)
        .map(|group| {
            group
                .iter()
                .enumerate()
                .filter(|(_, black)| **black)
                .fold(0u8, |byte, (i, _)| match order {
                    BitOrder::LsbFirst => byte | (1 << i),
                    BitOrder::MsbFirst => byte | (0x80 >> i),
                })
        })
        .collect()
}

/// Encode a bitmap with the line-graphics command (`ESC * 8 nL nH`)
///
/// Every row is a full device line: header carrying the line's byte width,
/// packed dots, white padding out to `dots_per_line`, then LF.
pub fn encode_bitmap(bitmap: &PixelBitmap, profile: &PrinterProfile) -> PrintResult<Vec<u8>> {
    let width = bitmap.width();
    if width > profile.dots_per_line || width % 8 != 0 {
        return Err(PrintError::UnsupportedImage {
            width,
            max_width: profile.dots_per_line,
        });
    }

    let line_bytes = profile.line_bytes();
    let [n_l, n_h] = (line_bytes as u16).to_le_bytes();
    let mut data = Vec::with_capacity(bitmap.height() as usize * (line_bytes + 6));

    for row in bitmap.rows().take(bitmap.height() as usize) {
        data.extend_from_slice(&[ESC, b'*', 0x08, n_l, n_h]);
        let packed = pack_row(row, profile.bit_order);
        let padding = line_bytes - packed.len();
        data.extend_from_slice(&packed);
        data.extend(std::iter::repeat_n(0x00, padding));
        data.push(LF);
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_of(bits: &[u8]) -> Vec<bool> {
        bits.iter().map(|&b| b == 1).collect()
    }

    #[test]
    fn test_pack_all_black() {
        assert_eq!(pack_row(&[true; 8], BitOrder::LsbFirst), vec![0xFF]);
    }

    #[test]
    fn test_pack_checkerboard_lsb_first() {
        let row = row_of(&[1, 0, 1, 0, 1, 0, 1, 0]);
        assert_eq!(pack_row(&row, BitOrder::LsbFirst), vec![0x55]);
        assert_eq!(pack_row(&row, BitOrder::MsbFirst), vec![0xAA]);
    }

    #[test]
    fn test_pack_half_black_sixteen_wide() {
        let row = row_of(&[1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(pack_row(&row, BitOrder::LsbFirst), vec![0xFF, 0x00]);
    }

    #[test]
    fn test_from_luma_threshold() {
        let bmp = PixelBitmap::from_luma(8, 1, &[0, 127, 128, 255, 10, 200, 64, 129]).unwrap();
        let dots: Vec<bool> = (0..8).map(|x| bmp.get(x, 0)).collect();
        assert_eq!(
            dots,
            vec![true, true, false, false, true, false, true, false]
        );
    }

    #[test]
    fn test_from_luma_rejects_short_buffer() {
        assert!(matches!(
            PixelBitmap::from_luma(8, 2, &[0; 8]),
            Err(PrintError::ImageDecode(_))
        ));
    }

    #[test]
    fn test_encode_row_layout() {
        let mut bmp = PixelBitmap::new(16, 2);
        for y in 0..2 {
            for x in 0..16 {
                bmp.set(x, y, true);
            }
        }
        let data = encode_bitmap(&bmp, &PrinterProfile::default()).unwrap();

        // 5 header + 48 line bytes + LF per row
        assert_eq!(data.len(), 2 * 54);
        let row = &data[..54];
        assert_eq!(&row[..5], &[0x1B, b'*', 0x08, 48, 0]);
        assert_eq!(&row[5..7], &[0xFF, 0xFF]);
        assert!(row[7..53].iter().all(|&b| b == 0));
        assert_eq!(row[53], 0x0A);
        assert_eq!(&data[54..], row);
    }

    #[test]
    fn test_encode_rejects_bad_width() {
        let profile = PrinterProfile::default();
        assert!(matches!(
            encode_bitmap(&PixelBitmap::new(12, 1), &profile),
            Err(PrintError::UnsupportedImage { width: 12, .. })
        ));
        assert!(matches!(
            encode_bitmap(&PixelBitmap::new(392, 1), &profile),
            Err(PrintError::UnsupportedImage { width: 392, .. })
        ));
        assert!(encode_bitmap(&PixelBitmap::new(384, 1), &profile).is_ok());
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_decode_png() {
        use image::{ImageFormat, Rgba, RgbaImage};
        use std::io::Cursor;

        let mut img = RgbaImage::from_pixel(8, 1, Rgba([255, 255, 255, 255]));
        img.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 0])); // transparent black
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let bmp = PixelBitmap::decode(&png).unwrap();
        assert_eq!((bmp.width(), bmp.height()), (8, 1));
        assert!(bmp.get(0, 0));
        assert!(!bmp.get(1, 0));
        assert!(!bmp.get(2, 0));
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            PixelBitmap::decode(b"not an image"),
            Err(PrintError::ImageDecode(_))
        ));
    }
}

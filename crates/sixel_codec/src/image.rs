//! Raster types shared by the encoder and the decoder.

use crate::{Result, SixelError};

/// An RGBA color with 16 bits per channel.
///
/// The encoder works on 16-bit channels so sources with deeper color than
/// RGBA8 lose nothing before quantization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgba16 {
    pub r: u16,
    pub g: u16,
    pub b: u16,
    pub a: u16,
}

impl Rgba16 {
    pub const TRANSPARENT: Rgba16 = Rgba16::new(0, 0, 0, 0);

    #[inline]
    pub const fn new(r: u16, g: u16, b: u16, a: u16) -> Self {
        Self { r, g, b, a }
    }

    /// Widens an RGBA8 quadruple (`0xAB` becomes `0xABAB`).
    #[inline]
    pub const fn from_rgba8(c: [u8; 4]) -> Self {
        Self {
            r: c[0] as u16 * 257,
            g: c[1] as u16 * 257,
            b: c[2] as u16 * 257,
            a: c[3] as u16 * 257,
        }
    }

    #[inline]
    pub const fn to_rgba8(self) -> [u8; 4] {
        [
            (self.r >> 8) as u8,
            (self.g >> 8) as u8,
            (self.b >> 8) as u8,
            (self.a >> 8) as u8,
        ]
    }

    #[inline]
    pub const fn is_transparent(self) -> bool {
        self.a == 0
    }
}

/// Read access to a rectangular image.
///
/// Anything that can answer "what color is at (x, y)" can be encoded.
/// Coordinates passed to [`Raster::pixel`] are always inside
/// `width() x height()`.
pub trait Raster {
    fn width(&self) -> usize;

    fn height(&self) -> usize;

    fn pixel(&self, x: usize, y: usize) -> Rgba16;

    /// Returns the image itself when it is already palette based, which lets
    /// the quantizer skip palette reduction.
    fn as_indexed(&self) -> Option<&IndexedImage> {
        None
    }
}

/// Pixel aspect ratio from the SIXEL header or raster attributes.
///
/// `pan / pad` is the vertical shape of a pixel: `2:1` pixels are twice as
/// tall as they are wide. Modern terminals draw square pixels, so the
/// decoder only reports the ratio and never rescales.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelAspectRatio {
    /// Pixel Aspect Numerator (vertical component)
    pub pan: u16,
    /// Pixel Aspect Denominator (horizontal component)
    pub pad: u16,
}

impl PixelAspectRatio {
    /// Returns the aspect ratio as a floating point value (pan/pad).
    #[inline]
    pub fn as_f32(&self) -> f32 {
        self.pan as f32 / self.pad.max(1) as f32
    }

    /// Returns true if the aspect ratio represents square pixels.
    #[inline]
    pub fn is_square(&self) -> bool {
        self.pan == self.pad
    }

    /// Maps the DCS `P1` parameter to the ratio the DEC terminals used.
    pub fn from_dcs_p1(p1: u32) -> Self {
        let pan = match p1 {
            2 => 5,
            3 | 4 => 3,
            0 | 1 | 5 | 6 => 2,
            _ => 1,
        };
        Self { pan, pad: 1 }
    }
}

impl Default for PixelAspectRatio {
    fn default() -> Self {
        Self { pan: 1, pad: 1 }
    }
}

/// An RGBA8 raster, row-major, 4 bytes per pixel.
///
/// This is what the decoder hands back, and the simplest thing to feed the
/// encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SixelImage {
    /// RGBA pixel data (4 bytes per pixel: R, G, B, A)
    pub pixels: Vec<u8>,
    /// Image width in pixels
    pub width: usize,
    /// Image height in pixels
    pub height: usize,
    /// Pixel aspect ratio announced by the stream
    pub aspect_ratio: PixelAspectRatio,
}

impl SixelImage {
    /// Wraps a raw RGBA buffer.
    pub fn from_rgba(pixels: Vec<u8>, width: usize, height: usize) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(4))
            .ok_or(SixelError::ImageTooLarge { width, height })?;
        if pixels.len() != expected {
            return Err(SixelError::BufferSizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            pixels,
            width,
            height,
            aspect_ratio: PixelAspectRatio::default(),
        })
    }

    /// Returns the RGBA8 value at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are outside the image.
    #[inline]
    pub fn pixel_rgba8(&self, x: usize, y: usize) -> [u8; 4] {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        let i = (y * self.width + x) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    /// Returns the dimensions the image would have with square pixels.
    pub fn corrected_dimensions(&self) -> (usize, usize) {
        let PixelAspectRatio { pan, pad } = self.aspect_ratio;
        if self.aspect_ratio.is_square() || pad == 0 {
            (self.width, self.height)
        } else if pan > pad {
            // Tall pixels: stretch vertically
            (self.width, self.height * pan as usize / pad as usize)
        } else {
            // Wide pixels: stretch horizontally
            (self.width * pad as usize / pan.max(1) as usize, self.height)
        }
    }
}

impl Raster for SixelImage {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn pixel(&self, x: usize, y: usize) -> Rgba16 {
        Rgba16::from_rgba8(self.pixel_rgba8(x, y))
    }
}

/// A palette based image: one palette index per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedImage {
    pub width: usize,
    pub height: usize,
    pub palette: Vec<Rgba16>,
    pub indices: Vec<u8>,
}

impl IndexedImage {
    pub fn new(
        width: usize,
        height: usize,
        palette: Vec<Rgba16>,
        indices: Vec<u8>,
    ) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .ok_or(SixelError::ImageTooLarge { width, height })?;
        if indices.len() != expected {
            return Err(SixelError::BufferSizeMismatch {
                expected,
                actual: indices.len(),
            });
        }
        Ok(Self {
            width,
            height,
            palette,
            indices,
        })
    }

    #[inline]
    pub fn color_index_at(&self, x: usize, y: usize) -> u8 {
        self.indices[y * self.width + x]
    }
}

impl Raster for IndexedImage {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn pixel(&self, x: usize, y: usize) -> Rgba16 {
        self.palette
            .get(self.color_index_at(x, y) as usize)
            .copied()
            .unwrap_or(Rgba16::TRANSPARENT)
    }

    fn as_indexed(&self) -> Option<&IndexedImage> {
        Some(self)
    }
}

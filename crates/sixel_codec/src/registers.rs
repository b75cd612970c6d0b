//! The color register table used while decoding.
//!
//! Registers hold resolved RGBA8 colors. The table is seeded with the 16
//! VT340 registers, grows as the stream defines colors, and never forgets
//! an entry for the lifetime of one decode.

use crate::{Result, SixelError, SIXEL_PALETTE_MAX};

/// The 16 predefined VT340 registers, in RGB percent.
const VT340_DEFAULTS: [(u32, u32, u32); 16] = [
    (0, 0, 0),
    (20, 20, 80),
    (80, 13, 13),
    (20, 80, 20),
    (80, 20, 80),
    (20, 80, 80),
    (80, 80, 20),
    (53, 53, 53),
    (26, 26, 26),
    (33, 33, 60),
    (60, 26, 26),
    (33, 60, 33),
    (60, 33, 60),
    (33, 60, 60),
    (60, 60, 33),
    (80, 80, 80),
];

/// Coordinate system of a color definition (`#n;cs;v1;v2;v3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// `cs = 1`: hue angle, lightness, saturation
    Hls,
    /// any other `cs`: red, green, blue in percent
    Rgb,
}

impl ColorSpace {
    #[inline]
    pub fn from_param(cs: u32) -> Self {
        if cs == 1 {
            ColorSpace::Hls
        } else {
            ColorSpace::Rgb
        }
    }
}

/// Register number to color mapping with explicit failure on unknown
/// registers.
#[derive(Debug, Clone)]
pub struct ColorRegisters {
    colors: [Option<[u8; 4]>; SIXEL_PALETTE_MAX],
}

impl ColorRegisters {
    /// Creates a table holding only the VT340 defaults.
    pub fn new() -> Self {
        let mut colors = [None; SIXEL_PALETTE_MAX];
        for (slot, &(r, g, b)) in colors.iter_mut().zip(VT340_DEFAULTS.iter()) {
            *slot = Some(rgb_percent(r, g, b));
        }
        Self { colors }
    }

    /// Looks up register `n`.
    pub fn get(&self, n: usize) -> Result<[u8; 4]> {
        match self.colors.get(n) {
            Some(Some(color)) => Ok(*color),
            Some(None) => Err(SixelError::UndefinedRegister(n)),
            None => Err(SixelError::RegisterOutOfRange(n)),
        }
    }

    pub fn is_defined(&self, n: usize) -> bool {
        matches!(self.colors.get(n), Some(Some(_)))
    }

    /// Stores an already resolved color into register `n`.
    pub fn set(&mut self, n: usize, color: [u8; 4]) -> Result<()> {
        let slot = self
            .colors
            .get_mut(n)
            .ok_or(SixelError::RegisterOutOfRange(n))?;
        *slot = Some(color);
        Ok(())
    }

    /// Resolves a `#n;cs;v1;v2;v3` definition and stores it. Returns the
    /// resolved color.
    pub fn define(
        &mut self,
        n: usize,
        space: ColorSpace,
        v1: u32,
        v2: u32,
        v3: u32,
    ) -> Result<[u8; 4]> {
        let color = match space {
            ColorSpace::Hls => {
                let [r, g, b] = hls_to_rgb(v1, v2, v3);
                [r, g, b, 0xff]
            }
            ColorSpace::Rgb => rgb_percent(v1, v2, v3),
        };
        self.set(n, color)?;
        Ok(color)
    }

    /// Number of defined registers.
    pub fn len(&self) -> usize {
        self.colors.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ColorRegisters {
    fn default() -> Self {
        Self::new()
    }
}

/// Scales a 0-100 percentage to a byte, truncating.
#[inline]
pub fn percent_to_byte(value: u32) -> u8 {
    let clamped = value.min(100);
    (clamped * 255 / 100) as u8
}

#[inline]
fn rgb_percent(r: u32, g: u32, b: u32) -> [u8; 4] {
    [percent_to_byte(r), percent_to_byte(g), percent_to_byte(b), 0xff]
}

/// Converts a SIXEL HLS triple to RGB8.
///
/// Hue is in degrees, lightness and saturation in percent. The SIXEL hue
/// ring puts blue at 0 degrees, so the hue is rotated by 240 degrees before
/// the usual six-sector interpolation. Channels are truncated to whole
/// percent before scaling.
pub fn hls_to_rgb(h: u32, l: u32, s: u32) -> [u8; 3] {
    let l = l.min(100) as f64;
    let s = s.min(100) as f64;

    let (max, min) = if l > 50.0 {
        (l + s * (1.0 - l / 100.0), l - s * (1.0 - l / 100.0))
    } else {
        (l + s * l / 100.0, l - s * l / 100.0)
    };

    let h = (h % 360 + 240) % 360;
    let span = max - min;
    let (r, g, b) = match h / 60 {
        0 => (max, min + span * (h as f64 / 60.0), min),
        1 => (min + span * ((120 - h) as f64 / 60.0), max, min),
        2 => (min, max, min + span * ((h - 120) as f64 / 60.0)),
        3 => (min, min + span * ((240 - h) as f64 / 60.0), max),
        4 => (min + span * ((h - 240) as f64 / 60.0), min, max),
        _ => (max, min, min + span * ((360 - h) as f64 / 60.0)),
    };

    [
        percent_to_byte(r as u32),
        percent_to_byte(g as u32),
        percent_to_byte(b as u32),
    ]
}

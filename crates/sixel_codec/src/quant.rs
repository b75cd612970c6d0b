//! Palette reduction.
//!
//! Turns any [`Raster`] into an [`IndexedImage`] with at most
//! `max_colors - 1` entries; palette index 0 of the wire format stays
//! reserved for unpainted pixels, so the encoder shifts every index by one.

use std::borrow::Cow;
use std::collections::HashMap;

use quantette::{deps::palette::Srgb, PaletteSize, Pipeline, QuantizeMethod as WuMethod};

use crate::image::{IndexedImage, Raster, Rgba16};
use crate::{Result, SixelError};

/// Palette selection algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QuantizeMethod {
    /// Heckbert median cut over the opaque pixel population.
    #[default]
    MedianCut,
    /// Wu's variance minimisation, provided by quantette.
    Wu,
}

#[derive(Debug, Clone)]
pub struct QuantizeOptions {
    /// Palette size including the reserved slot. Values below 2 are clamped.
    pub max_colors: u16,
    /// Map pixels with Floyd-Steinberg error diffusion instead of plain
    /// nearest color.
    pub dither: bool,
    pub method: QuantizeMethod,
}

impl Default for QuantizeOptions {
    fn default() -> Self {
        Self {
            max_colors: 255,
            dither: false,
            method: QuantizeMethod::MedianCut,
        }
    }
}

impl QuantizeOptions {
    /// Number of paintable colors the palette may hold.
    #[inline]
    pub fn paintable_colors(&self) -> usize {
        self.max_colors.clamp(2, 256) as usize - 1
    }
}

/// Reduces `image` to an indexed image.
///
/// Returns `None` for a zero-area image. An image that is already indexed
/// with fewer than `max_colors` palette entries is passed through untouched.
pub fn quantize<'a, R: Raster + ?Sized>(
    image: &'a R,
    opts: &QuantizeOptions,
) -> Result<Option<Cow<'a, IndexedImage>>> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Ok(None);
    }

    let max_colors = opts.max_colors.clamp(2, 256) as usize;
    if let Some(indexed) = image.as_indexed() {
        if indexed.palette.len() < max_colors {
            log::debug!(
                "image already indexed with {} colors, skipping quantization",
                indexed.palette.len()
            );
            return Ok(Some(Cow::Borrowed(indexed)));
        }
    }

    let target = opts.paintable_colors();
    let palette = match opts.method {
        QuantizeMethod::MedianCut => median_cut(image, target),
        QuantizeMethod::Wu => wu_palette(image, target)?,
    };
    log::debug!(
        "{:?} picked {} colors for {}x{} (limit {})",
        opts.method,
        palette.len(),
        width,
        height,
        target
    );

    let indices = if opts.dither {
        map_floyd_steinberg(image, &palette)
    } else {
        map_nearest(image, &palette)
    };

    Ok(Some(Cow::Owned(IndexedImage {
        width,
        height,
        palette,
        indices,
    })))
}

/// One histogram cell: every source color whose top byte per channel is
/// `key`.
#[derive(Debug, Clone, Copy)]
struct Bin {
    key: [u8; 3],
    count: u64,
    sum: [u64; 3],
}

impl Bin {
    fn mean(bins: &[Bin]) -> Rgba16 {
        let mut count = 0u64;
        let mut sum = [0u64; 3];
        for bin in bins {
            count += bin.count;
            for (s, v) in sum.iter_mut().zip(bin.sum) {
                *s += v;
            }
        }
        let count = count.max(1);
        Rgba16::new(
            (sum[0] / count) as u16,
            (sum[1] / count) as u16,
            (sum[2] / count) as u16,
            u16::MAX,
        )
    }
}

/// A contiguous run of bins that will become one palette entry.
#[derive(Debug, Clone, Copy)]
struct ColorBox {
    start: usize,
    end: usize,
    population: u64,
}

impl ColorBox {
    fn new(bins: &[Bin], start: usize, end: usize) -> Self {
        let population = bins[start..end].iter().map(|b| b.count).sum();
        Self {
            start,
            end,
            population,
        }
    }

    #[inline]
    fn len(&self) -> usize {
        self.end - self.start
    }

    /// Channel with the widest spread, and that spread.
    fn widest_channel(&self, bins: &[Bin]) -> (usize, u8) {
        let mut lo = [u8::MAX; 3];
        let mut hi = [u8::MIN; 3];
        for bin in &bins[self.start..self.end] {
            for c in 0..3 {
                lo[c] = lo[c].min(bin.key[c]);
                hi[c] = hi[c].max(bin.key[c]);
            }
        }
        (0..3)
            .map(|c| (c, hi[c] - lo[c]))
            .max_by_key(|&(c, spread)| (spread, std::cmp::Reverse(c)))
            .unwrap_or((0, 0))
    }
}

fn histogram<R: Raster + ?Sized>(image: &R) -> Vec<Bin> {
    let mut cells: HashMap<[u8; 3], Bin> = HashMap::new();
    for y in 0..image.height() {
        for x in 0..image.width() {
            let px = image.pixel(x, y);
            if px.is_transparent() {
                continue;
            }
            let key = [(px.r >> 8) as u8, (px.g >> 8) as u8, (px.b >> 8) as u8];
            let bin = cells.entry(key).or_insert(Bin {
                key,
                count: 0,
                sum: [0; 3],
            });
            bin.count += 1;
            bin.sum[0] += px.r as u64;
            bin.sum[1] += px.g as u64;
            bin.sum[2] += px.b as u64;
        }
    }
    let mut bins: Vec<Bin> = cells.into_values().collect();
    // HashMap order is random; keep palettes reproducible
    bins.sort_unstable_by_key(|b| b.key);
    bins
}

/// Median cut: repeatedly split the most populated box along its widest
/// channel at the pixel median, until `target` boxes exist or no box can be
/// split further.
fn median_cut<R: Raster + ?Sized>(image: &R, target: usize) -> Vec<Rgba16> {
    let mut bins = histogram(image);
    if bins.is_empty() {
        return Vec::new();
    }

    let mut boxes = vec![ColorBox::new(&bins, 0, bins.len())];
    while boxes.len() < target {
        let Some(pick) = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.len() > 1)
            .max_by_key(|(_, b)| b.population)
            .map(|(i, _)| i)
        else {
            break;
        };

        let cbox = boxes[pick];
        let (channel, _) = cbox.widest_channel(&bins);
        let slice = &mut bins[cbox.start..cbox.end];
        slice.sort_unstable_by_key(|b| (b.key[channel], b.key));

        let half = cbox.population / 2;
        let mut acc = 0u64;
        let mut split = 1;
        for (i, bin) in slice.iter().enumerate() {
            acc += bin.count;
            if acc >= half {
                split = i + 1;
                break;
            }
        }
        let split = cbox.start + split.clamp(1, cbox.len() - 1);

        boxes[pick] = ColorBox::new(&bins, cbox.start, split);
        boxes.push(ColorBox::new(&bins, split, cbox.end));
    }

    boxes
        .iter()
        .map(|b| Bin::mean(&bins[b.start..b.end]))
        .collect()
}

fn wu_palette<R: Raster + ?Sized>(image: &R, target: usize) -> Result<Vec<Rgba16>> {
    let mut rgb_pixels: Vec<Srgb<u8>> = Vec::with_capacity(image.width() * image.height());
    for y in 0..image.height() {
        for x in 0..image.width() {
            let px = image.pixel(x, y);
            if px.is_transparent() {
                continue;
            }
            let [r, g, b, _] = px.to_rgba8();
            rgb_pixels.push(Srgb::new(r, g, b));
        }
    }
    if rgb_pixels.is_empty() {
        return Ok(Vec::new());
    }

    let palette_size = PaletteSize::try_from(target.min(255) as u8).unwrap_or(PaletteSize::MAX);
    let palette = Pipeline::new()
        .palette_size(palette_size)
        .quantize_method(WuMethod::Wu)
        .ditherer(None)
        .input_slice(&rgb_pixels)
        .map_err(|e| SixelError::Quantization(e.to_string()))?
        .output_srgb8_palette();

    Ok(palette
        .iter()
        .take(target)
        .map(|c| Rgba16::from_rgba8([c.red, c.green, c.blue, 0xff]))
        .collect())
}

#[inline]
fn distance(a: [i64; 3], b: Rgba16) -> i64 {
    let dr = a[0] - b.r as i64;
    let dg = a[1] - b.g as i64;
    let db = a[2] - b.b as i64;
    dr * dr + dg * dg + db * db
}

fn nearest(palette: &[Rgba16], color: [i64; 3]) -> u8 {
    palette
        .iter()
        .enumerate()
        .min_by_key(|(_, p)| distance(color, **p))
        .map(|(i, _)| i as u8)
        .unwrap_or(0)
}

fn map_nearest<R: Raster + ?Sized>(image: &R, palette: &[Rgba16]) -> Vec<u8> {
    let mut cache: HashMap<[u16; 3], u8> = HashMap::new();
    let mut indices = Vec::with_capacity(image.width() * image.height());
    for y in 0..image.height() {
        for x in 0..image.width() {
            let px = image.pixel(x, y);
            if px.is_transparent() {
                indices.push(0);
                continue;
            }
            let idx = *cache
                .entry([px.r, px.g, px.b])
                .or_insert_with(|| nearest(palette, [px.r as i64, px.g as i64, px.b as i64]));
            indices.push(idx);
        }
    }
    indices
}

/// Floyd-Steinberg error diffusion:
///
/// ```text
///           curr   7/16
///   3/16    5/16   1/16
/// ```
///
/// Transparent pixels neither receive nor spread error.
fn map_floyd_steinberg<R: Raster + ?Sized>(image: &R, palette: &[Rgba16]) -> Vec<u8> {
    let (width, height) = (image.width(), image.height());
    let mut indices = Vec::with_capacity(width * height);
    // error carried into the current and the next row, padded by one
    // column on each side
    let mut current = vec![[0i64; 3]; width + 2];
    let mut next = vec![[0i64; 3]; width + 2];

    for y in 0..height {
        for x in 0..width {
            let px = image.pixel(x, y);
            if px.is_transparent() {
                indices.push(0);
                continue;
            }
            let carried = current[x + 1];
            let wanted = [
                (px.r as i64 + carried[0] / 16).clamp(0, u16::MAX as i64),
                (px.g as i64 + carried[1] / 16).clamp(0, u16::MAX as i64),
                (px.b as i64 + carried[2] / 16).clamp(0, u16::MAX as i64),
            ];
            let idx = nearest(palette, wanted);
            indices.push(idx);

            let Some(chosen) = palette.get(idx as usize) else {
                continue;
            };
            let err = [
                wanted[0] - chosen.r as i64,
                wanted[1] - chosen.g as i64,
                wanted[2] - chosen.b as i64,
            ];
            for c in 0..3 {
                current[x + 2][c] += err[c] * 7;
                next[x][c] += err[c] * 3;
                next[x + 1][c] += err[c] * 5;
                next[x + 2][c] += err[c];
            }
        }
        std::mem::swap(&mut current, &mut next);
        next.iter_mut().for_each(|e| *e = [0; 3]);
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::SixelImage;

    fn rgba(width: usize, height: usize, f: impl Fn(usize, usize) -> [u8; 4]) -> SixelImage {
        let mut pixels = Vec::with_capacity(width * height * 4);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&f(x, y));
            }
        }
        SixelImage::from_rgba(pixels, width, height).unwrap()
    }

    #[test]
    fn test_zero_area_returns_none() {
        let img = SixelImage::from_rgba(Vec::new(), 0, 5).unwrap();
        assert!(quantize(&img, &QuantizeOptions::default()).unwrap().is_none());
    }

    #[test]
    fn test_few_colors_kept_exactly() {
        let colors = [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255]];
        let img = rgba(9, 4, |x, _| colors[x % 3]);
        let out = quantize(&img, &QuantizeOptions::default()).unwrap().unwrap();
        assert_eq!(out.palette.len(), 3);
        for y in 0..4 {
            for x in 0..9 {
                assert_eq!(out.pixel(x, y).to_rgba8(), colors[x % 3]);
            }
        }
    }

    #[test]
    fn test_palette_bound_respected() {
        let img = rgba(64, 64, |x, y| [(x * 4) as u8, (y * 4) as u8, 128, 255]);
        let opts = QuantizeOptions {
            max_colors: 16,
            ..Default::default()
        };
        let out = quantize(&img, &opts).unwrap().unwrap();
        assert_eq!(out.palette.len(), 15);
        assert!(out.indices.iter().all(|&i| (i as usize) < 15));
    }

    #[test]
    fn test_max_colors_clamped_to_two() {
        let img = rgba(8, 8, |x, _| if x < 4 { [0, 0, 0, 255] } else { [255; 4] });
        let opts = QuantizeOptions {
            max_colors: 0,
            ..Default::default()
        };
        let out = quantize(&img, &opts).unwrap().unwrap();
        assert_eq!(out.palette.len(), 1);
    }

    #[test]
    fn test_indexed_fast_path_borrows() {
        let palette = vec![
            Rgba16::from_rgba8([10, 20, 30, 255]),
            Rgba16::from_rgba8([40, 50, 60, 255]),
        ];
        let img = IndexedImage::new(2, 2, palette, vec![0, 1, 1, 0]).unwrap();
        let out = quantize(&img, &QuantizeOptions::default()).unwrap().unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(*out, img);
    }

    #[test]
    fn test_indexed_with_large_palette_is_requantized() {
        let palette: Vec<Rgba16> = (0..8)
            .map(|i| Rgba16::from_rgba8([i * 30, 0, 0, 255]))
            .collect();
        let img = IndexedImage::new(8, 1, palette, (0..8).collect()).unwrap();
        let opts = QuantizeOptions {
            max_colors: 4,
            ..Default::default()
        };
        let out = quantize(&img, &opts).unwrap().unwrap();
        assert!(matches!(out, Cow::Owned(_)));
        assert!(out.palette.len() <= 3);
    }

    #[test]
    fn test_transparent_pixels_excluded_from_palette() {
        let img = rgba(4, 1, |x, _| {
            if x == 0 {
                [255, 255, 255, 0]
            } else {
                [0, 0, 0, 255]
            }
        });
        let out = quantize(&img, &QuantizeOptions::default()).unwrap().unwrap();
        assert_eq!(out.palette, vec![Rgba16::from_rgba8([0, 0, 0, 255])]);
    }

    #[test]
    fn test_dither_mixes_two_colors_on_midtone() {
        // a flat mid grey against a black/white palette must dither into a
        // mix of both
        let img = rgba(16, 16, |x, y| {
            if x == 0 && y == 0 {
                [0, 0, 0, 255]
            } else if x == 1 && y == 0 {
                [255, 255, 255, 255]
            } else {
                [128, 128, 128, 255]
            }
        });
        let palette = vec![
            Rgba16::from_rgba8([0, 0, 0, 255]),
            Rgba16::from_rgba8([255, 255, 255, 255]),
        ];
        let indices = map_floyd_steinberg(&img, &palette);
        let whites = indices.iter().filter(|&&i| i == 1).count();
        assert!(whites > 80 && whites < 176, "whites = {whites}");

        let flat = map_nearest(&img, &palette);
        let flat_whites = flat.iter().filter(|&&i| i == 1).count();
        assert!(flat_whites == 1 || flat_whites == 255);
    }

    #[test]
    fn test_median_cut_is_deterministic() {
        let img = rgba(32, 32, |x, y| [(x * 8) as u8, (y * 8) as u8, ((x + y) * 4) as u8, 255]);
        let opts = QuantizeOptions {
            max_colors: 32,
            ..Default::default()
        };
        let a = quantize(&img, &opts).unwrap().unwrap().into_owned();
        let b = quantize(&img, &opts).unwrap().unwrap().into_owned();
        assert_eq!(a, b);
    }

    #[test]
    fn test_wu_ignores_transparent_pixels() {
        let img = rgba(8, 2, |x, _| {
            if x < 4 {
                [255, 0, 0, 0]
            } else {
                [0, 0, 255, 255]
            }
        });
        let palette = wu_palette(&img, 15).unwrap();
        assert!(!palette.is_empty());
        // only the opaque blue population is sampled
        for c in &palette {
            let [r, _, b, _] = c.to_rgba8();
            assert!(r < 8 && b > 247, "{c:?}");
        }

        let clear = rgba(3, 3, |_, _| [9, 9, 9, 0]);
        assert!(wu_palette(&clear, 15).unwrap().is_empty());
    }
}

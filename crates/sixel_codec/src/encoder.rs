//! SIXEL encoder: palette reduction followed by band-wise run-length output.

use std::io::Write;

use crate::image::{IndexedImage, Raster};
use crate::quant::{quantize, QuantizeMethod, QuantizeOptions};
use crate::{Result, SIXEL_BAND_HEIGHT};

/// `DECGRI` arguments above this are split, real VTs cap the repeat count.
const MAX_REPEAT_RUN: usize = 255;

/// Options for the SIXEL encoder.
#[derive(Clone, Debug)]
pub struct EncodeOptions {
    /// Maximum number of colors, counting the reserved transparent slot.
    /// Clamped to 2-256, so 2 gives a single paintable color.
    pub max_colors: u16,

    /// Apply Floyd-Steinberg dithering when the palette has to be reduced.
    pub dither: bool,

    /// Canvas width to draw; pixels beyond the source are left unpainted.
    pub width: Option<usize>,

    /// Canvas height to draw; pixels beyond the source are left unpainted.
    pub height: Option<usize>,

    /// Palette selection algorithm.
    pub quantize_method: QuantizeMethod,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            max_colors: 255,
            dither: false,
            width: None,
            height: None,
            quantize_method: QuantizeMethod::MedianCut,
        }
    }
}

impl EncodeOptions {
    fn quantize_options(&self) -> QuantizeOptions {
        QuantizeOptions {
            max_colors: self.max_colors,
            dither: self.dither,
            method: self.quantize_method,
        }
    }
}

/// Writes SIXEL images to a byte sink.
///
/// Every image is assembled in memory and handed to the sink with a single
/// `write_all`, so unbuffered handles such as `File` or `Stdout` see one
/// write per image.
///
/// # Example
/// ```ignore
/// use sixel_codec::{Encoder, EncodeOptions};
///
/// let mut encoder = Encoder::new(std::io::stdout()).with_options(EncodeOptions {
///     dither: true,
///     ..Default::default()
/// });
/// encoder.encode(&image)?;
/// ```
#[derive(Debug)]
pub struct Encoder<W: Write> {
    writer: W,
    options: EncodeOptions,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            options: EncodeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EncodeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &EncodeOptions {
        &self.options
    }

    /// Encodes `image` and writes it out. A zero-area image writes nothing.
    pub fn encode<R: Raster + ?Sized>(&mut self, image: &R) -> Result<()> {
        let sixel = sixel_encode(image, &self.options)?;
        if sixel.is_empty() {
            return Ok(());
        }
        self.writer.write_all(sixel.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Encode an image into a SIXEL string.
///
/// # Returns
/// The complete sequence from `ESC P` to `ESC \`, or an empty string when
/// the image has no pixels. Pixels with alpha 0 are never painted.
///
/// # Example
/// ```ignore
/// use sixel_codec::{sixel_encode, EncodeOptions, SixelImage};
///
/// let rgba = vec![255u8, 0, 0, 255, 0, 255, 0, 255]; // 2 pixels: red, green
/// let image = SixelImage::from_rgba(rgba, 2, 1)?;
/// let sixel = sixel_encode(&image, &EncodeOptions::default())?;
/// println!("{}", sixel);
/// ```
#[must_use = "this returns the encoded SIXEL string"]
pub fn sixel_encode<R: Raster + ?Sized>(image: &R, opts: &EncodeOptions) -> Result<String> {
    let (src_width, src_height) = (image.width(), image.height());
    if src_width == 0 || src_height == 0 {
        return Ok(String::new());
    }
    let width = opts.width.filter(|&w| w > 0).unwrap_or(src_width);
    let height = opts.height.filter(|&h| h > 0).unwrap_or(src_height);

    let Some(indexed) = quantize(image, &opts.quantize_options())? else {
        return Ok(String::new());
    };
    log::debug!(
        "encoding {}x{} canvas from {}x{} source with {} registers",
        width,
        height,
        src_width,
        src_height,
        indexed.palette.len()
    );

    let mut out = String::with_capacity(32 * 1024);
    write_header(&mut out, &indexed, width, height);
    BandWriter::new(image, &indexed, width, height).write_bands(&mut out);
    // String terminator: ESC \
    out.push_str("\x1b\\");
    Ok(out)
}

/// Encode with default options.
#[inline]
#[must_use = "this returns the encoded SIXEL string"]
pub fn sixel_encode_default<R: Raster + ?Sized>(image: &R) -> Result<String> {
    sixel_encode(image, &EncodeOptions::default())
}

fn write_header(out: &mut String, indexed: &IndexedImage, width: usize, height: usize) {
    // DECSIXEL introducer, then DECGRA raster attributes: 1:1 pixels
    out.push_str("\x1bP0;0;8q\"1;1;");
    write_number(out, width);
    out.push(';');
    write_number(out, height);

    // DECGCI definitions in RGB percent; register 0 stays unpainted
    for (i, c) in indexed.palette.iter().enumerate() {
        out.push('#');
        write_number(out, i + 1);
        out.push_str(";2;");
        write_number(out, c.r as usize * 100 / 0xffff);
        out.push(';');
        write_number(out, c.g as usize * 100 / 0xffff);
        out.push(';');
        write_number(out, c.b as usize * 100 / 0xffff);
    }
}

/// Per-band scratch state: one row of sixel bitmaps per palette entry.
struct BandWriter<'a, R: Raster + ?Sized> {
    source: &'a R,
    indexed: &'a IndexedImage,
    width: usize,
    height: usize,
    bitmaps: Vec<u8>,
    used: Vec<bool>,
    first_pass: bool,
}

impl<'a, R: Raster + ?Sized> BandWriter<'a, R> {
    fn new(source: &'a R, indexed: &'a IndexedImage, width: usize, height: usize) -> Self {
        let colors = indexed.palette.len();
        Self {
            source,
            indexed,
            width,
            height,
            bitmaps: vec![0; colors * width],
            used: vec![false; colors],
            first_pass: true,
        }
    }

    fn write_bands(&mut self, out: &mut String) {
        for band in 0..self.height.div_ceil(SIXEL_BAND_HEIGHT) {
            // DECGNL: next line
            if band > 0 {
                out.push('-');
            }
            self.collect_band(band * SIXEL_BAND_HEIGHT);
            self.write_passes(out);
        }
    }

    /// Sets bit `p` of column `x` in the bitmap of every color that paints
    /// row `y0 + p`.
    fn collect_band(&mut self, y0: usize) {
        let cols = self.width.min(self.source.width());
        let colors = self.used.len();
        for p in 0..SIXEL_BAND_HEIGHT {
            let y = y0 + p;
            if y >= self.height || y >= self.source.height() {
                break;
            }
            for x in 0..cols {
                if self.source.pixel(x, y).is_transparent() {
                    continue;
                }
                let idx = self.indexed.color_index_at(x, y) as usize;
                if idx >= colors {
                    continue;
                }
                self.used[idx] = true;
                self.bitmaps[idx * self.width + x] |= 1 << p;
            }
        }
    }

    fn write_passes(&mut self, out: &mut String) {
        for n in 0..self.used.len() {
            if !self.used[n] {
                continue;
            }
            self.used[n] = false;

            // DECGCR: back to the left margin before overlaying the next color
            if !self.first_pass {
                out.push('$');
            }
            self.first_pass = false;

            out.push('#');
            write_number(out, n + 1);

            let row = &mut self.bitmaps[n * self.width..(n + 1) * self.width];
            write_row(out, row);
            row.fill(0);
        }
    }
}

/// Run-length encodes one color pass. Trailing empty columns are dropped.
fn write_row(out: &mut String, row: &[u8]) {
    let end = row.iter().rposition(|&bits| bits != 0).map_or(0, |i| i + 1);
    let mut x = 0;
    while x < end {
        let bits = row[x];
        let mut run = 1;
        while x + run < end && row[x + run] == bits {
            run += 1;
        }
        write_run(out, bits, run);
        x += run;
    }
}

fn write_run(out: &mut String, bits: u8, mut run: usize) {
    let ch = (b'?' + bits) as char;
    while run > MAX_REPEAT_RUN {
        out.push('!');
        write_number(out, MAX_REPEAT_RUN);
        out.push(ch);
        run -= MAX_REPEAT_RUN;
    }
    if run > 3 {
        // DECGRI: graphics repeat introducer
        out.push('!');
        write_number(out, run);
        out.push(ch);
    } else {
        for _ in 0..run {
            out.push(ch);
        }
    }
}

/// Appends a decimal number without going through the formatter.
#[inline]
fn write_number(out: &mut String, mut n: usize) {
    if n == 0 {
        out.push('0');
        return;
    }

    let mut buf = [0u8; 20];
    let mut i = buf.len();

    while n > 0 {
        i -= 1;
        buf[i] = b'0' + (n % 10) as u8;
        n /= 10;
    }

    out.extend(buf[i..].iter().map(|&d| d as char));
}

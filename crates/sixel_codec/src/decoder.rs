//! SIXEL decoder.
//!
//! The parser is a small state machine over a peekable byte cursor. Each
//! state owns one sub-grammar (header, band data, raster attributes, color
//! introducer, repeat introducer) and returns the state to continue in.
//! Pixels land on a canvas that starts at 200x200 and doubles in whichever
//! dimension a command runs past; the result is cropped to the area that
//! was actually drawn.

use std::io::{BufRead, BufReader, ErrorKind, Read};

use crate::image::{PixelAspectRatio, SixelImage};
use crate::registers::{ColorRegisters, ColorSpace};
use crate::{
    Result, SixelError, SIXEL_BAND_HEIGHT, SIXEL_HEIGHT_LIMIT, SIXEL_PIXEL_LIMIT,
    SIXEL_WIDTH_LIMIT,
};

const ESC: u8 = 0x1b;
const INITIAL_CANVAS_SIZE: usize = 200;

/// Options for the SIXEL decoder.
#[derive(Clone, Debug)]
pub struct DecodeOptions {
    /// RGBA value of pixels no sixel painted. Transparent by default; pass
    /// the terminal background to get an opaque image.
    pub background: [u8; 4],
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            background: [0, 0, 0, 0],
        }
    }
}

/// Reads one SIXEL image from a byte source.
///
/// Bytes before the first `ESC` are skipped. Decoding stops at `ESC \` or at
/// the end of the stream, whichever comes first.
#[derive(Debug)]
pub struct Decoder<R: Read> {
    reader: R,
    options: DecodeOptions,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            options: DecodeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs the parser to completion and returns the cropped image.
    ///
    /// # Errors
    ///
    /// Any grammar violation aborts the decode; no partial image is
    /// returned. Read failures are passed through as [`SixelError::Io`].
    pub fn decode(self) -> Result<SixelImage> {
        let mut parser = Parser::new(self.reader, &self.options);
        parser.run()?;
        Ok(parser.finish())
    }
}

/// Decodes a complete SIXEL sequence held in memory.
///
/// # SIXEL Format
///
/// ```text
/// ESC P <params> q <sixel_data> ESC \
/// ```
///
/// # Returns
///
/// An RGBA image whose size is the bounding box of everything drawn:
/// the width is one past the rightmost column reached, the height one past
/// the lowest painted row. Unpainted pixels are transparent black.
///
/// # Example
///
/// ```rust
/// use sixel_codec::sixel_decode;
///
/// let sixel_data = b"\x1bPq#1;2;100;0;0#1~~~\x1b\\";
/// let image = sixel_decode(sixel_data)?;
///
/// assert_eq!((image.width, image.height), (3, 6));
/// assert_eq!(&image.pixels[0..4], &[255, 0, 0, 255]);
/// # Ok::<(), sixel_codec::SixelError>(())
/// ```
#[must_use = "this returns the decoded SixelImage"]
pub fn sixel_decode(data: &[u8]) -> Result<SixelImage> {
    Decoder::new(data).decode()
}

/// Parser states, one per sub-grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// `ESC P p1;p2;p3 q`
    Header,
    /// Sixel data, `$`, `-` and command introducers
    Ground,
    /// `ESC` seen inside picture data
    Escape,
    /// After `"`
    RasterAttributes,
    /// After `#`
    ColorIntroducer,
    /// After `!`
    RepeatIntroducer,
    Done,
}

/// Byte source with one byte of lookahead.
struct ByteCursor<R: Read> {
    inner: BufReader<R>,
    peeked: Option<u8>,
}

impl<R: Read> ByteCursor<R> {
    fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            peeked: None,
        }
    }

    /// Next byte, `None` at end of stream.
    fn next_byte(&mut self) -> Result<Option<u8>> {
        if let Some(b) = self.peeked.take() {
            return Ok(Some(b));
        }
        loop {
            match self.inner.fill_buf() {
                Ok(buf) => {
                    let Some(&b) = buf.first() else {
                        return Ok(None);
                    };
                    self.inner.consume(1);
                    return Ok(Some(b));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Next byte where the grammar requires one.
    fn require(&mut self) -> Result<u8> {
        self.next_byte()?.ok_or(SixelError::UnexpectedEof)
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        if self.peeked.is_none() {
            self.peeked = self.next_byte()?;
        }
        Ok(self.peeked)
    }

    /// Reads a decimal number; `None` when no digit follows.
    fn read_number(&mut self) -> Result<Option<u32>> {
        let mut value: Option<u32> = None;
        while let Some(b @ b'0'..=b'9') = self.peek()? {
            self.peeked = None;
            let digit = (b - b'0') as u32;
            value = Some(
                value
                    .unwrap_or(0)
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(digit))
                    .ok_or(SixelError::NumberOverflow)?,
            );
        }
        Ok(value)
    }

    /// Consumes `b` if it is the next byte.
    fn accept(&mut self, b: u8) -> Result<bool> {
        if self.peek()? == Some(b) {
            self.peeked = None;
            return Ok(true);
        }
        Ok(false)
    }
}

/// Growable RGBA working buffer.
struct Canvas {
    data: Vec<u8>,
    width: usize,
    height: usize,
    background: [u8; 4],
}

impl Canvas {
    fn new(width: usize, height: usize, background: [u8; 4]) -> Self {
        Self {
            data: background.repeat(width * height),
            width,
            height,
            background,
        }
    }

    /// Makes `cols x rows` addressable, doubling each dimension that is too
    /// small.
    fn ensure(&mut self, cols: usize, rows: usize) -> Result<()> {
        if cols <= self.width && rows <= self.height {
            return Ok(());
        }
        let mut width = self.width.max(1);
        while width < cols {
            width = width.saturating_mul(2);
        }
        let mut height = self.height.max(1);
        while height < rows {
            height = height.saturating_mul(2);
        }
        self.grow_to(width, height, cols, rows)
    }

    /// Makes `cols x rows` addressable without rounding up.
    fn reserve(&mut self, cols: usize, rows: usize) -> Result<()> {
        if cols <= self.width && rows <= self.height {
            return Ok(());
        }
        self.grow_to(cols.max(self.width), rows.max(self.height), cols, rows)
    }

    /// Grows to `width x height`, falling back to the exact request when the
    /// rounded size would break the limits.
    fn grow_to(&mut self, width: usize, height: usize, cols: usize, rows: usize) -> Result<()> {
        guard_dimensions(cols, rows)?;
        let (width, height) = if guard_dimensions(width, height).is_ok() {
            (width, height)
        } else {
            (cols.max(self.width), rows.max(self.height))
        };
        guard_dimensions(width, height)?;
        log::debug!(
            "growing canvas {}x{} -> {}x{}",
            self.width,
            self.height,
            width,
            height
        );
        self.resize(width, height);
        Ok(())
    }

    /// Copies the old content into a fresh allocation of the new size.
    fn resize(&mut self, new_width: usize, new_height: usize) {
        let mut new_data = self.background.repeat(new_width * new_height);
        let row_bytes = self.width * 4;
        for row in 0..self.height {
            let src_start = row * row_bytes;
            let dst_start = row * new_width * 4;
            new_data[dst_start..dst_start + row_bytes]
                .copy_from_slice(&self.data[src_start..src_start + row_bytes]);
        }
        self.data = new_data;
        self.width = new_width;
        self.height = new_height;
    }

    #[inline]
    fn paint_span(&mut self, y: usize, x: usize, len: usize, color: [u8; 4]) {
        if len == 0 || y >= self.height || x >= self.width {
            return;
        }
        let len = len.min(self.width - x);
        let start = (y * self.width + x) * 4;
        for px in self.data[start..start + len * 4].chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    /// Top-left `width x height` region, row-major.
    fn crop(&self, width: usize, height: usize) -> Vec<u8> {
        let width = width.min(self.width);
        let height = height.min(self.height);
        let mut out = Vec::with_capacity(width * height * 4);
        for row in 0..height {
            let start = row * self.width * 4;
            out.extend_from_slice(&self.data[start..start + width * 4]);
        }
        out
    }
}

fn guard_dimensions(width: usize, height: usize) -> Result<()> {
    if width > SIXEL_WIDTH_LIMIT
        || height > SIXEL_HEIGHT_LIMIT
        || width.saturating_mul(height) > SIXEL_PIXEL_LIMIT
    {
        return Err(SixelError::ImageTooLarge { width, height });
    }
    Ok(())
}

struct Parser<R: Read> {
    cursor: ByteCursor<R>,
    registers: ColorRegisters,
    canvas: Canvas,
    /// Color of the active register.
    color: [u8; 4],
    pos_x: usize,
    pos_y: usize,
    /// One past the rightmost column reached.
    extent_x: usize,
    /// One past the lowest row painted.
    extent_y: usize,
    aspect_ratio: PixelAspectRatio,
}

impl<R: Read> Parser<R> {
    fn new(reader: R, options: &DecodeOptions) -> Self {
        let registers = ColorRegisters::new();
        // register 0 is always seeded
        let color = registers.get(0).unwrap_or([0, 0, 0, 0xff]);
        Self {
            cursor: ByteCursor::new(reader),
            registers,
            canvas: Canvas::new(INITIAL_CANVAS_SIZE, INITIAL_CANVAS_SIZE, options.background),
            color,
            pos_x: 0,
            pos_y: 0,
            extent_x: 0,
            extent_y: 0,
            aspect_ratio: PixelAspectRatio::default(),
        }
    }

    fn run(&mut self) -> Result<()> {
        let mut state = State::Header;
        loop {
            state = match state {
                State::Header => self.header()?,
                State::Ground => self.ground()?,
                State::Escape => self.escape()?,
                State::RasterAttributes => self.raster_attributes()?,
                State::ColorIntroducer => self.color_introducer()?,
                State::RepeatIntroducer => self.repeat_introducer()?,
                State::Done => return Ok(()),
            };
        }
    }

    fn header(&mut self) -> Result<State> {
        loop {
            match self.cursor.next_byte()? {
                Some(ESC) => break,
                Some(_) => continue,
                None => return Err(SixelError::NoSixelData),
            }
        }
        match self.cursor.require()? {
            b'P' => {}
            other => return Err(SixelError::IllegalHeader(other)),
        }

        // device control parameters up to the final `q`
        let mut params: Vec<u32> = Vec::with_capacity(3);
        loop {
            let value = self.cursor.read_number()?;
            match self.cursor.require()? {
                b';' => params.push(value.unwrap_or(0)),
                b'q' => {
                    if value.is_some() || !params.is_empty() {
                        params.push(value.unwrap_or(0));
                    }
                    break;
                }
                ESC => return Err(SixelError::IllegalHeader(ESC)),
                _ => {}
            }
        }
        self.aspect_ratio = PixelAspectRatio::from_dcs_p1(params.first().copied().unwrap_or(0));
        log::trace!("sixel header params {:?}", params);
        Ok(State::Ground)
    }

    fn ground(&mut self) -> Result<State> {
        let Some(b) = self.cursor.next_byte()? else {
            // end of stream between commands is a clean end
            return Ok(State::Done);
        };
        let next = match b {
            b'\r' | b'\n' | 0x08 => State::Ground,
            ESC => State::Escape,
            b'"' => State::RasterAttributes,
            b'#' => State::ColorIntroducer,
            b'!' => State::RepeatIntroducer,
            // DECGCR
            b'$' => {
                self.pos_x = 0;
                State::Ground
            }
            // DECGNL
            b'-' => {
                self.pos_x = 0;
                self.pos_y = self.pos_y.saturating_add(SIXEL_BAND_HEIGHT);
                State::Ground
            }
            b'?'..=b'~' => {
                self.paint(b, 1)?;
                State::Ground
            }
            other => return Err(SixelError::IllegalToken(other)),
        };
        Ok(next)
    }

    fn escape(&mut self) -> Result<State> {
        match self.cursor.require()? {
            b'\\' => Ok(State::Done),
            other => Err(SixelError::IllegalToken(other)),
        }
    }

    /// `"pan;pad;width;height`
    fn raster_attributes(&mut self) -> Result<State> {
        let mut params = [0u32; 4];
        let mut count = 0usize;
        loop {
            let value = self.cursor.read_number()?.unwrap_or(0);
            if count < params.len() {
                params[count] = value;
            }
            count += 1;
            if !self.cursor.accept(b';')? {
                break;
            }
        }
        log::trace!("raster attributes {:?} ({} given)", params, count);

        if count >= 2 && params[0] > 0 && params[1] > 0 {
            self.aspect_ratio = PixelAspectRatio {
                pan: params[0].min(u16::MAX as u32) as u16,
                pad: params[1].min(u16::MAX as u32) as u16,
            };
        }
        let width = if count >= 3 { params[2] as usize } else { 0 };
        let height = if count >= 4 { params[3] as usize } else { 0 };
        if width > 0 || height > 0 {
            self.canvas.reserve(width, height)?;
        }
        Ok(State::Ground)
    }

    /// `#n` selects, `#n;cs;v1;v2;v3` defines and selects.
    fn color_introducer(&mut self) -> Result<State> {
        let register = self.cursor.read_number()?.unwrap_or(0) as usize;
        if self.cursor.accept(b';')? {
            let space = ColorSpace::from_param(self.cursor.read_number()?.unwrap_or(0));
            let mut values = [0u32; 3];
            for v in values.iter_mut() {
                self.expect_separator()?;
                *v = self.cursor.read_number()?.unwrap_or(0);
            }
            self.color = self
                .registers
                .define(register, space, values[0], values[1], values[2])?;
            log::trace!(
                "register {} = {:?} {:?} -> {:?}",
                register,
                space,
                values,
                self.color
            );
        } else {
            self.color = self.registers.get(register)?;
        }
        Ok(State::Ground)
    }

    fn expect_separator(&mut self) -> Result<()> {
        match self.cursor.require()? {
            b';' => Ok(()),
            _ => Err(SixelError::MalformedColor),
        }
    }

    /// `!count ch`
    fn repeat_introducer(&mut self) -> Result<State> {
        // a zero or missing count paints nothing and leaves the cursor
        let count = self.cursor.read_number()?.unwrap_or(0) as usize;
        match self.cursor.require()? {
            b @ b'?'..=b'~' if count > 0 => self.paint(b, count)?,
            b'?'..=b'~' => {}
            other => return Err(SixelError::IllegalRepeat(other)),
        }
        Ok(State::Ground)
    }

    /// Paints the 6-bit pattern of `ch` across `count` columns with the
    /// active color, bit 0 at the top of the band.
    fn paint(&mut self, ch: u8, count: usize) -> Result<()> {
        let bits = ch - b'?';
        let end_x = self.pos_x.saturating_add(count);
        let end_y = self.pos_y.saturating_add(SIXEL_BAND_HEIGHT);
        self.canvas.ensure(end_x, end_y)?;

        for p in 0..SIXEL_BAND_HEIGHT {
            if bits & (1 << p) != 0 {
                let y = self.pos_y + p;
                self.canvas.paint_span(y, self.pos_x, count, self.color);
                self.extent_y = self.extent_y.max(y + 1);
            }
        }

        self.pos_x = end_x;
        self.extent_x = self.extent_x.max(end_x);
        Ok(())
    }

    fn finish(self) -> SixelImage {
        let (width, height) = (self.extent_x, self.extent_y);
        log::debug!(
            "decoded {}x{} (canvas {}x{}, {} registers)",
            width,
            height,
            self.canvas.width,
            self.canvas.height,
            self.registers.len()
        );
        SixelImage {
            pixels: self.canvas.crop(width, height),
            width,
            height,
            aspect_ratio: self.aspect_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_numbers() {
        let mut cursor = ByteCursor::new(&b"123;;7x"[..]);
        assert_eq!(cursor.read_number().unwrap(), Some(123));
        assert!(cursor.accept(b';').unwrap());
        assert_eq!(cursor.read_number().unwrap(), None);
        assert!(cursor.accept(b';').unwrap());
        assert_eq!(cursor.read_number().unwrap(), Some(7));
        assert!(!cursor.accept(b';').unwrap());
        assert_eq!(cursor.next_byte().unwrap(), Some(b'x'));
        assert_eq!(cursor.next_byte().unwrap(), None);
    }

    #[test]
    fn test_cursor_overflow() {
        let mut cursor = ByteCursor::new(&b"99999999999"[..]);
        assert!(matches!(
            cursor.read_number(),
            Err(SixelError::NumberOverflow)
        ));
    }

    #[test]
    fn test_canvas_doubles_and_preserves() {
        let mut canvas = Canvas::new(2, 2, [0, 0, 0, 0]);
        canvas.paint_span(1, 1, 1, [9, 9, 9, 255]);
        canvas.ensure(3, 2).unwrap();
        assert_eq!((canvas.width, canvas.height), (4, 2));
        canvas.ensure(4, 9).unwrap();
        assert_eq!((canvas.width, canvas.height), (4, 16));
        let px = (canvas.width + 1) * 4;
        assert_eq!(&canvas.data[px..px + 4], &[9, 9, 9, 255]);
        assert_eq!(&canvas.data[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_canvas_reserve_is_exact() {
        let mut canvas = Canvas::new(2, 2, [1, 2, 3, 4]);
        canvas.reserve(5, 3).unwrap();
        assert_eq!((canvas.width, canvas.height), (5, 3));
        assert!(canvas.data.chunks_exact(4).all(|px| px == [1, 2, 3, 4]));
    }

    #[test]
    fn test_canvas_limits() {
        let mut canvas = Canvas::new(1, 1, [0; 4]);
        assert!(matches!(
            canvas.ensure(SIXEL_WIDTH_LIMIT + 1, 1),
            Err(SixelError::ImageTooLarge { .. })
        ));
        assert!(matches!(
            canvas.reserve(100_000, 100_000),
            Err(SixelError::ImageTooLarge { .. })
        ));
    }

    #[test]
    fn test_paint_span_clips() {
        let mut canvas = Canvas::new(3, 1, [0; 4]);
        canvas.paint_span(0, 1, 10, [5, 5, 5, 5]);
        assert_eq!(canvas.data, vec![0, 0, 0, 0, 5, 5, 5, 5, 5, 5, 5, 5]);
    }

    #[test]
    fn test_crop() {
        let mut canvas = Canvas::new(4, 4, [0; 4]);
        canvas.paint_span(1, 0, 2, [7, 7, 7, 7]);
        let out = canvas.crop(2, 2);
        assert_eq!(out, [[0u8; 4], [0; 4], [7; 4], [7; 4]].concat());
    }

    #[test]
    fn test_states_progress() {
        let mut parser = Parser::new(&b"\x1bP0;0;8q\"1;1;2;6#1;2;0;0;100#1!2~\x1b\\"[..], &DecodeOptions::default());
        assert_eq!(parser.header().unwrap(), State::Ground);
        assert_eq!(parser.ground().unwrap(), State::RasterAttributes);
        assert_eq!(parser.raster_attributes().unwrap(), State::Ground);
        assert_eq!(parser.ground().unwrap(), State::ColorIntroducer);
        assert_eq!(parser.color_introducer().unwrap(), State::Ground);
        assert_eq!(parser.ground().unwrap(), State::ColorIntroducer);
        assert_eq!(parser.color_introducer().unwrap(), State::Ground);
        assert_eq!(parser.ground().unwrap(), State::RepeatIntroducer);
        assert_eq!(parser.repeat_introducer().unwrap(), State::Ground);
        assert_eq!(parser.ground().unwrap(), State::Escape);
        assert_eq!(parser.escape().unwrap(), State::Done);
        assert_eq!((parser.pos_x, parser.extent_x, parser.extent_y), (2, 2, 6));
        assert!(parser.aspect_ratio.is_square());
    }
}

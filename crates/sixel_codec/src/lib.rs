//! # sixel_codec
//!
//! A Rust DECSIXEL encoder and decoder.
//!
//! ## Features
//!
//! - **Encoder**: median-cut palette reduction with optional Floyd-Steinberg
//!   dithering, written out one 6-row band at a time with run-length compression
//! - **Decoder**: a byte-level state machine over any [`std::io::Read`] that
//!   rebuilds the image, its color registers and a canvas that grows on demand
//!
//! ## Quick Start
//!
//! ### Encoding an image to SIXEL
//!
//! ```ignore
//! use sixel_codec::{sixel_encode, EncodeOptions, SixelImage};
//!
//! // RGBA image data (4 bytes per pixel)
//! let rgba = vec![255u8, 0, 0, 255, 0, 255, 0, 255]; // red and green pixels
//! let image = SixelImage::from_rgba(rgba, 2, 1)?;
//! let sixel = sixel_encode(&image, &EncodeOptions::default())?;
//! print!("{}", sixel);
//! ```
//!
//! ### Decoding SIXEL to image data
//!
//! ```ignore
//! use sixel_codec::sixel_decode;
//!
//! let sixel_data = b"\x1bPq#1;2;100;0;0#1~-\x1b\\";
//! let image = sixel_decode(sixel_data)?;
//! // image.pixels contains RGBA pixel data (4 bytes per pixel)
//! println!("{}x{}", image.width, image.height);
//! ```

use thiserror::Error;

pub mod decoder;
pub mod encoder;
pub mod image;
pub mod quant;
pub mod registers;

pub use decoder::{sixel_decode, DecodeOptions, Decoder};
pub use encoder::{sixel_encode, sixel_encode_default, EncodeOptions, Encoder};
pub use image::{IndexedImage, PixelAspectRatio, Raster, Rgba16, SixelImage};
pub use quant::{quantize, QuantizeMethod, QuantizeOptions};
pub use registers::{hls_to_rgb, percent_to_byte, ColorRegisters, ColorSpace};

/// Errors that can occur during SIXEL encoding or decoding.
#[derive(Debug, Error)]
pub enum SixelError {
    /// The byte after the introducing ESC was not `P`
    #[error("invalid format: illegal header byte 0x{0:02x}")]
    IllegalHeader(u8),

    /// A byte that starts no known command appeared in picture data
    #[error("invalid format: illegal data token 0x{0:02x}")]
    IllegalToken(u8),

    /// A repeat introducer was not followed by a sixel data character
    #[error("invalid format: illegal repeating data token 0x{0:02x}")]
    IllegalRepeat(u8),

    /// A color definition is missing one of its separators
    #[error("invalid format: illegal color specifier")]
    MalformedColor,

    /// A color register was selected before anything defined it
    #[error("invalid format: undefined color number {0}")]
    UndefinedRegister(usize),

    /// Register numbers must fit the register table
    #[error("color register {0} out of range")]
    RegisterOutOfRange(usize),

    /// A numeric field does not fit in 32 bits
    #[error("invalid format: numeric parameter overflow")]
    NumberOverflow,

    /// The stream ended in the middle of a command
    #[error("unexpected end of SIXEL stream")]
    UnexpectedEof,

    /// No SIXEL data found in input
    #[error("no SIXEL data found (missing DCS introducer)")]
    NoSixelData,

    /// Canvas dimensions exceed the decoder limits
    #[error("image dimensions too large: {width}x{height}")]
    ImageTooLarge { width: usize, height: usize },

    /// Buffer size doesn't match expected size for dimensions
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Color quantization failed
    #[error("quantization error: {0}")]
    Quantization(String),

    /// Reading the source or writing the sink failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for SIXEL operations.
pub type Result<T> = core::result::Result<T, SixelError>;

/// Number of color registers a stream may address.
pub const SIXEL_PALETTE_MAX: usize = 256;

/// Height of one sixel band in pixels.
pub const SIXEL_BAND_HEIGHT: usize = 6;

pub(crate) const SIXEL_WIDTH_LIMIT: usize = 1_000_000;
pub(crate) const SIXEL_HEIGHT_LIMIT: usize = 1_000_000;
// 256 MiB of RGBA
pub(crate) const SIXEL_PIXEL_LIMIT: usize = 64 * 1024 * 1024;

//! sixel - Encode and decode SIXEL graphics
//!
//! A command-line tool for converting images to/from SIXEL format.

use clap::{Parser, Subcommand, ValueEnum};
use sixel_codec::{DecodeOptions, Decoder, EncodeOptions, Encoder, QuantizeMethod, SixelImage};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sixel")]
#[command(version)]
#[command(about = "Encode and decode SIXEL graphics", long_about = None)]
struct Cli {
    /// Log level (error, warn, info, debug, trace); RUST_LOG applies when unset
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode an image to SIXEL format
    Encode {
        /// Input image file (PNG, JPEG, GIF, WebP)
        input: PathBuf,

        /// Output SIXEL file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum number of colors including the reserved slot (2-256)
        #[arg(short, long, default_value_t = 255)]
        colors: u16,

        /// Apply Floyd-Steinberg dithering
        #[arg(short, long)]
        dither: bool,

        /// Canvas width (default: image width)
        #[arg(long)]
        width: Option<usize>,

        /// Canvas height (default: image height)
        #[arg(long)]
        height: Option<usize>,

        /// Palette selection algorithm
        #[arg(short, long, value_enum, default_value_t = Method::MedianCut)]
        method: Method,
    },

    /// Decode a SIXEL file to PNG
    Decode {
        /// Input SIXEL file (use - for stdin)
        input: PathBuf,

        /// Output PNG file (default: input with .png extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Color of unpainted pixels as RRGGBB or RRGGBBAA hex
        #[arg(short, long, value_parser = parse_background)]
        background: Option<[u8; 4]>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    MedianCut,
    Wu,
}

impl From<Method> for QuantizeMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::MedianCut => QuantizeMethod::MedianCut,
            Method::Wu => QuantizeMethod::Wu,
        }
    }
}

fn parse_background(s: &str) -> Result<[u8; 4], String> {
    let hex = s.trim_start_matches('#');
    if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
        return Err(format!("expected RRGGBB or RRGGBBAA, got '{}'", s));
    }
    let mut rgba = [0, 0, 0, 0xff];
    for (i, slot) in rgba.iter_mut().enumerate().take(hex.len() / 2) {
        *slot = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|e| format!("invalid hex color '{}': {}", s, e))?;
    }
    Ok(rgba)
}

fn init_logging(level: Option<&str>) {
    let mut builder = match level {
        Some(level) => {
            let mut builder = env_logger::Builder::new();
            builder.filter_level(level.parse().unwrap_or(log::LevelFilter::Warn));
            builder
        }
        None => env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")),
    };
    builder.init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match cli.command {
        Commands::Encode {
            input,
            output,
            colors,
            dither,
            width,
            height,
            method,
        } => {
            let img = image::open(&input)
                .map_err(|e| format!("Failed to open '{}': {}", input.display(), e))?;
            let rgba_img = img.to_rgba8();
            let (img_width, img_height) = rgba_img.dimensions();
            let image =
                SixelImage::from_rgba(rgba_img.into_raw(), img_width as usize, img_height as usize)?;

            log::info!(
                "encoding '{}' ({}x{}) with {} colors, dither={}",
                input.display(),
                img_width,
                img_height,
                colors.clamp(2, 256),
                dither
            );

            let opts = EncodeOptions {
                max_colors: colors,
                dither,
                width,
                height,
                quantize_method: method.into(),
            };

            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .map_err(|e| format!("Failed to create '{}': {}", path.display(), e))?;
                    Encoder::new(BufWriter::new(file))
                        .with_options(opts)
                        .encode(&image)?;
                    log::info!("written '{}'", path.display());
                }
                None => {
                    Encoder::new(io::stdout().lock())
                        .with_options(opts)
                        .encode(&image)?;
                }
            }
        }

        Commands::Decode {
            input,
            output,
            background,
        } => {
            let opts = DecodeOptions {
                background: background.unwrap_or_default(),
            };
            let decoded = if input.to_string_lossy() == "-" {
                Decoder::new(io::stdin().lock()).with_options(opts).decode()?
            } else {
                let file = File::open(&input)
                    .map_err(|e| format!("Failed to read '{}': {}", input.display(), e))?;
                Decoder::new(file).with_options(opts).decode()?
            };

            let output_path = output.unwrap_or_else(|| {
                let mut p = input.clone();
                p.set_extension("png");
                p
            });

            let (width, height) = (decoded.width, decoded.height);
            let img = image::RgbaImage::from_raw(width as u32, height as u32, decoded.pixels)
                .ok_or("Failed to create image from decoded data")?;
            img.save(&output_path)?;

            log::info!(
                "decoded {}x{} pixels -> '{}'",
                width,
                height,
                output_path.display()
            );
        }
    }

    Ok(())
}

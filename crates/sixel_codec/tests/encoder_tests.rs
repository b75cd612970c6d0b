use ::image::{Rgba, RgbaImage};
use pretty_assertions::assert_eq;
use sixel_codec::*;

fn rgba(width: usize, height: usize, f: impl Fn(usize, usize) -> [u8; 4]) -> SixelImage {
    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&f(x, y));
        }
    }
    SixelImage::from_rgba(pixels, width, height).unwrap()
}

/// Number of `#n;2;r;g;b` register definitions in an encoded image.
fn count_definitions(sixel: &str) -> usize {
    sixel
        .split('#')
        .skip(1)
        .filter(|cmd| cmd.split(';').nth(1) == Some("2"))
        .count()
}

#[test]
fn test_encode_structure() {
    let img = rgba(3, 2, |x, _| if x == 0 { [255, 0, 0, 255] } else { [0, 0, 255, 255] });
    let sixel = sixel_encode_default(&img).unwrap();

    assert!(sixel.starts_with("\x1bP0;0;8q\"1;1;3;2"), "{sixel}");
    assert!(sixel.ends_with("\x1b\\"));
    assert_eq!(count_definitions(&sixel), 2);
    // every data byte is printable
    assert!(sixel[2..sixel.len() - 2].bytes().all(|b| (0x20..0x7f).contains(&b)));
}

#[test]
fn test_encode_exact_stream() {
    let img = rgba(4, 1, |_, _| [255, 255, 255, 255]);
    let sixel = sixel_encode_default(&img).unwrap();
    assert_eq!(sixel, "\x1bP0;0;8q\"1;1;4;1#1;2;100;100;100#1!4@\x1b\\");
}

#[test]
fn test_encode_percent_is_truncated() {
    // 128 * 257 * 100 / 65535 = 50.19...
    let img = rgba(1, 1, |_, _| [128, 0, 0, 255]);
    let sixel = sixel_encode_default(&img).unwrap();
    assert!(sixel.contains("#1;2;50;0;0"), "{sixel}");
}

#[test]
fn test_palette_bound() {
    let img = rgba(32, 32, |x, y| [(x * 8) as u8, (y * 8) as u8, 128, 255]);
    for max_colors in [2u16, 4, 16, 64] {
        let opts = EncodeOptions {
            max_colors,
            ..Default::default()
        };
        let sixel = sixel_encode(&img, &opts).unwrap();
        let defined = count_definitions(&sixel);
        assert!(
            defined >= 1 && defined < max_colors as usize,
            "{max_colors} colors gave {defined} registers"
        );
    }
}

#[test]
fn test_palette_bound_with_dither_and_wu() {
    let img = rgba(40, 20, |x, y| [(x * 6) as u8, (y * 12) as u8, ((x + y) * 4) as u8, 255]);
    for method in [QuantizeMethod::MedianCut, QuantizeMethod::Wu] {
        let opts = EncodeOptions {
            max_colors: 16,
            dither: true,
            quantize_method: method,
            ..Default::default()
        };
        let sixel = sixel_encode(&img, &opts).unwrap();
        assert!(count_definitions(&sixel) <= 15, "{method:?}");

        let decoded = sixel_decode(sixel.as_bytes()).unwrap();
        assert_eq!((decoded.width, decoded.height), (40, 20), "{method:?}");
    }
}

#[test]
fn test_run_length_compression() {
    let img = rgba(300, 6, |_, _| [0, 255, 0, 255]);
    let sixel = sixel_encode_default(&img).unwrap();
    assert!(sixel.contains("#1!255~!45~"), "{sixel}");

    let img = rgba(3, 6, |_, _| [0, 255, 0, 255]);
    let sixel = sixel_encode_default(&img).unwrap();
    assert!(sixel.contains("#1~~~"), "{sixel}");
}

#[test]
fn test_fully_transparent_image() {
    let img = rgba(4, 4, |_, _| [255, 255, 255, 0]);
    let sixel = sixel_encode_default(&img).unwrap();
    assert_eq!(sixel, "\x1bP0;0;8q\"1;1;4;4\x1b\\");
}

#[test]
fn test_indexed_image_keeps_its_palette() {
    let palette = vec![
        Rgba16::from_rgba8([255, 0, 0, 255]),
        Rgba16::from_rgba8([0, 0, 255, 255]),
    ];
    let img = IndexedImage::new(2, 1, palette, vec![1, 0]).unwrap();
    let sixel = sixel_encode_default(&img).unwrap();
    assert_eq!(
        sixel,
        "\x1bP0;0;8q\"1;1;2;1#1;2;100;0;0#2;2;0;0;100#1?@$#2@\x1b\\"
    );
}

#[test]
fn test_encoder_into_writer() {
    let img = rgba(2, 2, |_, _| [51, 102, 153, 255]);
    let mut encoder = Encoder::new(Vec::new()).with_options(EncodeOptions {
        max_colors: 8,
        ..Default::default()
    });
    assert_eq!(encoder.options().max_colors, 8);
    encoder.encode(&img).unwrap();
    let written = String::from_utf8(encoder.into_inner()).unwrap();
    assert_eq!(written, sixel_encode_default(&img).unwrap());
}

#[test]
fn test_encode_png() {
    let png = RgbaImage::from_fn(17, 13, |x, y| {
        Rgba([(x * 15) as u8, (y * 19) as u8, 200, 255])
    });
    let img = SixelImage::from_rgba(png.clone().into_raw(), 17, 13).unwrap();
    let sixel = sixel_encode_default(&img).unwrap();

    let decoded = sixel_decode(sixel.as_bytes()).unwrap();
    assert_eq!((decoded.width, decoded.height), (17, 13));
    // at most 254 colors for 221 distinct inputs, so nothing is merged
    for (x, y, p) in png.enumerate_pixels() {
        let got = decoded.pixel_rgba8(x as usize, y as usize);
        for c in 0..3 {
            // percent precision
            assert!(
                (got[c] as i32 - p.0[c] as i32).abs() <= 3,
                "({x},{y}) {got:?} vs {:?}",
                p.0
            );
        }
    }
}

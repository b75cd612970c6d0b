#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sixel_codec::{sixel_decode, sixel_encode_default, SixelImage};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    width: u8,
    height: u8,
    pixels: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let width = (input.width as usize).clamp(1, 64);
    let height = (input.height as usize).clamp(1, 64);

    let expected_size = width * height * 4;
    if input.pixels.len() < expected_size {
        return;
    }

    let Ok(image) = SixelImage::from_rgba(input.pixels[..expected_size].to_vec(), width, height)
    else {
        return;
    };
    let sixel = sixel_encode_default(&image).expect("encoding a valid image");
    let decoded = sixel_decode(sixel.as_bytes()).expect("decoding our own output");

    // the decoder crops to what was painted, transparent edges included
    assert!(decoded.width <= width);
    assert!(decoded.height <= height);
    for y in 0..decoded.height {
        for x in 0..decoded.width {
            let src = image.pixel_rgba8(x, y);
            let out = decoded.pixel_rgba8(x, y);
            assert_eq!(src[3] == 0, out[3] == 0, "alpha at ({x},{y})");
        }
    }
});

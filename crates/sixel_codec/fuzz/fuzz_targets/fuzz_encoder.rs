#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sixel_codec::{sixel_encode, EncodeOptions, QuantizeMethod, SixelImage};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    width: u8,
    height: u8,
    pixels: Vec<u8>,
    max_colors: u16,
    dither: bool,
    wu: bool,
    canvas_width: Option<u8>,
    canvas_height: Option<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let width = (input.width as usize).clamp(1, 256);
    let height = (input.height as usize).clamp(1, 256);

    let expected_size = width * height * 4;
    if input.pixels.len() < expected_size {
        return;
    }

    let Ok(image) = SixelImage::from_rgba(input.pixels[..expected_size].to_vec(), width, height)
    else {
        return;
    };
    let opts = EncodeOptions {
        max_colors: input.max_colors,
        dither: input.dither,
        width: input.canvas_width.map(usize::from),
        height: input.canvas_height.map(usize::from),
        quantize_method: if input.wu {
            QuantizeMethod::Wu
        } else {
            QuantizeMethod::MedianCut
        },
    };

    let _ = sixel_encode(&image, &opts);
});

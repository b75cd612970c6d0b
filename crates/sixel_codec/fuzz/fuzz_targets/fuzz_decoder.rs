#![no_main]

use libfuzzer_sys::fuzz_target;
use sixel_codec::sixel_decode;

fuzz_target!(|data: &[u8]| {
    if let Ok(image) = sixel_decode(data) {
        assert_eq!(image.pixels.len(), image.width * image.height * 4);
    }
});

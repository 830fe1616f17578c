#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tjsession::{CodecSession, Flags, Limits, PixelFormat};

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    desired_width: u16,
    desired_height: u16,
    format: u8,
    fast_upsample: bool,
    jpeg: &'a [u8],
}

fuzz_target!(|input: Input<'_>| {
    let Ok(mut session) = CodecSession::open_with(Limits::strict()) else {
        return;
    };
    let format = PixelFormat::all()[input.format as usize % PixelFormat::all().len()];
    let flags = if input.fast_upsample {
        Flags::FAST_UPSAMPLE
    } else {
        Flags::empty()
    };

    if session.decompress_header(input.jpeg).is_ok() {
        let desired = (input.desired_width as u32, input.desired_height as u32);
        if let Ok(image) = session.decompress(desired.0, desired.1, format, flags) {
            assert!(desired.0 == 0 || image.width() <= desired.0);
            assert!(desired.1 == 0 || image.height() <= desired.1);
            assert_eq!(
                image.data().len(),
                image.width() as usize * image.height() as usize * format.pixel_size()
            );
        }
    }
    session.close();
});

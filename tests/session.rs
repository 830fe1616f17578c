// tests/session.rs
//
// End-to-end session tests: compress, decompress, scaled decode, planar YUV

use rayon::prelude::*;
use tjsession::engine::{scaled_height, scaled_width};
use tjsession::{
    yuv_buffer_size, CodecSession, Flags, ImageDescriptor, PackedImage, PixelFormat,
    SourceImage, Subsampling,
};

const WHITE: [u8; 3] = [255, 255, 255];
const BLACK: [u8; 3] = [0, 0, 0];
const RED: [u8; 3] = [255, 0, 0];
const YELLOW: [u8; 3] = [255, 255, 0];

// Expected colour of the 8x8 checkerboard at (x, y). Even blocks are white
// over black, odd blocks red over yellow.
fn checker_color(x: u32, y: u32, height: u32) -> [u8; 3] {
    let odd = (x / 8 + y / 8) % 2 == 1;
    let top = y < height / 2;
    match (odd, top) {
        (false, true) => WHITE,
        (false, false) => BLACK,
        (true, true) => RED,
        (true, false) => YELLOW,
    }
}

fn checkerboard(width: u32, height: u32, format: PixelFormat) -> PackedImage {
    let mut image = PackedImage::zeroed(width, height, format).unwrap();
    let ps = format.pixel_size();
    for y in 0..height {
        for x in 0..width {
            let [r, g, b] = checker_color(x, y, height);
            let i = (y * width + x) as usize * ps;
            let px = &mut image.data_mut()[i..i + ps];
            px.fill(0xFF);
            match (format.red_offset(), format.green_offset(), format.blue_offset()) {
                (Some(ro), Some(go), Some(bo)) => {
                    px[ro] = r;
                    px[go] = g;
                    px[bo] = b;
                }
                _ => px[0] = if r == g { r } else { 128 },
            }
        }
    }
    image
}

fn compress(image: PackedImage, subsampling: Subsampling, quality: u8) -> Vec<u8> {
    let mut session = CodecSession::open().unwrap();
    session.associate_source_image(image).unwrap();
    let jpeg = session.compress_with(subsampling, quality, Flags::empty()).unwrap();
    session.close();
    jpeg
}

fn decompress(jpeg: &[u8], format: PixelFormat) -> PackedImage {
    let mut session = CodecSession::open().unwrap();
    session.decompress_header(jpeg).unwrap();
    let out = session.decompress(0, 0, format, Flags::empty()).unwrap();
    session.close();
    out
}

fn assert_close(actual: u8, expected: u8, tolerance: u8, what: &str) {
    assert!(
        actual.abs_diff(expected) <= tolerance,
        "{what}: got {actual}, expected {expected} +/- {tolerance}"
    );
}

mod round_trip_tests {
    use super::*;

    #[test]
    fn test_checkerboard_444_q100() {
        let (w, h) = (35, 33);
        let jpeg = compress(checkerboard(w, h, PixelFormat::Rgb), Subsampling::Samp444, 100);
        let out = decompress(&jpeg, PixelFormat::Rgb);
        assert_eq!((out.width(), out.height()), (w, h));

        for y in 0..h {
            for x in 0..w {
                let expected = checker_color(x, y, h);
                let px = out.pixel(x, y).unwrap();
                for c in 0..3 {
                    assert_close(px[c], expected[c], 1, &format!("({x},{y}) channel {c}"));
                }
            }
        }
    }

    #[test]
    fn test_checkerboard_to_gray() {
        let (w, h) = (35, 33);
        let jpeg = compress(checkerboard(w, h, PixelFormat::Rgb), Subsampling::Samp444, 100);
        let out = decompress(&jpeg, PixelFormat::Gray);

        // Luma of white, black, red and yellow
        for (x, y, expected) in [(0, 0, 255), (0, 20, 0), (8, 0, 76), (8, 20, 226)] {
            assert_close(out.pixel(x, y).unwrap()[0], expected, 4, &format!("({x},{y})"));
        }
    }

    #[test]
    fn test_gray_source_round_trip() {
        let (w, h) = (24, 16);
        let jpeg = compress(checkerboard(w, h, PixelFormat::Gray), Subsampling::Gray, 100);

        let mut session = CodecSession::open().unwrap();
        let header = session.decompress_header(&jpeg).unwrap();
        assert_eq!(header.subsampling, Subsampling::Gray);
        let out = session
            .decompress(0, 0, PixelFormat::Gray, Flags::empty())
            .unwrap();
        assert_close(out.pixel(0, 0).unwrap()[0], 255, 2, "white");
        assert_close(out.pixel(8, 15).unwrap()[0], 0, 2, "black");
        assert_close(out.pixel(8, 0).unwrap()[0], 128, 2, "mid gray");
        session.close();
    }

    #[test]
    fn test_header_reports_subsampling() {
        for &subsampling in Subsampling::all() {
            let format = if subsampling.is_gray() {
                PixelFormat::Gray
            } else {
                PixelFormat::Rgb
            };
            let jpeg = compress(checkerboard(48, 48, format), subsampling, 90);
            let mut session = CodecSession::open().unwrap();
            let header = session.decompress_header(&jpeg).unwrap();
            assert_eq!(header.subsampling, subsampling);
            assert_eq!((header.width, header.height), (48, 48));
            session.close();
        }
    }

    #[test]
    fn test_bottom_up_source_flips_rows() {
        let (w, h) = (16, 16);
        let image = checkerboard(w, h, PixelFormat::Rgb);

        let mut session = CodecSession::open().unwrap();
        session.associate_source_image(image).unwrap();
        let jpeg = session
            .compress_with(Subsampling::Samp444, 100, Flags::BOTTOM_UP)
            .unwrap();
        session.decompress_header(&jpeg).unwrap();
        let out = session
            .decompress(0, 0, PixelFormat::Rgb, Flags::empty())
            .unwrap();
        // The bottom (yellow) half of the source is now on top
        let top = out.pixel(0, 0).unwrap();
        let bottom = out.pixel(0, 15).unwrap();
        for c in 0..3 {
            assert_close(top[c], YELLOW[c], 4, "flipped top");
            assert_close(bottom[c], WHITE[c], 4, "flipped bottom");
        }

        let flipped = session
            .decompress(0, 0, PixelFormat::Rgb, Flags::BOTTOM_UP)
            .unwrap();
        let last_row = flipped.descriptor().row_range(15);
        assert!(flipped.data()[last_row].iter().take(3).all(|&c| c >= 251));
        session.close();
    }

    #[test]
    fn test_compressed_size_tracks_last_output() {
        let mut session = CodecSession::open().unwrap();
        session
            .associate_source_image(checkerboard(32, 32, PixelFormat::Rgb))
            .unwrap();
        let low = session
            .compress_with(Subsampling::Samp420, 10, Flags::empty())
            .unwrap();
        assert_eq!(session.compressed_size(), low.len());
        let high = session
            .compress_with(Subsampling::Samp444, 100, Flags::empty())
            .unwrap();
        assert_eq!(session.compressed_size(), high.len());
        assert!(high.len() > low.len());
        session.close();
    }

    #[test]
    fn test_associating_twice_replaces_source() {
        let mut session = CodecSession::open().unwrap();
        session
            .associate_source_image(checkerboard(16, 16, PixelFormat::Rgb))
            .unwrap();
        session
            .associate_source_image(checkerboard(40, 24, PixelFormat::Bgrx))
            .unwrap();
        assert_eq!(session.source().dimensions(), Some((40, 24)));

        let jpeg = session
            .compress_with(Subsampling::Samp422, 80, Flags::empty())
            .unwrap();
        let header = session.decompress_header(&jpeg).unwrap();
        assert_eq!((header.width, header.height), (40, 24));

        let taken = session.take_source();
        assert!(matches!(taken, SourceImage::Packed(_)));
        assert!(session.source().is_none());
        session.close();
    }
}

mod scaling_tests {
    use super::*;

    #[test]
    fn test_scaled_decode_one_eighth() {
        let jpeg = compress(checkerboard(40, 40, PixelFormat::Rgb), Subsampling::Samp420, 90);
        let mut session = CodecSession::open().unwrap();
        session.decompress_header(&jpeg).unwrap();

        let size = session.scaled_size(5, 5).unwrap();
        assert_eq!((size.factor.num(), size.factor.denom()), (1, 8));
        let out = session
            .decompress(5, 5, PixelFormat::Rgb, Flags::empty())
            .unwrap();
        assert_eq!((out.width(), out.height()), (5, 5));
        session.close();
    }

    #[test]
    fn test_scaled_sizes_match_free_functions() {
        let (w, h) = (100, 60);
        let jpeg = compress(checkerboard(w, h, PixelFormat::Rgb), Subsampling::Samp444, 85);
        let mut session = CodecSession::open().unwrap();
        session.decompress_header(&jpeg).unwrap();

        for (dw, dh) in [(0, 0), (90, 0), (50, 30), (20, 20), (13, 8)] {
            let out = session
                .decompress(dw, dh, PixelFormat::Rgbx, Flags::empty())
                .unwrap();
            assert_eq!(out.width(), scaled_width(w, h, dw, dh).unwrap());
            assert_eq!(out.height(), scaled_height(w, h, dw, dh).unwrap());
            assert!(dw == 0 || out.width() <= dw);
            assert!(dh == 0 || out.height() <= dh);
        }
        session.close();
    }

    #[test]
    fn test_fast_upsample_keeps_dimensions() {
        let jpeg = compress(checkerboard(33, 17, PixelFormat::Rgb), Subsampling::Samp420, 90);
        let mut session = CodecSession::open().unwrap();
        session.decompress_header(&jpeg).unwrap();
        let out = session
            .decompress(0, 0, PixelFormat::Rgb, Flags::FAST_UPSAMPLE)
            .unwrap();
        assert_eq!((out.width(), out.height()), (33, 17));
        session.close();
    }
}

mod pixel_format_tests {
    use super::*;

    #[test]
    fn test_every_format_matches_rgb_decode() {
        let (w, h) = (24, 16);
        let jpeg = compress(checkerboard(w, h, PixelFormat::Rgb), Subsampling::Samp420, 90);
        let reference = decompress(&jpeg, PixelFormat::Rgb);

        for &format in PixelFormat::all().iter().filter(|f| !f.is_gray()) {
            let out = decompress(&jpeg, format);
            let (ro, go, bo) = (
                format.red_offset().unwrap(),
                format.green_offset().unwrap(),
                format.blue_offset().unwrap(),
            );
            for y in 0..h {
                for x in 0..w {
                    let px = out.pixel(x, y).unwrap();
                    let rgb = reference.pixel(x, y).unwrap();
                    assert_eq!([px[ro], px[go], px[bo]], [rgb[0], rgb[1], rgb[2]], "{format}");
                    if let Some(ao) = format.alpha_offset() {
                        assert_eq!(px[ao], 0xFF, "{format} alpha");
                    }
                }
            }
        }
    }

    #[test]
    fn test_int_decode_uses_channel_shifts() {
        let jpeg = compress(checkerboard(16, 16, PixelFormat::Rgb), Subsampling::Samp444, 95);
        let reference = decompress(&jpeg, PixelFormat::Rgb);

        let mut session = CodecSession::open().unwrap();
        session.decompress_header(&jpeg).unwrap();
        for format in [PixelFormat::Rgbx, PixelFormat::Xbgr, PixelFormat::Bgra, PixelFormat::Argb] {
            let ints = session
                .decompress_to_int(0, 0, format, Flags::empty())
                .unwrap();
            let (rs, gs, bs) = (
                format.red_shift().unwrap(),
                format.green_shift().unwrap(),
                format.blue_shift().unwrap(),
            );
            for (x, y) in [(0, 0), (9, 3), (15, 15)] {
                let p = ints.pixel(x, y).unwrap();
                let rgb = reference.pixel(x, y).unwrap();
                assert_eq!(
                    [(p >> rs) as u8, (p >> gs) as u8, (p >> bs) as u8],
                    [rgb[0], rgb[1], rgb[2]],
                    "{format}"
                );
            }
        }
        session.close();
    }

    #[test]
    fn test_source_with_offset_and_pitch() {
        // A 16x16 image embedded at (4, 2) in a wider, taller buffer
        let format = PixelFormat::Bgr;
        let pitch = 30 * format.pixel_size();
        let mut data = vec![0u8; pitch * 20];
        let desc = ImageDescriptor::new(16, 16, format)
            .with_pitch(pitch)
            .with_offset(4, 2);
        for row in 0..16 {
            let range = desc.row_range(row);
            data[range].fill(if row < 8 { 255 } else { 0 });
        }
        let image = PackedImage::new(data, desc).unwrap();

        let jpeg = compress(image, Subsampling::Samp444, 100);
        let out = decompress(&jpeg, PixelFormat::Gray);
        assert_eq!((out.width(), out.height()), (16, 16));
        assert!(out.pixel(3, 3).unwrap()[0] >= 251);
        assert!(out.pixel(3, 12).unwrap()[0] <= 4);
    }
}

mod yuv_tests {
    use super::*;
    use mozjpeg::CompInfoExt;

    #[test]
    fn test_encode_yuv_buffer_size() {
        for &subsampling in &[Subsampling::Samp444, Subsampling::Samp420, Subsampling::Samp411] {
            for pad in [1, 4] {
                let mut session = CodecSession::open().unwrap();
                session
                    .associate_source_image(checkerboard(35, 33, PixelFormat::Rgb))
                    .unwrap();
                session.set_subsampling(subsampling).unwrap();
                let yuv = session.encode_yuv(pad, Flags::empty()).unwrap();
                assert_eq!(yuv.size(), yuv_buffer_size(35, pad, 33, subsampling).unwrap());
                assert_eq!(yuv.layout().num_planes(), 3);
                session.close();
            }
        }
    }

    #[test]
    fn test_yuv_pipeline() {
        let (w, h) = (32, 32);
        let mut session = CodecSession::open().unwrap();
        session
            .associate_source_image(checkerboard(w, h, PixelFormat::Rgb))
            .unwrap();
        session.set_subsampling(Subsampling::Samp444).unwrap();
        let yuv = session.encode_yuv(4, Flags::empty()).unwrap();

        // white block: Y high, chroma neutral
        let y_plane = yuv.plane(0).unwrap();
        assert!(y_plane[0] >= 250);
        assert_close(yuv.plane(1).unwrap()[0], 128, 2, "Cb");

        let jpeg = session.compress_from_yuv(&yuv, 100, Flags::empty()).unwrap();
        assert_eq!(session.compressed_size(), jpeg.len());
        let header = session.decompress_header(&jpeg).unwrap();
        assert_eq!(header.subsampling, Subsampling::Samp444);

        let decoded = session.decompress_to_yuv(0, 4, 0, Flags::empty()).unwrap();
        assert_eq!(decoded.size(), yuv.size());
        assert_close(decoded.plane(0).unwrap()[0], y_plane[0], 3, "Y");

        session.associate_source_yuv(decoded).unwrap();
        let packed = session.decode_yuv(PixelFormat::Rgb, Flags::empty()).unwrap();
        assert_eq!((packed.width(), packed.height()), (w, h));
        for c in 0..3 {
            assert_close(packed.pixel(0, 0).unwrap()[c], 255, 6, "white");
            assert_close(packed.pixel(0, 16).unwrap()[c], 0, 6, "black");
        }
        session.close();
    }

    // Component samples straight from libjpeg's raw data output
    fn raw_components(jpeg: &[u8]) -> Vec<(usize, Vec<u8>)> {
        let mut started = mozjpeg::Decompress::new_mem(jpeg).unwrap().raw().unwrap();
        let strides: Vec<usize> = started.components().iter().map(|c| c.row_stride()).collect();
        let mut buffers = vec![Vec::new(); strides.len()];
        {
            let mut targets: Vec<&mut Vec<u8>> = buffers.iter_mut().collect();
            started.read_raw_data(&mut targets);
        }
        started.finish().unwrap();
        strides.into_iter().zip(buffers).collect()
    }

    #[test]
    fn test_decompress_to_yuv_returns_codec_samples() {
        let (w, h) = (35, 33);
        let jpeg = compress(checkerboard(w, h, PixelFormat::Rgb), Subsampling::Samp420, 100);
        let mut session = CodecSession::open().unwrap();
        session.decompress_header(&jpeg).unwrap();
        let yuv = session.decompress_to_yuv(0, 4, 0, Flags::empty()).unwrap();
        assert_eq!(yuv.size(), yuv_buffer_size(w, 4, h, Subsampling::Samp420).unwrap());

        let raw = raw_components(&jpeg);
        assert_eq!(raw.len(), 3);
        for (index, (stride, samples)) in raw.iter().enumerate() {
            let plane = *yuv.layout().plane(index).unwrap();
            let bytes = yuv.plane(index).unwrap();
            for r in 0..plane.height {
                for c in 0..plane.width {
                    assert_eq!(
                        bytes[r * plane.pitch + c],
                        samples[r * stride + c],
                        "plane {index} at ({c}, {r})"
                    );
                }
            }
        }
        session.close();
    }

    #[test]
    fn test_planar_round_trip_keeps_samples() {
        let (w, h) = (32, 32);
        let mut session = CodecSession::open().unwrap();
        session
            .associate_source_image(checkerboard(w, h, PixelFormat::Rgb))
            .unwrap();
        session.set_subsampling(Subsampling::Samp420).unwrap();
        let yuv = session.encode_yuv(1, Flags::empty()).unwrap();

        let jpeg = session.compress_from_yuv(&yuv, 100, Flags::empty()).unwrap();
        session.decompress_header(&jpeg).unwrap();
        let decoded = session.decompress_to_yuv(0, 1, 0, Flags::empty()).unwrap();
        assert_eq!(decoded.size(), yuv.size());

        for index in 0..3 {
            let before = yuv.plane(index).unwrap();
            let after = decoded.plane(index).unwrap();
            for (i, (&a, &b)) in before.iter().zip(after).enumerate() {
                assert_close(b, a, 2, &format!("plane {index} sample {i}"));
            }
        }
        session.close();
    }

    #[test]
    fn test_decompress_to_yuv_scaled() {
        let jpeg = compress(checkerboard(40, 40, PixelFormat::Rgb), Subsampling::Samp420, 95);
        let mut session = CodecSession::open().unwrap();
        session.decompress_header(&jpeg).unwrap();

        let yuv = session.decompress_to_yuv(5, 4, 5, Flags::empty()).unwrap();
        assert_eq!((yuv.width(), yuv.height()), (5, 5));
        assert_eq!(yuv.subsampling(), Subsampling::Samp420);
        assert_eq!(yuv.size(), yuv_buffer_size(5, 4, 5, Subsampling::Samp420).unwrap());
        // Top-left output sample is the white block's average
        assert!(yuv.plane(0).unwrap()[0] >= 250);

        let half = session.decompress_to_yuv(20, 1, 0, Flags::empty()).unwrap();
        assert_eq!((half.width(), half.height()), (20, 20));
        session.close();
    }

    #[test]
    fn test_gray_yuv_has_one_plane() {
        let mut session = CodecSession::open().unwrap();
        session
            .associate_source_image(checkerboard(20, 10, PixelFormat::Gray))
            .unwrap();
        session.set_subsampling(Subsampling::Gray).unwrap();
        let yuv = session.encode_yuv(4, Flags::empty()).unwrap();
        assert_eq!(yuv.layout().num_planes(), 1);
        assert_eq!(yuv.size(), 20 * 10);
        assert!(yuv.plane(1).is_none());

        session.associate_source_yuv(yuv).unwrap();
        let jpeg = session.compress_with(Subsampling::Gray, 90, Flags::empty()).unwrap();
        let header = session.decompress_header(&jpeg).unwrap();
        assert_eq!(header.subsampling, Subsampling::Gray);
        session.close();
    }
}

mod cross_decoder_tests {
    use super::*;
    use image::ImageFormat;

    #[test]
    fn test_output_decodes_with_image_crate() {
        let (w, h) = (35, 33);
        let jpeg = compress(checkerboard(w, h, PixelFormat::Rgb), Subsampling::Samp444, 100);

        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded.dimensions(), (w, h));

        for (x, y) in [(0, 0), (9, 2), (20, 20), (34, 32)] {
            let expected = checker_color(x, y, h);
            let px = decoded.get_pixel(x, y).0;
            for c in 0..3 {
                assert_close(px[c], expected[c], 8, &format!("({x},{y}) channel {c}"));
            }
        }
    }
}

mod concurrency_tests {
    use super::*;

    #[test]
    fn test_one_session_per_thread() {
        let sizes: Vec<(u32, u32)> = (0..8)
            .into_par_iter()
            .map(|i| {
                let (w, h) = (16 + i * 8, 24 + i * 4);
                let mut session = CodecSession::open().unwrap();
                session
                    .associate_source_image(checkerboard(w, h, PixelFormat::Rgba))
                    .unwrap();
                let jpeg = session
                    .compress_with(Subsampling::Samp420, 75, Flags::empty())
                    .unwrap();
                session.decompress_header(&jpeg).unwrap();
                let out = session
                    .decompress(0, 0, PixelFormat::Rgba, Flags::empty())
                    .unwrap();
                session.close();
                (out.width(), out.height())
            })
            .collect();

        for (i, size) in sizes.into_iter().enumerate() {
            let i = i as u32;
            assert_eq!(size, (16 + i * 8, 24 + i * 4));
        }
    }
}

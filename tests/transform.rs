// tests/transform.rs
//
// Batched lossless-style transforms through CodecSession::transform

use tjsession::{
    CodecSession, ErrorKind, Flags, JpegHeader, PackedImage, PixelFormat, Region, Subsampling,
    TransformDescriptor, TransformOp, TransformOptions,
};

// Left half white, right half black
fn split_image(width: u32, height: u32) -> PackedImage {
    let mut image = PackedImage::zeroed(width, height, PixelFormat::Rgb).unwrap();
    for (i, px) in image.data_mut().chunks_exact_mut(3).enumerate() {
        let x = i as u32 % width;
        px.fill(if x < width / 2 { 255 } else { 0 });
    }
    image
}

fn source_jpeg(width: u32, height: u32, subsampling: Subsampling) -> Vec<u8> {
    let mut session = CodecSession::open().unwrap();
    session
        .associate_source_image(split_image(width, height))
        .unwrap();
    let jpeg = session
        .compress_with(subsampling, 100, Flags::empty())
        .unwrap();
    session.close();
    jpeg
}

fn header_of(jpeg: &[u8]) -> JpegHeader {
    let mut session = CodecSession::open().unwrap();
    let header = session.decompress_header(jpeg).unwrap();
    session.close();
    header
}

fn transform_one(jpeg: &[u8], descriptor: TransformDescriptor) -> Vec<u8> {
    let mut session = CodecSession::open().unwrap();
    let mut outputs = session
        .transform(jpeg, &[descriptor], Flags::empty())
        .unwrap();
    session.close();
    assert_eq!(outputs.len(), 1);
    outputs.remove(0)
}

mod geometry_tests {
    use super::*;

    #[test]
    fn test_rot90_swaps_dimensions() {
        let jpeg = source_jpeg(48, 32, Subsampling::Samp420);
        let out = transform_one(&jpeg, TransformDescriptor::new(TransformOp::Rot90));
        let header = header_of(&out);
        assert_eq!((header.width, header.height), (32, 48));
        assert_eq!(header.subsampling, Subsampling::Samp420);
    }

    #[test]
    fn test_transpose_swaps_422_to_440() {
        let jpeg = source_jpeg(32, 16, Subsampling::Samp422);
        let out = transform_one(&jpeg, TransformDescriptor::new(TransformOp::Transpose));
        let header = header_of(&out);
        assert_eq!((header.width, header.height), (16, 32));
        assert_eq!(header.subsampling, Subsampling::Samp440);
    }

    #[test]
    fn test_non_transposing_ops_keep_dimensions() {
        let jpeg = source_jpeg(48, 32, Subsampling::Samp444);
        for op in [TransformOp::None, TransformOp::HFlip, TransformOp::VFlip, TransformOp::Rot180] {
            let header = header_of(&transform_one(&jpeg, TransformDescriptor::new(op)));
            assert_eq!((header.width, header.height), (48, 32), "{op:?}");
            assert_eq!(header.subsampling, Subsampling::Samp444, "{op:?}");
        }
    }

    #[test]
    fn test_hflip_mirrors_pixels() {
        let jpeg = source_jpeg(16, 16, Subsampling::Samp444);
        let out = transform_one(&jpeg, TransformDescriptor::new(TransformOp::HFlip));

        let mut session = CodecSession::open().unwrap();
        session.decompress_header(&out).unwrap();
        let image = session
            .decompress(0, 0, PixelFormat::Gray, Flags::empty())
            .unwrap();
        for y in [0, 7, 15] {
            assert!(image.pixel(0, y).unwrap()[0] <= 8, "row {y} left");
            assert!(image.pixel(15, y).unwrap()[0] >= 247, "row {y} right");
        }
        session.close();
    }

    #[test]
    fn test_hflip_leaves_partial_edge_in_place() {
        // 4:4:4 iMCU is 8 wide, so columns 16..20 are a partial block
        let jpeg = source_jpeg(20, 16, Subsampling::Samp444);
        let out = transform_one(&jpeg, TransformDescriptor::new(TransformOp::HFlip));

        let mut session = CodecSession::open().unwrap();
        let header = session.decompress_header(&out).unwrap();
        assert_eq!((header.width, header.height), (20, 16));
        let image = session
            .decompress(0, 0, PixelFormat::Gray, Flags::empty())
            .unwrap();
        for y in [0, 8, 15] {
            assert!(image.pixel(0, y).unwrap()[0] <= 8, "row {y} mirrored black");
            assert!(image.pixel(12, y).unwrap()[0] >= 247, "row {y} mirrored white");
            assert!(image.pixel(19, y).unwrap()[0] <= 8, "row {y} edge kept");
        }
        session.close();
    }

    #[test]
    fn test_rot270_moves_left_half_to_bottom() {
        let jpeg = source_jpeg(16, 16, Subsampling::Samp444);
        let out = transform_one(&jpeg, TransformDescriptor::new(TransformOp::Rot270));

        let mut session = CodecSession::open().unwrap();
        session.decompress_header(&out).unwrap();
        let image = session
            .decompress(0, 0, PixelFormat::Gray, Flags::empty())
            .unwrap();
        assert!(image.pixel(5, 0).unwrap()[0] <= 8);
        assert!(image.pixel(5, 15).unwrap()[0] >= 247);
        session.close();
    }
}

mod batch_tests {
    use super::*;

    #[test]
    fn test_batch_produces_one_output_per_descriptor() {
        let jpeg = source_jpeg(64, 48, Subsampling::Samp420);
        let descriptors = [
            TransformDescriptor::new(TransformOp::None),
            TransformDescriptor::new(TransformOp::HFlip),
            TransformDescriptor::new(TransformOp::Rot90),
            TransformDescriptor::new(TransformOp::None).with_crop(Region::new(16, 16, 32, 16)),
        ];

        let mut session = CodecSession::open().unwrap();
        let outputs = session
            .transform(&jpeg, &descriptors, Flags::empty())
            .unwrap();
        assert_eq!(outputs.len(), descriptors.len());
        let sizes: Vec<usize> = outputs.iter().map(Vec::len).collect();
        assert_eq!(session.transformed_sizes(), sizes.as_slice());

        let dims: Vec<(u32, u32)> = outputs
            .iter()
            .map(|o| {
                let h = session.decompress_header(o).unwrap();
                (h.width, h.height)
            })
            .collect();
        assert_eq!(dims, vec![(64, 48), (64, 48), (48, 64), (32, 16)]);
        session.close();
    }

    #[test]
    fn test_empty_batch_rejected() {
        let jpeg = source_jpeg(16, 16, Subsampling::Samp420);
        let mut session = CodecSession::open().unwrap();
        let err = session.transform(&jpeg, &[], Flags::empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        session.close();
    }

    #[test]
    fn test_corrupt_source_rejected() {
        let mut jpeg = source_jpeg(16, 16, Subsampling::Samp420);
        jpeg[0] = 0x00;
        let mut session = CodecSession::open().unwrap();
        let err = session
            .transform(&jpeg, &[TransformDescriptor::new(TransformOp::HFlip)], Flags::empty())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptHeader);
        assert!(session.transformed_sizes().is_empty());
        session.close();
    }
}

mod crop_tests {
    use super::*;

    #[test]
    fn test_crop_to_region() {
        let jpeg = source_jpeg(64, 48, Subsampling::Samp420);
        let out = transform_one(
            &jpeg,
            TransformDescriptor::new(TransformOp::None).with_crop(Region::new(16, 0, 0, 32)),
        );
        let header = header_of(&out);
        assert_eq!((header.width, header.height), (48, 32));
    }

    #[test]
    fn test_region_without_crop_flag_is_ignored() {
        let jpeg = source_jpeg(64, 48, Subsampling::Samp420);
        let descriptor = TransformDescriptor {
            region: Some(Region::new(16, 16, 16, 16)),
            op: TransformOp::None,
            options: TransformOptions::empty(),
        };
        let header = header_of(&transform_one(&jpeg, descriptor));
        assert_eq!((header.width, header.height), (64, 48));
    }

    #[test]
    fn test_misaligned_crop_reports_index() {
        let jpeg = source_jpeg(64, 48, Subsampling::Samp420);
        let descriptors = [
            TransformDescriptor::new(TransformOp::None),
            TransformDescriptor::new(TransformOp::None).with_crop(Region::new(4, 0, 16, 16)),
        ];
        let mut session = CodecSession::open().unwrap();
        let err = session
            .transform(&jpeg, &descriptors, Flags::empty())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransformError);
        assert_eq!(err.transform_index(), Some(1));
        session.close();
    }

    #[test]
    fn test_crop_alignment_follows_rotation() {
        // 4:2:2 has a 16x8 MCU; after a transpose the crop grid is 8x16
        let jpeg = source_jpeg(64, 32, Subsampling::Samp422);
        let ok = TransformDescriptor::new(TransformOp::Transpose)
            .with_crop(Region::new(8, 16, 8, 16));
        let header = header_of(&transform_one(&jpeg, ok));
        assert_eq!((header.width, header.height), (8, 16));

        let bad = TransformDescriptor::new(TransformOp::Transpose)
            .with_crop(Region::new(0, 8, 8, 8));
        let mut session = CodecSession::open().unwrap();
        let err = session.transform(&jpeg, &[bad], Flags::empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransformError);
        session.close();
    }

    #[test]
    fn test_crop_outside_image() {
        let jpeg = source_jpeg(32, 32, Subsampling::Samp420);
        let mut session = CodecSession::open().unwrap();
        for region in [Region::new(32, 0, 0, 0), Region::new(16, 16, 32, 16)] {
            let err = session
                .transform(
                    &jpeg,
                    &[TransformDescriptor::new(TransformOp::None).with_crop(region)],
                    Flags::empty(),
                )
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{region:?}");
        }
        session.close();
    }
}

mod option_tests {
    use super::*;

    #[test]
    fn test_perfect_fails_on_partial_mcu() {
        // 100 is not a multiple of the 16-pixel 4:2:0 MCU
        let jpeg = source_jpeg(100, 64, Subsampling::Samp420);
        let descriptors = [
            TransformDescriptor::new(TransformOp::VFlip).with_options(TransformOptions::PERFECT),
            TransformDescriptor::new(TransformOp::HFlip).with_options(TransformOptions::PERFECT),
        ];
        let mut session = CodecSession::open().unwrap();
        let err = session
            .transform(&jpeg, &descriptors, Flags::empty())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransformError);
        assert_eq!(err.transform_index(), Some(1));
        session.close();
    }

    #[test]
    fn test_imperfect_without_options_succeeds() {
        let jpeg = source_jpeg(100, 70, Subsampling::Samp420);
        let header = header_of(&transform_one(&jpeg, TransformDescriptor::new(TransformOp::Rot180)));
        assert_eq!((header.width, header.height), (100, 70));
    }

    #[test]
    fn test_trim_drops_partial_edges() {
        let jpeg = source_jpeg(100, 70, Subsampling::Samp420);
        let descriptor =
            TransformDescriptor::new(TransformOp::Rot180).with_options(TransformOptions::TRIM);
        let header = header_of(&transform_one(&jpeg, descriptor));
        assert_eq!((header.width, header.height), (96, 64));

        // Rot90 only moves the bottom edge
        let descriptor =
            TransformDescriptor::new(TransformOp::Rot90).with_options(TransformOptions::TRIM);
        let header = header_of(&transform_one(&jpeg, descriptor));
        assert_eq!((header.width, header.height), (64, 100));
    }

    #[test]
    fn test_trim_does_not_satisfy_perfect() {
        let jpeg = source_jpeg(100, 70, Subsampling::Samp420);
        let descriptors = [TransformDescriptor::new(TransformOp::Rot90)
            .with_options(TransformOptions::TRIM | TransformOptions::PERFECT)];
        let mut session = CodecSession::open().unwrap();
        let err = session
            .transform(&jpeg, &descriptors, Flags::empty())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransformError);
        assert_eq!(err.transform_index(), Some(0));
        session.close();
    }

    #[test]
    fn test_gray_option() {
        let jpeg = source_jpeg(32, 32, Subsampling::Samp420);
        let descriptor =
            TransformDescriptor::new(TransformOp::VFlip).with_options(TransformOptions::GRAY);
        let header = header_of(&transform_one(&jpeg, descriptor));
        assert_eq!(header.subsampling, Subsampling::Gray);
        assert_eq!((header.width, header.height), (32, 32));
    }
}

// src/engine/encoder.rs
//
// JPEG encoding through mozjpeg (libjpeg-turbo).

use crate::error::SessionError;
use crate::format::Subsampling;
use mozjpeg::{ColorSpace, CompInfoExt, Compress, DCTSIZE};
use tracing::debug;

use super::common::{run_with_panic_policy, EngineResult};
use super::image::YuvImage;
use super::layout::PlaneLayout;
use super::native::Raster;
use super::MAX_DIMENSION;

/// Encode a gray or RGB raster at `quality` (1..=100).
///
/// Uses baseline Huffman coding without trellis quantization so that high
/// quality settings reproduce pixel values closely.
pub fn encode_raster(
    raster: &Raster,
    subsampling: Subsampling,
    quality: u8,
) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("compress:mozjpeg", || {
        let (w, h) = (raster.width, raster.height);

        // Pre-validate everything that would otherwise abort inside libjpeg.
        if w == 0 || h == 0 {
            return Err(SessionError::invalid_argument(
                "dimensions",
                format!("{w}x{h}"),
                "width and height must be at least 1",
            ));
        }
        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(SessionError::dimension_exceeds_limit(w.max(h), MAX_DIMENSION));
        }
        if !(1..=100).contains(&quality) {
            return Err(SessionError::invalid_argument(
                "quality",
                quality.to_string(),
                "must be between 1 and 100",
            ));
        }
        let stride = raster.stride();
        if raster.data.len() != stride * h as usize {
            return Err(SessionError::codec_failed(
                "compress",
                format!(
                    "raster holds {} bytes, expected {}",
                    raster.data.len(),
                    stride * h as usize
                ),
            ));
        }
        if raster.is_gray() && !subsampling.is_gray() {
            return Err(SessionError::unsupported_format(
                "Grayscale",
                format!("cannot produce {subsampling} chroma from a grayscale source"),
            ));
        }

        let input_space = if raster.is_gray() {
            ColorSpace::JCS_GRAYSCALE
        } else {
            ColorSpace::JCS_RGB
        };
        let mut comp = Compress::new(input_space);
        comp.set_fastest_defaults();
        comp.set_size(w as usize, h as usize);

        if subsampling.is_gray() {
            comp.set_color_space(ColorSpace::JCS_GRAYSCALE);
        } else {
            comp.set_color_space(ColorSpace::JCS_YCbCr);
            let sampling = (subsampling.h_factor() as u8, subsampling.v_factor() as u8);
            comp.set_chroma_sampling_pixel_sizes(sampling, sampling);
        }
        comp.set_quality(quality as f32);

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut writer = comp
            .start_compress(Vec::with_capacity(estimated_size))
            .map_err(|e| {
                SessionError::codec_failed("compress", format!("mozjpeg: failed to start compress: {e:?}"))
            })?;

        for row in raster.data.chunks(stride) {
            writer.write_scanlines(row).map_err(|e| {
                SessionError::codec_failed(
                    "compress",
                    format!("mozjpeg: failed to write scanlines: {e:?}"),
                )
            })?;
        }

        let output = writer.finish().map_err(|e| {
            SessionError::codec_failed("compress", format!("mozjpeg: failed to finish: {e:?}"))
        })?;

        debug!(
            target: "tjsession::native",
            width = w,
            height = h,
            subsampling = %subsampling,
            quality,
            bytes = output.len(),
            "encoded JPEG"
        );

        Ok(output)
    })
}

/// Lay one plane out as `rows` rows of `stride` samples, replicating the
/// last column and row into the block padding.
fn load_component(plane: &PlaneLayout, bytes: &[u8], stride: usize, rows: usize) -> Vec<u8> {
    let mut out = vec![0u8; stride * rows];
    let copied = plane.width.min(stride);
    for (r, dst) in out.chunks_exact_mut(stride).enumerate() {
        let start = r.min(plane.height - 1) * plane.pitch;
        let src = &bytes[start..start + copied];
        dst[..copied].copy_from_slice(src);
        dst[copied..].fill(src[copied - 1]);
    }
    out
}

/// Encode the planes of `src` as they are, without colour conversion.
pub fn encode_planes(src: &YuvImage, quality: u8) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("compress_from_yuv:mozjpeg", || {
        let (w, h) = (src.width(), src.height());
        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(SessionError::dimension_exceeds_limit(w.max(h), MAX_DIMENSION));
        }
        if !(1..=100).contains(&quality) {
            return Err(SessionError::invalid_argument(
                "quality",
                quality.to_string(),
                "must be between 1 and 100",
            ));
        }

        let layout = *src.layout();
        let subsampling = layout.subsampling();
        let mut comp = if subsampling.is_gray() {
            Compress::new(ColorSpace::JCS_GRAYSCALE)
        } else {
            Compress::new(ColorSpace::JCS_YCbCr)
        };
        comp.set_fastest_defaults();
        comp.set_size(w as usize, h as usize);
        if !subsampling.is_gray() {
            comp.set_color_space(ColorSpace::JCS_YCbCr);
            let sampling = (subsampling.h_factor() as u8, subsampling.v_factor() as u8);
            comp.set_chroma_sampling_pixel_sizes(sampling, sampling);
        }
        comp.set_quality(quality as f32);
        comp.set_raw_data_in(true);

        let mut writer = comp.start_compress(Vec::with_capacity(layout.total_size())).map_err(|e| {
            SessionError::codec_failed("compress_from_yuv", format!("mozjpeg: failed to start compress: {e:?}"))
        })?;

        // Every component must cover whole iMCU rows.
        let max_v = writer
            .components()
            .iter()
            .map(|c| c.v_samp_factor.max(1) as usize)
            .max()
            .unwrap_or(1);
        let imcu_rows = (h as usize).div_ceil(max_v * DCTSIZE);
        let mut components = Vec::with_capacity(layout.num_planes());
        for (index, info) in writer.components().iter().enumerate() {
            let (Some(plane), Some(bytes)) = (layout.plane(index), src.plane(index)) else {
                return Err(SessionError::codec_failed(
                    "compress_from_yuv",
                    format!("planar image has no plane {index}"),
                ));
            };
            let rows = imcu_rows * info.v_samp_factor.max(1) as usize * DCTSIZE;
            components.push(load_component(plane, bytes, info.row_stride(), rows));
        }
        let views: Vec<&[u8]> = components.iter().map(Vec::as_slice).collect();
        if !writer.write_raw_data(&views) {
            return Err(SessionError::codec_failed(
                "compress_from_yuv",
                "mozjpeg: raw data write stalled",
            ));
        }

        let output = writer.finish().map_err(|e| {
            SessionError::codec_failed("compress_from_yuv", format!("mozjpeg: failed to finish: {e:?}"))
        })?;

        debug!(
            target: "tjsession::native",
            width = w,
            height = h,
            subsampling = %subsampling,
            quality,
            bytes = output.len(),
            "encoded JPEG from planes"
        );

        Ok(output)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::layout::max_compressed_size;
    use crate::error::ErrorKind;

    fn noise(width: u32, height: u32, channels: usize) -> Raster {
        let mut r = Raster::new(width, height, channels);
        let mut state = 0x1234_5678u32;
        for b in r.data.iter_mut() {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            *b = state as u8;
        }
        r
    }

    #[test]
    fn test_encode_produces_jpeg_markers() {
        let jpeg = encode_raster(&noise(20, 10, 3), Subsampling::Samp420, 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_quality_affects_size() {
        let img = noise(64, 64, 3);
        let low = encode_raster(&img, Subsampling::Samp444, 20).unwrap();
        let high = encode_raster(&img, Subsampling::Samp444, 95).unwrap();
        assert!(high.len() > low.len());
    }

    #[test]
    fn test_worst_case_fits_bound() {
        // Random noise at q100 4:4:4 is close to the worst case.
        let img = noise(37, 29, 3);
        let jpeg = encode_raster(&img, Subsampling::Samp444, 100).unwrap();
        assert!(jpeg.len() <= max_compressed_size(37, 29).unwrap());
    }

    #[test]
    fn test_gray_raster_needs_gray_subsampling() {
        let img = noise(8, 8, 1);
        let err = encode_raster(&img, Subsampling::Samp420, 80).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        assert!(encode_raster(&img, Subsampling::Gray, 80).is_ok());
    }

    #[test]
    fn test_rgb_raster_to_gray_jpeg() {
        let jpeg = encode_raster(&noise(8, 8, 3), Subsampling::Gray, 80).unwrap();
        let header = crate::engine::decoder::read_header(&jpeg).unwrap();
        assert_eq!(header.subsampling, Subsampling::Gray);
    }

    #[test]
    fn test_rejects_bad_quality() {
        assert!(encode_raster(&noise(8, 8, 3), Subsampling::Samp444, 0).is_err());
        assert!(encode_raster(&noise(8, 8, 3), Subsampling::Samp444, 101).is_err());
    }
}

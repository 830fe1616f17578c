// src/engine/decoder.rs
//
// Header parsing and scaled decoding through mozjpeg (libjpeg-turbo).

use crate::error::SessionError;
use crate::format::Subsampling;
use mozjpeg::{ColorSpace, CompInfoExt, Decompress};
use tracing::debug;

use super::common::{panic_as_corrupt, run_with_panic_policy, EngineResult};
use super::image::YuvImage;
use super::layout::PlaneLayout;
use super::native::{JpegHeader, Raster};
use super::MAX_DIMENSION;

/// How `decode_raster` should drive the decompressor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Output scale in eighths (8 = full size).
    pub scale_eighths: u8,
    /// Produce one gray channel instead of RGB.
    pub gray: bool,
    /// Nearest-neighbour chroma upsampling.
    pub fast_upsample: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            scale_eighths: 8,
            gray: false,
            fast_upsample: false,
        }
    }
}

/// Reject zero-sized or oversized frames.
pub fn check_dimensions(width: usize, height: usize) -> EngineResult<()> {
    if width == 0 || height == 0 {
        return Err(SessionError::corrupt_data(format!(
            "frame header declares {width}x{height}"
        )));
    }
    if width > MAX_DIMENSION as usize || height > MAX_DIMENSION as usize {
        return Err(SessionError::dimension_exceeds_limit(
            width.max(height) as u32,
            MAX_DIMENSION,
        ));
    }
    Ok(())
}

/// Map per-component sampling factors to a subsampling level.
///
/// Factors are `(h, v)` pairs with luma first.
pub fn classify_sampling(factors: &[(u32, u32)]) -> EngineResult<Subsampling> {
    match factors {
        [_] => Ok(Subsampling::Gray),
        [(yh, yv), cb, cr] if cb == cr && cb.0 > 0 && cb.1 > 0 => {
            let (ch, cv) = *cb;
            if yh % ch != 0 || yv % cv != 0 {
                return Err(SessionError::unsupported_format(
                    format!("sampling {yh}x{yv},{ch}x{cv}"),
                    "luma factors are not a multiple of chroma factors",
                ));
            }
            Subsampling::from_luma_factors(yh / ch, yv / cv).ok_or_else(|| {
                SessionError::unsupported_format(
                    format!("sampling {yh}x{yv},{ch}x{cv}"),
                    "unrecognized subsampling level",
                )
            })
        }
        _ => Err(SessionError::unsupported_format(
            format!("{} components", factors.len()),
            "only grayscale and YCbCr images are supported",
        )),
    }
}

/// Parse the frame header without decoding any scan data.
pub fn read_header(data: &[u8]) -> EngineResult<JpegHeader> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(SessionError::corrupt_data("missing JPEG SOI marker"));
    }

    run_with_panic_policy("decompress_header:mozjpeg", || {
        let decompress = Decompress::new_mem(data).map_err(|e| {
            SessionError::corrupt_data(format!("mozjpeg header read failed: {e:?}"))
        })?;

        let width = decompress.width();
        let height = decompress.height();
        check_dimensions(width, height)?;

        let factors: Vec<(u32, u32)> = decompress
            .components()
            .iter()
            .map(|c| (c.h_samp_factor as u32, c.v_samp_factor as u32))
            .collect();
        let subsampling = classify_sampling(&factors)?;

        debug!(
            target: "tjsession::native",
            width,
            height,
            subsampling = %subsampling,
            "read JPEG header"
        );

        Ok(JpegHeader {
            width: width as u32,
            height: height as u32,
            subsampling,
        })
    })
    .map_err(panic_as_corrupt)
}

/// Decode a complete stream into a gray or RGB raster.
pub fn decode_raster(data: &[u8], options: DecodeOptions) -> EngineResult<Raster> {
    if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
        return Err(SessionError::corrupt_data("missing JPEG EOI marker"));
    }

    run_with_panic_policy("decompress:mozjpeg", || {
        let mut decompress = Decompress::new_mem(data).map_err(|e| {
            SessionError::corrupt_data(format!("mozjpeg decompress init failed: {e:?}"))
        })?;
        check_dimensions(decompress.width(), decompress.height())?;

        decompress.scale(options.scale_eighths);
        decompress.do_fancy_upsampling(!options.fast_upsample);

        let (width, height, channels, pixels) = if options.gray {
            let mut started = decompress.grayscale().map_err(|e| {
                SessionError::corrupt_data(format!("mozjpeg grayscale start failed: {e:?}"))
            })?;
            let (w, h) = (started.width(), started.height());
            let pixels: Vec<u8> = started.read_scanlines().map_err(|e| {
                SessionError::corrupt_data(format!("mozjpeg: failed to read scanlines: {e:?}"))
            })?;
            (w, h, 1, pixels)
        } else {
            let mut started = decompress.rgb().map_err(|e| {
                SessionError::corrupt_data(format!("mozjpeg rgb conversion failed: {e:?}"))
            })?;
            let (w, h) = (started.width(), started.height());
            let pixels: Vec<[u8; 3]> = started.read_scanlines().map_err(|e| {
                SessionError::corrupt_data(format!("mozjpeg: failed to read scanlines: {e:?}"))
            })?;
            (w, h, 3, pixels.into_iter().flatten().collect())
        };

        if pixels.len() != width * height * channels {
            return Err(SessionError::corrupt_data(format!(
                "decoded {} bytes for a {width}x{height} image",
                pixels.len()
            )));
        }

        debug!(
            target: "tjsession::native",
            width,
            height,
            scale_eighths = options.scale_eighths,
            gray = options.gray,
            "decoded JPEG"
        );

        Ok(Raster {
            width: width as u32,
            height: height as u32,
            channels,
            data: pixels,
        })
    })
    .map_err(panic_as_corrupt)
}

/// Copy one decoded component into a plane, replicating the last decoded
/// row and column where the plane is larger.
fn store_component(component: &[u8], stride: usize, plane: &PlaneLayout, dst: &mut [u8]) {
    let rows = component.len() / stride;
    if rows == 0 || plane.width == 0 {
        return;
    }
    let copied = plane.width.min(stride);
    for (r, out) in dst.chunks_mut(plane.pitch).take(plane.height).enumerate() {
        let start = r.min(rows - 1) * stride;
        let src = &component[start..start + copied];
        out[..copied].copy_from_slice(src);
        let edge = src[copied - 1];
        out[copied..plane.width].fill(edge);
    }
}

/// Decode a stream straight into the planes of `dst`.
///
/// At full size the planes hold libjpeg's raw component samples. Scaled
/// decodes take libjpeg's YCbCr output with replicating upsampling and keep
/// the first sample of every chroma block.
pub fn decode_planes(data: &[u8], scale_eighths: u8, dst: &mut YuvImage) -> EngineResult<()> {
    if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
        return Err(SessionError::corrupt_data("missing JPEG EOI marker"));
    }

    run_with_panic_policy("decompress_to_yuv:mozjpeg", || {
        let mut decompress = Decompress::new_mem(data).map_err(|e| {
            SessionError::corrupt_data(format!("mozjpeg decompress init failed: {e:?}"))
        })?;
        check_dimensions(decompress.width(), decompress.height())?;

        let factors: Vec<(u32, u32)> = decompress
            .components()
            .iter()
            .map(|c| (c.h_samp_factor as u32, c.v_samp_factor as u32))
            .collect();
        let sampling = classify_sampling(&factors)?;
        if sampling != dst.subsampling() {
            return Err(SessionError::codec_failed(
                "decompress_to_yuv",
                format!(
                    "stream is {sampling} but the planar image is {}",
                    dst.subsampling()
                ),
            ));
        }

        if scale_eighths == 8 {
            read_raw_planes(decompress, dst)
        } else {
            read_scaled_planes(decompress, scale_eighths, dst)
        }
    })
    .map_err(panic_as_corrupt)
}

fn read_raw_planes(decompress: Decompress<&[u8]>, dst: &mut YuvImage) -> EngineResult<()> {
    let mut started = decompress.raw().map_err(|e| {
        SessionError::corrupt_data(format!("mozjpeg raw decompress start failed: {e:?}"))
    })?;
    let strides: Vec<usize> = started.components().iter().map(|c| c.row_stride()).collect();
    let mut components: Vec<Vec<u8>> = vec![Vec::new(); strides.len()];
    {
        let mut targets: Vec<&mut Vec<u8>> = components.iter_mut().collect();
        started.read_raw_data(&mut targets);
    }
    started.finish().map_err(|e| {
        SessionError::corrupt_data(format!("mozjpeg: failed to finish raw decode: {e:?}"))
    })?;

    let layout = *dst.layout();
    for (index, (component, stride)) in components.iter().zip(strides).enumerate() {
        if let (Some(plane), Some(bytes)) = (layout.plane(index), dst.plane_mut(index)) {
            store_component(component, stride, plane, bytes);
        }
    }

    debug!(
        target: "tjsession::native",
        width = layout.width(),
        height = layout.height(),
        subsampling = %layout.subsampling(),
        "decoded JPEG to raw planes"
    );
    Ok(())
}

fn read_scaled_planes(
    mut decompress: Decompress<&[u8]>,
    scale_eighths: u8,
    dst: &mut YuvImage,
) -> EngineResult<()> {
    decompress.scale(scale_eighths);
    decompress.do_fancy_upsampling(false);

    let layout = *dst.layout();
    let gray = layout.subsampling().is_gray();
    let (width, height, channels, samples) = if gray {
        let mut started = decompress.grayscale().map_err(|e| {
            SessionError::corrupt_data(format!("mozjpeg grayscale start failed: {e:?}"))
        })?;
        let (w, h) = (started.width(), started.height());
        let samples: Vec<u8> = started.read_scanlines().map_err(|e| {
            SessionError::corrupt_data(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;
        (w, h, 1, samples)
    } else {
        let mut started = decompress.to_colorspace(ColorSpace::JCS_YCbCr).map_err(|e| {
            SessionError::corrupt_data(format!("mozjpeg YCbCr start failed: {e:?}"))
        })?;
        let (w, h) = (started.width(), started.height());
        let samples: Vec<[u8; 3]> = started.read_scanlines().map_err(|e| {
            SessionError::corrupt_data(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;
        (w, h, 3, samples.into_iter().flatten().collect())
    };

    if width != layout.width() as usize
        || height != layout.height() as usize
        || samples.len() != width * height * channels
    {
        return Err(SessionError::codec_failed(
            "decompress_to_yuv",
            format!(
                "decoded {width}x{height} but planar image is {}x{}",
                layout.width(),
                layout.height()
            ),
        ));
    }

    let hsf = layout.subsampling().h_factor() as usize;
    let vsf = layout.subsampling().v_factor() as usize;
    for index in 0..layout.num_planes() {
        let (Some(plane), Some(bytes)) = (layout.plane(index).copied(), dst.plane_mut(index))
        else {
            continue;
        };
        // Luma keeps every sample; chroma keeps one per block.
        let (step_x, step_y) = if index == 0 { (1, 1) } else { (hsf, vsf) };
        for (r, out) in bytes.chunks_mut(plane.pitch).take(plane.height).enumerate() {
            let y = (r * step_y).min(height - 1);
            for (c, sample) in out[..plane.width].iter_mut().enumerate() {
                let x = (c * step_x).min(width - 1);
                *sample = samples[(y * width + x) * channels + index];
            }
        }
    }

    debug!(
        target: "tjsession::native",
        width,
        height,
        scale_eighths,
        subsampling = %layout.subsampling(),
        "decoded JPEG to scaled planes"
    );
    Ok(())
}

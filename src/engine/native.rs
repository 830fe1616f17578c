// src/engine/native.rs
//
// The seam between sessions and the native JPEG codec.
//
// Sessions validate geometry and size buffers; a NativeCodec does the pixel
// work. MozjpegCodec is the production implementation (libjpeg-turbo via the
// mozjpeg crate); tests substitute their own.

use crate::error::SessionError;
use crate::format::{Flags, PixelFormat, Subsampling};
use tracing::debug;

use super::common::{run_with_panic_policy, EngineResult};
use super::image::{ImageDescriptor, YuvImage};
use super::layout;
use super::scaling::ScalingFactor;
use super::transform::{self, TransformPlan};
use super::{decoder, encoder, yuv};

/// Quality used when a transform re-encodes its output.
pub const TRANSFORM_QUALITY: u8 = 95;

/// Header fields of a compressed stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JpegHeader {
    pub width: u32,
    pub height: u32,
    pub subsampling: Subsampling,
}

/// Read-only packed pixels handed to the codec.
#[derive(Clone, Copy, Debug)]
pub struct PixelView<'a> {
    pub desc: ImageDescriptor,
    pub data: &'a [u8],
}

/// Writable packed pixels handed to the codec.
#[derive(Debug)]
pub struct PixelViewMut<'a> {
    pub desc: ImageDescriptor,
    pub data: &'a mut [u8],
}

/// Tightly packed 8-bit gray or RGB pixels, top row first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    /// 1 (gray) or 3 (RGB)
    pub channels: usize,
    pub data: Vec<u8>,
}

impl Raster {
    pub fn new(width: u32, height: u32, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![0; width as usize * height as usize * channels],
        }
    }

    pub fn is_gray(&self) -> bool {
        self.channels == 1
    }

    pub fn stride(&self) -> usize {
        self.width as usize * self.channels
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let start = y as usize * self.stride() + x as usize * self.channels;
        &self.data[start..start + self.channels]
    }

    /// Gray copy of this raster (a clone when already gray).
    pub fn to_gray(&self) -> Raster {
        if self.is_gray() {
            return self.clone();
        }
        let data = self
            .data
            .chunks_exact(3)
            .map(|p| yuv::luma(p[0], p[1], p[2]))
            .collect();
        Raster {
            width: self.width,
            height: self.height,
            channels: 1,
            data,
        }
    }
}

/// Copy packed pixels into a raster (gray for gray formats, RGB otherwise).
pub fn gather(src: &PixelView<'_>) -> Raster {
    let desc = &src.desc;
    let format = desc.format;
    let ps = format.pixel_size();
    let mut out = Raster::new(desc.width, desc.height, if format.is_gray() { 1 } else { 3 });
    let stride = out.stride();

    for (row, dst) in (0..desc.height).zip(out.data.chunks_exact_mut(stride)) {
        let line = &src.data[desc.row_range(row)];
        match (format.red_offset(), format.green_offset(), format.blue_offset()) {
            (Some(r), Some(g), Some(b)) => {
                for (px, d) in line.chunks_exact(ps).zip(dst.chunks_exact_mut(3)) {
                    d[0] = px[r];
                    d[1] = px[g];
                    d[2] = px[b];
                }
            }
            _ => dst.copy_from_slice(line),
        }
    }
    out
}

/// Write a raster into packed pixels. Padding and alpha bytes become 0xFF.
pub fn scatter(raster: &Raster, dst: &mut PixelViewMut<'_>) -> EngineResult<()> {
    let desc = dst.desc;
    if raster.width != desc.width || raster.height != desc.height {
        return Err(SessionError::codec_failed(
            "scatter",
            format!(
                "decoded {}x{} but destination is {}x{}",
                raster.width, raster.height, desc.width, desc.height
            ),
        ));
    }
    let format = desc.format;
    let ps = format.pixel_size();
    let stride = raster.stride();

    for (row, src) in (0..desc.height).zip(raster.data.chunks_exact(stride)) {
        let line = &mut dst.data[desc.row_range(row)];
        match (format.red_offset(), format.green_offset(), format.blue_offset()) {
            (Some(r), Some(g), Some(b)) => {
                for (px, s) in line.chunks_exact_mut(ps).zip(src.chunks_exact(raster.channels)) {
                    px.fill(0xFF);
                    let (sr, sg, sb) = if raster.is_gray() {
                        (s[0], s[0], s[0])
                    } else {
                        (s[0], s[1], s[2])
                    };
                    px[r] = sr;
                    px[g] = sg;
                    px[b] = sb;
                }
            }
            _ => {
                if raster.is_gray() {
                    line.copy_from_slice(src);
                } else {
                    for (px, s) in line.iter_mut().zip(src.chunks_exact(3)) {
                        *px = yuv::luma(s[0], s[1], s[2]);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Operations a native JPEG codec provides to a session.
///
/// Implementations own whatever native state one session needs. `allocate`
/// is called once when the session opens and `release` once when it closes.
pub trait NativeCodec: Send {
    fn allocate(&mut self) -> EngineResult<()>;

    fn release(&mut self);

    fn decompress_header(&mut self, jpeg: &[u8]) -> EngineResult<JpegHeader>;

    fn compress(
        &mut self,
        src: PixelView<'_>,
        subsampling: Subsampling,
        quality: u8,
    ) -> EngineResult<Vec<u8>>;

    /// Decode `jpeg` scaled by `factor` into `dst`, whose dimensions are the
    /// scaled dimensions.
    fn decompress(
        &mut self,
        jpeg: &[u8],
        dst: PixelViewMut<'_>,
        factor: ScalingFactor,
        flags: Flags,
    ) -> EngineResult<()>;

    fn encode_yuv(&mut self, src: PixelView<'_>, dst: &mut YuvImage) -> EngineResult<()>;

    /// Encode the planes of `src` without colour conversion.
    fn compress_from_yuv(&mut self, src: &YuvImage, quality: u8) -> EngineResult<Vec<u8>>;

    /// Decode `jpeg` scaled by `factor` into the planes of `dst`, whose
    /// dimensions are the scaled dimensions.
    fn decompress_to_yuv(
        &mut self,
        jpeg: &[u8],
        dst: &mut YuvImage,
        factor: ScalingFactor,
        flags: Flags,
    ) -> EngineResult<()>;

    fn decode_yuv(&mut self, src: &YuvImage, dst: PixelViewMut<'_>) -> EngineResult<()>;

    /// One decode pass, one encode pass per plan. Errors carry the plan index.
    fn transform(&mut self, jpeg: &[u8], plans: &[TransformPlan]) -> EngineResult<Vec<Vec<u8>>>;

    fn max_compressed_size(&self, width: u32, height: u32) -> EngineResult<usize> {
        layout::max_compressed_size(width, height)
    }
}

/// libjpeg-turbo through the `mozjpeg` crate.
#[derive(Debug, Default)]
pub struct MozjpegCodec {
    allocated: bool,
}

impl MozjpegCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_allocated(&self, operation: &'static str) -> EngineResult<()> {
        if self.allocated {
            Ok(())
        } else {
            Err(SessionError::codec_failed(operation, "native handle not allocated"))
        }
    }
}

impl NativeCodec for MozjpegCodec {
    fn allocate(&mut self) -> EngineResult<()> {
        self.allocated = true;
        debug!(target: "tjsession::native", "mozjpeg handle allocated");
        Ok(())
    }

    fn release(&mut self) {
        if self.allocated {
            self.allocated = false;
            debug!(target: "tjsession::native", "mozjpeg handle released");
        }
    }

    fn decompress_header(&mut self, jpeg: &[u8]) -> EngineResult<JpegHeader> {
        self.ensure_allocated("decompress_header")?;
        decoder::read_header(jpeg)
    }

    fn compress(
        &mut self,
        src: PixelView<'_>,
        subsampling: Subsampling,
        quality: u8,
    ) -> EngineResult<Vec<u8>> {
        self.ensure_allocated("compress")?;
        if src.desc.format.is_gray() && !subsampling.is_gray() {
            return Err(SessionError::unsupported_format(
                PixelFormat::Gray.to_string(),
                format!("cannot produce {subsampling} chroma from a grayscale source"),
            ));
        }
        let raster = gather(&src);
        encoder::encode_raster(&raster, subsampling, quality)
    }

    fn decompress(
        &mut self,
        jpeg: &[u8],
        mut dst: PixelViewMut<'_>,
        factor: ScalingFactor,
        flags: Flags,
    ) -> EngineResult<()> {
        self.ensure_allocated("decompress")?;
        let scale_eighths = factor.as_eighths().ok_or_else(|| {
            SessionError::invalid_argument(
                "scaling factor",
                factor.to_string(),
                "not supported by the decoder",
            )
        })?;
        let raster = decoder::decode_raster(
            jpeg,
            decoder::DecodeOptions {
                scale_eighths,
                gray: dst.desc.format.is_gray(),
                fast_upsample: flags.contains(Flags::FAST_UPSAMPLE),
            },
        )?;
        scatter(&raster, &mut dst)
    }

    fn encode_yuv(&mut self, src: PixelView<'_>, dst: &mut YuvImage) -> EngineResult<()> {
        self.ensure_allocated("encode_yuv")?;
        let raster = gather(&src);
        run_with_panic_policy("encode_yuv", || yuv::raster_to_yuv(&raster, dst))
    }

    fn compress_from_yuv(&mut self, src: &YuvImage, quality: u8) -> EngineResult<Vec<u8>> {
        self.ensure_allocated("compress_from_yuv")?;
        encoder::encode_planes(src, quality)
    }

    // Planes come out unconverted and never upsampled, so no flag applies.
    fn decompress_to_yuv(
        &mut self,
        jpeg: &[u8],
        dst: &mut YuvImage,
        factor: ScalingFactor,
        _flags: Flags,
    ) -> EngineResult<()> {
        self.ensure_allocated("decompress_to_yuv")?;
        let scale_eighths = factor.as_eighths().ok_or_else(|| {
            SessionError::invalid_argument(
                "scaling factor",
                factor.to_string(),
                "not supported by the decoder",
            )
        })?;
        decoder::decode_planes(jpeg, scale_eighths, dst)
    }

    fn decode_yuv(&mut self, src: &YuvImage, mut dst: PixelViewMut<'_>) -> EngineResult<()> {
        self.ensure_allocated("decode_yuv")?;
        let raster = yuv::yuv_to_raster(src, dst.desc.format.is_gray());
        scatter(&raster, &mut dst)
    }

    fn transform(&mut self, jpeg: &[u8], plans: &[TransformPlan]) -> EngineResult<Vec<Vec<u8>>> {
        self.ensure_allocated("transform")?;
        let first = plans.first().map(|p| p.index).unwrap_or(0);
        let all_gray = plans.iter().all(|p| p.gray);
        let source = decoder::decode_raster(
            jpeg,
            decoder::DecodeOptions {
                scale_eighths: 8,
                gray: all_gray,
                fast_upsample: false,
            },
        )
        .map_err(|e| SessionError::transform_failed(first, e.to_string()))?;

        plans
            .iter()
            .map(|plan| {
                let out = transform::apply_plan(&source, plan);
                encoder::encode_raster(&out, plan.subsampling, TRANSFORM_QUALITY)
                    .map_err(|e| SessionError::transform_failed(plan.index, e.to_string()))
            })
            .collect()
    }
}

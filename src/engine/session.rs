// src/engine/session.rs
//
// CodecSession: one native codec handle plus the state a caller configures
// around it (source image, quality, subsampling, compressed stream).
//
// Every public operation validates its arguments and the session state,
// sizes caller-visible buffers with the layout calculator, then delegates the
// pixel work to the NativeCodec.

use crate::error::{ErrorKind, SessionError};
use crate::format::{Flags, PixelFormat, Subsampling};
use crate::ops::TransformDescriptor;
use tracing::{debug, warn};

use super::common::EngineResult;
use super::image::{ImageDescriptor, PackedImage, PackedIntImage, SourceImage, YuvImage};
use super::layout::packed_buffer_size;
use super::limits::Limits;
use super::native::{JpegHeader, MozjpegCodec, NativeCodec, PixelView, PixelViewMut};
use super::runtime;
use super::scaling::{negotiate, ScaledSize};
use super::transform::plan_all;

/// Lifecycle of a session. Construction yields `Ready`; `close()` (or drop)
/// yields `Closed`, after which every operation fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    Closed,
}

fn check_quality(quality: i32) -> EngineResult<u8> {
    if !(1..=100).contains(&quality) {
        return Err(SessionError::invalid_argument(
            "quality",
            quality.to_string(),
            "must be between 1 and 100",
        ));
    }
    Ok(quality as u8)
}

fn check_gray_source(format: PixelFormat, subsampling: Subsampling) -> EngineResult<()> {
    if format.is_gray() && !subsampling.is_gray() {
        return Err(SessionError::unsupported_format(
            format.to_string(),
            format!("a grayscale source needs grayscale subsampling, not {subsampling}"),
        ));
    }
    Ok(())
}

fn require_header<'a>(
    header: &Option<JpegHeader>,
    jpeg: &'a Option<Vec<u8>>,
) -> EngineResult<(JpegHeader, &'a [u8])> {
    match (header, jpeg) {
        (Some(header), Some(jpeg)) => Ok((*header, jpeg.as_slice())),
        _ => Err(SessionError::precondition(
            "no JPEG header; call decompress_header first",
        )),
    }
}

/// A compress / decompress / transform session over one native handle.
///
/// Methods take `&mut self`, so one session serves one thread at a time.
/// Open one session per thread for parallel work.
pub struct CodecSession<C: NativeCodec = MozjpegCodec> {
    codec: C,
    state: SessionState,
    limits: Limits,
    source: SourceImage,
    quality: Option<u8>,
    subsampling: Option<Subsampling>,
    jpeg: Option<Vec<u8>>,
    header: Option<JpegHeader>,
    compressed_size: usize,
    transformed_sizes: Vec<usize>,
}

impl CodecSession<MozjpegCodec> {
    /// Open a session backed by libjpeg-turbo with no resource limits.
    pub fn open() -> EngineResult<Self> {
        Self::open_with(Limits::default())
    }

    pub fn open_with(limits: Limits) -> EngineResult<Self> {
        Self::with_codec(MozjpegCodec::new(), limits)
    }
}

impl<C: NativeCodec> CodecSession<C> {
    /// Open a session over an arbitrary codec implementation.
    pub fn with_codec(mut codec: C, limits: Limits) -> EngineResult<Self> {
        codec.allocate().map_err(|e| {
            if e.kind() == ErrorKind::ResourceError {
                e
            } else {
                SessionError::resource(format!("failed to allocate native handle: {e}"))
            }
        })?;
        runtime::register_session();
        debug!(target: "tjsession::session", policy = ?limits.policy, "session opened");

        Ok(Self {
            codec,
            state: SessionState::Ready,
            limits,
            source: SourceImage::None,
            quality: None,
            subsampling: None,
            jpeg: None,
            header: None,
            compressed_size: 0,
            transformed_sizes: Vec::new(),
        })
    }

    fn ensure_open(&self) -> EngineResult<()> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Closed => Err(SessionError::session_closed()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// The codec behind this session.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    // ---------------------------------------------------------------------
    // Compression configuration
    // ---------------------------------------------------------------------

    /// Use `image` as the compression source, replacing any prior association.
    pub fn associate_source_image(&mut self, image: PackedImage) -> EngineResult<()> {
        self.ensure_open()?;
        image.descriptor().check_buffer(image.data().len())?;
        self.limits.enforce_pixels(image.width(), image.height())?;
        debug!(
            target: "tjsession::session",
            width = image.width(),
            height = image.height(),
            format = %image.format(),
            "associated packed source"
        );
        self.source = SourceImage::Packed(image);
        Ok(())
    }

    pub fn associate_source_int_image(&mut self, image: PackedIntImage) -> EngineResult<()> {
        self.ensure_open()?;
        image.byte_descriptor().check_buffer(image.data().len() * 4)?;
        self.limits.enforce_pixels(image.width(), image.height())?;
        debug!(
            target: "tjsession::session",
            width = image.width(),
            height = image.height(),
            format = %image.format(),
            "associated packed int source"
        );
        self.source = SourceImage::PackedInt(image);
        Ok(())
    }

    pub fn associate_source_yuv(&mut self, image: YuvImage) -> EngineResult<()> {
        self.ensure_open()?;
        self.limits.enforce_pixels(image.width(), image.height())?;
        debug!(
            target: "tjsession::session",
            width = image.width(),
            height = image.height(),
            subsampling = %image.subsampling(),
            "associated planar source"
        );
        self.source = SourceImage::Planar(image);
        Ok(())
    }

    pub fn source(&self) -> &SourceImage {
        &self.source
    }

    /// Drop the source association and hand the image back.
    pub fn take_source(&mut self) -> SourceImage {
        std::mem::take(&mut self.source)
    }

    pub fn set_subsampling(&mut self, subsampling: Subsampling) -> EngineResult<()> {
        self.ensure_open()?;
        self.subsampling = Some(subsampling);
        Ok(())
    }

    pub fn set_subsampling_code(&mut self, code: i32) -> EngineResult<()> {
        self.set_subsampling(Subsampling::from_code(code)?)
    }

    pub fn subsampling(&self) -> Option<Subsampling> {
        self.subsampling
    }

    pub fn set_quality(&mut self, quality: u8) -> EngineResult<()> {
        self.set_quality_code(quality as i32)
    }

    pub fn set_quality_code(&mut self, quality: i32) -> EngineResult<()> {
        self.ensure_open()?;
        self.quality = Some(check_quality(quality)?);
        Ok(())
    }

    pub fn quality(&self) -> Option<u8> {
        self.quality
    }

    // ---------------------------------------------------------------------
    // Compression
    // ---------------------------------------------------------------------

    /// Compress the associated source.
    pub fn compress(&mut self, flags: Flags) -> EngineResult<Vec<u8>> {
        self.ensure_open()?;
        let quality = self
            .quality
            .ok_or_else(|| SessionError::precondition("quality not set"))?;
        let bottom_up = flags.contains(Flags::BOTTOM_UP);

        let (width, height, out) = match &self.source {
            SourceImage::None => {
                return Err(SessionError::precondition("no source image associated"))
            }
            SourceImage::Planar(yuv) => (
                yuv.width(),
                yuv.height(),
                self.codec.compress_from_yuv(yuv, quality)?,
            ),
            SourceImage::Packed(img) => {
                let subsampling = self
                    .subsampling
                    .ok_or_else(|| SessionError::precondition("subsampling not set"))?;
                check_gray_source(img.format(), subsampling)?;
                let mut desc = *img.descriptor();
                desc.bottom_up |= bottom_up;
                let view = PixelView {
                    desc,
                    data: img.data(),
                };
                (
                    img.width(),
                    img.height(),
                    self.codec.compress(view, subsampling, quality)?,
                )
            }
            SourceImage::PackedInt(img) => {
                let subsampling = self
                    .subsampling
                    .ok_or_else(|| SessionError::precondition("subsampling not set"))?;
                check_gray_source(img.format(), subsampling)?;
                let bytes = img.to_le_bytes();
                let mut desc = img.byte_descriptor();
                desc.bottom_up |= bottom_up;
                let view = PixelView { desc, data: &bytes };
                (
                    img.width(),
                    img.height(),
                    self.codec.compress(view, subsampling, quality)?,
                )
            }
        };

        let bound = self.codec.max_compressed_size(width, height)?;
        if out.len() > bound {
            return Err(SessionError::codec_failed(
                "compress",
                format!("produced {} bytes, above the {bound} byte bound", out.len()),
            ));
        }

        self.compressed_size = out.len();
        debug!(
            target: "tjsession::session",
            width,
            height,
            quality,
            bytes = out.len(),
            "compressed"
        );
        Ok(out)
    }

    /// Compress into `dst`, which must hold at least the worst-case size.
    /// Returns the number of bytes written.
    pub fn compress_into(&mut self, dst: &mut [u8], flags: Flags) -> EngineResult<usize> {
        self.ensure_open()?;
        let (width, height) = self
            .source
            .dimensions()
            .ok_or_else(|| SessionError::precondition("no source image associated"))?;
        let required = self.codec.max_compressed_size(width, height)?;
        if dst.len() < required {
            return Err(SessionError::buffer_too_small(required, dst.len()));
        }
        let out = self.compress(flags)?;
        dst[..out.len()].copy_from_slice(&out);
        Ok(out.len())
    }

    /// Set subsampling and quality, then compress.
    pub fn compress_with(
        &mut self,
        subsampling: Subsampling,
        quality: u8,
        flags: Flags,
    ) -> EngineResult<Vec<u8>> {
        self.set_subsampling(subsampling)?;
        self.set_quality(quality)?;
        self.compress(flags)
    }

    /// Size of the most recent compressed output.
    pub fn compressed_size(&self) -> usize {
        self.compressed_size
    }

    /// Convert the associated packed source into a planar YUV image.
    pub fn encode_yuv(&mut self, pad: u32, flags: Flags) -> EngineResult<YuvImage> {
        self.ensure_open()?;
        let subsampling = self
            .subsampling
            .ok_or_else(|| SessionError::precondition("subsampling not set"))?;
        let bottom_up = flags.contains(Flags::BOTTOM_UP);

        let yuv = match &self.source {
            SourceImage::None | SourceImage::Planar(_) => {
                return Err(SessionError::precondition(
                    "encode_yuv needs a packed source image",
                ))
            }
            SourceImage::Packed(img) => {
                check_gray_source(img.format(), subsampling)?;
                let mut yuv = YuvImage::new(img.width(), pad, img.height(), subsampling)?;
                let mut desc = *img.descriptor();
                desc.bottom_up |= bottom_up;
                self.codec.encode_yuv(
                    PixelView {
                        desc,
                        data: img.data(),
                    },
                    &mut yuv,
                )?;
                yuv
            }
            SourceImage::PackedInt(img) => {
                check_gray_source(img.format(), subsampling)?;
                let mut yuv = YuvImage::new(img.width(), pad, img.height(), subsampling)?;
                let bytes = img.to_le_bytes();
                let mut desc = img.byte_descriptor();
                desc.bottom_up |= bottom_up;
                self.codec
                    .encode_yuv(PixelView { desc, data: &bytes }, &mut yuv)?;
                yuv
            }
        };

        debug!(
            target: "tjsession::session",
            width = yuv.width(),
            height = yuv.height(),
            pad,
            bytes = yuv.size(),
            "encoded YUV"
        );
        Ok(yuv)
    }

    /// Compress a planar image directly, leaving the source association alone.
    pub fn compress_from_yuv(
        &mut self,
        yuv: &YuvImage,
        quality: u8,
        flags: Flags,
    ) -> EngineResult<Vec<u8>> {
        self.ensure_open()?;
        let quality = check_quality(quality as i32)?;
        self.limits.enforce_pixels(yuv.width(), yuv.height())?;
        let out = self.codec.compress_from_yuv(yuv, quality)?;
        self.compressed_size = out.len();
        debug!(
            target: "tjsession::session",
            width = yuv.width(),
            height = yuv.height(),
            quality,
            flags = flags.bits(),
            bytes = out.len(),
            "compressed from YUV"
        );
        Ok(out)
    }

    // ---------------------------------------------------------------------
    // Decompression
    // ---------------------------------------------------------------------

    /// Read the header of `jpeg` and keep the stream for later decompression.
    pub fn decompress_header(&mut self, jpeg: &[u8]) -> EngineResult<JpegHeader> {
        self.ensure_open()?;
        self.limits.enforce_source_len(jpeg.len())?;
        let header = self.codec.decompress_header(jpeg)?;
        self.limits.enforce_pixels(header.width, header.height)?;

        debug!(
            target: "tjsession::session",
            width = header.width,
            height = header.height,
            subsampling = %header.subsampling,
            bytes = jpeg.len(),
            "read header"
        );
        self.header = Some(header);
        self.jpeg = Some(jpeg.to_vec());
        Ok(header)
    }

    /// Header of the associated stream, if one was read.
    pub fn header(&self) -> Option<&JpegHeader> {
        self.header.as_ref()
    }

    /// Negotiate output dimensions for the associated stream.
    pub fn scaled_size(&self, desired_width: u32, desired_height: u32) -> EngineResult<ScaledSize> {
        self.ensure_open()?;
        let (header, _) = require_header(&self.header, &self.jpeg)?;
        negotiate(header.width, header.height, desired_width, desired_height)
    }

    /// Decompress into `dst` at the negotiated scale. Returns the chosen size.
    pub fn decompress_into(
        &mut self,
        dst: &mut [u8],
        desired_width: u32,
        pitch: usize,
        desired_height: u32,
        format: PixelFormat,
        flags: Flags,
    ) -> EngineResult<ScaledSize> {
        self.ensure_open()?;
        let (header, jpeg) = require_header(&self.header, &self.jpeg)?;
        let scaled = negotiate(header.width, header.height, desired_width, desired_height)?;

        let desc = ImageDescriptor::new(scaled.width, scaled.height, format)
            .with_pitch(pitch)
            .with_bottom_up(flags.contains(Flags::BOTTOM_UP));
        desc.validate()?;
        let required = packed_buffer_size(scaled.width, pitch, scaled.height, format)?;
        if dst.len() < required {
            return Err(SessionError::buffer_too_small(required, dst.len()));
        }

        self.codec.decompress(
            jpeg,
            PixelViewMut { desc, data: dst },
            scaled.factor,
            flags,
        )?;

        debug!(
            target: "tjsession::session",
            width = scaled.width,
            height = scaled.height,
            factor = %scaled.factor,
            format = %format,
            "decompressed"
        );
        Ok(scaled)
    }

    /// Decompress into a newly allocated, tightly packed image.
    pub fn decompress(
        &mut self,
        desired_width: u32,
        desired_height: u32,
        format: PixelFormat,
        flags: Flags,
    ) -> EngineResult<PackedImage> {
        let scaled = self.scaled_size(desired_width, desired_height)?;
        let mut buf = vec![0u8; packed_buffer_size(scaled.width, 0, scaled.height, format)?];
        let scaled = self.decompress_into(&mut buf, desired_width, 0, desired_height, format, flags)?;
        let desc = ImageDescriptor::new(scaled.width, scaled.height, format)
            .with_bottom_up(flags.contains(Flags::BOTTOM_UP));
        PackedImage::new(buf, desc)
    }

    /// Decompress into a packed-integer image. Needs a 4-byte format.
    pub fn decompress_to_int(
        &mut self,
        desired_width: u32,
        desired_height: u32,
        format: PixelFormat,
        flags: Flags,
    ) -> EngineResult<PackedIntImage> {
        self.ensure_open()?;
        if !format.supports_int_pixels() {
            return Err(SessionError::unsupported_format(
                format.to_string(),
                "integer pixel buffers need a 4-byte pixel format",
            ));
        }
        let image = self.decompress(desired_width, desired_height, format, flags)?;
        let (width, height) = (image.width(), image.height());
        let pixels: Vec<u32> = image
            .data()
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(PackedIntImage::new(pixels, width, 0, height, format)?
            .with_bottom_up(flags.contains(Flags::BOTTOM_UP)))
    }

    /// Decode the associated stream to planar YUV at the negotiated scale.
    ///
    /// Plane sizes follow the scaled dimensions and the stream's subsampling.
    pub fn decompress_to_yuv(
        &mut self,
        desired_width: u32,
        pad: u32,
        desired_height: u32,
        flags: Flags,
    ) -> EngineResult<YuvImage> {
        self.ensure_open()?;
        let (header, jpeg) = require_header(&self.header, &self.jpeg)?;
        let scaled = negotiate(header.width, header.height, desired_width, desired_height)?;
        let mut yuv = YuvImage::new(scaled.width, pad, scaled.height, header.subsampling)?;
        self.codec
            .decompress_to_yuv(jpeg, &mut yuv, scaled.factor, flags)?;
        debug!(
            target: "tjsession::session",
            width = scaled.width,
            height = scaled.height,
            factor = %scaled.factor,
            pad,
            bytes = yuv.size(),
            "decompressed to YUV"
        );
        Ok(yuv)
    }

    /// Convert the associated planar source to packed pixels.
    pub fn decode_yuv(&mut self, format: PixelFormat, flags: Flags) -> EngineResult<PackedImage> {
        self.ensure_open()?;
        let SourceImage::Planar(yuv) = &self.source else {
            return Err(SessionError::precondition(
                "decode_yuv needs a planar source image",
            ));
        };
        let desc = ImageDescriptor::new(yuv.width(), yuv.height(), format)
            .with_bottom_up(flags.contains(Flags::BOTTOM_UP));
        desc.validate()?;
        let mut buf = vec![0u8; desc.required_len()?];
        self.codec.decode_yuv(
            yuv,
            PixelViewMut {
                desc,
                data: &mut buf,
            },
        )?;
        PackedImage::new(buf, desc)
    }

    // ---------------------------------------------------------------------
    // Transform
    // ---------------------------------------------------------------------

    /// Apply every descriptor to `jpeg`, producing one output per descriptor.
    ///
    /// The batch is validated up front; any failure aborts the whole batch
    /// with an error naming the failing descriptor.
    pub fn transform(
        &mut self,
        jpeg: &[u8],
        descriptors: &[TransformDescriptor],
        flags: Flags,
    ) -> EngineResult<Vec<Vec<u8>>> {
        self.ensure_open()?;
        if descriptors.is_empty() {
            return Err(SessionError::invalid_argument(
                "descriptors",
                "[]",
                "at least one transform is required",
            ));
        }
        self.limits.enforce_source_len(jpeg.len())?;
        let header = self.codec.decompress_header(jpeg)?;
        self.limits.enforce_pixels(header.width, header.height)?;

        let plans = plan_all(&header, descriptors)?;
        let outputs = self.codec.transform(jpeg, &plans)?;
        if outputs.len() != plans.len() {
            return Err(SessionError::codec_failed(
                "transform",
                format!("{} outputs for {} transforms", outputs.len(), plans.len()),
            ));
        }
        for (plan, out) in plans.iter().zip(&outputs) {
            if out.len() > plan.capacity {
                return Err(SessionError::transform_failed(
                    plan.index,
                    format!(
                        "output of {} bytes exceeds its {} byte buffer",
                        out.len(),
                        plan.capacity
                    ),
                ));
            }
        }

        self.transformed_sizes = outputs.iter().map(Vec::len).collect();
        debug!(
            target: "tjsession::session",
            count = outputs.len(),
            flags = flags.bits(),
            sizes = ?self.transformed_sizes,
            "transformed"
        );
        Ok(outputs)
    }

    /// Output sizes of the most recent transform batch.
    pub fn transformed_sizes(&self) -> &[usize] {
        &self.transformed_sizes
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Release the native handle. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.codec.release();
        runtime::release_session();
        self.state = SessionState::Closed;
        self.source = SourceImage::None;
        self.jpeg = None;
        self.header = None;
        debug!(target: "tjsession::session", "session closed");
    }
}

impl<C: NativeCodec> Drop for CodecSession<C> {
    fn drop(&mut self) {
        if self.state == SessionState::Ready {
            warn!(
                target: "tjsession::session",
                "session dropped without close(); releasing native handle"
            );
            self.close();
        }
    }
}

impl<C: NativeCodec> std::fmt::Debug for CodecSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecSession")
            .field("state", &self.state)
            .field("quality", &self.quality)
            .field("subsampling", &self.subsampling)
            .field("header", &self.header)
            .field("compressed_size", &self.compressed_size)
            .finish_non_exhaustive()
    }
}

// src/engine/image.rs
//
// Caller-visible images: packed byte buffers, packed 32-bit buffers and
// planar YUV buffers, plus the descriptor that locates a region inside one.

use crate::error::SessionError;
use crate::format::{PixelFormat, Subsampling};
use std::ops::Range;

use super::common::EngineResult;
use super::layout::{PlaneLayout, YuvLayout};
use super::MAX_DIMENSION;

/// Where an image lives inside a packed buffer.
///
/// `pitch` is in bytes; 0 means rows are tightly packed (`width * pixel_size`).
/// `x`/`y` locate the image inside a larger buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
    pub pitch: usize,
    pub format: PixelFormat,
    pub bottom_up: bool,
}

impl ImageDescriptor {
    /// A tightly packed image at the origin of its buffer.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            x: 0,
            y: 0,
            pitch: 0,
            format,
            bottom_up: false,
        }
    }

    pub fn with_pitch(mut self, pitch: usize) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn with_offset(mut self, x: u32, y: u32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_bottom_up(mut self, bottom_up: bool) -> Self {
        self.bottom_up = bottom_up;
        self
    }

    /// Bytes in one row of the image proper.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.pixel_size()
    }

    /// Effective pitch in bytes.
    pub fn effective_pitch(&self) -> usize {
        if self.pitch == 0 {
            self.row_bytes()
        } else {
            self.pitch
        }
    }

    /// Check dimensions and pitch.
    pub fn validate(&self) -> EngineResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SessionError::invalid_argument(
                "dimensions",
                format!("{}x{}", self.width, self.height),
                "width and height must be at least 1",
            ));
        }
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(SessionError::dimension_exceeds_limit(
                self.width.max(self.height),
                MAX_DIMENSION,
            ));
        }
        let needed = (self.x as usize)
            .checked_add(self.width as usize)
            .and_then(|px| px.checked_mul(self.format.pixel_size()))
            .ok_or_else(|| {
                SessionError::invalid_argument(
                    "x",
                    self.x.to_string(),
                    "row extent overflows the address space",
                )
            })?;
        if self.effective_pitch() < needed {
            return Err(SessionError::invalid_argument(
                "pitch",
                self.pitch.to_string(),
                format!("smaller than one row of {needed} bytes"),
            ));
        }
        self.required_len()?;
        Ok(())
    }

    /// Minimum buffer length holding the described region.
    pub fn required_len(&self) -> EngineResult<usize> {
        (self.y as usize)
            .checked_add(self.height as usize)
            .and_then(|rows| rows.checked_mul(self.effective_pitch()))
            .ok_or_else(|| {
                SessionError::invalid_argument(
                    "pitch",
                    self.pitch.to_string(),
                    format!(
                        "{} rows from row {} overflow the address space",
                        self.height, self.y
                    ),
                )
            })
    }

    /// Byte range of image row `row` (0 = top of the image) in the buffer.
    ///
    /// Only meaningful for a descriptor that passed `validate`.
    pub fn row_range(&self, row: u32) -> Range<usize> {
        let stored = if self.bottom_up {
            self.height - 1 - row
        } else {
            row
        };
        let start = (self.y as usize + stored as usize) * self.effective_pitch()
            + self.x as usize * self.format.pixel_size();
        start..start + self.row_bytes()
    }

    /// Validate and check that `len` bytes are enough.
    pub fn check_buffer(&self, len: usize) -> EngineResult<()> {
        self.validate()?;
        let required = self.required_len()?;
        if len < required {
            return Err(SessionError::buffer_too_small(required, len));
        }
        Ok(())
    }
}

/// A packed image in an owned byte buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedImage {
    data: Vec<u8>,
    desc: ImageDescriptor,
}

impl PackedImage {
    pub fn new(data: Vec<u8>, desc: ImageDescriptor) -> EngineResult<Self> {
        desc.check_buffer(data.len())?;
        Ok(Self { data, desc })
    }

    /// A zero-filled, tightly packed image.
    pub fn zeroed(width: u32, height: u32, format: PixelFormat) -> EngineResult<Self> {
        let desc = ImageDescriptor::new(width, height, format);
        desc.validate()?;
        Ok(Self {
            data: vec![0; desc.required_len()?],
            desc,
        })
    }

    pub fn descriptor(&self) -> &ImageDescriptor {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn format(&self) -> PixelFormat {
        self.desc.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Bytes of pixel (`x`, `y`) in image coordinates.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.desc.width || y >= self.desc.height {
            return None;
        }
        let ps = self.desc.format.pixel_size();
        let start = self.desc.row_range(y).start + x as usize * ps;
        self.data.get(start..start + ps)
    }
}

/// A packed image stored as one `u32` per pixel.
///
/// `pitch` is counted in `u32` units. Channel positions follow the format's
/// bit shifts, so only 4-byte formats are accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedIntImage {
    data: Vec<u32>,
    width: u32,
    height: u32,
    x: u32,
    y: u32,
    pitch: usize,
    format: PixelFormat,
    bottom_up: bool,
}

impl PackedIntImage {
    pub fn new(
        data: Vec<u32>,
        width: u32,
        pitch: usize,
        height: u32,
        format: PixelFormat,
    ) -> EngineResult<Self> {
        Self::with_offset(data, 0, 0, width, pitch, height, format)
    }

    pub fn with_offset(
        data: Vec<u32>,
        x: u32,
        y: u32,
        width: u32,
        pitch: usize,
        height: u32,
        format: PixelFormat,
    ) -> EngineResult<Self> {
        if !format.supports_int_pixels() {
            return Err(SessionError::unsupported_format(
                format.to_string(),
                "integer pixel buffers need a 4-byte pixel format",
            ));
        }
        let img = Self {
            data,
            width,
            height,
            x,
            y,
            pitch,
            format,
            bottom_up: false,
        };
        img.byte_descriptor().check_buffer(img.data.len() * 4)?;
        Ok(img)
    }

    pub fn zeroed(width: u32, height: u32, format: PixelFormat) -> EngineResult<Self> {
        let len = width as usize * height as usize;
        Self::new(vec![0; len], width, 0, height, format)
    }

    pub fn with_bottom_up(mut self, bottom_up: bool) -> Self {
        self.bottom_up = bottom_up;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pitch in `u32` units.
    pub fn pitch(&self) -> usize {
        if self.pitch == 0 {
            self.width as usize
        } else {
            self.pitch
        }
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u32> {
        self.data
    }

    /// The equivalent descriptor over the little-endian byte image.
    pub fn byte_descriptor(&self) -> ImageDescriptor {
        ImageDescriptor {
            width: self.width,
            height: self.height,
            x: self.x,
            y: self.y,
            pitch: self.pitch.saturating_mul(4),
            format: self.format,
            bottom_up: self.bottom_up,
        }
    }

    /// Little-endian byte image of the whole buffer.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.data.iter().flat_map(|p| p.to_le_bytes()).collect()
    }

    /// Overwrite the buffer from a little-endian byte image of equal length.
    pub fn copy_from_le_bytes(&mut self, bytes: &[u8]) {
        for (dst, chunk) in self.data.iter_mut().zip(bytes.chunks_exact(4)) {
            *dst = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
    }

    /// Pixel (`x`, `y`) in image coordinates.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let stored = if self.bottom_up { self.height - 1 - y } else { y };
        let idx = (self.y as usize + stored as usize) * self.pitch() + self.x as usize + x as usize;
        self.data.get(idx).copied()
    }
}

/// A planar YUV image in an owned buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct YuvImage {
    data: Vec<u8>,
    layout: YuvLayout,
}

impl YuvImage {
    /// A zero-filled planar image.
    pub fn new(width: u32, pad: u32, height: u32, subsampling: Subsampling) -> EngineResult<Self> {
        let layout = YuvLayout::new(width, pad, height, subsampling)?;
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(SessionError::dimension_exceeds_limit(
                width.max(height),
                MAX_DIMENSION,
            ));
        }
        Ok(Self {
            data: vec![0; layout.total_size()],
            layout,
        })
    }

    /// Wrap an existing buffer. It must hold at least the layout's total size.
    pub fn from_buffer(
        data: Vec<u8>,
        width: u32,
        pad: u32,
        height: u32,
        subsampling: Subsampling,
    ) -> EngineResult<Self> {
        let layout = YuvLayout::new(width, pad, height, subsampling)?;
        if data.len() < layout.total_size() {
            return Err(SessionError::buffer_too_small(
                layout.total_size(),
                data.len(),
            ));
        }
        Ok(Self { data, layout })
    }

    pub fn layout(&self) -> &YuvLayout {
        &self.layout
    }

    pub fn width(&self) -> u32 {
        self.layout.width()
    }

    pub fn height(&self) -> u32 {
        self.layout.height()
    }

    pub fn pad(&self) -> u32 {
        self.layout.pad()
    }

    pub fn subsampling(&self) -> Subsampling {
        self.layout.subsampling()
    }

    pub fn size(&self) -> usize {
        self.layout.total_size()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Bytes of plane `index` (0 = Y, 1 = U, 2 = V).
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        let p = self.layout.plane(index)?;
        self.data.get(p.offset..p.offset + p.size)
    }

    pub fn plane_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let p: PlaneLayout = *self.layout.plane(index)?;
        self.data.get_mut(p.offset..p.offset + p.size)
    }
}

/// The image a session compresses from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SourceImage {
    #[default]
    None,
    Packed(PackedImage),
    PackedInt(PackedIntImage),
    Planar(YuvImage),
}

impl SourceImage {
    pub fn is_none(&self) -> bool {
        matches!(self, SourceImage::None)
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            SourceImage::None => None,
            SourceImage::Packed(img) => Some((img.width(), img.height())),
            SourceImage::PackedInt(img) => Some((img.width(), img.height())),
            SourceImage::Planar(img) => Some((img.width(), img.height())),
        }
    }
}

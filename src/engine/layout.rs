// src/engine/layout.rs
//
// Buffer & planar layout arithmetic.
// Every size here is computed from geometry alone; nothing touches the codec.

use crate::error::SessionError;
use crate::format::{PixelFormat, Subsampling};

use super::common::EngineResult;

/// Fixed per-image overhead allowed for markers and headers.
const HEADER_SLACK: usize = 2048;

/// Round `value` up to the next multiple of `multiple`.
///
/// `multiple` must be a power of two.
#[inline]
pub const fn pad(value: usize, multiple: usize) -> usize {
    (value + multiple - 1) & !(multiple - 1)
}

fn check_dimension(name: &'static str, value: u32) -> EngineResult<()> {
    if value == 0 {
        return Err(SessionError::invalid_argument(
            name,
            "0",
            "must be at least 1",
        ));
    }
    Ok(())
}

fn check_pad(pad: u32) -> EngineResult<()> {
    if pad == 0 || !pad.is_power_of_two() {
        return Err(SessionError::invalid_argument(
            "pad",
            pad.to_string(),
            "must be a power of two",
        ));
    }
    Ok(())
}

fn size_overflow(width: u32, height: u32) -> SessionError {
    SessionError::invalid_argument(
        "dimensions",
        format!("{width}x{height}"),
        "buffer size overflows the address space",
    )
}

/// Size in bytes of a packed buffer. `pitch == 0` means tightly packed rows.
pub fn packed_buffer_size(
    width: u32,
    pitch: usize,
    height: u32,
    format: PixelFormat,
) -> EngineResult<usize> {
    check_dimension("width", width)?;
    check_dimension("height", height)?;
    let row = width as usize * format.pixel_size();
    let pitch = if pitch == 0 { row } else { pitch };
    if pitch < row {
        return Err(SessionError::invalid_argument(
            "pitch",
            pitch.to_string(),
            format!("smaller than one row of {row} bytes"),
        ));
    }
    pitch
        .checked_mul(height as usize)
        .ok_or_else(|| size_overflow(width, height))
}

/// Worst-case compressed size of a `width` x `height` image.
///
/// Assumes 4:4:4 sampling at quality 100 and holds for every subsampling
/// level, so any buffer of this size is always large enough.
pub fn max_compressed_size(width: u32, height: u32) -> EngineResult<usize> {
    check_dimension("width", width)?;
    check_dimension("height", height)?;
    pad(width as usize, 16)
        .checked_mul(pad(height as usize, 16))
        .and_then(|n| n.checked_mul(6))
        .and_then(|n| n.checked_add(HEADER_SLACK))
        .ok_or_else(|| size_overflow(width, height))
}

/// Tighter worst-case compressed size for a known subsampling level.
pub fn max_compressed_size_for(
    width: u32,
    height: u32,
    subsampling: Subsampling,
) -> EngineResult<usize> {
    check_dimension("width", width)?;
    check_dimension("height", height)?;
    let mcu_w = subsampling.mcu_width() as usize;
    let mcu_h = subsampling.mcu_height() as usize;
    let chroma_sf = if subsampling.is_gray() {
        0
    } else {
        4 * 64 / (mcu_w * mcu_h)
    };
    pad(width as usize, mcu_w)
        .checked_mul(pad(height as usize, mcu_h))
        .and_then(|n| n.checked_mul(2 + chroma_sf))
        .and_then(|n| n.checked_add(HEADER_SLACK))
        .ok_or_else(|| size_overflow(width, height))
}

/// Geometry of one plane inside a planar YUV buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PlaneLayout {
    /// Component width in samples.
    pub width: usize,
    /// Component height in rows.
    pub height: usize,
    /// Bytes per row, including padding.
    pub pitch: usize,
    /// Byte offset of the plane from the start of the buffer.
    pub offset: usize,
    /// Plane size in bytes.
    pub size: usize,
}

/// Planar layout of a YUV image: Y, then U, then V, each row padded to `pad`.
/// Grayscale images have a single Y plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct YuvLayout {
    width: u32,
    height: u32,
    pad: u32,
    subsampling: Subsampling,
    planes: [PlaneLayout; 3],
    total: usize,
}

impl YuvLayout {
    pub fn new(width: u32, pad_to: u32, height: u32, subsampling: Subsampling) -> EngineResult<Self> {
        check_dimension("width", width)?;
        check_dimension("height", height)?;
        check_pad(pad_to)?;

        let hsf = subsampling.h_factor() as usize;
        let vsf = subsampling.v_factor() as usize;
        let row_pad = pad_to as usize;

        let pw = pad(width as usize, hsf);
        let ph = pad(height as usize, vsf);

        let luma_pitch = pad(pw, row_pad);
        let luma = PlaneLayout {
            width: pw,
            height: ph,
            pitch: luma_pitch,
            offset: 0,
            size: luma_pitch
                .checked_mul(ph)
                .ok_or_else(|| size_overflow(width, height))?,
        };

        let mut planes = [luma, PlaneLayout::default(), PlaneLayout::default()];
        let mut total = luma.size;

        if !subsampling.is_gray() {
            let cw = pw / hsf;
            let ch = ph / vsf;
            let chroma_pitch = pad(cw, row_pad);
            let chroma_size = chroma_pitch
                .checked_mul(ch)
                .ok_or_else(|| size_overflow(width, height))?;
            for plane in planes.iter_mut().skip(1) {
                *plane = PlaneLayout {
                    width: cw,
                    height: ch,
                    pitch: chroma_pitch,
                    offset: total,
                    size: chroma_size,
                };
                total = total
                    .checked_add(chroma_size)
                    .ok_or_else(|| size_overflow(width, height))?;
            }
        }

        Ok(Self {
            width,
            height,
            pad: pad_to,
            subsampling,
            planes,
            total,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pad(&self) -> u32 {
        self.pad
    }

    pub fn subsampling(&self) -> Subsampling {
        self.subsampling
    }

    pub fn num_planes(&self) -> usize {
        if self.subsampling.is_gray() {
            1
        } else {
            3
        }
    }

    /// The planes present in this layout (one for grayscale, three otherwise).
    pub fn planes(&self) -> &[PlaneLayout] {
        &self.planes[..self.num_planes()]
    }

    pub fn plane(&self, index: usize) -> Option<&PlaneLayout> {
        self.planes().get(index)
    }

    pub fn total_size(&self) -> usize {
        self.total
    }
}

/// Total size in bytes of a planar YUV buffer.
pub fn yuv_buffer_size(
    width: u32,
    pad_to: u32,
    height: u32,
    subsampling: Subsampling,
) -> EngineResult<usize> {
    YuvLayout::new(width, pad_to, height, subsampling).map(|l| l.total_size())
}

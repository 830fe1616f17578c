// src/format.rs
//
// Pixel format registry, chroma subsampling levels and operation flags.
// All tables are compile-time constants: safe to read from any thread.

use crate::error::{Result, SessionError};
use bitflags::bitflags;
use std::fmt;

/// Number of recognized pixel formats.
pub const NUM_PIXEL_FORMATS: usize = 11;

/// Number of recognized subsampling levels.
pub const NUM_SUBSAMPLING: usize = 6;

const PIXEL_SIZE: [usize; NUM_PIXEL_FORMATS] = [3, 3, 4, 4, 4, 4, 1, 4, 4, 4, 4];
const RED_OFFSET: [i8; NUM_PIXEL_FORMATS] = [0, 2, 0, 2, 3, 1, -1, 0, 2, 3, 1];
const GREEN_OFFSET: [i8; NUM_PIXEL_FORMATS] = [1, 1, 1, 1, 2, 2, -1, 1, 1, 2, 2];
const BLUE_OFFSET: [i8; NUM_PIXEL_FORMATS] = [2, 0, 2, 0, 1, 3, -1, 2, 0, 1, 3];
const ALPHA_OFFSET: [i8; NUM_PIXEL_FORMATS] = [-1, -1, -1, -1, -1, -1, -1, 3, 3, 0, 0];

const PIXEL_FORMATS: [PixelFormat; NUM_PIXEL_FORMATS] = [
    PixelFormat::Rgb,
    PixelFormat::Bgr,
    PixelFormat::Rgbx,
    PixelFormat::Bgrx,
    PixelFormat::Xbgr,
    PixelFormat::Xrgb,
    PixelFormat::Gray,
    PixelFormat::Rgba,
    PixelFormat::Bgra,
    PixelFormat::Abgr,
    PixelFormat::Argb,
];

/// Layout of one pixel in a packed buffer.
///
/// Byte-addressed buffers use the `*_offset` accessors. Buffers of packed
/// 32-bit integers use the `*_shift` accessors; an integer pixel is the
/// little-endian reading of the four bytes, so a shift is the byte offset
/// times eight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PixelFormat {
    Rgb = 0,
    Bgr = 1,
    Rgbx = 2,
    Bgrx = 3,
    Xbgr = 4,
    Xrgb = 5,
    Gray = 6,
    Rgba = 7,
    Bgra = 8,
    Abgr = 9,
    Argb = 10,
}

fn offset(table: &[i8; NUM_PIXEL_FORMATS], format: PixelFormat) -> Option<usize> {
    let v = table[format as usize];
    (v >= 0).then_some(v as usize)
}

impl PixelFormat {
    /// All recognized formats in code order.
    pub fn all() -> &'static [PixelFormat] {
        &PIXEL_FORMATS
    }

    /// Look up a format by its numeric code.
    pub fn from_code(code: i32) -> Result<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| PIXEL_FORMATS.get(i).copied())
            .ok_or_else(|| SessionError::invalid_format(code))
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn pixel_size(self) -> usize {
        PIXEL_SIZE[self as usize]
    }

    pub fn red_offset(self) -> Option<usize> {
        offset(&RED_OFFSET, self)
    }

    pub fn green_offset(self) -> Option<usize> {
        offset(&GREEN_OFFSET, self)
    }

    pub fn blue_offset(self) -> Option<usize> {
        offset(&BLUE_OFFSET, self)
    }

    pub fn alpha_offset(self) -> Option<usize> {
        offset(&ALPHA_OFFSET, self)
    }

    pub fn red_shift(self) -> Option<u32> {
        self.red_offset().map(|o| o as u32 * 8)
    }

    pub fn green_shift(self) -> Option<u32> {
        self.green_offset().map(|o| o as u32 * 8)
    }

    pub fn blue_shift(self) -> Option<u32> {
        self.blue_offset().map(|o| o as u32 * 8)
    }

    pub fn has_alpha(self) -> bool {
        self.alpha_offset().is_some()
    }

    pub fn is_gray(self) -> bool {
        self == PixelFormat::Gray
    }

    /// Whether pixels of this format fit exactly into one `u32`.
    pub fn supports_int_pixels(self) -> bool {
        self.pixel_size() == 4
    }
}

impl TryFrom<i32> for PixelFormat {
    type Error = SessionError;

    fn try_from(code: i32) -> Result<Self> {
        Self::from_code(code)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgb => "RGB",
            PixelFormat::Bgr => "BGR",
            PixelFormat::Rgbx => "RGBX",
            PixelFormat::Bgrx => "BGRX",
            PixelFormat::Xbgr => "XBGR",
            PixelFormat::Xrgb => "XRGB",
            PixelFormat::Gray => "Grayscale",
            PixelFormat::Rgba => "RGBA",
            PixelFormat::Bgra => "BGRA",
            PixelFormat::Abgr => "ABGR",
            PixelFormat::Argb => "ARGB",
        };
        f.write_str(name)
    }
}

// Registry lookups by raw code. These are the checked entry points for
// callers holding integer format codes.

pub fn pixel_size(code: i32) -> Result<usize> {
    PixelFormat::from_code(code).map(PixelFormat::pixel_size)
}

pub fn red_shift(code: i32) -> Result<Option<u32>> {
    PixelFormat::from_code(code).map(PixelFormat::red_shift)
}

pub fn green_shift(code: i32) -> Result<Option<u32>> {
    PixelFormat::from_code(code).map(PixelFormat::green_shift)
}

pub fn blue_shift(code: i32) -> Result<Option<u32>> {
    PixelFormat::from_code(code).map(PixelFormat::blue_shift)
}

/// Chrominance subsampling level of a JPEG or planar YUV image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Subsampling {
    Samp444 = 0,
    Samp422 = 1,
    Samp420 = 2,
    Gray = 3,
    Samp440 = 4,
    Samp411 = 5,
}

const SUBSAMPLINGS: [Subsampling; NUM_SUBSAMPLING] = [
    Subsampling::Samp444,
    Subsampling::Samp422,
    Subsampling::Samp420,
    Subsampling::Gray,
    Subsampling::Samp440,
    Subsampling::Samp411,
];

const H_FACTOR: [u32; NUM_SUBSAMPLING] = [1, 2, 2, 1, 1, 4];
const V_FACTOR: [u32; NUM_SUBSAMPLING] = [1, 1, 2, 1, 2, 1];

impl Subsampling {
    pub fn all() -> &'static [Subsampling] {
        &SUBSAMPLINGS
    }

    pub fn from_code(code: i32) -> Result<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| SUBSAMPLINGS.get(i).copied())
            .ok_or_else(|| SessionError::invalid_subsampling(code))
    }

    /// Map luma sampling factors (relative to 1x1 chroma) to a level.
    pub fn from_luma_factors(h: u32, v: u32) -> Option<Self> {
        match (h, v) {
            (1, 1) => Some(Subsampling::Samp444),
            (2, 1) => Some(Subsampling::Samp422),
            (2, 2) => Some(Subsampling::Samp420),
            (1, 2) => Some(Subsampling::Samp440),
            (4, 1) => Some(Subsampling::Samp411),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Horizontal chroma subsampling factor.
    pub fn h_factor(self) -> u32 {
        H_FACTOR[self as usize]
    }

    /// Vertical chroma subsampling factor.
    pub fn v_factor(self) -> u32 {
        V_FACTOR[self as usize]
    }

    /// MCU block width in pixels.
    pub fn mcu_width(self) -> u32 {
        8 * self.h_factor()
    }

    /// MCU block height in pixels.
    pub fn mcu_height(self) -> u32 {
        8 * self.v_factor()
    }

    pub fn is_gray(self) -> bool {
        self == Subsampling::Gray
    }
}

impl TryFrom<i32> for Subsampling {
    type Error = SessionError;

    fn try_from(code: i32) -> Result<Self> {
        Self::from_code(code)
    }
}

impl fmt::Display for Subsampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Subsampling::Samp444 => "4:4:4",
            Subsampling::Samp422 => "4:2:2",
            Subsampling::Samp420 => "4:2:0",
            Subsampling::Gray => "GRAY",
            Subsampling::Samp440 => "4:4:0",
            Subsampling::Samp411 => "4:1:1",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Flags accepted by compress / decompress / transform operations.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u32 {
        /// Rows are stored bottom row first.
        const BOTTOM_UP = 2;
        /// Use fast, less accurate chroma upsampling when decoding.
        const FAST_UPSAMPLE = 256;
    }
}

// src/ops.rs
//
// Lossless-style transform descriptors.
// These are cheap to create and store - the work happens in CodecSession::transform().

use crate::error::{Result, SessionError};
use bitflags::bitflags;

/// Geometric operation applied by a transform.
///
/// Design principle: each descriptor is self-contained and stateless.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransformOp {
    #[default]
    None = 0,
    /// Mirror left-right
    HFlip = 1,
    /// Mirror top-bottom
    VFlip = 2,
    /// Mirror across the top-left to bottom-right diagonal
    Transpose = 3,
    /// Mirror across the top-right to bottom-left diagonal
    Transverse = 4,
    /// Rotate 90 degrees clockwise
    Rot90 = 5,
    Rot180 = 6,
    /// Rotate 270 degrees clockwise
    Rot270 = 7,
}

const TRANSFORM_OPS: [TransformOp; 8] = [
    TransformOp::None,
    TransformOp::HFlip,
    TransformOp::VFlip,
    TransformOp::Transpose,
    TransformOp::Transverse,
    TransformOp::Rot90,
    TransformOp::Rot180,
    TransformOp::Rot270,
];

/// Which edge of the source a transform relocates. A partial MCU on such an
/// edge cannot be moved losslessly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MovedEdges {
    Neither,
    Right,
    Bottom,
    Both,
}

impl TransformOp {
    pub fn all() -> &'static [TransformOp] {
        &TRANSFORM_OPS
    }

    pub fn from_code(code: i32) -> Result<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| TRANSFORM_OPS.get(i).copied())
            .ok_or_else(|| {
                SessionError::invalid_argument(
                    "transform op",
                    code.to_string(),
                    "expected a code in 0..=7",
                )
            })
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Whether output width and height are swapped relative to the source.
    pub fn is_transposing(self) -> bool {
        matches!(
            self,
            TransformOp::Transpose
                | TransformOp::Transverse
                | TransformOp::Rot90
                | TransformOp::Rot270
        )
    }

    pub fn moved_edges(self) -> MovedEdges {
        match self {
            TransformOp::None | TransformOp::Transpose => MovedEdges::Neither,
            TransformOp::HFlip | TransformOp::Rot270 => MovedEdges::Right,
            TransformOp::VFlip | TransformOp::Rot90 => MovedEdges::Bottom,
            TransformOp::Transverse | TransformOp::Rot180 => MovedEdges::Both,
        }
    }

    /// Output dimensions for a `width` x `height` source.
    pub fn output_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        if self.is_transposing() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Source coordinate feeding output pixel (`ox`, `oy`).
    ///
    /// Mirroring covers the first `flip_width` columns and `flip_height` rows
    /// of the source. Columns and rows past them keep their position, so a
    /// partial block on a moved edge stays where it was.
    #[inline]
    pub fn source_coord(self, ox: u32, oy: u32, flip_width: u32, flip_height: u32) -> (u32, u32) {
        let mirror = |v: u32, extent: u32| if v < extent { extent - 1 - v } else { v };
        match self {
            TransformOp::None => (ox, oy),
            TransformOp::HFlip => (mirror(ox, flip_width), oy),
            TransformOp::VFlip => (ox, mirror(oy, flip_height)),
            TransformOp::Transpose => (oy, ox),
            TransformOp::Transverse => (mirror(oy, flip_width), mirror(ox, flip_height)),
            TransformOp::Rot90 => (oy, mirror(ox, flip_height)),
            TransformOp::Rot180 => (mirror(ox, flip_width), mirror(oy, flip_height)),
            TransformOp::Rot270 => (mirror(oy, flip_width), ox),
        }
    }
}

/// A rectangle in output coordinates. A zero width or height extends the
/// region to the image edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

bitflags! {
    /// Per-descriptor transform options.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct TransformOptions: u32 {
        /// Fail instead of leaving partial edge MCUs untransformed.
        const PERFECT = 1;
        /// Drop partial MCUs on edges the operation moves.
        const TRIM = 2;
        /// Restrict output to the descriptor's region.
        const CROP = 4;
        /// Discard chrominance and emit a grayscale image.
        const GRAY = 8;
    }
}

/// One entry of a transform batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransformDescriptor {
    pub region: Option<Region>,
    pub op: TransformOp,
    pub options: TransformOptions,
}

impl TransformDescriptor {
    pub fn new(op: TransformOp) -> Self {
        Self {
            region: None,
            op,
            options: TransformOptions::empty(),
        }
    }

    /// Crop the output to `region`. Sets [`TransformOptions::CROP`].
    pub fn with_crop(mut self, region: Region) -> Self {
        self.region = Some(region);
        self.options |= TransformOptions::CROP;
        self
    }

    pub fn with_options(mut self, options: TransformOptions) -> Self {
        self.options |= options;
        self
    }

    /// The crop region in effect, if any.
    pub fn crop(&self) -> Option<Region> {
        if self.options.contains(TransformOptions::CROP) {
            self.region
        } else {
            None
        }
    }
}

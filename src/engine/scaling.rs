// src/engine/scaling.rs
//
// Scaled-decode negotiation.
// The native decoder can only produce a fixed set of output sizes (multiples
// of 1/8). Negotiation picks the least reduction that fits the request.

use crate::error::SessionError;
use std::fmt;

use super::common::EngineResult;

/// A reduced fraction `num / denom` applied to both image dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScalingFactor {
    num: u32,
    denom: u32,
}

/// Factors the decoder supports, least reduction first.
pub const SCALING_FACTORS: [ScalingFactor; 8] = [
    ScalingFactor { num: 1, denom: 1 },
    ScalingFactor { num: 7, denom: 8 },
    ScalingFactor { num: 3, denom: 4 },
    ScalingFactor { num: 5, denom: 8 },
    ScalingFactor { num: 1, denom: 2 },
    ScalingFactor { num: 3, denom: 8 },
    ScalingFactor { num: 1, denom: 4 },
    ScalingFactor { num: 1, denom: 8 },
];

const fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl ScalingFactor {
    pub const IDENTITY: ScalingFactor = ScalingFactor { num: 1, denom: 1 };

    /// Build a factor in lowest terms.
    pub fn new(num: u32, denom: u32) -> EngineResult<Self> {
        if num == 0 || denom == 0 {
            return Err(SessionError::invalid_argument(
                "scaling factor",
                format!("{num}/{denom}"),
                "numerator and denominator must be non-zero",
            ));
        }
        let g = gcd(num, denom);
        Ok(Self {
            num: num / g,
            denom: denom / g,
        })
    }

    /// `1/n` as a general factor.
    #[deprecated(note = "use ScalingFactor::new(1, n)")]
    pub fn one_over(n: u32) -> EngineResult<Self> {
        Self::new(1, n)
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn denom(&self) -> u32 {
        self.denom
    }

    /// `ceil(dimension * num / denom)`.
    pub fn scale(&self, dimension: u32) -> u32 {
        let scaled = (dimension as u64 * self.num as u64).div_ceil(self.denom as u64);
        scaled as u32
    }

    /// The factor expressed in eighths, as the native decoder takes it.
    /// `None` when the factor is not a multiple of 1/8.
    pub fn as_eighths(&self) -> Option<u8> {
        if 8 % self.denom != 0 {
            return None;
        }
        u8::try_from(self.num * (8 / self.denom)).ok()
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Whether the decoder can apply this factor.
    pub fn is_supported(&self) -> bool {
        SCALING_FACTORS.contains(self)
    }
}

impl fmt::Display for ScalingFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.denom)
    }
}

/// Result of negotiation: the chosen factor and the dimensions it produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScaledSize {
    pub factor: ScalingFactor,
    pub width: u32,
    pub height: u32,
}

/// Pick the first supported factor whose scaled dimensions fit inside the
/// desired box. A desired dimension of 0 means "the JPEG's own dimension".
pub fn negotiate(
    jpeg_width: u32,
    jpeg_height: u32,
    desired_width: u32,
    desired_height: u32,
) -> EngineResult<ScaledSize> {
    if jpeg_width == 0 || jpeg_height == 0 {
        return Err(SessionError::invalid_argument(
            "jpeg dimensions",
            format!("{jpeg_width}x{jpeg_height}"),
            "must be at least 1x1",
        ));
    }

    let want_w = if desired_width == 0 { jpeg_width } else { desired_width };
    let want_h = if desired_height == 0 { jpeg_height } else { desired_height };

    SCALING_FACTORS
        .iter()
        .map(|&factor| ScaledSize {
            factor,
            width: factor.scale(jpeg_width),
            height: factor.scale(jpeg_height),
        })
        .find(|s| s.width <= want_w && s.height <= want_h)
        .ok_or_else(|| {
            SessionError::invalid_argument(
                "desired dimensions",
                format!("{desired_width}x{desired_height}"),
                "cannot scale down to desired dimensions",
            )
        })
}

pub fn scaled_width(
    jpeg_width: u32,
    jpeg_height: u32,
    desired_width: u32,
    desired_height: u32,
) -> EngineResult<u32> {
    negotiate(jpeg_width, jpeg_height, desired_width, desired_height).map(|s| s.width)
}

pub fn scaled_height(
    jpeg_width: u32,
    jpeg_height: u32,
    desired_width: u32,
    desired_height: u32,
) -> EngineResult<u32> {
    negotiate(jpeg_width, jpeg_height, desired_width, desired_height).map(|s| s.height)
}

// src/engine.rs
//
// The core of tjsession. A session layer in front of the native JPEG codec:
// 1. Validates geometry, formats and session state
// 2. Sizes every caller-visible buffer before the native call
// 3. Delegates pixel work to a NativeCodec (libjpeg-turbo via mozjpeg)
//
// This file is a facade over the modules in engine/

// =============================================================================
// HARD LIMITS
// =============================================================================

/// Maximum image dimension (width or height) a JPEG frame header can declare.
pub const MAX_DIMENSION: u32 = 65_500;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod common;
mod decoder;
mod encoder;
mod image;
mod layout;
mod limits;
mod native;
mod runtime;
mod scaling;
mod session;
mod transform;
mod yuv;

pub use common::{run_with_panic_policy, EngineResult};
pub use self::image::{ImageDescriptor, PackedImage, PackedIntImage, SourceImage, YuvImage};
pub use layout::{
    max_compressed_size, max_compressed_size_for, packed_buffer_size, pad, yuv_buffer_size,
    PlaneLayout, YuvLayout,
};
pub use limits::{Limits, LimitsPolicy, LIMITS_ENV_VAR};
pub use native::{
    gather, scatter, JpegHeader, MozjpegCodec, NativeCodec, PixelView, PixelViewMut, Raster,
    TRANSFORM_QUALITY,
};
pub use runtime::{generation, init, is_initialized, live_sessions, teardown};
pub use scaling::{negotiate, scaled_height, scaled_width, ScaledSize, ScalingFactor, SCALING_FACTORS};
pub use session::{CodecSession, SessionState};
pub use transform::{apply_plan, plan, plan_all, TransformPlan};
pub use yuv::{raster_to_yuv, yuv_to_raster};

/// Scaling factors supported by the decoder, least reduction first.
pub fn scaling_factors() -> &'static [ScalingFactor] {
    &SCALING_FACTORS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{Flags, PixelFormat, Subsampling};

    #[test]
    fn test_scaling_factor_list() {
        let factors = scaling_factors();
        assert_eq!(factors.len(), 8);
        assert!(factors[0].is_identity());
        assert_eq!(factors[7], ScalingFactor::new(1, 8).unwrap());
    }

    #[test]
    fn test_packed_round_trip_through_session() {
        let mut data = vec![0u8; 16 * 16 * 3];
        for (i, px) in data.chunks_exact_mut(3).enumerate() {
            let v = if (i % 16) < 8 { 255 } else { 0 };
            px.copy_from_slice(&[v, v, v]);
        }
        let image =
            PackedImage::new(data, ImageDescriptor::new(16, 16, PixelFormat::Rgb)).unwrap();

        let mut session = CodecSession::open().unwrap();
        session.associate_source_image(image).unwrap();
        let jpeg = session
            .compress_with(Subsampling::Samp444, 100, Flags::empty())
            .unwrap();

        let header = session.decompress_header(&jpeg).unwrap();
        assert_eq!((header.width, header.height), (16, 16));
        let out = session
            .decompress(0, 0, PixelFormat::Gray, Flags::empty())
            .unwrap();
        assert!(out.pixel(0, 0).unwrap()[0] >= 250);
        assert!(out.pixel(15, 15).unwrap()[0] <= 5);
        session.close();
    }
}

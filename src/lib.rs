// lib.rs
//
// tjsession: safe codec sessions in front of libjpeg-turbo
//
// Design goals:
// - Exact buffer and planar-layout arithmetic, independent of the codec
// - Scaled decoding limited to sizes the decoder can actually produce
// - Every operation validated and reported with a typed error
// - Native handles owned by sessions and released deterministically

pub mod engine;
pub mod error;
pub mod format;
pub mod ops;

pub use engine::{
    init, max_compressed_size, max_compressed_size_for, negotiate, packed_buffer_size, teardown,
    yuv_buffer_size, CodecSession, ImageDescriptor, JpegHeader, Limits, LimitsPolicy,
    MozjpegCodec, NativeCodec, PackedImage, PackedIntImage, ScaledSize, ScalingFactor,
    SessionState, SourceImage, YuvImage, YuvLayout, MAX_DIMENSION,
};
pub use error::{ErrorCategory, ErrorKind, Result, SessionError};
pub use format::{Flags, PixelFormat, Subsampling};
pub use ops::{Region, TransformDescriptor, TransformOp, TransformOptions};

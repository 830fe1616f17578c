// src/error.rs
//
// Unified error handling for tjsession
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy (ErrorKind, what a programmatic caller matches on):
// - InvalidArgument: out-of-range enum, zero dimension, bad padding, bad pitch
// - PreconditionError: operation attempted before required configuration
// - SessionClosed: operation on a released session
// - BufferTooSmall: caller-supplied destination buffer insufficient
// - CorruptHeader: malformed compressed stream
// - UnsupportedFormat: recognized value that is not valid in this context
// - TransformError: batch transform failure, carries the failing index
// - ResourceError: native allocation / codec failure

use std::borrow::Cow;
use thiserror::Error;

/// Coarse grouping used to decide whether a caller can fix the problem.
///
/// - UserError: Invalid input, recoverable by user
/// - CodecError: Compressed stream / format issues
/// - ResourceLimit: Memory/dimension limits
/// - InternalBug: Library bugs (should not happen)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    UserError,
    CodecError,
    ResourceLimit,
    InternalBug,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }
}

/// The error kinds every public operation reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    PreconditionError,
    SessionClosed,
    BufferTooSmall,
    CorruptHeader,
    UnsupportedFormat,
    TransformError,
    ResourceError,
}

/// tjsession error types
///
/// Every variant names the argument or precondition that was violated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    // Argument Errors
    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    #[error("Invalid pixel format code: {code}")]
    InvalidFormat { code: i32 },

    #[error("Invalid subsampling code: {code}")]
    InvalidSubsampling { code: i32 },

    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    #[error("Input of {len} bytes exceeds limit of {max} bytes")]
    InputTooLarge { len: u64, max: u64 },

    #[error("Unknown limits policy: '{policy}'. Expected disabled, strict or lenient")]
    InvalidLimitsPolicy { policy: Cow<'static, str> },

    // State Errors
    #[error("Precondition failed: {message}")]
    Precondition { message: Cow<'static, str> },

    #[error("Session has been closed")]
    SessionClosed,

    // Buffer Errors
    #[error("Destination buffer too small: {actual} bytes provided, {required} required")]
    BufferTooSmall { required: usize, actual: usize },

    // Codec Errors
    #[error("Corrupt JPEG data: {message}")]
    CorruptData { message: Cow<'static, str> },

    #[error("Unsupported format: {format} ({context})")]
    UnsupportedFormat {
        format: Cow<'static, str>,
        context: Cow<'static, str>,
    },

    #[error("Native codec failed during {operation}: {message}")]
    CodecFailed {
        operation: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Transform Errors
    #[error("Transform {index} failed: {message}")]
    TransformFailed {
        index: usize,
        message: Cow<'static, str>,
    },

    #[error(
        "Transform {index}: crop origin ({x}, {y}) is not aligned to the {mcu_width}x{mcu_height} iMCU grid"
    )]
    InvalidCropAlignment {
        index: usize,
        x: u32,
        y: u32,
        mcu_width: u32,
        mcu_height: u32,
    },

    // Resource Errors
    #[error("Native resource error: {message}")]
    Resource { message: Cow<'static, str> },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

// Constructor Helpers
impl SessionError {
    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_format(code: i32) -> Self {
        Self::InvalidFormat { code }
    }

    pub fn invalid_subsampling(code: i32) -> Self {
        Self::InvalidSubsampling { code }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn input_too_large(len: u64, max: u64) -> Self {
        Self::InputTooLarge { len, max }
    }

    pub fn invalid_limits_policy(policy: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidLimitsPolicy {
            policy: policy.into(),
        }
    }

    pub fn precondition(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    pub fn session_closed() -> Self {
        Self::SessionClosed
    }

    pub fn buffer_too_small(required: usize, actual: usize) -> Self {
        Self::BufferTooSmall { required, actual }
    }

    pub fn corrupt_data(message: impl Into<Cow<'static, str>>) -> Self {
        Self::CorruptData {
            message: message.into(),
        }
    }

    pub fn unsupported_format(
        format: impl Into<Cow<'static, str>>,
        context: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
            context: context.into(),
        }
    }

    pub fn codec_failed(
        operation: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::CodecFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn transform_failed(index: usize, message: impl Into<Cow<'static, str>>) -> Self {
        Self::TransformFailed {
            index,
            message: message.into(),
        }
    }

    pub fn invalid_crop_alignment(
        index: usize,
        x: u32,
        y: u32,
        mcu_width: u32,
        mcu_height: u32,
    ) -> Self {
        Self::InvalidCropAlignment {
            index,
            x,
            y,
            mcu_width,
            mcu_height,
        }
    }

    pub fn resource(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Resource {
            message: message.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. }
            | Self::InvalidFormat { .. }
            | Self::InvalidSubsampling { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::InputTooLarge { .. }
            | Self::InvalidLimitsPolicy { .. } => ErrorKind::InvalidArgument,

            Self::Precondition { .. } => ErrorKind::PreconditionError,
            Self::SessionClosed => ErrorKind::SessionClosed,
            Self::BufferTooSmall { .. } => ErrorKind::BufferTooSmall,
            Self::CorruptData { .. } => ErrorKind::CorruptHeader,
            Self::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,

            Self::TransformFailed { .. } | Self::InvalidCropAlignment { .. } => {
                ErrorKind::TransformError
            }

            // A caught panic inside the codec is still a native-layer failure.
            Self::CodecFailed { .. } | Self::Resource { .. } | Self::InternalPanic { .. } => {
                ErrorKind::ResourceError
            }
        }
    }

    /// Index of the failing descriptor for batch transform errors.
    pub fn transform_index(&self) -> Option<usize> {
        match self {
            Self::TransformFailed { index, .. } | Self::InvalidCropAlignment { index, .. } => {
                Some(*index)
            }
            _ => None,
        }
    }

    /// Check if this error is recoverable (caller can fix it)
    ///
    /// Consistent with category():
    /// - UserError and ResourceLimit errors are recoverable
    /// - CodecError and InternalBug errors are not
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument { .. }
            | Self::InvalidFormat { .. }
            | Self::InvalidSubsampling { .. }
            | Self::InvalidLimitsPolicy { .. }
            | Self::Precondition { .. }
            | Self::SessionClosed
            | Self::BufferTooSmall { .. }
            | Self::InvalidCropAlignment { .. } => ErrorCategory::UserError,

            Self::CorruptData { .. }
            | Self::UnsupportedFormat { .. }
            | Self::CodecFailed { .. }
            | Self::TransformFailed { .. } => ErrorCategory::CodecError,

            Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::InputTooLarge { .. }
            | Self::Resource { .. } => ErrorCategory::ResourceLimit,

            Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, SessionError>;

// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides the engine result alias and the panic policy for native calls.

use crate::error::SessionError;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

/// Result type used by every engine module.
pub type EngineResult<T> = std::result::Result<T, SessionError>;

/// Run a native codec call, converting an unwinding failure into a typed error.
///
/// libjpeg reports fatal errors through its error manager, which the
/// `mozjpeg` crate turns into a panic. Those must never cross the session
/// boundary.
pub fn run_with_panic_policy<T, F>(operation: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(
                target: "tjsession::native",
                operation,
                message = %message,
                "native call panicked"
            );
            Err(SessionError::internal_panic(format!("{operation}: {message}")))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Re-tag a caught panic as corrupt input. Used where libjpeg aborts only
/// because the stream itself is malformed (header parsing, entropy decode).
pub fn panic_as_corrupt(err: SessionError) -> SessionError {
    match err {
        SessionError::InternalPanic { message } => SessionError::CorruptData { message },
        other => other,
    }
}

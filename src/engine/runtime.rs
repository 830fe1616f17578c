// src/engine/runtime.rs
//
// Process-wide runtime state.
//
// The runtime must be initialized before the first session opens and may
// only be torn down while no session is live. Opening a session initializes
// it on demand.

use crate::error::SessionError;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

use super::common::EngineResult;

#[derive(Debug, Default)]
struct RuntimeState {
    initialized: bool,
    live_sessions: usize,
    /// Bumped on every successful init; lets tests observe re-initialization.
    generation: u64,
}

static RUNTIME: Lazy<Mutex<RuntimeState>> = Lazy::new(|| Mutex::new(RuntimeState::default()));

fn init_locked(state: &mut RuntimeState) {
    if !state.initialized {
        state.initialized = true;
        state.generation += 1;
        debug!(
            target: "tjsession::runtime",
            generation = state.generation,
            "runtime initialized"
        );
    }
}

/// Initialize the runtime. Idempotent.
pub fn init() -> EngineResult<()> {
    let mut state = RUNTIME.lock();
    init_locked(&mut state);
    Ok(())
}

/// Tear the runtime down. Fails while any session is open.
pub fn teardown() -> EngineResult<()> {
    let mut state = RUNTIME.lock();
    if state.live_sessions > 0 {
        return Err(SessionError::precondition(format!(
            "cannot tear down runtime with {} live session(s)",
            state.live_sessions
        )));
    }
    if state.initialized {
        state.initialized = false;
        debug!(target: "tjsession::runtime", "runtime torn down");
    }
    Ok(())
}

pub fn is_initialized() -> bool {
    RUNTIME.lock().initialized
}

pub fn live_sessions() -> usize {
    RUNTIME.lock().live_sessions
}

pub fn generation() -> u64 {
    RUNTIME.lock().generation
}

/// Account for a newly opened session, initializing on demand.
pub(crate) fn register_session() {
    let mut state = RUNTIME.lock();
    init_locked(&mut state);
    state.live_sessions += 1;
}

/// Account for a closed session.
pub(crate) fn release_session() {
    let mut state = RUNTIME.lock();
    state.live_sessions = state.live_sessions.saturating_sub(1);
}

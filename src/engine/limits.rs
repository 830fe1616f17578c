// src/engine/limits.rs
//
// Resource limits applied to compressed input and image dimensions.

use crate::error::SessionError;
use std::str::FromStr;

use super::common::EngineResult;

const STRICT_MAX_PIXELS: u64 = 40_000_000; // ~8K x 5K
const LENIENT_MAX_PIXELS: u64 = 75_000_000;
const STRICT_MAX_BYTES: u64 = 32 * 1024 * 1024; // 32MB compressed input cap
const LENIENT_MAX_BYTES: u64 = 48 * 1024 * 1024; // 48MB compressed input cap

/// Environment variable read by [`Limits::from_env`].
pub const LIMITS_ENV_VAR: &str = "TJSESSION_LIMITS";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitsPolicy {
    Disabled,
    Strict,
    Lenient,
    Custom,
}

impl FromStr for LimitsPolicy {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "disabled" | "off" => Ok(Self::Disabled),
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            other => Err(SessionError::invalid_limits_policy(other.to_string())),
        }
    }
}

/// Caps enforced by a session before any native call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    pub enabled: bool,
    pub policy: LimitsPolicy,
    pub max_pixels: Option<u64>,
    pub max_bytes: Option<u64>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            enabled: false,
            policy: LimitsPolicy::Disabled,
            max_pixels: None,
            max_bytes: None,
        }
    }
}

impl Limits {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self {
            enabled: true,
            policy: LimitsPolicy::Strict,
            max_pixels: Some(STRICT_MAX_PIXELS),
            max_bytes: Some(STRICT_MAX_BYTES),
        }
    }

    pub fn lenient() -> Self {
        Self {
            enabled: true,
            policy: LimitsPolicy::Lenient,
            max_pixels: Some(LENIENT_MAX_PIXELS),
            max_bytes: Some(LENIENT_MAX_BYTES),
        }
    }

    /// Enabled, with no caps until set through the builders.
    pub fn custom() -> Self {
        Self {
            enabled: true,
            policy: LimitsPolicy::Custom,
            max_pixels: None,
            max_bytes: None,
        }
    }

    pub fn apply_policy(policy: LimitsPolicy) -> Self {
        match policy {
            LimitsPolicy::Disabled => Self::disabled(),
            LimitsPolicy::Strict => Self::strict(),
            LimitsPolicy::Lenient => Self::lenient(),
            LimitsPolicy::Custom => Self::custom(),
        }
    }

    /// Limits named by `TJSESSION_LIMITS`, disabled when unset.
    pub fn from_env() -> EngineResult<Self> {
        match std::env::var(LIMITS_ENV_VAR) {
            Ok(value) => value.parse::<LimitsPolicy>().map(Self::apply_policy),
            Err(_) => Ok(Self::disabled()),
        }
    }

    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = Some(max_pixels);
        self.mark_custom();
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self.mark_custom();
        self
    }

    fn mark_custom(&mut self) {
        self.enabled = true;
        self.policy = LimitsPolicy::Custom;
    }

    pub fn enforce_source_len(&self, len: usize) -> EngineResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if let Some(limit) = self.max_bytes {
            let len_u64 = len as u64;
            if len_u64 > limit {
                return Err(SessionError::input_too_large(len_u64, limit));
            }
        }
        Ok(())
    }

    pub fn enforce_pixels(&self, width: u32, height: u32) -> EngineResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if let Some(limit) = self.max_pixels {
            let pixels = width as u64 * height as u64;
            if pixels > limit {
                return Err(SessionError::pixel_count_exceeds_limit(pixels, limit));
            }
        }
        Ok(())
    }
}

//! Crate-wide error type.

use core::fmt;

/// Failure outcome of any fallible engine operation or HAL call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineError {
    /// The embedder's HAL returned a failure (storage, BT stack, radio, ...).
    Hal,
    /// Peer-supplied bytes failed a structural check (length, magic byte).
    InvalidInput,
    /// The requested behavior is disabled by a build-time feature flag.
    Unsupported,
    /// A deadline for the current pairing step was exceeded.
    Timeout,
    /// An HMAC or SHA-prefix authentication check failed.
    Unauthenticated,
    /// Structurally valid but semantically rejected (e.g. clearing a key that isn't set).
    InvalidValue,
    /// An operation that requires user consent was attempted without it.
    NoUserConsent,
}

impl EngineError {
    /// Status byte used in SPOT Write Beacon Action NACK responses.
    ///
    /// Only the three SPOT-specific kinds have a defined code; anything else
    /// collapses to the generic `kInvalidValue` byte.
    pub fn spot_status_byte(self) -> u8 {
        match self {
            EngineError::Unauthenticated => 0x80,
            EngineError::NoUserConsent => 0x82,
            _ => 0x81,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineError::Hal => "hal failure",
            EngineError::InvalidInput => "invalid input",
            EngineError::Unsupported => "unsupported",
            EngineError::Timeout => "timeout",
            EngineError::Unauthenticated => "unauthenticated",
            EngineError::InvalidValue => "invalid value",
            EngineError::NoUserConsent => "no user consent",
        };
        f.write_str(s)
    }
}

pub type Result<T> = core::result::Result<T, EngineError>;

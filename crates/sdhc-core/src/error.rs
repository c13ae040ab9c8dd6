//! Error types for sdhc-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No hardware response within the timeout bound
    Timeout,
    /// Request is outside the controller's or card's advertised capability
    Unsupported,
    /// Hardware-reported bus/electrical error, or a malformed response
    IoFailure,
    /// No candidate operating point was accepted during negotiation
    NegotiationFailed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "operation timed out"),
            Self::Unsupported => write!(f, "request not supported by host controller"),
            Self::IoFailure => write!(f, "bus I/O failure"),
            Self::NegotiationFailed => write!(f, "no operating point candidate accepted"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

//! Error type shared by every exploration engine.
//!
//! Construction-time problems (bad configuration, unsupported acceptance
//! shape, mismatched atomic propositions) are fatal and never retried.
//! Insertion races and duplicate reduced-successor computations are not
//! errors at all: they are absorbed by the shared structures.

use crate::automaton::AcceptanceShape;
use std::io::Error as IoError;

/// Error type for model-checking runs
#[derive(Debug)]
pub enum McError {
    /// The requested emptiness strategy cannot handle this acceptance condition
    UnsupportedAcceptance {
        strategy: &'static str,
        shape: AcceptanceShape,
    },
    /// Rejected configuration value
    InvalidConfig(String),
    /// An emptiness algorithm was requested without a property automaton
    MissingProperty,
    /// System and property disagree on atomic propositions
    ApMismatch {
        system: Vec<String>,
        property: Vec<String>,
    },
    /// An allocation was refused (arena exhausted, window too large)
    MemoryExhausted { requested: usize },
    /// A rank observed a collective abort
    Aborted { rank: usize, code: i32 },
    /// The per-state invariant hook rejected a state
    InvariantViolated { rank: usize, state: String },
    /// Configuration file could not be parsed
    Config(String),
    /// I/O error
    Io(IoError),
}

impl std::fmt::Display for McError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            McError::UnsupportedAcceptance { strategy, shape } => write!(
                f,
                "Unsupported acceptance condition for {}: {}",
                strategy, shape
            ),
            McError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            McError::MissingProperty => {
                write!(f, "Emptiness check requested without a property automaton")
            }
            McError::ApMismatch { system, property } => write!(
                f,
                "Atomic propositions differ: system {:?} vs property {:?}",
                system, property
            ),
            McError::MemoryExhausted { requested } => {
                write!(f, "Memory exhausted (requested {} slots)", requested)
            }
            McError::Aborted { rank, code } => {
                write!(f, "Rank {} aborted with status {}", rank, code)
            }
            McError::InvariantViolated { rank, state } => {
                write!(f, "Invariant violated on rank {} by state {}", rank, state)
            }
            McError::Config(msg) => write!(f, "Configuration error: {}", msg),
            McError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for McError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            McError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IoError> for McError {
    fn from(e: IoError) -> Self {
        McError::Io(e)
    }
}

impl From<toml::de::Error> for McError {
    fn from(e: toml::de::Error) -> Self {
        McError::Config(e.to_string())
    }
}

pub type McResult<T> = Result<T, McError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_unsupported_acceptance() {
        let err = McError::UnsupportedAcceptance {
            strategy: "scc-emptiness",
            shape: AcceptanceShape::Rabin { pairs: 2 },
        };
        let msg = err.to_string();
        assert!(msg.contains("scc-emptiness"));
        assert!(msg.contains("Rabin"));
    }

    #[test]
    fn test_io_error_has_source() {
        use std::error::Error;
        let err = McError::from(IoError::new(std::io::ErrorKind::Other, "boom"));
        assert!(err.source().is_some());
        assert!(McError::MissingProperty.source().is_none());
    }
}

//! Error types for mmpipe.

use crate::component::{ComponentId, ComponentState};
use thiserror::Error;

/// Result type alias using mmpipe's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for component, queue and exchange operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A parameter, port index or buffer did not match what the component expects.
    #[error("bad parameter: {0}")]
    BadParameter(String),

    /// The requested format, parameter or container is not supported.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A pool could not grow (node cap reached or allocation failed).
    ///
    /// Recoverable: the caller backs off and retries.
    #[error("insufficient resources: {0}")]
    InsufficientResources(String),

    /// The operation is illegal in the component's current state.
    #[error("operation not allowed in state {state}")]
    InvalidState {
        /// State the component was in when the call was refused.
        state: ComponentState,
    },

    /// The requested state transition is not in the transition table.
    #[error("incorrect state transition: {from} -> {to}")]
    IncorrectStateTransition {
        /// Current state.
        from: ComponentState,
        /// Requested state.
        to: ComponentState,
    },

    /// The component is already in the requested state.
    #[error("component is already in state {0}")]
    SameState(ComponentState),

    /// Two ports cannot be tunneled (direction or domain mismatch).
    #[error("ports not compatible: {0}")]
    PortNotCompatible(String),

    /// The container sink ran out of space. Recoverable, data is retained.
    #[error("out of space")]
    OutOfSpace,

    /// A bound peer component has been dropped.
    #[error("peer component {0} is gone")]
    PeerGone(ComponentId),

    /// An opaque codec or muxer capability failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Copyable classification of an [`Error`], carried in component events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::BadParameter`].
    BadParameter,
    /// See [`Error::Unsupported`].
    Unsupported,
    /// See [`Error::InsufficientResources`].
    InsufficientResources,
    /// See [`Error::InvalidState`].
    InvalidState,
    /// See [`Error::IncorrectStateTransition`].
    IncorrectStateTransition,
    /// See [`Error::SameState`].
    SameState,
    /// See [`Error::PortNotCompatible`].
    PortNotCompatible,
    /// See [`Error::OutOfSpace`].
    OutOfSpace,
    /// See [`Error::PeerGone`].
    PeerGone,
    /// See [`Error::Codec`].
    Codec,
    /// See [`Error::Io`].
    Io,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadParameter(_) => ErrorKind::BadParameter,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::InsufficientResources(_) => ErrorKind::InsufficientResources,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::IncorrectStateTransition { .. } => ErrorKind::IncorrectStateTransition,
            Self::SameState(_) => ErrorKind::SameState,
            Self::PortNotCompatible(_) => ErrorKind::PortNotCompatible,
            Self::OutOfSpace => ErrorKind::OutOfSpace,
            Self::PeerGone(_) => ErrorKind::PeerGone,
            Self::Codec(_) => ErrorKind::Codec,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the caller is expected to back off and retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InsufficientResources(_) | Self::OutOfSpace)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BadParameter => "bad-parameter",
            Self::Unsupported => "unsupported",
            Self::InsufficientResources => "insufficient-resources",
            Self::InvalidState => "invalid-state",
            Self::IncorrectStateTransition => "incorrect-state-transition",
            Self::SameState => "same-state",
            Self::PortNotCompatible => "port-not-compatible",
            Self::OutOfSpace => "out-of-space",
            Self::PeerGone => "peer-gone",
            Self::Codec => "codec",
            Self::Io => "io",
        };
        f.write_str(s)
    }
}

//! Service-level error taxonomy.
//!
//! - `Config`: fatal, aborts startup
//! - `Transport`: listener failures, fatal for the affected front end
//! - `Framing`: malformed SPOE peer input, fatal for that connection only
//!
//! Token verification failures never surface here; they become rejection
//! outcomes (see [`crate::token::VerificationError`]).

use std::fmt::Display;

use thiserror::Error;

use crate::config::ConfigError;
use crate::spoe::FrameError;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GatekeeperError {
    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Listener could not be bound or failed while accepting
    #[error("transport error on {addr}: {source}")]
    Transport {
        /// Address the listener was bound to, as configured
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Peer sent something the SPOE codec could not decode
    #[error("protocol framing error: {0}")]
    Framing(#[from] FrameError),

    /// Connection-level I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Error codes for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Config,
    Transport,
    Framing,
    Io,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "CONFIG_ERROR",
            Self::Transport => "TRANSPORT_ERROR",
            Self::Framing => "PROTOCOL_FRAMING_ERROR",
            Self::Io => "IO_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl GatekeeperError {
    pub fn transport(addr: impl Display, source: std::io::Error) -> Self {
        Self::Transport {
            addr: addr.to_string(),
            source,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Config(_) => ErrorCode::Config,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Framing(_) => ErrorCode::Framing,
            Self::Io(_) => ErrorCode::Io,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether the error should stop the process rather than one connection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Transport { .. })
    }
}

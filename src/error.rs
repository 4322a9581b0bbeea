//! # Error Handling
//!
//! This module defines the centralized error type for `metacloud-export`.
//! It uses `thiserror` to build a single `Error` enum whose variants follow
//! the failure classes of a synchronization run:
//!
//! - **Policy violations**: a group or user the run is not allowed to touch.
//! - **Validation failures**: a malformed or incomplete source record.
//! - **Resolution failures**: a group name, group ID or login that cannot be
//!   mapped to a platform object.
//! - **Provider errors**: the target platform rejected a call. Some of these
//!   are tolerated by the caller (see [`ProviderError::is_already_member`] and
//!   friends), everything else is fatal.
//!
//! Ambient failures (I/O, feed parsing, configuration, transport) get their
//! own variants. Every error aborts the run; there is no retry.

use std::fmt;

use thiserror::Error;

/// Main error type for metacloud-export operations
#[derive(Error, Debug)]
pub enum Error {
    /// A group or user is outside of what the run may manage.
    ///
    /// Raised before any mutation when the feed references a protected or
    /// unknown group, or when a removal targets a protected account.
    #[error("Policy violation: {message}")]
    PolicyViolation { message: String },

    /// A source record failed validation.
    #[error("Invalid record for {login:?}: {message}")]
    Validation { login: String, message: String },

    /// A name or ID could not be mapped to a platform object.
    #[error("Resolution failure: {message}")]
    Resolution { message: String },

    /// The target platform rejected a call.
    #[error("Provider error in {call}: {source}")]
    Provider {
        call: String,
        #[source]
        source: ProviderError,
    },

    /// The target platform could not be reached.
    #[error("Transport error for {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    /// The target platform answered with something that is not a valid
    /// response.
    #[error("Malformed platform response: {message}")]
    Protocol { message: String },

    /// The identity feed could not be decoded.
    #[error("Feed parsing error: {0}")]
    FeedParse(#[from] serde_json::Error),

    /// Invalid or incomplete configuration.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// Wraps a provider error with the name of the call that produced it.
    pub fn provider(call: impl Into<String>, source: ProviderError) -> Self {
        Error::Provider {
            call: call.into(),
            source,
        }
    }

    pub fn policy(message: impl Into<String>) -> Self {
        Error::PolicyViolation {
            message: message.into(),
        }
    }

    pub fn validation(login: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            login: login.into(),
            message: message.into(),
        }
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        Error::Resolution {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
        }
    }

    /// Returns the provider error carried by this error, if any.
    pub fn as_provider(&self) -> Option<&ProviderError> {
        match self {
            Error::Provider { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Error classes reported by the target platform.
///
/// The numeric codes are the ones OpenNebula puts in the third slot of a
/// failed XML-RPC response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Authentication,
    Authorization,
    NoExists,
    Action,
    XmlRpcApi,
    Internal,
    Allocate,
    Locked,
    Unknown(i64),
}

impl ProviderErrorKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            0x0100 => ProviderErrorKind::Authentication,
            0x0200 => ProviderErrorKind::Authorization,
            0x0400 => ProviderErrorKind::NoExists,
            0x0800 => ProviderErrorKind::Action,
            0x1000 => ProviderErrorKind::XmlRpcApi,
            0x2000 => ProviderErrorKind::Internal,
            0x4000 => ProviderErrorKind::Allocate,
            0x8000 => ProviderErrorKind::Locked,
            other => ProviderErrorKind::Unknown(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            ProviderErrorKind::Authentication => 0x0100,
            ProviderErrorKind::Authorization => 0x0200,
            ProviderErrorKind::NoExists => 0x0400,
            ProviderErrorKind::Action => 0x0800,
            ProviderErrorKind::XmlRpcApi => 0x1000,
            ProviderErrorKind::Internal => 0x2000,
            ProviderErrorKind::Allocate => 0x4000,
            ProviderErrorKind::Locked => 0x8000,
            ProviderErrorKind::Unknown(code) => code,
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderErrorKind::Authentication => "authentication",
            ProviderErrorKind::Authorization => "authorization",
            ProviderErrorKind::NoExists => "no such object",
            ProviderErrorKind::Action => "action",
            ProviderErrorKind::XmlRpcApi => "xml-rpc api",
            ProviderErrorKind::Internal => "internal",
            ProviderErrorKind::Allocate => "allocate",
            ProviderErrorKind::Locked => "locked",
            ProviderErrorKind::Unknown(code) => return write!(f, "unknown (0x{:x})", code),
        };
        f.write_str(name)
    }
}

/// A structured rejection from the target platform.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[{kind}] {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The user is already in the group it was being added to.
    ///
    /// OpenNebula reports this as an action error; the message check keeps
    /// other action failures fatal.
    pub fn is_already_member(&self) -> bool {
        match self.kind {
            ProviderErrorKind::Action => {
                let message = self.message.to_ascii_lowercase();
                message.contains("already in") || message.contains("already a member")
            }
            _ => false,
        }
    }

    /// The user is not in the group it was being removed from.
    pub fn is_not_member(&self) -> bool {
        match self.kind {
            ProviderErrorKind::Action => {
                let message = self.message.to_ascii_lowercase();
                message.contains("not part of")
                    || message.contains("not a member")
                    || message.contains("not in group")
            }
            _ => false,
        }
    }

    /// The object is already gone or already stopped.
    pub fn is_already_gone(&self) -> bool {
        match self.kind {
            ProviderErrorKind::NoExists => true,
            ProviderErrorKind::Action => {
                let message = self.message.to_ascii_lowercase();
                message.contains("wrong state") && message.contains("done")
            }
            _ => false,
        }
    }
}

//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation. Each
//! variant maps to the failure code a host sees on the command's result.

use thiserror::Error;

use crate::platform::ReasonCode;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the bridge.
#[derive(Error, Debug)]
pub enum Error {
    /// No handler registered under the dispatched name.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The platform reported a numeric failure reason.
    #[error("platform action failed with reason {0}")]
    PlatformActionFailed(ReasonCode),

    /// A handler raised an unexpected fault.
    #[error("handler for {command} failed: {message}")]
    HandlerThrew { command: String, message: String },

    /// Publish/subscribe against a channel that was never registered.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// A permission request arrived while another one was still pending.
    #[error("a permission request is already pending")]
    PermissionRequestOverlap,

    /// The pending permission request was dropped by a detach.
    #[error("permission request abandoned: {0}")]
    PermissionRequestAbandoned(String),

    /// No host is attached that could show a permission prompt.
    #[error("no permission host attached")]
    NoPermissionHost,

    /// The bridge was detached from its host.
    #[error("bridge detached")]
    Detached,

    /// Bad arguments or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Base64 argument decoding errors.
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl Error {
    /// Failure code reported to the host for this error.
    pub fn failure_code(&self) -> String {
        match self {
            Error::UnknownCommand(_) => "not_implemented".to_string(),
            Error::PlatformActionFailed(code) => code.to_string(),
            Error::HandlerThrew { command, .. } => command.clone(),
            Error::UnknownChannel(_) => "unknown_channel".to_string(),
            Error::PermissionRequestOverlap => "permission_request_overlap".to_string(),
            Error::PermissionRequestAbandoned(_) => "permission_request_abandoned".to_string(),
            Error::NoPermissionHost => "no_permission_host".to_string(),
            Error::Detached => "detached".to_string(),
            Error::Validation(_) => "invalid_argument".to_string(),
            Error::Serialization(_) | Error::Base64(_) => "invalid_payload".to_string(),
        }
    }

    /// Failure message reported to the host. Platform failures carry only
    /// their reason code.
    pub fn failure_message(&self) -> Option<String> {
        match self {
            Error::PlatformActionFailed(_) => None,
            Error::HandlerThrew { message, .. } => Some(message.clone()),
            other => Some(other.to_string()),
        }
    }
}

// Convenience constructors
impl Error {
    pub fn unknown_command(name: impl Into<String>) -> Self {
        Self::UnknownCommand(name.into())
    }

    pub fn handler_threw(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerThrew {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn unknown_channel(name: impl Into<String>) -> Self {
        Self::UnknownChannel(name.into())
    }

    pub fn abandoned(msg: impl Into<String>) -> Self {
        Self::PermissionRequestAbandoned(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<ReasonCode> for Error {
    fn from(code: ReasonCode) -> Self {
        Self::PlatformActionFailed(code)
    }
}

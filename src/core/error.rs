//! Error type shared by the layout, control and stream clients.

use std::fmt::Display;

use thiserror::Error;

/// Failures talking to the simulation server.
///
/// Errors are plain values (endpoint + message) so they can travel through the
/// session event channel and be published to presenters without sharing the
/// underlying transport error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Endpoint unreachable, connection refused, timed out, or (for the layout
    /// endpoint) an unusable response body.
    #[error("transport error at {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    /// Endpoint reachable but the response violates the expected contract.
    #[error("protocol error at {endpoint}: {message}")]
    Protocol { endpoint: String, message: String },

    /// A single stream frame could not be parsed.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn transport(endpoint: &str, message: impl Display) -> Self {
        Self::Transport {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }

    pub fn protocol(endpoint: &str, message: impl Display) -> Self {
        Self::Protocol {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

//! Start/stop commands and their acknowledgements.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAck {
    Started,
    /// The server was already running; handled exactly like `Started`.
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAck {
    Stopped,
}

/// Remote control of the simulation. Implementations never retry; a failed
/// call ends the current start/stop attempt.
pub trait ControlApi: Send + Sync + 'static {
    fn request_start(&self) -> BoxFuture<'_, ClientResult<StartAck>>;
    fn request_stop(&self) -> BoxFuture<'_, ClientResult<StopAck>>;
}

impl<T: ControlApi + ?Sized> ControlApi for Arc<T> {
    fn request_start(&self) -> BoxFuture<'_, ClientResult<StartAck>> {
        (**self).request_start()
    }

    fn request_stop(&self) -> BoxFuture<'_, ClientResult<StopAck>> {
        (**self).request_stop()
    }
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
}

fn status_of(endpoint: &str, body: &str) -> ClientResult<String> {
    serde_json::from_str::<StatusBody>(body)
        .map(|b| b.status)
        .map_err(|e| ClientError::protocol(endpoint, format!("unexpected body: {e}")))
}

/// Interprets the body of a start acknowledgement.
pub fn parse_start_ack(endpoint: &str, body: &str) -> ClientResult<StartAck> {
    match status_of(endpoint, body)?.as_str() {
        "started" => Ok(StartAck::Started),
        "already_running" => Ok(StartAck::AlreadyRunning),
        other => Err(ClientError::protocol(
            endpoint,
            format!("unexpected status {other:?}"),
        )),
    }
}

/// Interprets the body of a stop acknowledgement.
pub fn parse_stop_ack(endpoint: &str, body: &str) -> ClientResult<StopAck> {
    match status_of(endpoint, body)?.as_str() {
        "stopped" => Ok(StopAck::Stopped),
        other => Err(ClientError::protocol(
            endpoint,
            format!("unexpected status {other:?}"),
        )),
    }
}

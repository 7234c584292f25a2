//! Lifecycle of the live snapshot stream.
//!
//! A connection is identified by a [`ConnectionId`] generation number. Every
//! notification it produces carries that id, so the session can tell a late
//! event from a previous connection apart from one of the current connection.
//!
//! Each opened connection reports through a [`StreamCallbacks`]:
//! `opened` at most once, any number of snapshots, and exactly one `closed`.
//! `closed` consumes the callbacks, and dropping them without calling it
//! reports [`CloseReason::Error`], so a connection task cannot end silently.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::model::Snapshot;
use crate::session::SessionEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// We asked for it via [`ConnectionHandle::close`].
    Explicit,
    /// The server ended the stream.
    Remote,
    /// Connect failure or transport error.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Opened,
    Snapshot(Arc<Snapshot>),
    Closed(CloseReason),
}

// ─────────────────────────────────────────────────────────────────────────
// Callbacks
// ─────────────────────────────────────────────────────────────────────────

pub struct StreamCallbacks {
    id: ConnectionId,
    events: mpsc::UnboundedSender<SessionEvent>,
    opened: bool,
    closed: bool,
}

impl StreamCallbacks {
    pub fn new(id: ConnectionId, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            id,
            events,
            opened: false,
            closed: false,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Reports the connection as established. Repeated calls are ignored.
    pub fn opened(&mut self) {
        if std::mem::replace(&mut self.opened, true) {
            return;
        }
        self.emit(StreamEvent::Opened);
    }

    /// Decodes one text frame and forwards it. Malformed frames are logged
    /// and dropped; returns whether a snapshot was delivered.
    pub fn frame(&mut self, text: &str) -> bool {
        match Snapshot::decode(text) {
            Ok(snapshot) => {
                self.emit(StreamEvent::Snapshot(Arc::new(snapshot)));
                true
            }
            Err(e) => {
                warn!("{}: dropping malformed frame: {}", self.id, e);
                false
            }
        }
    }

    pub fn closed(mut self, reason: CloseReason) {
        self.finish(reason);
    }

    fn finish(&mut self, reason: CloseReason) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.emit(StreamEvent::Closed(reason));
    }

    fn emit(&self, event: StreamEvent) {
        // The receiver is gone once the runtime has shut down.
        let _ = self.events.send(SessionEvent::Stream { id: self.id, event });
    }
}

impl Drop for StreamCallbacks {
    fn drop(&mut self) {
        if !self.closed {
            warn!("{}: connection ended without reporting; closing with error", self.id);
            self.finish(CloseReason::Error);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Handle / close signal
// ─────────────────────────────────────────────────────────────────────────

/// Owner's side of one connection. Closing is idempotent; dropping the handle
/// also asks the connection to close.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    close_tx: Option<oneshot::Sender<()>>,
}

/// Connection's side: resolves when the owner asks it to close.
#[derive(Debug)]
pub struct CloseSignal {
    rx: oneshot::Receiver<()>,
    fired: bool,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId) -> (Self, CloseSignal) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                id,
                close_tx: Some(tx),
            },
            CloseSignal { rx, fired: false },
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Requests the close. Returns `false` if it was already requested.
    pub fn close(&mut self) -> bool {
        match self.close_tx.take() {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    pub fn is_closing(&self) -> bool {
        self.close_tx.is_none()
    }
}

impl CloseSignal {
    /// Cancel-safe; usable as a `tokio::select!` branch.
    pub async fn requested(&mut self) {
        if self.fired {
            return;
        }
        let _ = (&mut self.rx).await;
        self.fired = true;
    }

    pub fn is_requested(&mut self) -> bool {
        if !self.fired {
            self.fired = !matches!(
                self.rx.try_recv(),
                Err(oneshot::error::TryRecvError::Empty)
            );
        }
        self.fired
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Connector + manager
// ─────────────────────────────────────────────────────────────────────────

/// Opens the transport for one connection. Implementations report through
/// `callbacks` from their own task and stop when `close` fires.
pub trait StreamConnector: Send + Sync + 'static {
    fn open(&self, callbacks: StreamCallbacks, close: CloseSignal);
}

/// Owns at most one connection at a time.
///
/// A connection stays attached from `open` until its `Closed` event has been
/// seen by the runtime (`release`), including while it is closing.
pub struct StreamManager<S> {
    connector: S,
    events: mpsc::UnboundedSender<SessionEvent>,
    current: Option<ConnectionHandle>,
}

impl<S: StreamConnector> StreamManager<S> {
    pub fn new(connector: S, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            connector,
            events,
            current: None,
        }
    }

    /// Opens a connection tagged `id`. Opening while another connection is
    /// still attached is a sequencing bug upstream; it is refused.
    pub fn open(&mut self, id: ConnectionId) -> bool {
        if let Some(current) = &self.current {
            error!(
                "Refusing to open {} while {} is still attached",
                id,
                current.id()
            );
            return false;
        }
        info!("Opening {}", id);
        let (handle, signal) = ConnectionHandle::new(id);
        self.connector
            .open(StreamCallbacks::new(id, self.events.clone()), signal);
        self.current = Some(handle);
        true
    }

    pub fn close(&mut self, id: ConnectionId) {
        match self.current.as_mut() {
            Some(handle) if handle.id() == id => {
                if handle.close() {
                    info!("Closing {}", id);
                }
            }
            _ => debug!("Close for {} ignored; not attached", id),
        }
    }

    /// Detaches the connection once its close notification has arrived.
    pub fn release(&mut self, id: ConnectionId) {
        if self.current.as_ref().map(ConnectionHandle::id) == Some(id) {
            self.current = None;
        }
    }

    pub fn current(&self) -> Option<ConnectionId> {
        self.current.as_ref().map(ConnectionHandle::id)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// WebSocket connector
// ─────────────────────────────────────────────────────────────────────────

#[cfg(feature = "net")]
pub use self::ws::WebSocketConnector;

#[cfg(feature = "net")]
mod ws {
    use std::time::Duration;

    use futures::StreamExt;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;
    use tracing::{debug, info, warn};

    use super::{CloseReason, CloseSignal, StreamCallbacks, StreamConnector};

    /// Upper bound on the close handshake; the connection counts as closed after it.
    const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

    /// Streams snapshots from the server's WebSocket endpoint, one task per
    /// connection.
    #[derive(Debug, Clone)]
    pub struct WebSocketConnector {
        url: String,
    }

    impl WebSocketConnector {
        pub fn new(url: impl Into<String>) -> Self {
            Self { url: url.into() }
        }
    }

    impl StreamConnector for WebSocketConnector {
        fn open(&self, mut callbacks: StreamCallbacks, close: CloseSignal) {
            let url = self.url.clone();
            tokio::spawn(async move {
                let reason = pump(&url, &mut callbacks, close).await;
                info!("{} closed ({:?})", callbacks.id(), reason);
                callbacks.closed(reason);
            });
        }
    }

    async fn pump(
        url: &str,
        callbacks: &mut StreamCallbacks,
        mut close: CloseSignal,
    ) -> CloseReason {
        let connected = tokio::select! {
            _ = close.requested() => return CloseReason::Explicit,
            result = connect_async(url) => result,
        };
        let mut ws = match connected {
            Ok((ws, _response)) => ws,
            Err(e) => {
                warn!("{}: connect to {} failed: {}", callbacks.id(), url, e);
                return CloseReason::Error;
            }
        };
        callbacks.opened();

        loop {
            tokio::select! {
                _ = close.requested() => {
                    match tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, ws.close(None)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => debug!("{}: close handshake failed: {}", callbacks.id(), e),
                        Err(_) => warn!("{}: close handshake timed out", callbacks.id()),
                    }
                    return CloseReason::Explicit;
                }
                message = ws.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        callbacks.frame(&text);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!("{}: server closed stream: {:?}", callbacks.id(), frame);
                        return CloseReason::Remote;
                    }
                    // Ping/pong are answered by tungstenite; binary frames are unused.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("{}: stream error: {}", callbacks.id(), e);
                        return CloseReason::Error;
                    }
                    None => return CloseReason::Remote,
                },
            }
        }
    }

}

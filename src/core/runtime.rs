//! Event loop around [`SessionController`].
//!
//! All three event sources (user intent via [`SessionHandle`], remote call
//! completions, stream callbacks) post [`SessionEvent`]s to one channel. The
//! runtime takes them one at a time, in arrival order, runs the controller,
//! and carries out the resulting effects. Remote calls run on spawned tasks
//! and only ever report back through the channel, so nothing but this loop
//! touches session state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::control::ControlApi;
use crate::layout::{LayoutFetcher, LayoutSource};
use crate::observer::Presenter;
use crate::session::{Effect, Notification, SessionController, SessionEvent, SessionState};
use crate::stream::{StreamConnector, StreamEvent, StreamManager};

/// Cloneable sender of user intent.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    pub fn start(&self) {
        self.send(SessionEvent::UserStart);
    }

    pub fn stop(&self) {
        self.send(SessionEvent::UserStop);
    }

    fn send(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Session runtime has exited; intent dropped");
        }
    }
}

pub struct SessionRuntime<C, S, L, P> {
    controller: SessionController,
    control: Arc<C>,
    streams: StreamManager<S>,
    layout: LayoutFetcher<L>,
    presenter: P,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl<C, S, L, P> SessionRuntime<C, S, L, P>
where
    C: ControlApi,
    S: StreamConnector,
    L: LayoutSource,
    P: Presenter,
{
    pub fn new(control: Arc<C>, connector: S, layout: L, presenter: P) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            controller: SessionController::default(),
            control,
            streams: StreamManager::new(connector, events_tx.clone()),
            layout: LayoutFetcher::new(layout),
            presenter,
            events_tx,
            events_rx,
        }
    }

    pub fn with_fault_cooldown(mut self, cooldown: Duration) -> Self {
        self.controller = SessionController::new(cooldown);
        self
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            events: self.events_tx.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.controller.state()
    }

    /// Fetches the layout, then processes events until `shutdown` fires and
    /// the session has wound down to Idle or Faulted. Returns the presenter.
    pub async fn run(mut self, shutdown: CancellationToken) -> P {
        match self.layout.layout().await {
            Ok(layout) => self.presenter.on_layout_loaded(&layout),
            Err(e) => self.presenter.on_layout_unavailable(&e),
        }
        self.presenter
            .on_session_state_changed(self.controller.state());

        let mut draining = false;
        loop {
            tokio::select! {
                _ = shutdown.cancelled(), if !draining => {
                    info!("Shutdown requested; stopping session");
                    draining = true;
                    self.dispatch(SessionEvent::UserStop);
                }
                event = self.events_rx.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
            }
            if draining && self.controller.state().is_settled() {
                break;
            }
        }
        info!("Session runtime finished in {:?}", self.controller.state());
        self.presenter
    }

    fn dispatch(&mut self, event: SessionEvent) {
        if let SessionEvent::Stream {
            id,
            event: StreamEvent::Closed(_),
        } = &event
        {
            self.streams.release(*id);
        }
        for effect in self.controller.handle(event) {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::RequestStart => {
                let control = Arc::clone(&self.control);
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = control.request_start().await;
                    let _ = events.send(SessionEvent::StartResolved(result));
                });
            }
            Effect::RequestStop => {
                let control = Arc::clone(&self.control);
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = control.request_stop().await;
                    let _ = events.send(SessionEvent::StopResolved(result));
                });
            }
            Effect::OpenStream(id) => {
                self.streams.open(id);
            }
            Effect::CloseStream(id) => self.streams.close(id),
            Effect::StartCooldown(after) => {
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = events.send(SessionEvent::CooldownElapsed);
                });
            }
            Effect::Publish(notification) => match notification {
                Notification::StateChanged(state) => {
                    self.presenter.on_session_state_changed(state)
                }
                Notification::SnapshotUpdated(snapshot) => {
                    self.presenter.on_snapshot_updated(&snapshot)
                }
                Notification::SnapshotCleared => self.presenter.on_snapshot_cleared(),
                Notification::Fault(e) => self.presenter.on_session_fault(&e),
            },
        }
    }
}

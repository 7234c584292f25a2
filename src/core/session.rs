//! The session state machine.
//!
//! [`SessionController`] is pure: it takes one [`SessionEvent`] at a time and
//! returns the [`Effect`]s the runtime must carry out. It never performs I/O
//! and never sees a connection handle, only the [`ConnectionId`] it allocated.
//!
//! ```text
//!   Idle ──start──▶ Starting ──ack──▶ AwaitingStream ──opened──▶ Running
//!    ▲                 │                    │                      │
//!    │               fail              stop / closed          stop / closed
//!    │                 ▼                    ▼                      ▼
//!    │              Faulted ◀──stop fail── Stopping ◀─────────────┘
//!    └───────────────── stop ack ──────────┘
//! ```
//!
//! Ordering rules the machine guarantees:
//! - the stream is opened only after a start acknowledgement;
//! - the remote stop is requested only after the stream reported closed;
//! - an unsolicited close is a stop and never leads to a new start;
//! - start/stop while a transition is in flight only toggles the pending
//!   flags, it never issues a second remote call.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::control::{StartAck, StopAck};
use crate::error::{ClientError, ClientResult};
use crate::model::Snapshot;
use crate::stream::{CloseReason, ConnectionId, StreamEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    Idle,
    Starting,
    AwaitingStream,
    Running,
    Stopping,
    Faulted,
}

impl SessionState {
    /// Whether a stream connection is live (opened or opening, not closing).
    pub fn has_live_stream(self) -> bool {
        matches!(self, SessionState::AwaitingStream | SessionState::Running)
    }

    /// No transition in flight.
    pub fn is_settled(self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Faulted)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    UserStart,
    UserStop,
    StartResolved(ClientResult<StartAck>),
    StopResolved(ClientResult<StopAck>),
    Stream { id: ConnectionId, event: StreamEvent },
    CooldownElapsed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    RequestStart,
    RequestStop,
    OpenStream(ConnectionId),
    CloseStream(ConnectionId),
    /// Deliver [`SessionEvent::CooldownElapsed`] after this long.
    StartCooldown(Duration),
    Publish(Notification),
}

/// What the presentation layer gets told.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    StateChanged(SessionState),
    SnapshotUpdated(Arc<Snapshot>),
    SnapshotCleared,
    Fault(ClientError),
}

#[derive(Debug)]
pub struct SessionController {
    state: SessionState,
    next_connection: u64,
    /// Set from open until the connection's close notification arrives.
    connection: Option<ConnectionId>,
    stop_in_flight: bool,
    pending_stop: bool,
    pending_start: bool,
    cooling_down: bool,
    fault_cooldown: Duration,
    latest: Option<Arc<Snapshot>>,
    last_fault: Option<ClientError>,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl SessionController {
    pub fn new(fault_cooldown: Duration) -> Self {
        Self {
            state: SessionState::Idle,
            next_connection: 0,
            connection: None,
            stop_in_flight: false,
            pending_stop: false,
            pending_start: false,
            cooling_down: false,
            fault_cooldown,
            latest: None,
            last_fault: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn latest_snapshot(&self) -> Option<&Arc<Snapshot>> {
        self.latest.as_ref()
    }

    pub fn last_fault(&self) -> Option<&ClientError> {
        self.last_fault.as_ref()
    }

    pub fn pending_stop(&self) -> bool {
        self.pending_stop
    }

    pub fn pending_start(&self) -> bool {
        self.pending_start
    }

    pub fn handle(&mut self, event: SessionEvent) -> Vec<Effect> {
        let mut out = Vec::new();
        match event {
            SessionEvent::UserStart => self.on_user_start(&mut out),
            SessionEvent::UserStop => self.on_user_stop(&mut out),
            SessionEvent::StartResolved(result) => self.on_start_resolved(result, &mut out),
            SessionEvent::StopResolved(result) => self.on_stop_resolved(result, &mut out),
            SessionEvent::Stream { id, event } => self.on_stream(id, event, &mut out),
            SessionEvent::CooldownElapsed => {
                if self.cooling_down {
                    debug!("Fault cool-down elapsed");
                }
                self.cooling_down = false;
            }
        }
        debug_assert!(
            !matches!(
                self.state,
                SessionState::Idle | SessionState::Starting | SessionState::Faulted
            ) || self.connection.is_none(),
            "connection attached in {:?}",
            self.state
        );
        out
    }

    // ─────────────────────────────────────────────────────────────────────
    // User intent
    // ─────────────────────────────────────────────────────────────────────

    fn on_user_start(&mut self, out: &mut Vec<Effect>) {
        match self.state {
            SessionState::Idle => self.begin_start(out),
            SessionState::Faulted => {
                if self.cooling_down {
                    warn!("Start ignored: recovering from a fault");
                } else {
                    self.begin_start(out);
                }
            }
            SessionState::Starting => {
                if self.pending_stop {
                    debug!("Start while starting: pending stop withdrawn");
                }
                self.pending_stop = false;
            }
            SessionState::AwaitingStream | SessionState::Running => {
                debug!("Start ignored: already {:?}", self.state);
            }
            SessionState::Stopping => {
                debug!("Start while stopping: will restart once stopped");
                self.pending_start = true;
            }
        }
    }

    fn on_user_stop(&mut self, out: &mut Vec<Effect>) {
        match self.state {
            SessionState::Idle | SessionState::Faulted => {
                debug!("Stop ignored: nothing running");
            }
            SessionState::Starting => {
                debug!("Stop while starting: deferred until start resolves");
                self.pending_stop = true;
            }
            SessionState::AwaitingStream | SessionState::Running => self.begin_stop(out),
            SessionState::Stopping => {
                if self.pending_start {
                    debug!("Stop while stopping: pending start withdrawn");
                }
                self.pending_start = false;
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Remote call outcomes
    // ─────────────────────────────────────────────────────────────────────

    fn on_start_resolved(&mut self, result: ClientResult<StartAck>, out: &mut Vec<Effect>) {
        if self.state != SessionState::Starting {
            warn!("Start outcome ignored in {:?}", self.state);
            return;
        }
        match result {
            Ok(ack) => {
                info!("Simulation start acknowledged ({:?})", ack);
                let id = self.allocate_connection();
                self.connection = Some(id);
                out.push(Effect::OpenStream(id));
                self.enter(SessionState::AwaitingStream, out);
                if std::mem::take(&mut self.pending_stop) {
                    info!("Applying deferred stop");
                    self.begin_stop(out);
                }
            }
            Err(e) => {
                self.pending_stop = false;
                self.fault(e, out);
            }
        }
    }

    fn on_stop_resolved(&mut self, result: ClientResult<StopAck>, out: &mut Vec<Effect>) {
        if self.state != SessionState::Stopping || !self.stop_in_flight {
            warn!("Stop outcome ignored in {:?}", self.state);
            return;
        }
        self.stop_in_flight = false;
        match result {
            Ok(StopAck::Stopped) => {
                info!("Simulation stopped");
                self.enter(SessionState::Idle, out);
                if std::mem::take(&mut self.pending_start) {
                    info!("Applying deferred start");
                    self.begin_start(out);
                }
            }
            Err(e) => {
                if std::mem::take(&mut self.pending_start) {
                    warn!("Deferred start dropped: stop failed");
                }
                self.fault(e, out);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Stream notifications
    // ─────────────────────────────────────────────────────────────────────

    fn on_stream(&mut self, id: ConnectionId, event: StreamEvent, out: &mut Vec<Effect>) {
        if self.connection != Some(id) {
            debug!("Ignoring {:?} from stale {}", event, id);
            return;
        }
        match event {
            StreamEvent::Opened => {
                if self.state == SessionState::AwaitingStream {
                    self.enter(SessionState::Running, out);
                }
            }
            StreamEvent::Snapshot(snapshot) => {
                if !self.state.has_live_stream() {
                    debug!("Dropping snapshot while {:?}", self.state);
                    return;
                }
                self.enter(SessionState::Running, out);
                self.latest = Some(Arc::clone(&snapshot));
                out.push(Effect::Publish(Notification::SnapshotUpdated(snapshot)));
            }
            StreamEvent::Closed(reason) => {
                self.connection = None;
                match self.state {
                    SessionState::Stopping => self.request_remote_stop(out),
                    SessionState::AwaitingStream | SessionState::Running => {
                        if reason == CloseReason::Explicit {
                            warn!("{} closed explicitly while {:?}", id, self.state);
                        } else {
                            info!("{} closed unexpectedly ({:?}); stopping", id, reason);
                        }
                        self.clear_snapshot(out);
                        self.enter(SessionState::Stopping, out);
                        self.request_remote_stop(out);
                    }
                    other => warn!("{} closed in {:?}", id, other),
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────

    fn begin_start(&mut self, out: &mut Vec<Effect>) {
        self.pending_stop = false;
        self.pending_start = false;
        self.last_fault = None;
        out.push(Effect::RequestStart);
        self.enter(SessionState::Starting, out);
    }

    fn begin_stop(&mut self, out: &mut Vec<Effect>) {
        if let Some(id) = self.connection {
            out.push(Effect::CloseStream(id));
        }
        self.enter(SessionState::Stopping, out);
    }

    fn request_remote_stop(&mut self, out: &mut Vec<Effect>) {
        self.stop_in_flight = true;
        out.push(Effect::RequestStop);
    }

    fn fault(&mut self, error: ClientError, out: &mut Vec<Effect>) {
        warn!("Session faulted: {}", error);
        self.last_fault = Some(error.clone());
        out.push(Effect::Publish(Notification::Fault(error)));
        self.enter(SessionState::Faulted, out);
        if !self.fault_cooldown.is_zero() {
            self.cooling_down = true;
            out.push(Effect::StartCooldown(self.fault_cooldown));
        }
    }

    fn clear_snapshot(&mut self, out: &mut Vec<Effect>) {
        if self.latest.take().is_some() {
            out.push(Effect::Publish(Notification::SnapshotCleared));
        }
    }

    fn enter(&mut self, next: SessionState, out: &mut Vec<Effect>) {
        if self.state == next {
            return;
        }
        info!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
        out.push(Effect::Publish(Notification::StateChanged(next)));
    }

    fn allocate_connection(&mut self) -> ConnectionId {
        self.next_connection += 1;
        ConnectionId(self.next_connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Agent, AgentId, AgentState, Metrics, Position};

    fn snapshot(ts: i64) -> Arc<Snapshot> {
        Arc::new(Snapshot {
            timestamp: None,
            agents: vec![Agent {
                id: AgentId::Number(1),
                position: Position::new(2, 3),
                state: AgentState::AtHome,
            }],
            metrics: Metrics {
                timestamp: ts,
                average_commute_time: 0.0,
                average_distance: 0.0,
                energy_usage: 0.0,
                max_congestion: 0,
                most_congested_position: None,
                congestion_map: Default::default(),
            },
        })
    }

    fn stream(id: ConnectionId, event: StreamEvent) -> SessionEvent {
        SessionEvent::Stream { id, event }
    }

    fn transport_error() -> ClientError {
        ClientError::transport("/api/start", "connection refused")
    }

    fn count(effects: &[Effect], pred: impl Fn(&Effect) -> bool) -> usize {
        effects.iter().filter(|e| pred(e)).count()
    }

    fn opened_id(effects: &[Effect]) -> ConnectionId {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::OpenStream(id) => Some(*id),
                _ => None,
            })
            .expect("no OpenStream effect")
    }

    /// Drives a controller into Running and returns the connection id.
    fn running(c: &mut SessionController) -> ConnectionId {
        c.handle(SessionEvent::UserStart);
        let fx = c.handle(SessionEvent::StartResolved(Ok(StartAck::Started)));
        let id = opened_id(&fx);
        c.handle(stream(id, StreamEvent::Opened));
        assert_eq!(c.state(), SessionState::Running);
        id
    }

    #[test]
    fn start_requests_then_opens_after_ack() {
        let mut c = SessionController::default();
        let fx = c.handle(SessionEvent::UserStart);
        assert_eq!(
            fx,
            vec![
                Effect::RequestStart,
                Effect::Publish(Notification::StateChanged(SessionState::Starting)),
            ]
        );
        assert_eq!(c.connection(), None);

        let fx = c.handle(SessionEvent::StartResolved(Ok(StartAck::Started)));
        let id = opened_id(&fx);
        assert_eq!(c.state(), SessionState::AwaitingStream);
        assert_eq!(c.connection(), Some(id));

        let fx = c.handle(stream(id, StreamEvent::Opened));
        assert_eq!(
            fx,
            vec![Effect::Publish(Notification::StateChanged(SessionState::Running))]
        );
    }

    #[test]
    fn double_start_issues_one_request() {
        let mut c = SessionController::default();
        let mut fx = c.handle(SessionEvent::UserStart);
        fx.extend(c.handle(SessionEvent::UserStart));
        assert_eq!(count(&fx, |e| *e == Effect::RequestStart), 1);
        assert_eq!(c.state(), SessionState::Starting);
    }

    #[test]
    fn stop_while_starting_opens_then_closes_then_stops_once() {
        let mut c = SessionController::default();
        let mut fx = c.handle(SessionEvent::UserStart);
        fx.extend(c.handle(SessionEvent::UserStop));
        fx.extend(c.handle(SessionEvent::UserStop));
        assert!(c.pending_stop());
        assert_eq!(c.state(), SessionState::Starting);

        let resolved = c.handle(SessionEvent::StartResolved(Ok(StartAck::Started)));
        let id = opened_id(&resolved);
        assert!(resolved.contains(&Effect::CloseStream(id)));
        assert_eq!(c.state(), SessionState::Stopping);
        // Remote stop waits for the stream to actually close.
        assert_eq!(count(&resolved, |e| *e == Effect::RequestStop), 0);
        fx.extend(resolved);

        // Late "opened" for a connection being closed changes nothing.
        fx.extend(c.handle(stream(id, StreamEvent::Opened)));
        assert_eq!(c.state(), SessionState::Stopping);

        fx.extend(c.handle(stream(id, StreamEvent::Closed(CloseReason::Explicit))));
        fx.extend(c.handle(SessionEvent::StopResolved(Ok(StopAck::Stopped))));

        assert_eq!(c.state(), SessionState::Idle);
        assert_eq!(count(&fx, |e| *e == Effect::RequestStart), 1);
        assert_eq!(count(&fx, |e| *e == Effect::RequestStop), 1);
        assert_eq!(count(&fx, |e| matches!(e, Effect::OpenStream(_))), 1);
    }

    #[test]
    fn stop_while_starting_then_start_failure_is_a_plain_fault() {
        let mut c = SessionController::default();
        c.handle(SessionEvent::UserStart);
        c.handle(SessionEvent::UserStop);
        let fx = c.handle(SessionEvent::StartResolved(Err(transport_error())));
        assert_eq!(c.state(), SessionState::Faulted);
        assert!(!c.pending_stop());
        assert_eq!(count(&fx, |e| matches!(e, Effect::OpenStream(_))), 0);
        assert_eq!(count(&fx, |e| *e == Effect::RequestStop), 0);
        assert!(fx.contains(&Effect::Publish(Notification::Fault(transport_error()))));
        assert_eq!(c.last_fault(), Some(&transport_error()));
    }

    #[test]
    fn start_after_deferred_stop_withdraws_it() {
        let mut c = SessionController::default();
        c.handle(SessionEvent::UserStart);
        c.handle(SessionEvent::UserStop);
        c.handle(SessionEvent::UserStart);
        assert!(!c.pending_stop());
        let fx = c.handle(SessionEvent::StartResolved(Ok(StartAck::AlreadyRunning)));
        assert_eq!(count(&fx, |e| matches!(e, Effect::CloseStream(_))), 0);
        assert_eq!(c.state(), SessionState::AwaitingStream);
    }

    #[test]
    fn user_stop_closes_stream_before_remote_stop() {
        let mut c = SessionController::default();
        let id = running(&mut c);

        let fx = c.handle(SessionEvent::UserStop);
        assert_eq!(
            fx,
            vec![
                Effect::CloseStream(id),
                Effect::Publish(Notification::StateChanged(SessionState::Stopping)),
            ]
        );
        // Repeated stop while stopping is a no-op.
        assert!(c.handle(SessionEvent::UserStop).is_empty());

        let fx = c.handle(stream(id, StreamEvent::Closed(CloseReason::Explicit)));
        assert_eq!(fx, vec![Effect::RequestStop]);
        assert_eq!(c.connection(), None);

        let fx = c.handle(SessionEvent::StopResolved(Ok(StopAck::Stopped)));
        assert_eq!(
            fx,
            vec![Effect::Publish(Notification::StateChanged(SessionState::Idle))]
        );
    }

    #[test]
    fn snapshots_publish_latest_and_survive_explicit_stop() {
        let mut c = SessionController::default();
        let id = running(&mut c);

        c.handle(stream(id, StreamEvent::Snapshot(snapshot(1))));
        let fx = c.handle(stream(id, StreamEvent::Snapshot(snapshot(2))));
        assert_eq!(
            fx,
            vec![Effect::Publish(Notification::SnapshotUpdated(snapshot(2)))]
        );
        assert_eq!(c.latest_snapshot().map(|s| s.metrics.timestamp), Some(2));

        c.handle(SessionEvent::UserStop);
        // Frames racing the close are not published.
        assert!(c
            .handle(stream(id, StreamEvent::Snapshot(snapshot(3))))
            .is_empty());
        c.handle(stream(id, StreamEvent::Closed(CloseReason::Explicit)));
        c.handle(SessionEvent::StopResolved(Ok(StopAck::Stopped)));
        assert_eq!(c.latest_snapshot().map(|s| s.metrics.timestamp), Some(2));
    }

    #[test]
    fn snapshot_before_opened_counts_as_running() {
        let mut c = SessionController::default();
        c.handle(SessionEvent::UserStart);
        let id = opened_id(&c.handle(SessionEvent::StartResolved(Ok(StartAck::Started))));
        let fx = c.handle(stream(id, StreamEvent::Snapshot(snapshot(5))));
        assert_eq!(
            fx,
            vec![
                Effect::Publish(Notification::StateChanged(SessionState::Running)),
                Effect::Publish(Notification::SnapshotUpdated(snapshot(5))),
            ]
        );
    }

    #[test]
    fn unsolicited_close_stops_and_never_reopens() {
        let mut c = SessionController::default();
        let id = running(&mut c);
        c.handle(stream(id, StreamEvent::Snapshot(snapshot(1))));

        let fx = c.handle(stream(id, StreamEvent::Closed(CloseReason::Remote)));
        assert_eq!(
            fx,
            vec![
                Effect::Publish(Notification::SnapshotCleared),
                Effect::Publish(Notification::StateChanged(SessionState::Stopping)),
                Effect::RequestStop,
            ]
        );
        assert!(c.latest_snapshot().is_none());

        let fx = c.handle(SessionEvent::StopResolved(Ok(StopAck::Stopped)));
        assert_eq!(c.state(), SessionState::Idle);
        assert_eq!(count(&fx, |e| matches!(e, Effect::OpenStream(_))), 0);
        assert_eq!(count(&fx, |e| *e == Effect::RequestStart), 0);
    }

    #[test]
    fn unsolicited_close_with_failed_stop_faults() {
        let mut c = SessionController::new(Duration::from_millis(500));
        let id = running(&mut c);
        c.handle(stream(id, StreamEvent::Closed(CloseReason::Error)));

        let err = ClientError::protocol("/api/stop", "unexpected status \"nope\"");
        let fx = c.handle(SessionEvent::StopResolved(Err(err.clone())));
        assert_eq!(c.state(), SessionState::Faulted);
        assert!(fx.contains(&Effect::Publish(Notification::Fault(err))));
        assert!(fx.contains(&Effect::StartCooldown(Duration::from_millis(500))));
        assert_eq!(count(&fx, |e| matches!(e, Effect::OpenStream(_))), 0);
    }

    #[test]
    fn connect_failure_before_open_is_an_unsolicited_close() {
        let mut c = SessionController::default();
        c.handle(SessionEvent::UserStart);
        let id = opened_id(&c.handle(SessionEvent::StartResolved(Ok(StartAck::Started))));
        let fx = c.handle(stream(id, StreamEvent::Closed(CloseReason::Error)));
        assert!(fx.contains(&Effect::RequestStop));
        c.handle(SessionEvent::StopResolved(Ok(StopAck::Stopped)));
        assert_eq!(c.state(), SessionState::Idle);
    }

    #[test]
    fn stale_connection_events_are_ignored() {
        let mut c = SessionController::default();
        let first = running(&mut c);
        c.handle(SessionEvent::UserStop);
        c.handle(stream(first, StreamEvent::Closed(CloseReason::Explicit)));
        c.handle(SessionEvent::StopResolved(Ok(StopAck::Stopped)));

        let second = running(&mut c);
        assert_ne!(first, second);

        assert!(c
            .handle(stream(first, StreamEvent::Snapshot(snapshot(9))))
            .is_empty());
        assert!(c
            .handle(stream(first, StreamEvent::Closed(CloseReason::Remote)))
            .is_empty());
        assert_eq!(c.state(), SessionState::Running);
        assert_eq!(c.connection(), Some(second));
    }

    #[test]
    fn stale_remote_outcomes_are_ignored() {
        let mut c = SessionController::default();
        assert!(c
            .handle(SessionEvent::StartResolved(Ok(StartAck::Started)))
            .is_empty());
        assert!(c
            .handle(SessionEvent::StopResolved(Ok(StopAck::Stopped)))
            .is_empty());

        // Stopping, but the stream has not closed yet: no stop outstanding.
        running(&mut c);
        c.handle(SessionEvent::UserStop);
        assert!(c
            .handle(SessionEvent::StopResolved(Ok(StopAck::Stopped)))
            .is_empty());
        assert_eq!(c.state(), SessionState::Stopping);
    }

    #[test]
    fn start_while_stopping_restarts_after_stop() {
        let mut c = SessionController::default();
        let id = running(&mut c);
        c.handle(SessionEvent::UserStop);
        assert!(c.handle(SessionEvent::UserStart).is_empty());
        assert!(c.pending_start());

        c.handle(stream(id, StreamEvent::Closed(CloseReason::Explicit)));
        let fx = c.handle(SessionEvent::StopResolved(Ok(StopAck::Stopped)));
        assert_eq!(
            fx,
            vec![
                Effect::Publish(Notification::StateChanged(SessionState::Idle)),
                Effect::RequestStart,
                Effect::Publish(Notification::StateChanged(SessionState::Starting)),
            ]
        );
    }

    #[test]
    fn stop_withdraws_pending_start() {
        let mut c = SessionController::default();
        let id = running(&mut c);
        c.handle(SessionEvent::UserStop);
        c.handle(SessionEvent::UserStart);
        c.handle(SessionEvent::UserStop);
        assert!(!c.pending_start());
        c.handle(stream(id, StreamEvent::Closed(CloseReason::Explicit)));
        let fx = c.handle(SessionEvent::StopResolved(Ok(StopAck::Stopped)));
        assert_eq!(count(&fx, |e| *e == Effect::RequestStart), 0);
    }

    #[test]
    fn fault_cooldown_gates_restart() {
        let mut c = SessionController::new(Duration::from_secs(1));
        c.handle(SessionEvent::UserStart);
        let fx = c.handle(SessionEvent::StartResolved(Err(transport_error())));
        assert!(fx.contains(&Effect::StartCooldown(Duration::from_secs(1))));

        assert!(c.handle(SessionEvent::UserStart).is_empty());
        assert_eq!(c.state(), SessionState::Faulted);

        c.handle(SessionEvent::CooldownElapsed);
        let fx = c.handle(SessionEvent::UserStart);
        assert!(fx.contains(&Effect::RequestStart));
        assert_eq!(c.state(), SessionState::Starting);
        assert!(c.last_fault().is_none());
    }

    #[test]
    fn faulted_restarts_immediately_without_cooldown() {
        let mut c = SessionController::default();
        c.handle(SessionEvent::UserStart);
        let fx = c.handle(SessionEvent::StartResolved(Err(transport_error())));
        assert_eq!(count(&fx, |e| matches!(e, Effect::StartCooldown(_))), 0);
        assert!(c.handle(SessionEvent::UserStart).contains(&Effect::RequestStart));
    }

    /// Small deterministic generator so the interleaving test needs no deps.
    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> u64 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.0 = x;
            x
        }

        fn below(&mut self, n: u64) -> u64 {
            self.next() % n
        }
    }

    /// Plays random interleavings of user intent, remote outcomes and stream
    /// notifications against a model of the outside world and checks the
    /// structural invariants after every step.
    #[test]
    fn random_interleavings_keep_invariants() {
        for seed in 1..=200u64 {
            let mut rng = XorShift(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1);
            let mut c = SessionController::new(Duration::from_millis(10));

            // World model.
            let mut start_outstanding = 0usize;
            let mut stop_outstanding = 0usize;
            let mut open: Vec<(ConnectionId, bool)> = Vec::new(); // (id, close requested)
            let mut cooldown_armed = false;

            for _ in 0..300 {
                let event = match rng.below(9) {
                    0 => SessionEvent::UserStart,
                    1 => SessionEvent::UserStop,
                    2 if start_outstanding > 0 => {
                        start_outstanding -= 1;
                        match rng.below(3) {
                            0 => SessionEvent::StartResolved(Err(transport_error())),
                            1 => SessionEvent::StartResolved(Ok(StartAck::AlreadyRunning)),
                            _ => SessionEvent::StartResolved(Ok(StartAck::Started)),
                        }
                    }
                    3 if stop_outstanding > 0 => {
                        stop_outstanding -= 1;
                        if rng.below(4) == 0 {
                            SessionEvent::StopResolved(Err(transport_error()))
                        } else {
                            SessionEvent::StopResolved(Ok(StopAck::Stopped))
                        }
                    }
                    4 if !open.is_empty() => {
                        let (id, _) = open[0];
                        SessionEvent::Stream {
                            id,
                            event: StreamEvent::Opened,
                        }
                    }
                    5 if !open.is_empty() => {
                        let (id, _) = open[0];
                        SessionEvent::Stream {
                            id,
                            event: StreamEvent::Snapshot(snapshot(rng.below(100) as i64)),
                        }
                    }
                    6 if !open.is_empty() => {
                        // Remote drop, or completion of a requested close.
                        let (id, requested) = open.remove(0);
                        let reason = if requested {
                            CloseReason::Explicit
                        } else if rng.below(2) == 0 {
                            CloseReason::Remote
                        } else {
                            CloseReason::Error
                        };
                        SessionEvent::Stream {
                            id,
                            event: StreamEvent::Closed(reason),
                        }
                    }
                    7 if cooldown_armed => {
                        cooldown_armed = false;
                        SessionEvent::CooldownElapsed
                    }
                    _ => continue,
                };

                for effect in c.handle(event) {
                    match effect {
                        Effect::RequestStart => start_outstanding += 1,
                        Effect::RequestStop => {
                            assert!(open.is_empty(), "remote stop while a stream is open");
                            stop_outstanding += 1;
                        }
                        Effect::OpenStream(id) => {
                            assert!(open.is_empty(), "second stream opened (seed {seed})");
                            open.push((id, false));
                        }
                        Effect::CloseStream(id) => {
                            for entry in open.iter_mut().filter(|(o, _)| *o == id) {
                                entry.1 = true;
                            }
                        }
                        Effect::StartCooldown(_) => cooldown_armed = true,
                        Effect::Publish(_) => {}
                    }
                }

                assert!(open.len() <= 1);
                assert!(start_outstanding <= 1, "duplicate start (seed {seed})");
                assert!(stop_outstanding <= 1, "duplicate stop (seed {seed})");
                assert_eq!(c.connection(), open.first().map(|(id, _)| *id));
                if c.state().has_live_stream() {
                    assert!(c.connection().is_some());
                }
                if c.state().is_settled() || c.state() == SessionState::Starting {
                    assert!(open.is_empty());
                }
            }
        }
    }
}

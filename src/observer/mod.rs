//! Read-only presentation boundary.
//!
//! Presenters are told what changed; they cannot steer the session. View
//! adapters turn the layout and the latest snapshot into plain render data.

use std::sync::Arc;

use crate::error::ClientError;
use crate::model::{Layout, Snapshot};
use crate::session::SessionState;

mod view;

pub use view::{CityView, CongestionLevel, MetricsView, TileView};

/// Notifications from the session runtime. All methods default to no-ops so
/// implementors only override what they render.
pub trait Presenter {
    /// Called once, before any session activity, if the layout was fetched.
    fn on_layout_loaded(&mut self, _layout: &Arc<Layout>) {}

    /// Called once instead of `on_layout_loaded` when the fetch failed; the
    /// map should render nothing.
    fn on_layout_unavailable(&mut self, _error: &ClientError) {}

    fn on_snapshot_updated(&mut self, _snapshot: &Arc<Snapshot>) {}

    /// The stream went away on its own; the last snapshot is no longer valid.
    fn on_snapshot_cleared(&mut self) {}

    fn on_session_state_changed(&mut self, _state: SessionState) {}

    fn on_session_fault(&mut self, _error: &ClientError) {}
}

/// A [`Presenter`] that ignores everything.
pub struct NoopPresenter;

impl Presenter for NoopPresenter {}

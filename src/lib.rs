//! # cityview
//!
//! Client-side session control for a remote, continuously running city traffic
//! simulation.
//!
//! The server owns the simulation. This crate fetches the static city layout
//! once, drives the start/stop control endpoints and consumes the live snapshot
//! stream while the simulation runs, reconciling all three into a single
//! "is it running, and what does it look like right now" view.
//!
//! ## Quick Start
//!
//! ```no_run
//! # #[cfg(feature = "net")]
//! # async fn demo() -> Result<(), cityview::error::ClientError> {
//! use std::sync::Arc;
//! use cityview::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ClientConfig::from_env();
//! let api = Arc::new(HttpApi::new(&config)?);
//! let connector = WebSocketConnector::new(config.stream_url());
//!
//! let runtime = SessionRuntime::new(Arc::clone(&api), connector, api, NoopPresenter)
//!     .with_fault_cooldown(config.fault_cooldown());
//! let session = runtime.handle();
//!
//! session.start();
//! runtime.run(CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `net` (default): reqwest-based layout/control client and the
//!   tokio-tungstenite stream connector
//!
//! ## Modules
//!
//! - [`model`]: Wire data (layout, snapshots, agents, metrics)
//! - [`session`]: The session state machine
//! - [`runtime`]: Event loop executing the state machine's effects
//! - [`stream`]: Stream connection lifecycle and frame decoding
//! - [`observer`]: Presentation callbacks and view adapters

#[path = "core/error.rs"]
pub mod error;

#[path = "core/model.rs"]
pub mod model;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/layout.rs"]
pub mod layout;

#[path = "core/control.rs"]
pub mod control;

#[path = "core/stream.rs"]
pub mod stream;

#[path = "core/session.rs"]
pub mod session;

#[path = "core/runtime.rs"]
pub mod runtime;

#[cfg(feature = "net")]
#[path = "core/http.rs"]
pub mod http;

pub mod observer;

/// Prelude module for convenient imports.
///
/// ```
/// use cityview::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::ClientConfig;
    pub use crate::control::{ControlApi, StartAck, StopAck};
    pub use crate::error::{ClientError, ClientResult};
    pub use crate::layout::{LayoutFetcher, LayoutSource};
    pub use crate::model::{
        Agent, AgentId, AgentState, Cell, CellKind, Layout, Metrics, Position, Snapshot,
    };
    pub use crate::observer::{CityView, MetricsView, NoopPresenter, Presenter};
    pub use crate::runtime::{SessionHandle, SessionRuntime};
    pub use crate::session::{SessionController, SessionState};
    pub use crate::stream::{CloseReason, ConnectionId, StreamConnector};

    #[cfg(feature = "net")]
    pub use crate::http::HttpApi;
    #[cfg(feature = "net")]
    pub use crate::stream::WebSocketConnector;
}

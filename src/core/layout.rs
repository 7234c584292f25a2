//! One-shot retrieval of the static city layout.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::error::{ClientError, ClientResult};
use crate::model::Layout;

/// Anything that can produce the layout (the HTTP API, a fixture in tests).
pub trait LayoutSource: Send + Sync {
    fn fetch_layout(&self) -> BoxFuture<'_, ClientResult<Layout>>;
}

impl<T: LayoutSource + ?Sized> LayoutSource for Arc<T> {
    fn fetch_layout(&self) -> BoxFuture<'_, ClientResult<Layout>> {
        (**self).fetch_layout()
    }
}

/// Fetches the layout at most once per process and caches the outcome,
/// failures included: there is no retry. A layout whose rows disagree with
/// its declared dimensions is rejected as a transport failure, whatever the
/// source.
pub struct LayoutFetcher<S> {
    source: S,
    cached: OnceCell<ClientResult<Arc<Layout>>>,
}

impl<S: LayoutSource> LayoutFetcher<S> {
    const ENDPOINT: &'static str = "layout";

    pub fn new(source: S) -> Self {
        Self {
            source,
            cached: OnceCell::new(),
        }
    }

    pub async fn layout(&self) -> ClientResult<Arc<Layout>> {
        self.cached
            .get_or_init(|| async {
                let fetched = self.source.fetch_layout().await.and_then(|layout| {
                    layout
                        .validate()
                        .map(|()| layout)
                        .map_err(|e| ClientError::transport(Self::ENDPOINT, e))
                });
                match fetched {
                    Ok(layout) => {
                        info!("Layout loaded ({}x{})", layout.width, layout.height);
                        Ok(Arc::new(layout))
                    }
                    Err(e) => {
                        error!("Layout unavailable: {}", e);
                        Err(e)
                    }
                }
            })
            .await
            .clone()
    }

    /// The cached layout, if it has been fetched successfully.
    pub fn cached(&self) -> Option<Arc<Layout>> {
        self.cached.get().and_then(|r| r.as_ref().ok().cloned())
    }
}

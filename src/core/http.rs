//! reqwest-backed layout and control endpoints.

use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::control::{parse_start_ack, parse_stop_ack, ControlApi, StartAck, StopAck};
use crate::error::{ClientError, ClientResult};
use crate::layout::LayoutSource;
use crate::model::Layout;

/// HTTP side of the simulation server: `GET layout`, `GET start`, `GET stop`.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    layout_url: String,
    start_url: String,
    stop_url: String,
}

struct RawResponse {
    status: reqwest::StatusCode,
    body: String,
}

impl HttpApi {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ClientError::transport(&config.server, e))?;

        Ok(Self {
            client,
            layout_url: config.layout_url(),
            start_url: config.start_url(),
            stop_url: config.stop_url(),
        })
    }

    async fn get(&self, url: &str) -> ClientResult<RawResponse> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ClientError::transport(url, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::transport(url, e))?;
        Ok(RawResponse { status, body })
    }

    async fn fetch_layout_inner(&self) -> ClientResult<Layout> {
        let url = self.layout_url.as_str();
        let raw = self.get(url).await?;
        // A layout we cannot use is as good as an unreachable endpoint.
        if !raw.status.is_success() {
            return Err(ClientError::transport(url, format!("HTTP {}", raw.status)));
        }
        serde_json::from_str(&raw.body)
            .map_err(|e| ClientError::transport(url, format!("malformed layout: {e}")))
    }

    async fn control_body(&self, url: &str) -> ClientResult<String> {
        let raw = self.get(url).await?;
        if !raw.status.is_success() {
            return Err(ClientError::protocol(url, format!("HTTP {}", raw.status)));
        }
        Ok(raw.body)
    }
}

impl LayoutSource for HttpApi {
    fn fetch_layout(&self) -> BoxFuture<'_, ClientResult<Layout>> {
        Box::pin(self.fetch_layout_inner())
    }
}

impl ControlApi for HttpApi {
    fn request_start(&self) -> BoxFuture<'_, ClientResult<StartAck>> {
        Box::pin(async move {
            let body = self.control_body(&self.start_url).await?;
            let ack = parse_start_ack(&self.start_url, &body)?;
            info!("Start acknowledged: {:?}", ack);
            Ok(ack)
        })
    }

    fn request_stop(&self) -> BoxFuture<'_, ClientResult<StopAck>> {
        Box::pin(async move {
            let body = self.control_body(&self.stop_url).await?;
            let ack = parse_stop_ack(&self.stop_url, &body)?;
            info!("Stop acknowledged");
            Ok(ack)
        })
    }
}

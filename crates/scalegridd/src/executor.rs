//! Scale executors.
//!
//! `DryRunExecutor` applies decisions to the state store only: the target
//! becomes the service's reported instance count. `WebhookExecutor` POSTs
//! the decision as JSON to an external endpoint and treats 2xx as success.

use std::time::Duration;

use tracing::{debug, info};

use scalegrid_core::{BoxFuture, ScaleExecutor, ScalingDecision, SourceError, SourceResult};
use scalegrid_metrics::StoreMetrics;

/// Records decisions as new instance counts without touching any platform.
pub struct DryRunExecutor {
    metrics: StoreMetrics,
}

impl DryRunExecutor {
    pub fn new(metrics: StoreMetrics) -> Self {
        Self { metrics }
    }
}

impl ScaleExecutor for DryRunExecutor {
    fn execute<'a>(&'a self, decision: &'a ScalingDecision) -> BoxFuture<'a, SourceResult<bool>> {
        Box::pin(async move {
            self.metrics
                .set_instance_count(&decision.service_name, decision.target_instances)
                .map_err(|e| SourceError::Unavailable(e.to_string()))?;
            info!(
                service = %decision.service_name,
                from = decision.current_instances,
                to = decision.target_instances,
                "dry run: instance count updated"
            );
            Ok(true)
        })
    }
}

/// POSTs each decision to `http://{address}{path}`.
pub struct WebhookExecutor {
    address: String,
    path: String,
    timeout: Duration,
}

impl WebhookExecutor {
    pub fn new(address: &str, path: &str, timeout: Duration) -> Self {
        Self {
            address: address.to_string(),
            path: path.to_string(),
            timeout,
        }
    }

    async fn post(&self, body: Vec<u8>) -> SourceResult<bool> {
        let uri = format!("http://{}{}", self.address, self.path);

        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| SourceError::Unavailable(format!("connect {}: {e}", self.address)))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| SourceError::Unavailable(format!("handshake: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("POST")
            .uri(&uri)
            .header("host", &self.address)
            .header("content-type", "application/json")
            .header("user-agent", "scalegridd/0.1")
            .body(http_body_util::Full::new(bytes::Bytes::from(body)))
            .map_err(|e| SourceError::Malformed(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| SourceError::Unavailable(format!("request: {e}")))?;

        if resp.status().is_success() {
            Ok(true)
        } else {
            debug!(status = %resp.status(), %uri, "scaling webhook non-2xx");
            Ok(false)
        }
    }
}

impl ScaleExecutor for WebhookExecutor {
    fn execute<'a>(&'a self, decision: &'a ScalingDecision) -> BoxFuture<'a, SourceResult<bool>> {
        Box::pin(async move {
            let body =
                serde_json::to_vec(decision).map_err(|e| SourceError::Malformed(e.to_string()))?;
            match tokio::time::timeout(self.timeout, self.post(body)).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout(self.timeout)),
            }
        })
    }
}

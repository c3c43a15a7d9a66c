use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

/// Forwards one prediction to a replica endpoint.
#[async_trait]
pub trait ReplicaClient: Send + Sync {
    async fn predict(&self, endpoint: &str, input: &Value) -> anyhow::Result<Value>;
}

/// `POST {endpoint}/predict` with `{"input": ...}`, expecting `{"output": ...}`.
pub struct HttpReplicaClient {
    http: reqwest::Client,
}

impl HttpReplicaClient {
    pub fn new(connect_timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(32)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ReplicaClient for HttpReplicaClient {
    async fn predict(&self, endpoint: &str, input: &Value) -> anyhow::Result<Value> {
        let url = format!("{}/predict", endpoint.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "input": input }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("replica returned {status}");
        }
        let mut body: Value = resp.json().await?;
        match body.get_mut("output") {
            Some(output) => Ok(output.take()),
            None => anyhow::bail!("replica response has no 'output' field"),
        }
    }
}

/// Answers for `stub://{image}` endpoints with the image name, so a stub
/// deployment's output identifies the version that served it.
pub struct StubReplicaClient;

#[async_trait]
impl ReplicaClient for StubReplicaClient {
    async fn predict(&self, endpoint: &str, _input: &Value) -> anyhow::Result<Value> {
        match endpoint.strip_prefix("stub://") {
            Some(image) => Ok(Value::String(image.to_string())),
            None => anyhow::bail!("not a stub endpoint: {endpoint}"),
        }
    }
}

/// Client matching the endpoints a host hands out.
pub fn client_for_host(host_kind: &str) -> anyhow::Result<Arc<dyn ReplicaClient>> {
    Ok(match host_kind {
        "stub" => Arc::new(StubReplicaClient),
        _ => Arc::new(HttpReplicaClient::new(Duration::from_secs(2))?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_client() {
        let out = StubReplicaClient
            .predict("stub://forest:2", &json!([1.0]))
            .await
            .unwrap();
        assert_eq!(out, json!("forest:2"));
        assert!(StubReplicaClient
            .predict("http://127.0.0.1:1", &json!([1.0]))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_http_client_unreachable() {
        let client = HttpReplicaClient::new(Duration::from_millis(200)).unwrap();
        assert!(client
            .predict("http://127.0.0.1:1", &json!([1.0]))
            .await
            .is_err());
    }
}

use anyhow::{bail, Context};

/// Simple JSON-RPC 2.0 client used by the operator CLI to talk to a
/// running node.
///
/// Uses raw HTTP POST with serde_json rather than the full jsonrpsee client
/// to keep the CLI binary lean and dependency-minimal.
pub struct NodeRpcClient {
    url: String,
    client: reqwest::Client,
}

impl NodeRpcClient {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Call a JSON-RPC method and return the `result` field.
    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("connecting to node at {}", self.url))?;

        let json: serde_json::Value = resp.json().await.context("parsing RPC response")?;

        if let Some(err) = json.get("error") {
            bail!("RPC error: {}", err);
        }

        Ok(json["result"].clone())
    }

    /// Submit a Base64URL-encoded operation. Returns once the node has
    /// accepted it into its batch writer's queue.
    pub async fn submit_operation(&self, operation_b64: &str) -> anyhow::Result<()> {
        self.call(
            "anchorid_submitOperation",
            serde_json::json!([operation_b64]),
        )
        .await?;
        Ok(())
    }

    /// Resolve a short- or long-form DID. Returns the raw `result` object
    /// (`status` plus the standard resolution envelope) for the caller to
    /// print or inspect.
    pub async fn resolve(&self, did_or_long_form: &str) -> anyhow::Result<serde_json::Value> {
        self.call("anchorid_resolve", serde_json::json!([did_or_long_form]))
            .await
    }
}

use crate::wire::{
    Ack, ClassInfo, EditorStatus, ErrorReport, NodeSpec, OpenScripts, PhaseProgress, SceneNode,
    Screenshot,
};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BRIDGE_HOST: &str = "127.0.0.1";
pub const DEFAULT_BRIDGE_PORT: u16 = 6505;
pub const DEFAULT_BRIDGE_TIMEOUT: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("editor bridge unavailable: {0}")]
    Unavailable(String),
    #[error("editor bridge returned HTTP {status}: {body}")]
    Remote { status: u16, body: String },
    #[error("editor bridge protocol error: {0}")]
    Protocol(String),
    #[error("editor rejected the request: {0}")]
    Rejected(String),
}

impl BridgeError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BRIDGE_HOST.to_string(),
            port: DEFAULT_BRIDGE_PORT,
            timeout: DEFAULT_BRIDGE_TIMEOUT,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset, blank, unparseable and zero values all fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();
        Self {
            host: value("KILN_BRIDGE_HOST").unwrap_or(defaults.host),
            port: value("KILN_BRIDGE_PORT")
                .and_then(|raw| raw.parse::<u16>().ok())
                .filter(|port| *port > 0)
                .unwrap_or(defaults.port),
            timeout: value("KILN_BRIDGE_TIMEOUT_MS")
                .and_then(|raw| raw.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[async_trait]
pub trait EditorBridge: Send + Sync {
    async fn status(&self) -> Result<EditorStatus, BridgeError>;
    async fn errors(&self) -> Result<ErrorReport, BridgeError>;
    async fn run(&self, scene: Option<&str>) -> Result<Ack, BridgeError>;
    async fn stop(&self) -> Result<Ack, BridgeError>;
    async fn rescan(&self) -> Result<Ack, BridgeError>;
    async fn log(&self, message: &str) -> Result<Ack, BridgeError>;
    async fn get_phase(&self) -> Result<PhaseProgress, BridgeError>;
    async fn set_phase(&self, phase: &PhaseProgress) -> Result<Ack, BridgeError>;
    async fn scene_tree(&self, root: Option<&str>, depth: u32) -> Result<SceneNode, BridgeError>;
    async fn class_info(&self, class_name: &str) -> Result<ClassInfo, BridgeError>;
    async fn add_node(&self, spec: &NodeSpec) -> Result<Ack, BridgeError>;
    async fn update_node(
        &self,
        node_path: &str,
        properties: &Map<String, Value>,
    ) -> Result<Ack, BridgeError>;
    async fn delete_node(&self, node_path: &str) -> Result<Ack, BridgeError>;
    async fn screenshot(&self) -> Result<Screenshot, BridgeError>;
    async fn open_scripts(&self) -> Result<OpenScripts, BridgeError>;

    async fn is_connected(&self) -> bool {
        self.status().await.is_ok()
    }
}

#[derive(Clone, Debug)]
pub struct HttpEditorBridge {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpEditorBridge {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|err| BridgeError::Protocol(format!("http client init failed: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout,
        })
    }

    pub fn from_config(config: &BridgeConfig) -> Result<Self, BridgeError> {
        Self::new(config.base_url(), config.timeout)
    }

    pub fn from_env() -> Result<Self, BridgeError> {
        Self::from_config(&BridgeConfig::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, BridgeError> {
        let url = reqwest::Url::parse_with_params(&self.endpoint(path), query)
            .map_err(|err| BridgeError::Protocol(format!("invalid bridge url for {path}: {err}")))?;
        debug!(%url, "bridge GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| self.transport_error("GET", path, err))?;
        self.decode(path, response).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BridgeError> {
        debug!(path, "bridge POST");
        let response = self
            .client
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(|err| self.transport_error("POST", path, err))?;
        self.decode(path, response).await
    }

    async fn post_ack<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Ack, BridgeError> {
        let ack: Ack = self.post_json(path, body).await?;
        check_ack(ack)
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, BridgeError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| self.transport_error("read", path, err))?;
        if !status.is_success() {
            return Err(BridgeError::Remote {
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text)
            .map_err(|err| BridgeError::Protocol(format!("{path}: json decode failed: {err}")))
    }

    fn transport_error(&self, verb: &str, path: &str, err: reqwest::Error) -> BridgeError {
        if err.is_timeout() {
            BridgeError::Unavailable(format!(
                "{verb} {path} timed out after {}ms",
                self.timeout.as_millis()
            ))
        } else if err.is_connect() {
            BridgeError::Unavailable(format!(
                "{verb} {path} could not connect to {}: {err}",
                self.base_url
            ))
        } else {
            BridgeError::Unavailable(format!("{verb} {path} failed: {err}"))
        }
    }
}

#[async_trait]
impl EditorBridge for HttpEditorBridge {
    async fn status(&self) -> Result<EditorStatus, BridgeError> {
        self.get_json("/status", &[]).await
    }

    async fn errors(&self) -> Result<ErrorReport, BridgeError> {
        self.get_json("/errors", &[]).await
    }

    async fn run(&self, scene: Option<&str>) -> Result<Ack, BridgeError> {
        self.post_ack("/run", &json!({ "scene": scene })).await
    }

    async fn stop(&self) -> Result<Ack, BridgeError> {
        self.post_ack("/stop", &json!({})).await
    }

    async fn rescan(&self) -> Result<Ack, BridgeError> {
        self.post_ack("/rescan", &json!({})).await
    }

    async fn log(&self, message: &str) -> Result<Ack, BridgeError> {
        self.post_ack("/log", &json!({ "message": message })).await
    }

    async fn get_phase(&self) -> Result<PhaseProgress, BridgeError> {
        self.get_json("/phase", &[]).await
    }

    async fn set_phase(&self, phase: &PhaseProgress) -> Result<Ack, BridgeError> {
        self.post_ack("/phase", phase).await
    }

    async fn scene_tree(&self, root: Option<&str>, depth: u32) -> Result<SceneNode, BridgeError> {
        let mut query = vec![("depth", depth.to_string())];
        if let Some(root) = root {
            query.push(("root", root.to_string()));
        }
        self.get_json("/scene-tree", &query).await
    }

    async fn class_info(&self, class_name: &str) -> Result<ClassInfo, BridgeError> {
        self.get_json("/class-info", &[("class", class_name.to_string())])
            .await
    }

    async fn add_node(&self, spec: &NodeSpec) -> Result<Ack, BridgeError> {
        self.post_ack("/node/add", spec).await
    }

    async fn update_node(
        &self,
        node_path: &str,
        properties: &Map<String, Value>,
    ) -> Result<Ack, BridgeError> {
        self.post_ack(
            "/node/update",
            &json!({ "node_path": node_path, "properties": properties }),
        )
        .await
    }

    async fn delete_node(&self, node_path: &str) -> Result<Ack, BridgeError> {
        self.post_ack("/node/delete", &json!({ "node_path": node_path }))
            .await
    }

    async fn screenshot(&self) -> Result<Screenshot, BridgeError> {
        self.get_json("/screenshot", &[]).await
    }

    async fn open_scripts(&self) -> Result<OpenScripts, BridgeError> {
        self.get_json("/open-scripts", &[]).await
    }
}

pub(crate) fn check_ack(ack: Ack) -> Result<Ack, BridgeError> {
    if ack.ok {
        return Ok(ack);
    }
    Err(BridgeError::Rejected(
        ack.message
            .unwrap_or_else(|| "no reason given".to_string()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn bridge_config_defaults_match_baseline() {
        let config = BridgeConfig::default();
        assert_eq!(config.port, 6505);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.base_url(), "http://127.0.0.1:6505");
    }

    #[test]
    fn bridge_config_from_lookup_falls_back_on_invalid_values() {
        let vars = HashMap::from([
            ("KILN_BRIDGE_PORT", "not-a-port"),
            ("KILN_BRIDGE_TIMEOUT_MS", "0"),
            ("KILN_BRIDGE_HOST", "   "),
        ]);
        let config = BridgeConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn bridge_config_from_lookup_reads_overrides() {
        let vars = HashMap::from([
            ("KILN_BRIDGE_PORT", "7001"),
            ("KILN_BRIDGE_TIMEOUT_MS", "250"),
            ("KILN_BRIDGE_HOST", "localhost"),
        ]);
        let config = BridgeConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.base_url(), "http://localhost:7001");
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    fn check_ack_maps_negative_ack_to_rejected() {
        let error = check_ack(Ack {
            ok: false,
            message: Some("node not found".to_string()),
        })
        .expect_err("negative ack should fail");
        assert_eq!(error, BridgeError::Rejected("node not found".to_string()));
        assert!(!error.is_unavailable());
        assert!(check_ack(Ack::ok()).is_ok());
    }
}

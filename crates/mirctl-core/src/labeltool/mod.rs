//! Client for the external labeling tool.
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{config::LabelToolConfig, error::CoreError};

/// What a labeling project is created from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelProjectSpec {
    pub name: String,
    pub class_names: Vec<String>,
    /// Exported assets the annotators will see.
    pub asset_dir: PathBuf,
    /// Where finished annotations are collected.
    pub import_dir: PathBuf,
}

#[async_trait]
pub trait LabelTool: Send + Sync + 'static {
    /// Create a project and attach its storage. Returns the tool's project id.
    async fn create_project(&self, spec: &LabelProjectSpec) -> Result<i64, CoreError>;
}

pub fn from_config(cfg: &LabelToolConfig) -> Box<dyn LabelTool> {
    match &cfg.endpoint {
        Some(endpoint) => Box::new(HttpLabelTool::new(
            endpoint,
            cfg.token.clone().unwrap_or_default(),
        )),
        None => Box::new(UnconfiguredLabelTool),
    }
}

/// Label-studio style REST client.
pub struct HttpLabelTool {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: i64,
}

impl HttpLabelTool {
    pub fn new(endpoint: &str, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<Created, CoreError> {
        let resp = self
            .client
            .post(format!("{}{path}", self.endpoint))
            .header("Authorization", format!("Token {}", self.token))
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::LabelTool(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CoreError::LabelTool(format!("{path}: {status}: {text}")));
        }
        resp.json::<Created>()
            .await
            .map_err(|e| CoreError::LabelTool(format!("{path}: {e}")))
    }
}

#[async_trait]
impl LabelTool for HttpLabelTool {
    async fn create_project(&self, spec: &LabelProjectSpec) -> Result<i64, CoreError> {
        let project = self
            .post(
                "/api/projects",
                json!({
                    "title": spec.name,
                    "label_config": label_config(&spec.class_names),
                }),
            )
            .await?;

        self.post(
            "/api/storages/localfiles",
            json!({
                "project": project.id,
                "path": spec.asset_dir.display().to_string(),
                "use_blob_urls": true,
            }),
        )
        .await?;
        self.post(
            "/api/storages/export/localfiles",
            json!({
                "project": project.id,
                "path": spec.import_dir.display().to_string(),
            }),
        )
        .await?;

        info!(project = project.id, name = %spec.name, "labeling project created");
        Ok(project.id)
    }
}

/// Rectangle labeling over images, one label per class.
pub fn label_config(class_names: &[String]) -> String {
    let labels: String = class_names
        .iter()
        .map(|c| format!(r#"<Label value="{}"/>"#, escape_attr(c)))
        .collect();
    format!(
        r#"<View><Image name="image" value="$image"/><RectangleLabels name="label" toName="image">{labels}</RectangleLabels></View>"#
    )
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Fails every call; used when no endpoint is configured.
pub struct UnconfiguredLabelTool;

#[async_trait]
impl LabelTool for UnconfiguredLabelTool {
    async fn create_project(&self, _spec: &LabelProjectSpec) -> Result<i64, CoreError> {
        Err(CoreError::LabelTool("label tool endpoint not configured".into()))
    }
}

//! Project and template persistence over HTTP

use serde::{Deserialize, Serialize};
use url::Url;

/// A stored builder project.
///
/// The page/block tree is carried as raw JSON; its shape is owned by
/// the editor layer, not this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub pages: serde_json::Value,
    /// Last save time in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

/// A named reusable page template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Errors from the persistence API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("API base URL cannot carry path segments")]
    CannotBeABase,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
}

/// Client for the project/template persistence API.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    http: reqwest::Client,
    base_url: Url,
}

impl ProjectStore {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: Url::parse(base_url)?,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::CannotBeABase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    /// Fetch a project by id.
    pub async fn load_project(&self, id: &str) -> Result<ProjectDocument, ApiError> {
        let url = self.endpoint(&["projects", id])?;
        let response = self.http.get(url).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Persist a project under its own id.
    pub async fn save_project(&self, project: &ProjectDocument) -> Result<(), ApiError> {
        let url = self.endpoint(&["projects", &project.id])?;
        let response = self.http.put(url).json(project).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    /// List the available page templates.
    pub async fn list_templates(&self) -> Result<Vec<TemplateSummary>, ApiError> {
        let url = self.endpoint(&["templates"])?;
        let response = self.http.get(url).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Store a named template.
    pub async fn save_template(&self, template: &TemplateSummary) -> Result<(), ApiError> {
        let url = self.endpoint(&["templates"])?;
        let response = self.http.post(url).json(template).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

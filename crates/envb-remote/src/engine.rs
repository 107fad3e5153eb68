use async_trait::async_trait;
use envb_core::{ArtifactStore, Removal, ServiceError};
use envb_model::LabelFilter;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    config::RemoteConfig,
    errors::RemoteError,
    http::{check, client, trim_base},
};

#[derive(Debug, Deserialize)]
struct PruneReport {
    #[serde(rename = "ContainersDeleted", default)]
    containers_deleted: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ImageSummary {
    #[serde(rename = "Id")]
    id: String,
}

/// Container engine artifacts, removed by exact label match.
///
/// Stopped containers are pruned first so the images they pin can go.
pub struct DockerArtifactStore {
    http: Client,
    base: String,
}

impl DockerArtifactStore {
    pub fn new(cfg: &RemoteConfig) -> Result<Self, RemoteError> {
        Ok(Self {
            http: client(cfg.request_timeout)?,
            base: trim_base(&cfg.engine_endpoint),
        })
    }

    fn filters(filter: &LabelFilter) -> Result<String, RemoteError> {
        serde_json::to_string(&serde_json::json!({ "label": filter.to_strings() }))
            .map_err(|e| RemoteError::Encode(e.to_string()))
    }

    async fn prune_containers(&self, filters: &str) -> Result<usize, RemoteError> {
        let response = self
            .http
            .post(format!("{}/containers/prune", self.base))
            .query(&[("filters", filters)])
            .send()
            .await?;
        let report: PruneReport = check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        Ok(report.containers_deleted.map_or(0, |c| c.len()))
    }

    async fn list_images(&self, filters: &str) -> Result<Vec<ImageSummary>, RemoteError> {
        let response = self
            .http
            .get(format!("{}/images/json", self.base))
            .query(&[("all", "true"), ("filters", filters)])
            .send()
            .await?;
        check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    /// `Ok(false)` when the image was already gone.
    async fn remove_image(&self, id: &str) -> Result<bool, RemoteError> {
        let response = self
            .http
            .delete(format!("{}/images/{id}", self.base))
            .query(&[("force", "true")])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response).await?;
        Ok(true)
    }

    async fn delete(&self, filter: &LabelFilter) -> Result<Removal, RemoteError> {
        let filters = Self::filters(filter)?;
        let mut removed = Removal {
            containers: self.prune_containers(&filters).await?,
            images: 0,
        };

        let mut last_error = None;
        for image in self.list_images(&filters).await? {
            match self.remove_image(&image.id).await {
                Ok(true) => removed.images += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(target: "envb.remote.engine", image = %image.id, error = %e, "image removal failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if removed.images == 0 => Err(e),
            _ => {
                debug!(target: "envb.remote.engine", %filters, containers = removed.containers, images = removed.images, "artifacts removed");
                Ok(removed)
            }
        }
    }
}

#[async_trait]
impl ArtifactStore for DockerArtifactStore {
    async fn delete_matching(&self, filter: &LabelFilter) -> Result<Removal, ServiceError> {
        Ok(self.delete(filter).await?)
    }
}

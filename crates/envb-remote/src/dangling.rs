use async_trait::async_trait;
use envb_core::{DanglingImages, ServiceError};
use reqwest::Client;
use tracing::debug;

use crate::{
    config::RemoteConfig,
    errors::RemoteError,
    http::{check, client, trim_base},
};

/// Asks the control plane to evaluate superseded images of an environment.
pub struct HttpDanglingNotifier {
    http: Client,
    base: String,
}

impl HttpDanglingNotifier {
    pub fn new(cfg: &RemoteConfig) -> Result<Self, RemoteError> {
        Ok(Self {
            http: client(cfg.request_timeout)?,
            base: trim_base(&cfg.api_address),
        })
    }
}

#[async_trait]
impl DanglingImages for HttpDanglingNotifier {
    async fn notify(&self, project_id: &str, environment_id: &str) -> Result<(), ServiceError> {
        let url = format!(
            "{}/environment-images/dangling/{project_id}/{environment_id}",
            self.base
        );
        debug!(target: "envb.remote.dangling", %url, "requesting dangling image evaluation");
        let response = self
            .http
            .delete(url)
            .send()
            .await
            .map_err(RemoteError::from)?;
        check(response).await?;
        Ok(())
    }
}

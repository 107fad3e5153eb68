use async_trait::async_trait;
use envb_core::{ClusterJobs, ServiceError};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::{
    config::{ClusterConfig, RemoteConfig},
    errors::RemoteError,
    http::{check, client, trim_base},
};

/// Deletes per-build job objects through the cluster API.
pub struct KubeJobClient {
    http: Client,
    collection: String,
    token: Option<String>,
}

impl KubeJobClient {
    /// Reads `token_file` when no inline token is configured.
    pub async fn new(cfg: &RemoteConfig) -> Result<Self, RemoteError> {
        let ClusterConfig {
            api_server,
            namespace,
            group,
            version,
            plural,
            token,
            token_file,
        } = &cfg.cluster;

        let token = match (token, token_file) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(path)) => Some(tokio::fs::read_to_string(path).await?.trim().to_string()),
            (None, None) => None,
        };

        Ok(Self {
            http: client(cfg.request_timeout)?,
            collection: format!(
                "{}/apis/{group}/{version}/namespaces/{namespace}/{plural}",
                trim_base(api_server)
            ),
            token,
        })
    }

    async fn delete(&self, name: &str) -> Result<(), RemoteError> {
        let mut request = self.http.delete(format!("{}/{name}", self.collection));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(target: "envb.remote.cluster", job = name, "job already gone");
            return Ok(());
        }
        check(response).await?;
        debug!(target: "envb.remote.cluster", job = name, "job deleted");
        Ok(())
    }
}

#[async_trait]
impl ClusterJobs for KubeJobClient {
    async fn delete_job(&self, name: &str) -> Result<(), ServiceError> {
        Ok(self.delete(name).await?)
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;

    async fn jobs(server: &MockServer, token: Option<&str>) -> KubeJobClient {
        KubeJobClient::new(&RemoteConfig {
            cluster: ClusterConfig {
                api_server: server.base_url(),
                token: token.map(String::from),
                ..ClusterConfig::default()
            },
            ..RemoteConfig::default()
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn deletes_named_workflow_with_bearer_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path("/apis/argoproj.io/v1alpha1/namespaces/orchest/workflows/image-build-task-t1")
                    .header("authorization", "Bearer sekrit");
                then.status(200);
            })
            .await;

        jobs(&server, Some("sekrit"))
            .await
            .delete_job("image-build-task-t1")
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_job_counts_as_deleted() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE);
                then.status(404);
            })
            .await;

        jobs(&server, None)
            .await
            .delete_job("image-cache-task-t1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE);
                then.status(500).body("etcd timeout");
            })
            .await;

        let err = jobs(&server, None)
            .await
            .delete_job("image-cache-task-t1")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Rejected { status: 500, .. }));
    }
}

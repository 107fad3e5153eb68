use std::{path::PathBuf, time::Duration};

/// Endpoints of everything a build talks to over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Control-plane API base, e.g. `http://orchest-api:80/api`.
    pub api_address: String,
    pub request_timeout: Duration,
    pub cluster: ClusterConfig,
    /// Container engine API base, e.g. `http://docker:2375`.
    pub engine_endpoint: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_address: "http://orchest-api:80/api".to_string(),
            request_timeout: Duration::from_secs(10),
            cluster: ClusterConfig::default(),
            engine_endpoint: "http://localhost:2375".to_string(),
        }
    }
}

/// Where the per-build job objects live.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub api_server: String,
    pub namespace: String,
    pub group: String,
    pub version: String,
    pub plural: String,
    pub token: Option<String>,
    /// Read at client construction when `token` is unset.
    pub token_file: Option<PathBuf>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_server: "https://kubernetes.default.svc".to_string(),
            namespace: "orchest".to_string(),
            group: "argoproj.io".to_string(),
            version: "v1alpha1".to_string(),
            plural: "workflows".to_string(),
            token: None,
            token_file: None,
        }
    }
}

//! HTTP implementations of the build engine's remote collaborators.
mod config;
pub use config::{ClusterConfig, RemoteConfig};

mod errors;
pub use errors::RemoteError;

mod http;

mod status;
pub use status::{HttpStatusReporter, StatusUpdate};

mod dangling;
pub use dangling::HttpDanglingNotifier;

mod cluster;
pub use cluster::KubeJobClient;

mod engine;
pub use engine::DockerArtifactStore;

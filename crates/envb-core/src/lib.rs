//! Environment image build engine.
//!
//! Turns a project's environment (base image + setup script) into a built container image:
//! - [`ContextPreparer`] validates the environment and snapshots the project into an isolated build context;
//! - [`BuildDescriptor`] is the generated single-use recipe placed inside that context;
//! - [`StreamedRunner`] drives a [`BuildBackend`] while streaming its output to a [`LogSink`] and polling for aborts;
//! - [`Reconciler`] removes leftover artifacts in a detached, bounded retry loop;
//! - [`EnvironmentBuilder`] ties one build attempt together and guarantees cleanup on every exit path;
//! - [`BuildPool`] bounds how many attempts run at once;
//! - [`TaskSupervisor`] runs both attempts and cleanup loops as supervised tasks.
//!
//! Remote collaborators (status store, cluster jobs, container engine, control plane) are traits
//! in [`control`]; `envb-remote` provides HTTP implementations.
pub mod abort;
pub use abort::{AbortPoll, AbortRegistry, AbortSignal, TaskAbort};

pub mod attempt;
pub use attempt::{Collaborators, EnvironmentBuilder};

pub mod backend;
pub use backend::{BackendExit, BuildBackend, BuildRequest};

pub mod config;
pub use config::{EngineConfig, RetryPolicy};

pub mod context;
pub use context::{BuildContext, ContextPreparer, PreparedContext, ReservedNames};

pub mod control;
pub use control::{ArtifactStore, ClusterJob, ClusterJobs, DanglingImages, Removal, StatusSink};

pub mod descriptor;
pub use descriptor::{BuildDescriptor, DescriptorInput, Statement};

pub mod error;
pub use error::{BackendError, BuildError, PrepareError, RunError, ServiceError};

pub mod logs;
pub use logs::{CompleteLog, LogHub, LogSink};

pub mod metrics;
pub use metrics::{MetricsBackend, NoopMetrics};

pub mod pool;
pub use pool::BuildPool;

pub mod reconcile;
pub use reconcile::{ReconcileOutcome, Reconciler};

pub mod runner;
pub use runner::StreamedRunner;

pub mod supervisor;
pub use supervisor::TaskSupervisor;

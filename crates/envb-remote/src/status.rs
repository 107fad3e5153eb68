use async_trait::async_trait;
use envb_core::{ServiceError, StatusSink};
use envb_model::{BuildStatus, TaskId};
use reqwest::Client;
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::debug;

use crate::{
    config::RemoteConfig,
    errors::RemoteError,
    http::{check, client, trim_base},
};

/// Body of `PUT {api}/environment-builds/{task_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub status: BuildStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_time: Option<String>,
}

impl StatusUpdate {
    /// STARTED carries a start timestamp, SUCCESS and FAILURE a finish timestamp.
    pub fn at(status: BuildStatus, now: OffsetDateTime) -> Result<Self, RemoteError> {
        let stamp = || {
            now.to_offset(time::UtcOffset::UTC)
                .format(&Rfc3339)
                .map_err(|e| RemoteError::Encode(e.to_string()))
        };
        let (started_time, finished_time) = match status {
            BuildStatus::Started => (Some(stamp()?), None),
            BuildStatus::Success | BuildStatus::Failure => (None, Some(stamp()?)),
            BuildStatus::Aborted => (None, None),
        };
        Ok(Self {
            status,
            started_time,
            finished_time,
        })
    }
}

/// [`StatusSink`] backed by the control-plane API. No retries.
pub struct HttpStatusReporter {
    http: Client,
    base: String,
}

impl HttpStatusReporter {
    pub fn new(cfg: &RemoteConfig) -> Result<Self, RemoteError> {
        Ok(Self {
            http: client(cfg.request_timeout)?,
            base: trim_base(&cfg.api_address),
        })
    }

    async fn put(&self, task_id: &TaskId, status: BuildStatus) -> Result<(), RemoteError> {
        let body = StatusUpdate::at(status, OffsetDateTime::now_utc())?;
        let url = format!("{}/environment-builds/{}", self.base, task_id);
        debug!(target: "envb.remote.status", %url, %status, "reporting build status");

        let response = self.http.put(url).json(&body).send().await?;
        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl StatusSink for HttpStatusReporter {
    async fn report(&self, task_id: &TaskId, status: BuildStatus) -> Result<(), ServiceError> {
        Ok(self.put(task_id, status).await?)
    }
}

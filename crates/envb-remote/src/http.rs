use std::time::Duration;

use reqwest::{Client, Response};

use crate::errors::RemoteError;

pub(crate) fn client(timeout: Duration) -> Result<Client, RemoteError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Pass 2xx responses through; turn everything else into [`RemoteError::Status`].
pub(crate) async fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn trim_base(base: &str) -> String {
    base.trim_end_matches('/').to_string()
}

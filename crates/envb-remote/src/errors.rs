use envb_core::ServiceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("http request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("remote rejected request with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RemoteError> for ServiceError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Status { status, body } => ServiceError::Rejected {
                status,
                message: body,
            },
            RemoteError::InvalidResponse(msg) => ServiceError::InvalidResponse(msg),
            other => ServiceError::Unavailable(other.to_string()),
        }
    }
}

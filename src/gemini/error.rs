use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid model identifier {0:?}")]
    InvalidModel(String),
    #[error("model {0:?} is not available")]
    UnknownModel(String),
    #[error("error reaching backend: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("backend responded [{status}] {message}")]
    Upstream { status: u16, message: String },
    #[error("malformed backend response: {0}")]
    Decode(String),
    #[error("prompt was blocked due to {0}")]
    Blocked(String),
    #[error("candidate was blocked due to {0}")]
    CandidateBlocked(String),
    #[error("backend returned no candidates")]
    EmptyResponse,
}

pub type RelayResult<T> = Result<T, RelayError>;

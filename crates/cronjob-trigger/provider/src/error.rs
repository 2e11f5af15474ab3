use thiserror::Error;

pub type Result<T, E = Error> = ::core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("conflicting object: {namespace}/{name} already exists and is not managed by this controller")]
    Conflict { namespace: String, name: String },
    #[error("invalid schedule {schedule:?}: {reason}")]
    InvalidSchedule { schedule: String, reason: String },
    #[error("invalid timeout of function {function:?}: {value:?} is not a positive number of seconds")]
    InvalidTimeout { function: String, value: String },
    #[error("scheduled job name {name:?} is longer than {max} characters")]
    JobNameTooLong { name: String, max: usize },
    #[error("no such function: {namespace}/{name}")]
    FunctionNotFound { namespace: String, name: String },
    #[error("failed to encode the payload: {0}")]
    Payload(#[from] ::serde_json::Error),
    #[error("kubernetes API error: {0}")]
    Kube(#[from] ::kube::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube(::kube::Error::Api(response)) if response.code == 404)
    }

    /// Either an unmanaged object in the way, or a stale resource version.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::Kube(::kube::Error::Api(response)) => response.code == 409,
            _ => false,
        }
    }
}

use thiserror::Error;

/// Error taxonomy for the workload runtime plane.
///
/// Propagation policy follows the kind: `EngineUnavailable`, `ImagePullFailed`
/// and `InvalidSpec` are fatal to a workload start and surfaced to the caller;
/// `Backpressure` is recovered at the HTTP request boundary (500, workload
/// keeps running); `ParseFailure` is logged and the stdout stream continues;
/// `NotFound` on a stop/remove path is success, not failure.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    #[error("Hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("container engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("image pull failed: {0}")]
    ImagePullFailed(String),

    #[error("invalid workload spec: {0}")]
    InvalidSpec(String),

    #[error("backpressure: channel full")]
    Backpressure,

    #[error("parse failure: {0}")]
    ParseFailure(String),

    #[error("container exited unexpectedly: {0}")]
    ContainerExited(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("container runtime error: {0}")]
    ContainerRuntime(String),

    #[error("permission error: {0}")]
    Permission(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// True for errors whose spec-mandated handling is "treat as success",
    /// e.g. stopping or removing an already-absent container.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

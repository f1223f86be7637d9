use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}: {1}")]
    HttpError(String, #[source] reqwest::Error),

    #[error("{0}: unexpected status {1}")]
    HttpStatus(String, reqwest::StatusCode),

    #[error("{0}: {1}")]
    SerializationError(String, #[source] serde_json::Error),

    #[error("{0}")]
    MissingData(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("telemetry error: {0}")]
    TelemetryError(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("unknown admission plugin: {0}")]
    UnknownPlugin(String),

    #[error("{0}: {1}")]
    ConfigDecodeError(String, #[source] serde_yaml::Error),

    #[error("{0}: {1}")]
    PluginConfigError(String, #[source] serde_json::Error),

    #[error("{0}: {1}")]
    RegexError(String, #[source] regex::Error),

    #[error("{0}: {1}")]
    IoError(String, #[source] std::io::Error),

    #[error("{0}: {1}")]
    RegistryError(String, #[source] podgate_k8s_util::error::Error),

    #[error("{0}: {1}")]
    SerializationError(String, #[source] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// HTTP status code reported back to the API server.
    pub fn code(&self) -> u16 {
        match self {
            Error::BadRequest(_) => 400,
            Error::Forbidden(_) => 403,
            _ => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Error::BadRequest(_) => "BadRequest",
            Error::Forbidden(_) => "Forbidden",
            _ => "InternalError",
        }
    }
}

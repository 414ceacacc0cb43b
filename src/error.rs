use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Authentication scheme already exists: {0}")]
    DuplicateScheme(String),

    #[error("No authentication scheme registered with name: {0}")]
    UnknownScheme(String),

    #[error("Required service is not registered: {0}")]
    MissingService(&'static str),

    #[error("Remote authentication failed: {error} ({description})")]
    RemoteFailure { error: String, description: String },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Provider discovery failed: {0}")]
    Discovery(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

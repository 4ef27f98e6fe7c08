use thiserror::Error;

#[derive(Error, Debug)]
pub enum NagareError {
    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("No suitable variant: {0}")]
    NoSuitableVariant(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Assembly error: {0}")]
    Assembly(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Fieldless discriminant of [`NagareError`], for branching on the kind of a
/// failure without matching on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Resolution,
    NoSuitableVariant,
    Io,
    Assembly,
    Precondition,
    Cancelled,
    Config,
}

impl NagareError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NagareError::Resolution(_) | NagareError::Http(_) | NagareError::Json(_) => {
                ErrorKind::Resolution
            }
            NagareError::NoSuitableVariant(_) => ErrorKind::NoSuitableVariant,
            NagareError::Io(_) => ErrorKind::Io,
            NagareError::Assembly(_) => ErrorKind::Assembly,
            NagareError::Precondition(_) => ErrorKind::Precondition,
            NagareError::Cancelled(_) => ErrorKind::Cancelled,
            NagareError::Config(_) | NagareError::Toml(_) => ErrorKind::Config,
        }
    }

    /// Errors that abort the whole run instead of a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Precondition | ErrorKind::Config)
    }
}

pub type Result<T> = std::result::Result<T, NagareError>;

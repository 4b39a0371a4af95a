use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database dump failed: {0}")]
    Dump(String),

    #[error("Database restore failed: {0}")]
    RestoreTool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed archive or envelope: {0}")]
    Format(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Decryption failed: wrong password or corrupted file")]
    Authentication,

    #[error("Artifact is encrypted but no encryption key was provided")]
    MissingKey,

    #[error("Encryption failed: {0}")]
    Crypto(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Remote object not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Short label used for reason-labeled failure counters.
    pub fn failure_reason(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_failed",
            AppError::Dump(_) => "dump_failed",
            AppError::RestoreTool(_) => "restore_tool_failed",
            AppError::Io(_) => "io_error",
            AppError::Format(_) => "invalid_format",
            AppError::Archive(_) => "archive_error",
            AppError::Authentication => "authentication_failed",
            AppError::MissingKey => "missing_encryption_key",
            AppError::Crypto(_) => "encryption_failed",
            AppError::Transfer(_) => "transfer_failed",
            AppError::NotFound(_) => "object_not_found",
            AppError::Config(_) => "config_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

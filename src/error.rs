use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity cannot be submitted: {0}")]
    InvalidSubmission(String),

    #[error("No configuration declared for id: {0}")]
    NonExistingConfig(String),

    #[error("Configuration cannot be updated while the Core service is running")]
    ConfigurationUpdateBlocked,

    #[error("Export path collides with the internal storage folder: {0}")]
    InvalidExportPath(std::path::PathBuf),

    #[error("Job {0} is not finished; pass force to delete it anyway")]
    JobNotFinished(String),

    #[error("Data node {0} is still referenced by tasks; pass force to delete it anyway")]
    DataNodeInUse(String),

    #[error("Scenarios cannot be compared: {0}")]
    NonComparable(String),

    #[error("Primary scenario {0} cannot be deleted while its cycle holds other scenarios")]
    PrimaryScenario(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

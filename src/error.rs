use std::path::PathBuf;

/// Failures of individual pipeline steps.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("download failed: {0}")]
    Download(String),

    #[error("unusable CSV {}: {reason}", .path.display())]
    Csv { path: PathBuf, reason: String },

    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("refusing to write {found} players (minimum {min})")]
    TooFewPlayers { found: usize, min: usize },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command `{command}` failed ({status}): {detail}")]
    Command {
        command: String,
        status: String,
        detail: String,
    },

    #[error("reload trigger failed for {}: {source}", .path.display())]
    Reload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("smoke test failed for {url}: {reason}")]
    Smoke { url: String, reason: String },
}

impl StepError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StepError::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL for {field}: {value} ({reason})")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("endpoint must start with '/': {0}")]
    InvalidEndpoint(String),

    #[error("updater command is empty")]
    EmptyCommand,

    #[error("app entry file not found: {}", .0.display())]
    MissingAppEntry(PathBuf),

    #[error("failed to read config file {}: {reason}", .path.display())]
    File { path: PathBuf, reason: String },
}

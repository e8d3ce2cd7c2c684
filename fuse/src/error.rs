use std::path::PathBuf;

/// Everything that can go wrong while deploying or collecting garbage. Apart from the per-tick
/// fetch misses swallowed while monitoring a rollout, every variant is fatal for the enclosing
/// operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or unusable input, raised before anything is changed.
    #[error("{0}")]
    Validation(String),

    #[error("no deployments found in {}", .0.display())]
    NoDeploymentsFound(PathBuf),

    /// The cluster CLI exited unsuccessfully or could not be started.
    #[error("`{command}` failed: {output}")]
    ExternalCall { command: String, output: String },

    #[error("failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error(transparent)]
    InvalidFormat(#[from] image_reference::InvalidFormat),

    #[error("unknown image {repository}: {reason}")]
    UnknownImage { repository: String, reason: String },

    #[error("registry request failed: {0}")]
    Registry(String),

    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("interrupted")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn external_call(command: &[String], output: &[u8]) -> Self {
        Error::ExternalCall {
            command: command.join(" "),
            output: String::from_utf8_lossy(output).trim().to_owned(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("empty agent command line")]
    EmptyCommand,

    #[error("invalid agent command line: {0}")]
    InvalidCommand(String),
}

//! Subprocess plumbing for the agent invocation

mod error;
mod runner;
mod streaming;

pub use error::ProcessError;
pub use runner::{ExitStatus, ProcessCommand};
pub use streaming::{run_streaming, StreamProcessor, StreamSource, StreamingOutput};

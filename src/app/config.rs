//! Application-wide settings derived from the CLI

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Verbosity level for logging (count of -v flags)
    pub verbose: u8,
}

impl AppConfig {
    pub fn new(verbose: u8) -> Self {
        Self { verbose }
    }

    /// Log filter directive for the verbosity level.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

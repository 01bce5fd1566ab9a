//! Fatal error handling

use tracing::error;

/// Print a fatal error and exit non-zero. In verbose mode the full cause
/// chain is shown.
pub fn handle_fatal_error(err: crate::error::Error, verbose: u8) -> ! {
    error!("fatal: {}", err);
    eprintln!("Error: {err}");

    if verbose >= 1 {
        let mut source = std::error::Error::source(&err);
        let mut depth = 0;
        while let Some(cause) = source {
            eprintln!("  caused by ({depth}): {cause}");
            source = cause.source();
            depth += 1;
        }
    }

    std::process::exit(1)
}

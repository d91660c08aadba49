// Logging bootstrap: `log` facade routed to stderr through flexi_logger.
// INFO by default, DEBUG with --debug; RUST_LOG overrides both.

use flexi_logger::{FlexiLoggerError, Logger, LoggerHandle};

/// Start the global logger. Keep the returned handle alive for the whole run.
pub fn init(debug: bool) -> Result<LoggerHandle, FlexiLoggerError> {
    let level = if debug { "debug" } else { "info" };
    Logger::try_with_env_or_str(level)?
        .log_to_stderr()
        .format(flexi_logger::default_format)
        .start()
}

// Returns true if debug logging is enabled.
pub fn is_debug() -> bool {
    log::log_enabled!(log::Level::Debug)
}

//! Generic logger utility functions
//!
//! Every record is prefixed with the seconds since the session epoch and, once an executable has
//! announced one with [`set_phase`], the phase it is in (e.g. the navigation state).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use fern;
use log::{self, info};
use std::fmt;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

// Internal imports
use crate::session;

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Targets which are capped at INFO whatever the minimum level.
const QUIET_TARGETS: &[&str] = &["tokio", "mio"];

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

/// Current execution phase, empty until set.
static PHASE: RwLock<&'static str> = RwLock::new("");

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level of at least `INFO`, found `{0}`")]
    InvalidMinLogLevel(log::LevelFilter),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// Records are written to stdout and to the session's log file, prefixed by the number of seconds
/// since the session epoch.
///
/// # Notes
///
/// - `min_level` must be at least `log::Level::Info`, so that the session header is always
///   recorded.
///
/// # Safety
///
/// - This function must only be called once to prevent corrupting logs.
pub fn logger_init(
    min_level: self::LevelFilter,
    session: &session::Session,
) -> Result<(), LoggerInitError> {
    if min_level < log::Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level));
    }

    let log_file =
        fern::log_file(session.log_file_path.clone()).map_err(LoggerInitError::LogFileInitError)?;

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}",
                format_line(
                    session::get_elapsed_seconds(),
                    record.level(),
                    record.target(),
                    phase(),
                    message
                )
            ))
        })
        .level(min_level);

    for target in QUIET_TARGETS {
        dispatch = dispatch.level_for(*target, LevelFilter::Info);
    }

    dispatch
        .chain(std::io::stdout())
        .chain(log_file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    info!("    Session epoch: {}", session::get_epoch());
    info!("    Log level: {:?}", min_level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

/// Set the phase shown in every following record. An empty phase is not shown.
pub fn set_phase(phase: &'static str) {
    *PHASE.write().unwrap_or_else(PoisonError::into_inner) = phase;
}

/// The phase shown in records.
pub fn phase() -> &'static str {
    *PHASE.read().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Format one record. Debug and trace records carry their target so the emitting module can be
/// found.
fn format_line(
    elapsed_s: f64,
    level: log::Level,
    target: &str,
    phase: &str,
    message: &fmt::Arguments,
) -> String {
    let mut line = format!("[{:10.6} {}]", elapsed_s, level_to_str(level));

    if !phase.is_empty() {
        line.push_str(&format!(" <{}>", phase));
    }
    if level > log::Level::Info {
        line.push_str(&format!(" {}:", target));
    }

    line.push_str(&format!(" {}", message));
    line
}

/// Get the string representation of a log level
fn level_to_str(level: log::Level) -> ColoredString {
    match level {
        log::Level::Trace => "TRC".dimmed().italic(),
        log::Level::Debug => "DBG".dimmed(),
        log::Level::Info => "INF".normal(),
        log::Level::Warn => "WRN".yellow(),
        log::Level::Error => "ERR".red().bold(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_format_line() {
        colored::control::set_override(false);

        let line = format_line(
            1.5,
            log::Level::Info,
            "feld_lib::navigation",
            "",
            &format_args!("Path completed"),
        );
        assert_eq!(line, "[  1.500000 INF] Path completed");

        let line = format_line(
            2.0,
            log::Level::Debug,
            "feld_lib::navigation",
            "running",
            &format_args!("Segment completed"),
        );
        assert_eq!(
            line,
            "[  2.000000 DBG] <running> feld_lib::navigation: Segment completed"
        );
    }

    #[test]
    fn test_phase() {
        set_phase("preparing");
        assert_eq!(phase(), "preparing");
        set_phase("");
        assert_eq!(phase(), "");
    }
}

//! Logging macros for the scheduling passes with verbosity level control.
//!
//! Logging costs one integer comparison when disabled (verbosity=0).
//! Levels:
//! - 0: SILENT (only rounding anomalies)
//! - 1: CHANGES (placements, inserted padding, closed timesteps)
//! - 2: CHECKS (admission decisions inside a timestep)
//! - 3: DEBUG (frontier contents, per-resource walks)

/// Verbosity level constants.
pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Report a non-fatal anomaly. Printed at every verbosity level.
#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => {
        eprintln!("warning: {}", format_args!($($arg)*))
    };
}

/// Log at CHANGES level (verbosity >= 1).
///
/// Used for: operation placements, padding, timestep boundaries.
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHANGES {
            eprintln!($($arg)*);
        }
    };
}

/// Log at CHECKS level (verbosity >= 2).
///
/// Used for: admission checks and budget refusals.
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHECKS {
            eprintln!($($arg)*);
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
///
/// Used for: frontier dumps and sequencer walks.
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            eprintln!($($arg)*);
        }
    };
}

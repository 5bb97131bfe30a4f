//! Verbosity-gated logging for the leveling and simulation passes.
//!
//! Both `LevelingOptions` and `MonteCarloConfig` carry a `verbosity` from 0 to
//! 3. Each macro emits through the `log` facade only when that verbosity
//! reaches its tier, so a run at 0 stays quiet even under a host logger set to
//! trace. The crate never installs a logger itself.
//!
//! | verbosity | macro | `log` level | leveling | simulation |
//! |---|---|---|---|---|
//! | 1 | `log_changes!` | info | shifts, round summaries | run start, failure, cancellation |
//! | 2 | `log_checks!` | debug | conflicts, rejected placements | duration summary |
//! | 3 | `log_debug!` | trace | float refreshes | S-curve span |

use log::Level;

pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// `log` level a verbosity tier is reported at.
pub fn level_for(tier: u8) -> Level {
    match tier {
        0 | VERBOSITY_CHANGES => Level::Info,
        VERBOSITY_CHECKS => Level::Debug,
        _ => Level::Trace,
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_at_tier {
    ($tier:expr, $verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $tier {
            log::log!($crate::logging::level_for($tier), $($arg)*);
        }
    };
}

/// Shifts applied, rounds finished, runs started or abandoned.
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        $crate::__log_at_tier!($crate::logging::VERBOSITY_CHANGES, $verbosity, $($arg)*)
    };
}

/// Conflict detection and placement decisions.
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        $crate::__log_at_tier!($crate::logging::VERBOSITY_CHECKS, $verbosity, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        $crate::__log_at_tier!($crate::logging::VERBOSITY_DEBUG, $verbosity, $($arg)*)
    };
}

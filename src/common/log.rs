//! Logging helpers
//!
//! Logger initialisation for the binary. Library code only uses the `log` macros.

use std::env;

use log::LevelFilter;

/// Initialise the global logger
///
/// The logger is installed once, as early as possible, so configuration
/// loading is logged too. `level` only sets the starting level;
/// [`set_log_level`] adjusts it once the final configuration is known.
/// When `RUST_LOG` is set it is used as the filter and wins over both.
///
/// # Parameters
///
/// * `level` - Log level (error, warn, info, debug, trace)
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", "trace");

    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();

    set_log_level(level);
}

/// Change the active log level; unknown names fall back to `info`
///
/// Does nothing when `RUST_LOG` is set.
pub fn set_log_level(level: &str) {
    if env::var_os("RUST_LOG").is_some() {
        return;
    }
    log::set_max_level(level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info));
}

/// Map the numeric verbosity used in configuration files onto a log level
pub fn level_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_init_logger() {
        // Only checks that repeated initialisation does not panic
        init_logger("debug");
        init_logger("info");
    }

    #[test]
    #[serial]
    fn test_set_log_level() {
        if env::var_os("RUST_LOG").is_some() {
            return;
        }
        init_logger("debug");
        assert_eq!(log::max_level(), LevelFilter::Debug);

        set_log_level("warn");
        assert_eq!(log::max_level(), LevelFilter::Warn);

        set_log_level("chatty");
        assert_eq!(log::max_level(), LevelFilter::Info);
    }

    #[test]
    fn test_level_for_verbosity() {
        assert_eq!(level_for_verbosity(0), "info");
        assert_eq!(level_for_verbosity(1), "debug");
        assert_eq!(level_for_verbosity(2), "trace");
        assert_eq!(level_for_verbosity(9), "trace");
    }
}

//! Logger setup for the binaries
//!
//! The library only talks to the `log` facade. Binaries call
//! [`logger_init`] once to route records to stderr through `fern`.

use log::LevelFilter;

use crate::common::{TrackingError, TrackingResult};

/// Initialise the global logger.
///
/// Must only be called once per process.
pub fn logger_init(min_level: LevelFilter) -> TrackingResult<()> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            if record.level() > log::Level::Info {
                out.finish(format_args!(
                    "[{} {:5}] {}: {}",
                    chrono::Local::now().format("%H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "[{} {:5}] {}",
                    chrono::Local::now().format("%H:%M:%S%.3f"),
                    record.level(),
                    message
                ))
            }
        })
        .level(min_level)
        .chain(std::io::stderr())
        .apply()
        .map_err(|e| TrackingError::Config(format!("logger already initialised: {}", e)))
}

/// `-v` count to level, starting at info
pub fn verbosity_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

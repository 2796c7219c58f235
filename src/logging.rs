use env_logger::{Builder, Env};
use log::LevelFilter;

/// Initializes the global logger.
///
/// When `verbose` is `true`, debug messages of the traffic core are printed
/// as well. `RUST_LOG` overrides either level.
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let env = Env::default().default_filter_or(level.to_string());
    // Fails only if a logger is already installed, which tests may do repeatedly.
    let _ = Builder::from_env(env).format_timestamp_millis().try_init();
}

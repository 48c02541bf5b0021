use env_logger::Env;

pub mod app;
pub mod config;

/// Initializes the global logger.
///
/// Call this first! The default level is `info`, use the `RUST_LOG` environment variable to change it.
pub fn init_logger() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Print a warning if we are running in debug mode.
    #[cfg(debug_assertions)]
    {
        log::warn!("DEBUG assertions are enabled, this build of the agent is fine for debugging, but not for production.");
    }
}

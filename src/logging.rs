//! Logging bootstrap built on the `log` facade and `env_logger`.

/// Initializes logging from the environment (`RUST_LOG`), defaulting to
/// `info`. Safe to call more than once; later calls are no-ops.
pub fn init() {
    let _ = try_init();
}

/// Fallible variant for callers that install their own logger first.
pub fn try_init() -> Result<(), log::SetLoggerError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init()
}

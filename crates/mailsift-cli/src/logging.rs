use env_logger::{Env, Target};

const LOG_ENV: &str = "MAILSIFT_LOG";

/// Logs go to stderr; stdout carries only the JSON envelope.
pub(crate) fn init() {
    env_logger::Builder::from_env(Env::default().filter_or(LOG_ENV, "warn"))
        .target(Target::Stderr)
        .format_timestamp_secs()
        .init();
}
